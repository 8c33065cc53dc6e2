use std::fmt::Display;

use clap::{error::ErrorKind, value_parser, CommandFactory, Parser};
use pagetone::{DetectionConfig, Input, LiveStream, TranscoderOptions};

/// Standard input filename
const STDIN_FILE: &str = "-";

const USAGE_SHORT: &str = r#"
This program listens to an audio stream for Motorola Quick Call I (QCI), Quick Call II (QCII), and DTMF paging tones. Each --detect pattern which is recognized is printed with its index.

See --help for more details.

ALWAYS TEST YOUR DECODING SETUP!
"#;

const USAGE_LONG: &str = r#"
This program listens to an audio stream for Motorola Quick Call I (QCI), Quick Call II (QCII), and DTMF paging tones. Each --detect pattern which is recognized is printed with its index.

Audio is decoded with ffmpeg, which must be installed. The --input may be anything that ffmpeg can read: a file, a URL, or "-" for standard input. Live streams which require a login accept --username and --password.

    pagetoned -i https://audio.example.com/fire \
        -d qcii:569.1:1687.2 \
        -d qci:Z:DP:HK \
        -d 'dtmf:*123#'

Patterns are written as:

  qcii:TONE_A:TONE_B    tone A then tone B, in Hz
  qci:SERIES:AB:CD      series A, B, or Z; pairs of tone letters
                        (C D E F G H J K L M N P)
  dtmf:SEQUENCE         digits 0-9, *, #, and A-D

Arguments which follow "--" will be used to spawn a child process for every detection. The child process receives the following additional environment variables which describe the page:

  PAGETONED_RATE="8000" (configured sample --rate)
  PAGETONED_INDEX="1" (which --detect, counting from zero)
  PAGETONED_PROTOCOL="QCI" (or QCII, DTMF)
  PAGETONED_CONFIG="qci:Z:DP:HK"
  PAGETONED_TIME="1616883240" (UTC UNIX timestamp)

ALWAYS TEST YOUR DECODING SETUP!
"#;

const ADVANCED: &str = "Advanced Input Options";

/// Top-level program arguments
#[derive(Parser, Clone, Debug)]
#[command(version)]
#[command(about, long_about = None)]
#[command(after_help = USAGE_SHORT, after_long_help = USAGE_LONG)]
#[command(max_term_width = 100)]
pub struct Args {
    /// Verbosity level (-vvv for more)
    #[arg(short, long, default_value_t = 0, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print NOTHING, not even detections
    #[arg(short, long)]
    pub quiet: bool,

    /// Sampling rate (Hz)
    ///
    /// Audio is decoded at this rate. The tone detectors are
    /// designed for 8000 Hz.
    #[arg(short, long, default_value_t = 8000)]
    #[arg(value_parser = value_parser!(u32).range(4000..=48000))]
    pub rate: u32,

    /// Input location (or "-" for stdin)
    ///
    /// Any file, URL, or device that ffmpeg can read.
    #[arg(short, long, default_value_t = STDIN_FILE.to_string())]
    pub input: String,

    /// User name for an authenticated live stream
    #[arg(long, requires = "password")]
    pub username: Option<String>,

    /// Password for an authenticated live stream
    #[arg(long, requires = "username")]
    pub password: Option<String>,

    /// Tone pattern to detect (repeat for more)
    ///
    /// One of `qcii:TONE_A:TONE_B`, `qci:SERIES:AB:CD`, or
    /// `dtmf:SEQUENCE`.
    #[arg(short, long = "detect", value_name = "PATTERN", required = true)]
    pub detect: Vec<DetectionConfig>,

    /// Detect synthesized pages and exit
    ///
    /// pagetoned will generate one page for every --detect pattern,
    /// report it, and invoke the CHILD process for it. No input
    /// is read.
    #[arg(long)]
    pub demo: bool,

    /// Input is already decoded; do not run ffmpeg
    ///
    /// The --input must be one-channel (mono), 32-bit float,
    /// little-endian at --rate.
    #[arg(long)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub raw: bool,

    /// ffmpeg program
    #[arg(long, default_value_t = String::from("ffmpeg"))]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub ffmpeg: String,

    /// Read size and detector block size (bytes)
    #[arg(long, default_value_t = 640)]
    #[arg(value_parser = value_parser!(u32).range(4..=65536))]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub chunk_bytes: u32,

    /// Buffer size before the oldest audio is dropped (bytes)
    #[arg(long, default_value_t = 1 << 20)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub buffer_bytes: usize,

    /// Read input as fast as possible, not in real time
    ///
    /// Use this for files. Live streams should be read in
    /// real time.
    #[arg(long)]
    #[arg(hide_short_help = true)]
    #[arg(help_heading = ADVANCED)]
    pub no_realtime: bool,

    /// Spawn child process for each detection. Optional.
    ///
    /// Arguments are provided VERBATIM to the child process
    /// without shell interpretation.
    #[arg(last = true)]
    pub child: Vec<String>,
}

impl Args {
    /// Return true if the user requests input from stdin
    pub fn input_is_stdin(&self) -> bool {
        self.input == STDIN_FILE
    }

    /// Audio input
    pub fn input(&self) -> Input {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => {
                LiveStream::new(self.input.as_str(), username.as_str(), password.as_str()).into()
            }
            _ => Input::from(self.input.as_str()),
        }
    }

    /// Transcoder options
    pub fn transcoder_options(&self) -> TranscoderOptions {
        let mut opts = TranscoderOptions::new();
        opts.with_program(self.ffmpeg.as_str())
            .with_chunk_bytes(self.chunk_bytes as usize)
            .with_buffer_bytes(self.buffer_bytes)
            .with_realtime(!self.no_realtime);
        opts
    }
}

/// A program-level error with exit code
#[derive(Debug)]
pub struct CliError {
    error: anyhow::Error,
    exit_code: i32,
}

impl CliError {
    /// Create new error with a custom exit code
    pub fn new(error: anyhow::Error, code: i32) -> CliError {
        CliError {
            error,
            exit_code: code,
        }
    }

    /// Print this error to the terminal
    ///
    /// Errors from clap are printed verbatim. Other types of errors
    /// are printed indirectly via clap's fancy formatter.
    pub fn print(&self) -> std::io::Result<()> {
        if let Some(e) = self.error.downcast_ref::<clap::Error>() {
            e.print()
        } else {
            Args::command()
                .error(ErrorKind::Format, self.to_string())
                .print()
        }
    }

    /// Print this error to the terminal and exit
    pub fn exit(&self) -> ! {
        drop(self.print());
        std::process::exit(self.exit_code);
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.error)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> CliError {
        CliError::new(err, 1)
    }
}

impl From<clap::Error> for CliError {
    fn from(err: clap::Error) -> CliError {
        let code = if err.use_stderr() { 1 } else { 0 };
        CliError::new(err.into(), code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clap() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_args() {
        let args = Args::try_parse_from([
            "pagetoned",
            "-i",
            "https://feed",
            "--username",
            "me",
            "--password",
            "secret",
            "-d",
            "qci:z:dp:hk",
            "--detect",
            "dtmf:*1",
            "--no-realtime",
            "--",
            "notify-send",
            "page",
        ])
        .unwrap();

        assert_eq!(8000, args.rate);
        assert_eq!(
            vec![
                DetectionConfig::qci('Z', ['D', 'P'], ['H', 'K']),
                DetectionConfig::dtmf("*1")
            ],
            args.detect
        );
        assert!(!args.input_is_stdin());
        assert_eq!(Some("Basic bWU6c2VjcmV0".to_owned()), args.input().authorization());
        assert!(!args.transcoder_options().realtime());
        assert_eq!(vec!["notify-send", "page"], args.child);

        // at least one pattern is required, and it must be valid
        assert!(Args::try_parse_from(["pagetoned"]).is_err());
        assert!(Args::try_parse_from(["pagetoned", "-d", "qci:Y:DP:HK"]).is_err());
        assert!(Args::try_parse_from(["pagetoned", "-d", "dtmf:1", "--username", "me"]).is_err());
    }
}
