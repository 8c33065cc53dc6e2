//! Spawns child process for a detection

use std::ffi::OsStr;
use std::io;
use std::process::{Child, Command, Stdio};

use chrono::{DateTime, Utc};
use pagetone::DetectionConfig;

/// Spawn a child process to handle the given detection
///
/// The child process will receive information about the
/// detection via the environment. Its standard input is
/// closed.
///
/// This method will attempt to start an executable named
/// `cmd` with the given `args`. The `config_index`, `config`,
/// detection time `at`, and `input_rate_str` (the input
/// sampling rate) are passed as environment variables.
pub fn spawn<C, A, B>(
    cmd: C,
    args: A,
    config_index: usize,
    config: &DetectionConfig,
    at: &DateTime<Utc>,
    input_rate_str: &str,
) -> io::Result<Child>
where
    C: AsRef<OsStr>,
    B: AsRef<OsStr>,
    A: IntoIterator<Item = B>,
{
    Command::new(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .args(args)
        .env(childenv::PAGETONED_RATE, input_rate_str)
        .env(childenv::PAGETONED_INDEX, config_index.to_string())
        .env(childenv::PAGETONED_PROTOCOL, config.protocol())
        .env(childenv::PAGETONED_CONFIG, config.to_string())
        .env(childenv::PAGETONED_TIME, time_to_unix_str(at))
        .spawn()
}

mod childenv {
    /// Decoder input rate
    ///
    /// The audio input `--rate` that pagetoned is running at.
    pub const PAGETONED_RATE: &str = "PAGETONED_RATE";

    /// Index of the detected pattern
    ///
    /// Counts `--detect` patterns from zero, in the order they
    /// were given.
    pub const PAGETONED_INDEX: &str = "PAGETONED_INDEX";

    /// Protocol of the detected pattern
    ///
    /// One of `QCII`, `QCI`, or `DTMF`.
    pub const PAGETONED_PROTOCOL: &str = "PAGETONED_PROTOCOL";

    /// The detected pattern
    ///
    /// ```txt
    /// qci:Z:DP:HK
    /// ```
    pub const PAGETONED_CONFIG: &str = "PAGETONED_CONFIG";

    /// Detection time (UTC UNIX timestamp, in seconds)
    ///
    /// Calculated from the current OS realtime clock.
    pub const PAGETONED_TIME: &str = "PAGETONED_TIME";
}

// convert DateTime to UTC unix timestamp in seconds, as string
fn time_to_unix_str(tm: &DateTime<Utc>) -> String {
    format!("{}", tm.format("%s"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_to_unix_str() {
        let dt: DateTime<Utc> = DateTime::parse_from_rfc2822("Wed, 18 Feb 2015 23:16:09 GMT")
            .unwrap()
            .into();
        assert_eq!(time_to_unix_str(&dt), "1424301369");
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_environment() {
        let cfg: DetectionConfig = "qci:z:dp:hk".parse().unwrap();
        let at: DateTime<Utc> = DateTime::parse_from_rfc2822("Wed, 18 Feb 2015 23:16:09 GMT")
            .unwrap()
            .into();

        let mut child = spawn(
            "sh",
            [
                "-c",
                "test \"$PAGETONED_RATE $PAGETONED_INDEX $PAGETONED_PROTOCOL $PAGETONED_CONFIG $PAGETONED_TIME\" = \"8000 3 QCI qci:Z:DP:HK 1424301369\"",
            ],
            3,
            &cfg,
            &at,
            "8000",
        )
        .expect("unable to spawn sh");
        assert!(child.wait().unwrap().success());
    }
}
