//! Transcoder subprocess and reader thread

#[cfg(not(test))]
use log::{debug, info, warn};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as info;
#[cfg(test)]
use std::println as warn;

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use super::{IngestError, Input, SampleBuffer};
use crate::builder::TranscoderOptions;

/// Transcoder output
#[derive(Clone, Debug)]
pub enum Notice {
    /// Decoded samples, in order
    Samples(Vec<f32>),

    /// One read overflowed the buffer, and this many of the
    /// oldest bytes were lost
    Overflow(usize),

    /// The transcoder has started with this command line
    Started(String),

    /// Diagnostic output from the transcoder
    Stderr(String),

    /// Acquisition failed
    Error(IngestError),

    /// No more audio
    End,
}

// reader and stderr threads to consumer
#[derive(Debug)]
enum Wake {
    Data,
    Stderr(String),
    Failed(IngestError),
    Eof,
}

/// Transcoder arguments
///
/// Arguments which make `ffmpeg` decode the `input` to mono
/// `f32le` samples at `input_rate` on its standard output.
///
/// ```
/// use pagetone::{command_args, Input, TranscoderOptions};
///
/// let mut opts = TranscoderOptions::default();
/// opts.with_realtime(false);
///
/// let args = command_args(&Input::from("page.wav"), 8000, &opts);
/// assert_eq!(
///     "-hide_banner -loglevel error -i page.wav -ac 1 -ar 8000 -f f32le pipe:1",
///     args.join(" ")
/// );
/// ```
pub fn command_args(input: &Input, input_rate: u32, options: &TranscoderOptions) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];
    if options.realtime() {
        args.push("-re".into());
    }
    if let Some(auth) = input.authorization() {
        args.push("-headers".into());
        args.push(format!("Authorization: {}\r\n", auth));
    }

    args.push("-i".into());
    if input.is_stdin() {
        args.push("pipe:0".into());
    } else {
        args.push(input.location().to_owned());
    }

    args.extend(
        [
            "-ac".to_owned(),
            "1".to_owned(),
            "-ar".to_owned(),
            input_rate.to_string(),
            "-f".to_owned(),
            "f32le".to_owned(),
            "pipe:1".to_owned(),
        ]
        .into_iter(),
    );
    args
}

/// Decoded audio source
///
/// Runs the transcoder and a reader thread which moves its
/// output into a bounded [`SampleBuffer`]. The reader never
/// waits on the consumer: if the consumer falls behind, the
/// oldest audio is discarded and an
/// [`Overflow`](Notice::Overflow) is reported.
///
/// Notices are received in order with
/// [`recv_deadline()`](Transcoder::recv_deadline). The last
/// notice is always [`End`](Notice::End).
///
/// The transcoder is stopped when dropped.
#[derive(Debug)]
pub struct Transcoder {
    child: Option<Child>,
    buffer: Arc<Mutex<SampleBuffer>>,
    pending: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    rx: Receiver<Wake>,
    reader: Option<JoinHandle<()>>,
    stderr: Option<JoinHandle<()>>,
    backlog: VecDeque<Notice>,
    last_stderr: Option<String>,
    errored: bool,
    finished: bool,
}

impl Transcoder {
    /// Start the transcoder
    ///
    /// Spawns the transcoder program from `options` to decode
    /// `input` at the given `input_rate`. The first notice is
    /// [`Started`](Notice::Started).
    pub fn spawn(
        input: &Input,
        input_rate: u32,
        options: &TranscoderOptions,
    ) -> Result<Self, IngestError> {
        let program = options.program();
        let args = command_args(input, input_rate, options);
        let stdin = if input.is_stdin() {
            Stdio::inherit()
        } else {
            Stdio::null()
        };

        let mut child = Command::new(program)
            .args(&args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| IngestError::spawn(program, err))?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(IngestError::spawn(
                    program,
                    io::Error::new(io::ErrorKind::BrokenPipe, "no standard output"),
                ));
            }
        };
        let stderr = child.stderr.take();

        let cmdline = display_command(program, &args);
        info!("transcoder: started: {}", cmdline);

        let mut out = match Self::start(stdout, stderr, options) {
            Ok(out) => out,
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(err);
            }
        };
        out.child = Some(child);
        out.backlog.push_back(Notice::Started(cmdline));
        Ok(out)
    }

    /// Read already-decoded audio
    ///
    /// The `reader` must produce mono `f32le` samples at the
    /// receiver's input rate. No subprocess is started.
    pub fn from_reader<R>(reader: R, options: &TranscoderOptions) -> Result<Self, IngestError>
    where
        R: Read + Send + 'static,
    {
        Self::start(reader, None, options)
    }

    /// Receive the next notice
    ///
    /// Waits until the `deadline` for the next notice, or
    /// forever if there is no deadline. Returns `None` if the
    /// deadline passes or if the [`End`](Notice::End) has
    /// already been received.
    pub fn recv_deadline(&mut self, deadline: Option<Instant>) -> Option<Notice> {
        loop {
            if let Some(notice) = self.backlog.pop_front() {
                return Some(notice);
            }
            if self.finished {
                return None;
            }

            let wake = match deadline {
                Some(deadline) => self.rx.recv_deadline(deadline),
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match wake {
                Ok(wake) => self.wake(wake),
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => self.finish(),
            }
        }
    }

    /// True once every notice, including the end, is received
    pub fn is_finished(&self) -> bool {
        self.finished && self.backlog.is_empty()
    }

    /// Stop immediately
    ///
    /// Kills the transcoder, waits for it to exit, and
    /// discards all buffered audio and undelivered notices.
    /// Does nothing if already stopped.
    ///
    /// A reader given to [`from_reader()`](Transcoder::from_reader)
    /// cannot be interrupted. If its thread is still blocked
    /// reading, it is detached and exits after its next read.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);

        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            join(self.reader.take());
            join(self.stderr.take());
            info!("transcoder: stopped");
        } else if let Some(reader) = self.reader.take() {
            if reader.is_finished() {
                join(Some(reader));
            }
        }

        lock(&self.buffer).clear();
        self.backlog.clear();
        self.finished = true;
    }

    fn start<R>(
        reader: R,
        stderr: Option<ChildStderr>,
        options: &TranscoderOptions,
    ) -> Result<Self, IngestError>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = unbounded();
        let buffer = Arc::new(Mutex::new(SampleBuffer::new(options.buffer_bytes())));
        let pending = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));

        let stderr = match stderr {
            Some(stderr) => {
                let tx = tx.clone();
                Some(
                    thread::Builder::new()
                        .name("pagetone-stderr".to_owned())
                        .spawn(move || stderr_loop(stderr, tx))?,
                )
            }
            None => None,
        };

        let reader = {
            let chunk_bytes = options.chunk_bytes();
            let buffer = buffer.clone();
            let pending = pending.clone();
            let stop = stop.clone();
            thread::Builder::new()
                .name("pagetone-reader".to_owned())
                .spawn(move || read_loop(reader, chunk_bytes, buffer, pending, stop, tx))?
        };

        Ok(Self {
            child: None,
            buffer,
            pending,
            stop,
            rx,
            reader: Some(reader),
            stderr,
            backlog: VecDeque::new(),
            last_stderr: None,
            errored: false,
            finished: false,
        })
    }

    fn wake(&mut self, wake: Wake) {
        match wake {
            Wake::Data => {
                self.pending.store(false, Ordering::Release);
                let (samples, overflows) = {
                    let mut buf = lock(&self.buffer);
                    (buf.take_samples(), buf.take_overflows())
                };
                self.backlog
                    .extend(overflows.into_iter().map(Notice::Overflow));
                if !samples.is_empty() {
                    self.backlog.push_back(Notice::Samples(samples));
                }
            }
            Wake::Stderr(line) => {
                self.last_stderr = Some(line.clone());
                self.backlog.push_back(Notice::Stderr(line));
            }
            Wake::Failed(err) => {
                self.errored = true;
                self.backlog.push_back(Notice::Error(err));
            }
            Wake::Eof => self.finish(),
        }
    }

    // end of stream: collect the transcoder's exit status
    fn finish(&mut self) {
        self.wake(Wake::Data);
        join(self.reader.take());

        if let Some(mut child) = self.child.take() {
            let status = child.wait();
            join(self.stderr.take());
            while let Ok(wake) = self.rx.try_recv() {
                if let Wake::Stderr(line) = wake {
                    self.wake(Wake::Stderr(line));
                }
            }

            match status {
                Ok(status) if !status.success() && !self.errored => {
                    let message = self
                        .last_stderr
                        .clone()
                        .unwrap_or_else(|| "no diagnostic output".to_owned());
                    self.backlog
                        .push_back(Notice::Error(IngestError::Exit { status, message }));
                }
                Err(err) if !self.errored => {
                    self.backlog.push_back(Notice::Error(err.into()));
                }
                _ => {}
            }
            info!("transcoder: exited");
        }

        self.backlog.push_back(Notice::End);
        self.finished = true;
    }
}

impl Drop for Transcoder {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop<R>(
    mut reader: R,
    chunk_bytes: usize,
    buffer: Arc<Mutex<SampleBuffer>>,
    pending: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    tx: Sender<Wake>,
) where
    R: Read,
{
    let mut chunk = vec![0u8; chunk_bytes];
    while !stop.load(Ordering::Acquire) {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                let dropped = lock(&buffer).push(&chunk[0..n]);
                if dropped > 0 {
                    warn!("transcoder: buffer overflow: dropped {} bytes", dropped);
                }
                if !pending.swap(true, Ordering::AcqRel) && tx.send(Wake::Data).is_err() {
                    return;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                let _ = tx.send(Wake::Failed(err.into()));
                break;
            }
        }
    }

    debug!("transcoder: end of audio");
    let _ = tx.send(Wake::Eof);
}

fn stderr_loop(stderr: ChildStderr, tx: Sender<Wake>) {
    for line in BufReader::new(stderr).lines() {
        let line = match line {
            Ok(line) => line.trim_end().to_owned(),
            Err(_) => break,
        };
        if line.is_empty() {
            continue;
        }

        debug!("transcoder: {}", line);
        if tx.send(Wake::Stderr(line)).is_err() {
            break;
        }
    }
}

// command line for display, without credentials
fn display_command(program: &str, args: &[String]) -> String {
    let mut out = program.to_owned();
    for arg in args {
        let arg = if arg.starts_with("Authorization:") {
            "Authorization: Basic <redacted>"
        } else {
            arg.as_str()
        };

        out.push(' ');
        if arg.contains(char::is_whitespace) {
            out.push('"');
            out.push_str(arg);
            out.push('"');
        } else {
            out.push_str(arg);
        }
    }
    out
}

fn lock(buffer: &Mutex<SampleBuffer>) -> MutexGuard<'_, SampleBuffer> {
    buffer.lock().unwrap_or_else(PoisonError::into_inner)
}

fn join(handle: Option<JoinHandle<()>>) {
    if let Some(handle) = handle {
        let _ = handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use crate::ingest::LiveStream;

    fn le_bytes(samples: &[f32]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn drain(tc: &mut Transcoder) -> Vec<Notice> {
        let mut out = vec![];
        while let Some(notice) = tc.recv_deadline(None) {
            out.push(notice);
        }
        out
    }

    #[test]
    fn test_command_args() {
        let opts = TranscoderOptions::default();
        let input = Input::from(LiveStream::new("https://feed/1", "me", "secret"));

        let args = command_args(&input, 8000, &opts);
        assert_eq!(
            vec![
                "-hide_banner",
                "-loglevel",
                "error",
                "-re",
                "-headers",
                "Authorization: Basic bWU6c2VjcmV0\r\n",
                "-i",
                "https://feed/1",
                "-ac",
                "1",
                "-ar",
                "8000",
                "-f",
                "f32le",
                "pipe:1"
            ],
            args
        );

        let shown = display_command("ffmpeg", &args);
        assert!(shown.starts_with("ffmpeg -hide_banner -loglevel error -re -headers"));
        assert!(shown.contains("\"Authorization: Basic <redacted>\""));
        assert!(!shown.contains("bWU6c2VjcmV0"));

        let args = command_args(&Input::from("-"), 16000, &opts);
        assert!(args.contains(&"pipe:0".to_owned()));
        assert!(args.contains(&"16000".to_owned()));
    }

    #[test]
    fn test_from_reader() {
        let samples: Vec<f32> = (0..1000).map(|s| s as f32).collect();
        let mut opts = TranscoderOptions::default();
        opts.with_chunk_bytes(7 * 4 + 3);

        let mut tc = Transcoder::from_reader(Cursor::new(le_bytes(&samples)), &opts).unwrap();
        let notices = drain(&mut tc);

        let mut got = vec![];
        for notice in notices.iter() {
            match notice {
                Notice::Samples(s) => got.extend_from_slice(s),
                Notice::End => {}
                _ => unreachable!(),
            }
        }
        assert_eq!(samples, got);
        assert!(matches!(notices.last(), Some(Notice::End)));
        assert!(tc.is_finished());
        assert!(tc.recv_deadline(None).is_none());
    }

    #[test]
    fn test_overflow_accounting() {
        let samples: Vec<f32> = (0..4096).map(|s| s as f32).collect();
        let mut opts = TranscoderOptions::default();
        opts.with_chunk_bytes(16).with_buffer_bytes(32);

        let mut tc = Transcoder::from_reader(Cursor::new(le_bytes(&samples)), &opts).unwrap();

        // fall behind, so that most reads overflow
        std::thread::sleep(std::time::Duration::from_millis(200));

        let mut got: Vec<f32> = vec![];
        let mut overflows = vec![];
        for notice in drain(&mut tc) {
            match notice {
                Notice::Samples(s) => got.extend(s),
                Notice::Overflow(n) => overflows.push(n),
                Notice::End => {}
                _ => unreachable!(),
            }
        }

        // one notice per overflowing read, each losing one read
        assert!(overflows.len() > 1);
        assert!(overflows.iter().all(|n| *n == 16));

        // every byte is delivered or reported lost, in order
        let dropped: usize = overflows.iter().sum();
        assert_eq!(samples.len() * 4, got.len() * 4 + dropped);
        assert!(got.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(Some(&4095.0f32), got.last());
    }

    #[test]
    fn test_stop() {
        let samples = vec![0.5f32; 4000];
        let mut tc =
            Transcoder::from_reader(Cursor::new(le_bytes(&samples)), &TranscoderOptions::default())
                .unwrap();
        tc.stop();
        tc.stop();
        assert!(tc.is_finished());
        assert!(tc.recv_deadline(None).is_none());
    }

    #[test]
    fn test_spawn_failure() {
        let mut opts = TranscoderOptions::default();
        opts.with_program("/nonexistent/pagetone/ffmpeg");
        match Transcoder::spawn(&Input::from("x.wav"), 8000, &opts) {
            Err(IngestError::Spawn { program, .. }) => {
                assert_eq!("/nonexistent/pagetone/ffmpeg", program)
            }
            _ => unreachable!(),
        }
    }
}
