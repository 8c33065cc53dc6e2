//! Detection service: transcoder plus receiver

#[cfg(not(test))]
use log::{error, info};

#[cfg(test)]
use std::println as error;
#[cfg(test)]
use std::println as info;

use std::collections::VecDeque;
use std::io::Read;
use std::time::{Duration, Instant};

use crate::builder::{ToneReceiverBuilder, TranscoderOptions};
use crate::config::{ConfigError, DetectionConfig};
use crate::ingest::{IngestError, Input, Notice, Transcoder};
use crate::receiver::{ToneEvent, ToneReceiver};

/// Live tone detection service
///
/// Decodes audio from an [`Input`] and runs every configured
/// detector on it. Events are received with
/// [`next_event()`](DetectionService::next_event) or one of its
/// variants.
///
/// ```no_run
/// use pagetone::{DetectionConfig, DetectionService, ToneEvent};
///
/// let mut svc = DetectionService::new([
///     DetectionConfig::dtmf("*123#"),
///     DetectionConfig::qci('Z', ['d', 'p'], ['h', 'k']),
/// ])
/// .expect("bad config");
///
/// svc.start_detection("https://example.com/scanner-feed");
/// for evt in svc.events() {
///     match evt {
///         ToneEvent::Detection { config_index } => println!("page #{}", config_index),
///         ToneEvent::Error(err) => eprintln!("stream failed: {}", err),
///         ToneEvent::Debug(_) => {}
///     }
/// }
/// ```
///
/// Detectors receive blocks of exactly
/// [`block_len()`](TranscoderOptions::block_len) samples, however
/// the audio happens to arrive. Starting detection while it is
/// already running stops the previous run first. Stopping is
/// always safe. Every run starts from idle detectors and an
/// empty buffer.
#[derive(Debug)]
pub struct DetectionService {
    receiver: ToneReceiver,
    options: TranscoderOptions,
    transcoder: Option<Transcoder>,
    pending: VecDeque<ToneEvent>,
    carry: Vec<f32>,
}

impl DetectionService {
    /// Service for the given detection configs
    ///
    /// Uses the default input rate of 8000 Hz and the default
    /// [`TranscoderOptions`]. Fails if any config is invalid.
    pub fn new<I>(configs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = DetectionConfig>,
    {
        let receiver = ToneReceiverBuilder::default()
            .with_configs(configs)
            .build()?;
        Ok(Self::from_receiver(receiver))
    }

    /// Service for a receiver you have built
    pub fn from_receiver(receiver: ToneReceiver) -> Self {
        Self {
            receiver,
            options: TranscoderOptions::default(),
            transcoder: None,
            pending: VecDeque::new(),
            carry: Vec::new(),
        }
    }

    /// Set transcoder options
    ///
    /// Takes effect at the next start.
    pub fn with_options(&mut self, options: TranscoderOptions) -> &mut Self {
        self.options = options;
        self
    }

    /// Start detecting from `input`
    ///
    /// Stops any previous run. If the transcoder cannot be
    /// started, the failure is reported as the next
    /// [`ToneEvent::Error`].
    pub fn start_detection<I>(&mut self, input: I)
    where
        I: Into<Input>,
    {
        let input = input.into();
        self.stop_detection();

        info!("service: starting detection from {}", input);
        let started = Transcoder::spawn(&input, self.receiver.input_rate(), &self.options);
        self.started(started);
    }

    /// Start detecting from decoded audio
    ///
    /// The `reader` must produce mono `f32le` samples at the
    /// [`input_rate()`](ToneReceiver::input_rate). No
    /// transcoder is used. Stops any previous run.
    pub fn start_reader<R>(&mut self, reader: R)
    where
        R: Read + Send + 'static,
    {
        self.stop_detection();

        info!("service: starting detection from decoded audio");
        let started = Transcoder::from_reader(reader, &self.options);
        self.started(started);
    }

    /// Stop detecting
    ///
    /// Stops the transcoder and discards any buffered audio and
    /// undelivered events. Detectors return to idle. Does
    /// nothing if not running.
    pub fn stop_detection(&mut self) {
        if let Some(mut transcoder) = self.transcoder.take() {
            transcoder.stop();
            info!("service: stopped detection");
        }
        self.receiver.reset();
        self.pending.clear();
        self.carry.clear();
    }

    /// True if audio may still arrive
    pub fn is_running(&self) -> bool {
        match &self.transcoder {
            Some(transcoder) => !transcoder.is_finished(),
            None => false,
        }
    }

    /// The receiver
    pub fn receiver(&self) -> &ToneReceiver {
        &self.receiver
    }

    /// Wait for the next event
    ///
    /// Blocks until an event is available. Returns `None` once
    /// the run has ended and every event has been received, or
    /// if detection was never started.
    pub fn next_event(&mut self) -> Option<ToneEvent> {
        self.poll(None)
    }

    /// Next event, if one is ready
    ///
    /// Never blocks.
    pub fn try_next_event(&mut self) -> Option<ToneEvent> {
        self.poll(Some(Instant::now()))
    }

    /// Wait at most `timeout` for the next event
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<ToneEvent> {
        self.poll(Some(Instant::now() + timeout))
    }

    /// Iterator over events
    ///
    /// The iterator blocks like
    /// [`next_event()`](DetectionService::next_event) and ends
    /// when the run ends.
    pub fn events(&mut self) -> Events<'_> {
        Events { service: self }
    }

    fn started(&mut self, started: Result<Transcoder, IngestError>) {
        match started {
            Ok(transcoder) => self.transcoder = Some(transcoder),
            Err(err) => {
                error!("service: {}", err);
                self.pending.push_back(ToneEvent::Error(err));
            }
        }
    }

    fn poll(&mut self, deadline: Option<Instant>) -> Option<ToneEvent> {
        let block_len = self.options.block_len();
        loop {
            if let Some(evt) = self.pending.pop_front() {
                return Some(evt);
            }

            let transcoder = self.transcoder.as_mut()?;
            match transcoder.recv_deadline(deadline)? {
                Notice::Samples(samples) => {
                    // detectors always see whole blocks
                    self.carry.extend(samples);
                    let whole = self.carry.len() / block_len * block_len;
                    for block in self.carry[0..whole].chunks(block_len) {
                        self.pending.extend(self.receiver.process(block));
                    }
                    self.carry.drain(0..whole);
                }
                Notice::Overflow(bytes) => self.pending.push_back(ToneEvent::Debug(format!(
                    "buffer overflow: discarded {} bytes of the oldest audio",
                    bytes
                ))),
                Notice::Started(cmdline) => self
                    .pending
                    .push_back(ToneEvent::Debug(format!("started: {}", cmdline))),
                Notice::Stderr(line) => self
                    .pending
                    .push_back(ToneEvent::Debug(format!("transcoder: {}", line))),
                Notice::Error(err) => {
                    error!("service: {}", err);
                    self.pending.push_back(ToneEvent::Error(err));
                }
                Notice::End => {
                    if !self.carry.is_empty() {
                        let rest = std::mem::take(&mut self.carry);
                        self.pending.extend(self.receiver.process(&rest));
                    }
                    info!(
                        "service: end of stream after {} samples",
                        self.receiver.input_sample_counter()
                    );
                    self.pending
                        .push_back(ToneEvent::Debug("end of stream".to_owned()));
                }
            }
        }
    }
}

impl Drop for DetectionService {
    fn drop(&mut self) {
        self.stop_detection();
    }
}

/// Blocking iterator over service events
///
/// Created by [`DetectionService::events()`].
#[derive(Debug)]
pub struct Events<'svc> {
    service: &'svc mut DetectionService,
}

impl<'svc> Iterator for Events<'svc> {
    type Item = ToneEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.service.next_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use crate::waveform;

    fn le_bytes(samples: &[f32]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_not_started() {
        let mut svc = DetectionService::new([DetectionConfig::dtmf("1")]).unwrap();
        assert!(!svc.is_running());
        assert!(svc.next_event().is_none());
        assert!(svc.try_next_event().is_none());
        svc.stop_detection();
        svc.stop_detection();
        assert!(!svc.is_running());
    }

    #[test]
    fn test_invalid_config() {
        let err = DetectionService::new([
            DetectionConfig::dtmf("1"),
            DetectionConfig::dtmf("1"),
            DetectionConfig::dtmf(""),
        ])
        .unwrap_err();
        assert_eq!(ConfigError::EmptySequence.at_index(2), err);
    }

    #[test]
    fn test_reader_detects() {
        let cfg = DetectionConfig::qci('Z', ['d', 'p'], ['h', 'k']);
        let audio = waveform::synthesize(&cfg, 8000, 160).unwrap();

        let mut svc = DetectionService::new([DetectionConfig::dtmf("*1"), cfg]).unwrap();
        svc.start_reader(Cursor::new(le_bytes(&audio)));

        let events: Vec<ToneEvent> = svc.events().collect();
        let found: Vec<usize> = events.iter().filter_map(|e| e.detection_index()).collect();
        assert_eq!(vec![1], found);
        assert!(matches!(events.last(), Some(ToneEvent::Debug(msg)) if msg == "end of stream"));
        assert!(!svc.is_running());
        assert_eq!(audio.len() as u64, svc.receiver().input_sample_counter());
        assert!(svc.next_event().is_none());

        svc.stop_detection();
        assert_eq!(0, svc.receiver().input_sample_counter());
    }

    #[test]
    fn test_spawn_failure_is_event() {
        let mut opts = TranscoderOptions::default();
        opts.with_program("/nonexistent/pagetone/ffmpeg");

        let mut svc = DetectionService::new([DetectionConfig::dtmf("1")]).unwrap();
        svc.with_options(opts);
        svc.start_detection("page.wav");

        assert!(!svc.is_running());
        assert!(svc.next_event().map(|e| e.is_error()).unwrap_or(false));
        assert!(svc.next_event().is_none());
    }
}
