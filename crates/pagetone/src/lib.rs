//! # pagetone: two-tone paging and DTMF detection
//!
//! This crate listens to an audio stream for the signaling tones
//! used by radio paging and dispatch systems:
//!
//! * **Motorola Quick Call II** (QCII): sequential two-tone pages.
//!   Tone A is held for about one second, then tone B for about
//!   two seconds.
//! * **Motorola Quick Call I** (QCI): two *pairs* of simultaneous
//!   tones separated by a brief silence. Tones are named by letter
//!   within the A, B, or Z tone series.
//! * **DTMF** digit sequences, like `*123#`.
//!
//! Any number of patterns may be watched on one audio stream. Each
//! has its own independent detector, and each detection is
//! reported with the index of the pattern that matched.
//!
//! ## Disclaimer
//!
//! This crate is dual-licensed MIT and Apache 2.0. Read these licenses
//! carefully as they may affect your rights.
//!
//! This crate has not been certified for any purpose. The author
//! **strongly discourages** its use in any safety-critical
//! applications. Do not rely on it as your only means of receiving
//! a page.
//!
//! ## Example
//!
//! If you already have mono `f32` audio, build a
//! [`ToneReceiver`] and feed it blocks of audio:
//!
//! ```
//! use pagetone::{waveform, DetectionConfig, ToneEvent, ToneReceiverBuilder};
//!
//! let configs: Vec<DetectionConfig> = ["dtmf:*123#", "qci:Z:DP:HK", "qcii:569.1:1687.2"]
//!     .iter()
//!     .map(|s| s.parse().expect("bad config"))
//!     .collect();
//!
//! let mut rx = ToneReceiverBuilder::new(8000)
//!     .with_configs(configs.iter().cloned())
//!     .build()
//!     .expect("bad config");
//!
//! // some audio which contains the QCI page
//! let audio = waveform::synthesize(&configs[1], 8000, 160).unwrap();
//!
//! for evt in rx.iter(audio.chunks(160)) {
//!     match evt {
//!         ToneEvent::Detection { config_index } => {
//!             assert_eq!(1, config_index);
//!             println!("page: {}", configs[config_index]);
//!         }
//!         _ => {}
//!     }
//! }
//! ```
//!
//! The detectors measure tone durations in whole blocks, so
//! blocks should be short: 10 – 20 ms works well. Tone energy
//! thresholds assume full-scale audio is near ±1.0 and that
//! blocks are about this length.
//!
//! To listen to a file or a network stream, use a
//! [`DetectionService`]. The service decodes any input that
//! `ffmpeg` understands. `ffmpeg` must be installed separately.
//!
//! ```no_run
//! use pagetone::{DetectionConfig, DetectionService, LiveStream, ToneEvent};
//!
//! let cfg: DetectionConfig = "qcii:569.1:1687.2".parse().expect("bad config");
//! let mut svc = DetectionService::new([cfg]).expect("bad config");
//! svc.start_detection(LiveStream::new(
//!     "https://audio.example.com/fire-dispatch",
//!     "listener",
//!     "hunter2",
//! ));
//!
//! while let Some(evt) = svc.next_event() {
//!     match evt {
//!         ToneEvent::Detection { config_index } => println!("paged: #{}", config_index),
//!         ToneEvent::Error(err) => {
//!             eprintln!("{}", err);
//!             break;
//!         }
//!         ToneEvent::Debug(_) => {}
//!     }
//! }
//! svc.stop_detection();
//! ```
//!
//! ## Background
//!
//! Two-tone sequential paging lets a dispatcher alert one pager,
//! or one group of pagers, on a shared voice channel. Each pager
//! is programmed with its own tone pattern. The pattern is sent
//! before the voice message. Only the pagers which recognize it
//! open their speakers.
//!
//! Each tone is recognized by measuring the energy at its exact
//! frequency with the [Goertzel algorithm](energy). Detectors then
//! track how long each tone has been present, with some tolerance
//! for imperfect timing.

mod builder;
mod config;
mod goertzel;
mod ingest;
mod receiver;
mod service;

pub mod detector;
pub mod tones;
pub mod waveform;

pub use builder::{ToneReceiverBuilder, TranscoderOptions};
pub use config::{ConfigError, DetectionConfig};
pub use detector::{
    Detector, DetectorEvent, DtmfDetector, DtmfDigit, DtmfTransition, QciDetector, QciTransition,
    QciiDetector, QciiTransition, ToneDetector,
};
pub use goertzel::{energies, energy};
pub use ingest::{command_args, IngestError, Input, LiveStream, Notice, SampleBuffer, Transcoder};
pub use receiver::{BlockIter, ToneEvent, ToneReceiver};
pub use service::{DetectionService, Events};
pub use tones::QciSeries;
