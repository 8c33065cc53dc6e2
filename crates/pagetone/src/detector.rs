//! Tone pattern detectors
//!
//! Each detector is a small state machine which consumes one
//! block of audio at a time. The detectors are independent:
//! they share no state, and each one measures only the
//! frequencies it cares about.
//!
//! Every detector is split into two halves:
//!
//! 1. **Measurement**: the block is reduced to a handful of
//!    booleans (is the tone present? is it quiet?) and a
//!    sample count. This is the only part that looks at audio.
//!
//! 2. **Transition**: a pure `step()` function maps the current
//!    state, its counters, and the measurement to the next
//!    state, the next counters, and an optional
//!    [transition](DetectorEvent) to report.
//!
//! The transition functions can be driven directly, without any
//! audio, to test timing edge cases.

use std::fmt;

use crate::config::{ConfigError, DetectionConfig};

pub mod dtmf;
pub mod qci;
pub mod qcii;

pub use dtmf::{DtmfDetector, DtmfDigit, DtmfTransition};
pub use qci::{QciDetector, QciTransition};
pub use qcii::{QciiDetector, QciiTransition};

/// A tone pattern detector
pub trait ToneDetector {
    /// Process one block of audio
    ///
    /// The `block` contains mono samples at `input_rate`. The
    /// detector may not retain the block. If the block causes a
    /// change of state, the change is reported. Exactly one of
    /// these events in a recognition cycle will be a detection;
    /// see [`DetectorEvent::is_detection()`].
    fn process(&mut self, block: &[f32], input_rate: u32) -> Option<DetectorEvent>;

    /// Return to the idle state, forgetting any progress
    fn reset(&mut self);
}

/// Any detector
///
/// Built from a [`DetectionConfig`]. The config is validated
/// when the detector is built.
#[derive(Clone, Debug)]
pub enum Detector {
    /// DTMF sequence detector
    Dtmf(DtmfDetector),

    /// QCI pair detector
    Qci(QciDetector),

    /// QCII sequential-tone detector
    Qcii(QciiDetector),
}

impl Detector {
    /// Build the detector for `config`
    pub fn new(config: &DetectionConfig) -> Result<Self, ConfigError> {
        match config {
            DetectionConfig::Dtmf { sequence } => Ok(Self::Dtmf(DtmfDetector::new(sequence)?)),
            DetectionConfig::Qci {
                series,
                first_pair,
                second_pair,
            } => Ok(Self::Qci(QciDetector::new(
                *series,
                *first_pair,
                *second_pair,
            )?)),
            DetectionConfig::Qcii { tone_a, tone_b } => {
                Ok(Self::Qcii(QciiDetector::new(*tone_a, *tone_b)?))
            }
        }
    }
}

impl ToneDetector for Detector {
    fn process(&mut self, block: &[f32], input_rate: u32) -> Option<DetectorEvent> {
        match self {
            Self::Dtmf(det) => det.process(block, input_rate),
            Self::Qci(det) => det.process(block, input_rate),
            Self::Qcii(det) => det.process(block, input_rate),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Dtmf(det) => det.reset(),
            Self::Qci(det) => det.reset(),
            Self::Qcii(det) => det.reset(),
        }
    }
}

/// Detector state change
///
/// Wraps the protocol-specific transition. Most transitions are
/// diagnostic only. A transition for which
/// [`is_detection()`](#method.is_detection) is true means the
/// pattern was recognized.
#[derive(Clone, Debug, PartialEq)]
pub enum DetectorEvent {
    /// DTMF transition
    Dtmf(DtmfTransition),

    /// QCI transition
    Qci(QciTransition),

    /// QCII transition
    Qcii(QciiTransition),
}

impl DetectorEvent {
    /// True if the pattern was recognized
    pub fn is_detection(&self) -> bool {
        match self {
            Self::Dtmf(evt) => *evt == DtmfTransition::SequenceDetected,
            Self::Qci(evt) => *evt == QciTransition::Detected,
            Self::Qcii(evt) => matches!(evt, QciiTransition::Detected { .. }),
        }
    }
}

impl From<DtmfTransition> for DetectorEvent {
    fn from(inp: DtmfTransition) -> Self {
        Self::Dtmf(inp)
    }
}

impl From<QciTransition> for DetectorEvent {
    fn from(inp: QciTransition) -> Self {
        Self::Qci(inp)
    }
}

impl From<QciiTransition> for DetectorEvent {
    fn from(inp: QciiTransition) -> Self {
        Self::Qcii(inp)
    }
}

impl AsRef<str> for DetectorEvent {
    fn as_ref(&self) -> &str {
        match self {
            Self::Dtmf(_) => "DTMF",
            Self::Qci(_) => "QCI",
            Self::Qcii(_) => "QCII",
        }
    }
}

impl fmt::Display for DetectorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dtmf(evt) => write!(f, "[{}]: {}", self.as_ref(), evt),
            Self::Qci(evt) => write!(f, "[{}]: {}", self.as_ref(), evt),
            Self::Qcii(evt) => write!(f, "[{}]: {}", self.as_ref(), evt),
        }
    }
}

/// Convert a duration to a whole number of samples
#[inline]
pub(crate) fn seconds_to_samples(secs: f32, input_rate: u32) -> u64 {
    (secs as f64 * input_rate as f64).round() as u64
}

/// Convert a sample count to seconds
#[inline]
pub(crate) fn samples_to_seconds(samples: u64, input_rate: u32) -> f32 {
    (samples as f64 / input_rate as f64) as f32
}
