//! Motorola QCII (sequential two-tone) detector
//!
//! A QCII page is tone A for about one second, immediately
//! followed by tone B for about two seconds. Each tone must be
//! *dominant*: its energy must clear [`TONE_THRESHOLD`] and
//! exceed the energy of the other tone.
//!
//! Elapsed time runs continuously from the onset of tone A. It
//! is not reset when tone B begins.

use std::fmt;

#[cfg(not(test))]
use log::{debug, trace};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as trace;

use super::{samples_to_seconds, seconds_to_samples, DetectorEvent, ToneDetector};
use crate::config::ConfigError;
use crate::goertzel::energy;

/// Dominant tone must exceed this energy
pub const TONE_THRESHOLD: f32 = 50.0;

const ONSET_BLOCKS: u32 = 3;

const FIRST_TONE_MIN_SECS: f32 = 0.9;
const FIRST_TONE_MAX_SECS: f32 = 1.2;
const TOTAL_SECS: f32 = 3.2;

/// QCII detector state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QciiState {
    /// Waiting for tone A
    Idle,

    /// Tone A is dominant
    FirstTone,

    /// Tone B is dominant
    SecondTone,
}

/// QCII detector counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QciiCounters {
    /// Consecutive blocks with tone A dominant
    pub onset_blocks: u32,

    /// Samples since the onset of tone A was confirmed
    pub elapsed: u64,
}

/// Measurements from one block
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QciiObservation {
    /// Tone A is dominant
    pub tone_a: bool,

    /// Tone B is dominant
    pub tone_b: bool,

    /// Block length, in samples
    pub samples: u64,
}

/// QCII timing limits, in samples
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QciiTiming {
    /// Tone B is accepted once tone A has been held this long
    pub first_tone_min: u64,

    /// Tone A held this long is invalid
    pub first_tone_max: u64,

    /// Detection requires this much time since tone A onset
    pub total: u64,
}

impl QciiTiming {
    /// Timing limits at the given sampling rate
    pub fn new(input_rate: u32) -> Self {
        Self {
            first_tone_min: seconds_to_samples(FIRST_TONE_MIN_SECS, input_rate),
            first_tone_max: seconds_to_samples(FIRST_TONE_MAX_SECS, input_rate),
            total: seconds_to_samples(TOTAL_SECS, input_rate),
        }
    }
}

/// QCII state transition
#[derive(Clone, Debug, PartialEq)]
pub enum QciiTransition {
    /// Tone A onset confirmed
    FirstToneStarted,

    /// Neither tone is dominant
    ToneLost,

    /// Tone A held past its maximum duration
    FirstToneTooLong,

    /// Tone B became dominant
    SecondToneStarted {
        /// Time since tone A onset, in seconds
        secs: f32,
    },

    /// Tone B ceased to be dominant before detection
    SecondToneLost {
        /// Time since tone A onset, in seconds
        secs: f32,
    },

    /// Both tones received
    Detected {
        /// Time since tone A onset, in seconds
        secs: f32,
    },
}

impl fmt::Display for QciiTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstToneStarted => write!(f, "first tone started"),
            Self::ToneLost => write!(f, "lost both tones"),
            Self::FirstToneTooLong => write!(f, "first tone exceeded duration"),
            Self::SecondToneStarted { secs } => {
                write!(f, "transitioning to second tone after {:.3} s", secs)
            }
            Self::SecondToneLost { secs } => {
                write!(f, "second tone lost prematurely after {:.3} s", secs)
            }
            Self::Detected { secs } => {
                write!(f, "detection complete after {:.3} s of audio", secs)
            }
        }
    }
}

/// QCII state transition function
///
/// Tone B becoming dominant before tone A has been held for
/// its minimum duration is tolerated: the detector remains in
/// `FirstTone` and accepts tone B once the minimum is reached.
pub fn step(
    state: QciiState,
    counters: QciiCounters,
    obs: &QciiObservation,
    timing: &QciiTiming,
    input_rate: u32,
) -> (QciiState, QciiCounters, Option<QciiTransition>) {
    let mut c = counters;
    if state != QciiState::Idle {
        c.elapsed += obs.samples;
    }

    let secs = samples_to_seconds(c.elapsed, input_rate);
    let idle = |why: QciiTransition| (QciiState::Idle, QciiCounters::default(), Some(why));

    match state {
        QciiState::Idle => {
            if !(obs.tone_a && !obs.tone_b) {
                return (QciiState::Idle, QciiCounters::default(), None);
            }

            c.onset_blocks += 1;
            if c.onset_blocks >= ONSET_BLOCKS {
                c.elapsed = 0;
                (
                    QciiState::FirstTone,
                    c,
                    Some(QciiTransition::FirstToneStarted),
                )
            } else {
                (QciiState::Idle, c, None)
            }
        }
        QciiState::FirstTone => {
            if !obs.tone_a && !obs.tone_b {
                idle(QciiTransition::ToneLost)
            } else if !obs.tone_a && obs.tone_b && c.elapsed >= timing.first_tone_min {
                (
                    QciiState::SecondTone,
                    c,
                    Some(QciiTransition::SecondToneStarted { secs }),
                )
            } else if obs.tone_a && c.elapsed >= timing.first_tone_max {
                idle(QciiTransition::FirstToneTooLong)
            } else {
                (QciiState::FirstTone, c, None)
            }
        }
        QciiState::SecondTone => {
            if obs.tone_b && c.elapsed >= timing.total {
                idle(QciiTransition::Detected { secs })
            } else if !obs.tone_b {
                idle(QciiTransition::SecondToneLost { secs })
            } else {
                (QciiState::SecondTone, c, None)
            }
        }
    }
}

/// Motorola QCII detector
///
/// ```
/// use pagetone::QciiDetector;
///
/// let det = QciiDetector::new(569.1, 1687.2).expect("bad tones");
/// assert_eq!((569.1, 1687.2), det.tones());
///
/// assert!(QciiDetector::new(0.0, 1687.2).is_err());
/// assert!(QciiDetector::new(569.1, f32::NAN).is_err());
/// ```
#[derive(Clone, Debug)]
pub struct QciiDetector {
    tone_a: f32,
    tone_b: f32,
    state: QciiState,
    counters: QciiCounters,
}

impl QciiDetector {
    /// Detector for tone A followed by tone B, in Hz
    ///
    /// Both frequencies must be finite and positive.
    pub fn new(tone_a: f32, tone_b: f32) -> Result<Self, ConfigError> {
        for tone in [tone_a, tone_b] {
            if !tone.is_finite() || tone <= 0.0 {
                return Err(ConfigError::InvalidFrequency(tone));
            }
        }

        Ok(Self {
            tone_a,
            tone_b,
            state: QciiState::Idle,
            counters: QciiCounters::default(),
        })
    }

    /// Tone A and tone B frequencies, in Hz
    pub fn tones(&self) -> (f32, f32) {
        (self.tone_a, self.tone_b)
    }

    /// Current state
    pub fn state(&self) -> QciiState {
        self.state
    }

    /// Current counters
    pub fn counters(&self) -> &QciiCounters {
        &self.counters
    }

    fn observe(&self, block: &[f32], input_rate: u32) -> QciiObservation {
        let ea = energy(block, self.tone_a, input_rate);
        let eb = energy(block, self.tone_b, input_rate);

        if self.state != QciiState::Idle {
            trace!("qcii: energy levels - tone A: {:.4} tone B: {:.4}", ea, eb);
        }

        QciiObservation {
            tone_a: ea >= TONE_THRESHOLD && ea > eb,
            tone_b: eb >= TONE_THRESHOLD && eb > ea,
            samples: block.len() as u64,
        }
    }
}

impl ToneDetector for QciiDetector {
    fn process(&mut self, block: &[f32], input_rate: u32) -> Option<DetectorEvent> {
        let obs = self.observe(block, input_rate);
        let (state, counters, out) = step(
            self.state,
            self.counters,
            &obs,
            &QciiTiming::new(input_rate),
            input_rate,
        );
        self.state = state;
        self.counters = counters;

        let out = out?;
        debug!("qcii: {}", out);
        Some(out.into())
    }

    fn reset(&mut self) {
        self.state = QciiState::Idle;
        self.counters = QciiCounters::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    use crate::waveform::{silence, tones};

    const RATE: u32 = 8000;

    // 10 ms blocks
    const BLOCK: usize = 80;

    const TONE_A: f32 = 569.1;
    const TONE_B: f32 = 1687.2;

    fn blocks(freqs: &[f32], count: usize) -> Vec<Vec<f32>> {
        let blk = if freqs.is_empty() {
            silence(BLOCK)
        } else {
            tones(freqs, 0.3, BLOCK, RATE)
        };
        vec![blk; count]
    }

    // tone A in `a` blocks, then tone B in `b` blocks
    fn page(a: usize, b: usize) -> Vec<Vec<f32>> {
        let mut out = blocks(&[], 2);
        out.extend(blocks(&[TONE_A], a));
        out.extend(blocks(&[TONE_B], b));
        out.extend(blocks(&[], 4));
        out
    }

    fn run(det: &mut QciiDetector, blocks: &[Vec<f32>]) -> Vec<QciiTransition> {
        blocks
            .iter()
            .filter_map(|blk| det.process(blk, RATE))
            .map(|evt| match evt {
                DetectorEvent::Qcii(evt) => evt,
                _ => unreachable!(),
            })
            .collect()
    }

    fn detections(out: &[QciiTransition]) -> usize {
        out.iter()
            .filter(|evt| matches!(evt, QciiTransition::Detected { .. }))
            .count()
    }

    #[test]
    fn test_timing() {
        let timing = QciiTiming::new(RATE);
        assert_eq!(7200, timing.first_tone_min);
        assert_eq!(9600, timing.first_tone_max);
        assert_eq!(25600, timing.total);
    }

    #[test]
    fn test_step_early_second_tone() {
        let timing = QciiTiming::new(RATE);
        let obs = QciiObservation {
            tone_a: false,
            tone_b: true,
            samples: BLOCK as u64,
        };

        // tone B is held off until tone A has run long enough
        let start = QciiCounters {
            onset_blocks: 3,
            elapsed: 4000,
        };
        let (st, c, out) = step(QciiState::FirstTone, start, &obs, &timing, RATE);
        assert_eq!(QciiState::FirstTone, st);
        assert_eq!(4080, c.elapsed);
        assert_eq!(None, out);

        let start = QciiCounters {
            onset_blocks: 3,
            elapsed: 7120,
        };
        let (st, c, out) = step(QciiState::FirstTone, start, &obs, &timing, RATE);
        assert_eq!(QciiState::SecondTone, st);
        assert_eq!(7200, c.elapsed);
        assert_eq!(
            Some(QciiTransition::SecondToneStarted { secs: 0.9 }),
            out
        );
    }

    #[test]
    fn test_detect() {
        // tone A for 1.03 s, then tone B until 3.2 s
        let mut det = QciiDetector::new(TONE_A, TONE_B).unwrap();
        let out = run(&mut det, &page(103, 220));

        assert_eq!(1, detections(&out));
        assert_eq!(QciiTransition::FirstToneStarted, out[0]);
        match out[1] {
            QciiTransition::SecondToneStarted { secs } => assert_approx_eq!(1.01, secs, 1e-4),
            _ => unreachable!(),
        }
        match out[2] {
            QciiTransition::Detected { secs } => assert_approx_eq!(3.2, secs, 1e-4),
            _ => unreachable!(),
        }
        assert_eq!(3, out.len());
        assert_eq!(QciiState::Idle, det.state());
        assert_eq!(&QciiCounters::default(), det.counters());

        // and again
        let out = run(&mut det, &page(103, 220));
        assert_eq!(1, detections(&out));
    }

    #[test]
    fn test_second_tone_short() {
        // tone B lost at 3.19 s
        let mut det = QciiDetector::new(TONE_A, TONE_B).unwrap();
        let out = run(&mut det, &page(103, 219));

        assert_eq!(0, detections(&out));
        match out.last() {
            Some(QciiTransition::SecondToneLost { secs }) => assert_approx_eq!(3.2, secs, 1e-4),
            _ => unreachable!(),
        }
        assert_eq!(QciiState::Idle, det.state());
    }

    #[test]
    fn test_first_tone_too_long() {
        let mut det = QciiDetector::new(TONE_A, TONE_B).unwrap();
        let out = run(&mut det, &page(130, 220));

        assert_eq!(0, detections(&out));
        assert!(out.contains(&QciiTransition::FirstToneTooLong));
    }

    #[test]
    fn test_swapped_tones() {
        // B then A is not a page
        let mut det = QciiDetector::new(TONE_B, TONE_A).unwrap();
        let out = run(&mut det, &page(103, 220));

        assert_eq!(0, detections(&out));
        assert_eq!(QciiState::Idle, det.state());
    }

    #[test]
    fn test_dominance() {
        let mix = |strong: f32, weak: f32| -> Vec<f32> {
            let mut out = tones(&[strong], 0.3, BLOCK, RATE);
            for (o, w) in out.iter_mut().zip(tones(&[weak], 0.1, BLOCK, RATE)) {
                *o += w;
            }
            out
        };

        // a weaker tone B does not prevent tone A onset
        let mut det = QciiDetector::new(TONE_A, TONE_B).unwrap();
        let a_over_b = mix(TONE_A, TONE_B);
        for _ in 0..3 {
            det.process(&a_over_b, RATE);
        }
        assert_eq!(QciiState::FirstTone, det.state());

        // but a dominant tone B does
        det.reset();
        let b_over_a = mix(TONE_B, TONE_A);
        for _ in 0..3 {
            assert_eq!(None, det.process(&b_over_a, RATE));
        }
        assert_eq!(QciiState::Idle, det.state());
        assert_eq!(0, det.counters().onset_blocks);
    }
}
