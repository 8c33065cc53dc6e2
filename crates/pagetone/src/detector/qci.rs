//! Motorola QCI (letter-coded two-tone) detector
//!
//! A QCI page is a pair of simultaneous tones, a brief silence,
//! and a second pair of simultaneous tones. The tones are named
//! by letter within a [tone series](crate::tones::QciSeries).
//!
//! ```txt
//!  +------+  3 blocks  +-----------+  lost ≥ 0.9 s  +---------+
//!  | Idle | =========> | FirstPair | =============> | Silence |
//!  +------+   pair 1   +-----------+                +---------+
//!    /\                                                 ||
//!    ||                 +------------+   ≥ 0.12 s,      ||
//!    ||== ≥ 0.8 s ======| SecondPair | <= any pair =====||
//!                       +------------+
//! ```
//!
//! Any other outcome returns to `Idle`.

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
use crate::tones::QciSeries;

/// Both tones of a pair must exceed this energy
pub const PAIR_THRESHOLD: f32 = 50.0;

/// All four tones must be below this energy for silence
pub const SILENCE_THRESHOLD: f32 = 10.0;

const ONSET_BLOCKS: u32 = 3;

const FIRST_PAIR_MIN_SECS: f32 = 0.9;
const FIRST_PAIR_MAX_SECS: f32 = 1.4;
const SILENCE_SECS: f32 = 0.12;
const SECOND_PAIR_MIN_SECS: f32 = 0.8;

/// QCI detector state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QciState {
    /// Waiting for the first pair
    Idle,

    /// First pair is present; timing its duration
    FirstPair,

    /// First pair has ended; requiring silence
    Silence,

    /// Second pair is present; timing its duration
    SecondPair,
}

/// QCI detector counters
///
/// All durations are in samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QciCounters {
    /// Consecutive blocks with the first pair present
    pub onset_blocks: u32,

    /// Time since the first pair onset was confirmed
    pub elapsed: u64,

    /// Value of `elapsed` when the first pair ended
    pub silence_start: u64,

    /// Value of `elapsed` when the second pair began
    pub second_pair_start: u64,
}

/// Measurements from one block
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QciObservation {
    /// Both tones of the first pair are present
    pub first_pair: bool,

    /// Both tones of the second pair are present
    pub second_pair: bool,

    /// All four tones are quiet
    pub silent: bool,

    /// Block length, in samples
    pub samples: u64,
}

/// QCI timing limits, in samples
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QciTiming {
    /// First pair must be held at least this long
    pub first_pair_min: u64,

    /// First pair held this long is invalid
    pub first_pair_max: u64,

    /// Required silence between pairs
    pub silence: u64,

    /// Second pair must be held at least this long
    pub second_pair_min: u64,
}

impl QciTiming {
    /// Timing limits at the given sampling rate
    pub fn new(input_rate: u32) -> Self {
        Self {
            first_pair_min: seconds_to_samples(FIRST_PAIR_MIN_SECS, input_rate),
            first_pair_max: seconds_to_samples(FIRST_PAIR_MAX_SECS, input_rate),
            silence: seconds_to_samples(SILENCE_SECS, input_rate),
            second_pair_min: seconds_to_samples(SECOND_PAIR_MIN_SECS, input_rate),
        }
    }
}

/// QCI state transition
#[derive(Clone, Debug, PartialEq)]
pub enum QciTransition {
    /// First pair onset confirmed
    FirstPairStarted,

    /// First pair ended before its minimum duration
    FirstPairTooShort {
        /// Duration, in seconds
        secs: f32,
    },

    /// First pair held past its maximum duration
    FirstPairTooLong,

    /// First pair accepted; requiring silence
    FirstPairComplete {
        /// Duration, in seconds
        secs: f32,
    },

    /// Energy detected during the silence period
    SilenceBroken {
        /// Silence duration, in seconds
        secs: f32,
    },

    /// Nothing followed the silence period
    NoSecondPair,

    /// Second pair onset
    SecondPairStarted,

    /// Second pair ended before its minimum duration
    SecondPairLost {
        /// Duration, in seconds
        secs: f32,
    },

    /// Both pairs received
    Detected,
}

impl fmt::Display for QciTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstPairStarted => write!(f, "first pair started"),
            Self::FirstPairTooShort { secs } => {
                write!(f, "lost first pair prematurely after {:.3} s", secs)
            }
            Self::FirstPairTooLong => write!(f, "first pair exceeded duration"),
            Self::FirstPairComplete { secs } => write!(
                f,
                "first pair complete after {:.3} s, entering silence period",
                secs
            ),
            Self::SilenceBroken { secs } => write!(
                f,
                "no true silence during silence period after {:.3} s",
                secs
            ),
            Self::NoSecondPair => write!(f, "no second pair detected after silence"),
            Self::SecondPairStarted => write!(f, "second pair started"),
            Self::SecondPairLost { secs } => {
                write!(f, "second pair lost prematurely after {:.3} s", secs)
            }
            Self::Detected => write!(f, "detection complete"),
        }
    }
}

/// QCI state transition function
///
/// Computes the next state and counters from the current
/// `state`, its `counters`, and the `obs`ervation of the
/// latest block. `input_rate` is used only to report
/// durations. Every return to `Idle` clears the counters.
pub fn step(
    state: QciState,
    counters: QciCounters,
    obs: &QciObservation,
    timing: &QciTiming,
    input_rate: u32,
) -> (QciState, QciCounters, Option<QciTransition>) {
    let mut c = counters;
    if state != QciState::Idle {
        c.elapsed += obs.samples;
    }

    let idle = |why: QciTransition| (QciState::Idle, QciCounters::default(), Some(why));

    match state {
        QciState::Idle => {
            if !obs.first_pair {
                return (QciState::Idle, QciCounters::default(), None);
            }

            c.onset_blocks += 1;
            if c.onset_blocks >= ONSET_BLOCKS {
                c.elapsed = 0;
                (QciState::FirstPair, c, Some(QciTransition::FirstPairStarted))
            } else {
                (QciState::Idle, c, None)
            }
        }
        QciState::FirstPair => {
            let secs = samples_to_seconds(c.elapsed, input_rate);
            if !obs.first_pair {
                if c.elapsed >= timing.first_pair_min {
                    c.silence_start = c.elapsed;
                    (
                        QciState::Silence,
                        c,
                        Some(QciTransition::FirstPairComplete { secs }),
                    )
                } else {
                    idle(QciTransition::FirstPairTooShort { secs })
                }
            } else if c.elapsed >= timing.first_pair_max {
                idle(QciTransition::FirstPairTooLong)
            } else {
                (QciState::FirstPair, c, None)
            }
        }
        QciState::Silence => {
            let silence = c.elapsed - c.silence_start;
            if silence >= timing.silence {
                if obs.first_pair || obs.second_pair {
                    c.second_pair_start = c.elapsed;
                    (
                        QciState::SecondPair,
                        c,
                        Some(QciTransition::SecondPairStarted),
                    )
                } else {
                    idle(QciTransition::NoSecondPair)
                }
            } else if !obs.silent {
                idle(QciTransition::SilenceBroken {
                    secs: samples_to_seconds(silence, input_rate),
                })
            } else {
                (QciState::Silence, c, None)
            }
        }
        QciState::SecondPair => {
            let held = c.elapsed - c.second_pair_start;
            if obs.second_pair && held >= timing.second_pair_min {
                idle(QciTransition::Detected)
            } else if !obs.second_pair {
                idle(QciTransition::SecondPairLost {
                    secs: samples_to_seconds(held, input_rate),
                })
            } else {
                (QciState::SecondPair, c, None)
            }
        }
    }
}

/// Motorola QCI detector
///
/// ```
/// use pagetone::QciDetector;
///
/// let det = QciDetector::new('Z', ['d', 'p'], ['h', 'k']).expect("bad tones");
/// assert_eq!([384.6, 1084.0], det.first_pair_hz());
/// assert_eq!([582.1, 716.7], det.second_pair_hz());
///
/// assert!(QciDetector::new('Y', ['d', 'p'], ['h', 'k']).is_err());
/// assert!(QciDetector::new('A', ['d', 'i'], ['h', 'k']).is_err());
/// ```
#[derive(Clone, Debug)]
pub struct QciDetector {
    series: QciSeries,
    first_pair: [f32; 2],
    second_pair: [f32; 2],
    state: QciState,
    counters: QciCounters,
}

impl QciDetector {
    /// Detector for the given tone letters
    ///
    /// The `series` and tone letters are case-insensitive.
    pub fn new(
        series: char,
        first_pair: [char; 2],
        second_pair: [char; 2],
    ) -> Result<Self, ConfigError> {
        let series = QciSeries::from_char(series).ok_or(ConfigError::InvalidSeries(series))?;
        let lookup = |code: char| {
            series
                .frequency(code)
                .ok_or(ConfigError::InvalidToneCode { series, code })
        };

        Ok(Self {
            series,
            first_pair: [lookup(first_pair[0])?, lookup(first_pair[1])?],
            second_pair: [lookup(second_pair[0])?, lookup(second_pair[1])?],
            state: QciState::Idle,
            counters: QciCounters::default(),
        })
    }

    /// Tone series
    pub fn series(&self) -> QciSeries {
        self.series
    }

    /// First pair frequencies, in Hz
    pub fn first_pair_hz(&self) -> [f32; 2] {
        self.first_pair
    }

    /// Second pair frequencies, in Hz
    pub fn second_pair_hz(&self) -> [f32; 2] {
        self.second_pair
    }

    /// Current state
    pub fn state(&self) -> QciState {
        self.state
    }

    /// Current counters
    pub fn counters(&self) -> &QciCounters {
        &self.counters
    }

    fn observe(&self, block: &[f32], input_rate: u32) -> QciObservation {
        let e = [
            energy(block, self.first_pair[0], input_rate),
            energy(block, self.first_pair[1], input_rate),
            energy(block, self.second_pair[0], input_rate),
            energy(block, self.second_pair[1], input_rate),
        ];

        if self.state != QciState::Idle {
            trace!(
                "qci: energy levels - pair 1: {:.4}/{:.4} pair 2: {:.4}/{:.4}",
                e[0],
                e[1],
                e[2],
                e[3]
            );
        }

        QciObservation {
            first_pair: e[0] >= PAIR_THRESHOLD && e[1] >= PAIR_THRESHOLD,
            second_pair: e[2] >= PAIR_THRESHOLD && e[3] >= PAIR_THRESHOLD,
            silent: e.iter().all(|&en| en < SILENCE_THRESHOLD),
            samples: block.len() as u64,
        }
    }
}

impl ToneDetector for QciDetector {
    fn process(&mut self, block: &[f32], input_rate: u32) -> Option<DetectorEvent> {
        let obs = self.observe(block, input_rate);
        let (state, counters, out) = step(
            self.state,
            self.counters,
            &obs,
            &QciTiming::new(input_rate),
            input_rate,
        );
        self.state = state;
        self.counters = counters;

        let out = out?;
        debug!("qci: {}", out);
        Some(out.into())
    }

    fn reset(&mut self) {
        self.state = QciState::Idle;
        self.counters = QciCounters::default();
    }
}
