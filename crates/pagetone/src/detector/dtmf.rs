//! DTMF sequence detector
//!
//! Recognizes a configured sequence of DTMF symbols, one symbol
//! at a time. Each symbol must be held for a minimum time and
//! must be followed by true silence on *all* DTMF frequencies.
//!
//! ```txt
//!         +-----------+   2 blocks    +----------------+
//!  ======>|   Idle    | ============> | DetectingDigit |
//!         +-----------+    present    +----------------+
//!           /\    /\                      ||      ||
//!           ||    ||= too short/long =====||      || lost after ≥ 30 ms
//!           ||                                    \/
//!           ||                        +-------------------+
//!           ||=== next digit, done ===| InterDigitSilence |
//!           ||=== 100 ms timeout =====+-------------------+
//! ```

use std::fmt;

#[cfg(not(test))]
use log::{debug, trace};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as trace;

use super::{samples_to_seconds, seconds_to_samples, DetectorEvent, ToneDetector};
use crate::config::ConfigError;
use crate::goertzel::{energies, energy};
use crate::tones::{dtmf_frequencies, DTMF_ALL_HZ};

/// Row and column energy required for a digit to be present
pub const DIGIT_THRESHOLD: f32 = 100.0;

/// Every DTMF frequency must be below this energy for silence
pub const SILENCE_THRESHOLD: f32 = 20.0;

// consecutive blocks to confirm a digit onset
const ONSET_BLOCKS: u32 = 2;

// consecutive blocks to confirm inter-digit silence
const SILENCE_BLOCKS: u32 = 2;

const DIGIT_MIN_SECS: f32 = 0.03;
const DIGIT_MAX_SECS: f32 = 0.15;
const SILENCE_MIN_SECS: f32 = 0.02;
const SILENCE_TIMEOUT_SECS: f32 = 0.1;

/// One symbol of a DTMF sequence
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DtmfDigit {
    /// Keypad symbol, upper-case
    pub symbol: char,

    /// Row (low group) frequency, in Hz
    pub row_hz: f32,

    /// Column (high group) frequency, in Hz
    pub column_hz: f32,
}

impl DtmfDigit {
    /// Look up a keypad symbol
    pub fn new(symbol: char) -> Result<Self, ConfigError> {
        let (row_hz, column_hz) =
            dtmf_frequencies(symbol).ok_or(ConfigError::InvalidDtmfSymbol(symbol))?;
        Ok(Self {
            symbol: symbol.to_ascii_uppercase(),
            row_hz,
            column_hz,
        })
    }
}

/// DTMF detector state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DtmfState {
    /// Waiting for the current digit to begin
    Idle,

    /// Current digit is present; timing its duration
    DetectingDigit,

    /// Current digit has ended; waiting for silence
    InterDigitSilence,
}

/// DTMF detector counters
///
/// All durations are in samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DtmfCounters {
    /// Position within the sequence
    pub index: usize,

    /// Consecutive blocks with the current digit present
    pub onset_blocks: u32,

    /// Consecutive silent blocks
    pub silent_blocks: u32,

    /// Time since the digit onset was confirmed
    pub elapsed: u64,

    /// Value of `elapsed` when the digit ended
    pub silence_start: u64,
}

impl DtmfCounters {
    // start the current digit over
    fn restart_digit(self) -> Self {
        Self {
            index: self.index,
            ..Self::default()
        }
    }
}

/// Measurements from one block
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DtmfObservation {
    /// Current digit's row and column are both present
    pub digit_present: bool,

    /// Every DTMF frequency is quiet
    pub silent: bool,

    /// Block length, in samples
    pub samples: u64,
}

/// DTMF timing limits, in samples
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DtmfTiming {
    /// A digit shorter than this is a false trigger
    pub digit_min: u64,

    /// A digit held this long is invalid
    pub digit_max: u64,

    /// Minimum confirmed silence between digits
    pub silence_min: u64,

    /// Abandon the sequence if silence is not confirmed by now
    pub silence_timeout: u64,
}

impl DtmfTiming {
    /// Timing limits at the given sampling rate
    pub fn new(input_rate: u32) -> Self {
        Self {
            digit_min: seconds_to_samples(DIGIT_MIN_SECS, input_rate),
            digit_max: seconds_to_samples(DIGIT_MAX_SECS, input_rate),
            silence_min: seconds_to_samples(SILENCE_MIN_SECS, input_rate),
            silence_timeout: seconds_to_samples(SILENCE_TIMEOUT_SECS, input_rate),
        }
    }
}

/// DTMF state transition
#[derive(Clone, Debug, PartialEq)]
pub enum DtmfTransition {
    /// Digit onset confirmed
    DigitStarted {
        /// Symbol
        symbol: char,
    },

    /// Digit ended before the minimum duration
    DigitTooShort {
        /// Symbol
        symbol: char,

        /// Duration, in seconds
        secs: f32,
    },

    /// Digit held past the maximum duration
    DigitTooLong {
        /// Symbol
        symbol: char,
    },

    /// Digit accepted; waiting for silence
    DigitComplete {
        /// Symbol
        symbol: char,

        /// Duration, in seconds
        secs: f32,
    },

    /// Silence confirmed; waiting for the next digit
    NextDigit {
        /// Next symbol in the sequence
        symbol: char,
    },

    /// No silence after a digit; the sequence is abandoned
    SilenceTimeout,

    /// The entire sequence was received
    SequenceDetected,
}

impl fmt::Display for DtmfTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DigitStarted { symbol } => write!(f, "started detecting digit {}", symbol),
            Self::DigitTooShort { symbol, secs } => {
                write!(f, "digit {} lost prematurely after {:.3} s", symbol, secs)
            }
            Self::DigitTooLong { symbol } => write!(f, "digit {} duration too long", symbol),
            Self::DigitComplete { symbol, secs } => {
                write!(f, "digit {} complete after {:.3} s", symbol, secs)
            }
            Self::NextDigit { symbol } => write!(f, "ready for next digit {}", symbol),
            Self::SilenceTimeout => write!(f, "lost silence between digits"),
            Self::SequenceDetected => write!(f, "sequence detection complete"),
        }
    }
}

/// DTMF state transition function
///
/// Computes the next state and counters from the current
/// `state`, its `counters`, and the `obs`ervation of the
/// latest block. `sequence` is the full sequence being
/// detected, and `input_rate` is used only to report
/// durations.
pub fn step(
    state: DtmfState,
    counters: DtmfCounters,
    obs: &DtmfObservation,
    timing: &DtmfTiming,
    sequence: &[DtmfDigit],
    input_rate: u32,
) -> (DtmfState, DtmfCounters, Option<DtmfTransition>) {
    let mut c = counters;
    let symbol = sequence[c.index].symbol;
    if state != DtmfState::Idle {
        c.elapsed += obs.samples;
    }

    match state {
        DtmfState::Idle => {
            if obs.digit_present {
                c.onset_blocks += 1;
                if c.onset_blocks >= ONSET_BLOCKS {
                    c.elapsed = 0;
                    return (
                        DtmfState::DetectingDigit,
                        c,
                        Some(DtmfTransition::DigitStarted { symbol }),
                    );
                }
            } else {
                c = c.restart_digit();
            }
            (DtmfState::Idle, c, None)
        }
        DtmfState::DetectingDigit => {
            let secs = samples_to_seconds(c.elapsed, input_rate);
            if !obs.digit_present {
                if c.elapsed >= timing.digit_min {
                    c.silence_start = c.elapsed;
                    c.silent_blocks = 0;
                    (
                        DtmfState::InterDigitSilence,
                        c,
                        Some(DtmfTransition::DigitComplete { symbol, secs }),
                    )
                } else {
                    (
                        DtmfState::Idle,
                        c.restart_digit(),
                        Some(DtmfTransition::DigitTooShort { symbol, secs }),
                    )
                }
            } else if c.elapsed >= timing.digit_max {
                (
                    DtmfState::Idle,
                    c.restart_digit(),
                    Some(DtmfTransition::DigitTooLong { symbol }),
                )
            } else {
                (DtmfState::DetectingDigit, c, None)
            }
        }
        DtmfState::InterDigitSilence => {
            if obs.silent {
                c.silent_blocks += 1;
            } else {
                c.silent_blocks = 0;
            }

            let silence = c.elapsed - c.silence_start;
            if c.silent_blocks >= SILENCE_BLOCKS && silence >= timing.silence_min {
                let index = c.index + 1;
                if index >= sequence.len() {
                    (
                        DtmfState::Idle,
                        DtmfCounters::default(),
                        Some(DtmfTransition::SequenceDetected),
                    )
                } else {
                    (
                        DtmfState::Idle,
                        DtmfCounters {
                            index,
                            ..DtmfCounters::default()
                        },
                        Some(DtmfTransition::NextDigit {
                            symbol: sequence[index].symbol,
                        }),
                    )
                }
            } else if silence >= timing.silence_timeout {
                (
                    DtmfState::Idle,
                    DtmfCounters::default(),
                    Some(DtmfTransition::SilenceTimeout),
                )
            } else {
                (DtmfState::InterDigitSilence, c, None)
            }
        }
    }
}

/// DTMF sequence detector
///
/// ```
/// use pagetone::{DtmfDetector, ToneDetector};
///
/// let mut det = DtmfDetector::new("*123#").expect("bad sequence");
/// assert_eq!("*123#", det.sequence_str());
/// assert!(det.process(&[0.0f32; 160], 8000).is_none());
///
/// assert!(DtmfDetector::new("*12E").is_err());
/// ```
#[derive(Clone, Debug)]
pub struct DtmfDetector {
    sequence: Vec<DtmfDigit>,
    state: DtmfState,
    counters: DtmfCounters,
    levels: Vec<f32>,
}

impl DtmfDetector {
    /// Detector for the given sequence
    ///
    /// The sequence may contain `0-9`, `*`, `#`, and `A-D`, in
    /// either case. It must not be empty.
    pub fn new(sequence: &str) -> Result<Self, ConfigError> {
        let sequence = sequence
            .chars()
            .map(DtmfDigit::new)
            .collect::<Result<Vec<_>, _>>()?;
        if sequence.is_empty() {
            return Err(ConfigError::EmptySequence);
        }

        Ok(Self {
            sequence,
            state: DtmfState::Idle,
            counters: DtmfCounters::default(),
            levels: Vec::with_capacity(DTMF_ALL_HZ.len()),
        })
    }

    /// The digits of the sequence
    pub fn sequence(&self) -> &[DtmfDigit] {
        &self.sequence
    }

    /// The sequence, as upper-case text
    pub fn sequence_str(&self) -> String {
        self.sequence.iter().map(|d| d.symbol).collect()
    }

    /// Current state
    pub fn state(&self) -> DtmfState {
        self.state
    }

    /// Current counters
    pub fn counters(&self) -> &DtmfCounters {
        &self.counters
    }

    // Measure the block
    //
    // Silence is only measured when it matters, which is
    // between digits.
    fn observe(&mut self, block: &[f32], input_rate: u32) -> DtmfObservation {
        let digit = &self.sequence[self.counters.index];
        let row = energy(block, digit.row_hz, input_rate);
        let column = energy(block, digit.column_hz, input_rate);

        if self.state != DtmfState::Idle {
            trace!(
                "dtmf: digit {} - row: {:.4} column: {:.4}",
                digit.symbol,
                row,
                column
            );
        }

        let silent = self.state == DtmfState::InterDigitSilence && {
            energies(block, &DTMF_ALL_HZ, input_rate, &mut self.levels);
            self.levels.iter().all(|&en| en < SILENCE_THRESHOLD)
        };

        DtmfObservation {
            digit_present: row >= DIGIT_THRESHOLD && column >= DIGIT_THRESHOLD,
            silent,
            samples: block.len() as u64,
        }
    }
}

impl ToneDetector for DtmfDetector {
    fn process(&mut self, block: &[f32], input_rate: u32) -> Option<DetectorEvent> {
        let obs = self.observe(block, input_rate);
        let (state, counters, out) = step(
            self.state,
            self.counters,
            &obs,
            &DtmfTiming::new(input_rate),
            &self.sequence,
            input_rate,
        );
        self.state = state;
        self.counters = counters;

        let out = out?;
        debug!("dtmf [{}]: {}", self.sequence_str(), out);
        Some(out.into())
    }

    fn reset(&mut self) {
        self.state = DtmfState::Idle;
        self.counters = DtmfCounters::default();
    }
}
