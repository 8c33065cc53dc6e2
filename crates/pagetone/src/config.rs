//! Detection configurations

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::detector::Detector;
use crate::tones::QciSeries;

/// What to listen for
///
/// Each `DetectionConfig` describes one tone pattern. A list of
/// them is given to the
/// [`ToneReceiverBuilder`](crate::ToneReceiverBuilder), and each
/// config's position in that list becomes the `config_index`
/// which is reported with its detections.
///
/// Configs are plain data. They are validated when the receiver
/// is built, or on demand with [`validate()`](#method.validate).
///
/// Configs also have a compact text form, which is accepted by
/// `parse()` and produced by `Display`:
///
/// | Protocol | Text                 |
/// |----------|----------------------|
/// | DTMF     | `dtmf:*123#`         |
/// | QCI      | `qci:Z:DP:HK`        |
/// | QCII     | `qcii:569.1:1687.2`  |
///
/// ```
/// use pagetone::DetectionConfig;
///
/// let cfg: DetectionConfig = "qci:z:dp:hk".parse().expect("bad config");
/// assert_eq!(DetectionConfig::qci('Z', ['D', 'P'], ['H', 'K']), cfg);
/// assert_eq!("qci:Z:DP:HK", cfg.to_string());
///
/// assert!("dtmf:12E".parse::<DetectionConfig>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum DetectionConfig {
    /// Motorola QCII sequential two-tone
    ///
    /// Tone A for about one second, then tone B for about
    /// two or more seconds.
    Qcii {
        /// First tone (Hz)
        tone_a: f32,

        /// Second tone (Hz)
        tone_b: f32,
    },

    /// Motorola QCI letter-coded two-tone
    ///
    /// A pair of simultaneous tones, a short silence, and then
    /// a second pair of simultaneous tones. Each tone is named
    /// by a letter within a tone `series`.
    Qci {
        /// Tone series: `A`, `B`, or `Z`
        series: char,

        /// Letter codes of the first pair
        first_pair: [char; 2],

        /// Letter codes of the second pair
        second_pair: [char; 2],
    },

    /// DTMF digit sequence
    Dtmf {
        /// Sequence over `0-9`, `*`, `#`, and `A-D`
        sequence: String,
    },
}

impl DetectionConfig {
    /// QCII sequential tones A then B, in Hz
    pub fn qcii(tone_a: f32, tone_b: f32) -> Self {
        Self::Qcii { tone_a, tone_b }
    }

    /// QCI pairs from the given tone series
    ///
    /// The series and tone letters are stored in upper case.
    pub fn qci(series: char, first_pair: [char; 2], second_pair: [char; 2]) -> Self {
        Self::Qci {
            series: series.to_ascii_uppercase(),
            first_pair: first_pair.map(|c| c.to_ascii_uppercase()),
            second_pair: second_pair.map(|c| c.to_ascii_uppercase()),
        }
    }

    /// DTMF sequence
    ///
    /// The symbols are stored in upper case.
    pub fn dtmf<S>(sequence: S) -> Self
    where
        S: Into<String>,
    {
        let mut sequence = sequence.into();
        sequence.make_ascii_uppercase();
        Self::Dtmf { sequence }
    }

    /// Protocol name
    ///
    /// One of `"QCII"`, `"QCI"`, or `"DTMF"`.
    pub fn protocol(&self) -> &'static str {
        match self {
            Self::Qcii { .. } => "QCII",
            Self::Qci { .. } => "QCI",
            Self::Dtmf { .. } => "DTMF",
        }
    }

    /// Check that this config can be detected
    ///
    /// Fails if a tone series, tone letter, or DTMF symbol is
    /// not recognized.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Detector::new(self).map(|_| ())
    }
}

impl fmt::Display for DetectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Qcii { tone_a, tone_b } => write!(f, "qcii:{}:{}", tone_a, tone_b),
            Self::Qci {
                series,
                first_pair,
                second_pair,
            } => write!(
                f,
                "qci:{}:{}{}:{}{}",
                series.to_ascii_uppercase(),
                first_pair[0].to_ascii_uppercase(),
                first_pair[1].to_ascii_uppercase(),
                second_pair[0].to_ascii_uppercase(),
                second_pair[1].to_ascii_uppercase()
            ),
            Self::Dtmf { sequence } => write!(f, "dtmf:{}", sequence.to_ascii_uppercase()),
        }
    }
}

impl FromStr for DetectionConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lazy_static! {
            static ref PROTOCOL: Regex =
                Regex::new(r"^\s*([A-Za-z]+):(.*?)\s*$").expect("bad regex");
            static ref QCII: Regex =
                Regex::new(r"^([0-9]+(?:\.[0-9]*)?):([0-9]+(?:\.[0-9]*)?)$").expect("bad regex");
            static ref QCI: Regex =
                Regex::new(r"^(.):([A-Za-z])([A-Za-z]):([A-Za-z])([A-Za-z])$").expect("bad regex");
        }

        let malformed = || ConfigError::Malformed(s.to_owned());

        let caps = PROTOCOL.captures(s).ok_or_else(malformed)?;
        let body = &caps[2];
        let out = match caps[1].to_ascii_lowercase().as_str() {
            "qcii" => {
                let caps = QCII.captures(body).ok_or_else(malformed)?;
                let tone_a = caps[1].parse().map_err(|_| malformed())?;
                let tone_b = caps[2].parse().map_err(|_| malformed())?;
                Self::qcii(tone_a, tone_b)
            }
            "qci" => {
                let caps = QCI.captures(body).ok_or_else(malformed)?;
                let letter = |i: usize| caps[i].chars().next().ok_or_else(malformed);
                Self::qci(
                    letter(1)?,
                    [letter(2)?, letter(3)?],
                    [letter(4)?, letter(5)?],
                )
            }
            "dtmf" => Self::dtmf(body),
            other => return Err(ConfigError::UnknownProtocol(other.to_owned())),
        };

        out.validate()?;
        Ok(out)
    }
}

/// Invalid detection configuration
///
/// Configuration errors are always reported when the receiver
/// is constructed. They are never reported while audio is being
/// processed.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// Not a QCI tone series
    #[error("invalid QCI tone series \"{0}\": expected A, B, or Z")]
    InvalidSeries(char),

    /// Not a tone letter in the given QCI series
    #[error("invalid QCI tone \"{code}\" in series {series}")]
    InvalidToneCode {
        /// Tone series
        series: QciSeries,

        /// Offending letter
        code: char,
    },

    /// Not a DTMF symbol
    #[error("invalid DTMF symbol \"{0}\": expected 0-9, *, #, or A-D")]
    InvalidDtmfSymbol(char),

    /// A DTMF sequence must have at least one symbol
    #[error("DTMF sequence is empty")]
    EmptySequence,

    /// QCII tones must be positive, finite frequencies
    #[error("invalid QCII tone frequency: {0} Hz")]
    InvalidFrequency(f32),

    /// Unrecognized protocol name in a text config
    #[error("unknown detection protocol \"{0}\": expected dtmf, qci, or qcii")]
    UnknownProtocol(String),

    /// A text config could not be parsed
    #[error("malformed detection config \"{0}\"")]
    Malformed(String),

    /// A config in a list of configs is invalid
    #[error("detection config #{index}: {source}")]
    AtIndex {
        /// Position within the list of configs
        index: usize,

        /// What is wrong with it
        #[source]
        source: Box<ConfigError>,
    },
}

impl ConfigError {
    /// Attach the config list position to this error
    pub fn at_index(self, index: usize) -> Self {
        Self::AtIndex {
            index,
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip_text() {
        const GOOD: &[(&str, &str)] = &[
            ("dtmf:*123#", "dtmf:*123#"),
            ("DTMF:abcd", "dtmf:ABCD"),
            ("  qci:z:dp:hk ", "qci:Z:DP:HK"),
            ("QCI:A:CD:NP", "qci:A:CD:NP"),
            ("qcii:569.1:1687.2", "qcii:569.1:1687.2"),
            ("qcii:1000:2000.", "qcii:1000:2000"),
        ];

        for (text, display) in GOOD {
            let cfg: DetectionConfig = text.parse().expect(text);
            assert_eq!(*display, cfg.to_string());
            let again: DetectionConfig = display.parse().expect(display);
            assert_eq!(cfg.to_string(), again.to_string());
        }
    }

    #[test]
    fn test_parse_normalizes_case() {
        let cfg: DetectionConfig = "qci:z:dp:hk".parse().unwrap();
        assert_eq!(DetectionConfig::qci('Z', ['D', 'P'], ['H', 'K']), cfg);
        assert_eq!(DetectionConfig::qci('z', ['d', 'p'], ['h', 'k']), cfg);

        let cfg: DetectionConfig = "DTMF:*1a#".parse().unwrap();
        assert_eq!(DetectionConfig::dtmf("*1A#"), cfg);
        assert_eq!(
            DetectionConfig::Dtmf {
                sequence: "*1A#".to_owned()
            },
            cfg
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Err(ConfigError::UnknownProtocol("dtfm".to_owned())),
            "dtfm:123".parse::<DetectionConfig>()
        );
        assert_eq!(
            Err(ConfigError::InvalidDtmfSymbol('E')),
            "dtmf:12e".parse::<DetectionConfig>()
        );
        assert_eq!(
            Err(ConfigError::EmptySequence),
            "dtmf:".parse::<DetectionConfig>()
        );
        assert_eq!(
            Err(ConfigError::InvalidSeries('Q')),
            "qci:Q:dp:hk".parse::<DetectionConfig>()
        );
        assert_eq!(
            Err(ConfigError::InvalidToneCode {
                series: QciSeries::Z,
                code: 'A'
            }),
            "qci:Z:ap:hk".parse::<DetectionConfig>()
        );
        assert!(matches!(
            "qci:Z:dph:k".parse::<DetectionConfig>(),
            Err(ConfigError::Malformed(_))
        ));
        assert!(matches!(
            "qcii:569.1".parse::<DetectionConfig>(),
            Err(ConfigError::Malformed(_))
        ));
        assert!(matches!(
            "569.1:1687.2".parse::<DetectionConfig>(),
            Err(ConfigError::Malformed(_))
        ));
        assert_eq!(
            Err(ConfigError::InvalidFrequency(0.0)),
            "qcii:0:1687.2".parse::<DetectionConfig>()
        );
    }

    #[test]
    fn test_validate() {
        assert!(DetectionConfig::dtmf("*123#").validate().is_ok());
        assert!(DetectionConfig::qci('b', ['c', 'd'], ['e', 'f'])
            .validate()
            .is_ok());
        assert!(DetectionConfig::qcii(f32::NAN, 1000.0).validate().is_err());
        assert!(DetectionConfig::qcii(1000.0, f32::INFINITY)
            .validate()
            .is_err());
        assert_eq!("QCII", DetectionConfig::qcii(1.0, 2.0).protocol());
    }

    #[test]
    fn test_error_display() {
        let err = ConfigError::InvalidDtmfSymbol('x').at_index(2);
        assert_eq!(
            "detection config #2: invalid DTMF symbol \"x\": expected 0-9, *, #, or A-D",
            err.to_string()
        );
    }
}
