use crate::ingest::IngestError;

/// Tone receiver output
///
/// Events are multiplexed from every configured detector and
/// from the audio source.
///
/// * A [`Detection`](ToneEvent::Detection) reports that the
///   pattern for one [`DetectionConfig`](crate::DetectionConfig)
///   was recognized. Each completed page is reported exactly
///   once. The detector then starts over and may detect
///   again later in the same stream.
///
/// * A [`Debug`](ToneEvent::Debug) message is free-form
///   diagnostic text. Its contents are not part of this
///   crate's API and may change in any release.
///
/// * An [`Error`](ToneEvent::Error) is an unrecoverable
///   failure of the audio source. Detection does not continue
///   after an error. Stop and, if you like, start again.
#[derive(Clone, Debug)]
pub enum ToneEvent {
    /// Pattern recognized
    Detection {
        /// Position of the detection config in the list
        /// given to the receiver
        config_index: usize,
    },

    /// Diagnostic message
    Debug(String),

    /// Audio source failed
    Error(IngestError),
}

impl ToneEvent {
    /// Configuration index of a detection, if any
    pub fn detection_index(&self) -> Option<usize> {
        match self {
            ToneEvent::Detection { config_index } => Some(*config_index),
            _ => None,
        }
    }

    /// True if this event is an error
    pub fn is_error(&self) -> bool {
        matches!(self, ToneEvent::Error(_))
    }
}

impl AsRef<str> for ToneEvent {
    fn as_ref(&self) -> &str {
        match self {
            ToneEvent::Detection { .. } => "detection",
            ToneEvent::Debug(_) => "debug",
            ToneEvent::Error(_) => "error",
        }
    }
}

impl std::fmt::Display for ToneEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToneEvent::Detection { config_index } => {
                write!(f, "{}: config #{}", self.as_ref(), config_index)
            }
            ToneEvent::Debug(msg) => write!(f, "{}: {}", self.as_ref(), msg),
            ToneEvent::Error(err) => write!(f, "{}: {}", self.as_ref(), err),
        }
    }
}

impl From<IngestError> for ToneEvent {
    fn from(err: IngestError) -> Self {
        ToneEvent::Error(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let evt = ToneEvent::Detection { config_index: 2 };
        assert_eq!("detection: config #2", format!("{}", evt));
        assert_eq!(Some(2), evt.detection_index());
        assert!(!evt.is_error());

        let evt = ToneEvent::Debug("end of stream".to_owned());
        assert_eq!("debug: end of stream", format!("{}", evt));
        assert_eq!(None, evt.detection_index());
    }
}
