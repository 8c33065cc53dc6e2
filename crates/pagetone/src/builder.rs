use std::convert::TryFrom;

use crate::config::{ConfigError, DetectionConfig};
use crate::receiver::ToneReceiver;

/// Builds a multi-protocol tone receiver
///
/// All you really need to provide is the input sampling rate
/// and at least one [`DetectionConfig`]. The detectors work well
/// at 8000 Hz, which is the default.
///
/// ```
/// use pagetone::{DetectionConfig, ToneReceiverBuilder};
///
/// let mut builder = ToneReceiverBuilder::new(16000);
/// builder
///     .with_config("dtmf:*123#".parse().unwrap())
///     .with_configs([DetectionConfig::qcii(569.1, 1687.2)]);
/// assert_eq!(2, builder.configs().len());
///
/// let receiver = builder.build().expect("bad config");
/// assert_eq!(16000, receiver.input_rate());
/// ```
///
/// Configs are validated when the receiver is built. The
/// first invalid config fails the build, and the error
/// reports its index.
#[derive(Clone, Debug, PartialEq)]
pub struct ToneReceiverBuilder {
    input_rate: u32,
    configs: Vec<DetectionConfig>,
}

impl ToneReceiverBuilder {
    /// New receiver with no detectors
    ///
    /// The only mandatory parameter is the input sampling
    /// rate, in Hz.
    pub fn new(input_rate: u32) -> Self {
        Self {
            input_rate,
            configs: Vec::new(),
        }
    }

    /// Build a receiver
    ///
    /// Once built, the receiver is immediately ready to
    /// process samples.
    pub fn build(&self) -> Result<ToneReceiver, ConfigError> {
        ToneReceiver::try_from(self)
    }

    /// Add a detector
    ///
    /// The detector's configuration index is the number of
    /// detectors added before it.
    pub fn with_config(&mut self, config: DetectionConfig) -> &mut Self {
        self.configs.push(config);
        self
    }

    /// Add several detectors, in order
    pub fn with_configs<I>(&mut self, configs: I) -> &mut Self
    where
        I: IntoIterator<Item = DetectionConfig>,
    {
        self.configs.extend(configs);
        self
    }

    /// Input sampling rate (Hz)
    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Detection configs, in index order
    pub fn configs(&self) -> &[DetectionConfig] {
        &self.configs
    }
}

impl std::default::Default for ToneReceiverBuilder {
    fn default() -> Self {
        Self::new(8000)
    }
}

/// Builder for the audio transcoder
///
/// Audio is decoded by an external transcoder program,
/// `ffmpeg`, which must be installed separately.
///
/// ```
/// use pagetone::TranscoderOptions;
///
/// let mut opts = TranscoderOptions::new();
/// opts.with_program("/opt/ffmpeg/bin/ffmpeg")
///     .with_chunk_bytes(321)
///     .with_realtime(false);
/// assert_eq!(320, opts.chunk_bytes());
/// assert_eq!(1 << 20, opts.buffer_bytes());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranscoderOptions {
    program: String,
    chunk_bytes: usize,
    buffer_bytes: usize,
    realtime: bool,
}

impl TranscoderOptions {
    /// New options with sensible defaults
    pub fn new() -> Self {
        Self {
            program: "ffmpeg".to_owned(),
            chunk_bytes: 640,
            buffer_bytes: 1 << 20,
            realtime: true,
        }
    }

    /// Transcoder program
    ///
    /// Either a bare name, which is searched for in the
    /// `PATH`, or a path to the executable.
    pub fn with_program<S>(&mut self, program: S) -> &mut Self
    where
        S: Into<String>,
    {
        self.program = program.into();
        self
    }

    /// Read size (bytes)
    ///
    /// Decoded audio is read from the transcoder in chunks
    /// of at most this many bytes, and detectors receive
    /// blocks of at most `chunk_bytes / 4` samples. The
    /// default is 20 ms of audio at 8000 Hz. The size is
    /// rounded down to a whole number of samples.
    pub fn with_chunk_bytes(&mut self, chunk_bytes: usize) -> &mut Self {
        self.chunk_bytes = usize::max(chunk_bytes / 4, 1) * 4;
        self.buffer_bytes = usize::max(self.buffer_bytes, self.chunk_bytes);
        self
    }

    /// Buffer capacity (bytes)
    ///
    /// Decoded audio which has not yet been processed is
    /// held in a buffer of this size. If the buffer fills,
    /// the oldest audio is discarded. The capacity is never
    /// less than one chunk.
    pub fn with_buffer_bytes(&mut self, buffer_bytes: usize) -> &mut Self {
        self.buffer_bytes = usize::max(buffer_bytes, self.chunk_bytes);
        self
    }

    /// Pace input at its native rate
    ///
    /// When set, the transcoder reads its input no faster
    /// than real time. This is appropriate for live streams.
    /// Disable it to process files as fast as possible.
    pub fn with_realtime(&mut self, realtime: bool) -> &mut Self {
        self.realtime = realtime;
        self
    }

    /// Transcoder program
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Read size (bytes)
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    /// Samples per detector block
    pub fn block_len(&self) -> usize {
        self.chunk_bytes / 4
    }

    /// Buffer capacity (bytes)
    pub fn buffer_bytes(&self) -> usize {
        self.buffer_bytes
    }

    /// Pace input at its native rate
    pub fn realtime(&self) -> bool {
        self.realtime
    }
}

impl std::default::Default for TranscoderOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcoder_options() {
        let mut opts = TranscoderOptions::default();
        assert_eq!("ffmpeg", opts.program());
        assert_eq!(160, opts.block_len());
        assert!(opts.realtime());

        opts.with_chunk_bytes(2).with_buffer_bytes(0);
        assert_eq!(4, opts.chunk_bytes());
        assert_eq!(4, opts.buffer_bytes());

        opts.with_buffer_bytes(100).with_chunk_bytes(400);
        assert_eq!(400, opts.buffer_bytes());
    }
}
