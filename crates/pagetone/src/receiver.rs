//! Detection orchestrator

#[cfg(not(test))]
use log::{debug, info};

#[cfg(test)]
use std::println as debug;
#[cfg(test)]
use std::println as info;

use std::collections::VecDeque;
use std::convert::TryFrom;

use crate::builder::ToneReceiverBuilder;
use crate::config::{ConfigError, DetectionConfig};
use crate::detector::{Detector, ToneDetector};

mod output;

pub use output::ToneEvent;

/// Multi-protocol tone receiver
///
/// The receiver owns one detector per
/// [`DetectionConfig`]. Every block of audio is delivered to
/// each detector in turn, in configuration order. Detections
/// are tagged with the index of the config that produced
/// them.
///
/// To create the receiver, first create its Builder:
///
/// ```
/// use pagetone::{DetectionConfig, ToneReceiverBuilder};
///
/// let receiver = ToneReceiverBuilder::default()
///     .with_config(DetectionConfig::dtmf("*123#"))
///     .with_config(DetectionConfig::qci('Z', ['d', 'p'], ['h', 'k']))
///     .build()
///     .expect("bad config");
/// assert_eq!(receiver.input_rate(), 8000);
/// assert_eq!(receiver.len(), 2);
/// ```
///
/// Audio must be mono `f32` samples at the
/// [`input_rate()`](#method.input_rate). Blocks may be of any
/// length, but the detector timings are only as precise as
/// the block length. Blocks of 10 – 20 ms work well.
#[derive(Clone, Debug)]
pub struct ToneReceiver {
    detectors: Vec<DetectorInstance>,
    input_rate: u32,
    input_sample_counter: u64,
}

impl ToneReceiver {
    /// Process one block of audio
    ///
    /// The `block` is delivered to every detector. Returns
    /// the resulting events, in configuration order. Most
    /// blocks produce no events at all.
    pub fn process(&mut self, block: &[f32]) -> Vec<ToneEvent> {
        let mut out = Vec::new();
        for (config_index, inst) in self.detectors.iter_mut().enumerate() {
            let evt = match inst.detector.process(block, self.input_rate) {
                Some(evt) => evt,
                None => continue,
            };

            if evt.is_detection() {
                info!(
                    "receiver [{:<14}]: detected #{} {}",
                    self.input_sample_counter, config_index, inst.config
                );
                out.push(ToneEvent::Detection { config_index });
            }
            out.push(ToneEvent::Debug(format!(
                "[#{} {}] {}",
                config_index, inst.config, evt
            )));
        }

        self.input_sample_counter = self
            .input_sample_counter
            .wrapping_add(block.len() as u64);
        out
    }

    /// Receive events from a source of audio blocks
    ///
    /// Bind an iterator which will consume blocks of `input`
    /// and produce [`ToneEvent`]s. The iterator consumes only
    /// as many blocks as are required to produce the next
    /// event. It returns `None` once the input is exhausted.
    ///
    /// ```
    /// use pagetone::{waveform, DetectionConfig, ToneEvent, ToneReceiverBuilder};
    ///
    /// let cfg = DetectionConfig::qcii(569.1, 1687.2);
    /// let audio = waveform::synthesize(&cfg, 8000, 160).unwrap();
    ///
    /// let mut rx = ToneReceiverBuilder::new(8000).with_config(cfg).build().unwrap();
    /// let found: Vec<usize> = rx
    ///     .iter(audio.chunks(160))
    ///     .filter_map(|evt| evt.detection_index())
    ///     .collect();
    /// assert_eq!(vec![0], found);
    /// ```
    #[must_use = "iterators are lazy and do nothing unless consumed"]
    pub fn iter<'rx, I, B>(&'rx mut self, input: I) -> BlockIter<'rx, I::IntoIter>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[f32]>,
    {
        BlockIter {
            source: input.into_iter(),
            receiver: self,
            pending: VecDeque::new(),
        }
    }

    /// Input sampling rate, in Hz
    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Total input samples processed since the last reset
    pub fn input_sample_counter(&self) -> u64 {
        self.input_sample_counter
    }

    /// Number of detectors
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    /// True if there are no detectors
    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Detection configs, in index order
    pub fn configs(&self) -> impl Iterator<Item = &DetectionConfig> {
        self.detectors.iter().map(|inst| &inst.config)
    }

    /// Detection config for the given index
    pub fn config(&self, config_index: usize) -> Option<&DetectionConfig> {
        self.detectors.get(config_index).map(|inst| &inst.config)
    }

    /// Return every detector to idle and zero the counters
    pub fn reset(&mut self) {
        debug!(
            "receiver: reset after {} samples",
            self.input_sample_counter
        );
        for inst in self.detectors.iter_mut() {
            inst.detector.reset();
        }
        self.input_sample_counter = 0;
    }
}

impl TryFrom<&ToneReceiverBuilder> for ToneReceiver {
    type Error = ConfigError;

    fn try_from(cfg: &ToneReceiverBuilder) -> Result<Self, Self::Error> {
        let detectors = cfg
            .configs()
            .iter()
            .enumerate()
            .map(|(index, config)| {
                Detector::new(config)
                    .map(|detector| DetectorInstance {
                        config: config.clone(),
                        detector,
                    })
                    .map_err(|err| err.at_index(index))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            detectors,
            input_rate: cfg.input_rate(),
            input_sample_counter: 0,
        })
    }
}

/// Iterator over tone receiver events
///
/// Created by [`ToneReceiver::iter()`].
#[derive(Debug)]
pub struct BlockIter<'rx, I> {
    source: I,
    receiver: &'rx mut ToneReceiver,
    pending: VecDeque<ToneEvent>,
}

impl<'rx, I, B> Iterator for BlockIter<'rx, I>
where
    I: Iterator<Item = B>,
    B: AsRef<[f32]>,
{
    type Item = ToneEvent;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(evt) = self.pending.pop_front() {
                return Some(evt);
            }

            let block = self.source.next()?;
            self.pending.extend(self.receiver.process(block.as_ref()));
        }
    }
}

// one configured detector
#[derive(Clone, Debug)]
struct DetectorInstance {
    config: DetectionConfig,
    detector: Detector,
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::waveform;

    const RATE: u32 = 8000;
    const BLOCK: usize = 160;

    fn receiver(configs: &[DetectionConfig]) -> ToneReceiver {
        ToneReceiverBuilder::new(RATE)
            .with_configs(configs.iter().cloned())
            .build()
            .expect("bad config")
    }

    fn detections(rx: &mut ToneReceiver, audio: &[f32]) -> Vec<usize> {
        rx.iter(audio.chunks(BLOCK))
            .filter_map(|evt| evt.detection_index())
            .collect()
    }

    #[test]
    fn test_build() {
        let rx = receiver(&[
            DetectionConfig::dtmf("*123#"),
            DetectionConfig::qci('A', ['c', 'd'], ['e', 'f']),
            DetectionConfig::qcii(569.1, 1687.2),
        ]);
        assert_eq!(3, rx.len());
        assert!(!rx.is_empty());
        assert_eq!(
            vec!["DTMF", "QCI", "QCII"],
            rx.configs().map(|c| c.protocol()).collect::<Vec<_>>()
        );
        assert_eq!(Some(&DetectionConfig::qcii(569.1, 1687.2)), rx.config(2));
        assert_eq!(None, rx.config(3));

        let err = ToneReceiverBuilder::new(RATE)
            .with_config(DetectionConfig::dtmf("*123#"))
            .with_config(DetectionConfig::qci('Q', ['c', 'd'], ['e', 'f']))
            .build()
            .unwrap_err();
        assert_eq!(
            ConfigError::InvalidSeries('Q').at_index(1),
            err
        );
    }

    #[test]
    fn test_tagged_detections() {
        let dtmf = DetectionConfig::dtmf("*123#");
        let qci = DetectionConfig::qci('Z', ['d', 'p'], ['h', 'k']);
        let qcii = DetectionConfig::qcii(569.1, 1687.2);
        let mut rx = receiver(&[dtmf.clone(), qci.clone(), qcii.clone()]);

        for (index, cfg) in [&dtmf, &qci, &qcii].iter().enumerate() {
            let audio = waveform::synthesize(cfg, RATE, BLOCK).unwrap();
            assert_eq!(vec![index], detections(&mut rx, &audio));
        }

        let audio = waveform::synthesize(&qcii, RATE, BLOCK).unwrap();
        let before = rx.input_sample_counter();
        let _ = detections(&mut rx, &audio);
        assert_eq!(before + audio.len() as u64, rx.input_sample_counter());
    }

    #[test]
    fn test_duplicate_configs() {
        // identical configs both detect, with their own index
        let cfg = DetectionConfig::dtmf("159");
        let mut rx = receiver(&[cfg.clone(), cfg.clone()]);

        let audio = waveform::synthesize(&cfg, RATE, BLOCK).unwrap();
        assert_eq!(vec![0, 1], detections(&mut rx, &audio));
    }

    #[test]
    fn test_reset() {
        let cfg = DetectionConfig::qci('Z', ['d', 'p'], ['h', 'k']);
        let mut rx = receiver(&[cfg.clone()]);
        let audio = waveform::synthesize(&cfg, RATE, BLOCK).unwrap();

        // stop halfway through the page
        let half = (audio.len() / BLOCK / 2) * BLOCK;
        assert!(detections(&mut rx, &audio[0..half]).is_empty());
        rx.reset();
        assert_eq!(0, rx.input_sample_counter());

        // the rest of the page does not complete the detection
        assert!(detections(&mut rx, &audio[half..]).is_empty());

        // but a full page does
        assert_eq!(vec![0], detections(&mut rx, &audio));
    }

    #[test]
    fn test_debug_events() {
        let cfg = DetectionConfig::dtmf("1");
        let mut rx = receiver(&[cfg.clone()]);
        let audio = waveform::synthesize(&cfg, RATE, BLOCK).unwrap();

        let events: Vec<ToneEvent> = rx.iter(audio.chunks(BLOCK)).collect();
        let msgs: Vec<&str> = events
            .iter()
            .filter_map(|evt| match evt {
                ToneEvent::Debug(msg) => Some(msg.as_str()),
                _ => None,
            })
            .collect();
        assert!(msgs.iter().all(|m| m.starts_with("[#0 dtmf:1] [DTMF]: ")));

        let detect_at = events
            .iter()
            .position(|evt| evt.detection_index().is_some())
            .expect("no detection");
        assert!(detect_at > 0);
    }
}
