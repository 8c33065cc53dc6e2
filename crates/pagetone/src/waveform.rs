//! Test signal synthesis
//!
//! Generates audio which a detector built from the same
//! [`DetectionConfig`] will recognize. Useful for demos, for
//! exercising alerting scripts, and for tests.

use crate::config::{ConfigError, DetectionConfig};
use crate::detector::{seconds_to_samples, Detector};

const TWOPI: f64 = 2.0 * std::f64::consts::PI;

/// Leading and trailing silence, in blocks
const PAD_BLOCKS: usize = 2;

/// Sum of sinusoids
///
/// Generates `len` samples of the sum of sine waves at each of
/// the given `freqs`, in Hz, each with the given `amplitude`.
/// Every tone starts at zero phase.
///
/// ```
/// use pagetone::waveform::tones;
///
/// let sig = tones(&[1000.0], 0.5, 8, 8000);
/// assert_eq!(8, sig.len());
/// assert!(sig[2] > 0.49);
/// ```
pub fn tones(freqs: &[f32], amplitude: f32, len: usize, input_rate: u32) -> Vec<f32> {
    let step: Vec<f64> = freqs
        .iter()
        .map(|f| TWOPI * *f as f64 / input_rate as f64)
        .collect();

    (0..len)
        .map(|n| {
            step.iter()
                .map(|w| (w * n as f64).sin() as f32 * amplitude)
                .sum()
        })
        .collect()
}

/// Digital silence
pub fn silence(len: usize) -> Vec<f32> {
    vec![0.0f32; len]
}

/// Synthesize a page
///
/// Generates a signal which satisfies the timing requirements
/// for the given `config` when it is processed in blocks of
/// exactly `block_len` samples at `input_rate`. Tones are held
/// for whole blocks. The signal begins and ends with
/// silence.
///
/// Blocks longer than about 20 ms may be too coarse to fit
/// the DTMF timing windows.
///
/// ```
/// use pagetone::{waveform, DetectionConfig};
///
/// let cfg: DetectionConfig = "dtmf:*123#".parse().unwrap();
/// let sig = waveform::synthesize(&cfg, 8000, 160).unwrap();
/// assert_eq!(0, sig.len() % 160);
/// ```
pub fn synthesize(
    config: &DetectionConfig,
    input_rate: u32,
    block_len: usize,
) -> Result<Vec<f32>, ConfigError> {
    const AMPLITUDE: f32 = 0.4;

    let blocks = |secs: f32| -> usize {
        let sa = seconds_to_samples(secs, input_rate) as usize;
        (sa + block_len - 1) / block_len
    };

    let mut segments: Vec<(Vec<f32>, usize)> = vec![(vec![], PAD_BLOCKS)];

    match Detector::new(config)? {
        Detector::Dtmf(det) => {
            // two blocks of onset, then the digit itself
            let tone = PAD_BLOCKS + blocks(0.06);
            let gap = 1 + usize::max(2, blocks(0.02)) + 1;
            for digit in det.sequence() {
                segments.push((vec![digit.row_hz, digit.column_hz], tone));
                segments.push((vec![], gap));
            }
        }
        Detector::Qci(det) => {
            segments.push((det.first_pair_hz().to_vec(), 2 + blocks(1.0)));
            segments.push((vec![], blocks(0.12)));
            segments.push((det.second_pair_hz().to_vec(), 1 + blocks(0.8) + 1));
        }
        Detector::Qcii(det) => {
            let (tone_a, tone_b) = det.tones();
            let a_held = blocks(1.0);
            let remain = seconds_to_samples(3.2, input_rate) as usize - a_held * block_len;
            let b_held = (remain + block_len - 1) / block_len;

            segments.push((vec![tone_a], 2 + a_held));
            segments.push((vec![tone_b], 1 + b_held + 1));
        }
    }

    segments.push((vec![], PAD_BLOCKS));

    let total: usize = segments.iter().map(|(_, n)| n * block_len).sum();
    let mut out = Vec::with_capacity(total);
    for (freqs, count) in segments {
        let len = count * block_len;
        if freqs.is_empty() {
            out.extend(silence(len));
        } else {
            out.extend(tones(&freqs, AMPLITUDE, len, input_rate));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    use crate::detector::ToneDetector;

    fn count_detections(config: &DetectionConfig, input_rate: u32, block_len: usize) -> usize {
        let sig = synthesize(config, input_rate, block_len).expect("bad config");
        let mut det = Detector::new(config).expect("bad config");
        sig.chunks(block_len)
            .filter_map(|blk| det.process(blk, input_rate))
            .filter(|evt| evt.is_detection())
            .count()
    }

    #[test]
    fn test_tones() {
        let sig = tones(&[1000.0, 2000.0], 0.25, 16, 8000);
        assert_eq!(16, sig.len());
        assert_approx_eq!(0.0, sig[0]);
        // sin(π/4) + sin(π/2)
        assert_approx_eq!(0.25 * (0.70710678 + 1.0), sig[1], 1e-5);
        assert_eq!(vec![0.0f32; 3], silence(3));
        assert!(tones(&[], 1.0, 4, 8000).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_synthesize_detects() {
        let configs = [
            DetectionConfig::dtmf("*123#"),
            DetectionConfig::dtmf("A0B9"),
            DetectionConfig::qci('Z', ['d', 'p'], ['h', 'k']),
            DetectionConfig::qci('A', ['c', 'n'], ['f', 'm']),
            DetectionConfig::qcii(569.1, 1687.2),
        ];
        for cfg in configs.iter() {
            for block_len in [80, 128, 160] {
                assert_eq!(
                    1,
                    count_detections(cfg, 8000, block_len),
                    "{} @ {}",
                    cfg,
                    block_len
                );
            }
        }
    }

    #[test]
    fn test_synthesize_invalid() {
        assert_eq!(
            Err(ConfigError::InvalidDtmfSymbol('X')),
            synthesize(&DetectionConfig::dtmf("12x"), 8000, 160)
        );
    }
}
