//! Single-frequency energy estimation

/// Signal energy at one frequency
///
/// Measures the squared magnitude of the `target_hz` component
/// of `block`, which is sampled at `input_rate` Hz. This is the
/// Goertzel algorithm: a second-order resonator tuned to the
/// target frequency is run over every sample of the block, and
/// the energy is read out of its two state variables.
///
/// The result is *not* normalized by the block length. A pure
/// tone of amplitude `a` that is exactly on-frequency produces
/// an energy of roughly `(a · N / 2)²` for a block of `N`
/// samples. Any thresholds applied to this value are only
/// meaningful for blocks of a consistent duration.
///
/// Frequencies outside of `[0, input_rate / 2]` will alias.
/// The output is still a valid number, but it is meaningless.
///
/// ```
/// use pagetone::energy;
///
/// let rate = 8000;
/// let tone: Vec<f32> = (0..400)
///     .map(|n| (2.0 * std::f32::consts::PI * 1000.0 * n as f32 / rate as f32).sin())
///     .collect();
///
/// assert!(energy(&tone, 1000.0, rate) > 100.0 * energy(&tone, 1500.0, rate));
/// ```
pub fn energy(block: &[f32], target_hz: f32, input_rate: u32) -> f32 {
    let coeff = coefficient(target_hz, input_rate);

    // q1 is the most recent resonator output, q2 the one before it
    let (q1, q2) = block.iter().fold((0.0f32, 0.0f32), |(q1, q2), &sa| {
        (coeff * q1 - q2 + sa, q1)
    });

    f32::max(q1 * q1 + q2 * q2 - q1 * q2 * coeff, 0.0f32)
}

/// Energy at several frequencies
///
/// Runs [`energy()`] once for every frequency in `targets_hz`
/// and writes the outputs to `out`, in order. `out` is cleared
/// first.
pub fn energies<'a, I>(block: &[f32], targets_hz: I, input_rate: u32, out: &mut Vec<f32>)
where
    I: IntoIterator<Item = &'a f32>,
{
    out.clear();
    out.extend(
        targets_hz
            .into_iter()
            .map(|&hz| energy(block, hz, input_rate)),
    );
}

// Resonator feedback coefficient, 2·cos(2π·f/fs)
#[inline]
fn coefficient(target_hz: f32, input_rate: u32) -> f32 {
    let omega = 2.0f32 * std::f32::consts::PI * target_hz / input_rate as f32;
    2.0f32 * f32::cos(omega)
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    use crate::waveform::{silence, tones};

    const RATE: u32 = 8000;

    #[test]
    fn test_energy_silence() {
        assert_eq!(0.0f32, energy(&silence(400), 697.0, RATE));
        assert_eq!(0.0f32, energy(&[], 697.0, RATE));
    }

    #[test]
    fn test_energy_on_frequency() {
        // an on-frequency tone of amplitude a has energy ≈ (a·N/2)²
        let block = tones(&[1000.0], 0.5, 400, RATE);
        let expect = (0.5f32 * 400.0 / 2.0).powi(2);
        assert_approx_eq!(energy(&block, 1000.0, RATE), expect, expect * 0.02);
    }

    #[test]
    fn test_energy_selectivity() {
        // one bin is fs / N wide; anything farther than that
        // must measure weaker than the true frequency
        for &len in &[160usize, 400, 1024] {
            let bin_hz = RATE as f32 / len as f32;
            let block = tones(&[941.0], 0.3, len, RATE);
            let on = energy(&block, 941.0, RATE);
            for k in 1..6 {
                let off = 941.0 + 1.5 * bin_hz * k as f32;
                assert!(on > energy(&block, off, RATE), "len {} offset {}", len, off);
                let off = 941.0 - 1.5 * bin_hz * k as f32;
                assert!(on > energy(&block, off, RATE), "len {} offset {}", len, off);
            }
        }
    }

    #[test]
    fn test_energies() {
        let block = tones(&[697.0, 1209.0], 0.3, 160, RATE);
        let mut out = vec![1.0f32; 12];
        energies(&block, &[697.0, 1209.0, 1633.0], RATE, &mut out);
        assert_eq!(3, out.len());
        assert_eq!(out[0], energy(&block, 697.0, RATE));
        assert!(out[0] > 100.0);
        assert!(out[1] > 100.0);
        assert!(out[2] < out[1]);
    }
}
