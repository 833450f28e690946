//! Readnoise estimation (§9 Open Question 4): the source hard-codes 5.0 ADU
//! with a TODO; here it is estimated from the low-signal tail of the
//! noise-vs-signal scatter, where shot noise is negligible and the measured
//! per-pixel noise is dominated by read noise.

use asteria_frame::ImageF64;

/// Estimates the readnoise floor as the median of `noise` among pixels
/// whose `signal` falls at or below the given low-signal percentile
/// (e.g. 0.1 for the faintest 10% of pixels).
pub fn estimate_readnoise(signal: &ImageF64, noise: &ImageF64, low_signal_percentile: f64) -> f64 {
    assert_eq!(signal.samples().len(), noise.samples().len());
    assert!(!signal.samples().is_empty());

    let mut signal_sorted: Vec<f64> = signal.samples().to_vec();
    signal_sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let cutoff_idx = ((signal_sorted.len() - 1) as f64 * low_signal_percentile).round() as usize;
    let cutoff = signal_sorted[cutoff_idx];

    let mut low_signal_noise: Vec<f64> = signal
        .samples()
        .iter()
        .zip(noise.samples())
        .filter(|(&s, _)| s <= cutoff)
        .map(|(_, &n)| n)
        .collect();

    low_signal_noise.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = low_signal_noise.len();
    if n % 2 == 1 {
        low_signal_noise[n / 2]
    } else {
        (low_signal_noise[n / 2 - 1] + low_signal_noise[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimates_readnoise_from_faintest_pixels() {
        // Half the image is faint background with noise ~2.0, half is
        // bright source with inflated shot noise ~20.0.
        let mut signal = vec![10.0; 50];
        signal.extend(vec![5000.0; 50]);
        let mut noise = vec![2.0; 50];
        noise.extend(vec![20.0; 50]);

        let signal_img = ImageF64::new(10, 10, 0, signal);
        let noise_img = ImageF64::new(10, 10, 0, noise);

        let estimate = estimate_readnoise(&signal_img, &noise_img, 0.4);
        assert!((estimate - 2.0).abs() < 1e-9);
    }
}
