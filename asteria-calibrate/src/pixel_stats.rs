//! Per-pixel signal/noise statistics and background estimation (§4.5).

use std::sync::Arc;

use asteria_frame::{Frame, ImageF64};

/// Trimmed mean and trimmed population standard deviation across the
/// stack, with a symmetric 5% trim fraction: sort, drop the lowest and
/// highest `floor(0.05*N)` values, then compute mean/stdev over the rest.
pub fn trimmed_signal_and_noise(stack: &[Arc<Frame>]) -> (ImageF64, ImageF64) {
    assert!(!stack.is_empty());
    let width = stack[0].width();
    let height = stack[0].height();
    let n = stack.len();
    let trim = (0.05 * n as f64).floor() as usize;

    let mut signal = vec![0.0_f64; (width * height) as usize];
    let mut noise = vec![0.0_f64; (width * height) as usize];

    let mut samples = vec![0.0_f64; n];
    for p in 0..(width * height) as usize {
        for (k, frame) in stack.iter().enumerate() {
            samples[k] = frame.samples()[p] as f64;
        }
        samples.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let kept = &samples[trim..n - trim];
        let mean = kept.iter().sum::<f64>() / kept.len() as f64;
        let var = kept.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / kept.len() as f64;
        signal[p] = mean;
        noise[p] = var.sqrt();
    }

    let epoch_us = mean_epoch_us(stack);
    (
        ImageF64::new(width, height, epoch_us, signal),
        ImageF64::new(width, height, epoch_us, noise),
    )
}

/// Mean capture epoch of the stack, used for the GMST computation (§4.5).
pub fn mean_epoch_us(stack: &[Arc<Frame>]) -> i64 {
    let sum: i128 = stack.iter().map(|f| f.epoch_us() as i128).sum();
    (sum / stack.len() as i128) as i64
}

/// Source-free background estimate: median over a square window of
/// half-width `hw`, clipped to image bounds.
pub fn median_background(signal: &ImageF64, hw: u32) -> ImageF64 {
    let width = signal.width();
    let height = signal.height();
    let mut out = vec![0.0_f64; (width * height) as usize];

    for y in 0..height {
        for x in 0..width {
            let x0 = x.saturating_sub(hw);
            let x1 = (x + hw).min(width - 1);
            let y0 = y.saturating_sub(hw);
            let y1 = (y + hw).min(height - 1);

            let mut window = Vec::with_capacity(((x1 - x0 + 1) * (y1 - y0 + 1)) as usize);
            for wy in y0..=y1 {
                for wx in x0..=x1 {
                    window.push(signal.get(wx, wy));
                }
            }
            window.sort_by(|a, b| a.partial_cmp(b).unwrap());
            out[(y * width + x) as usize] = median(&window);
        }
    }

    ImageF64::new(width, height, signal.epoch_us(), out)
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}
