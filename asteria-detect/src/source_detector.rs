//! Descending-brightness connected-component source extraction (§4.6),
//! run over a calibration stack's signal/background/noise images.

use std::collections::HashMap;

use asteria_frame::ImageF64;

#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub adu: f64,
    pub sigma_adu: f64,
    /// Flux-weighted centroid `(i, j)`.
    pub centroid: (f64, f64),
    /// Dispersion matrix `(c_ii, c_ij, c_jj)`.
    pub dispersion: (f64, f64, f64),
    pub eigenvalues: (f64, f64),
    /// Angle of the principal eigenvector with the i-axis, radians.
    pub orientation: f64,
    pub member_pixels: Vec<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct SourceDetector {
    pub sigma_threshold: f64,
}

impl SourceDetector {
    pub fn new(sigma_threshold: f64) -> Self {
        Self { sigma_threshold }
    }

    /// Labels connected components over `signal` by descending brightness,
    /// scores each against `background`/`noise`, and retains only those
    /// passing the significance and eigenstructure checks.
    pub fn detect(&self, signal: &ImageF64, background: &ImageF64, noise: &ImageF64) -> Vec<Source> {
        let width = signal.width();
        let height = signal.height();
        let n = (width * height) as usize;

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_unstable_by(|&a, &b| {
            signal.samples()[b]
                .partial_cmp(&signal.samples()[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut labels = vec![0u32; n];
        let mut next_label = 1u32;

        for &p in &order {
            let x = (p as u32) % width;
            let y = (p as u32) / width;

            let mut neighbor_labels: Vec<u32> = Vec::new();
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                        continue;
                    }
                    let np = (ny as u32 * width + nx as u32) as usize;
                    let l = labels[np];
                    if l != 0 && !neighbor_labels.contains(&l) {
                        neighbor_labels.push(l);
                    }
                }
            }

            labels[p] = match neighbor_labels.len() {
                0 => {
                    let l = next_label;
                    next_label += 1;
                    l
                }
                1 => neighbor_labels[0],
                _ => 0, // faint saddle between brighter sources: leave unlabeled
            };
        }

        let mut groups: HashMap<u32, Vec<u32>> = HashMap::new();
        for (p, &l) in labels.iter().enumerate() {
            if l != 0 {
                groups.entry(l).or_default().push(p as u32);
            }
        }

        let mut sources = Vec::new();
        for member_pixels in groups.into_values() {
            if let Some(source) = self.score(&member_pixels, width, signal, background, noise) {
                sources.push(source);
            }
        }
        sources
    }

    fn score(
        &self,
        member_pixels: &[u32],
        width: u32,
        signal: &ImageF64,
        background: &ImageF64,
        noise: &ImageF64,
    ) -> Option<Source> {
        let mut adu = 0.0_f64;
        let mut var_sum = 0.0_f64;
        let mut sum_flux = 0.0_f64;
        let mut sum_i = 0.0_f64;
        let mut sum_j = 0.0_f64;

        for &p in member_pixels {
            let x = (p % width) as f64;
            let y = (p / width) as f64;
            let flux = signal.samples()[p as usize] - background.samples()[p as usize];
            adu += flux;
            var_sum += noise.samples()[p as usize].powi(2);
            sum_flux += flux;
            sum_i += x * flux;
            sum_j += y * flux;
        }

        let sigma_adu = var_sum.sqrt();
        if sigma_adu == 0.0 || adu / sigma_adu <= self.sigma_threshold {
            return None;
        }

        let ci = sum_i / sum_flux;
        let cj = sum_j / sum_flux;

        let mut c_ii = 0.0_f64;
        let mut c_ij = 0.0_f64;
        let mut c_jj = 0.0_f64;
        for &p in member_pixels {
            let x = (p % width) as f64;
            let y = (p / width) as f64;
            let flux = signal.samples()[p as usize] - background.samples()[p as usize];
            c_ii += flux * (x - ci).powi(2);
            c_ij += flux * (x - ci) * (y - cj);
            c_jj += flux * (y - cj).powi(2);
        }
        c_ii /= sum_flux;
        c_ij /= sum_flux;
        c_jj /= sum_flux;

        let (lambda1, lambda2) = dispersion_eigenvalues(c_ii, c_ij, c_jj)?;
        let orientation = dispersion_orientation(c_ii, c_ij, c_jj, lambda1);

        Some(Source {
            adu,
            sigma_adu,
            centroid: (ci, cj),
            dispersion: (c_ii, c_ij, c_jj),
            eigenvalues: (lambda1, lambda2),
            orientation,
            member_pixels: member_pixels.to_vec(),
        })
    }
}

/// Closed-form eigenvalues of the 2x2 symmetric dispersion matrix. Returns
/// `None` if the discriminant is negative or either eigenvalue is negative,
/// rejecting the source as non-stellar.
fn dispersion_eigenvalues(c_ii: f64, c_ij: f64, c_jj: f64) -> Option<(f64, f64)> {
    let trace = c_ii + c_jj;
    let det = c_ii * c_jj - c_ij * c_ij;
    let discriminant = trace * trace - 4.0 * det;
    if discriminant < 0.0 {
        return None;
    }
    let sqrt_disc = discriminant.sqrt();
    let lambda1 = (trace + sqrt_disc) / 2.0;
    let lambda2 = (trace - sqrt_disc) / 2.0;
    if lambda1 < 0.0 || lambda2 < 0.0 {
        return None;
    }
    Some((lambda1, lambda2))
}

/// Angle (radians) of the principal eigenvector (`lambda1`) with the i-axis.
fn dispersion_orientation(c_ii: f64, c_ij: f64, c_jj: f64, lambda1: f64) -> f64 {
    if c_ij == 0.0 {
        return if c_ii <= c_jj { 0.0 } else { std::f64::consts::FRAC_PI_2 };
    }
    (lambda1 - c_ii).atan2(c_ij)
}
