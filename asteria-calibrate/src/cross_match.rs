//! Covariance-weighted mutual-nearest-neighbor cross-matching between
//! extracted sources and projected reference stars (§4.5).

use asteria_detect::Source;
use nalgebra::Matrix2;

use crate::catalog::ReferenceStar;

#[derive(Debug, Clone, PartialEq)]
pub struct CrossMatch {
    pub source_index: usize,
    pub reference_index: usize,
    pub distance: f64,
}

const MAX_MATCH_DISTANCE: f64 = 20.0;

/// `Σ⁻¹` from a source's flux-weighted dispersion matrix. Returns `None`
/// if the dispersion matrix is singular.
fn inverse_covariance(source: &Source) -> Option<Matrix2<f64>> {
    let (c_ii, c_ij, c_jj) = source.dispersion;
    let m = Matrix2::new(c_ii, c_ij, c_ij, c_jj);
    m.try_inverse()
}

fn covariance_weighted_distance(source: &Source, inv_cov: &Matrix2<f64>, star_pixel: (f64, f64)) -> f64 {
    let d = nalgebra::Vector2::new(star_pixel.0 - source.centroid.0, star_pixel.1 - source.centroid.1);
    (d.transpose() * inv_cov * d)[(0, 0)].max(0.0).sqrt()
}

/// Matches each visible, projected reference star against the nearest
/// source (and vice versa). A match is accepted only if it is mutual and
/// within [`MAX_MATCH_DISTANCE`].
pub fn cross_match(sources: &[Source], stars: &[ReferenceStar]) -> Vec<CrossMatch> {
    let inv_covs: Vec<Option<Matrix2<f64>>> = sources.iter().map(inverse_covariance).collect();

    let visible_star_indices: Vec<usize> = stars
        .iter()
        .enumerate()
        .filter(|(_, s)| s.visible && s.projected_pixel.is_some())
        .map(|(i, _)| i)
        .collect();

    // nearest_star_for[s] = (star_index, distance)
    let mut nearest_star_for: Vec<Option<(usize, f64)>> = vec![None; sources.len()];
    for (s_idx, source) in sources.iter().enumerate() {
        let Some(inv_cov) = &inv_covs[s_idx] else { continue };
        for &r_idx in &visible_star_indices {
            let pixel = stars[r_idx].projected_pixel.unwrap();
            let d = covariance_weighted_distance(source, inv_cov, pixel);
            let better = match nearest_star_for[s_idx] {
                Some((_, best)) => d < best,
                None => true,
            };
            if better {
                nearest_star_for[s_idx] = Some((r_idx, d));
            }
        }
    }

    // nearest_source_for[r] = (source_index, distance)
    let mut nearest_source_for: Vec<Option<(usize, f64)>> = vec![None; stars.len()];
    for (s_idx, source) in sources.iter().enumerate() {
        let Some(inv_cov) = &inv_covs[s_idx] else { continue };
        for &r_idx in &visible_star_indices {
            let pixel = stars[r_idx].projected_pixel.unwrap();
            let d = covariance_weighted_distance(source, inv_cov, pixel);
            let better = match nearest_source_for[r_idx] {
                Some((_, best)) => d < best,
                None => true,
            };
            if better {
                nearest_source_for[r_idx] = Some((s_idx, d));
            }
        }
    }

    let mut matches = Vec::new();
    for (s_idx, nearest) in nearest_star_for.into_iter().enumerate() {
        let Some((r_idx, distance)) = nearest else { continue };
        if distance > MAX_MATCH_DISTANCE {
            continue;
        }
        if let Some((mutual_s_idx, _)) = nearest_source_for[r_idx] {
            if mutual_s_idx == s_idx {
                matches.push(CrossMatch {
                    source_index: s_idx,
                    reference_index: r_idx,
                    distance,
                });
            }
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_at(i: f64, j: f64) -> Source {
        Source {
            adu: 100.0,
            sigma_adu: 10.0,
            centroid: (i, j),
            dispersion: (1.0, 0.0, 1.0),
            eigenvalues: (1.0, 1.0),
            orientation: 0.0,
            member_pixels: vec![],
        }
    }

    fn star_at(i: f64, j: f64) -> ReferenceStar {
        ReferenceStar {
            ra_rad: 0.0,
            dec_rad: 0.0,
            mag: 5.0,
            camera_unit_vector: None,
            visible: true,
            projected_pixel: Some((i, j)),
        }
    }

    #[test]
    fn mutual_nearest_neighbors_are_matched() {
        let sources = vec![source_at(10.0, 10.0), source_at(100.0, 100.0)];
        let stars = vec![star_at(10.2, 10.1), star_at(99.8, 100.3)];

        let matches = cross_match(&sources, &stars);
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn non_mutual_candidate_is_rejected() {
        // Two sources both closest to the same single star: only one can
        // be the star's nearest source, so at most one match survives.
        let sources = vec![source_at(10.0, 10.0), source_at(10.5, 10.5)];
        let stars = vec![star_at(10.0, 10.0)];

        let matches = cross_match(&sources, &stars);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].source_index, 0);
    }

    #[test]
    fn distance_beyond_threshold_is_rejected() {
        let sources = vec![source_at(0.0, 0.0)];
        let stars = vec![star_at(1000.0, 1000.0)];
        let matches = cross_match(&sources, &stars);
        assert!(matches.is_empty());
    }
}
