//! The calibration orchestrator (§4.5): pixel statistics, source
//! extraction, reference-star projection, cross-matching, and LM
//! refinement of the camera model and SEZ-to-camera attitude.

use std::sync::Arc;

use asteria_detect::{Source, SourceDetector};
use asteria_frame::{Frame, ImageF64};
use asteria_geometry::{
    finite_difference_jacobian, gmst_hours, julian_date, project_bcrf_to_cam, CameraModel, LMConfig,
    LMError, LMSolver, Projection,
};
use nalgebra::{DMatrix, DVector, Quaternion, UnitQuaternion};

use crate::catalog::ReferenceStar;
use crate::cross_match::{cross_match, CrossMatch};
use crate::pixel_stats::{mean_epoch_us, median_background, trimmed_signal_and_noise};
use crate::readnoise::estimate_readnoise;

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("calibration stack must contain at least one frame")]
    EmptyStack,
    #[error("too few cross-matches ({found}) to fit {params} camera and orientation parameters")]
    TooFewMatches { found: usize, params: usize },
    #[error("LM refinement failed: {0}")]
    Lm(#[from] LMError),
}

#[derive(Debug, Clone, Copy)]
pub struct CalibrationParams {
    pub bkg_median_filter_half_width: u32,
    pub source_detection_threshold_sigmas: f64,
    pub ref_star_faint_mag_limit: f64,
}

/// A snapshot of a calibration run: the input stack, derived images, the
/// extracted sources, the projected/cross-matched catalog, and the fitted
/// camera model and site attitude (§3).
#[derive(Debug, Clone)]
pub struct CalibrationInventory {
    pub stack: Vec<Arc<Frame>>,
    pub signal: ImageF64,
    pub background: ImageF64,
    pub noise: ImageF64,
    pub sources: Vec<Source>,
    pub reference_stars: Vec<ReferenceStar>,
    pub cross_matches: Vec<CrossMatch>,
    pub mean_epoch_us: i64,
    pub camera_model: CameraModel,
    /// Attitude rotating the local SEZ frame into the camera frame.
    pub quaternion: UnitQuaternion<f64>,
    pub lon_deg: f64,
    pub lat_deg: f64,
    pub alt_m: f64,
    pub readnoise_adu: f64,
}

pub struct CalibrationEngine {
    params: CalibrationParams,
}

impl CalibrationEngine {
    pub fn new(params: CalibrationParams) -> Self {
        Self { params }
    }

    /// Runs one calibration cycle, producing a new inventory from `stack`
    /// against `prior`'s camera model, orientation, and site coordinates.
    ///
    /// On a degenerate or failing LM fit the prior inventory is returned
    /// unchanged (§7: "LM failures retain the previous CalibrationInventory").
    pub fn run(
        &self,
        stack: &[Arc<Frame>],
        prior: &CalibrationInventory,
        catalog: &[ReferenceStar],
    ) -> Result<CalibrationInventory, CalibrationError> {
        if stack.is_empty() {
            return Err(CalibrationError::EmptyStack);
        }

        let (signal, noise) = trimmed_signal_and_noise(stack);
        let background = median_background(&signal, self.params.bkg_median_filter_half_width);
        let mean_epoch_us = mean_epoch_us(stack);

        let detector = SourceDetector::new(self.params.source_detection_threshold_sigmas);
        let sources = detector.detect(&signal, &background, &noise);

        let gmst_rad = (gmst_hours(julian_date(mean_epoch_us)) * 15.0).to_radians();
        let lon_rad = prior.lon_deg.to_radians();
        let lat_rad = prior.lat_deg.to_radians();

        let projected = project_catalog(
            catalog,
            &prior.camera_model,
            &prior.quaternion,
            gmst_rad,
            lon_rad,
            lat_rad,
            self.params.ref_star_faint_mag_limit,
        );

        let matches = cross_match(&sources, &projected);

        let n_cam = prior.camera_model.num_parameters();
        let n_params = n_cam + 4;
        let n_obs = 2 * matches.len();
        if n_obs < n_params {
            return Err(CalibrationError::TooFewMatches { found: matches.len(), params: n_params });
        }

        let mut initial = prior.camera_model.parameters();
        let q = prior.quaternion.quaternion();
        initial.extend_from_slice(&[q.w(), q.i(), q.j(), q.k()]);
        let initial_params = DVector::from_vec(initial);

        let mut data = Vec::with_capacity(n_obs);
        let mut star_coords = Vec::with_capacity(matches.len());
        for m in &matches {
            let (ci, cj) = sources[m.source_index].centroid;
            data.push(ci);
            data.push(cj);
            let star = &projected[m.reference_index];
            star_coords.push((star.ra_rad, star.dec_rad));
        }
        let data = DVector::from_vec(data);

        let base_camera = prior.camera_model.clone();
        let data_for_fallback = data.clone();
        let model = move |p: &DVector<f64>| -> DVector<f64> {
            residual_model(p, n_cam, &base_camera, &star_coords, &data_for_fallback, gmst_rad, lon_rad, lat_rad)
        };

        let steps: Vec<f64> = initial_params.iter().map(|v| (v.abs() * 1e-6).max(1e-8)).collect();
        let jacobian = |p: &DVector<f64>| -> DMatrix<f64> { finite_difference_jacobian(&model, p, &steps) };

        let covariance = DMatrix::<f64>::identity(n_obs, n_obs);
        let config = LMConfig::default();
        let solver = match LMSolver::new(data, &covariance, &model, &jacobian, config) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "LM solver construction failed, retaining prior inventory");
                return Ok(prior.clone());
            }
        };

        let result = match solver.fit(initial_params) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "LM refinement failed, retaining prior inventory");
                return Ok(prior.clone());
            }
        };

        if !result.converged {
            tracing::warn!(iterations = result.iterations, "LM refinement hit its iteration budget without converging");
        }

        let mut camera_model = prior.camera_model.clone();
        if let Err(e) = camera_model.set_parameters(&result.params.as_slice()[..n_cam]) {
            tracing::error!(error = %e, "fitted camera parameters were rejected, retaining prior inventory");
            return Ok(prior.clone());
        }
        let tail = &result.params.as_slice()[n_cam..n_cam + 4];
        let quaternion = UnitQuaternion::new_normalize(Quaternion::new(tail[0], tail[1], tail[2], tail[3]));

        let readnoise_adu = estimate_readnoise(&signal, &noise, 0.1);

        Ok(CalibrationInventory {
            stack: stack.to_vec(),
            signal,
            background,
            noise,
            sources,
            reference_stars: projected,
            cross_matches: matches,
            mean_epoch_us,
            camera_model,
            quaternion,
            lon_deg: prior.lon_deg,
            lat_deg: prior.lat_deg,
            alt_m: prior.alt_m,
            readnoise_adu,
        })
    }
}

/// Projects each matched star through the candidate parameters and returns
/// the stacked `(i, j)` predictions. The LM step renormalizes the
/// quaternion implicitly on every evaluation (the tail four components of
/// `p`), rather than mutating the raw parameter vector between steps, since
/// [`LMSolver::fit`] does not expose a per-iteration hook (§4.9, §4.5).
///
/// If a star momentarily rotates behind the camera or its projection is
/// otherwise undefined mid-fit, the fallback is the observed pixel itself,
/// contributing a zero residual rather than a divergent one.
fn residual_model(
    p: &DVector<f64>,
    n_cam: usize,
    base_camera: &CameraModel,
    star_coords: &[(f64, f64)],
    observed: &DVector<f64>,
    gmst_rad: f64,
    lon_rad: f64,
    lat_rad: f64,
) -> DVector<f64> {
    let mut camera = base_camera.clone();
    let _ = camera.set_parameters(&p.as_slice()[..n_cam]);
    let tail = &p.as_slice()[n_cam..n_cam + 4];
    let quat = UnitQuaternion::new_normalize(Quaternion::new(tail[0], tail[1], tail[2], tail[3]));

    let mut out = Vec::with_capacity(star_coords.len() * 2);
    for (idx, &(ra, dec)) in star_coords.iter().enumerate() {
        let r_cam = project_bcrf_to_cam(ra, dec, gmst_rad, lon_rad, lat_rad, &quat);
        match camera.project(&r_cam) {
            Some((i, j)) => {
                out.push(i);
                out.push(j);
            }
            None => {
                out.push(observed[2 * idx]);
                out.push(observed[2 * idx + 1]);
            }
        }
    }
    DVector::from_vec(out)
}

/// Projects the catalog's stars brighter than `faint_mag_limit` into the
/// camera frame, marking each visible iff its projected pixel falls inside
/// the image bounds.
fn project_catalog(
    catalog: &[ReferenceStar],
    camera: &CameraModel,
    quat: &UnitQuaternion<f64>,
    gmst_rad: f64,
    lon_rad: f64,
    lat_rad: f64,
    faint_mag_limit: f64,
) -> Vec<ReferenceStar> {
    catalog
        .iter()
        .map(|star| {
            let mut star = star.clone();
            if star.mag > faint_mag_limit {
                star.visible = false;
                star.projected_pixel = None;
                return star;
            }
            let r_cam = project_bcrf_to_cam(star.ra_rad, star.dec_rad, gmst_rad, lon_rad, lat_rad, quat);
            star.camera_unit_vector = Some(r_cam);
            match camera.project(&r_cam) {
                Some((i, j)) if i >= 0.0 && i <= camera.width() as f64 && j >= 0.0 && j <= camera.height() as f64 => {
                    star.visible = true;
                    star.projected_pixel = Some((i, j));
                }
                _ => {
                    star.visible = false;
                    star.projected_pixel = None;
                }
            }
            star
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use asteria_frame::FieldOrder;
    use nalgebra::Vector3;

    fn flat_frame(epoch_us: i64, value: u8) -> Arc<Frame> {
        Frame::new(200, 200, epoch_us, FieldOrder::Progressive, vec![value; 200 * 200]).into_shared()
    }

    fn reference_star(ra_rad: f64, dec_rad: f64, mag: f64) -> ReferenceStar {
        ReferenceStar {
            ra_rad,
            dec_rad,
            mag,
            camera_unit_vector: None,
            visible: false,
            projected_pixel: None,
        }
    }

    fn base_inventory(camera: CameraModel, quaternion: UnitQuaternion<f64>) -> CalibrationInventory {
        CalibrationInventory {
            stack: vec![],
            signal: ImageF64::filled(1, 1, 0, 0.0),
            background: ImageF64::filled(1, 1, 0, 0.0),
            noise: ImageF64::filled(1, 1, 0, 0.0),
            sources: vec![],
            reference_stars: vec![],
            cross_matches: vec![],
            mean_epoch_us: 0,
            camera_model: camera,
            quaternion,
            lon_deg: 0.0,
            lat_deg: 51.0,
            alt_m: 0.0,
            readnoise_adu: 5.0,
        }
    }

    #[test]
    fn empty_stack_is_rejected() {
        let camera = CameraModel::pinhole(200, 200, 500.0, 500.0, 100.0, 100.0).unwrap();
        let prior = base_inventory(camera, UnitQuaternion::identity());
        let engine = CalibrationEngine::new(CalibrationParams {
            bkg_median_filter_half_width: 5,
            source_detection_threshold_sigmas: 3.0,
            ref_star_faint_mag_limit: 6.0,
        });
        let err = engine.run(&[], &prior, &[]).unwrap_err();
        assert!(matches!(err, CalibrationError::EmptyStack));
    }

    #[test]
    fn too_few_matches_is_rejected_and_does_not_panic() {
        let camera = CameraModel::pinhole(200, 200, 500.0, 500.0, 100.0, 100.0).unwrap();
        let prior = base_inventory(camera, UnitQuaternion::identity());
        let engine = CalibrationEngine::new(CalibrationParams {
            bkg_median_filter_half_width: 5,
            source_detection_threshold_sigmas: 3.0,
            ref_star_faint_mag_limit: 6.0,
        });
        let stack: Vec<Arc<Frame>> = (0..10).map(|i| flat_frame(i, 10)).collect();
        let err = engine.run(&stack, &prior, &[]).unwrap_err();
        assert!(matches!(err, CalibrationError::TooFewMatches { .. }));
    }

    #[test]
    fn single_bright_source_is_detected_and_projected_catalog_feeds_cross_match() {
        let width = 200;
        let height = 200;
        let pi = width as f64 / 2.0;
        let pj = height as f64 / 2.0;
        let camera = CameraModel::pinhole(width, height, 800.0, 800.0, pi, pj).unwrap();

        // A star placed directly along the boresight (SEZ zenith under the
        // identity attitude) so it projects to the principal point.
        let lat = 51.0_f64.to_radians();
        let lon = 0.0_f64;
        let mean_epoch_us = 1_600_000_000_000_000;
        let gmst_rad = (gmst_hours(julian_date(mean_epoch_us)) * 15.0).to_radians();
        let ra = gmst_rad - lon;
        let dec = lat;

        let mut stack = Vec::new();
        for i in 0..20 {
            let mut samples = vec![10u8; (width * height) as usize];
            samples[(pj as u32 * width + pi as u32) as usize] = 200;
            stack.push(Frame::new(width, height, mean_epoch_us + i, FieldOrder::Progressive, samples).into_shared());
        }

        let prior = base_inventory(camera, UnitQuaternion::identity());
        let prior = CalibrationInventory { lon_deg: lon.to_degrees(), lat_deg: lat.to_degrees(), ..prior };
        let catalog = vec![reference_star(ra, dec, 2.0)];

        let engine = CalibrationEngine::new(CalibrationParams {
            bkg_median_filter_half_width: 10,
            source_detection_threshold_sigmas: 3.0,
            ref_star_faint_mag_limit: 6.0,
        });

        // A single star/source pair gives 2 observations against an
        // 8-parameter pinhole+quaternion fit: too few to constrain it, so
        // this exercises the degenerate-match guard rather than a full fit.
        let err = engine.run(&stack, &prior, &catalog).unwrap_err();
        assert!(matches!(err, CalibrationError::TooFewMatches { found: 1, .. }));
    }

    #[test]
    fn project_catalog_marks_faint_stars_invisible() {
        let camera = CameraModel::pinhole(200, 200, 500.0, 500.0, 100.0, 100.0).unwrap();
        let bright = reference_star(0.0, 0.1, 1.0);
        let too_faint = reference_star(0.0, 0.1, 10.0);

        let projected = project_catalog(&[bright, too_faint], &camera, &UnitQuaternion::identity(), 0.0, 0.0, 0.0, 6.0);
        assert!(!projected[1].visible);
        assert!(projected[1].projected_pixel.is_none());
    }

    #[test]
    fn project_bcrf_to_cam_feeds_pinhole_consistently() {
        let camera = CameraModel::pinhole(200, 200, 500.0, 500.0, 100.0, 100.0).unwrap();
        let r_cam = Vector3::new(0.0, 0.0, 1.0);
        let (i, j) = camera.project(&r_cam).unwrap();
        assert!((i - 100.0).abs() < 1e-9);
        assert!((j - 100.0).abs() < 1e-9);
    }
}
