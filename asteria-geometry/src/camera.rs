//! The camera optics model (§4.7): pinhole projection, plus pinhole with a
//! fixed-order radial distortion polynomial and its iterative inverse.
//!
//! The teacher's deep `CameraModelBase -> PinholeCamera ->
//! PinholeCameraWithRadialDistortion` inheritance chain is flattened into a
//! trait plus a closed enum of variants, per the §9 redesign note.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CameraModelError {
    #[error("principal point ({pi}, {pj}) lies outside the {width}x{height} image")]
    PrincipalPointOutsideImage { pi: f64, pj: f64, width: u32, height: u32 },
    #[error("radial distortion coefficients must all share one sign (or all be zero)")]
    MixedDistortionSign,
    #[error("negative radial distortion is too strong: forward factor went non-positive at R={r}")]
    NegativeDistortionTooStrong { r: f64 },
    #[error("positive radial distortion is too strong: backward factor did not converge at the image border")]
    PositiveDistortionTooStrong,
    #[error("expected {expected} parameters, got {got}")]
    WrongParameterCount { expected: usize, got: usize },
}

type Result<T> = std::result::Result<T, CameraModelError>;

/// Common projection contract shared by all camera variants (§4.7).
pub trait Projection {
    /// Project a camera-frame direction vector to pixel coordinates.
    /// Returns `None` if the point is behind the camera (`z <= 0`).
    fn project(&self, r_cam: &Vector3<f64>) -> Option<(f64, f64)>;

    /// Deproject pixel coordinates to a unit camera-frame direction vector.
    /// Returns `None` only when iterative inverse distortion fails to
    /// converge (§4.7) — this is not treated as an error, just an invisible
    /// point.
    fn deproject(&self, i: f64, j: f64) -> Option<Vector3<f64>>;

    fn parameters(&self) -> Vec<f64>;
    fn set_parameters(&mut self, params: &[f64]) -> Result<()>;
    fn num_parameters(&self) -> usize;

    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// Linear pinhole camera: `K = [[fi,0,pi],[0,fj,pj],[0,0,1]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pinhole {
    width: u32,
    height: u32,
    fi: f64,
    fj: f64,
    pi: f64,
    pj: f64,
}

impl Pinhole {
    pub fn new(width: u32, height: u32, fi: f64, fj: f64, pi: f64, pj: f64) -> Result<Self> {
        check_principal_point(width, height, pi, pj)?;
        Ok(Self { width, height, fi, fj, pi, pj })
    }

    pub fn fi(&self) -> f64 {
        self.fi
    }

    pub fn fj(&self) -> f64 {
        self.fj
    }

    pub fn pi(&self) -> f64 {
        self.pi
    }

    pub fn pj(&self) -> f64 {
        self.pj
    }
}

fn check_principal_point(width: u32, height: u32, pi: f64, pj: f64) -> Result<()> {
    if pi < 0.0 || pi > width as f64 || pj < 0.0 || pj > height as f64 {
        return Err(CameraModelError::PrincipalPointOutsideImage { pi, pj, width, height });
    }
    Ok(())
}

impl Projection for Pinhole {
    fn project(&self, r_cam: &Vector3<f64>) -> Option<(f64, f64)> {
        if r_cam.z <= 0.0 {
            return None;
        }
        let i = self.fi * r_cam.x / r_cam.z + self.pi;
        let j = self.fj * r_cam.y / r_cam.z + self.pj;
        Some((i, j))
    }

    fn deproject(&self, i: f64, j: f64) -> Option<Vector3<f64>> {
        let r_cam = Vector3::new((i - self.pi) / self.fi, (j - self.pj) / self.fj, 1.0);
        Some(r_cam.normalize())
    }

    fn parameters(&self) -> Vec<f64> {
        vec![self.fi, self.fj, self.pi, self.pj]
    }

    fn set_parameters(&mut self, params: &[f64]) -> Result<()> {
        if params.len() != 4 {
            return Err(CameraModelError::WrongParameterCount { expected: 4, got: params.len() });
        }
        self.fi = params[0];
        self.fj = params[1];
        self.pi = params[2];
        self.pj = params[3];
        Ok(())
    }

    fn num_parameters(&self) -> usize {
        4
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

/// Sign of the radial distortion, determined once at construction from the
/// coefficient signs (§4.7: "all radial coefficients share one sign, or all
/// zero").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DistortionSign {
    Zero,
    Positive,
    Negative,
}

/// Pinhole camera with a fixed fifth-order forward radial distortion
/// polynomial `C(R) = 1 + K0 + K1*R + K2*R^2 + K3*R^3 + K4*R^4`, applied
/// about the principal point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinholeRadial {
    width: u32,
    height: u32,
    fi: f64,
    fj: f64,
    pi: f64,
    pj: f64,
    k: [f64; 5],
    /// Maximum valid undistorted radius, derived at construction.
    r_max: f64,
}

const INVERSE_TOLERANCE_PX: f64 = 0.01;
const INVERSE_MAX_ITERATIONS: usize = 1000;

impl PinholeRadial {
    pub fn new(width: u32, height: u32, fi: f64, fj: f64, pi: f64, pj: f64, k: [f64; 5]) -> Result<Self> {
        check_principal_point(width, height, pi, pj)?;

        let sign = distortion_sign(&k)?;

        // Maximum radial distance of any detector pixel from the distortion
        // centre, i.e. the corner furthest from the principal point, plus a
        // small margin.
        let corners = [
            (pi, pj),
            (width as f64 - pi, pj),
            (pi, height as f64 - pj),
            (width as f64 - pi, height as f64 - pj),
        ];
        let rp_max = corners
            .iter()
            .map(|(a, b)| (a * a + b * b).sqrt())
            .fold(0.0_f64, f64::max)
            + 0.1;

        let mut model = Self { width, height, fi, fj, pi, pj, k, r_max: rp_max };

        let r_max = match sign {
            DistortionSign::Zero => rp_max,
            DistortionSign::Positive => {
                // Backward distortion must remain computable at the extreme
                // corner of the distorted (detector) image.
                if model.backward_distortion(rp_max, INVERSE_TOLERANCE_PX).is_none() {
                    return Err(CameraModelError::PositiveDistortionTooStrong);
                }
                rp_max
            }
            DistortionSign::Negative => {
                // Walk outward in the undistorted image until the forward
                // distortion factor goes non-positive, or until the
                // corresponding distorted radius exceeds the detector's.
                let mut r = 0.0_f64;
                loop {
                    let cr = model.forward_distortion(r);
                    if cr <= 0.0 {
                        return Err(CameraModelError::NegativeDistortionTooStrong { r });
                    }
                    let rp = cr * r;
                    if rp > rp_max {
                        break r;
                    }
                    r += 1.0;
                }
            }
        };
        model.r_max = r_max;
        Ok(model)
    }

    pub fn k(&self) -> [f64; 5] {
        self.k
    }

    pub fn r_max(&self) -> f64 {
        self.r_max
    }

    /// `C(R)`: forward distortion factor, undistorted -> distorted. The
    /// radius and coefficients are normalized by the mean focal length
    /// before the polynomial is evaluated, to keep the powers of `R` from
    /// overflowing for coefficients that are naturally tiny.
    pub fn forward_distortion(&self, r: f64) -> f64 {
        let f = (self.fi + self.fj) / 2.0;
        let rn = r / f;
        let [k0, k1, k2, k3, k4] = self.k;
        let k1n = k1 * f;
        let k2n = k2 * f * f;
        let k3n = k3 * f * f * f;
        let k4n = k4 * f * f * f * f;
        1.0 + k0 + rn * (k1n + rn * (k2n + rn * (k3n + rn * k4n)))
    }

    /// `D(R')`: inverse distortion factor, distorted -> undistorted, such
    /// that `R = D(R')*R'`. Iterates `R_{k+1} = 0.5*(R_k + R'/C(R_k))`; the
    /// averaging avoids the two-cycle oscillation the naive update exhibits
    /// (§4.7). Returns `None` if not converged within 1000 iterations,
    /// meaning the distorted point lies outside the valid model domain.
    pub fn backward_distortion(&self, r_prime: f64, tol: f64) -> Option<f64> {
        if r_prime == 0.0 {
            return Some(1.0);
        }
        let mut r_i = r_prime;
        for _ in 0..INVERSE_MAX_ITERATIONS {
            let cr_i = self.forward_distortion(r_i);
            if cr_i <= 0.0 {
                return None;
            }
            let r_ip1 = 0.5 * (r_i + r_prime / cr_i);
            if (r_ip1 - r_i).abs() < tol {
                return Some(r_ip1 / r_prime);
            }
            r_i = r_ip1;
        }
        None
    }

    fn distorted_pixel(&self, i: f64, j: f64) -> (f64, f64) {
        let r = ((i - self.pi).powi(2) + (j - self.pj).powi(2)).sqrt();
        let cr = self.forward_distortion(r);
        ((i - self.pi) * cr + self.pi, (j - self.pj) * cr + self.pj)
    }

    fn undistorted_pixel(&self, ip: f64, jp: f64) -> Option<(f64, f64)> {
        let rp = ((ip - self.pi).powi(2) + (jp - self.pj).powi(2)).sqrt();
        let drp = self.backward_distortion(rp, INVERSE_TOLERANCE_PX)?;
        Some(((ip - self.pi) * drp + self.pi, (jp - self.pj) * drp + self.pj))
    }

    fn as_pinhole(&self) -> Pinhole {
        Pinhole {
            width: self.width,
            height: self.height,
            fi: self.fi,
            fj: self.fj,
            pi: self.pi,
            pj: self.pj,
        }
    }
}

fn distortion_sign(k: &[f64; 5]) -> Result<DistortionSign> {
    if k.iter().all(|v| *v == 0.0) {
        return Ok(DistortionSign::Zero);
    }
    if k.iter().all(|v| *v <= 0.0) {
        return Ok(DistortionSign::Negative);
    }
    if k.iter().all(|v| *v >= 0.0) {
        return Ok(DistortionSign::Positive);
    }
    Err(CameraModelError::MixedDistortionSign)
}

impl Projection for PinholeRadial {
    fn project(&self, r_cam: &Vector3<f64>) -> Option<(f64, f64)> {
        let (i_ideal, j_ideal) = self.as_pinhole().project(r_cam)?;
        Some(self.distorted_pixel(i_ideal, j_ideal))
    }

    fn deproject(&self, i: f64, j: f64) -> Option<Vector3<f64>> {
        let (i_ideal, j_ideal) = self.undistorted_pixel(i, j)?;
        self.as_pinhole().deproject(i_ideal, j_ideal)
    }

    fn parameters(&self) -> Vec<f64> {
        let mut p = vec![self.fi, self.fj, self.pi, self.pj];
        p.extend_from_slice(&self.k);
        p
    }

    fn set_parameters(&mut self, params: &[f64]) -> Result<()> {
        if params.len() != 9 {
            return Err(CameraModelError::WrongParameterCount { expected: 9, got: params.len() });
        }
        self.fi = params[0];
        self.fj = params[1];
        self.pi = params[2];
        self.pj = params[3];
        self.k.copy_from_slice(&params[4..9]);
        Ok(())
    }

    fn num_parameters(&self) -> usize {
        9
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

/// A closed enum of the supported camera variants (§4.7, §9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CameraModel {
    Pinhole(Pinhole),
    PinholeRadial(PinholeRadial),
}

impl CameraModel {
    pub fn pinhole(width: u32, height: u32, fi: f64, fj: f64, pi: f64, pj: f64) -> Result<Self> {
        Ok(CameraModel::Pinhole(Pinhole::new(width, height, fi, fj, pi, pj)?))
    }

    pub fn pinhole_radial(
        width: u32,
        height: u32,
        fi: f64,
        fj: f64,
        pi: f64,
        pj: f64,
        k: [f64; 5],
    ) -> Result<Self> {
        Ok(CameraModel::PinholeRadial(PinholeRadial::new(width, height, fi, fj, pi, pj, k)?))
    }

    /// Drop the distortion terms, keeping the same intrinsics. Useful when
    /// an operator wants to fall back to a simpler model explicitly.
    pub fn to_pinhole(&self) -> Pinhole {
        match self {
            CameraModel::Pinhole(p) => p.clone(),
            CameraModel::PinholeRadial(p) => p.as_pinhole(),
        }
    }
}

impl Projection for CameraModel {
    fn project(&self, r_cam: &Vector3<f64>) -> Option<(f64, f64)> {
        match self {
            CameraModel::Pinhole(p) => p.project(r_cam),
            CameraModel::PinholeRadial(p) => p.project(r_cam),
        }
    }

    fn deproject(&self, i: f64, j: f64) -> Option<Vector3<f64>> {
        match self {
            CameraModel::Pinhole(p) => p.deproject(i, j),
            CameraModel::PinholeRadial(p) => p.deproject(i, j),
        }
    }

    fn parameters(&self) -> Vec<f64> {
        match self {
            CameraModel::Pinhole(p) => p.parameters(),
            CameraModel::PinholeRadial(p) => p.parameters(),
        }
    }

    fn set_parameters(&mut self, params: &[f64]) -> Result<()> {
        match self {
            CameraModel::Pinhole(p) => p.set_parameters(params),
            CameraModel::PinholeRadial(p) => p.set_parameters(params),
        }
    }

    fn num_parameters(&self) -> usize {
        match self {
            CameraModel::Pinhole(p) => p.num_parameters(),
            CameraModel::PinholeRadial(p) => p.num_parameters(),
        }
    }

    fn width(&self) -> u32 {
        match self {
            CameraModel::Pinhole(p) => p.width(),
            CameraModel::PinholeRadial(p) => p.width(),
        }
    }

    fn height(&self) -> u32 {
        match self {
            CameraModel::Pinhole(p) => p.height(),
            CameraModel::PinholeRadial(p) => p.height(),
        }
    }
}
