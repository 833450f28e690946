//! The BCRF -> ECEF -> SEZ -> CAM rotation chain used to project reference
//! stars from the catalog (right ascension / declination) into the camera
//! frame during calibration (§4.5).
//!
//! Frame conventions, matching the station's coordinate enumeration:
//! - BCRF: inertial, barycentric.
//! - ECEF: Earth-centred Earth-fixed, trails BCRF by the Greenwich Mean
//!   Sidereal Time angle.
//! - SEZ: topocentric, basis vectors South-East-Zenith.
//! - CAM: camera frame, basis vectors right-down-forward.

use nalgebra::{Rotation3, UnitQuaternion, Vector3};

/// Unit vector in the BCRF frame pointing at the given right ascension and
/// declination (both radians).
pub fn ra_dec_to_bcrf_unit_vector(ra_rad: f64, dec_rad: f64) -> Vector3<f64> {
    Vector3::new(
        dec_rad.cos() * ra_rad.cos(),
        dec_rad.cos() * ra_rad.sin(),
        dec_rad.sin(),
    )
}

/// Rotation carrying a BCRF vector into the ECEF frame at the given GMST
/// (radians). The ECEF x-axis tracks the Greenwich meridian, whose right
/// ascension is GMST, so this is a rotation about Z by `-gmst`.
pub fn rotation_bcrf_to_ecef(gmst_rad: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::z_axis(), -gmst_rad)
}

/// Rotation carrying an ECEF vector into the local SEZ frame of an observer
/// at the given east-positive longitude and latitude (radians).
pub fn rotation_ecef_to_sez(lon_rad: f64, lat_rad: f64) -> Rotation3<f64> {
    let (sin_lat, cos_lat) = lat_rad.sin_cos();
    let (sin_lon, cos_lon) = lon_rad.sin_cos();

    #[rustfmt::skip]
    let m = nalgebra::Matrix3::new(
        sin_lat * cos_lon,  sin_lat * sin_lon, -cos_lat,
        -sin_lon,           cos_lon,            0.0,
        cos_lat * cos_lon,  cos_lat * sin_lon,  sin_lat,
    );
    Rotation3::from_matrix_unchecked(m)
}

/// Unit vector in the SEZ frame pointing at azimuth (measured east of
/// south) and elevation above the horizon, both radians.
pub fn azel_to_sez_unit_vector(az_rad: f64, el_rad: f64) -> Vector3<f64> {
    Vector3::new(el_rad.cos() * az_rad.cos(), el_rad.cos() * az_rad.sin(), el_rad.sin())
}

/// Azimuth (east of south) and elevation, both radians, of a SEZ unit
/// vector. Inverse of [`azel_to_sez_unit_vector`].
pub fn sez_unit_vector_to_azel(v: &Vector3<f64>) -> (f64, f64) {
    let el = v.z.clamp(-1.0, 1.0).asin();
    let az = v.y.atan2(v.x);
    (az, el)
}

/// Rotation carrying a SEZ vector into the camera frame, given the fitted
/// SEZ-to-CAM attitude quaternion.
pub fn rotation_sez_to_cam(q_sez_cam: &UnitQuaternion<f64>) -> Rotation3<f64> {
    q_sez_cam.to_rotation_matrix()
}

/// Runs the full BCRF -> ECEF -> SEZ -> CAM chain, projecting a catalog
/// star's right ascension/declination into the camera frame.
pub fn project_bcrf_to_cam(
    ra_rad: f64,
    dec_rad: f64,
    gmst_rad: f64,
    lon_rad: f64,
    lat_rad: f64,
    q_sez_cam: &UnitQuaternion<f64>,
) -> Vector3<f64> {
    let r_bcrf = ra_dec_to_bcrf_unit_vector(ra_rad, dec_rad);
    let r_ecef = rotation_bcrf_to_ecef(gmst_rad) * r_bcrf;
    let r_sez = rotation_ecef_to_sez(lon_rad, lat_rad) * r_ecef;
    rotation_sez_to_cam(q_sez_cam) * r_sez
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn ra_dec_unit_vector_has_unit_norm_and_matches_pole() {
        let v = ra_dec_to_bcrf_unit_vector(1.23, FRAC_PI_2);
        assert_abs_diff_eq!(v.norm(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-9);
    }

    #[test]
    fn bcrf_to_ecef_is_identity_at_zero_gmst() {
        let r = rotation_bcrf_to_ecef(0.0);
        let v = Vector3::new(0.3, 0.4, 0.866);
        assert_abs_diff_eq!(r * v, v, epsilon = 1e-12);
    }

    #[test]
    fn ecef_to_sez_maps_local_zenith_direction_to_zenith_axis() {
        let r = rotation_ecef_to_sez(0.0, 0.0);
        let zenith_ecef = Vector3::new(1.0, 0.0, 0.0);
        let sez = r * zenith_ecef;
        assert_abs_diff_eq!(sez, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-12);
    }

    #[test]
    fn azel_round_trips_through_sez_unit_vector() {
        let (az, el) = (0.7_f64, 0.4_f64);
        let v = azel_to_sez_unit_vector(az, el);
        let (az2, el2) = sez_unit_vector_to_azel(&v);
        assert_abs_diff_eq!(az, az2, epsilon = 1e-9);
        assert_abs_diff_eq!(el, el2, epsilon = 1e-9);
    }

    #[test]
    fn star_at_observer_zenith_projects_to_elevation_ninety() {
        // dec == lat, gmst - ra == -lon puts the star directly overhead.
        let lat = 45.0_f64.to_radians();
        let lon = 10.0_f64.to_radians();
        let dec = lat;
        let ra = 0.5_f64;
        let gmst = ra - lon;

        let r_bcrf = ra_dec_to_bcrf_unit_vector(ra, dec);
        let r_ecef = rotation_bcrf_to_ecef(gmst) * r_bcrf;
        let r_sez = rotation_ecef_to_sez(lon, lat) * r_ecef;
        let (_az, el) = sez_unit_vector_to_azel(&r_sez);

        assert_abs_diff_eq!(el, FRAC_PI_2, epsilon = 1e-9);
    }
}
