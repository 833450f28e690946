//! Camera projection models, the BCRF/ECEF/SEZ/CAM rotation chain, time
//! conversions, and the generic Levenberg-Marquardt solver used by
//! calibration (§4.5, §4.9).

mod camera;
mod lmsolver;
mod rotation;
mod time;

pub use camera::{
    CameraModel, CameraModelError, Pinhole, PinholeRadial, Projection,
};
pub use lmsolver::{
    finite_difference_jacobian, fourth_order_covariance, LMConfig, LMError, LMResult, LMSolver,
};
pub use rotation::{
    azel_to_sez_unit_vector, project_bcrf_to_cam, ra_dec_to_bcrf_unit_vector,
    rotation_bcrf_to_ecef, rotation_ecef_to_sez, rotation_sez_to_cam, sez_unit_vector_to_azel,
};
pub use time::{epoch_us_to_utc_string, gmst_hours, julian_date, lst_hours, utc_string_to_epoch_us, TimeError};
