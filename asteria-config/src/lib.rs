//! Startup configuration and pure parameter validation (§9 redesign note,
//! §A.4).

mod config;
mod validate;

pub use config::{AcquisitionSection, CalibrationSection, Config, ConfigError, SiteSection};
pub use validate::{validate_option, validate_range, ValidationError};
