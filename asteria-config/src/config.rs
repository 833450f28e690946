//! Typed startup configuration, loaded once from a TOML file and cloned
//! immutably into each worker (§9 redesign note, §A.4).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::validate::{validate_range, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("could not parse config file {path}: {source}")]
    Toml { path: String, source: toml::de::Error },
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcquisitionSection {
    pub detection_head: usize,
    pub detection_tail: usize,
    pub pixel_difference_threshold: i32,
    pub n_changed_pixels_for_trigger: usize,
    pub clip_max_length_minutes: f64,
    pub poll_timeout_ms: u64,
}

impl Default for AcquisitionSection {
    fn default() -> Self {
        Self {
            detection_head: 30,
            detection_tail: 60,
            pixel_difference_threshold: 10,
            n_changed_pixels_for_trigger: 5,
            clip_max_length_minutes: 2.0,
            poll_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrationSection {
    pub bkg_median_filter_half_width: u32,
    pub source_detection_threshold_sigmas: f64,
    pub ref_star_faint_mag_limit: f64,
}

impl Default for CalibrationSection {
    fn default() -> Self {
        Self {
            bkg_median_filter_half_width: 15,
            source_detection_threshold_sigmas: 5.0,
            ref_star_faint_mag_limit: 6.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteSection {
    pub lon_deg: f64,
    pub lat_deg: f64,
    pub alt_m: f64,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self { lon_deg: 0.0, lat_deg: 0.0, alt_m: 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub acquisition: AcquisitionSection,
    pub calibration: CalibrationSection,
    pub site: SiteSection,
    pub clip_root: String,
    pub calibration_root: String,
    pub reference_star_catalog: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            acquisition: AcquisitionSection::default(),
            calibration: CalibrationSection::default(),
            site: SiteSection::default(),
            clip_root: "./clips".to_string(),
            calibration_root: "./calibration".to_string(),
            reference_star_catalog: "./catalog.txt".to_string(),
        }
    }
}

impl Config {
    /// Reads and parses `path`, then validates every numeric field's
    /// closed-interval domain (§9 open question 3).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Toml {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_range(&self.site.lat_deg.to_string(), -90.0, 90.0)?;
        validate_range(&self.site.lon_deg.to_string(), -180.0, 180.0)?;
        validate_range(&self.calibration.source_detection_threshold_sigmas.to_string(), 0.0, f64::MAX)?;
        validate_range(&self.calibration.ref_star_faint_mag_limit.to_string(), -30.0, 30.0)?;
        validate_range(&self.acquisition.clip_max_length_minutes.to_string(), 0.0, f64::MAX)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn load_parses_a_minimal_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("asteria.toml");
        let toml = r#"
clip_root = "/data/clips"
calibration_root = "/data/calibration"
reference_star_catalog = "/data/catalog.txt"

[acquisition]
detection_head = 10
detection_tail = 20
pixel_difference_threshold = 5
n_changed_pixels_for_trigger = 3
clip_max_length_minutes = 5.0
poll_timeout_ms = 500

[calibration]
bkg_median_filter_half_width = 12
source_detection_threshold_sigmas = 4.0
ref_star_faint_mag_limit = 5.5

[site]
lon_deg = -1.5
lat_deg = 51.2
alt_m = 100.0
"#;
        std::fs::write(&tmp, toml).unwrap();
        let config = Config::load(&tmp).unwrap();
        assert_eq!(config.clip_root, "/data/clips");
        assert_eq!(config.acquisition.detection_head, 10);
    }

    #[test]
    fn load_rejects_out_of_range_latitude() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("asteria.toml");
        let mut config = Config::default();
        config.site.lat_deg = 120.0;
        std::fs::write(&tmp, toml::to_string(&config).unwrap()).unwrap();
        let err = Config::load(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
