//! Calibration directory writer (§6): mirrors the clip layout under a
//! separate root, with `calibration.xml` plus the signal/background/noise
//! ImageF64 products.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

use asteria_frame::{netpbm, ImageF64};
use asteria_geometry::epoch_us_to_utc_string;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CalibrationPersistError {
    #[error("io error writing {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("netpbm encode error: {0}")]
    Netpbm(#[from] netpbm::NetpbmError),
    #[error("xml error: {0}")]
    Xml(#[from] serde_xml_rs::Error),
}

/// Plain XML record of the fitted camera model and site parameters. The
/// camera model's own parameter vector is stored as a comma-separated list
/// so `calibration.xml` doesn't need one element type per model variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "calibration")]
pub struct CalibrationRecord {
    pub epoch_us: i64,
    pub camera_model_kind: String,
    #[serde(serialize_with = "serialize_csv", deserialize_with = "deserialize_csv")]
    pub camera_parameters: Vec<f64>,
    pub quaternion_w: f64,
    pub quaternion_x: f64,
    pub quaternion_y: f64,
    pub quaternion_z: f64,
    pub lon_deg: f64,
    pub lat_deg: f64,
    pub readnoise_adu: f64,
}

fn serialize_csv<S: serde::Serializer>(v: &[f64], s: S) -> Result<S::Ok, S::Error> {
    let text = v.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(",");
    s.serialize_str(&text)
}

fn deserialize_csv<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
    let s = String::deserialize(d)?;
    s.split(',')
        .filter(|t| !t.is_empty())
        .map(|t| t.trim().parse::<f64>().map_err(serde::de::Error::custom))
        .collect()
}

pub struct CalibrationPersister {
    root: PathBuf,
}

impl CalibrationPersister {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn persist(
        &self,
        record: &CalibrationRecord,
        signal: &ImageF64,
        background: &ImageF64,
        noise: &ImageF64,
    ) -> Result<String, CalibrationPersistError> {
        let utc = epoch_us_to_utc_string(record.epoch_us);
        let dir = self.root.join(&utc);
        fs::create_dir_all(&dir).map_err(|source| CalibrationPersistError::Io {
            path: dir.clone(),
            source,
        })?;

        let xml = serde_xml_rs::to_string(record)?;
        let xml_path = dir.join("calibration.xml");
        fs::write(&xml_path, xml).map_err(|source| CalibrationPersistError::Io {
            path: xml_path.clone(),
            source,
        })?;

        write_pfm(&dir.join("signal.pfm"), signal, 1.0)?;
        write_pfm(&dir.join("background.pfm"), background, 1.0)?;
        write_pfm(&dir.join("noise.pfm"), noise, 1.0)?;

        tracing::debug!(utc = %utc, "persisted calibration inventory");
        Ok(utc)
    }
}

fn write_pfm(path: &std::path::Path, image: &ImageF64, scale: f64) -> Result<(), CalibrationPersistError> {
    let file = File::create(path).map_err(|source| CalibrationPersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    netpbm::write_pfm(BufWriter::new(file), image, scale)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_calibration_xml_and_three_pfm_products() {
        let tmp = tempfile::tempdir().unwrap();
        let persister = CalibrationPersister::new(tmp.path());

        let record = CalibrationRecord {
            epoch_us: 1_600_000_000_000_000,
            camera_model_kind: "pinhole_radial".to_string(),
            camera_parameters: vec![600.0, 600.0, 360.0, 360.0],
            quaternion_w: 1.0,
            quaternion_x: 0.0,
            quaternion_y: 0.0,
            quaternion_z: 0.0,
            lon_deg: -1.0,
            lat_deg: 51.0,
            readnoise_adu: 5.0,
        };

        let signal = ImageF64::filled(4, 4, record.epoch_us, 10.0);
        let background = ImageF64::filled(4, 4, record.epoch_us, 9.0);
        let noise = ImageF64::filled(4, 4, record.epoch_us, 2.0);

        let utc = persister.persist(&record, &signal, &background, &noise).unwrap();
        let dir = tmp.path().join(&utc);
        assert!(dir.join("calibration.xml").is_file());
        assert!(dir.join("signal.pfm").is_file());
        assert!(dir.join("background.pfm").is_file());
        assert!(dir.join("noise.pfm").is_file());

        let xml = fs::read_to_string(dir.join("calibration.xml")).unwrap();
        let back: CalibrationRecord = serde_xml_rs::from_str(&xml).unwrap();
        assert_eq!(back, record);
    }
}
