//! Atomic date-sharded clip writer (§4.4).

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use asteria_frame::{netpbm, Clip};
use asteria_geometry::epoch_us_to_utc_string;
use chrono::{Datelike, TimeZone, Utc};

use crate::localisation_xml;

#[derive(Debug, thiserror::Error)]
pub enum ClipPersistError {
    #[error("io error writing {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("netpbm encode error: {0}")]
    Netpbm(#[from] netpbm::NetpbmError),
    #[error("jpeg encode error: {0}")]
    Jpeg(#[from] image::ImageError),
    #[error("localisation xml error: {0}")]
    Xml(#[from] localisation_xml::LocalisationXmlError),
}

/// Writes clips under `root/YYYY/MM/DD/<UTC>/` (§4.4). Date subtree creation
/// is idempotent; a clip is only advertised to subscribers once every file
/// has been written successfully.
pub struct ClipPersister {
    root: PathBuf,
}

impl ClipPersister {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Writes `clip` to disk and returns the UTC string identifying its
    /// directory, suitable for broadcasting on a notification channel.
    pub fn persist(&self, clip: &Clip) -> Result<String, ClipPersistError> {
        let utc = epoch_us_to_utc_string(clip.first_epoch_us());
        let dir = self.clip_dir(clip.first_epoch_us(), &utc);

        let raw_dir = dir.join("raw");
        let processed_dir = dir.join("processed");
        create_dir_all(&raw_dir)?;
        create_dir_all(&processed_dir)?;

        for frame in clip.frames() {
            let frame_utc = epoch_us_to_utc_string(frame.epoch_us());
            let path = raw_dir.join(format!("{frame_utc}.pgm"));
            let file = File::create(&path).map_err(|source| ClipPersistError::Io { path: path.clone(), source })?;
            netpbm::write_pgm(BufWriter::new(file), frame)?;
        }

        let peakhold_pgm = processed_dir.join("peakhold.pgm");
        let file = File::create(&peakhold_pgm).map_err(|source| ClipPersistError::Io {
            path: peakhold_pgm.clone(),
            source,
        })?;
        netpbm::write_pgm(BufWriter::new(file), clip.peak_hold())?;

        let peakhold_jpg = processed_dir.join("peakhold.jpg");
        write_peakhold_jpeg(clip, &peakhold_jpg)?;

        let localisation_xml_path = processed_dir.join("localisation.xml");
        let xml = localisation_xml::to_xml_string(clip.measurements())?;
        fs::write(&localisation_xml_path, xml).map_err(|source| ClipPersistError::Io {
            path: localisation_xml_path.clone(),
            source,
        })?;

        tracing::debug!(utc = %utc, frames = clip.len(), "persisted clip");
        Ok(utc)
    }

    fn clip_dir(&self, epoch_us: i64, utc: &str) -> PathBuf {
        let dt = Utc.timestamp_opt(epoch_us.div_euclid(1_000_000), 0).single().expect("valid epoch");
        self.root
            .join(format!("{:04}", dt.year()))
            .join(format!("{:02}", dt.month()))
            .join(format!("{:02}", dt.day()))
            .join(utc)
    }
}

fn write_peakhold_jpeg(clip: &Clip, path: &Path) -> Result<(), ClipPersistError> {
    let peak = clip.peak_hold();
    let img = image::GrayImage::from_raw(peak.width(), peak.height(), peak.samples().to_vec())
        .expect("peak-hold buffer matches its own dimensions");
    img.save(path)?;
    Ok(())
}

fn create_dir_all(path: &Path) -> Result<(), ClipPersistError> {
    fs::create_dir_all(path).map_err(|source| ClipPersistError::Io {
        path: path.to_path_buf(),
        source,
    })
}
