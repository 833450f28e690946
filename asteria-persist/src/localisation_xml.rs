//! XML sidecar for per-clip localization diagnostics (§4.4, §6).
//!
//! The reader must tolerate missing elements since older clips were written
//! before some fields existed, so every field below is `#[serde(default)]`
//! rather than `deny_unknown_fields`.

use asteria_frame::{BoundingBox, LocationMeasurement};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum LocalisationXmlError {
    #[error("xml error: {0}")]
    Xml(#[from] serde_xml_rs::Error),
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename = "measurement")]
struct MeasurementXml {
    #[serde(default)]
    epoch_us: i64,
    #[serde(default)]
    positive_pixels: String,
    #[serde(default)]
    negative_pixels: String,
    #[serde(default)]
    coarse_localisation_success: bool,
    #[serde(default)]
    xmin: Option<u32>,
    #[serde(default)]
    xmax: Option<u32>,
    #[serde(default)]
    ymin: Option<u32>,
    #[serde(default)]
    ymax: Option<u32>,
    #[serde(default)]
    centroid_i: Option<f64>,
    #[serde(default)]
    centroid_j: Option<f64>,
}

fn join_pixels(pixels: &[u32]) -> String {
    pixels.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(",")
}

fn parse_pixels(s: &str) -> Vec<u32> {
    if s.is_empty() {
        return Vec::new();
    }
    s.split(',').filter_map(|t| t.trim().parse().ok()).collect()
}

impl From<&LocationMeasurement> for MeasurementXml {
    fn from(m: &LocationMeasurement) -> Self {
        Self {
            epoch_us: m.epoch_us,
            positive_pixels: join_pixels(&m.positive_pixels),
            negative_pixels: join_pixels(&m.negative_pixels),
            coarse_localisation_success: m.success,
            xmin: m.bbox.map(|b| b.xmin),
            xmax: m.bbox.map(|b| b.xmax),
            ymin: m.bbox.map(|b| b.ymin),
            ymax: m.bbox.map(|b| b.ymax),
            centroid_i: m.centroid.map(|c| c.0),
            centroid_j: m.centroid.map(|c| c.1),
        }
    }
}

impl From<MeasurementXml> for LocationMeasurement {
    fn from(x: MeasurementXml) -> Self {
        let bbox = match (x.xmin, x.xmax, x.ymin, x.ymax) {
            (Some(xmin), Some(xmax), Some(ymin), Some(ymax)) => Some(BoundingBox::new(xmin, xmax, ymin, ymax)),
            _ => None,
        };
        let centroid = match (x.centroid_i, x.centroid_j) {
            (Some(i), Some(j)) => Some((i, j)),
            _ => None,
        };
        LocationMeasurement {
            epoch_us: x.epoch_us,
            positive_pixels: parse_pixels(&x.positive_pixels),
            negative_pixels: parse_pixels(&x.negative_pixels),
            success: x.coarse_localisation_success,
            bbox,
            centroid,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename = "localisation")]
struct LocalisationXml {
    #[serde(default, rename = "measurement")]
    measurements: Vec<MeasurementXml>,
}

pub fn to_xml_string(measurements: &[LocationMeasurement]) -> Result<String, LocalisationXmlError> {
    let doc = LocalisationXml {
        measurements: measurements.iter().map(MeasurementXml::from).collect(),
    };
    Ok(serde_xml_rs::to_string(&doc)?)
}

pub fn from_xml_str(xml: &str) -> Result<Vec<LocationMeasurement>, LocalisationXmlError> {
    let doc: LocalisationXml = serde_xml_rs::from_str(xml)?;
    Ok(doc.measurements.into_iter().map(LocationMeasurement::from).collect())
}
