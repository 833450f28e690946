//! Clip and calibration directory persistence (§4.4, §6).

mod calibration_persister;
mod clip_persister;
mod localisation_xml;

pub use calibration_persister::{CalibrationPersistError, CalibrationPersister, CalibrationRecord};
pub use clip_persister::{ClipPersistError, ClipPersister};
pub use localisation_xml::{from_xml_str, to_xml_string, LocalisationXmlError};
