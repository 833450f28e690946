//! Motion detection, per-clip localization, and connected-component source
//! extraction (§4.2, §4.3, §4.6).

mod analysis_worker;
mod event_detector;
mod source_detector;

pub use analysis_worker::AnalysisWorker;
pub use event_detector::{ChangeReport, EventDetector, EventDetectorError};
pub use source_detector::{Source, SourceDetector};
