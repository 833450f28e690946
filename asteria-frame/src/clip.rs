use std::sync::Arc;

use crate::{Frame, LocationMeasurement};

#[derive(Debug, thiserror::Error)]
pub enum ClipError {
    #[error("clip must contain at least one frame")]
    Empty,
    #[error("frame capture epochs must be strictly increasing (frame {index} has epoch {epoch} <= previous {previous})")]
    NonMonotonicEpochs { index: usize, epoch: i64, previous: i64 },
    #[error("frame {index} has geometry {w}x{h}, expected {expected_w}x{expected_h}")]
    MismatchedGeometry {
        index: usize,
        w: u32,
        h: u32,
        expected_w: u32,
        expected_h: u32,
    },
}

/// An ordered sequence of frames covering one detection event, plus the
/// derived peak-hold image and per-frame localization diagnostics (§3).
#[derive(Debug, Clone)]
pub struct Clip {
    frames: Vec<Arc<Frame>>,
    peak_hold: Frame,
    measurements: Vec<LocationMeasurement>,
}

impl Clip {
    /// Builds a clip from a frame sequence, computing the peak-hold image.
    /// Validates the §3 invariants: non-empty, strictly increasing capture
    /// times, uniform geometry. `measurements` starts empty; the
    /// `AnalysisWorker` fills it in with [`Clip::set_measurements`].
    pub fn new(frames: Vec<Arc<Frame>>) -> Result<Self, ClipError> {
        let first = frames.first().ok_or(ClipError::Empty)?;
        let (w, h) = (first.width(), first.height());

        let mut prev_epoch = first.epoch_us();
        for (index, f) in frames.iter().enumerate().skip(1) {
            if f.width() != w || f.height() != h {
                return Err(ClipError::MismatchedGeometry {
                    index,
                    w: f.width(),
                    h: f.height(),
                    expected_w: w,
                    expected_h: h,
                });
            }
            if f.epoch_us() <= prev_epoch {
                return Err(ClipError::NonMonotonicEpochs {
                    index,
                    epoch: f.epoch_us(),
                    previous: prev_epoch,
                });
            }
            prev_epoch = f.epoch_us();
        }

        let mut peak_hold = (*first).clone();
        for f in frames.iter().skip(1) {
            peak_hold = peak_hold.pixelwise_max(f);
        }

        Ok(Self {
            frames,
            peak_hold,
            measurements: Vec::new(),
        })
    }

    pub fn frames(&self) -> &[Arc<Frame>] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn peak_hold(&self) -> &Frame {
        &self.peak_hold
    }

    pub fn measurements(&self) -> &[LocationMeasurement] {
        &self.measurements
    }

    /// Replace the per-frame localization diagnostics. Must have one entry
    /// per frame; this is enforced at persistence time rather than here so
    /// the `AnalysisWorker` can build the vector incrementally.
    pub fn set_measurements(&mut self, measurements: Vec<LocationMeasurement>) {
        self.measurements = measurements;
    }

    /// The clip's directory-sharding timestamp: the first frame's capture
    /// epoch (§4.4).
    pub fn first_epoch_us(&self) -> i64 {
        self.frames[0].epoch_us()
    }
}
