//! Pure frame-difference motion detector (§4.2), shared by the live
//! acquisition pipeline and offline per-clip re-analysis.

use asteria_frame::Frame;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EventDetectorError {
    #[error("frames have mismatched geometry: {aw}x{ah} vs {bw}x{bh}")]
    MismatchedGeometry { aw: u32, ah: u32, bw: u32, bh: u32 },
}

/// Compares two frames of identical geometry and reports which pixels
/// changed by more than `threshold` and whether that's enough to trigger.
#[derive(Debug, Clone, Copy)]
pub struct EventDetector {
    pub pixel_difference_threshold: i32,
    pub n_changed_pixels_for_trigger: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeReport {
    /// Flat pixel indices where `b[p] - a[p] > threshold`.
    pub positive_pixels: Vec<u32>,
    /// Flat pixel indices where `a[p] - b[p] > threshold`.
    pub negative_pixels: Vec<u32>,
}

impl ChangeReport {
    pub fn changed_count(&self) -> usize {
        self.positive_pixels.len() + self.negative_pixels.len()
    }
}

impl EventDetector {
    pub fn new(pixel_difference_threshold: i32, n_changed_pixels_for_trigger: usize) -> Self {
        Self {
            pixel_difference_threshold,
            n_changed_pixels_for_trigger,
        }
    }

    /// Returns the change report and whether it meets the trigger count.
    /// Arithmetic happens on widened `i32`s so unsigned subtraction never
    /// wraps.
    pub fn compare(&self, a: &Frame, b: &Frame) -> Result<(ChangeReport, bool), EventDetectorError> {
        if a.width() != b.width() || a.height() != b.height() {
            return Err(EventDetectorError::MismatchedGeometry {
                aw: a.width(),
                ah: a.height(),
                bw: b.width(),
                bh: b.height(),
            });
        }

        let mut report = ChangeReport::default();
        for (p, (&av, &bv)) in a.samples().iter().zip(b.samples().iter()).enumerate() {
            let diff = bv as i32 - av as i32;
            if diff > self.pixel_difference_threshold {
                report.positive_pixels.push(p as u32);
            } else if -diff > self.pixel_difference_threshold {
                report.negative_pixels.push(p as u32);
            }
        }

        let triggered = report.changed_count() >= self.n_changed_pixels_for_trigger;
        Ok((report, triggered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asteria_frame::FieldOrder;

    fn frame(samples: Vec<u8>) -> Frame {
        Frame::new(3, 1, 0, FieldOrder::Progressive, samples)
    }

    #[test]
    fn counts_positive_and_negative_changes_past_threshold() {
        let a = frame(vec![10, 200, 50]);
        let b = frame(vec![20, 190, 50]);
        let detector = EventDetector::new(5, 2);
        let (report, triggered) = detector.compare(&a, &b).unwrap();
        assert_eq!(report.positive_pixels, vec![0]);
        assert_eq!(report.negative_pixels, vec![1]);
        assert!(triggered);
    }

    #[test]
    fn below_trigger_count_does_not_trigger() {
        let a = frame(vec![10, 10, 10]);
        let b = frame(vec![20, 10, 10]);
        let detector = EventDetector::new(5, 2);
        let (_, triggered) = detector.compare(&a, &b).unwrap();
        assert!(!triggered);
    }

    #[test]
    fn unsigned_wraparound_does_not_false_trigger() {
        // a brighter than b by less than the threshold should not register
        // as a spurious "positive" change via u8 wraparound.
        let a = frame(vec![250, 250, 250]);
        let b = frame(vec![0, 0, 0]);
        let detector = EventDetector::new(200, 1);
        let (report, triggered) = detector.compare(&a, &b).unwrap();
        assert!(report.positive_pixels.is_empty());
        assert_eq!(report.negative_pixels.len(), 3);
        assert!(triggered);
    }

    #[test]
    fn rejects_mismatched_geometry() {
        let a = Frame::new(3, 1, 0, FieldOrder::Progressive, vec![1, 2, 3]);
        let b = Frame::new(1, 3, 0, FieldOrder::Progressive, vec![1, 2, 3]);
        let detector = EventDetector::new(5, 1);
        assert!(detector.compare(&a, &b).is_err());
    }
}
