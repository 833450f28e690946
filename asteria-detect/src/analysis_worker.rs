//! Offline per-clip localization (§4.3): re-runs the same [`EventDetector`]
//! used live, but over a whole recorded clip, to produce a
//! [`LocationMeasurement`] per frame.

use asteria_frame::{BoundingBox, Clip, LocationMeasurement};

use crate::event_detector::EventDetector;

/// Percentile-based coarse bounding box plus flux-weighted centroid
/// localization, driven by a configured [`EventDetector`].
#[derive(Debug, Clone, Copy)]
pub struct AnalysisWorker {
    pub detector: EventDetector,
}

impl AnalysisWorker {
    pub fn new(detector: EventDetector) -> Self {
        Self { detector }
    }

    /// Runs localization over every frame in `clip` and records the
    /// resulting measurements on it.
    pub fn analyze(&self, clip: &mut Clip) {
        let frames = clip.frames().to_vec();
        let mut measurements = Vec::with_capacity(frames.len());
        measurements.push(LocationMeasurement::no_trigger(frames[0].epoch_us()));

        for i in 1..frames.len() {
            let (report, triggered) = self
                .detector
                .compare(&frames[i - 1], &frames[i])
                .expect("clip frames share geometry by construction");

            if !triggered {
                measurements.push(LocationMeasurement::no_trigger(frames[i].epoch_us()));
                continue;
            }

            let width = frames[i].width();
            let mut xs: Vec<u32> = Vec::with_capacity(report.changed_count());
            let mut ys: Vec<u32> = Vec::with_capacity(report.changed_count());
            for &p in report.positive_pixels.iter().chain(report.negative_pixels.iter()) {
                xs.push(p % width);
                ys.push(p / width);
            }
            xs.sort_unstable();
            ys.sort_unstable();

            let bbox = BoundingBox::new(
                percentile(&xs, 0.05),
                percentile(&xs, 0.95),
                percentile(&ys, 0.05),
                percentile(&ys, 0.95),
            );

            let (cx, cy) = flux_centroid(&frames[i], &bbox);

            measurements.push(LocationMeasurement {
                epoch_us: frames[i].epoch_us(),
                positive_pixels: report.positive_pixels,
                negative_pixels: report.negative_pixels,
                success: true,
                bbox: Some(bbox),
                centroid: Some((cx, cy)),
            });
        }

        clip.set_measurements(measurements);
    }
}

fn percentile(sorted: &[u32], p: f64) -> u32 {
    assert!(!sorted.is_empty());
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn flux_centroid(frame: &asteria_frame::Frame, bbox: &BoundingBox) -> (f64, f64) {
    let mut sum_i = 0.0_f64;
    let mut sum_ix = 0.0_f64;
    let mut sum_iy = 0.0_f64;

    for y in bbox.ymin..=bbox.ymax {
        for x in bbox.xmin..=bbox.xmax {
            let v = frame.pixel(x, y) as f64;
            sum_i += v;
            sum_ix += (x as f64 + 0.5) * v;
            sum_iy += (y as f64 + 0.5) * v;
        }
    }

    if sum_i == 0.0 {
        let cx = (bbox.xmin + bbox.xmax) as f64 / 2.0 + 0.5;
        let cy = (bbox.ymin + bbox.ymax) as f64 / 2.0 + 0.5;
        return (cx, cy);
    }

    (sum_ix / sum_i, sum_iy / sum_i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use asteria_frame::FieldOrder;
    use std::sync::Arc;

    fn solid_frame(w: u32, h: u32, epoch_us: i64, value: u8) -> Arc<asteria_frame::Frame> {
        asteria_frame::Frame::new(w, h, epoch_us, FieldOrder::Progressive, vec![value; (w * h) as usize])
            .into_shared()
    }

    #[test]
    fn non_triggered_frames_report_no_success() {
        let frames = vec![solid_frame(4, 4, 0, 10), solid_frame(4, 4, 1, 10)];
        let mut clip = Clip::new(frames).unwrap();
        let worker = AnalysisWorker::new(EventDetector::new(5, 1));
        worker.analyze(&mut clip);
        assert!(clip.measurements().iter().all(|m| !m.success));
    }

    #[test]
    fn bright_spot_localizes_centroid_near_its_pixel() {
        let w = 9;
        let h = 9;
        let mut base = vec![10u8; (w * h) as usize];
        let bright = 4 * w + 4;
        base[bright as usize] = 250;

        let f0 = solid_frame(w, h, 0, 10);
        let f1 = asteria_frame::Frame::new(w, h, 1, FieldOrder::Progressive, base).into_shared();

        let mut clip = Clip::new(vec![f0, f1]).unwrap();
        let worker = AnalysisWorker::new(EventDetector::new(5, 1));
        worker.analyze(&mut clip);

        let m = &clip.measurements()[1];
        assert!(m.success);
        let (cx, cy) = m.centroid.unwrap();
        assert!((cx - 4.5).abs() < 1.0);
        assert!((cy - 4.5).abs() < 1.0);
    }
}
