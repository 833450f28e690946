//! Observable acquisition statistics (§7): every dropped frame, skipped
//! clip, or failed fit must show up here so no error category causes silent
//! data loss.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    total_frames: AtomicU64,
    dropped_live_view_frames: AtomicU64,
    abandoned_clips: AtomicU64,
    last_frame_epoch_us: AtomicI64,
}

/// Shared, lock-free acquisition statistics, cloneable for the live-view
/// and GUI threads to poll independently of the capture worker.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    counters: Arc<Counters>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self, epoch_us: i64) {
        self.counters.total_frames.fetch_add(1, Ordering::Relaxed);
        self.counters.last_frame_epoch_us.store(epoch_us, Ordering::Relaxed);
    }

    pub fn record_dropped_live_view_frame(&self) {
        self.counters.dropped_live_view_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned_clip(&self) {
        self.counters.abandoned_clips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_frames(&self) -> u64 {
        self.counters.total_frames.load(Ordering::Relaxed)
    }

    pub fn dropped_live_view_frames(&self) -> u64 {
        self.counters.dropped_live_view_frames.load(Ordering::Relaxed)
    }

    pub fn abandoned_clips(&self) -> u64 {
        self.counters.abandoned_clips.load(Ordering::Relaxed)
    }

    pub fn last_frame_epoch_us(&self) -> i64 {
        self.counters.last_frame_epoch_us.load(Ordering::Relaxed)
    }

    /// Frames per second computed from `nominal_frame_period_us`, since
    /// wall-clock measurement would be noisy over short windows.
    pub fn fps(&self, nominal_frame_period_us: i64) -> f64 {
        if nominal_frame_period_us <= 0 {
            return 0.0;
        }
        1_000_000.0 / nominal_frame_period_us as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_are_visible_through_clones() {
        let stats = Statistics::new();
        let clone = stats.clone();
        stats.record_frame(100);
        stats.record_dropped_live_view_frame();
        stats.record_abandoned_clip();

        assert_eq!(clone.total_frames(), 1);
        assert_eq!(clone.dropped_live_view_frames(), 1);
        assert_eq!(clone.abandoned_clips(), 1);
        assert_eq!(clone.last_frame_epoch_us(), 100);
    }
}
