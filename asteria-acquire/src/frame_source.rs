//! The camera collaborator contract (§6). Concrete frame sources (V4L2
//! devices, file replay, test fixtures) implement this trait; the
//! acquisition pipeline only depends on it.

use std::time::Duration;

use asteria_frame::{FieldOrder, Frame};

pub trait FrameSource: Send {
    /// Blocks for at most `timeout` waiting for the next frame. Returns
    /// `None` on timeout or if the source has been asked to shut down.
    fn next_frame(&mut self, timeout: Duration) -> Option<Frame>;

    /// Nominal inter-frame period, used to convert the configured
    /// `clip_max_length_minutes` into a frame count.
    fn nominal_frame_period_us(&self) -> i64;

    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn field_order(&self) -> FieldOrder;
}
