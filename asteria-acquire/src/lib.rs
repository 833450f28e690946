//! The acquisition pipeline: pre-trigger ring buffer, detect/record/idle
//! state machine, and the live-view/persistence channel fan-out (§4.1, §5).

mod frame_source;
mod pipeline;
mod ring_buffer;
mod statistics;

pub use frame_source::FrameSource;
pub use pipeline::{
    run_persistence_worker, AcquisitionConfig, AcquisitionPipeline, PauseControl, PipelineState,
    ShutdownFlag,
};
pub use ring_buffer::RingBuffer;
pub use statistics::Statistics;
