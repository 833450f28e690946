//! The detect/record/idle acquisition state machine (§4.1).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use asteria_detect::EventDetector;
use asteria_frame::{Clip, Frame};
use asteria_persist::ClipPersister;
use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::frame_source::FrameSource;
use crate::ring_buffer::RingBuffer;
use crate::statistics::Statistics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Detecting,
    Recording,
    Idle,
}

#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    pub detection_head: usize,
    pub detection_tail: usize,
    pub pixel_difference_threshold: i32,
    pub n_changed_pixels_for_trigger: usize,
    pub clip_max_length_minutes: f64,
    /// How long `FrameSource::next_frame` may block before the shutdown
    /// flag is re-polled.
    pub poll_timeout: Duration,
}

/// A shared flag the pipeline polls once per iteration; set it from any
/// thread to request a clean shutdown.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// External pause/resume control, entering and leaving the `Idle` state.
#[derive(Debug, Clone, Default)]
pub struct PauseControl(Arc<AtomicBool>);

impl PauseControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct AcquisitionPipeline<S: FrameSource> {
    source: S,
    config: AcquisitionConfig,
    detector: EventDetector,
    ring: RingBuffer,
    state: PipelineState,
    event_buffer: Vec<Arc<Frame>>,
    frames_since_last_trigger: usize,
    recorded_frames: usize,
    max_recorded_frames: usize,
    previous_frame: Option<Arc<Frame>>,
    live_view_tx: Sender<Arc<Frame>>,
    persistence_tx: Sender<Clip>,
    shutdown: ShutdownFlag,
    pause: PauseControl,
    stats: Statistics,
}

impl<S: FrameSource> AcquisitionPipeline<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: S,
        config: AcquisitionConfig,
        live_view_tx: Sender<Arc<Frame>>,
        persistence_tx: Sender<Clip>,
        shutdown: ShutdownFlag,
        pause: PauseControl,
        stats: Statistics,
    ) -> Self {
        let detector = EventDetector::new(config.pixel_difference_threshold, config.n_changed_pixels_for_trigger);
        let ring = RingBuffer::new(config.detection_head);
        let fps = 1_000_000.0 / source.nominal_frame_period_us() as f64;
        let max_recorded_frames = (config.clip_max_length_minutes * fps * 60.0).round() as usize;

        Self {
            source,
            config,
            detector,
            ring,
            state: PipelineState::Detecting,
            event_buffer: Vec::new(),
            frames_since_last_trigger: 0,
            recorded_frames: 0,
            max_recorded_frames,
            previous_frame: None,
            live_view_tx,
            persistence_tx,
            shutdown,
            pause,
            stats,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Runs until the shutdown flag is set, flushing any in-progress clip
    /// on the way out.
    pub fn run(&mut self) {
        loop {
            if self.shutdown.is_set() {
                self.flush_if_recording();
                break;
            }

            let frame = match self.source.next_frame(self.config.poll_timeout) {
                Some(f) => f,
                None => continue,
            };

            self.ingest(frame.into_shared());
        }
    }

    fn ingest(&mut self, frame: Arc<Frame>) {
        self.stats.record_frame(frame.epoch_us());

        if self.pause.is_paused() {
            self.state = PipelineState::Idle;
            return;
        }
        if self.state == PipelineState::Idle {
            self.state = PipelineState::Detecting;
        }

        self.dispatch_live_view(&frame);

        match self.state {
            PipelineState::Detecting => self.step_detecting(frame),
            PipelineState::Recording => self.step_recording(frame),
            PipelineState::Idle => unreachable!("handled above"),
        }
    }

    fn step_detecting(&mut self, frame: Arc<Frame>) {
        let triggered = match &self.previous_frame {
            Some(prev) => self
                .detector
                .compare(prev, &frame)
                .map(|(_, triggered)| triggered)
                .unwrap_or(false),
            None => false,
        };

        if triggered {
            let mut buffer = self.ring.unroll();
            self.recorded_frames = buffer.len() + 1;
            buffer.push(frame.clone());
            self.event_buffer = buffer;
            self.frames_since_last_trigger = 0;
            self.state = PipelineState::Recording;
        }

        self.ring.push(frame.clone());
        self.previous_frame = Some(frame);
    }

    fn step_recording(&mut self, frame: Arc<Frame>) {
        self.event_buffer.push(frame.clone());

        let triggered = self
            .previous_frame
            .as_ref()
            .map(|prev| self.detector.compare(prev, &frame).map(|(_, t)| t).unwrap_or(false))
            .unwrap_or(false);

        if triggered {
            self.frames_since_last_trigger = 0;
        } else {
            self.frames_since_last_trigger += 1;
        }
        self.recorded_frames += 1;

        self.ring.push(frame.clone());
        self.previous_frame = Some(frame);

        if self.frames_since_last_trigger >= self.config.detection_tail
            || self.recorded_frames >= self.max_recorded_frames
        {
            self.flush();
        }
    }

    fn flush_if_recording(&mut self) {
        if self.state == PipelineState::Recording && !self.event_buffer.is_empty() {
            self.flush();
        }
    }

    fn flush(&mut self) {
        let frames = std::mem::take(&mut self.event_buffer);
        self.state = PipelineState::Detecting;

        match Clip::new(frames) {
            Ok(clip) => {
                // Persistence must never drop a clip: block if the channel
                // is full, applying back-pressure onto capture.
                if self.persistence_tx.send(clip).is_err() {
                    tracing::warn!("persistence channel disconnected, dropping clip");
                    self.stats.record_abandoned_clip();
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed clip");
                self.stats.record_abandoned_clip();
            }
        }
    }

    fn dispatch_live_view(&mut self, frame: &Arc<Frame>) {
        match self.live_view_tx.try_send(frame.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.stats.record_dropped_live_view_frame(),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Runs a persistence worker loop: blocks on `rx` until the pipeline shuts
/// down (channel disconnects), writing each clip as it arrives.
pub fn run_persistence_worker(rx: Receiver<Clip>, persister: ClipPersister, stats: Statistics) {
    for clip in rx {
        if let Err(err) = persister.persist(&clip) {
            tracing::warn!(error = %err, "abandoning clip: persistence error");
            stats.record_abandoned_clip();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asteria_frame::FieldOrder;
    use std::collections::VecDeque;

    struct ScriptedSource {
        frames: VecDeque<Frame>,
        period_us: i64,
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self, _timeout: Duration) -> Option<Frame> {
            self.frames.pop_front()
        }
        fn nominal_frame_period_us(&self) -> i64 {
            self.period_us
        }
        fn width(&self) -> u32 {
            4
        }
        fn height(&self) -> u32 {
            4
        }
        fn field_order(&self) -> FieldOrder {
            FieldOrder::Progressive
        }
    }

    /// Builds 10 frames where frames 4 and 5 each differ from their
    /// predecessor by one pixel exceeding the threshold.
    fn scenario_e2_frames() -> Vec<Frame> {
        let mut frames = Vec::new();
        for i in 0..10u8 {
            let mut samples = vec![10u8; 16];
            if i == 4 || i == 5 {
                samples[0] = 200;
            }
            frames.push(Frame::new(4, 4, i as i64, FieldOrder::Progressive, samples));
        }
        frames
    }

    fn run_scenario(frames: Vec<Frame>, detection_head: usize, detection_tail: usize) -> Vec<Clip> {
        let source = ScriptedSource {
            frames: frames.into(),
            period_us: 1,
        };
        let config = AcquisitionConfig {
            detection_head,
            detection_tail,
            pixel_difference_threshold: 1,
            n_changed_pixels_for_trigger: 1,
            clip_max_length_minutes: 1_000_000.0,
            poll_timeout: Duration::from_millis(1),
        };
        let (lv_tx, _lv_rx) = crossbeam_channel::bounded(1);
        let (p_tx, p_rx) = crossbeam_channel::unbounded();
        let shutdown = ShutdownFlag::new();
        let pause = PauseControl::new();
        let stats = Statistics::new();

        let mut pipeline = AcquisitionPipeline::new(source, config, lv_tx, p_tx, shutdown.clone(), pause, stats);

        // Drive the pipeline by hand instead of `run`, since the scripted
        // source is exhausted once its queued frames are consumed.
        while let Some(f) = pipeline.source.next_frame(Duration::ZERO) {
            pipeline.ingest(f.into_shared());
        }
        shutdown.request();
        pipeline.flush_if_recording();

        drop(pipeline);
        p_rx.try_iter().collect()
    }

    #[test]
    fn e1_no_triggers_keeps_ring_at_last_three_frames_and_emits_no_clips() {
        let frames: Vec<Frame> = (0..10)
            .map(|i| Frame::new(4, 4, i, FieldOrder::Progressive, vec![10u8; 16]))
            .collect();
        let clips = run_scenario(frames, 3, 2);
        assert!(clips.is_empty());
    }

    #[test]
    fn e2_single_trigger_with_tail_produces_expected_clip() {
        let clips = run_scenario(scenario_e2_frames(), 3, 2);
        assert_eq!(clips.len(), 1);
        let epochs: Vec<i64> = clips[0].frames().iter().map(|f| f.epoch_us()).collect();
        assert_eq!(epochs, vec![1, 2, 3, 4, 5, 6, 7]);
    }
}
