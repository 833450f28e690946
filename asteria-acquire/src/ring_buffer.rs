//! Fixed-capacity pre-trigger ring buffer of shared frame handles (§4.1).

use std::collections::VecDeque;
use std::sync::Arc;

use asteria_frame::Frame;

#[derive(Debug, Clone)]
pub struct RingBuffer {
    capacity: usize,
    frames: VecDeque<Arc<Frame>>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            frames: VecDeque::with_capacity(capacity),
        }
    }

    /// Pushes a frame, evicting the oldest if at capacity. `capacity() == 0`
    /// is a valid (always-empty) ring.
    pub fn push(&mut self, frame: Arc<Frame>) {
        if self.capacity == 0 {
            return;
        }
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Contents oldest-first.
    pub fn unroll(&self) -> Vec<Arc<Frame>> {
        self.frames.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asteria_frame::FieldOrder;

    fn frame(epoch_us: i64) -> Arc<Frame> {
        Frame::new(1, 1, epoch_us, FieldOrder::Progressive, vec![0]).into_shared()
    }

    #[test]
    fn never_exceeds_capacity_and_evicts_oldest() {
        let mut ring = RingBuffer::new(3);
        for i in 0..10 {
            ring.push(frame(i));
            assert!(ring.len() <= 3);
        }
        let unrolled = ring.unroll();
        let epochs: Vec<i64> = unrolled.iter().map(|f| f.epoch_us()).collect();
        assert_eq!(epochs, vec![7, 8, 9]);
    }

    #[test]
    fn unroll_returns_last_min_pushed_capacity_in_insertion_order() {
        let mut ring = RingBuffer::new(5);
        for i in 0..3 {
            ring.push(frame(i));
        }
        let epochs: Vec<i64> = ring.unroll().iter().map(|f| f.epoch_us()).collect();
        assert_eq!(epochs, vec![0, 1, 2]);
    }
}
