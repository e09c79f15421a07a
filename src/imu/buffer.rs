//! Thread-safe FIFO of IMU samples waiting to be paired with an image.
//!
//! The IMU driver pushes samples as they arrive; the tracking thread drains
//! every sample stamped at or before the frame it is about to track. Both
//! sides go through the same lock, which is never held across engine calls.

use std::collections::VecDeque;

use parking_lot::Mutex;

use super::ImuSample;

/// FIFO of IMU samples in arrival order.
#[derive(Debug, Default)]
pub struct ImuBuffer {
    queue: Mutex<VecDeque<ImuSample>>,
}

impl ImuBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample at the back of the queue.
    pub fn push(&self, sample: ImuSample) {
        self.queue.lock().push_back(sample);
    }

    /// Pop the longest prefix whose timestamps are `<= cutoff_s`.
    ///
    /// Draining stops at the first sample newer than the cutoff, so a sample
    /// that arrived out of order stays queued behind it.
    pub fn drain_until(&self, cutoff_s: f64) -> Vec<ImuSample> {
        let mut queue = self.queue.lock();
        let n = queue
            .iter()
            .position(|s| s.timestamp_s > cutoff_s)
            .unwrap_or(queue.len());
        queue.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn clear(&self) {
        self.queue.lock().clear();
    }
}
