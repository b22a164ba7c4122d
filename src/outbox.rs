// Bounded queue for frames produced while the link is not open.
// Full queue drops the newest frame so the opening handshake is never evicted.

use std::collections::VecDeque;

use bytes::Bytes;
use tracing::warn;

use crate::fields;

pub const DEFAULT_PENDING_CAPACITY: usize = 16;

#[derive(Debug)]
pub struct PendingQueue {
    frames: VecDeque<Bytes>,
    capacity: usize,
    dropped: u64,
}

impl PendingQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Returns false if the frame was dropped.
    pub fn push(&mut self, frame: Bytes) -> bool {
        if self.frames.len() >= self.capacity {
            self.dropped += 1;
            warn!(
                { fields::QUEUE_SIZE } = self.frames.len(),
                { fields::FRAME_SIZE } = frame.len(),
                dropped_total = self.dropped,
                "Pending queue full, dropping outbound frame"
            );
            return false;
        }
        self.frames.push_back(frame);
        true
    }

    pub fn pop(&mut self) -> Option<Bytes> {
        self.frames.pop_front()
    }

    /// Puts a frame that could not be sent back at the head.
    pub fn push_front(&mut self, frame: Bytes) {
        self.frames.push_front(frame);
    }

    /// Puts frames a dead link never wrote back at the head, oldest first.
    /// They were accepted before anything now parked, so they ignore capacity.
    pub fn requeue_front(&mut self, frames: Vec<Bytes>) {
        for frame in frames.into_iter().rev() {
            self.frames.push_front(frame);
        }
    }

    /// Drops every parked copy of `frame`. Returns how many were removed.
    pub fn remove(&mut self, frame: &Bytes) -> usize {
        let before = self.frames.len();
        self.frames.retain(|parked| parked != frame);
        before - self.frames.len()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[cfg(test)]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_CAPACITY)
    }
}
