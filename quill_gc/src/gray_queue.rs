//! Gray Queue for the mark phase
//!
//! Vec-based worklist of tracked slots whose children have not been scanned yet. Using an
//! explicit worklist keeps marking independent of object-graph depth.

use alloc::vec::Vec;

/// Queue of gray slots waiting to be scanned
pub struct GrayQueue {
    queue: Vec<usize>,
}

impl GrayQueue {
    /// Create a new empty gray queue
    pub const fn new() -> GrayQueue {
        GrayQueue { queue: Vec::new() }
    }

    /// Check if the queue is empty
    #[allow(dead_code)]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Push a slot onto the queue
    #[inline]
    pub fn push(&mut self, slot: usize) {
        self.queue.push(slot);
    }

    /// Pop a slot from the queue
    #[inline]
    pub fn pop(&mut self) -> Option<usize> {
        self.queue.pop()
    }
}

impl Default for GrayQueue {
    fn default() -> Self {
        Self::new()
    }
}
