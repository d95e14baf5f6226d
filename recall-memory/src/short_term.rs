//! Short-term memory: the most recent entry ids in insertion order.

use std::collections::VecDeque;

/// Bounded FIFO of entry ids. Evicting an id never touches the entry itself.
#[derive(Debug, Clone)]
pub struct ShortTermBuffer {
    ids: VecDeque<u64>,
    capacity: usize,
}

impl ShortTermBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            ids: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Append an id, returning the evicted one when over capacity.
    pub fn push(&mut self, id: u64) -> Option<u64> {
        if self.capacity == 0 {
            return Some(id);
        }
        self.ids.push_back(id);
        if self.ids.len() > self.capacity {
            self.ids.pop_front()
        } else {
            None
        }
    }

    /// The last `n` ids, oldest first. `n` is clamped to the buffer length.
    pub fn last(&self, n: usize) -> impl Iterator<Item = u64> + '_ {
        let skip = self.ids.len().saturating_sub(n);
        self.ids.iter().skip(skip).copied()
    }
}
