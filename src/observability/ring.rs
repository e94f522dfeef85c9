//! Fixed-capacity FIFO store shared by the log store and the query monitor.

use std::collections::VecDeque;

/// Bounded buffer that drops the oldest entry when full.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
    total_pushed: u64,
    total_evicted: u64,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            total_pushed: 0,
            total_evicted: 0,
        }
    }

    /// Append an entry, evicting the oldest one if the buffer is full.
    /// Returns the evicted entry.
    pub fn push(&mut self, entry: T) -> Option<T> {
        self.total_pushed += 1;

        let evicted = if self.entries.len() >= self.capacity {
            self.total_evicted += 1;
            self.entries.pop_front()
        } else {
            None
        };

        self.entries.push_back(entry);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries ever pushed, including evicted ones.
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    pub fn total_evicted(&self) -> u64 {
        self.total_evicted
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    /// The `n` most recent entries, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
