//! # Entity History
//!
//! Fixed-capacity FIFO of recent readings for one drone. Pushing past
//! capacity evicts the oldest entry.

use std::collections::VecDeque;

use super::snapshot::HistoryEntry;

/// Number of readings kept per drone
pub const HISTORY_CAPACITY: usize = 10;

/// Rolling history for one drone, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityHistory {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl Default for EntityHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl EntityHistory {
    /// Creates an empty history holding at most `capacity` entries.
    ///
    /// A capacity of zero is raised to one so the latest reading is always kept.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends an entry, returning the evicted one if the buffer was full.
    pub fn push(&mut self, entry: HistoryEntry) -> Option<HistoryEntry> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Most recent entry
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
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

    /// Owned copy of the entries, oldest first.
    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }
}
