//! In-memory event queue ordered by priority, schedule time, and arrival.

use std::sync::Arc;

use crate::core::event::EventRecord;
use crate::core::readiness::{ReadyQuery, ScanVerdict};

/// Sorted store of event records.
///
/// Records are kept in a `Vec` ordered by [`EventRecord::sort_key`]. Insertion
/// is a binary search that lands after every equal key, so arrival order is
/// preserved among equals even when sequence numbers collide.
#[derive(Debug, Default)]
pub struct InMemoryEventQueue {
    records: Vec<Arc<EventRecord>>,
}

impl InMemoryEventQueue {
    /// Create an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Insert in order. Returns the position the record landed at.
    pub fn enqueue(&mut self, record: Arc<EventRecord>) -> usize {
        let key = record.sort_key();
        let index = self.records.partition_point(|r| r.sort_key() <= key);
        self.records.insert(index, record);
        index
    }

    /// Index of the first ready record.
    ///
    /// A priority or time mismatch ends the scan because later records sort
    /// after it. Thread and flag mismatches only skip the record, as do
    /// records rejected by `extra_skip`.
    pub fn scan_for_ready<F>(&self, query: &ReadyQuery, mut extra_skip: F) -> Option<usize>
    where
        F: FnMut(&EventRecord) -> bool,
    {
        for (index, record) in self.records.iter().enumerate() {
            match query.check(record) {
                ScanVerdict::Stop => return None,
                ScanVerdict::Skip => {}
                ScanVerdict::Ready => {
                    if !extra_skip(record) {
                        return Some(index);
                    }
                }
            }
        }
        None
    }

    /// Remove the record at `index`.
    pub fn remove(&mut self, index: usize) -> Option<Arc<EventRecord>> {
        (index < self.records.len()).then(|| self.records.remove(index))
    }

    /// Head record.
    #[must_use]
    pub fn peek(&self) -> Option<&Arc<EventRecord>> {
        self.records.first()
    }

    /// Records in dequeue order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Arc<EventRecord>> + ExactSizeIterator {
        self.records.iter()
    }

    /// Number of queued records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the queue holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove and return everything, in order.
    pub fn drain(&mut self) -> Vec<Arc<EventRecord>> {
        std::mem::take(&mut self.records)
    }
}
