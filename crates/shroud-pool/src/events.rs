//! Event journal.
//!
//! Every committed operation appends one or more [`EventRecord`]s. The
//! journal keeps the most recent `capacity` records; sequence numbers keep
//! counting across evictions so readers can detect gaps.

use std::collections::VecDeque;

use shroud_types::events::{EventRecord, PoolEvent};

/// Default number of retained records.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 10_000;

/// Bounded, append-only log of pool events.
#[derive(Clone, Debug)]
pub struct EventJournal {
    records: VecDeque<EventRecord>,
    capacity: usize,
    next_sequence: u64,
}

impl EventJournal {
    pub fn new(capacity: usize) -> Self {
        Self::resume(capacity, 1)
    }

    /// A journal whose next record takes `next_sequence`.
    pub fn resume(capacity: usize, next_sequence: u64) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            next_sequence: next_sequence.max(1),
        }
    }

    /// Append an event and return its sequence number.
    pub fn emit(&mut self, timestamp: u64, event: PoolEvent) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        tracing::debug!(sequence, kind = event.kind(), "event");
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(EventRecord {
            sequence,
            timestamp,
            event,
        });
        sequence
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&EventRecord> {
        self.records.back()
    }

    /// Retained records with a sequence number greater than `sequence`.
    pub fn since(&self, sequence: u64) -> impl Iterator<Item = &EventRecord> {
        self.records.iter().filter(move |r| r.sequence > sequence)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.records.iter()
    }
}

impl Default for EventJournal {
    fn default() -> Self {
        Self::new(DEFAULT_JOURNAL_CAPACITY)
    }
}
