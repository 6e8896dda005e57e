// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::record::Record;
use std::collections::VecDeque;
use std::sync::Arc;

/// A record waiting for (re)delivery to the remote endpoint.
#[derive(Debug, Clone)]
pub struct RetryEntry {
    pub record: Arc<Record>,
    /// Number of delivery attempts that already failed
    pub attempt: u32,
}

impl RetryEntry {
    pub fn new(record: Arc<Record>) -> Self {
        Self { record, attempt: 0 }
    }

    pub fn sequence_id(&self) -> u64 {
        self.record.sequence_id()
    }
}

/// Bounded FIFO of pending remote deliveries with drop-oldest eviction.
///
/// Dispatch order is FIFO. On overflow the oldest record, the one with the smallest
/// sequence id, is evicted. While no retry has been re-enqueued this is the front entry;
/// a re-enqueued retry sits behind newer records but is still the oldest by creation.
/// Evictions are handed back to the caller, which owns the drop accounting.
#[derive(Debug)]
pub struct RetryQueue {
    entries: VecDeque<RetryEntry>,
    capacity: usize,
}

impl RetryQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `entry`, evicting the oldest entry first when the queue is full. Returns the
    /// evicted entry, if any.
    pub fn push(&mut self, entry: RetryEntry) -> Option<RetryEntry> {
        let evicted = if self.entries.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    /// Removes and returns the entry with the smallest sequence id.
    pub fn evict_oldest(&mut self) -> Option<RetryEntry> {
        let position = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, entry)| entry.sequence_id())
            .map(|(position, _)| position)?;
        self.entries.remove(position)
    }

    pub fn oldest_sequence_id(&self) -> Option<u64> {
        self.entries.iter().map(RetryEntry::sequence_id).min()
    }

    pub fn pop_front(&mut self) -> Option<RetryEntry> {
        self.entries.pop_front()
    }

    /// Empties the queue, returning how many entries were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.entries.len();
        self.entries.clear();
        discarded
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

    pub fn iter(&self) -> impl Iterator<Item = &RetryEntry> {
        self.entries.iter()
    }
}
