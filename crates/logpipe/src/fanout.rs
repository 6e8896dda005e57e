// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded fan-out buffer shared by every sink.
//!
//! The producer appends records with [`FanoutBuffer::submit`], which never blocks. Each sink
//! owns a [`FanoutReceiver`] with its own read cursor. A record stays in the shared buffer
//! until every attached sink has acknowledged it, which happens when that sink asks for its
//! next record. Occupancy is therefore bounded by the slowest sink, and the buffer reports
//! "not ready" once occupancy reaches the high-water mark. When consumption brings occupancy
//! back below the mark the buffer emits exactly one drained signal for that transition.

use crate::errors::SubmitError;
use crate::record::Record;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Cursor {
    /// Position of the next record handed to this sink
    next: u64,
    /// The record at `next - 1` was handed out and is not yet acknowledged
    holding: bool,
}

impl Cursor {
    fn low_mark(&self) -> u64 {
        self.next - u64::from(self.holding)
    }
}

#[derive(Debug)]
struct State {
    records: VecDeque<Arc<Record>>,
    /// Position of `records[0]`
    head: u64,
    cursors: Vec<Option<Cursor>>,
    paused: bool,
    closed: bool,
    drain_events: u64,
}

impl State {
    fn tail(&self) -> u64 {
        self.head + self.records.len() as u64
    }

    /// Drops records every attached sink has acknowledged. Returns true when this release
    /// moved the buffer from "not ready" back to "ready".
    fn release(&mut self, high_water_mark: usize) -> bool {
        let min = self
            .cursors
            .iter()
            .flatten()
            .map(Cursor::low_mark)
            .min()
            .unwrap_or_else(|| self.tail());

        while self.head < min && self.records.pop_front().is_some() {
            self.head += 1;
        }

        if self.paused && self.records.len() < high_water_mark {
            self.paused = false;
            self.drain_events += 1;
            return true;
        }
        false
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    high_water_mark: usize,
    capacity: usize,
    records_available: Notify,
    drained: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        #[allow(clippy::expect_used)]
        self.state.lock().expect("lock poisoned")
    }
}

/// Producer side of the fan-out buffer. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FanoutBuffer {
    shared: Arc<Shared>,
}

impl FanoutBuffer {
    /// `high_water_mark` is clamped to `1..=capacity`.
    pub fn new(high_water_mark: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let state = State {
            records: VecDeque::with_capacity(capacity),
            head: 0,
            cursors: Vec::new(),
            paused: false,
            closed: false,
            drain_events: 0,
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                high_water_mark: high_water_mark.clamp(1, capacity),
                capacity,
                records_available: Notify::new(),
                drained: Notify::new(),
            }),
        }
    }

    /// Attaches a new sink. It sees every record submitted from now on.
    pub fn subscribe(&self) -> FanoutReceiver {
        let mut state = self.shared.lock();
        let cursor = Cursor {
            next: state.tail(),
            holding: false,
        };
        state.cursors.push(Some(cursor));
        FanoutReceiver {
            shared: Arc::clone(&self.shared),
            id: state.cursors.len() - 1,
        }
    }

    /// Appends a record for every attached sink without blocking.
    ///
    /// Returns `Ok(false)` once occupancy has reached the high-water mark; the producer
    /// should then wait for [`FanoutBuffer::drained`] before submitting more. Fails only when
    /// the hard capacity is reached or the buffer is closed.
    pub fn submit(&self, record: Record) -> Result<bool, SubmitError> {
        let mut state = self.shared.lock();
        if state.closed {
            return Err(SubmitError::Closed(record));
        }
        if state.records.len() >= self.shared.capacity {
            return Err(SubmitError::Full(record));
        }

        state.records.push_back(Arc::new(record));
        // Without attached sinks nothing would ever acknowledge the record
        if state.cursors.iter().all(Option::is_none) {
            state.release(self.shared.high_water_mark);
        }

        let ready = state.records.len() < self.shared.high_water_mark;
        if !ready && !state.paused {
            debug!(
                "fan-out buffer reached high-water mark ({} records)",
                state.records.len()
            );
            state.paused = true;
        }
        drop(state);

        self.shared.records_available.notify_waiters();
        Ok(ready)
    }

    /// Submits a record, first waiting for the drained signal if the buffer is not ready.
    pub async fn send(&self, record: Record) -> Result<(), SubmitError> {
        let mut record = record;
        loop {
            self.drained().await;
            match self.submit(record) {
                Ok(_) => return Ok(()),
                Err(SubmitError::Full(returned)) => record = returned,
                Err(err) => return Err(err),
            }
        }
    }

    /// Resolves immediately when the buffer is ready, otherwise on the next drained signal
    /// (or when the buffer is closed).
    pub async fn drained(&self) {
        let notified = self.shared.drained.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        {
            let state = self.shared.lock();
            if !state.paused || state.closed {
                return;
            }
        }
        notified.await;
    }

    /// Stops accepting records. Sinks still receive everything submitted before the close.
    pub fn close(&self) {
        let mut state = self.shared.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        debug!("fan-out buffer closed");
        self.shared.records_available.notify_waiters();
        self.shared.drained.notify_waiters();
    }

    pub fn occupancy(&self) -> usize {
        self.shared.lock().records.len()
    }

    pub fn is_ready(&self) -> bool {
        !self.shared.lock().paused
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Number of not-ready to ready transitions so far.
    pub fn drain_events(&self) -> u64 {
        self.shared.lock().drain_events
    }

    pub fn high_water_mark(&self) -> usize {
        self.shared.high_water_mark
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

/// Sink side of the fan-out buffer. Dropping it detaches the sink, so a failed sink stops
/// holding back the others.
#[derive(Debug)]
pub struct FanoutReceiver {
    shared: Arc<Shared>,
    id: usize,
}

impl FanoutReceiver {
    /// Acknowledges the previously returned record and waits for the next one. Returns
    /// `None` once the buffer is closed and every record has been handed out.
    pub async fn recv(&mut self) -> Option<Arc<Record>> {
        self.ack();
        loop {
            let notified = self.shared.records_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.shared.lock();
                let Some(cursor) = state.cursors[self.id] else {
                    return None;
                };
                if cursor.next < state.tail() {
                    let index = (cursor.next - state.head) as usize;
                    let record = Arc::clone(&state.records[index]);
                    state.cursors[self.id] = Some(Cursor {
                        next: cursor.next + 1,
                        holding: true,
                    });
                    return Some(record);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Acknowledges the record returned by the last `recv`, releasing it from the shared
    /// buffer once every other sink has done the same.
    pub fn ack(&mut self) {
        let mut state = self.shared.lock();
        let Some(cursor) = state.cursors[self.id].as_mut() else {
            return;
        };
        if !cursor.holding {
            return;
        }
        cursor.holding = false;
        self.release(state);
    }

    fn release(&self, mut state: MutexGuard<'_, State>) {
        let drained = state.release(self.shared.high_water_mark);
        drop(state);
        if drained {
            debug!("fan-out buffer drained below high-water mark");
            self.shared.drained.notify_waiters();
        }
    }
}

impl Drop for FanoutReceiver {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.cursors[self.id] = None;
        self.release(state);
    }
}
