// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Best-effort delivery of records to the remote collector.
//!
//! The sink is a single task that exclusively owns its retry queue, its timer wheel of
//! scheduled retries and its set of in-flight requests. Consuming a record only enqueues it,
//! so the fan-out buffer is never held back by endpoint latency. Up to `max_in_flight`
//! requests run concurrently; a failed attempt is re-enqueued after an exponential backoff.
//! Queued entries and scheduled retries share one cap, `max_retry_queue_len`. Reaching it
//! evicts the oldest pending entry, so a sustained outage costs dropped records rather
//! than memory.

use crate::config::PipelineConfig;
use crate::delivery::Deliver;
use crate::errors::DeliveryError;
use crate::fanout::FanoutReceiver;
use crate::retry_queue::{RetryEntry, RetryQueue};
use std::collections::BTreeMap;
use std::future::poll_fn;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio_util::time::delay_queue::{DelayQueue, Key};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct RemoteSinkConfig {
    pub max_retry_queue_len: usize,
    pub max_in_flight: usize,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// How long in-flight requests may take to finish once the buffer is closed
    pub shutdown_grace: Duration,
}

impl From<&PipelineConfig> for RemoteSinkConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_retry_queue_len: config.max_retry_queue_len,
            max_in_flight: config.max_in_flight,
            backoff_base: config.backoff_base,
            backoff_cap: config.backoff_cap,
            shutdown_grace: config.shutdown_grace,
        }
    }
}

impl Default for RemoteSinkConfig {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

/// Delay before the next attempt once `failed_attempt` (counted from 0) has failed:
/// `min(base * 2^failed_attempt, cap)`.
pub fn backoff_delay(failed_attempt: u32, base: Duration, cap: Duration) -> Duration {
    2u32.checked_pow(failed_attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(cap, |delay| delay.min(cap))
}

/// Live counters of the remote sink. Written only by the sink task.
#[derive(Debug, Default)]
pub struct RemoteStats {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed_attempts: AtomicU64,
    retries_scheduled: AtomicU64,
    dropped: AtomicU64,
    abandoned: AtomicU64,
    queue_len: AtomicUsize,
    peak_queue_len: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteStatsSnapshot {
    /// Records received from the fan-out buffer
    pub enqueued: u64,
    pub delivered: u64,
    pub failed_attempts: u64,
    pub retries_scheduled: u64,
    /// Entries evicted because the retry cap was reached
    pub dropped: u64,
    /// Entries discarded at shutdown without a final outcome
    pub abandoned: u64,
    /// Entries held under the retry cap, queued or waiting for their backoff
    pub queue_len: usize,
    pub peak_queue_len: usize,
    pub in_flight: usize,
    pub peak_in_flight: usize,
}

impl RemoteStats {
    pub fn snapshot(&self) -> RemoteStatsSnapshot {
        RemoteStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            queue_len: self.queue_len.load(Ordering::Relaxed),
            peak_queue_len: self.peak_queue_len.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            peak_in_flight: self.peak_in_flight.load(Ordering::Relaxed),
        }
    }

    fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
        self.peak_queue_len.fetch_max(len, Ordering::Relaxed);
    }

    fn set_in_flight(&self, len: usize) {
        self.in_flight.store(len, Ordering::Relaxed);
        self.peak_in_flight.fetch_max(len, Ordering::Relaxed);
    }
}

type Outcome = (RetryEntry, Result<(), DeliveryError>);

enum Event {
    Record(Option<Arc<crate::record::Record>>),
    Completed(Result<Outcome, JoinError>),
    RetryDue(RetryEntry),
}

pub struct RemoteSink {
    deliver: Arc<dyn Deliver>,
    config: RemoteSinkConfig,
    queue: RetryQueue,
    retries: DelayQueue<RetryEntry>,
    /// Timer keys of scheduled retries, by sequence id
    scheduled: BTreeMap<u64, Key>,
    in_flight: JoinSet<Outcome>,
    stats: Arc<RemoteStats>,
}

impl RemoteSink {
    pub fn new(deliver: Arc<dyn Deliver>, config: RemoteSinkConfig) -> Self {
        let config = RemoteSinkConfig {
            max_in_flight: config.max_in_flight.max(1),
            ..config
        };
        Self {
            deliver,
            queue: RetryQueue::new(config.max_retry_queue_len),
            config,
            retries: DelayQueue::new(),
            scheduled: BTreeMap::new(),
            in_flight: JoinSet::new(),
            stats: Arc::new(RemoteStats::default()),
        }
    }

    /// Handle to the live counters, usable after the sink has been moved into its task.
    pub fn stats(&self) -> Arc<RemoteStats> {
        Arc::clone(&self.stats)
    }

    /// Consumes records until the fan-out buffer closes, then lets in-flight requests finish
    /// within the shutdown grace period. Queued and scheduled retries are abandoned.
    pub async fn run(mut self, mut receiver: FanoutReceiver) -> RemoteStatsSnapshot {
        debug!(
            "remote sink: started (max in flight {}, retry queue {})",
            self.config.max_in_flight,
            self.queue.capacity()
        );

        loop {
            let event = tokio::select! {
                record = receiver.recv() => Event::Record(record),
                Some(joined) = self.in_flight.join_next() => Event::Completed(joined),
                Some(expired) = poll_fn(|cx| self.retries.poll_expired(cx)), if !self.retries.is_empty() => {
                    Event::RetryDue(expired.into_inner())
                }
            };

            match event {
                Event::Record(Some(record)) => {
                    self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                    self.enqueue(RetryEntry::new(record));
                }
                Event::Record(None) => break,
                Event::Completed(joined) => self.complete(joined, true),
                Event::RetryDue(entry) => {
                    self.scheduled.remove(&entry.sequence_id());
                    self.enqueue(entry);
                }
            }
            self.process_queue();
        }

        drop(receiver);
        self.shutdown().await
    }

    fn pending(&self) -> usize {
        self.queue.len() + self.scheduled.len()
    }

    fn enqueue(&mut self, entry: RetryEntry) {
        if let Some(entry) = self.admit(entry) {
            if let Some(evicted) = self.queue.push(entry) {
                self.count_drop(&evicted);
            }
        }
        self.stats.set_queue_len(self.pending());
    }

    /// Evicts the oldest pending entry, queued or scheduled, while the retry cap is reached.
    /// Returns `incoming` unless it is itself the oldest and got dropped.
    fn admit(&mut self, incoming: RetryEntry) -> Option<RetryEntry> {
        while self.pending() >= self.queue.capacity() {
            let queued = self.queue.oldest_sequence_id();
            let scheduled = self.scheduled.keys().next().copied();
            let evicted = match queued.into_iter().chain(scheduled).min() {
                Some(oldest) if oldest < incoming.sequence_id() => {
                    if queued == Some(oldest) {
                        self.queue.evict_oldest()
                    } else {
                        self.unschedule(oldest)
                    }
                }
                _ => None,
            };
            match evicted {
                Some(evicted) => self.count_drop(&evicted),
                None => {
                    self.count_drop(&incoming);
                    return None;
                }
            }
        }
        Some(incoming)
    }

    fn unschedule(&mut self, sequence_id: u64) -> Option<RetryEntry> {
        let key = self.scheduled.remove(&sequence_id)?;
        Some(self.retries.remove(&key).into_inner())
    }

    fn count_drop(&self, evicted: &RetryEntry) {
        let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            "remote sink: retry queue full, dropped record {} after {} attempts ({dropped} dropped so far)",
            evicted.sequence_id(),
            evicted.attempt
        );
    }

    /// Dispatches queued entries until the in-flight window is full.
    fn process_queue(&mut self) {
        while self.in_flight.len() < self.config.max_in_flight {
            let Some(entry) = self.queue.pop_front() else {
                break;
            };
            let deliver = Arc::clone(&self.deliver);
            self.in_flight.spawn(async move {
                let result = deliver.deliver(&entry.record).await;
                (entry, result)
            });
        }
        self.stats.set_queue_len(self.pending());
        self.stats.set_in_flight(self.in_flight.len());
    }

    fn complete(&mut self, joined: Result<Outcome, JoinError>, retry: bool) {
        self.stats.set_in_flight(self.in_flight.len());
        match joined {
            Ok((entry, Ok(()))) => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "remote sink: delivered record {} on attempt {}",
                    entry.sequence_id(),
                    entry.attempt
                );
            }
            Ok((entry, Err(e))) => {
                self.stats.failed_attempts.fetch_add(1, Ordering::Relaxed);
                if retry {
                    self.retry_later(entry, &e);
                } else {
                    self.stats.abandoned.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        "remote sink: abandoning record {} during shutdown: {e}",
                        entry.sequence_id()
                    );
                }
            }
            Err(e) => {
                self.stats.failed_attempts.fetch_add(1, Ordering::Relaxed);
                self.stats.abandoned.fetch_add(1, Ordering::Relaxed);
                error!("remote sink: delivery task failed: {e}");
            }
        }
    }

    fn retry_later(&mut self, mut entry: RetryEntry, cause: &DeliveryError) {
        let delay = backoff_delay(
            entry.attempt,
            self.config.backoff_base,
            self.config.backoff_cap,
        );
        debug!(
            "remote sink: attempt {} for record {} failed ({cause}), retrying in {delay:?}",
            entry.attempt,
            entry.sequence_id()
        );
        entry.attempt += 1;
        if let Some(entry) = self.admit(entry) {
            let sequence_id = entry.sequence_id();
            let key = self.retries.insert(entry, delay);
            self.scheduled.insert(sequence_id, key);
            self.stats.retries_scheduled.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.set_queue_len(self.pending());
    }

    async fn shutdown(mut self) -> RemoteStatsSnapshot {
        let abandoned = self.queue.clear() + self.retries.len();
        self.retries.clear();
        self.scheduled.clear();
        self.stats
            .abandoned
            .fetch_add(abandoned as u64, Ordering::Relaxed);
        self.stats.set_queue_len(0);

        let grace = self.config.shutdown_grace;
        let drain = async {
            while let Some(joined) = self.in_flight.join_next().await {
                self.complete(joined, false);
            }
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            let remaining = self.in_flight.len();
            warn!("remote sink: {remaining} requests still in flight after {grace:?}, aborting");
            self.in_flight.abort_all();
            self.stats
                .abandoned
                .fetch_add(remaining as u64, Ordering::Relaxed);
        }
        self.stats.set_in_flight(0);

        let snapshot = self.stats.snapshot();
        info!(
            "remote sink: stopped, {} delivered, {} dropped, {} abandoned",
            snapshot.delivered, snapshot.dropped, snapshot.abandoned
        );
        snapshot
    }
}
