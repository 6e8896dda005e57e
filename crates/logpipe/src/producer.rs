// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Stand-in for a real log source: emits one record per tick and honours backpressure.

use crate::errors::SubmitError;
use crate::fanout::FanoutBuffer;
use crate::record::{Level, Record};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_PRODUCER_INTERVAL: Duration = Duration::from_millis(10);
pub const DEFAULT_PRODUCER_MESSAGE: &str = "Something happened";

#[derive(Debug, Clone)]
pub struct SimulatedProducer {
    interval: Duration,
    level: Level,
    message: String,
    next_id: u64,
}

impl Default for SimulatedProducer {
    fn default() -> Self {
        Self::new(DEFAULT_PRODUCER_INTERVAL)
    }
}

impl SimulatedProducer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            level: Level::Info,
            message: DEFAULT_PRODUCER_MESSAGE.to_string(),
            next_id: 0,
        }
    }

    /// Submits records with increasing ids until `cancel` fires or the buffer closes.
    /// Returns how many records were accepted.
    ///
    /// After the buffer reports "not ready" no further record is produced until the
    /// drained signal arrives.
    pub async fn run(mut self, buffer: &FanoutBuffer, cancel: &CancellationToken) -> u64 {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let first_id = self.next_id;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let record = Record::new(self.next_id, self.level, self.message.as_str());
            let ready = match buffer.submit(record) {
                Ok(ready) => {
                    self.next_id += 1;
                    ready
                }
                Err(SubmitError::Full(_)) => {
                    warn!("producer: fan-out buffer full, waiting for it to drain");
                    false
                }
                Err(SubmitError::Closed(_)) => break,
            };

            if !ready {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = buffer.drained() => info!("[drain] Resuming log input..."),
                }
            }
        }

        let produced = self.next_id - first_id;
        debug!("producer: stopped after {produced} records");
        produced
    }
}
