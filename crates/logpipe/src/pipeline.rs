// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::PipelineConfig;
use crate::delivery::{build_client, Deliver, HttpDelivery};
use crate::errors::{FileSinkError, PipelineError, SubmitError};
use crate::fanout::FanoutBuffer;
use crate::file_sink::{FileSinkStats, RotatingFileSink};
use crate::record::Record;
use crate::remote_sink::{RemoteSink, RemoteStats, RemoteStatsSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Final counters of both sinks, returned by [`Pipeline::shutdown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub file: FileSinkStats,
    pub remote: RemoteStatsSnapshot,
}

/// Running pipeline: one fan-out buffer feeding the rotating file sink and the remote sink,
/// each on its own task.
pub struct Pipeline {
    buffer: FanoutBuffer,
    file_task: JoinHandle<Result<FileSinkStats, FileSinkError>>,
    remote_task: JoinHandle<RemoteStatsSnapshot>,
    remote_stats: Arc<RemoteStats>,
    fault: CancellationToken,
    shutdown_grace: Duration,
}

impl Pipeline {
    /// Starts both sinks, delivering remotely over HTTP to `config.endpoint`.
    pub async fn start(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let client = build_client(config.https_proxy.as_deref(), config.request_timeout)
            .map_err(|e| PipelineError::Client(e.to_string()))?;
        let delivery = HttpDelivery::new(client, config.endpoint.clone());
        Self::start_with_delivery(config, Arc::new(delivery)).await
    }

    /// Starts both sinks with a caller-provided remote delivery implementation.
    ///
    /// Fails if the configuration is invalid or the first log file cannot be created.
    pub async fn start_with_delivery(
        config: PipelineConfig,
        deliver: Arc<dyn Deliver>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let file_sink =
            RotatingFileSink::open(&config.log_dir, config.rotation_threshold_bytes).await?;
        let remote_sink = RemoteSink::new(deliver, (&config).into());
        let remote_stats = remote_sink.stats();

        let buffer = FanoutBuffer::new(config.buffer_high_water_mark, config.buffer_capacity);
        let file_receiver = buffer.subscribe();
        let remote_receiver = buffer.subscribe();

        let fault = CancellationToken::new();
        let file_fault = fault.clone();
        let file_task = tokio::spawn(async move {
            let result = file_sink.run(file_receiver).await;
            if result.is_err() {
                // The receiver is gone by now, so the remote sink carries on alone
                file_fault.cancel();
            }
            result
        });
        let remote_task = tokio::spawn(remote_sink.run(remote_receiver));

        info!(
            "pipeline started: writing to {}, delivering to {}",
            config.log_dir.display(),
            config.endpoint
        );

        Ok(Self {
            buffer,
            file_task,
            remote_task,
            remote_stats,
            fault,
            shutdown_grace: config.shutdown_grace,
        })
    }

    /// Non-blocking submit; see [`FanoutBuffer::submit`].
    pub fn submit(&self, record: Record) -> Result<bool, SubmitError> {
        self.buffer.submit(record)
    }

    pub async fn send(&self, record: Record) -> Result<(), SubmitError> {
        self.buffer.send(record).await
    }

    pub async fn drained(&self) {
        self.buffer.drained().await
    }

    pub fn buffer(&self) -> &FanoutBuffer {
        &self.buffer
    }

    pub fn remote_stats(&self) -> RemoteStatsSnapshot {
        self.remote_stats.snapshot()
    }

    /// Cancelled once the file sink has hit a fatal storage error.
    pub fn fault_token(&self) -> CancellationToken {
        self.fault.clone()
    }

    pub fn has_faulted(&self) -> bool {
        self.fault.is_cancelled()
    }

    pub async fn faulted(&self) {
        self.fault.cancelled().await
    }

    /// Closes the buffer and waits for both sinks to finish.
    ///
    /// The file sink gets `shutdown_grace` to write out what is still buffered; the remote
    /// sink bounds its own in-flight drain by the same grace. A file sink fault that
    /// happened at any point is returned here, together with the remote sink's counters.
    pub async fn shutdown(self) -> Result<PipelineReport, PipelineError> {
        let Self {
            buffer,
            mut file_task,
            remote_task,
            shutdown_grace,
            ..
        } = self;

        debug!("pipeline shutting down");
        buffer.close();

        let file_wait = tokio::time::timeout(shutdown_grace, &mut file_task);
        let (file, remote) = tokio::join!(file_wait, remote_task);
        let remote = remote?;

        let file = match file {
            Ok(joined) => match joined? {
                Ok(stats) => stats,
                Err(source) => {
                    return Err(PipelineError::Degraded {
                        source,
                        remote: Box::new(remote),
                    })
                }
            },
            Err(_) => {
                error!("file sink did not finish within {shutdown_grace:?}");
                file_task.abort();
                return Err(PipelineError::ShutdownTimeout {
                    remote: Box::new(remote),
                });
            }
        };

        info!(
            "pipeline stopped: {} records written, {} delivered",
            file.records_written, remote.delivered
        );
        Ok(PipelineReport { file, remote })
    }
}
