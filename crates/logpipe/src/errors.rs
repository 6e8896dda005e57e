// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::record::Record;
use crate::remote_sink::RemoteStatsSnapshot;
use std::path::PathBuf;

/// Invalid pipeline configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Fatal local storage failures. The file sink never retries these.
#[derive(Debug, thiserror::Error)]
pub enum FileSinkError {
    #[error("Failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write to log file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to close log file {path}: {source}")]
    Close {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize record {sequence_id}: {source}")]
    Serialize {
        sequence_id: u64,
        source: serde_json::Error,
    },
}

/// A single failed remote delivery attempt. Always retried.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Endpoint responded with status {0}")]
    Status(u16),
}

/// Rejected submissions. The record is handed back to the caller.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Fan-out buffer is at capacity")]
    Full(Record),

    #[error("Fan-out buffer is closed")]
    Closed(Record),
}

impl SubmitError {
    pub fn into_record(self) -> Record {
        match self {
            SubmitError::Full(record) | SubmitError::Closed(record) => record,
        }
    }
}

/// Pipeline-level faults.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("File sink failed: {0}")]
    FileSink(#[from] FileSinkError),

    #[error("HTTP client could not be built: {0}")]
    Client(String),

    #[error("Sink task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The file sink failed while running. The remote sink kept going and its final
    /// counters are attached.
    #[error("File sink failed: {source}")]
    Degraded {
        source: FileSinkError,
        remote: Box<RemoteStatsSnapshot>,
    },

    #[error("Shutdown timeout exceeded")]
    ShutdownTimeout { remote: Box<RemoteStatsSnapshot> },
}

impl PipelineError {
    /// Final remote sink counters, when the error happened after both sinks ran.
    pub fn remote_stats(&self) -> Option<&RemoteStatsSnapshot> {
        match self {
            PipelineError::Degraded { remote, .. } | PipelineError::ShutdownTimeout { remote } => {
                Some(remote.as_ref())
            }
            _ => None,
        }
    }
}
