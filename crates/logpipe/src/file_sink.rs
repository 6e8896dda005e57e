// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Append-only newline-delimited JSON sink with size-based rotation.
//!
//! Records are written in the order they are received, one JSON document per line, to
//! `log-<creation-epoch-millis>.json` files. When appending a record would take the active
//! file over the rotation threshold, the active file is closed and the record becomes the
//! first line of a freshly created file. Every error here is fatal: local storage failures
//! are not retried.

use crate::constants::{LOG_FILE_PREFIX, LOG_FILE_SUFFIX};
use crate::errors::FileSinkError;
use crate::fanout::FanoutReceiver;
use crate::record::Record;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSinkStats {
    pub records_written: u64,
    pub bytes_written: u64,
    pub files_opened: u64,
}

#[derive(Debug)]
struct ActiveFile {
    path: PathBuf,
    file: File,
    bytes: u64,
}

#[derive(Debug)]
pub struct RotatingFileSink {
    dir: PathBuf,
    rotation_threshold_bytes: u64,
    active: Option<ActiveFile>,
    last_file_millis: Option<i64>,
    stats: FileSinkStats,
}

/// File name for a log file created at `millis` since the epoch.
pub fn log_file_name(millis: i64) -> String {
    format!("{LOG_FILE_PREFIX}{millis}{LOG_FILE_SUFFIX}")
}

/// Creation timestamp encoded in a log file name, if it is one.
pub fn parse_log_file_name(name: &str) -> Option<i64> {
    name.strip_prefix(LOG_FILE_PREFIX)?
        .strip_suffix(LOG_FILE_SUFFIX)?
        .parse()
        .ok()
}

impl RotatingFileSink {
    /// Creates `dir` if needed and opens the first log file.
    pub async fn open(
        dir: impl Into<PathBuf>,
        rotation_threshold_bytes: u64,
    ) -> Result<Self, FileSinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| FileSinkError::CreateDir {
                path: dir.clone(),
                source,
            })?;

        let mut sink = Self {
            dir,
            rotation_threshold_bytes: rotation_threshold_bytes.max(1),
            active: None,
            last_file_millis: None,
            stats: FileSinkStats::default(),
        };
        sink.open_next_file().await?;
        Ok(sink)
    }

    /// Consumes records until the fan-out buffer closes, then closes the active file.
    ///
    /// A record is acknowledged to the buffer only after its write completed, so a slow disk
    /// holds back the shared buffer. On error the receiver is dropped, detaching this sink.
    pub async fn run(
        mut self,
        mut receiver: FanoutReceiver,
    ) -> Result<FileSinkStats, FileSinkError> {
        debug!("file sink: started in {}", self.dir.display());

        while let Some(record) = receiver.recv().await {
            if let Err(e) = self.consume(&record).await {
                error!("file sink: {e}");
                return Err(e);
            }
        }

        self.close().await?;
        info!(
            "file sink: stopped after {} records in {} files",
            self.stats.records_written, self.stats.files_opened
        );
        Ok(self.stats)
    }

    /// Appends one record, rotating first if it would not fit in the active file. Resolves
    /// once the write has been handed to the OS.
    pub async fn consume(&mut self, record: &Record) -> Result<(), FileSinkError> {
        let line = record
            .to_json_line()
            .map_err(|source| FileSinkError::Serialize {
                sequence_id: record.sequence_id(),
                source,
            })?;
        let len = line.len() as u64;

        let rotate = match &self.active {
            None => true,
            // An empty file takes the record even when it alone exceeds the threshold
            Some(active) => active.bytes > 0 && active.bytes + len > self.rotation_threshold_bytes,
        };
        if rotate {
            self.rotate().await?;
        }

        let Some(active) = self.active.as_mut() else {
            return Err(FileSinkError::Write {
                path: self.dir.clone(),
                source: std::io::Error::other("no active log file"),
            });
        };
        let write = async {
            active.file.write_all(&line).await?;
            active.file.flush().await
        };
        write.await.map_err(|source| FileSinkError::Write {
            path: active.path.clone(),
            source,
        })?;

        active.bytes += len;
        self.stats.records_written += 1;
        self.stats.bytes_written += len;
        Ok(())
    }

    async fn rotate(&mut self) -> Result<(), FileSinkError> {
        if let Some((previous, bytes)) = self.close_active().await? {
            debug!(
                "file sink: rotating {} after {bytes} bytes",
                previous.display()
            );
        }
        self.open_next_file().await
    }

    async fn open_next_file(&mut self) -> Result<(), FileSinkError> {
        // Names must sort after every file this sink created, even within one millisecond
        let now = Utc::now().timestamp_millis();
        let mut millis = match self.last_file_millis {
            Some(last) if now <= last => last + 1,
            _ => now,
        };

        // Never append to a file left behind by an earlier run
        let (path, file) = loop {
            let path = self.dir.join(log_file_name(millis));
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => millis += 1,
                Err(source) => return Err(FileSinkError::Open { path, source }),
            }
        };

        debug!("file sink: opened {}", path.display());
        self.last_file_millis = Some(millis);
        self.stats.files_opened += 1;
        self.active = Some(ActiveFile {
            path,
            file,
            bytes: 0,
        });
        Ok(())
    }

    async fn close_active(&mut self) -> Result<Option<(PathBuf, u64)>, FileSinkError> {
        let Some(mut active) = self.active.take() else {
            return Ok(None);
        };
        active
            .file
            .flush()
            .await
            .map_err(|source| FileSinkError::Close {
                path: active.path.clone(),
                source,
            })?;
        Ok(Some((active.path, active.bytes)))
    }

    /// Flushes and closes the active file.
    pub async fn close(&mut self) -> Result<(), FileSinkError> {
        self.close_active().await.map(|_| ())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn active_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|active| active.path.as_path())
    }

    /// Bytes written to the active file so far.
    pub fn active_bytes(&self) -> u64 {
        self.active.as_ref().map_or(0, |active| active.bytes)
    }

    pub fn stats(&self) -> &FileSinkStats {
        &self.stats
    }
}

/// Log files in `dir`, oldest first.
pub fn list_log_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = std::fs::read_dir(dir)?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            let millis = parse_log_file_name(path.file_name()?.to_str()?)?;
            Some((millis, path))
        })
        .collect::<Vec<_>>();
    files.sort_by_key(|(millis, _)| *millis);
    Ok(files.into_iter().map(|(_, path)| path).collect())
}
