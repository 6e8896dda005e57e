// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The structured log record carried through the pipeline.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Severity of a [`Record`]. Serialized in lowercase (`"info"`, `"warn"`, ...).
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[display("trace")]
    Trace,
    #[display("debug")]
    Debug,
    #[display("info")]
    Info,
    #[display("warn")]
    Warn,
    #[display("error")]
    Error,
}

/// An immutable structured log entry.
///
/// Records are ordered by `sequence_id`, which the producer assigns when the record is
/// created. Once submitted, a record is shared read-only between the sinks, so there are
/// no setters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "id")]
    sequence_id: u64,
    level: Level,
    timestamp: DateTime<Utc>,
    #[serde(rename = "msg")]
    message: String,
}

impl Record {
    /// Creates a record stamped with the current wall-clock time.
    pub fn new(sequence_id: u64, level: Level, message: impl Into<String>) -> Self {
        Self::with_timestamp(sequence_id, level, Utc::now(), message)
    }

    pub fn with_timestamp(
        sequence_id: u64,
        level: Level,
        timestamp: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sequence_id,
            level,
            timestamp,
            message: message.into(),
        }
    }

    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// JSON body used for a single remote delivery.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Newline-terminated JSON, the on-disk format of the rotating file sink.
    pub fn to_json_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_record() -> Record {
        let ts = Utc
            .with_ymd_and_hms(2025, 1, 15, 10, 30, 45)
            .single()
            .expect("valid timestamp");
        Record::with_timestamp(7, Level::Info, ts, "Something happened")
    }

    #[test]
    fn test_json_shape() {
        let json = String::from_utf8(fixed_record().to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            r#"{"id":7,"level":"info","timestamp":"2025-01-15T10:30:45Z","msg":"Something happened"}"#
        );
    }

    #[test]
    fn test_json_line_is_newline_terminated() {
        let line = fixed_record().to_json_line().unwrap();
        assert_eq!(line.last(), Some(&b'\n'));
        assert_eq!(line.iter().filter(|&&b| b == b'\n').count(), 1);

        let parsed: Record = serde_json::from_slice(&line).unwrap();
        assert_eq!(parsed, fixed_record());
    }

    #[test]
    fn test_level_display_matches_serialized_form() {
        for level in [
            Level::Trace,
            Level::Debug,
            Level::Info,
            Level::Warn,
            Level::Error,
        ] {
            let serialized = serde_json::to_string(&level).unwrap();
            assert_eq!(serialized, format!("\"{level}\""));
        }
    }
}
