// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

pub const DEFAULT_LOG_DIR: &str = "./logs";
pub const DEFAULT_ENDPOINT: &str = "http://localhost:4000/log";

// 100 MiB
pub const DEFAULT_ROTATION_THRESHOLD_BYTES: u64 = 100 * 1024 * 1024;

pub const DEFAULT_MAX_RETRY_QUEUE_LEN: usize = 1000;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 5;

pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(1000);
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_millis(30_000);

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// Matches the 16-object default high-water mark of an object-mode stream
pub const DEFAULT_HIGH_WATER_MARK: usize = 16;
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

pub const LOG_FILE_PREFIX: &str = "log-";
pub const LOG_FILE_SUFFIX: &str = ".json";
