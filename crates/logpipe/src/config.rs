// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::*;
use crate::errors::ConfigError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Static configuration of the pipeline and both sinks.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory the rotating file sink writes `log-<millis>.json` files into
    pub log_dir: PathBuf,
    /// Size after which the active file is rotated
    pub rotation_threshold_bytes: u64,
    /// Remote collector receiving one POST per record
    pub endpoint: String,
    /// Hard cap of the remote sink's retry queue
    pub max_retry_queue_len: usize,
    /// Maximum number of concurrent remote requests
    pub max_in_flight: usize,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Timeout applied to every remote request
    pub request_timeout: Duration,
    /// Fan-out buffer occupancy at which `submit` starts returning `false`
    pub buffer_high_water_mark: usize,
    /// Fan-out buffer occupancy that is never exceeded
    pub buffer_capacity: usize,
    /// How long sinks are given to flush on shutdown
    pub shutdown_grace: Duration,
    pub https_proxy: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            rotation_threshold_bytes: DEFAULT_ROTATION_THRESHOLD_BYTES,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_retry_queue_len: DEFAULT_MAX_RETRY_QUEUE_LEN,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            buffer_high_water_mark: DEFAULT_HIGH_WATER_MARK,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            https_proxy: None,
        }
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.trim().parse::<T>().ok())
}

fn millis_env(key: &str) -> Option<Duration> {
    parse_env::<u64>(key).map(Duration::from_millis)
}

impl PipelineConfig {
    /// Create configuration from environment variables. Values that fail to parse fall
    /// back to their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            log_dir: env::var("LOGPIPE_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
            rotation_threshold_bytes: parse_env("LOGPIPE_ROTATION_BYTES")
                .unwrap_or(defaults.rotation_threshold_bytes),
            endpoint: env::var("LOGPIPE_ENDPOINT").unwrap_or(defaults.endpoint),
            max_retry_queue_len: parse_env("LOGPIPE_MAX_RETRY_QUEUE")
                .unwrap_or(defaults.max_retry_queue_len),
            max_in_flight: parse_env("LOGPIPE_MAX_IN_FLIGHT").unwrap_or(defaults.max_in_flight),
            backoff_base: millis_env("LOGPIPE_BACKOFF_BASE_MS").unwrap_or(defaults.backoff_base),
            backoff_cap: millis_env("LOGPIPE_BACKOFF_CAP_MS").unwrap_or(defaults.backoff_cap),
            request_timeout: millis_env("LOGPIPE_REQUEST_TIMEOUT_MS")
                .unwrap_or(defaults.request_timeout),
            buffer_high_water_mark: parse_env("LOGPIPE_HIGH_WATER_MARK")
                .unwrap_or(defaults.buffer_high_water_mark),
            buffer_capacity: parse_env("LOGPIPE_BUFFER_CAPACITY")
                .unwrap_or(defaults.buffer_capacity),
            shutdown_grace: millis_env("LOGPIPE_SHUTDOWN_GRACE_MS")
                .unwrap_or(defaults.shutdown_grace),
            https_proxy: env::var("LOGPIPE_PROXY_HTTPS")
                .or_else(|_| env::var("HTTPS_PROXY"))
                .ok(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rotation_threshold_bytes == 0 {
            return Err(ConfigError::Invalid(
                "rotation threshold must be greater than 0".to_string(),
            ));
        }

        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "LOGPIPE_ENDPOINT cannot be empty".to_string(),
            ));
        }

        if self.max_retry_queue_len == 0 || self.max_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "retry queue length and in-flight limit must be greater than 0".to_string(),
            ));
        }

        if self.backoff_base.is_zero() || self.backoff_base > self.backoff_cap {
            return Err(ConfigError::Invalid(format!(
                "backoff base ({:?}) must be non-zero and not exceed the cap ({:?})",
                self.backoff_base, self.backoff_cap
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request timeout must be greater than 0".to_string(),
            ));
        }

        if self.buffer_high_water_mark == 0 || self.buffer_high_water_mark > self.buffer_capacity
        {
            return Err(ConfigError::Invalid(format!(
                "high-water mark ({}) must be between 1 and the buffer capacity ({})",
                self.buffer_high_water_mark, self.buffer_capacity
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL_VARS: [&str; 12] = [
        "LOGPIPE_LOG_DIR",
        "LOGPIPE_ROTATION_BYTES",
        "LOGPIPE_ENDPOINT",
        "LOGPIPE_MAX_RETRY_QUEUE",
        "LOGPIPE_MAX_IN_FLIGHT",
        "LOGPIPE_BACKOFF_BASE_MS",
        "LOGPIPE_BACKOFF_CAP_MS",
        "LOGPIPE_REQUEST_TIMEOUT_MS",
        "LOGPIPE_HIGH_WATER_MARK",
        "LOGPIPE_BUFFER_CAPACITY",
        "LOGPIPE_SHUTDOWN_GRACE_MS",
        "LOGPIPE_PROXY_HTTPS",
    ];

    fn clear_env() {
        for var in ALL_VARS {
            env::remove_var(var);
        }
        env::remove_var("HTTPS_PROXY");
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rotation_threshold_bytes, 100 * 1024 * 1024);
        assert_eq!(config.max_retry_queue_len, 1000);
        assert_eq!(config.max_in_flight, 5);
        assert_eq!(config.backoff_base, Duration::from_millis(1000));
        assert_eq!(config.backoff_cap, Duration::from_millis(30_000));
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = PipelineConfig::from_env().unwrap();
        assert_eq!(config.log_dir, PathBuf::from("./logs"));
        assert_eq!(config.endpoint, "http://localhost:4000/log");
        assert_eq!(config.https_proxy, None);
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        env::set_var("LOGPIPE_LOG_DIR", "/var/log/app");
        env::set_var("LOGPIPE_ROTATION_BYTES", "4096");
        env::set_var("LOGPIPE_ENDPOINT", "http://127.0.0.1:3333/ingest");
        env::set_var("LOGPIPE_MAX_IN_FLIGHT", "2");
        env::set_var("LOGPIPE_BACKOFF_BASE_MS", "10");
        env::set_var("LOGPIPE_BACKOFF_CAP_MS", "80");
        env::set_var("HTTPS_PROXY", "http://proxy:3128");

        let config = PipelineConfig::from_env().unwrap();
        assert_eq!(config.log_dir, PathBuf::from("/var/log/app"));
        assert_eq!(config.rotation_threshold_bytes, 4096);
        assert_eq!(config.endpoint, "http://127.0.0.1:3333/ingest");
        assert_eq!(config.max_in_flight, 2);
        assert_eq!(config.backoff_base, Duration::from_millis(10));
        assert_eq!(config.backoff_cap, Duration::from_millis(80));
        assert_eq!(config.https_proxy.as_deref(), Some("http://proxy:3128"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_unparseable_values_fall_back_to_defaults() {
        clear_env();
        env::set_var("LOGPIPE_MAX_RETRY_QUEUE", "lots");
        env::set_var("LOGPIPE_REQUEST_TIMEOUT_MS", "-1");

        let config = PipelineConfig::from_env().unwrap();
        assert_eq!(config.max_retry_queue_len, DEFAULT_MAX_RETRY_QUEUE_LEN);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_invalid_combination() {
        clear_env();
        env::set_var("LOGPIPE_HIGH_WATER_MARK", "64");
        env::set_var("LOGPIPE_BUFFER_CAPACITY", "32");

        let result = PipelineConfig::from_env();
        assert!(result.is_err());
        clear_env();
    }

    #[test]
    fn test_validate_rejects_backoff_base_above_cap() {
        let config = PipelineConfig {
            backoff_base: Duration::from_secs(60),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let config = PipelineConfig {
            max_in_flight: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            rotation_threshold_bytes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            endpoint: "  ".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "Invalid configuration: LOGPIPE_ENDPOINT cannot be empty"
        );
    }
}
