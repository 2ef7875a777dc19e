// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::AgentError;
use metrics_model::retry::Backoff;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_ADDRESS: &str = "localhost:8080";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
const DEFAULT_REPORT_INTERVAL_SECS: u64 = 10;
const DEFAULT_RATE_LIMIT: usize = 5;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

/// How a report cycle is handed to the delivery workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    /// One job per cycle, posted to the batch endpoint
    Batch,
    /// One job per metric, posted to the single update endpoint
    Single,
}

impl FromStr for ReportMode {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "batch" => Ok(ReportMode::Batch),
            "single" => Ok(ReportMode::Single),
            other => Err(AgentError::InvalidConfig(format!(
                "Invalid report mode '{other}'. Must be one of: batch, single"
            ))),
        }
    }
}

/// Configuration for the metrics agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Collector address, with or without an http(s):// scheme
    pub address: String,
    /// How often process and host statistics are sampled
    pub poll_interval: Duration,
    /// How often the metric table is drained and shipped
    pub report_interval: Duration,
    /// Number of concurrent delivery workers
    pub rate_limit: usize,
    /// Capacity of the delivery queue; a full queue blocks the reporter
    pub queue_capacity: usize,
    /// Shared secret used to sign request bodies
    pub key: Option<String>,
    pub report_mode: ReportMode,
    pub request_timeout: Duration,
    /// How long queued jobs may keep draining after shutdown
    pub shutdown_grace: Duration,
    pub backoff: Backoff,
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            report_interval: Duration::from_secs(DEFAULT_REPORT_INTERVAL_SECS),
            rate_limit: DEFAULT_RATE_LIMIT,
            queue_capacity: DEFAULT_RATE_LIMIT,
            key: None,
            report_mode: ReportMode::Batch,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
            backoff: Backoff::default(),
            log_level: "info".to_string(),
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>, AgentError> {
    match env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AgentError::InvalidConfig(format!("{name} has an invalid value '{raw}'"))),
        Err(_) => Ok(None),
    }
}

impl AgentConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, AgentError> {
        let defaults = Self::default();

        let address = env::var("ADDRESS").unwrap_or(defaults.address);
        let poll_interval = parse_var::<u64>("POLL_INTERVAL")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);
        let report_interval = parse_var::<u64>("REPORT_INTERVAL")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.report_interval);
        let rate_limit = parse_var::<usize>("RATE_LIMIT")?.unwrap_or(defaults.rate_limit);
        let queue_capacity = parse_var::<usize>("QUEUE_CAPACITY")?.unwrap_or(rate_limit);
        let key = env::var("KEY").ok().filter(|k| !k.is_empty());
        let report_mode = parse_var::<ReportMode>("REPORT_MODE")?.unwrap_or(defaults.report_mode);
        let request_timeout = parse_var::<u64>("REQUEST_TIMEOUT")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);
        let shutdown_grace = parse_var::<u64>("SHUTDOWN_GRACE")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.shutdown_grace);
        let log_level = env::var("LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or(defaults.log_level);

        let config = Self {
            address,
            poll_interval,
            report_interval,
            rate_limit,
            queue_capacity,
            key,
            report_mode,
            request_timeout,
            shutdown_grace,
            backoff: defaults.backoff,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.address.trim().is_empty() {
            return Err(AgentError::InvalidConfig(
                "ADDRESS cannot be empty".to_string(),
            ));
        }

        if self.poll_interval.is_zero() || self.report_interval.is_zero() {
            return Err(AgentError::InvalidConfig(
                "POLL_INTERVAL and REPORT_INTERVAL must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit == 0 {
            return Err(AgentError::InvalidConfig(
                "RATE_LIMIT must be greater than 0".to_string(),
            ));
        }

        if self.queue_capacity == 0 {
            return Err(AgentError::InvalidConfig(
                "QUEUE_CAPACITY must be greater than 0".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(AgentError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    /// Collector base URL, defaulting to plain http
    pub fn base_url(&self) -> String {
        let address = self.address.trim().trim_end_matches('/');
        if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{address}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 10] = [
        "ADDRESS",
        "POLL_INTERVAL",
        "REPORT_INTERVAL",
        "RATE_LIMIT",
        "QUEUE_CAPACITY",
        "KEY",
        "REPORT_MODE",
        "REQUEST_TIMEOUT",
        "SHUTDOWN_GRACE",
        "LOG_LEVEL",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_base_url_keeps_scheme() {
        let config = AgentConfig {
            address: "https://collector:8443/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.base_url(), "https://collector:8443");
    }

    #[test]
    fn test_validate_zero_rate_limit() {
        let config = AgentConfig {
            rate_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = AgentConfig {
            log_level: "verbose".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        env::set_var("ADDRESS", "10.0.0.5:9000");
        env::set_var("POLL_INTERVAL", "1");
        env::set_var("REPORT_INTERVAL", "4");
        env::set_var("RATE_LIMIT", "2");
        env::set_var("KEY", "secret");
        env::set_var("REPORT_MODE", "single");

        let config = AgentConfig::from_env().expect("config");
        assert_eq!(config.address, "10.0.0.5:9000");
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.report_interval, Duration::from_secs(4));
        assert_eq!(config.rate_limit, 2);
        assert_eq!(config.queue_capacity, 2);
        assert_eq!(config.key.as_deref(), Some("secret"));
        assert_eq!(config.report_mode, ReportMode::Single);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage() {
        clear_env();
        env::set_var("POLL_INTERVAL", "soon");
        assert!(AgentConfig::from_env().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_empty_key_means_unsigned() {
        clear_env();
        env::set_var("KEY", "");
        let config = AgentConfig::from_env().expect("config");
        assert!(config.key.is_none());
        clear_env();
    }
}
