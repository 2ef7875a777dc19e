// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::ConfigError;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_FILE_STORAGE_PATH: &str = "/tmp/metrics-db.json";
const DEFAULT_STORE_INTERVAL_SECS: u64 = 300;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMode {
    /// Every mutation rewrites the snapshot file before returning.
    Sync,
    /// A background task rewrites the snapshot file on a timer.
    Interval(Duration),
}

/// Storage settings for the collector side.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Snapshot file. `None` keeps the volatile backend in memory only.
    pub file_storage_path: Option<PathBuf>,
    pub snapshot_mode: SnapshotMode,
    /// Load the snapshot file once at startup.
    pub restore: bool,
    pub database_dsn: Option<String>,
    pub max_connections: u32,
    pub probe_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            file_storage_path: Some(PathBuf::from(DEFAULT_FILE_STORAGE_PATH)),
            snapshot_mode: SnapshotMode::Interval(Duration::from_secs(
                DEFAULT_STORE_INTERVAL_SECS,
            )),
            restore: true,
            database_dsn: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(ConfigError::InvalidConfig(format!(
            "{name} must be a boolean, got '{other}'"
        ))),
    }
}

impl StoreConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let file_storage_path = match env::var("FILE_STORAGE_PATH") {
            Ok(path) if path.trim().is_empty() => None,
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => defaults.file_storage_path,
        };

        let snapshot_mode = match env::var("STORE_INTERVAL") {
            Ok(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|_| {
                    ConfigError::InvalidConfig(format!(
                        "STORE_INTERVAL must be a number of seconds, got '{raw}'"
                    ))
                })?;
                if secs == 0 {
                    SnapshotMode::Sync
                } else {
                    SnapshotMode::Interval(Duration::from_secs(secs))
                }
            }
            Err(_) => defaults.snapshot_mode,
        };

        let restore = match env::var("RESTORE") {
            Ok(raw) => parse_bool("RESTORE", &raw)?,
            Err(_) => defaults.restore,
        };

        let database_dsn = env::var("DATABASE_DSN")
            .ok()
            .filter(|dsn| !dsn.trim().is_empty());

        let max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(raw) => raw.trim().parse::<u32>().map_err(|_| {
                ConfigError::InvalidConfig(format!(
                    "DATABASE_MAX_CONNECTIONS must be a positive integer, got '{raw}'"
                ))
            })?,
            Err(_) => defaults.max_connections,
        };

        let config = Self {
            file_storage_path,
            snapshot_mode,
            restore,
            database_dsn,
            max_connections,
            probe_timeout: defaults.probe_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidConfig(
                "DATABASE_MAX_CONNECTIONS must be greater than 0".to_string(),
            ));
        }
        if self.probe_timeout.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "probe timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
