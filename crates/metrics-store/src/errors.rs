// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use metrics_model::retry::RetryError;
use metrics_model::{InputError, MetricKind};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Malformed metric: {0}")]
    Input(#[from] InputError),

    #[error("{kind} metric '{name}' not found")]
    NotFound { kind: MetricKind, name: String },

    #[error("metric '{name}' already exists with a different kind than {requested}")]
    KindConflict { name: String, requested: MetricKind },

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("{0}")]
    Query(#[from] sqlx::Error),

    #[error("gave up after {attempts} attempts: {source}")]
    Exhausted {
        attempts: usize,
        source: sqlx::Error,
    },

    #[error("statement retry cancelled by shutdown")]
    Cancelled,
}

impl From<RetryError<sqlx::Error>> for DbError {
    fn from(err: RetryError<sqlx::Error>) -> Self {
        match err {
            RetryError::Permanent(e) => DbError::Query(e),
            RetryError::Exhausted { attempts, source } => DbError::Exhausted { attempts, source },
            RetryError::Cancelled => DbError::Cancelled,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot file is not valid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot contains an invalid record: {0}")]
    Record(InputError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let not_found = StoreError::NotFound {
            kind: MetricKind::Gauge,
            name: "temp".into(),
        };
        assert_eq!(not_found.to_string(), "gauge metric 'temp' not found");

        let exhausted = DbError::from(RetryError::Exhausted {
            attempts: 4,
            source: sqlx::Error::PoolTimedOut,
        });
        assert!(exhausted.to_string().starts_with("gave up after 4 attempts"));
    }
}
