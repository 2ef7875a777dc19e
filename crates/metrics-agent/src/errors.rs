// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use metrics_model::MetricKind;

/// Errors that can occur while configuring or starting the agent
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("Invalid signing key: {0}")]
    SigningKey(#[from] metrics_model::signature::SignatureError),
}

/// Rejected write to the agent metric table
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TableError {
    #[error("metric '{name}' is a {existing}, refusing {requested} update")]
    KindConflict {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },

    #[error("gauge '{name}' sampled a non-finite value {value}")]
    NonFinite { name: String, value: f64 },
}

/// A sampling source could not be read this cycle
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("Failed to read {source_name}: {reason}")]
    Unavailable {
        source_name: &'static str,
        reason: String,
    },

    #[error("{0} samples were rejected by the metric table")]
    Rejected(usize),
}
