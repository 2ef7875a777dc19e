// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Malformed metric input. Never retried, always reported to the sender.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("metric id is empty")]
    EmptyId,

    #[error("unknown metric kind '{0}'")]
    UnknownKind(String),

    #[error("gauge '{0}' is missing 'value'")]
    MissingValue(String),

    #[error("counter '{0}' is missing 'delta'")]
    MissingDelta(String),

    #[error("cannot parse '{value}' as a {kind} value")]
    InvalidValue { kind: &'static str, value: String },
}
