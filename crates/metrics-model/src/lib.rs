// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Types shared by the metrics agent and the metrics collector.
//!
//! The agent and the collector only agree on three things: the shape of a
//! metric record on the wire, how a request body is signed, and how long to
//! wait between delivery attempts. All three live here.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod errors;
pub mod metric;
pub mod retry;
pub mod signature;

pub use errors::InputError;
pub use metric::{Metric, MetricKind, MetricRecord, MetricValue};
