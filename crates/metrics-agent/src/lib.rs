// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collects process and host telemetry and ships it to a metrics collector.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod agent;
pub mod client;
pub mod collector;
pub mod config;
pub mod delivery;
pub mod errors;
pub mod reporter;
pub mod table;

pub use agent::Agent;
pub use config::{AgentConfig, ReportMode};
