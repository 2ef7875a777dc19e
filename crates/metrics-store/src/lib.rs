// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collector-side metric storage.
//!
//! [`IngestionService`] writes to Postgres when it answers its probe and
//! falls back to [`MemStorage`] when it does not.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod errors;
pub mod memory;
pub mod postgres;
pub mod service;
pub mod store;

pub use config::{SnapshotMode, StoreConfig};
pub use errors::StoreError;
pub use memory::MemStorage;
pub use postgres::PostgresBackend;
pub use service::IngestionService;
pub use store::{DurableBackend, MetricStore};
