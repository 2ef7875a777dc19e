// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic sampling of process and host statistics into the metric table.
//!
//! The two sources run on independent timers. A failing source is logged and
//! leaves its previous values in place; it never stops the agent.

pub mod host;
#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(not(target_os = "linux"))]
pub mod other;
pub mod process;

use crate::errors::SampleError;
use crate::table::MetricTable;
use host::HostSampler;
use metrics_model::Metric;
use process::{ProcessStatsReader, RUNTIME_GAUGES};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const POLL_COUNT_METRIC: &str = "PollCount";
pub const RANDOM_VALUE_METRIC: &str = "RandomValue";

#[cfg(target_os = "linux")]
fn default_reader() -> Box<dyn ProcessStatsReader> {
    Box::new(linux::LinuxProcessStatsReader::default())
}

#[cfg(not(target_os = "linux"))]
fn default_reader() -> Box<dyn ProcessStatsReader> {
    Box::new(other::UnsupportedProcessStatsReader)
}

pub struct Collector {
    table: Arc<MetricTable>,
    process: Box<dyn ProcessStatsReader>,
    host: Mutex<HostSampler>,
}

impl Collector {
    pub fn new(table: Arc<MetricTable>) -> Self {
        Self::with_reader(table, default_reader())
    }

    pub fn with_reader(table: Arc<MetricTable>, process: Box<dyn ProcessStatsReader>) -> Self {
        Self {
            table,
            process,
            host: Mutex::new(HostSampler::new()),
        }
    }

    /// Records every runtime gauge, a fresh random gauge, and bumps the poll
    /// counter by one.
    pub fn sample_runtime(&self) -> Result<(), SampleError> {
        let stats = self.process.read()?;

        let mut samples: Vec<Metric> = RUNTIME_GAUGES
            .iter()
            .map(|(name, read)| Metric::gauge(*name, read(&stats)))
            .collect();
        samples.push(Metric::gauge(RANDOM_VALUE_METRIC, rand::random::<f64>()));
        samples.push(Metric::counter(POLL_COUNT_METRIC, 1));

        match self.table.record(&samples) {
            0 => Ok(()),
            rejected => Err(SampleError::Rejected(rejected)),
        }
    }

    pub fn sample_host(&self) -> Result<(), SampleError> {
        let samples = self
            .host
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sample()?;

        match self.table.record(&samples) {
            0 => Ok(()),
            rejected => Err(SampleError::Rejected(rejected)),
        }
    }

    /// Samples both sources every `poll_interval` until `cancel` fires.
    pub async fn run(&self, poll_interval: Duration, cancel: CancellationToken) {
        tokio::join!(
            self.run_source("runtime", poll_interval, &cancel, || self.sample_runtime()),
            self.run_source("host", poll_interval, &cancel, || self.sample_host()),
        );
    }

    async fn run_source<F>(
        &self,
        source: &str,
        period: Duration,
        cancel: &CancellationToken,
        sample: F,
    ) where
        F: Fn() -> Result<(), SampleError>,
    {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Stopping {source} sampling");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = sample() {
                        warn!("Skipping {source} sample: {e}");
                    }
                }
            }
        }
    }
}
