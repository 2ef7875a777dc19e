// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use metrics_agent::AgentConfig;
use metrics_model::retry::Backoff;
use metrics_model::{Metric, MetricRecord};
use std::time::Duration;

/// Agent config pointed at `url` with a millisecond retry schedule.
pub fn test_config(url: String) -> AgentConfig {
    AgentConfig {
        address: url,
        backoff: Backoff::new(
            vec![
                Duration::from_millis(10),
                Duration::from_millis(30),
                Duration::from_millis(50),
            ],
            3,
        ),
        request_timeout: Duration::from_secs(2),
        shutdown_grace: Duration::from_secs(5),
        ..Default::default()
    }
}

pub fn sample_records() -> Vec<MetricRecord> {
    vec![
        MetricRecord::from(Metric::gauge("Alloc", 1024.0)),
        MetricRecord::from(Metric::counter("PollCount", 5)),
    ]
}
