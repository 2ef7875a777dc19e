// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host memory and per-core CPU utilization.

use crate::errors::SampleError;
use metrics_model::Metric;
use sysinfo::System;

pub const TOTAL_MEMORY_METRIC: &str = "TotalMemory";
pub const FREE_MEMORY_METRIC: &str = "FreeMemory";
const CPU_UTILIZATION_PREFIX: &str = "CPUutilization";

/// Name of the utilization gauge for the zero-based `core`.
pub fn cpu_utilization_metric(core: usize) -> String {
    format!("{CPU_UTILIZATION_PREFIX}{}", core + 1)
}

pub struct HostSampler {
    system: System,
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between two refreshes; prime the first one.
        system.refresh_cpu();
        Self { system }
    }

    pub fn sample(&mut self) -> Result<Vec<Metric>, SampleError> {
        self.system.refresh_memory();
        self.system.refresh_cpu();

        let total = self.system.total_memory();
        if total == 0 {
            return Err(SampleError::Unavailable {
                source_name: "host memory",
                reason: "total memory reported as zero".to_string(),
            });
        }

        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return Err(SampleError::Unavailable {
                source_name: "host cpu",
                reason: "no cores reported".to_string(),
            });
        }

        let mut samples = Vec::with_capacity(cpus.len() + 2);
        samples.push(Metric::gauge(TOTAL_MEMORY_METRIC, total as f64));
        samples.push(Metric::gauge(
            FREE_MEMORY_METRIC,
            self.system.free_memory() as f64,
        ));
        samples.extend(
            cpus.iter()
                .enumerate()
                .map(|(core, cpu)| Metric::gauge(cpu_utilization_metric(core), cpu.cpu_usage().into())),
        );
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_model::MetricValue;

    #[test]
    fn test_cpu_metric_names_are_one_based() {
        assert_eq!(cpu_utilization_metric(0), "CPUutilization1");
        assert_eq!(cpu_utilization_metric(7), "CPUutilization8");
    }

    #[test]
    fn test_sample_reports_memory_and_every_core() {
        let mut sampler = HostSampler::new();
        let samples = sampler.sample().unwrap();

        let total = samples
            .iter()
            .find(|m| m.name == TOTAL_MEMORY_METRIC)
            .unwrap();
        assert!(matches!(total.value, MetricValue::Gauge(v) if v > 0.0));
        assert!(samples.iter().any(|m| m.name == FREE_MEMORY_METRIC));

        let cores = samples
            .iter()
            .filter(|m| m.name.starts_with(CPU_UTILIZATION_PREFIX))
            .count();
        assert_eq!(cores, samples.len() - 2);
        assert!(samples.iter().any(|m| m.name == "CPUutilization1"));
    }
}
