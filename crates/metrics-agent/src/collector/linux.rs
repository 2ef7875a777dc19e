// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process statistics from procfs.

use crate::collector::process::{ProcessStats, ProcessStatsReader};
use crate::errors::SampleError;
use std::collections::HashMap;
use std::fs;
use tracing::debug;

const PROC_SELF_STATUS_PATH: &str = "/proc/self/status";
const PROC_SELF_STAT_PATH: &str = "/proc/self/stat";

// Offsets into /proc/<pid>/stat counted from the state field, which follows
// the parenthesised command name.
const STAT_MINFLT: usize = 7;
const STAT_MAJFLT: usize = 9;
const STAT_UTIME: usize = 11;
const STAT_STIME: usize = 12;
const STAT_STARTTIME: usize = 19;

pub struct LinuxProcessStatsReader {
    status_path: String,
    stat_path: String,
}

impl Default for LinuxProcessStatsReader {
    fn default() -> Self {
        Self::from_paths(PROC_SELF_STATUS_PATH, PROC_SELF_STAT_PATH)
    }
}

impl LinuxProcessStatsReader {
    pub fn from_paths(status_path: &str, stat_path: &str) -> Self {
        Self {
            status_path: status_path.to_string(),
            stat_path: stat_path.to_string(),
        }
    }
}

impl ProcessStatsReader for LinuxProcessStatsReader {
    fn read(&self) -> Result<ProcessStats, SampleError> {
        let status = fs::read_to_string(&self.status_path).map_err(|e| {
            SampleError::Unavailable {
                source_name: "process status",
                reason: format!("{}: {e}", self.status_path),
            }
        })?;
        let stat = fs::read_to_string(&self.stat_path).map_err(|e| SampleError::Unavailable {
            source_name: "process stat",
            reason: format!("{}: {e}", self.stat_path),
        })?;

        let mut stats = parse_status(&status)?;
        apply_stat(&stat, &mut stats)?;
        Ok(stats)
    }
}

/// Parses `Key:   value [kB]` lines. Sizes are converted to bytes.
fn parse_status_fields(contents: &str) -> HashMap<&str, u64> {
    contents
        .lines()
        .filter_map(|line| {
            let (key, rest) = line.split_once(':')?;
            let mut parts = rest.split_whitespace();
            let value = parts.next()?.parse::<u64>().ok()?;
            let value = match parts.next() {
                Some("kB") => value.saturating_mul(1024),
                _ => value,
            };
            Some((key.trim(), value))
        })
        .collect()
}

fn parse_status(contents: &str) -> Result<ProcessStats, SampleError> {
    let fields = parse_status_fields(contents);
    let Some(threads) = fields.get("Threads").copied() else {
        return Err(SampleError::Unavailable {
            source_name: "process status",
            reason: "missing Threads field".to_string(),
        });
    };
    // Older kernels omit some of these; treat missing as zero.
    let field = |name: &str| {
        fields.get(name).copied().unwrap_or_else(|| {
            debug!("Field {name} not present in process status");
            0
        })
    };

    Ok(ProcessStats {
        vm_peak: field("VmPeak"),
        vm_size: field("VmSize"),
        vm_locked: field("VmLck"),
        vm_pinned: field("VmPin"),
        vm_hwm: field("VmHWM"),
        vm_rss: field("VmRSS"),
        rss_anon: field("RssAnon"),
        rss_file: field("RssFile"),
        rss_shmem: field("RssShmem"),
        vm_data: field("VmData"),
        vm_stack: field("VmStk"),
        vm_exe: field("VmExe"),
        vm_lib: field("VmLib"),
        vm_pte: field("VmPTE"),
        vm_swap: field("VmSwap"),
        threads,
        voluntary_ctxt_switches: field("voluntary_ctxt_switches"),
        nonvoluntary_ctxt_switches: field("nonvoluntary_ctxt_switches"),
        fd_size: field("FDSize"),
        ..Default::default()
    })
}

fn apply_stat(contents: &str, stats: &mut ProcessStats) -> Result<(), SampleError> {
    let malformed = |reason: &str| SampleError::Unavailable {
        source_name: "process stat",
        reason: reason.to_string(),
    };

    // The command name may itself contain spaces and parentheses.
    let (_, after_comm) = contents
        .rsplit_once(')')
        .ok_or_else(|| malformed("missing command name"))?;
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    let at = |idx: usize| -> Result<u64, SampleError> {
        fields
            .get(idx)
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| malformed(&format!("field {idx} missing or not numeric")))
    };

    stats.minor_faults = at(STAT_MINFLT)?;
    stats.major_faults = at(STAT_MAJFLT)?;
    stats.user_ticks = at(STAT_UTIME)?;
    stats.system_ticks = at(STAT_STIME)?;
    stats.start_ticks = at(STAT_STARTTIME)?;
    Ok(())
}
