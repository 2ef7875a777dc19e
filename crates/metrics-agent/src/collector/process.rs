// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::SampleError;

/// Memory, scheduling and fault statistics of the agent process.
///
/// Memory fields are in bytes, CPU times in clock ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessStats {
    pub vm_peak: u64,
    pub vm_size: u64,
    pub vm_locked: u64,
    pub vm_pinned: u64,
    pub vm_hwm: u64,
    pub vm_rss: u64,
    pub rss_anon: u64,
    pub rss_file: u64,
    pub rss_shmem: u64,
    pub vm_data: u64,
    pub vm_stack: u64,
    pub vm_exe: u64,
    pub vm_lib: u64,
    pub vm_pte: u64,
    pub vm_swap: u64,
    pub threads: u64,
    pub voluntary_ctxt_switches: u64,
    pub nonvoluntary_ctxt_switches: u64,
    pub fd_size: u64,
    pub minor_faults: u64,
    pub major_faults: u64,
    pub user_ticks: u64,
    pub system_ticks: u64,
    pub start_ticks: u64,
}

pub trait ProcessStatsReader: Send + Sync {
    fn read(&self) -> Result<ProcessStats, SampleError>;
}

type GaugeFn = fn(&ProcessStats) -> f64;

/// Every runtime gauge the collector publishes, in publication order.
pub const RUNTIME_GAUGES: &[(&str, GaugeFn)] = &[
    ("VmPeak", |s| s.vm_peak as f64),
    ("VmSize", |s| s.vm_size as f64),
    ("VmLck", |s| s.vm_locked as f64),
    ("VmPin", |s| s.vm_pinned as f64),
    ("VmHWM", |s| s.vm_hwm as f64),
    ("VmRSS", |s| s.vm_rss as f64),
    ("RssAnon", |s| s.rss_anon as f64),
    ("RssFile", |s| s.rss_file as f64),
    ("RssShmem", |s| s.rss_shmem as f64),
    ("VmData", |s| s.vm_data as f64),
    ("VmStk", |s| s.vm_stack as f64),
    ("VmExe", |s| s.vm_exe as f64),
    ("VmLib", |s| s.vm_lib as f64),
    ("VmPTE", |s| s.vm_pte as f64),
    ("VmSwap", |s| s.vm_swap as f64),
    ("Threads", |s| s.threads as f64),
    ("VoluntaryCtxtSwitches", |s| s.voluntary_ctxt_switches as f64),
    ("NonvoluntaryCtxtSwitches", |s| {
        s.nonvoluntary_ctxt_switches as f64
    }),
    ("FDSize", |s| s.fd_size as f64),
    ("MinorFaults", |s| s.minor_faults as f64),
    ("MajorFaults", |s| s.major_faults as f64),
    ("UserTicks", |s| s.user_ticks as f64),
    ("SystemTicks", |s| s.system_ticks as f64),
    ("StartTicks", |s| s.start_ticks as f64),
];
