// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::collector::process::{ProcessStats, ProcessStatsReader};
use crate::errors::SampleError;
use tracing::debug;

pub struct UnsupportedProcessStatsReader;

impl ProcessStatsReader for UnsupportedProcessStatsReader {
    fn read(&self) -> Result<ProcessStats, SampleError> {
        debug!("Process statistics are only read from procfs");
        Err(SampleError::Unavailable {
            source_name: "process stats",
            reason: "unsupported platform".to_string(),
        })
    }
}
