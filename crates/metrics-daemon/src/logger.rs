// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log line formatting for the agent and server binaries.
//!
//! Every line carries the process role so agent and server output can be
//! told apart when interleaved:
//!
//! ```text
//! METRICS_AGENT | INFO | Delivered 3 jobs, dropped 0, cancelled 0
//! METRICS_SERVER | WARN | report{attempt=2}: Retrying in 3000 ms
//! ```

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

pub const AGENT_PREFIX: &str = "METRICS_AGENT";
pub const SERVER_PREFIX: &str = "METRICS_SERVER";

/// Transport crates are silenced; sqlx only reports warnings.
pub fn env_filter(log_level: &str) -> String {
    format!("h2=off,hyper=off,rustls=off,sqlx=warn,{log_level}")
}

/// Prefixes each line with `{prefix} | LEVEL | ` followed by the span chain.
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    prefix: &'static str,
}

impl Formatter {
    pub fn new(prefix: &'static str) -> Self {
        Self { prefix }
    }
}

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(&mut writer, "{} | {} | ", self.prefix, event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Installs the global subscriber. `log_level` is an `EnvFilter` directive
/// such as `info` or `metrics_store=debug`.
pub fn init(prefix: &'static str, log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(env_filter(log_level))?;
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .event_format(Formatter::new(prefix))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_prefix_level_and_span() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt::Subscriber::builder()
            .with_writer(captured.clone())
            .with_ansi(false)
            .event_format(Formatter::new(AGENT_PREFIX))
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("report", attempt = 2);
            let _guard = span.enter();
            tracing::warn!("Retrying in {} ms", 3000);
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert_eq!(
            output,
            "METRICS_AGENT | WARN | report{attempt=2}: Retrying in 3000 ms\n"
        );
    }

    #[test]
    fn test_env_filter_parses() {
        assert!(EnvFilter::try_new(env_filter("debug")).is_ok());
        assert!(env_filter("info").ends_with(",info"));
    }
}
