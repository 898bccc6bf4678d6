// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Event formatter for the relay's own diagnostics.
//!
//! Lifecycle messages of the relay (start, shutdown, breaker transitions) go
//! through `tracing`, not through the relay itself. This formatter tags them
//! with the emitting component so they stand apart from the relayed console
//! lines:
//!
//! ```text
//! RELAY | INFO | pipeline | Relay started with queue capacity 1000
//! RELAY | WARN | telemetry_relayd | stdin{line=12}: Skipping malformed event: ...
//! ```

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

const OWN_TARGETS: [&str; 2] = ["telemetry_relay::", "telemetry_relayd::"];

/// `RELAY | LEVEL | component | [span{fields} > ...: ] message fields`
///
/// The component is the module path inside the relay crates; events from
/// other crates keep their full target.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

fn component(target: &str) -> &str {
    OWN_TARGETS
        .iter()
        .find_map(|prefix| target.strip_prefix(prefix))
        .unwrap_or(target)
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
        let metadata = event.metadata();
        write!(
            writer,
            "RELAY | {} | {} | ",
            metadata.level(),
            component(metadata.target())
        )?;

        if let Some(scope) = ctx.event_scope() {
            let mut spans = 0;
            for span in scope.from_root() {
                if spans > 0 {
                    write!(writer, " > ")?;
                }
                spans += 1;
                write!(writer, "{}", span.name())?;
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
            }
            if spans > 0 {
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
