// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::entry::{display_value, human_timestamp, LogEntry};
use crate::error::SinkError;
use crate::sinks::{run_blocking, Sink};

/// Operator console output, one line per entry:
///
/// `[<millis>] <date time>.<ms> UTC - [<source>] <LEVEL> - <message> k=v ...`
///
/// Writes happen on the blocking pool: a paused terminal or an unread pipe
/// costs one timed-out write, not the consumer loop.
pub struct ConsoleSink {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl ConsoleSink {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    #[must_use]
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
        }
    }
}

#[must_use]
pub fn format_line(entry: &LogEntry) -> String {
    let mut line = format!(
        "[{}] {} - [{}] {} - {}",
        entry.timestamp_millis(),
        human_timestamp(entry.timestamp_millis()),
        entry.source(),
        entry.level(),
        entry.message()
    );
    for (key, value) in entry.fields() {
        let _ = write!(line, " {key}={}", display_value(value));
    }
    line
}

#[async_trait]
impl Sink for ConsoleSink {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn emit(&mut self, entry: &LogEntry) -> Result<(), SinkError> {
        let line = format_line(entry);
        run_blocking(&self.out, "console", move |out| {
            writeln!(out, "{line}")?;
            out.flush()
        })
        .await
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        run_blocking(&self.out, "console", |out| out.flush()).await
    }
}
