// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Destination adapters.
//!
//! Every sink is owned by the consumer task and called one entry at a time,
//! so implementations take `&mut self` and need no internal locking. The
//! dispatcher wraps each call in its own timeout.

use std::sync::{Arc, Mutex, TryLockError};

use async_trait::async_trait;

use crate::entry::{LogEntry, LogLevel, LogSource};
use crate::error::SinkError;

pub mod console;
pub mod failover_file;
pub mod influx;
pub mod loki;
pub mod ui;

pub use console::ConsoleSink;
pub use failover_file::FailoverFileSink;
pub use influx::InfluxSink;
pub use loki::LokiSink;
pub use ui::UiSink;

#[async_trait]
pub trait Sink: Send {
    /// Short name used in failure reports.
    fn name(&self) -> &'static str;

    async fn emit(&mut self, entry: &LogEntry) -> Result<(), SinkError>;

    /// Lightweight reachability check used while the sink is marked failing.
    async fn probe(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Capability exposed by an attached UI. The relay only holds it weakly.
///
/// `accept` runs on the consumer task and must return promptly: hand the
/// entry to the UI's own queue or event loop instead of rendering inline.
pub trait UiFeed: Send + Sync {
    fn accept(&self, level: LogLevel, source: LogSource, message: &str);
}

/// Runs blocking I/O against `target` on the blocking pool, so the
/// dispatcher's timeout can give up on a wedged writer.
///
/// A write abandoned that way keeps the lock until it returns; later calls
/// fail at once with `SinkError::Other` instead of queueing more threads
/// behind it.
pub(crate) async fn run_blocking<T, F>(
    target: &Arc<Mutex<T>>,
    what: &'static str,
    f: F,
) -> Result<(), SinkError>
where
    T: Send + 'static,
    F: FnOnce(&mut T) -> std::io::Result<()> + Send + 'static,
{
    let target = Arc::clone(target);
    tokio::task::spawn_blocking(move || {
        let mut guard = match target.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                return Err(SinkError::Other(format!(
                    "{what} still blocked on a previous write"
                )))
            }
            Err(TryLockError::Poisoned(_)) => {
                return Err(SinkError::Other(format!("{what} lock poisoned")))
            }
        };
        f(&mut *guard).map_err(SinkError::from)
    })
    .await
    .map_err(|e| SinkError::Other(format!("{what} write task failed: {e}")))?
}
