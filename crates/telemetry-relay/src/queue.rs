// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded multi-producer, single-consumer log queue.
//!
//! ```text
//!   producers ──put/try_put──> [ capacity N ] ──get/try_get──> consumer
//!                   │
//!                   └─ timeout: dropped_count += 1, maybe a drop warning
//! ```
//!
//! The queue is created by `Pipeline::start` inside the runtime that runs the
//! consumer. [`BoundedLogQueue`] is the cloneable producer half and
//! [`QueueReceiver`] the single consumer half.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};
use tokio::time::{timeout, Instant};
use tracing::debug;

use crate::config::QueueConfig;
use crate::entry::{Fields, LogEntry, LogLevel, LogSource};

/// How long the synthesized drop warning may wait for a slot.
pub const DROP_WARNING_PUT_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub current_size: usize,
    pub max_size: usize,
    /// Entries lost to a full queue. Never reset.
    pub dropped_count: u64,
    /// Drop-summary warnings synthesized so far.
    pub drop_warnings: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum PutError {
    #[error("queue full, entry dropped after {0:?}")]
    Dropped(Duration),

    #[error("queue closed")]
    Closed(LogEntry),
}

#[derive(Debug, thiserror::Error)]
pub enum TryPutError {
    #[error("queue full")]
    Full(LogEntry),

    #[error("queue closed")]
    Closed(LogEntry),
}

#[derive(Debug)]
struct Shared {
    max_size: usize,
    put_timeout: Duration,
    drop_warning_interval: Duration,
    dropped: AtomicU64,
    drop_warnings: AtomicU64,
    last_drop_warning: Mutex<Option<Instant>>,
}

/// Producer half.
#[derive(Clone, Debug)]
pub struct BoundedLogQueue {
    tx: mpsc::Sender<LogEntry>,
    shared: Arc<Shared>,
}

/// Consumer half.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<LogEntry>,
    get_timeout: Duration,
}

/// Creates a queue from `config`. Must be called inside a tokio runtime
/// whenever timeouts are used.
#[must_use]
pub fn channel(config: &QueueConfig) -> (BoundedLogQueue, QueueReceiver) {
    let max_size = config.max_size.max(1);
    let (tx, rx) = mpsc::channel(max_size);
    let shared = Arc::new(Shared {
        max_size,
        put_timeout: config.put_timeout,
        drop_warning_interval: config.drop_warning_interval,
        dropped: AtomicU64::new(0),
        drop_warnings: AtomicU64::new(0),
        last_drop_warning: Mutex::new(None),
    });
    (
        BoundedLogQueue { tx, shared },
        QueueReceiver {
            rx,
            get_timeout: config.get_timeout,
        },
    )
}

impl BoundedLogQueue {
    /// Waits up to `put_timeout` for a slot.
    ///
    /// On timeout the entry is dropped and counted; a closed queue hands the
    /// entry back instead.
    pub async fn put(&self, entry: LogEntry) -> Result<(), PutError> {
        match self.tx.send_timeout(entry, self.shared.put_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Closed(entry)) => Err(PutError::Closed(entry)),
            Err(SendTimeoutError::Timeout(_)) => {
                self.record_drop().await;
                Err(PutError::Dropped(self.shared.put_timeout))
            }
        }
    }

    /// Non-blocking attempt. Nothing is counted on failure.
    pub fn try_put(&self, entry: LogEntry) -> Result<(), TryPutError> {
        self.tx.try_send(entry).map_err(|e| match e {
            TrySendError::Full(entry) => TryPutError::Full(entry),
            TrySendError::Closed(entry) => TryPutError::Closed(entry),
        })
    }

    #[must_use]
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            current_size: self.shared.max_size.saturating_sub(self.tx.capacity()),
            max_size: self.shared.max_size,
            dropped_count: self.shared.dropped.load(Ordering::Relaxed),
            drop_warnings: self.shared.drop_warnings.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Counts an entry the caller gave up on without waiting for a slot.
    ///
    /// A due drop warning is enqueued only if a slot is free right now.
    pub fn drop_without_wait(&self) {
        let Some(warning) = self.note_drop() else {
            return;
        };
        if self.tx.try_send(warning).is_err() {
            debug!(
                "Drop warning could not be enqueued, {} entries dropped so far",
                self.shared.dropped.load(Ordering::Relaxed)
            );
        }
    }

    async fn record_drop(&self) {
        let Some(warning) = self.note_drop() else {
            return;
        };
        // Best effort: with the queue still full the warning is lost too.
        if self
            .tx
            .send_timeout(warning, DROP_WARNING_PUT_TIMEOUT)
            .await
            .is_err()
        {
            debug!(
                "Drop warning could not be enqueued, {} entries dropped so far",
                self.shared.dropped.load(Ordering::Relaxed)
            );
        }
    }

    /// Counts one drop and returns the summary warning when one is due.
    fn note_drop(&self) -> Option<LogEntry> {
        let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if !self.drop_warning_due() {
            return None;
        }
        self.shared.drop_warnings.fetch_add(1, Ordering::Relaxed);

        let mut fields = Fields::new();
        fields.insert("dropped_count".to_string(), dropped.into());
        fields.insert("queue_size".to_string(), self.stats().current_size.into());
        Some(LogEntry::new(
            LogSource::System,
            LogLevel::Warning,
            format!("Log queue full - dropped {dropped} log entries"),
            fields,
        ))
    }

    fn drop_warning_due(&self) -> bool {
        let Ok(mut last) = self.shared.last_drop_warning.lock() else {
            return false;
        };
        let now = Instant::now();
        match *last {
            Some(at) if now.saturating_duration_since(at) < self.shared.drop_warning_interval => {
                false
            }
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

impl QueueReceiver {
    /// Waits up to `get_timeout` for the next entry.
    pub async fn get(&mut self) -> Option<LogEntry> {
        timeout(self.get_timeout, self.rx.recv()).await.ok().flatten()
    }

    pub fn try_get(&mut self) -> Option<LogEntry> {
        self.rx.try_recv().ok()
    }

    /// Refuses further puts. Entries already queued can still be read.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
