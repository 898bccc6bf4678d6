// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock sinks for driving the pipeline without network or disk

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use telemetry_relay::{LogEntry, Sink, SinkError};
use tokio::sync::Notify;

/// Remote sink whose writes and probes always fail.
#[derive(Clone, Default)]
pub struct FailingSink {
    pub emits: Arc<AtomicUsize>,
    pub probes: Arc<AtomicUsize>,
}

#[async_trait]
impl Sink for FailingSink {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn emit(&mut self, _entry: &LogEntry) -> Result<(), SinkError> {
        self.emits.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::Rejected {
            status: 503,
            body: "unavailable".to_string(),
        })
    }

    async fn probe(&mut self) -> Result<(), SinkError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::Other("still down".to_string()))
    }
}

/// Sink that keeps the message of every entry it receives.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn emit(&mut self, entry: &LogEntry) -> Result<(), SinkError> {
        self.messages.lock().unwrap().push(entry.message().to_string());
        Ok(())
    }
}

/// Recording sink that holds the consumer inside its first write until
/// released.
#[derive(Clone, Default)]
pub struct GatedSink {
    pub inner: RecordingSink,
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Sink for GatedSink {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn emit(&mut self, entry: &LogEntry) -> Result<(), SinkError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.emit(entry).await
    }
}

/// Sink that takes `delay` per write and remembers being closed.
#[derive(Clone)]
pub struct SlowSink {
    pub inner: RecordingSink,
    pub closed: Arc<AtomicBool>,
    delay: Duration,
}

impl SlowSink {
    pub fn new(delay: Duration) -> Self {
        SlowSink {
            inner: RecordingSink::default(),
            closed: Arc::new(AtomicBool::new(false)),
            delay,
        }
    }
}

#[async_trait]
impl Sink for SlowSink {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn emit(&mut self, entry: &LogEntry) -> Result<(), SinkError> {
        tokio::time::sleep(self.delay).await;
        self.inner.emit(entry).await
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
