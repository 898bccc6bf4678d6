// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The relay orchestrator.
//!
//! ```text
//!   log_*() ──> FrequencyController ──> BoundedLogQueue ──> consumer task
//!      │                                                        │
//!      └── not started / shut down ──> FallbackLogger     Dispatcher ──> sinks
//! ```
//!
//! A [`Pipeline`] is built from an explicit [`RelayConfig`], started once
//! inside the tokio runtime that will run its consumer, and shared with
//! producers behind an `Arc`. Producer calls are synchronous and never fail:
//! the queue is reached through the runtime handle captured by
//! [`Pipeline::start`], so plain threads can log too.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once, OnceLock};
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

use crate::config::RelayConfig;
use crate::dispatch::{Dispatcher, SinkSet};
use crate::entry::{Fields, LogEntry, LogLevel, LogSource};
use crate::error::RelayError;
use crate::failure_tracker::FailureState;
use crate::fallback::FallbackLogger;
use crate::frequency::FrequencyController;
use crate::queue::{self, BoundedLogQueue, PutError, QueueReceiver, QueueStats, TryPutError};
use crate::sinks::{ConsoleSink, FailoverFileSink, InfluxSink, LokiSink, Sink, UiFeed, UiSink};

/// Bounded sink calls one entry can cost: a probe plus the remote send,
/// then failover, metrics, console and UI.
const MAX_SINK_CALLS_PER_ENTRY: u32 = 6;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub queue: QueueStats,
    /// Samples rejected by the rate limiter, per source.
    pub suppressed: HashMap<LogSource, u64>,
    /// Entries refused because the pipeline was shutting down.
    pub rejected: u64,
    /// Remote aggregator breaker state, once started with a remote sink.
    pub remote: Option<FailureState>,
    /// Synchronous puts currently waiting for a queue slot.
    pub pending_handoffs: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Entries dispatched while draining.
    pub drained: u64,
    /// Entries still queued when the drain deadline passed.
    pub abandoned: u64,
    /// Sinks whose close failed or timed out.
    pub sinks_failed_close: Vec<&'static str>,
}

struct Backend {
    queue: BoundedLogQueue,
    /// Caps synchronous puts waiting for a slot at one queue's worth.
    handoffs: Arc<Semaphore>,
    runtime: Handle,
    remote_state: Option<watch::Receiver<FailureState>>,
}

struct Consumer {
    task: JoinHandle<ConsumerOutcome>,
    stop: oneshot::Sender<Instant>,
}

struct ConsumerOutcome {
    drained: u64,
    abandoned: u64,
    sinks_failed_close: Vec<&'static str>,
}

pub struct Pipeline {
    config: RelayConfig,
    frequency: FrequencyController,
    fallback: Arc<FallbackLogger>,
    accepting: AtomicBool,
    rejected: Arc<AtomicU64>,
    pending: Mutex<Option<SinkSet>>,
    backend: OnceLock<Backend>,
    consumer: Mutex<Option<Consumer>>,
    no_runtime: Once,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("started", &self.backend.get().is_some())
            .field("accepting", &self.accepting.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Collects injected sinks before building a [`Pipeline`].
///
/// Sinks that are not injected are built from the configuration; an injected
/// sink is used even when its configuration section is disabled.
pub struct PipelineBuilder {
    config: RelayConfig,
    fallback: Option<Arc<FallbackLogger>>,
    remote: Option<Box<dyn Sink>>,
    failover: Option<Box<dyn Sink>>,
    metrics: Option<Box<dyn Sink>>,
    console: Option<Box<dyn Sink>>,
    ui_feed: Option<Arc<dyn UiFeed>>,
}

impl PipelineBuilder {
    #[must_use]
    pub fn fallback_logger(mut self, fallback: Arc<FallbackLogger>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    #[must_use]
    pub fn remote_sink(mut self, sink: impl Sink + 'static) -> Self {
        self.remote = Some(Box::new(sink));
        self
    }

    #[must_use]
    pub fn failover_sink(mut self, sink: impl Sink + 'static) -> Self {
        self.failover = Some(Box::new(sink));
        self
    }

    #[must_use]
    pub fn metrics_sink(mut self, sink: impl Sink + 'static) -> Self {
        self.metrics = Some(Box::new(sink));
        self
    }

    #[must_use]
    pub fn console_sink(mut self, sink: impl Sink + 'static) -> Self {
        self.console = Some(Box::new(sink));
        self
    }

    /// Attaches a UI. Only a weak reference is kept.
    #[must_use]
    pub fn ui_feed(mut self, feed: Arc<dyn UiFeed>) -> Self {
        self.ui_feed = Some(feed);
        self
    }

    /// Validates the configuration and builds the missing sinks.
    ///
    /// A sink that cannot be built is reported through the fallback logger and
    /// left disabled; only an invalid configuration is an error.
    pub fn build(self) -> Result<Pipeline, RelayError> {
        self.config.validate()?;
        let config = self.config;
        let fallback = self
            .fallback
            .unwrap_or_else(|| Arc::new(FallbackLogger::new(&config.fallback)));
        let write_timeout = config.sinks.write;

        let remote = self.remote.or_else(|| {
            config
                .remote
                .enabled
                .then(|| boxed(LokiSink::new(&config.remote, write_timeout)))
        });

        let failover = self.failover.or_else(|| {
            match FailoverFileSink::from_config(&config.failover_file) {
                Ok(sink) => sink.map(boxed),
                Err(e) => {
                    let mut fields = Fields::new();
                    fields.insert("error".to_string(), e.to_string().into());
                    fallback.error("Failed to open failover file, failover disabled", &fields);
                    None
                }
            }
        });

        let metrics = self.metrics.or_else(|| {
            config
                .metrics
                .enabled
                .then(|| boxed(InfluxSink::new(&config.metrics, write_timeout)))
        });

        let console = self
            .console
            .or_else(|| config.console.enabled.then(|| boxed(ConsoleSink::stdout())));

        let ui = self.ui_feed.as_ref().map(|feed| boxed(UiSink::new(feed)));

        let sinks = SinkSet {
            remote,
            failover,
            metrics,
            console,
            ui,
        };
        debug!(
            "Relay built with remote={} failover={} metrics={} console={} ui={}",
            sinks.remote.is_some(),
            sinks.failover.is_some(),
            sinks.metrics.is_some(),
            sinks.console.is_some(),
            sinks.ui.is_some()
        );

        Ok(Pipeline {
            frequency: FrequencyController::new(&config.rate_limits),
            config,
            fallback,
            accepting: AtomicBool::new(true),
            rejected: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(Some(sinks)),
            backend: OnceLock::new(),
            consumer: Mutex::new(None),
            no_runtime: Once::new(),
        })
    }
}

fn boxed(sink: impl Sink + 'static) -> Box<dyn Sink> {
    Box::new(sink)
}

impl Pipeline {
    #[must_use]
    pub fn builder(config: RelayConfig) -> PipelineBuilder {
        PipelineBuilder {
            config,
            fallback: None,
            remote: None,
            failover: None,
            metrics: None,
            console: None,
            ui_feed: None,
        }
    }

    /// Binds the queue to the current tokio runtime and spawns the consumer.
    ///
    /// Must be called exactly once, from inside the runtime that will run the
    /// consumer.
    pub fn start(&self) -> Result<(), RelayError> {
        let Ok(runtime) = Handle::try_current() else {
            self.no_runtime.call_once(|| {
                self.fallback.critical(
                    "No async runtime available, relay running in degraded mode",
                    &Fields::new(),
                );
            });
            return Err(RelayError::NoRuntime);
        };
        if !self.accepting.load(Ordering::Acquire) {
            return Err(RelayError::AlreadyShutdown);
        }
        let sinks = self
            .pending
            .lock()
            .ok()
            .and_then(|mut pending| pending.take())
            .ok_or(RelayError::AlreadyStarted)?;

        let has_remote = sinks.remote.is_some();
        let (queue, rx) = queue::channel(&self.config.queue);
        let (dispatcher, remote_state) =
            Dispatcher::new(sinks, &self.config, Arc::clone(&self.fallback));
        let (stop, stop_rx) = oneshot::channel();
        let task = runtime.spawn(consume(
            rx,
            dispatcher,
            stop_rx,
            self.config.sinks.close,
            Arc::clone(&self.fallback),
        ));

        let backend = Backend {
            queue,
            handoffs: Arc::new(Semaphore::new(self.config.queue.max_size)),
            runtime,
            remote_state: has_remote.then_some(remote_state),
        };
        if self.backend.set(backend).is_err() {
            task.abort();
            return Err(RelayError::AlreadyStarted);
        }
        if let Ok(mut consumer) = self.consumer.lock() {
            *consumer = Some(Consumer { task, stop });
        }
        info!(
            "Relay started with queue capacity {}",
            self.config.queue.max_size
        );
        Ok(())
    }

    pub fn log_debug(&self, source: LogSource, message: impl Into<String>, fields: Fields) {
        self.submit(source, LogLevel::Debug, message.into(), fields);
    }

    pub fn log_info(&self, source: LogSource, message: impl Into<String>, fields: Fields) {
        self.submit(source, LogLevel::Info, message.into(), fields);
    }

    pub fn log_warning(&self, source: LogSource, message: impl Into<String>, fields: Fields) {
        self.submit(source, LogLevel::Warning, message.into(), fields);
    }

    pub fn log_error(&self, source: LogSource, message: impl Into<String>, fields: Fields) {
        self.submit(source, LogLevel::Error, message.into(), fields);
    }

    pub fn log_critical(&self, source: LogSource, message: impl Into<String>, fields: Fields) {
        self.submit(source, LogLevel::Critical, message.into(), fields);
    }

    /// Async producer: awaits the bounded put instead of handing it off.
    pub async fn log(
        &self,
        source: LogSource,
        level: LogLevel,
        message: impl Into<String>,
        fields: Fields,
    ) {
        let Some((entry, backend)) = self.admit(source, level, message.into(), fields) else {
            return;
        };
        if let Err(PutError::Closed(entry)) = backend.queue.put(entry).await {
            self.reject(&entry);
        }
    }

    fn submit(&self, source: LogSource, level: LogLevel, message: String, fields: Fields) {
        let Some((entry, backend)) = self.admit(source, level, message, fields) else {
            return;
        };
        match backend.queue.try_put(entry) {
            Ok(()) => {}
            Err(TryPutError::Closed(entry)) => self.reject(&entry),
            Err(TryPutError::Full(entry)) => {
                let Ok(permit) = Arc::clone(&backend.handoffs).try_acquire_owned() else {
                    drop(entry);
                    backend.queue.drop_without_wait();
                    return;
                };
                let queue = backend.queue.clone();
                let fallback = Arc::clone(&self.fallback);
                let rejected = Arc::clone(&self.rejected);
                backend.runtime.spawn(async move {
                    let _permit = permit;
                    if let Err(PutError::Closed(entry)) = queue.put(entry).await {
                        rejected.fetch_add(1, Ordering::Relaxed);
                        fallback.record(&entry);
                    }
                });
            }
        }
    }

    /// Applies sampling and lifecycle checks. Returns the entry and backend
    /// when the entry should go to the queue.
    fn admit(
        &self,
        source: LogSource,
        level: LogLevel,
        message: String,
        fields: Fields,
    ) -> Option<(LogEntry, &Backend)> {
        if !self.frequency.should_log(source) {
            return None;
        }
        let entry = LogEntry::new(source, level, message, fields);
        if !self.accepting.load(Ordering::Acquire) {
            self.reject(&entry);
            return None;
        }
        match self.backend.get() {
            Some(backend) => Some((entry, backend)),
            None => {
                self.fallback.record(&entry);
                None
            }
        }
    }

    fn reject(&self, entry: &LogEntry) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        self.fallback.record(entry);
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.backend.get().is_some()
    }

    #[must_use]
    pub fn frequency(&self) -> &FrequencyController {
        &self.frequency
    }

    #[must_use]
    pub fn fallback(&self) -> &Arc<FallbackLogger> {
        &self.fallback
    }

    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        let backend = self.backend.get();
        PipelineStats {
            queue: backend.map_or_else(
                || QueueStats {
                    max_size: self.config.queue.max_size,
                    ..QueueStats::default()
                },
                |backend| backend.queue.stats(),
            ),
            suppressed: self.frequency.suppressed(),
            rejected: self.rejected.load(Ordering::Relaxed),
            remote: backend
                .and_then(|backend| backend.remote_state.as_ref())
                .map(|state| *state.borrow()),
            pending_handoffs: backend.map_or(0, |backend| {
                self.config
                    .queue
                    .max_size
                    .saturating_sub(backend.handoffs.available_permits())
            }),
        }
    }

    /// Stops accepting entries, drains what is already queued within
    /// `timeout`, closes every sink with its own timeout and finally closes
    /// the fallback logger.
    pub async fn shutdown(&self, timeout: Duration) -> Result<ShutdownReport, RelayError> {
        if !self.accepting.swap(false, Ordering::AcqRel) {
            return Err(RelayError::AlreadyShutdown);
        }
        let consumer = self.consumer.lock().ok().and_then(|mut c| c.take());
        let Some(Consumer { mut task, stop }) = consumer else {
            debug!("Relay shut down before start");
            self.fallback.close();
            return Ok(ShutdownReport::default());
        };

        let deadline = Instant::now() + timeout;
        // The entry in flight when the stop arrives runs to completion before
        // the bounded drain and the concurrent sink closes.
        let join_limit =
            timeout + self.config.sinks.write * MAX_SINK_CALLS_PER_ENTRY + self.config.sinks.close;
        let _ = stop.send(deadline);

        let outcome = match tokio::time::timeout(join_limit, &mut task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                let mut fields = Fields::new();
                fields.insert("error".to_string(), e.to_string().into());
                self.fallback.critical("Relay consumer task failed", &fields);
                self.fallback.close();
                return Ok(ShutdownReport::default());
            }
            Err(_) => {
                task.abort();
                self.fallback.critical(
                    "Relay consumer did not stop in time, sinks dropped without close",
                    &Fields::new(),
                );
                self.fallback.close();
                return Err(RelayError::ShutdownTimeout(timeout));
            }
        };

        let report = ShutdownReport {
            drained: outcome.drained,
            abandoned: outcome.abandoned,
            sinks_failed_close: outcome.sinks_failed_close,
        };
        info!(
            "Relay shut down: drained {}, abandoned {}, rejected {}",
            report.drained,
            report.abandoned,
            self.rejected.load(Ordering::Relaxed)
        );
        self.fallback.close();
        Ok(report)
    }
}

/// Consumer loop: dispatch until asked to stop, drain until empty or past
/// the deadline, then close every sink.
async fn consume(
    mut rx: QueueReceiver,
    mut dispatcher: Dispatcher,
    mut stop: oneshot::Receiver<Instant>,
    close_timeout: Duration,
    fallback: Arc<FallbackLogger>,
) -> ConsumerOutcome {
    let deadline = loop {
        tokio::select! {
            biased;
            deadline = &mut stop => break deadline.ok(),
            entry = rx.get() => {
                if let Some(entry) = entry {
                    dispatcher.dispatch(&entry).await;
                }
            }
        }
    };

    // Puts still waiting for a slot now fail and are recorded by producers.
    rx.close();
    let mut drained = 0;
    let mut abandoned = 0;
    while let Some(entry) = rx.try_get() {
        let dispatched = match deadline {
            Some(deadline) => timeout_at(deadline, dispatcher.dispatch(&entry))
                .await
                .is_ok(),
            None => {
                dispatcher.dispatch(&entry).await;
                true
            }
        };
        if dispatched {
            drained += 1;
        } else {
            abandoned += 1;
            fallback.record(&entry);
        }
    }
    debug!(
        "Relay consumer stopped after draining {} entries ({} abandoned)",
        drained, abandoned
    );
    ConsumerOutcome {
        drained,
        abandoned,
        sinks_failed_close: dispatcher.close(close_timeout).await,
    }
}
