// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-entry fan-out, run by the single consumer task.
//!
//! For every entry the sinks are tried in a fixed order:
//!
//! 1. remote aggregator, gated by the [`FailureTracker`]
//! 2. failover file, whenever step 1 was skipped or failed
//! 3. metrics store, for entries carrying a metric
//! 4. console, gated by the [`ConsoleFilter`]
//! 5. UI feed, gated by the [`UiFilter`] and a live UI
//!
//! Each call is bounded by the configured write timeout. A failure is
//! reported through the [`FallbackLogger`] and never stops later sinks.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::entry::{Fields, LogEntry};
use crate::error::SinkError;
use crate::failure_tracker::{FailureState, FailureTracker, Route, Transition};
use crate::fallback::FallbackLogger;
use crate::filter::{ConsoleFilter, UiFilter};
use crate::sinks::Sink;

/// The sinks a dispatcher owns. `None` disables that destination.
#[derive(Default)]
pub struct SinkSet {
    pub remote: Option<Box<dyn Sink>>,
    pub failover: Option<Box<dyn Sink>>,
    pub metrics: Option<Box<dyn Sink>>,
    pub console: Option<Box<dyn Sink>>,
    pub ui: Option<Box<dyn Sink>>,
}

impl SinkSet {
    fn into_vec(self) -> Vec<Box<dyn Sink>> {
        [self.remote, self.failover, self.metrics, self.console, self.ui]
            .into_iter()
            .flatten()
            .collect()
    }
}

pub struct Dispatcher {
    sinks: SinkSet,
    console_filter: ConsoleFilter,
    ui_filter: UiFilter,
    tracker: FailureTracker,
    tracker_state: watch::Sender<FailureState>,
    write_timeout: Duration,
    fallback: Arc<FallbackLogger>,
}

impl Dispatcher {
    /// Returns the dispatcher and a receiver that follows the remote sink's
    /// failure state.
    #[must_use]
    pub fn new(
        sinks: SinkSet,
        config: &RelayConfig,
        fallback: Arc<FallbackLogger>,
    ) -> (Self, watch::Receiver<FailureState>) {
        let (console_filter, unknown) = ConsoleFilter::from_config(&config.console);
        for key in unknown {
            let mut fields = Fields::new();
            fields.insert("key".to_string(), key.into());
            fallback.warning("Ignoring console filter for unknown log source", &fields);
        }
        let tracker = FailureTracker::new(config.failure);
        let (tracker_state, state_rx) = watch::channel(tracker.state());
        (
            Self {
                sinks,
                console_filter,
                ui_filter: UiFilter::from_config(&config.ui),
                tracker,
                tracker_state,
                write_timeout: config.sinks.write,
                fallback,
            },
            state_rx,
        )
    }

    pub async fn dispatch(&mut self, entry: &LogEntry) {
        let remote_delivered = self.dispatch_remote(entry).await;

        if !remote_delivered {
            if let Some(failover) = self.sinks.failover.as_mut() {
                if let Err(e) = bounded_emit(failover, entry, self.write_timeout).await {
                    report(&self.fallback, failover.name(), entry, &e);
                }
            }
        }

        if entry.metric().is_some() {
            if let Some(metrics) = self.sinks.metrics.as_mut() {
                if let Err(e) = bounded_emit(metrics, entry, self.write_timeout).await {
                    report(&self.fallback, metrics.name(), entry, &e);
                }
            }
        }

        if self.console_filter.should_show(entry) {
            if let Some(console) = self.sinks.console.as_mut() {
                if let Err(e) = bounded_emit(console, entry, self.write_timeout).await {
                    report(&self.fallback, console.name(), entry, &e);
                }
            }
        }

        if self.ui_filter.should_forward(entry) {
            if let Some(ui) = self.sinks.ui.as_mut() {
                match bounded_emit(ui, entry, self.write_timeout).await {
                    Ok(()) => {}
                    Err(SinkError::Closed) => {
                        debug!("UI feed detached, no longer forwarding entries");
                        self.sinks.ui = None;
                    }
                    Err(e) => report(&self.fallback, ui.name(), entry, &e),
                }
            }
        }
    }

    /// Returns true when the remote aggregator accepted the entry.
    async fn dispatch_remote(&mut self, entry: &LogEntry) -> bool {
        let Some(remote) = self.sinks.remote.as_mut() else {
            return false;
        };

        match self.tracker.route() {
            Route::Skip => return false,
            Route::Probe => {
                let probe = match timeout(self.write_timeout, remote.probe()).await {
                    Ok(result) => result,
                    Err(_) => Err(SinkError::Timeout(self.write_timeout)),
                };
                if let Err(e) = probe {
                    debug!("Remote aggregator probe failed: {}", e);
                    self.tracker.record_failure();
                    self.tracker_state.send_replace(self.tracker.state());
                    return false;
                }
                let transition = self.tracker.record_success();
                announce(&self.fallback, self.tracker.state(), transition);
            }
            Route::Send => {}
        }

        let result = bounded_emit(remote, entry, self.write_timeout).await;
        let delivered = match result {
            Ok(()) => {
                let transition = self.tracker.record_success();
                announce(&self.fallback, self.tracker.state(), transition);
                true
            }
            Err(e) => {
                report(&self.fallback, remote.name(), entry, &e);
                let transition = self.tracker.record_failure();
                announce(&self.fallback, self.tracker.state(), transition);
                false
            }
        };
        self.tracker_state.send_replace(self.tracker.state());
        delivered
    }

    #[must_use]
    pub fn failure_state(&self) -> FailureState {
        self.tracker.state()
    }

    /// Closes every sink concurrently, each bounded by `close_timeout`.
    /// Returns the names of the sinks that failed or timed out.
    pub async fn close(self, close_timeout: Duration) -> Vec<&'static str> {
        let fallback = self.fallback;
        let closes = self.sinks.into_vec().into_iter().map(|mut sink| async move {
            let name = sink.name();
            let result = match timeout(close_timeout, sink.close()).await {
                Ok(result) => result,
                Err(_) => Err(SinkError::Timeout(close_timeout)),
            };
            (name, result)
        });

        let mut failed = Vec::new();
        for (name, result) in join_all(closes).await {
            if let Err(e) = result {
                let mut fields = Fields::new();
                fields.insert("sink".to_string(), name.into());
                fields.insert("error".to_string(), e.to_string().into());
                fallback.error("Failed to close sink", &fields);
                failed.push(name);
            }
        }
        failed
    }
}

async fn bounded_emit(
    sink: &mut Box<dyn Sink>,
    entry: &LogEntry,
    limit: Duration,
) -> Result<(), SinkError> {
    match timeout(limit, sink.emit(entry)).await {
        Ok(result) => result,
        Err(_) => Err(SinkError::Timeout(limit)),
    }
}

fn announce(fallback: &FallbackLogger, state: FailureState, transition: Option<Transition>) {
    let mut fields = Fields::new();
    fields.insert(
        "consecutive_failures".to_string(),
        state.consecutive_failures.into(),
    );
    fields.insert("threshold".to_string(), state.threshold.into());
    match transition {
        Some(Transition::EnteredFailing) => {
            warn!("Remote aggregator marked as failing");
            fallback.critical(
                "Remote aggregator is failing, routing entries to the failover file",
                &fields,
            );
        }
        Some(Transition::Recovered) => {
            debug!("Remote aggregator recovered");
            fallback.info("Remote aggregator connection restored", &fields);
        }
        None => {}
    }
}

fn report(fallback: &FallbackLogger, sink: &str, entry: &LogEntry, error: &SinkError) {
    let mut fields = Fields::new();
    fields.insert("sink".to_string(), sink.into());
    fields.insert("source".to_string(), entry.source().as_str().into());
    fields.insert("error".to_string(), error.to_string().into());
    fallback.error("Sink dispatch failed", &fields);
}
