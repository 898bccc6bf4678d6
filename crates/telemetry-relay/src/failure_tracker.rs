// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Two-state circuit breaker guarding the remote aggregator.
//!
//! ```text
//!            failures >= threshold
//!   HEALTHY ───────────────────────> FAILING
//!      ^                                │
//!      └────── send or probe ok ────────┘
//! ```
//!
//! While failing, ordinary entries skip the remote sink. Every
//! `probe_interval`-th skipped entry is turned into a probe instead, which
//! bounds the cost of a dead endpoint to one network attempt per interval.
//!
//! The tracker is owned by the consumer task and is never shared.

use serde::Serialize;

use crate::config::FailureConfig;

/// What the consumer should do with the remote sink for the current entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Healthy: push the entry.
    Send,
    /// Failing: bypass the remote sink.
    Skip,
    /// Failing, but this round checks whether the remote came back.
    Probe,
}

/// A state change the consumer announces once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    EnteredFailing,
    Recovered,
}

/// Snapshot of the tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FailureState {
    pub consecutive_failures: u32,
    pub is_failing: bool,
    pub threshold: u32,
    pub probe_interval: u32,
}

#[derive(Debug)]
pub struct FailureTracker {
    threshold: u32,
    probe_interval: u32,
    consecutive_failures: u32,
    failing: bool,
    skipped_since_probe: u32,
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new(FailureConfig::default())
    }
}

impl FailureTracker {
    #[must_use]
    pub fn new(config: FailureConfig) -> Self {
        Self {
            threshold: config.threshold.max(1),
            probe_interval: config.probe_interval.max(1),
            consecutive_failures: 0,
            failing: false,
            skipped_since_probe: 0,
        }
    }

    /// Decides the route for the next entry and advances the probe schedule.
    pub fn route(&mut self) -> Route {
        if !self.failing {
            return Route::Send;
        }
        self.skipped_since_probe += 1;
        if self.skipped_since_probe >= self.probe_interval {
            self.skipped_since_probe = 0;
            Route::Probe
        } else {
            Route::Skip
        }
    }

    pub fn record_success(&mut self) -> Option<Transition> {
        self.consecutive_failures = 0;
        if self.failing {
            self.failing = false;
            self.skipped_since_probe = 0;
            Some(Transition::Recovered)
        } else {
            None
        }
    }

    pub fn record_failure(&mut self) -> Option<Transition> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if !self.failing && self.consecutive_failures >= self.threshold {
            self.failing = true;
            self.skipped_since_probe = 0;
            Some(Transition::EnteredFailing)
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_failing(&self) -> bool {
        self.failing
    }

    #[must_use]
    pub fn state(&self) -> FailureState {
        FailureState {
            consecutive_failures: self.consecutive_failures,
            is_failing: self.failing,
            threshold: self.threshold,
            probe_interval: self.probe_interval,
        }
    }
}
