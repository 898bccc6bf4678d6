// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Producer-side sampling of high-volume sources.
//!
//! The controller is consulted before an entry is built into the queue, so a
//! chatty source (process listings, attach-layer traces, logcat tails) cannot
//! starve the queue. This is a separate decision from queue-overflow dropping
//! and from per-destination filtering.
//!
//! Samples rejected here are never enqueued. They are counted per source and
//! exposed through [`FrequencyController::suppressed`] so they do not vanish
//! without trace.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::entry::LogSource;

#[derive(Debug, Default)]
struct SourceState {
    interval: Duration,
    last_accepted: Option<Instant>,
    suppressed: u64,
}

/// Per-source minimum emission interval.
#[derive(Debug)]
pub struct FrequencyController {
    sources: Mutex<HashMap<LogSource, SourceState>>,
}

impl Default for FrequencyController {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}

impl FrequencyController {
    /// Creates a controller with the default interval table, then applies
    /// `overrides` on top.
    #[must_use]
    pub fn new(overrides: &HashMap<LogSource, Duration>) -> Self {
        let sources = LogSource::ALL
            .into_iter()
            .map(|source| {
                let interval = overrides
                    .get(&source)
                    .copied()
                    .unwrap_or_else(|| Self::default_interval(source));
                (
                    source,
                    SourceState {
                        interval,
                        ..SourceState::default()
                    },
                )
            })
            .collect();
        Self {
            sources: Mutex::new(sources),
        }
    }

    /// Built-in minimum interval for `source`; zero means unthrottled.
    #[must_use]
    pub fn default_interval(source: LogSource) -> Duration {
        match source {
            LogSource::Pslist => Duration::from_secs(1),
            LogSource::Frida | LogSource::Bluestacks | LogSource::Emulator => {
                Duration::from_millis(100)
            }
            LogSource::Logcat => Duration::from_millis(500),
            _ => Duration::ZERO,
        }
    }

    /// Returns true and records the emission when `source` is outside its
    /// interval window.
    pub fn should_log(&self, source: LogSource) -> bool {
        self.should_log_at(source, Instant::now())
    }

    pub(crate) fn should_log_at(&self, source: LogSource, now: Instant) -> bool {
        let Ok(mut sources) = self.sources.lock() else {
            // Poisoned: fail open.
            return true;
        };
        let state = sources.entry(source).or_default();
        if state.interval.is_zero() {
            return true;
        }
        match state.last_accepted {
            Some(last) if now.saturating_duration_since(last) < state.interval => {
                state.suppressed += 1;
                false
            }
            _ => {
                state.last_accepted = Some(now);
                true
            }
        }
    }

    /// Changes the interval of `source`. The next call is always accepted.
    pub fn set_interval(&self, source: LogSource, interval: Duration) {
        if let Ok(mut sources) = self.sources.lock() {
            let state = sources.entry(source).or_default();
            state.interval = interval;
            state.last_accepted = None;
        }
    }

    pub fn reset_to_default(&self, source: LogSource) {
        self.set_interval(source, Self::default_interval(source));
    }

    #[must_use]
    pub fn interval(&self, source: LogSource) -> Duration {
        self.sources
            .lock()
            .ok()
            .and_then(|sources| sources.get(&source).map(|s| s.interval))
            .unwrap_or_else(|| Self::default_interval(source))
    }

    /// Number of rejected samples per source, omitting sources with none.
    #[must_use]
    pub fn suppressed(&self) -> HashMap<LogSource, u64> {
        self.sources
            .lock()
            .map(|sources| {
                sources
                    .iter()
                    .filter(|(_, state)| state.suppressed > 0)
                    .map(|(source, state)| (*source, state.suppressed))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_intervals() {
        assert_eq!(
            FrequencyController::default_interval(LogSource::Pslist),
            Duration::from_secs(1)
        );
        assert_eq!(
            FrequencyController::default_interval(LogSource::Frida),
            Duration::from_millis(100)
        );
        assert_eq!(
            FrequencyController::default_interval(LogSource::Logcat),
            Duration::from_millis(500)
        );
        assert_eq!(
            FrequencyController::default_interval(LogSource::MainApp),
            Duration::ZERO
        );
    }

    #[test]
    fn test_unthrottled_source_always_passes() {
        let controller = FrequencyController::default();
        let now = Instant::now();
        for _ in 0..100 {
            assert!(controller.should_log_at(LogSource::MainApp, now));
        }
        assert!(controller.suppressed().is_empty());
    }

    #[test]
    fn test_calls_inside_interval_are_rejected() {
        let controller = FrequencyController::default();
        let start = Instant::now();
        assert!(controller.should_log_at(LogSource::Pslist, start));
        assert!(!controller.should_log_at(LogSource::Pslist, start + Duration::from_millis(999)));
        assert!(controller.should_log_at(LogSource::Pslist, start + Duration::from_secs(1)));
        assert_eq!(controller.suppressed().get(&LogSource::Pslist), Some(&1));
    }

    #[test]
    fn test_five_calls_a_tenth_apart_admit_one() {
        let controller = FrequencyController::default();
        let start = Instant::now();
        let accepted = (0..5)
            .filter(|i| {
                controller.should_log_at(LogSource::Pslist, start + Duration::from_millis(100 * i))
            })
            .count();
        assert_eq!(accepted, 1);
        assert_eq!(controller.suppressed().get(&LogSource::Pslist), Some(&4));
    }

    #[test]
    fn test_rejected_calls_do_not_extend_window() {
        let controller = FrequencyController::default();
        let start = Instant::now();
        assert!(controller.should_log_at(LogSource::Logcat, start));
        assert!(!controller.should_log_at(LogSource::Logcat, start + Duration::from_millis(400)));
        // Window counts from the last accepted call, not the last attempt
        assert!(controller.should_log_at(LogSource::Logcat, start + Duration::from_millis(500)));
    }

    #[test]
    fn test_overrides_and_reset() {
        let mut overrides = HashMap::new();
        overrides.insert(LogSource::Database, Duration::from_secs(2));
        overrides.insert(LogSource::Pslist, Duration::ZERO);
        let controller = FrequencyController::new(&overrides);

        assert_eq!(controller.interval(LogSource::Database), Duration::from_secs(2));
        assert_eq!(controller.interval(LogSource::Pslist), Duration::ZERO);

        controller.reset_to_default(LogSource::Pslist);
        assert_eq!(controller.interval(LogSource::Pslist), Duration::from_secs(1));

        controller.set_interval(LogSource::Frida, Duration::ZERO);
        let now = Instant::now();
        assert!(controller.should_log_at(LogSource::Frida, now));
        assert!(controller.should_log_at(LogSource::Frida, now));
    }

    #[test]
    fn test_concurrent_producers() {
        let controller = std::sync::Arc::new(FrequencyController::default());
        let now = Instant::now();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let controller = controller.clone();
                std::thread::spawn(move || controller.should_log_at(LogSource::Pslist, now))
            })
            .collect();
        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|accepted| *accepted)
            .count();
        assert_eq!(accepted, 1);
        assert_eq!(controller.suppressed().get(&LogSource::Pslist), Some(&7));
    }
}
