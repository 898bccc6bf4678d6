// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::{HashMap, HashSet};

use crate::config::{ConsoleConfig, UiConfig};
use crate::entry::{LogEntry, LogLevel, LogSource};

/// Decides which entries reach the operator console.
///
/// Warnings and above always pass. Everything else needs an allowed source
/// and a level at or above the threshold.
#[derive(Debug, Clone)]
pub struct ConsoleFilter {
    allowed: HashSet<LogSource>,
    min_level: LogLevel,
}

impl Default for ConsoleFilter {
    fn default() -> Self {
        Self {
            allowed: LogSource::ALL.into_iter().collect(),
            min_level: LogLevel::Info,
        }
    }
}

impl ConsoleFilter {
    /// Builds the filter from a per-source map keyed by member or wire name.
    ///
    /// Returns the filter and the keys that named no known source, so the
    /// caller can report them.
    #[must_use]
    pub fn from_config(config: &ConsoleConfig) -> (Self, Vec<String>) {
        let (allowed, unknown) = apply_source_map(&config.filters);
        (
            Self {
                allowed,
                min_level: config.min_level,
            },
            unknown,
        )
    }

    #[must_use]
    pub fn should_show(&self, entry: &LogEntry) -> bool {
        if entry.level().is_severe() {
            return true;
        }
        self.allowed.contains(&entry.source()) && entry.level() >= self.min_level
    }

    pub fn set_source(&mut self, source: LogSource, enabled: bool) {
        if enabled {
            self.allowed.insert(source);
        } else {
            self.allowed.remove(&source);
        }
    }

    pub fn set_min_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    #[must_use]
    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

/// Every source starts allowed and any key mapping to it with `false` hides
/// it, so a source named twice with conflicting flags stays hidden whatever
/// the map's iteration order.
fn apply_source_map(filters: &HashMap<String, bool>) -> (HashSet<LogSource>, Vec<String>) {
    let mut allowed: HashSet<LogSource> = LogSource::ALL.into_iter().collect();
    let mut unknown = Vec::new();
    for (key, enabled) in filters {
        match key.parse::<LogSource>() {
            Ok(source) => {
                if !enabled {
                    allowed.remove(&source);
                }
            }
            Err(_) => unknown.push(key.clone()),
        }
    }
    unknown.sort();
    (allowed, unknown)
}

/// Decides which entries are forwarded to an attached UI feed.
///
/// Unlike the console there is no severity override: the UI only sees the
/// configured sources.
#[derive(Debug, Clone)]
pub struct UiFilter {
    sources: HashSet<LogSource>,
    min_level: LogLevel,
}

impl UiFilter {
    #[must_use]
    pub fn from_config(config: &UiConfig) -> Self {
        Self {
            sources: config.sources.iter().copied().collect(),
            min_level: config.min_level,
        }
    }

    #[must_use]
    pub fn should_forward(&self, entry: &LogEntry) -> bool {
        self.sources.contains(&entry.source()) && entry.level() >= self.min_level
    }
}

impl Default for UiFilter {
    fn default() -> Self {
        Self::from_config(&UiConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Fields;

    fn entry(source: LogSource, level: LogLevel) -> LogEntry {
        LogEntry::new(source, level, "msg", Fields::new())
    }

    fn console_config(min_level: LogLevel, filters: &[(&str, bool)]) -> ConsoleConfig {
        ConsoleConfig {
            enabled: true,
            min_level,
            filters: filters
                .iter()
                .map(|(k, v)| ((*k).to_string(), *v))
                .collect(),
        }
    }

    #[test]
    fn test_disabled_source_hides_info_but_not_warning() {
        let (filter, unknown) =
            ConsoleFilter::from_config(&console_config(LogLevel::Info, &[("PSLIST", false)]));
        assert!(unknown.is_empty());
        assert!(!filter.should_show(&entry(LogSource::Pslist, LogLevel::Info)));
        assert!(filter.should_show(&entry(LogSource::Pslist, LogLevel::Warning)));
        assert!(filter.should_show(&entry(LogSource::MainApp, LogLevel::Info)));
    }

    #[test]
    fn test_severe_entries_always_shown() {
        let filters: Vec<(&str, bool)> = LogSource::ALL
            .iter()
            .map(|s| (s.member_name(), false))
            .collect();
        let (filter, _) =
            ConsoleFilter::from_config(&console_config(LogLevel::Critical, &filters));
        for source in LogSource::ALL {
            for level in [LogLevel::Warning, LogLevel::Error, LogLevel::Critical] {
                assert!(filter.should_show(&entry(source, level)));
            }
            assert!(!filter.should_show(&entry(source, LogLevel::Info)));
            assert!(!filter.should_show(&entry(source, LogLevel::Debug)));
        }
    }

    #[test]
    fn test_min_level_threshold() {
        let mut filter = ConsoleFilter::default();
        assert!(!filter.should_show(&entry(LogSource::System, LogLevel::Debug)));
        filter.set_min_level(LogLevel::Debug);
        assert!(filter.should_show(&entry(LogSource::System, LogLevel::Debug)));
        assert_eq!(filter.min_level(), LogLevel::Debug);
    }

    #[test]
    fn test_wire_names_and_unknown_keys() {
        let (filter, unknown) = ConsoleFilter::from_config(&console_config(
            LogLevel::Info,
            &[("th_logcat", false), ("not_a_source", false)],
        ));
        assert_eq!(unknown, vec!["not_a_source".to_string()]);
        assert!(!filter.should_show(&entry(LogSource::Logcat, LogLevel::Info)));
    }

    #[test]
    fn test_conflicting_names_keep_source_hidden() {
        // Each map gets a fresh hash seed, so both iteration orders come up
        for _ in 0..32 {
            let (filter, unknown) = ConsoleFilter::from_config(&console_config(
                LogLevel::Info,
                &[("PSLIST", true), ("th_pslist", false), ("FRIDA", true)],
            ));
            assert!(unknown.is_empty());
            assert!(!filter.should_show(&entry(LogSource::Pslist, LogLevel::Info)));
            assert!(filter.should_show(&entry(LogSource::Frida, LogLevel::Info)));
        }
    }

    #[test]
    fn test_set_source_reenables() {
        let (mut filter, _) =
            ConsoleFilter::from_config(&console_config(LogLevel::Info, &[("FRIDA", false)]));
        assert!(!filter.should_show(&entry(LogSource::Frida, LogLevel::Info)));
        filter.set_source(LogSource::Frida, true);
        assert!(filter.should_show(&entry(LogSource::Frida, LogLevel::Info)));
    }

    #[test]
    fn test_ui_filter_defaults() {
        let filter = UiFilter::default();
        assert!(filter.should_forward(&entry(LogSource::MainApp, LogLevel::Info)));
        assert!(!filter.should_forward(&entry(LogSource::MainApp, LogLevel::Debug)));
        assert!(!filter.should_forward(&entry(LogSource::Pslist, LogLevel::Error)));
        assert!(!filter.should_forward(&entry(LogSource::Logcat, LogLevel::Critical)));
    }
}
