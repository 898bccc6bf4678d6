// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `RELAY_*` environment variables for the daemon.
//!
//! The library never reads the environment; this is the only place that does.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use telemetry_relay::{LogLevel, LogSource, RelayConfig, RelayError};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    InvalidVar { var: &'static str, reason: String },

    #[error(transparent)]
    Relay(#[from] RelayError),
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub relay: RelayConfig,
    pub log_level: String,
    pub shutdown_timeout: Duration,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut relay = RelayConfig::default();

        relay.console.enabled = flag("RELAY_CONSOLE_ENABLED", relay.console.enabled)?;
        if let Some(level) = parsed::<LogLevel>("RELAY_CONSOLE_MIN_LEVEL")? {
            relay.console.min_level = level;
        }
        if let Some(filters) = var("RELAY_CONSOLE_FILTERS") {
            relay.console.filters = pairs("RELAY_CONSOLE_FILTERS", &filters)?
                .into_iter()
                .map(|(source, enabled)| {
                    parse_bool(&enabled)
                        .map(|enabled| (source, enabled))
                        .ok_or_else(|| invalid("RELAY_CONSOLE_FILTERS", "expected true or false"))
                })
                .collect::<Result<HashMap<_, _>, _>>()?;
        }

        let max_bytes = parsed::<u64>("RELAY_FILE_MAX_BYTES")?;
        let backup_count = parsed::<u32>("RELAY_FILE_BACKUP_COUNT")?;
        for (file, path_var) in [
            (&mut relay.fallback, "RELAY_FALLBACK_FILE"),
            (&mut relay.failover_file, "RELAY_FAILOVER_FILE"),
        ] {
            file.path = var(path_var).map(PathBuf::from);
            if let Some(max_bytes) = max_bytes {
                file.max_bytes = max_bytes;
            }
            if let Some(backup_count) = backup_count {
                file.backup_count = backup_count;
            }
        }

        relay.remote.enabled = flag("RELAY_LOKI_ENABLED", relay.remote.enabled)?;
        if let Some(url) = var("RELAY_LOKI_URL") {
            relay.remote.endpoint = url;
        }
        if let Some(labels) = var("RELAY_LOKI_LABELS") {
            relay.remote.default_labels =
                pairs("RELAY_LOKI_LABELS", &labels)?.into_iter().collect::<BTreeMap<_, _>>();
        }

        relay.metrics.enabled = flag("RELAY_INFLUXDB_ENABLED", relay.metrics.enabled)?;
        if let Some(url) = var("RELAY_INFLUXDB_URL") {
            relay.metrics.url = url;
        }
        relay.metrics.token = var("RELAY_INFLUXDB_TOKEN");
        if let Some(org) = var("RELAY_INFLUXDB_ORG") {
            relay.metrics.org = org;
        }
        if let Some(bucket) = var("RELAY_INFLUXDB_BUCKET") {
            relay.metrics.bucket = bucket;
        }

        if let Some(size) = parsed::<usize>("RELAY_QUEUE_SIZE")? {
            relay.queue.max_size = size;
        }
        if let Some(ms) = parsed::<u64>("RELAY_PUT_TIMEOUT_MS")? {
            relay.queue.put_timeout = Duration::from_millis(ms);
        }
        if let Some(threshold) = parsed::<u32>("RELAY_FAILURE_THRESHOLD")? {
            relay.failure.threshold = threshold;
        }
        if let Some(interval) = parsed::<u32>("RELAY_PROBE_INTERVAL")? {
            relay.failure.probe_interval = interval;
        }
        if let Some(limits) = var("RELAY_RATE_LIMITS") {
            for (source, seconds) in pairs("RELAY_RATE_LIMITS", &limits)? {
                let source = source
                    .parse::<LogSource>()
                    .map_err(|e| invalid("RELAY_RATE_LIMITS", &e))?;
                let seconds = seconds
                    .parse::<f64>()
                    .ok()
                    .and_then(|s| Duration::try_from_secs_f64(s).ok())
                    .ok_or_else(|| invalid("RELAY_RATE_LIMITS", "expected seconds >= 0"))?;
                relay.rate_limits.insert(source, seconds);
            }
        }

        let log_level = var("RELAY_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|| "info".to_string());
        let shutdown_timeout = parsed::<f64>("RELAY_SHUTDOWN_TIMEOUT_SECS")?
            .map(|s| {
                Duration::try_from_secs_f64(s)
                    .map_err(|_| invalid("RELAY_SHUTDOWN_TIMEOUT_SECS", "expected seconds >= 0"))
            })
            .transpose()?
            .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        let config = Self {
            relay,
            log_level,
            shutdown_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(invalid(
                "RELAY_LOG_LEVEL",
                &format!(
                    "'{}' must be one of: trace, debug, info, warn, error",
                    self.log_level
                ),
            ));
        }
        self.relay.validate()?;
        Ok(())
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|val| !val.trim().is_empty())
}

fn invalid(var: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidVar {
        var,
        reason: reason.to_string(),
    }
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn flag(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match var(name) {
        Some(val) => parse_bool(&val).ok_or_else(|| invalid(name, "expected true or false")),
        None => Ok(default),
    }
}

fn parsed<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var(name)
        .map(|val| {
            val.trim()
                .parse::<T>()
                .map_err(|e| invalid(name, &e.to_string()))
        })
        .transpose()
}

/// Parses `a=1,b=2`.
fn pairs(name: &'static str, val: &str) -> Result<Vec<(String, String)>, ConfigError> {
    val.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| invalid(name, &format!("expected key=value, got '{pair}'")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 21] = [
        "RELAY_CONSOLE_ENABLED",
        "RELAY_CONSOLE_MIN_LEVEL",
        "RELAY_CONSOLE_FILTERS",
        "RELAY_FILE_MAX_BYTES",
        "RELAY_FILE_BACKUP_COUNT",
        "RELAY_FALLBACK_FILE",
        "RELAY_FAILOVER_FILE",
        "RELAY_LOKI_ENABLED",
        "RELAY_LOKI_URL",
        "RELAY_LOKI_LABELS",
        "RELAY_INFLUXDB_ENABLED",
        "RELAY_INFLUXDB_URL",
        "RELAY_INFLUXDB_TOKEN",
        "RELAY_INFLUXDB_ORG",
        "RELAY_INFLUXDB_BUCKET",
        "RELAY_QUEUE_SIZE",
        "RELAY_PUT_TIMEOUT_MS",
        "RELAY_FAILURE_THRESHOLD",
        "RELAY_PROBE_INTERVAL",
        "RELAY_RATE_LIMITS",
        "RELAY_LOG_LEVEL",
    ];

    fn clear() {
        for name in VARS {
            env::remove_var(name);
        }
        env::remove_var("RELAY_SHUTDOWN_TIMEOUT_SECS");
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        let config = DaemonConfig::from_env().unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert!(config.relay.console.enabled);
        assert!(!config.relay.remote.enabled);
        assert!(config.relay.fallback.path.is_none());
    }

    #[test]
    #[serial]
    fn test_log_level_is_normalized() {
        clear();
        env::set_var("RELAY_LOG_LEVEL", "DEBUG");
        let config = DaemonConfig::from_env().unwrap();
        assert_eq!(config.log_level, "debug");
        clear();
    }

    #[test]
    #[serial]
    fn test_full_configuration() {
        clear();
        env::set_var("RELAY_CONSOLE_MIN_LEVEL", "debug");
        env::set_var("RELAY_CONSOLE_FILTERS", "PSLIST=false, th_logcat=0");
        env::set_var("RELAY_FAILOVER_FILE", "/tmp/relay/failover.log");
        env::set_var("RELAY_FILE_MAX_BYTES", "1024");
        env::set_var("RELAY_LOKI_ENABLED", "true");
        env::set_var("RELAY_LOKI_URL", "http://loki:3100/loki/api/v1/push");
        env::set_var("RELAY_LOKI_LABELS", "job=relay,environment=prod");
        env::set_var("RELAY_INFLUXDB_ENABLED", "yes");
        env::set_var("RELAY_INFLUXDB_TOKEN", "s3cret");
        env::set_var("RELAY_QUEUE_SIZE", "50");
        env::set_var("RELAY_RATE_LIMITS", "PSLIST=2.5,FRIDA=0");
        env::set_var("RELAY_SHUTDOWN_TIMEOUT_SECS", "0.5");

        let config = DaemonConfig::from_env().unwrap();
        let relay = &config.relay;
        assert_eq!(relay.console.min_level, LogLevel::Debug);
        assert_eq!(relay.console.filters.get("PSLIST"), Some(&false));
        assert_eq!(relay.console.filters.get("th_logcat"), Some(&false));
        assert_eq!(
            relay.failover_file.path,
            Some(PathBuf::from("/tmp/relay/failover.log"))
        );
        assert_eq!(relay.failover_file.max_bytes, 1024);
        assert_eq!(relay.fallback.max_bytes, 1024);
        assert!(relay.remote.enabled);
        assert_eq!(relay.remote.endpoint, "http://loki:3100/loki/api/v1/push");
        assert_eq!(relay.remote.default_labels["environment"], "prod");
        assert!(relay.metrics.enabled);
        assert_eq!(relay.metrics.token.as_deref(), Some("s3cret"));
        assert_eq!(relay.queue.max_size, 50);
        assert_eq!(
            relay.rate_limits.get(&LogSource::Pslist),
            Some(&Duration::from_millis(2500))
        );
        assert_eq!(relay.rate_limits.get(&LogSource::Frida), Some(&Duration::ZERO));
        assert_eq!(config.shutdown_timeout, Duration::from_millis(500));
        clear();
    }

    #[test]
    #[serial]
    fn test_invalid_values() {
        clear();
        env::set_var("RELAY_QUEUE_SIZE", "lots");
        let err = DaemonConfig::from_env().unwrap_err();
        assert!(err.to_string().starts_with("Invalid value for RELAY_QUEUE_SIZE"));

        clear();
        env::set_var("RELAY_QUEUE_SIZE", "0");
        assert!(matches!(
            DaemonConfig::from_env(),
            Err(ConfigError::Relay(RelayError::InvalidConfig(_)))
        ));

        clear();
        env::set_var("RELAY_LOG_LEVEL", "verbose");
        assert!(DaemonConfig::from_env().is_err());

        clear();
        env::set_var("RELAY_RATE_LIMITS", "NOT_A_SOURCE=1");
        assert!(DaemonConfig::from_env().is_err());

        clear();
        env::set_var("RELAY_LOKI_LABELS", "job");
        assert!(DaemonConfig::from_env().is_err());
        clear();
    }
}
