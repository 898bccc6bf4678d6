// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use crate::entry::{LogLevel, LogSource};
use crate::error::RelayError;

pub const DEFAULT_QUEUE_SIZE: usize = 1000;
pub const DEFAULT_PUT_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_GET_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_DROP_WARNING_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_PROBE_INTERVAL: u32 = 10;
pub const DEFAULT_SINK_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_ROTATION_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_BACKUP_COUNT: u32 = 2;
pub const DEFAULT_LOKI_URL: &str = "http://localhost:3100/loki/api/v1/push";
pub const DEFAULT_INFLUXDB_URL: &str = "http://localhost:8086";

/// Complete relay configuration. Everything is explicit; the library never
/// consults the environment.
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    pub console: ConsoleConfig,
    /// Emergency file of the fallback logger.
    pub fallback: RotatingFileConfig,
    /// File that receives entries the remote aggregator could not take.
    pub failover_file: RotatingFileConfig,
    pub remote: RemoteConfig,
    pub metrics: MetricsConfig,
    pub ui: UiConfig,
    pub queue: QueueConfig,
    pub failure: FailureConfig,
    /// Per-source overrides of the default rate-limit intervals.
    pub rate_limits: HashMap<LogSource, Duration>,
    pub sinks: SinkTimeouts,
}

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub min_level: LogLevel,
    /// Source name (member or wire name) to enabled flag.
    pub filters: HashMap<String, bool>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_level: LogLevel::Info,
            filters: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RotatingFileConfig {
    /// `None` disables the file.
    pub path: Option<PathBuf>,
    /// Rotation threshold; 0 disables rotation.
    pub max_bytes: u64,
    pub backup_count: u32,
}

impl Default for RotatingFileConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_bytes: DEFAULT_ROTATION_BYTES,
            backup_count: DEFAULT_BACKUP_COUNT,
        }
    }
}

/// Loki push endpoint settings.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub default_labels: BTreeMap<String, String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        let mut default_labels = BTreeMap::new();
        default_labels.insert("job".to_string(), "tower_hooker_unified".to_string());
        default_labels.insert("environment".to_string(), "development".to_string());
        Self {
            enabled: false,
            endpoint: DEFAULT_LOKI_URL.to_string(),
            default_labels,
        }
    }
}

/// InfluxDB v2 write settings.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub url: String,
    pub token: Option<String>,
    pub org: String,
    pub bucket: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: DEFAULT_INFLUXDB_URL.to_string(),
            token: None,
            org: "tower_hooker".to_string(),
            bucket: "metrics".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub min_level: LogLevel,
    pub sources: Vec<LogSource>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            sources: vec![
                LogSource::MainApp,
                LogSource::Bluestacks,
                LogSource::Emulator,
                LogSource::Frida,
                LogSource::System,
                LogSource::FallbackSystem,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub max_size: usize,
    pub put_timeout: Duration,
    pub get_timeout: Duration,
    pub drop_warning_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_QUEUE_SIZE,
            put_timeout: DEFAULT_PUT_TIMEOUT,
            get_timeout: DEFAULT_GET_TIMEOUT,
            drop_warning_interval: DEFAULT_DROP_WARNING_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FailureConfig {
    pub threshold: u32,
    pub probe_interval: u32,
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_FAILURE_THRESHOLD,
            probe_interval: DEFAULT_PROBE_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SinkTimeouts {
    /// Bound on every single sink write.
    pub write: Duration,
    /// Bound on closing each sink during shutdown.
    pub close: Duration,
}

impl Default for SinkTimeouts {
    fn default() -> Self {
        Self {
            write: DEFAULT_SINK_TIMEOUT,
            close: DEFAULT_SINK_TIMEOUT,
        }
    }
}

impl RelayConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.queue.max_size == 0 {
            return Err(RelayError::InvalidConfig(
                "queue max_size must be greater than 0".to_string(),
            ));
        }

        if self.queue.put_timeout.is_zero() || self.queue.get_timeout.is_zero() {
            return Err(RelayError::InvalidConfig(
                "queue put/get timeouts must be greater than 0".to_string(),
            ));
        }

        if self.failure.threshold == 0 || self.failure.probe_interval == 0 {
            return Err(RelayError::InvalidConfig(
                "failure threshold and probe interval must be greater than 0".to_string(),
            ));
        }

        if self.sinks.write.is_zero() || self.sinks.close.is_zero() {
            return Err(RelayError::InvalidConfig(
                "sink timeouts must be greater than 0".to_string(),
            ));
        }

        if self.remote.enabled && self.remote.endpoint.trim().is_empty() {
            return Err(RelayError::InvalidConfig(
                "remote endpoint cannot be empty when the remote aggregator is enabled"
                    .to_string(),
            ));
        }

        if self.metrics.enabled {
            if self.metrics.url.trim().is_empty() || self.metrics.bucket.trim().is_empty() {
                return Err(RelayError::InvalidConfig(
                    "metrics url and bucket cannot be empty when metrics are enabled".to_string(),
                ));
            }
        }

        Ok(())
    }
}
