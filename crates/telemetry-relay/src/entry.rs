// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The immutable log entry flowing through the relay, and its closed
//! source/level vocabularies.
//!
//! Every producer call creates exactly one [`LogEntry`]. The entry is moved
//! into the queue, dispatched once by the consumer and then dropped; nothing
//! in the relay mutates it after construction.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{macros::format_description, OffsetDateTime};

/// Open structured attributes attached to an entry.
pub type Fields = serde_json::Map<String, Value>;

/// Field naming the time-series measurement of a metric-bearing entry.
pub const MEASUREMENT_KEY: &str = "measurement";

/// Field holding the numeric values of a metric-bearing entry.
pub const METRIC_FIELDS_KEY: &str = "metric_fields";

/// Optional field holding metric tags.
pub const METRIC_TAGS_KEY: &str = "tags";

/// Subsystem that produced an entry.
///
/// The serialized names are the wire values used as the `source` label and as
/// the logger name, so they must stay stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogSource {
    #[serde(rename = "th_main_app")]
    MainApp,
    #[serde(rename = "th_frida")]
    Frida,
    #[serde(rename = "th_bluestacks")]
    Bluestacks,
    #[serde(rename = "th_emulator")]
    Emulator,
    #[serde(rename = "th_pslist")]
    Pslist,
    #[serde(rename = "th_logcat")]
    Logcat,
    #[serde(rename = "th_database")]
    Database,
    #[serde(rename = "th_system")]
    System,
    #[serde(rename = "th_fallback_system")]
    FallbackSystem,
}

impl LogSource {
    pub const ALL: [LogSource; 9] = [
        LogSource::MainApp,
        LogSource::Frida,
        LogSource::Bluestacks,
        LogSource::Emulator,
        LogSource::Pslist,
        LogSource::Logcat,
        LogSource::Database,
        LogSource::System,
        LogSource::FallbackSystem,
    ];

    /// Wire name, e.g. `th_pslist`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LogSource::MainApp => "th_main_app",
            LogSource::Frida => "th_frida",
            LogSource::Bluestacks => "th_bluestacks",
            LogSource::Emulator => "th_emulator",
            LogSource::Pslist => "th_pslist",
            LogSource::Logcat => "th_logcat",
            LogSource::Database => "th_database",
            LogSource::System => "th_system",
            LogSource::FallbackSystem => "th_fallback_system",
        }
    }

    /// Member name, e.g. `PSLIST`. Configuration maps are keyed by this name.
    #[must_use]
    pub fn member_name(self) -> &'static str {
        match self {
            LogSource::MainApp => "MAIN_APP",
            LogSource::Frida => "FRIDA",
            LogSource::Bluestacks => "BLUESTACKS",
            LogSource::Emulator => "EMULATOR",
            LogSource::Pslist => "PSLIST",
            LogSource::Logcat => "LOGCAT",
            LogSource::Database => "DATABASE",
            LogSource::System => "SYSTEM",
            LogSource::FallbackSystem => "FALLBACK_SYSTEM",
        }
    }
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts either the member name or the wire name, case-insensitively.
impl FromStr for LogSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        LogSource::ALL
            .into_iter()
            .find(|source| {
                source.member_name().eq_ignore_ascii_case(wanted)
                    || source.as_str().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| format!("unknown log source '{s}'"))
    }
}

/// Severity, totally ordered from `Debug` to `Critical`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    /// Warnings and above are operational failures and are never hidden by
    /// console configuration.
    #[must_use]
    pub fn is_severe(self) -> bool {
        self >= LogLevel::Warning
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            _ => Err(format!(
                "invalid log level '{s}', expected one of DEBUG, INFO, WARNING, ERROR, CRITICAL"
            )),
        }
    }
}

/// A single immutable log record.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    source: LogSource,
    level: LogLevel,
    message: String,
    fields: Fields,
    timestamp_millis: u64,
}

/// Borrowed view of the metric carried by an entry.
#[derive(Debug, Clone, Copy)]
pub struct MetricPoint<'a> {
    pub measurement: &'a str,
    pub fields: &'a Fields,
    pub tags: Option<&'a Fields>,
    pub timestamp_millis: u64,
}

impl LogEntry {
    /// Creates an entry stamped with the current wall-clock time.
    pub fn new(source: LogSource, level: LogLevel, message: impl Into<String>, fields: Fields) -> Self {
        Self::with_timestamp(source, level, message, fields, epoch_millis())
    }

    pub fn with_timestamp(
        source: LogSource,
        level: LogLevel,
        message: impl Into<String>,
        fields: Fields,
        timestamp_millis: u64,
    ) -> Self {
        Self {
            source,
            level,
            message: message.into(),
            fields,
            timestamp_millis,
        }
    }

    #[must_use]
    pub fn source(&self) -> LogSource {
        self.source
    }

    #[must_use]
    pub fn level(&self) -> LogLevel {
        self.level
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    #[must_use]
    pub fn timestamp_millis(&self) -> u64 {
        self.timestamp_millis
    }

    /// Returns the metric point when the entry carries both a string
    /// `measurement` and a non-empty `metric_fields` map.
    #[must_use]
    pub fn metric(&self) -> Option<MetricPoint<'_>> {
        let measurement = self.fields.get(MEASUREMENT_KEY)?.as_str()?;
        let fields = self.fields.get(METRIC_FIELDS_KEY)?.as_object()?;
        if measurement.is_empty() || fields.is_empty() {
            return None;
        }
        Some(MetricPoint {
            measurement,
            fields,
            tags: self.fields.get(METRIC_TAGS_KEY).and_then(Value::as_object),
            timestamp_millis: self.timestamp_millis,
        })
    }

    /// Serializes the entry as one JSON object: every field, then `level`,
    /// `logger`, `message` and `timestamp_millis`, which win on collision.
    pub fn to_json_line(&self, logger: &str) -> serde_json::Result<String> {
        let mut object = self.fields.clone();
        object.insert("level".to_string(), Value::from(self.level.as_str()));
        object.insert("logger".to_string(), Value::from(logger));
        object.insert("message".to_string(), Value::from(self.message.as_str()));
        object.insert(
            "timestamp_millis".to_string(),
            Value::from(self.timestamp_millis),
        );
        serde_json::to_string(&object)
    }
}

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Formats epoch milliseconds as `YYYY-MM-DD HH:MM:SS.mmm UTC`.
#[must_use]
pub fn human_timestamp(epoch_millis: u64) -> String {
    let nanos = i128::from(epoch_millis) * 1_000_000;
    let format =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|dt| dt.format(&format).ok())
        .map_or_else(|| epoch_millis.to_string(), |s| format!("{s} UTC"))
}

/// Renders a field value for text outputs: strings unquoted, everything else
/// as compact JSON.
#[must_use]
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Builds a [`Fields`] map from `"key" => value` pairs.
///
/// ```
/// use telemetry_relay::fields;
///
/// let fields = fields! { "device" => "emulator-5554", "pid" => 4312 };
/// assert_eq!(fields["pid"], 4312);
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        $crate::Fields::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::Fields::new();
        $(
            map.insert(::std::string::String::from($key), $crate::__private::serde_json::json!($value));
        )+
        map
    }};
}
