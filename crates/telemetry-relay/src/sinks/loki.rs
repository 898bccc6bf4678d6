// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Remote aggregator sink speaking the Loki push API.
//!
//! Each entry becomes one stream with a single value:
//!
//! ```json
//! {"streams":[{"stream":{"job":"tower_hooker_unified","source":"th_frida",...},
//!              "values":[["1700000000123000000","attached pid=4312"]]}]}
//! ```
//!
//! Labels are the configured defaults, the entry's source, level and logger
//! name, plus a short allow-list of fields. Label values are truncated to keep
//! stream cardinality in check; every other field is appended to the line.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::RemoteConfig;
use crate::entry::{display_value, epoch_millis, LogEntry, LogLevel};
use crate::error::SinkError;
use crate::http::get_client;
use crate::sinks::Sink;

/// Fields promoted to stream labels when present.
pub const LABEL_FIELDS: [&str; 6] = ["device", "tag", "priority", "round_id", "phase", "component"];

pub const MAX_LABEL_LEN: usize = 100;

const DEFAULT_JOB: &str = "tower_hooker";
const PROBE_LOGGER: &str = "recovery_test";

#[derive(Serialize)]
struct PushRequest<'a> {
    streams: [Stream<'a>; 1],
}

#[derive(Serialize)]
struct Stream<'a> {
    stream: &'a BTreeMap<String, String>,
    values: [[String; 2]; 1],
}

#[derive(Debug, Clone)]
pub struct LokiSink {
    client: reqwest::Client,
    endpoint: String,
    default_labels: BTreeMap<String, String>,
}

impl LokiSink {
    #[must_use]
    pub fn new(config: &RemoteConfig, timeout: Duration) -> Self {
        Self::with_client(config, get_client(timeout))
    }

    #[must_use]
    pub fn with_client(config: &RemoteConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            default_labels: config.default_labels.clone(),
        }
    }

    #[must_use]
    pub fn labels(&self, entry: &LogEntry) -> BTreeMap<String, String> {
        let mut labels = self.base_labels(entry.level(), entry.source().as_str());
        for field in LABEL_FIELDS {
            match entry.fields().get(field) {
                None | Some(Value::Null) => {}
                Some(value) => {
                    labels.insert(field.to_string(), truncate(&display_value(value)));
                }
            }
        }
        labels
    }

    fn base_labels(&self, level: LogLevel, logger: &str) -> BTreeMap<String, String> {
        let mut labels = self.default_labels.clone();
        labels.insert("source".to_string(), truncate(logger));
        labels.insert("level".to_string(), level.as_str().to_string());
        labels.insert("logger".to_string(), truncate(logger));
        labels
            .entry("job".to_string())
            .or_insert_with(|| DEFAULT_JOB.to_string());
        labels
    }

    async fn push(
        &self,
        labels: &BTreeMap<String, String>,
        timestamp_millis: u64,
        line: String,
    ) -> Result<(), SinkError> {
        let nanos = u128::from(timestamp_millis) * 1_000_000;
        let body = PushRequest {
            streams: [Stream {
                stream: labels,
                values: [[nanos.to_string(), line]],
            }],
        };
        let resp = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        debug!("Loki push rejected with status {}: {}", status, body);
        Err(SinkError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// The entry message followed by every non-label field as `key=value`.
#[must_use]
pub fn format_line(entry: &LogEntry) -> String {
    let mut line = entry.message().to_string();
    for (key, value) in entry.fields() {
        if LABEL_FIELDS.contains(&key.as_str()) {
            continue;
        }
        let _ = write!(line, " {key}={}", display_value(value));
    }
    line
}

fn truncate(value: &str) -> String {
    value.chars().take(MAX_LABEL_LEN).collect()
}

#[async_trait]
impl Sink for LokiSink {
    fn name(&self) -> &'static str {
        "loki"
    }

    async fn emit(&mut self, entry: &LogEntry) -> Result<(), SinkError> {
        let labels = self.labels(entry);
        self.push(&labels, entry.timestamp_millis(), format_line(entry))
            .await
    }

    async fn probe(&mut self) -> Result<(), SinkError> {
        let labels = self.base_labels(LogLevel::Info, PROBE_LOGGER);
        self.push(&labels, epoch_millis(), "Loki recovery test".to_string())
            .await
    }
}
