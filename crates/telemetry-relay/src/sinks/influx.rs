// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Metrics store sink writing InfluxDB v2 line protocol.
//!
//! Only entries carrying a metric (see [`LogEntry::metric`]) reach this sink.
//! Each becomes one point:
//!
//! ```text
//! round_stats,tier=3 wave=42i,coins=1.5 1700000000123000000
//! ```

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use crate::config::MetricsConfig;
use crate::entry::{display_value, LogEntry, MetricPoint};
use crate::error::SinkError;
use crate::http::get_client;
use crate::sinks::Sink;

#[derive(Debug, Clone)]
pub struct InfluxSink {
    client: reqwest::Client,
    write_url: String,
    org: String,
    bucket: String,
    token: Option<String>,
}

impl InfluxSink {
    #[must_use]
    pub fn new(config: &MetricsConfig, timeout: Duration) -> Self {
        Self {
            client: get_client(timeout),
            write_url: format!("{}/api/v2/write", config.url.trim_end_matches('/')),
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            token: config.token.clone(),
        }
    }

    async fn write(&self, body: String) -> Result<(), SinkError> {
        let mut request = self
            .client
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Token {token}"));
        }
        let resp = request.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        Err(SinkError::Rejected {
            status: status.as_u16(),
            body: resp.text().await.unwrap_or_default(),
        })
    }
}

/// Renders one line-protocol point, or an error when no field value is
/// representable.
pub fn line_protocol(point: &MetricPoint<'_>) -> Result<String, SinkError> {
    let mut line = escape(point.measurement, &[',', ' ']);

    if let Some(tags) = point.tags {
        for (key, value) in tags {
            let value = display_value(value);
            if key.is_empty() || value.is_empty() {
                continue;
            }
            let _ = write!(
                line,
                ",{}={}",
                escape(key, &[',', '=', ' ']),
                escape(&value, &[',', '=', ' '])
            );
        }
    }

    let fields: Vec<String> = point
        .fields
        .iter()
        .filter_map(|(key, value)| {
            field_value(value).map(|v| format!("{}={v}", escape(key, &[',', '=', ' '])))
        })
        .collect();
    if fields.is_empty() {
        return Err(SinkError::Other(format!(
            "measurement '{}' has no writable fields",
            point.measurement
        )));
    }

    let nanos = u128::from(point.timestamp_millis) * 1_000_000;
    let _ = write!(line, " {} {nanos}", fields.join(","));
    Ok(line)
}

fn field_value(value: &Value) -> Option<String> {
    match value {
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(format!("{i}i"))
            } else {
                n.as_f64().filter(|f| f.is_finite()).map(|f| f.to_string())
            }
        }
        Value::String(s) => Some(format!("\"{}\"", escape(s, &['"', '\\']))),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl Sink for InfluxSink {
    fn name(&self) -> &'static str {
        "influxdb"
    }

    async fn emit(&mut self, entry: &LogEntry) -> Result<(), SinkError> {
        let Some(point) = entry.metric() else {
            return Ok(());
        };
        let line = line_protocol(&point)?;
        self.write(line).await
    }
}
