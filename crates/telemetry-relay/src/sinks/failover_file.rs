// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::RotatingFileConfig;
use crate::entry::LogEntry;
use crate::error::SinkError;
use crate::rotating_file::RotatingFile;
use crate::sinks::{run_blocking, Sink};

/// Suffix of the logger name on failover copies.
pub const FAILOVER_SUFFIX: &str = ".failover";

/// Local JSON-lines copy of entries the remote aggregator did not take.
///
/// Writes run on the blocking pool so the dispatcher's per-write timeout can
/// abandon a wedged disk.
#[derive(Debug, Clone)]
pub struct FailoverFileSink {
    path: PathBuf,
    file: Arc<Mutex<RotatingFile>>,
}

impl FailoverFileSink {
    /// Returns `Ok(None)` when no path is configured.
    pub fn from_config(config: &RotatingFileConfig) -> Result<Option<Self>, SinkError> {
        Ok(RotatingFile::from_config(config)?.map(|file| Self {
            path: file.path().to_path_buf(),
            file: Arc::new(Mutex::new(file)),
        }))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[must_use]
pub fn logger_name(entry: &LogEntry) -> String {
    format!("{}{FAILOVER_SUFFIX}", entry.source())
}

#[async_trait]
impl Sink for FailoverFileSink {
    fn name(&self) -> &'static str {
        "failover_file"
    }

    async fn emit(&mut self, entry: &LogEntry) -> Result<(), SinkError> {
        let line = entry.to_json_line(&logger_name(entry))?;
        run_blocking(&self.file, "failover file", move |file| {
            file.write_line(&line)?;
            file.flush()
        })
        .await
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        run_blocking(&self.file, "failover file", RotatingFile::close).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Fields, LogLevel, LogSource};
    use crate::fields;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_round_trip_preserves_fields() {
        let dir = tempfile::tempdir().unwrap();
        let config = RotatingFileConfig {
            path: Some(dir.path().join("loki_failover.log")),
            ..RotatingFileConfig::default()
        };
        let mut sink = FailoverFileSink::from_config(&config).unwrap().unwrap();

        let fields = fields! {
            "device" => "emulator-5554",
            "ratio" => 0.1,
            "big" => 9_007_199_254_740_993_u64,
            "nested" => json!({"a": [1, "two", null]}),
            "unicode" => "héllo ✓",
        };
        let entry = LogEntry::new(LogSource::Frida, LogLevel::Error, "attach failed", fields.clone());
        sink.emit(&entry).await.unwrap();
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let mut record: Fields = serde_json::from_str(content.trim_end()).unwrap();
        assert_eq!(record.remove("level"), Some(json!("ERROR")));
        assert_eq!(record.remove("message"), Some(json!("attach failed")));
        assert_eq!(record.remove("logger"), Some(json!("th_frida.failover")));
        assert_eq!(
            record.remove("timestamp_millis"),
            Some(Value::from(entry.timestamp_millis()))
        );
        assert_eq!(record, fields);
    }

    #[tokio::test]
    async fn test_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let config = RotatingFileConfig {
            path: Some(dir.path().join("failover.log")),
            ..RotatingFileConfig::default()
        };
        let mut sink = FailoverFileSink::from_config(&config).unwrap().unwrap();
        for i in 0..3 {
            let entry = LogEntry::new(LogSource::System, LogLevel::Info, format!("m{i}\nsplit"), Fields::new());
            sink.emit(&entry).await.unwrap();
        }
        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_disabled_without_path() {
        assert!(FailoverFileSink::from_config(&RotatingFileConfig::default())
            .unwrap()
            .is_none());
    }
}
