// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Synchronous emergency logger.
//!
//! Used before the pipeline starts, for entries the pipeline refuses, and by
//! every component of the relay to report its own failures. It never touches
//! the queue or the sinks, so reporting a sink failure cannot loop back into
//! the pipeline.
//!
//! Output goes to stderr as
//! `EMERGENCY_LOG_FALLBACK: [<millis>] <LEVEL> - <message> (k=v, ...)` and,
//! when configured, as JSON lines to a rotating emergency file. Nothing here
//! panics: if writing fails the logger degrades to a bare
//! `CRITICAL_FALLBACK_FAILURE` line on stderr.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::Mutex;

use crate::config::RotatingFileConfig;
use crate::entry::{display_value, epoch_millis, Fields, LogEntry, LogLevel, LogSource};
use crate::rotating_file::RotatingFile;

/// Logger name written in emergency file records.
pub const FALLBACK_LOGGER_NAME: &str = "fallback";

type Writer = Box<dyn Write + Send>;

pub struct FallbackLogger {
    stderr: Mutex<Writer>,
    file: Mutex<Option<RotatingFile>>,
}

impl std::fmt::Debug for FallbackLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackLogger").finish_non_exhaustive()
    }
}

impl Default for FallbackLogger {
    fn default() -> Self {
        Self::with_writer(&RotatingFileConfig::default(), Box::new(io::stderr()))
    }
}

impl FallbackLogger {
    /// Creates a logger writing to stderr and, if `config.path` is set, to a
    /// rotating emergency file.
    #[must_use]
    pub fn new(config: &RotatingFileConfig) -> Self {
        Self::with_writer(config, Box::new(io::stderr()))
    }

    /// Same as [`FallbackLogger::new`] with a custom stream in place of stderr.
    #[must_use]
    pub fn with_writer(config: &RotatingFileConfig, stderr: Writer) -> Self {
        let logger = Self {
            stderr: Mutex::new(stderr),
            file: Mutex::new(None),
        };
        match RotatingFile::from_config(config) {
            Ok(file) => {
                if let Ok(mut slot) = logger.file.lock() {
                    *slot = file;
                }
            }
            Err(e) => logger.ultimate_failure("Failed to open emergency log file", &e),
        }
        logger
    }

    pub fn log(&self, level: LogLevel, message: &str, fields: &Fields) {
        let entry = LogEntry::new(LogSource::FallbackSystem, level, message, fields.clone());
        self.write(&entry, None);
    }

    pub fn debug(&self, message: &str, fields: &Fields) {
        self.log(LogLevel::Debug, message, fields);
    }

    pub fn info(&self, message: &str, fields: &Fields) {
        self.log(LogLevel::Info, message, fields);
    }

    pub fn warning(&self, message: &str, fields: &Fields) {
        self.log(LogLevel::Warning, message, fields);
    }

    pub fn error(&self, message: &str, fields: &Fields) {
        self.log(LogLevel::Error, message, fields);
    }

    pub fn critical(&self, message: &str, fields: &Fields) {
        self.log(LogLevel::Critical, message, fields);
    }

    /// Records a producer entry that could not go through the pipeline,
    /// keeping its original timestamp and adding its source.
    pub fn record(&self, entry: &LogEntry) {
        self.write(entry, Some(entry.source()));
    }

    /// Flushes and closes the emergency file. Later calls still reach stderr
    /// and reopen the file on demand.
    pub fn close(&self) {
        let result = match self.file.lock() {
            Ok(mut file) => file.as_mut().map_or(Ok(()), RotatingFile::close),
            Err(_) => Ok(()),
        };
        if let Err(e) = result {
            self.ultimate_failure("Failed to close emergency log file", &e);
        }
    }

    fn write(&self, entry: &LogEntry, source: Option<LogSource>) {
        let mut line = format!(
            "EMERGENCY_LOG_FALLBACK: [{}] {} - {}",
            entry.timestamp_millis(),
            entry.level(),
            entry.message()
        );
        let mut pairs = Vec::with_capacity(entry.fields().len() + 1);
        if let Some(source) = source {
            pairs.push(format!("source={source}"));
        }
        pairs.extend(
            entry
                .fields()
                .iter()
                .map(|(k, v)| format!("{k}={}", display_value(v))),
        );
        if !pairs.is_empty() {
            let _ = write!(line, " ({})", pairs.join(", "));
        }

        if let Err(e) = self.write_stderr(&line) {
            self.ultimate_failure(entry.message(), &e);
        }
        if let Err(e) = self.write_file(entry, source) {
            self.ultimate_failure(entry.message(), &e);
        }
    }

    fn write_stderr(&self, line: &str) -> io::Result<()> {
        let mut stderr = self
            .stderr
            .lock()
            .map_err(|_| io::Error::other("fallback stream lock poisoned"))?;
        writeln!(stderr, "{line}")?;
        stderr.flush()
    }

    fn write_file(&self, entry: &LogEntry, source: Option<LogSource>) -> io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("emergency file lock poisoned"))?;
        let Some(file) = file.as_mut() else {
            return Ok(());
        };
        let json = match source {
            Some(source) if !entry.fields().contains_key("source") => {
                let mut fields = entry.fields().clone();
                fields.insert("source".to_string(), source.as_str().into());
                LogEntry::with_timestamp(
                    entry.source(),
                    entry.level(),
                    entry.message(),
                    fields,
                    entry.timestamp_millis(),
                )
                .to_json_line(FALLBACK_LOGGER_NAME)
            }
            _ => entry.to_json_line(FALLBACK_LOGGER_NAME),
        }?;
        file.write_line(&json)?;
        file.flush()
    }

    /// Last resort: a bare line on the real stderr, ignoring any error.
    fn ultimate_failure(&self, message: &str, error: &dyn std::fmt::Display) {
        let _ = writeln!(
            io::stderr(),
            "CRITICAL_FALLBACK_FAILURE: [{}] {message} - Error: {error}",
            epoch_millis()
        );
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fields;
    use serde_json::Value;
    use std::sync::Arc;

    /// Clonable in-memory stream for asserting on fallback output.
    #[derive(Clone, Default)]
    pub(crate) struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    pub(crate) fn buffered_logger() -> (FallbackLogger, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let logger =
            FallbackLogger::with_writer(&RotatingFileConfig::default(), Box::new(buffer.clone()));
        (logger, buffer)
    }

    #[test]
    fn test_stderr_format() {
        let (logger, buffer) = buffered_logger();
        logger.error("Remote push failed", &fields! { "status" => 503 });
        logger.info("plain", &Fields::new());

        let output = buffer.contents();
        let mut lines = output.lines();
        let first = lines.next().unwrap();
        assert!(first.starts_with("EMERGENCY_LOG_FALLBACK: ["));
        assert!(first.ends_with("] ERROR - Remote push failed (status=503)"));
        let second = lines.next().unwrap();
        assert!(second.ends_with("] INFO - plain"));
    }

    #[test]
    fn test_record_keeps_entry_timestamp_and_source() {
        let (logger, buffer) = buffered_logger();
        let entry = LogEntry::with_timestamp(
            LogSource::Pslist,
            LogLevel::Info,
            "early",
            fields! { "count" => 3 },
            42,
        );
        logger.record(&entry);
        assert_eq!(
            buffer.contents(),
            "EMERGENCY_LOG_FALLBACK: [42] INFO - early (source=th_pslist, count=3)\n"
        );
    }

    #[test]
    fn test_emergency_file_receives_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emergency.log");
        let config = RotatingFileConfig {
            path: Some(path.clone()),
            ..RotatingFileConfig::default()
        };
        let buffer = SharedBuffer::default();
        let logger = FallbackLogger::with_writer(&config, Box::new(buffer.clone()));
        logger.critical("disk full", &fields! { "device" => "emulator-5554" });
        logger.close();

        let content = std::fs::read_to_string(&path).unwrap();
        let record: Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(record["level"], "CRITICAL");
        assert_eq!(record["logger"], FALLBACK_LOGGER_NAME);
        assert_eq!(record["message"], "disk full");
        assert_eq!(record["device"], "emulator-5554");
        assert!(record["timestamp_millis"].is_u64());
    }

    #[test]
    fn test_unwritable_file_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a file
        let config = RotatingFileConfig {
            path: Some(dir.path().to_path_buf()),
            ..RotatingFileConfig::default()
        };
        let buffer = SharedBuffer::default();
        let logger = FallbackLogger::with_writer(&config, Box::new(buffer.clone()));
        logger.warning("still visible", &Fields::new());
        logger.close();
        assert!(buffer.contents().contains("WARNING - still visible"));
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn test_broken_stream_does_not_panic() {
        let logger = FallbackLogger::with_writer(&RotatingFileConfig::default(), Box::new(BrokenPipe));
        logger.critical("nobody is listening", &Fields::new());
    }
}
