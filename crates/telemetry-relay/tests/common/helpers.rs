// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use telemetry_relay::config::RotatingFileConfig;
use telemetry_relay::{FallbackLogger, RelayConfig};

/// In-memory writer shared between a sink or logger and the test.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Writer that blocks the calling thread on every write and flush, like a
/// terminal nobody is reading.
pub struct StalledWriter(pub Duration);

impl Write for StalledWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::thread::sleep(self.0);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::thread::sleep(self.0);
        Ok(())
    }
}

/// Relay configuration with the stdout console disabled.
pub fn quiet_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.console.enabled = false;
    config
}

/// A fallback logger writing to memory only.
pub fn buffered_fallback() -> (Arc<FallbackLogger>, SharedBuffer) {
    let buffer = SharedBuffer::default();
    let logger = FallbackLogger::with_writer(&RotatingFileConfig::default(), Box::new(buffer.clone()));
    (Arc::new(logger), buffer)
}
