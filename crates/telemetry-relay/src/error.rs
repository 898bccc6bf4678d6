// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Errors surfaced by the relay lifecycle and configuration.
///
/// Producer calls never return these; they are reported by `build`, `start`
/// and `shutdown` only.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No tokio runtime is available to run the relay consumer")]
    NoRuntime,

    #[error("Relay already started")]
    AlreadyStarted,

    #[error("Relay already shut down")]
    AlreadyShutdown,

    #[error("Shutdown timeout of {0:?} exceeded")]
    ShutdownTimeout(Duration),
}

/// Errors raised by a single sink while dispatching or closing.
///
/// These never leave the consumer loop; they are reported through the
/// fallback logger and feed the remote sink's failure tracker.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Sink closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}
