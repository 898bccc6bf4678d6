// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared HTTP client construction for the network sinks.

use std::time::Duration;

use tracing::error;

/// Builds a client for a network sink, falling back to reqwest defaults if
/// the configured builder fails.
///
/// `timeout` bounds each request; the dispatcher applies its own per-write
/// timeout on top.
#[must_use]
pub fn get_client(timeout: Duration) -> reqwest::Client {
    match build_client(timeout) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build HTTP client: {}, using reqwest defaults", e);
            reqwest::Client::new()
        }
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        // Detect dead connections to a restarted aggregator
        .tcp_keepalive(Some(Duration::from_secs(120)))
        .build()
}
