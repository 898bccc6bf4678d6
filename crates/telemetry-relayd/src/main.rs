// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use telemetry_relay::{global, logger::Formatter, Pipeline};

mod config;
mod event;

#[tokio::main]
pub async fn main() {
    let config = config::DaemonConfig::from_env();
    let log_level = config
        .as_ref()
        .map_or("info", |config| config.log_level.as_str());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");

    let filter = match EnvFilter::try_new(env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("could not parse RELAY_LOG_LEVEL: {e}");
            EnvFilter::new("info")
        }
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .event_format(Formatter)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
    }

    debug!("Logging subsystem enabled");

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Error reading relay configuration: {e}");
            return;
        }
    };

    let pipeline = match Pipeline::builder(config.relay.clone()).build() {
        Ok(pipeline) => Arc::new(pipeline),
        Err(e) => {
            error!("Error building relay: {e}");
            return;
        }
    };
    if let Err(e) = pipeline.start() {
        error!("Error starting relay: {e}");
        return;
    }
    if global::install(Arc::clone(&pipeline)).is_err() {
        warn!("A relay was already installed globally");
    }

    relay_stdin(&pipeline).await;

    match pipeline.shutdown(config.shutdown_timeout).await {
        Ok(report) => info!(
            "Relay stopped: drained={} abandoned={} failed_closes={:?}",
            report.drained, report.abandoned, report.sinks_failed_close
        ),
        Err(e) => error!("Error shutting down relay: {e}"),
    }
    match serde_json::to_string(&pipeline.stats()) {
        Ok(stats) => info!("Final relay stats: {stats}"),
        Err(e) => debug!("Unable to serialize relay stats: {e}"),
    }
}

/// Forwards stdin events until EOF or Ctrl-C.
async fn relay_stdin(pipeline: &Pipeline) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no: u64 = 0;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        let line = tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, shutting down relay");
                return;
            }
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Input closed after {line_no} lines");
                return;
            }
            Err(e) => {
                error!("Error reading stdin: {e}");
                return;
            }
        };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match event::parse_line(&line) {
            Ok(event) => {
                pipeline
                    .log(event.source, event.level, event.message, event.fields)
                    .await;
            }
            Err(e) => {
                let span = tracing::debug_span!("stdin", line = line_no);
                let _guard = span.enter();
                warn!("Skipping malformed event: {e}");
            }
        }
    }
}
