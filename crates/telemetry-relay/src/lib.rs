// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Telemetry Relay
//!
//! A best-effort, non-blocking log and telemetry relay. Producers on any
//! thread hand structured entries to a [`Pipeline`]; a single consumer task
//! fans them out to the operator console, a Loki aggregator, an InfluxDB
//! metrics store, a local failover file and an optional UI feed.
//!
//! Producer calls never block on sink I/O and never fail. Entries can be
//! lost to sampling or to a full queue; both are counted.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use telemetry_relay::{fields, LogSource, Pipeline, RelayConfig};
//!
//! # async fn run() -> Result<(), telemetry_relay::RelayError> {
//! let pipeline = Pipeline::builder(RelayConfig::default()).build()?;
//! pipeline.start()?;
//! pipeline.log_info(LogSource::Frida, "attached", fields! { "pid" => 4312 });
//! pipeline.shutdown(Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![deny(unused_extern_crates)]

pub mod config;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod failure_tracker;
pub mod fallback;
pub mod filter;
pub mod frequency;
pub mod global;
pub mod http;
pub mod logger;
pub mod pipeline;
pub mod queue;
pub mod rotating_file;
pub mod sinks;

pub use config::RelayConfig;
pub use entry::{Fields, LogEntry, LogLevel, LogSource};
pub use error::{RelayError, SinkError};
pub use fallback::FallbackLogger;
pub use pipeline::{Pipeline, PipelineBuilder, PipelineStats, ShutdownReport};
pub use sinks::{Sink, UiFeed};

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}
