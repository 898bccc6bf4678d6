// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Weak};

use async_trait::async_trait;

use crate::entry::LogEntry;
use crate::error::SinkError;
use crate::sinks::{Sink, UiFeed};

/// Forwards entries to an attached UI without keeping it alive.
///
/// Once the UI is dropped every emit returns [`SinkError::Closed`], which the
/// dispatcher treats as a silent skip.
#[derive(Clone)]
pub struct UiSink {
    feed: Weak<dyn UiFeed>,
}

impl UiSink {
    #[must_use]
    pub fn new(feed: &Arc<dyn UiFeed>) -> Self {
        Self {
            feed: Arc::downgrade(feed),
        }
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.feed.strong_count() > 0
    }
}

#[async_trait]
impl Sink for UiSink {
    fn name(&self) -> &'static str {
        "ui"
    }

    async fn emit(&mut self, entry: &LogEntry) -> Result<(), SinkError> {
        let feed = self.feed.upgrade().ok_or(SinkError::Closed)?;
        feed.accept(entry.level(), entry.source(), entry.message());
        Ok(())
    }
}
