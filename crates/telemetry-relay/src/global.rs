// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process-wide accessor for code that cannot be handed a [`Pipeline`].
//!
//! Install once from the process entry point. Library code should take an
//! `Arc<Pipeline>` instead.

use std::sync::{Arc, OnceLock};

use crate::pipeline::Pipeline;

static PIPELINE: OnceLock<Arc<Pipeline>> = OnceLock::new();

/// Installs `pipeline`. Fails, returning it, if one is already installed.
pub fn install(pipeline: Arc<Pipeline>) -> Result<(), Arc<Pipeline>> {
    PIPELINE.set(pipeline)
}

#[must_use]
pub fn get() -> Option<&'static Arc<Pipeline>> {
    PIPELINE.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;

    #[test]
    fn test_install_once() {
        let mut config = RelayConfig::default();
        config.console.enabled = false;
        let first = Arc::new(Pipeline::builder(config.clone()).build().unwrap());
        let second = Arc::new(Pipeline::builder(config).build().unwrap());

        assert!(install(Arc::clone(&first)).is_ok());
        assert!(install(second).is_err());
        assert!(Arc::ptr_eq(get().unwrap(), &first));
    }
}
