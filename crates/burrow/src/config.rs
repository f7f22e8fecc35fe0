// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Batcher configuration

use crate::error::BatcherError;
use std::time::Duration;

/// Default number of records per batch.
pub const DEFAULT_SIZE_LIMIT: usize = 5;

/// Default time a non-empty batch may wait before it is flushed.
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(15);

/// Flush limits shared by every source key of a batcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatcherConfig {
    /// Maximum records per batch before a size-triggered flush.
    pub size_limit: usize,

    /// Maximum wall-clock time between the first record of a batch and its flush.
    pub time_limit: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            size_limit: DEFAULT_SIZE_LIMIT,
            time_limit: DEFAULT_TIME_LIMIT,
        }
    }
}

impl BatcherConfig {
    /// Create a new config builder
    pub fn builder() -> BatcherConfigBuilder {
        BatcherConfigBuilder::default()
    }

    /// Check that both limits are positive.
    pub fn validate(&self) -> Result<(), BatcherError> {
        if self.size_limit == 0 {
            return Err(BatcherError::InvalidConfig(
                "size_limit must be at least 1".into(),
            ));
        }
        if self.time_limit.is_zero() {
            return Err(BatcherError::InvalidConfig(
                "time_limit must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Config builder for fluent API
#[derive(Debug, Default)]
pub struct BatcherConfigBuilder {
    size_limit: Option<usize>,
    time_limit: Option<Duration>,
}

impl BatcherConfigBuilder {
    /// Set the size limit (records per batch)
    pub fn size_limit(mut self, limit: usize) -> Self {
        self.size_limit = Some(limit);
        self
    }

    /// Set the time limit
    pub fn time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Build the configuration, falling back to defaults for unset limits
    pub fn build(self) -> BatcherConfig {
        let defaults = BatcherConfig::default();

        BatcherConfig {
            size_limit: self.size_limit.unwrap_or(defaults.size_limit),
            time_limit: self.time_limit.unwrap_or(defaults.time_limit),
        }
    }
}
