// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Batcher errors.

use thiserror::Error;

/// Errors surfaced to callers of the batching engine.
///
/// Runtime anomalies (stale timers, empty flushes, failing subscribers) are
/// logged and counted instead; only malformed input and invalid limits are
/// reported here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BatcherError {
    #[error("source key must not be empty")]
    EmptyKey,

    #[error("invalid batcher configuration: {0}")]
    InvalidConfig(String),
}
