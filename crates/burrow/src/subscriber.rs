// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Batch subscribers and isolated delivery.
//!
//! A flushed batch is broadcast to every registered subscriber, in
//! registration order, on the thread that triggered the flush. Each call is
//! isolated: an error return or a panic is logged and counted, and the next
//! subscriber still receives the batch.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Error type returned by subscribers.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Downstream consumer of completed batches.
///
/// # Thread Safety
///
/// Called from producer threads (size-triggered flush) and from deadline
/// threads (time-triggered flush), possibly for different keys at the same
/// time. The calling thread is blocked until the call returns, so a slow
/// subscriber throttles ingestion for that key.
pub trait BatchSubscriber<P>: Send + Sync {
    /// Handle a batch flushed for `key`.
    ///
    /// `sender` is the name of the batcher that emitted the batch.
    fn on_batch_ready(&self, sender: &str, key: &str, batch: &[P]) -> Result<(), SubscriberError>;

    /// Name used in log messages.
    fn name(&self) -> &str {
        "subscriber"
    }
}

/// Subscriber backed by a closure.
pub struct FnSubscriber<F> {
    name: String,
    f: F,
}

impl<F> FnSubscriber<F> {
    /// Wrap a closure under the given log name.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<P, F> BatchSubscriber<P> for FnSubscriber<F>
where
    F: Fn(&str, &str, &[P]) -> Result<(), SubscriberError> + Send + Sync,
{
    fn on_batch_ready(&self, sender: &str, key: &str, batch: &[P]) -> Result<(), SubscriberError> {
        (self.f)(sender, key, batch)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Outcome of broadcasting one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DeliveryReport {
    /// Subscribers that handled the batch.
    pub delivered: usize,
    /// Subscribers that returned an error or panicked.
    pub failed: usize,
}

/// Deliver a batch to all subscribers with error and panic isolation.
pub(crate) fn deliver<P>(
    subscribers: &[Arc<dyn BatchSubscriber<P>>],
    sender: &str,
    key: &str,
    batch: &[P],
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for subscriber in subscribers {
        let result = catch_unwind(AssertUnwindSafe(|| {
            subscriber.on_batch_ready(sender, key, batch)
        }));

        match result {
            Ok(Ok(())) => report.delivered += 1,
            Ok(Err(e)) => {
                report.failed += 1;
                tracing::error!(
                    batcher = %sender,
                    key = %key,
                    subscriber = %subscriber.name(),
                    size = batch.len(),
                    error = %e,
                    "Subscriber failed to handle batch"
                );
            }
            Err(_) => {
                report.failed += 1;
                tracing::error!(
                    batcher = %sender,
                    key = %key,
                    subscriber = %subscriber.name(),
                    size = batch.len(),
                    "Subscriber panicked while handling batch"
                );
            }
        }
    }

    report
}
