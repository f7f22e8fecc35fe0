// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Keyed batching engine
//!
//! # Operation
//!
//! 1. `record_received` appends the record to its key's batch
//! 2. The first record of a batch arms a deadline for `time_limit`
//! 3. Reaching `size_limit` flushes the batch and cancels the deadline
//! 4. An expired deadline flushes whatever the batch holds
//!
//! Both flush paths take the same per-key guard. A deadline that fires after
//! a size-triggered flush already canceled it finds its timer record gone (or
//! replaced by a newer one) and does nothing.

use crate::config::BatcherConfig;
use crate::error::BatcherError;
use crate::stats::{BatcherStats, Counters, FlushReason};
use crate::subscriber::{self, BatchSubscriber, FnSubscriber, SubscriberError};
use crate::timer::{self, ArmedTimer, TimerId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Mutable state of one source key, guarded by the slot mutex.
struct SlotState<P> {
    /// Records in arrival order.
    batch: Vec<P>,
    /// Deadline armed for the current batch. `Some` exactly when `batch` is non-empty.
    timer: Option<ArmedTimer>,
}

/// Per-key buffer, deadline and guard.
///
/// Created on the first record for a key and kept for the batcher's lifetime.
struct KeySlot<P> {
    state: Mutex<SlotState<P>>,
}

impl<P> KeySlot<P> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                batch: Vec::new(),
                timer: None,
            }),
        }
    }
}

struct Shared<P> {
    name: String,
    config: BatcherConfig,
    slots: RwLock<HashMap<String, Arc<KeySlot<P>>>>,
    subscribers: RwLock<Vec<Arc<dyn BatchSubscriber<P>>>>,
    next_timer_id: AtomicU64,
    counters: Counters,
}

/// Groups records per source key and flushes them on size or time.
///
/// Cloning is cheap and every clone drives the same engine. Deadline threads
/// only hold a weak reference: once the last clone is dropped, pending
/// deadlines exit without flushing (call [`Batcher::flush_all`] first to
/// drain).
pub struct Batcher<P> {
    shared: Arc<Shared<P>>,
}

impl<P> Clone for Batcher<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P: Send + 'static> Batcher<P> {
    /// Create a batcher with validated limits.
    ///
    /// `name` identifies the batcher as the sender of its batches.
    pub fn new(name: impl Into<String>, config: BatcherConfig) -> Result<Self, BatcherError> {
        config.validate()?;

        Ok(Self {
            shared: Arc::new(Shared {
                name: name.into(),
                config,
                slots: RwLock::new(HashMap::new()),
                subscribers: RwLock::new(Vec::new()),
                next_timer_id: AtomicU64::new(1),
                counters: Counters::default(),
            }),
        })
    }

    /// Name used as the sender of emitted batches.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Get the batcher configuration
    pub fn config(&self) -> &BatcherConfig {
        &self.shared.config
    }

    /// Register a subscriber. Subscribers are called in registration order.
    pub fn subscribe<S>(&self, subscriber: S)
    where
        S: BatchSubscriber<P> + 'static,
    {
        self.subscribe_arc(Arc::new(subscriber));
    }

    /// Register an already shared subscriber.
    pub fn subscribe_arc(&self, subscriber: Arc<dyn BatchSubscriber<P>>) {
        tracing::debug!(
            batcher = %self.shared.name,
            subscriber = %subscriber.name(),
            "Subscriber registered"
        );
        self.shared.subscribers.write().push(subscriber);
    }

    /// Register a closure as a subscriber.
    pub fn subscribe_fn<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&str, &str, &[P]) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.subscribe(FnSubscriber::new(name, f));
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.read().len()
    }

    /// Add a record to `key`'s batch, flushing it if the size limit is reached.
    ///
    /// `sender` names the ingress that produced the record and is only used
    /// for logging. When the batch reaches the size limit, the batch is
    /// delivered to all subscribers on the calling thread before this returns.
    ///
    /// # Errors
    ///
    /// [`BatcherError::EmptyKey`] if `key` is empty.
    pub fn record_received(&self, sender: &str, key: &str, payload: P) -> Result<(), BatcherError> {
        if key.is_empty() {
            return Err(BatcherError::EmptyKey);
        }

        let shared = &self.shared;
        shared.counters.record_received();

        let slot = shared.slot(key);
        let mut state = slot.state.lock();
        state.batch.push(payload);
        let size = state.batch.len();

        tracing::trace!(
            batcher = %shared.name,
            sender = %sender,
            key = %key,
            size,
            capacity = shared.config.size_limit,
            "Record added to batch"
        );

        if size == 1 {
            shared.start_timer(key, &mut state);
        } else if size >= shared.config.size_limit {
            tracing::debug!(
                batcher = %shared.name,
                key = %key,
                size_limit = shared.config.size_limit,
                "Size limit reached"
            );
            shared.flush(key, &mut state, FlushReason::Size);
            shared.cancel_timer(key, &mut state);
        }

        Ok(())
    }

    /// Flush `key`'s batch now and cancel its deadline.
    ///
    /// Returns `false` (after logging a warning) when there is nothing to
    /// flush.
    pub fn flush_key(&self, key: &str) -> bool {
        let slot = self.shared.slots.read().get(key).cloned();
        let Some(slot) = slot else {
            tracing::warn!(batcher = %self.shared.name, key = %key, "Nothing to flush for unknown key");
            self.shared.counters.record_empty_flush();
            return false;
        };

        let mut state = slot.state.lock();
        if !self.shared.flush(key, &mut state, FlushReason::Manual) {
            return false;
        }
        self.shared.cancel_timer(key, &mut state);
        true
    }

    /// Flush every non-empty batch and cancel its deadline.
    ///
    /// Returns the number of batches flushed.
    pub fn flush_all(&self) -> usize {
        let slots: Vec<(String, Arc<KeySlot<P>>)> = self
            .shared
            .slots
            .read()
            .iter()
            .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
            .collect();

        let mut flushed = 0;
        for (key, slot) in slots {
            let mut state = slot.state.lock();
            if state.batch.is_empty() {
                continue;
            }
            self.shared.flush(&key, &mut state, FlushReason::Manual);
            self.shared.cancel_timer(&key, &mut state);
            flushed += 1;
        }

        tracing::debug!(batcher = %self.shared.name, batches = flushed, "Flushed all pending batches");
        flushed
    }

    /// Number of records waiting in `key`'s batch.
    pub fn pending(&self, key: &str) -> usize {
        self.shared
            .slots
            .read()
            .get(key)
            .map_or(0, |slot| slot.state.lock().batch.len())
    }

    /// Whether a deadline is currently armed for `key`.
    pub fn timer_armed(&self, key: &str) -> bool {
        self.shared
            .slots
            .read()
            .get(key)
            .is_some_and(|slot| slot.state.lock().timer.is_some())
    }

    /// Keys seen so far, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.shared.slots.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Get batcher statistics
    pub fn stats(&self) -> BatcherStats {
        self.shared.counters.snapshot()
    }

    #[cfg(test)]
    fn armed_timer_id(&self, key: &str) -> Option<TimerId> {
        self.shared
            .slots
            .read()
            .get(key)
            .and_then(|slot| slot.state.lock().timer.as_ref().map(ArmedTimer::id))
    }
}

impl<P: Send + 'static> Shared<P> {
    /// Look up the slot for `key`, creating it on first sight.
    fn slot(&self, key: &str) -> Arc<KeySlot<P>> {
        if let Some(slot) = self.slots.read().get(key) {
            return Arc::clone(slot);
        }

        let mut slots = self.slots.write();
        let slot = slots.entry(key.to_string()).or_insert_with(|| {
            tracing::debug!(batcher = %self.name, key = %key, "New source key");
            Arc::new(KeySlot::new())
        });
        Arc::clone(slot)
    }

    /// Arm the deadline for a batch that just became non-empty.
    fn start_timer(self: &Arc<Self>, key: &str, state: &mut SlotState<P>) {
        if let Some(timer) = &state.timer {
            self.counters.record_timer_warning();
            tracing::warn!(
                batcher = %self.name,
                key = %key,
                timer = timer.id(),
                "Timer already active"
            );
            return;
        }

        let id = self.next_timer_id.fetch_add(1, Ordering::Relaxed);
        let weak = Arc::downgrade(self);
        let owned_key = key.to_string();

        let spawned = timer::spawn_deadline(id, key, self.config.time_limit, move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_time_expired(&owned_key, id);
            }
        });

        match spawned {
            Ok(timer) => {
                tracing::debug!(
                    batcher = %self.name,
                    key = %key,
                    timer = id,
                    thread = %timer.thread_name(),
                    time_limit = ?self.config.time_limit,
                    "Timer started"
                );
                state.timer = Some(timer);
            }
            Err(e) => {
                tracing::error!(
                    batcher = %self.name,
                    key = %key,
                    error = %e,
                    "Failed to spawn timer thread; batch will flush on size only"
                );
            }
        }
    }

    /// Cancel the deadline of a batch that was just flushed.
    fn cancel_timer(&self, key: &str, state: &mut SlotState<P>) {
        match state.timer.take() {
            Some(timer) => {
                tracing::debug!(
                    batcher = %self.name,
                    key = %key,
                    timer = timer.id(),
                    "Timer cancelled"
                );
                timer.cancel();
            }
            None => {
                self.counters.record_timer_warning();
                tracing::warn!(batcher = %self.name, key = %key, "Timer not found");
            }
        }
    }

    /// Deadline expiry, called on the timer thread.
    fn on_time_expired(&self, key: &str, id: TimerId) {
        let slot = self.slots.read().get(key).cloned();
        let Some(slot) = slot else {
            self.counters.record_timer_warning();
            tracing::warn!(batcher = %self.name, key = %key, timer = id, "Timer fired for unknown key");
            return;
        };

        let mut state = slot.state.lock();
        match state.timer.as_ref().map(ArmedTimer::id) {
            Some(armed) if armed == id => {}
            Some(armed) => {
                self.counters.record_timer_warning();
                tracing::warn!(
                    batcher = %self.name,
                    key = %key,
                    timer = id,
                    armed,
                    "Stale timer fired, newer timer armed"
                );
                return;
            }
            None => {
                self.counters.record_timer_warning();
                tracing::warn!(batcher = %self.name, key = %key, timer = id, "Timer not found");
                return;
            }
        }

        tracing::debug!(
            batcher = %self.name,
            key = %key,
            time_limit = ?self.config.time_limit,
            "Time limit exceeded"
        );
        self.flush(key, &mut state, FlushReason::Time);
        state.timer = None;
    }

    /// Deliver the batch to all subscribers and leave it empty.
    ///
    /// Returns `false` when the batch was already empty.
    fn flush(&self, key: &str, state: &mut SlotState<P>, reason: FlushReason) -> bool {
        if state.batch.is_empty() {
            self.counters.record_empty_flush();
            tracing::warn!(batcher = %self.name, key = %key, reason = %reason, "Nothing to flush");
            return false;
        }

        let batch = std::mem::take(&mut state.batch);
        let subscribers = self.subscribers.read().clone();

        tracing::debug!(
            batcher = %self.name,
            key = %key,
            reason = %reason,
            size = batch.len(),
            subscribers = subscribers.len(),
            "Flushing batch"
        );

        let report = subscriber::deliver(&subscribers, &self.name, key, &batch);
        self.counters.record_flush(reason, batch.len(), report.failed);
        true
    }
}
