// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Batcher statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// What triggered a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// The batch reached `size_limit`.
    Size,
    /// The batch deadline fired.
    Time,
    /// Flushed on request (`flush_key` / `flush_all`).
    Manual,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushReason::Size => write!(f, "size"),
            FlushReason::Time => write!(f, "time"),
            FlushReason::Manual => write!(f, "manual"),
        }
    }
}

/// Live counters, updated from producer and timer threads.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    records_received: AtomicU64,
    size_flushes: AtomicU64,
    time_flushes: AtomicU64,
    manual_flushes: AtomicU64,
    records_flushed: AtomicU64,
    subscriber_failures: AtomicU64,
    timer_warnings: AtomicU64,
    empty_flushes: AtomicU64,
}

impl Counters {
    pub(crate) fn record_received(&self) {
        self.records_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self, reason: FlushReason, records: usize, failures: usize) {
        let counter = match reason {
            FlushReason::Size => &self.size_flushes,
            FlushReason::Time => &self.time_flushes,
            FlushReason::Manual => &self.manual_flushes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.records_flushed
            .fetch_add(records as u64, Ordering::Relaxed);
        self.subscriber_failures
            .fetch_add(failures as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_timer_warning(&self) {
        self.timer_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_empty_flush(&self) {
        self.empty_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BatcherStats {
        BatcherStats {
            records_received: self.records_received.load(Ordering::Relaxed),
            size_flushes: self.size_flushes.load(Ordering::Relaxed),
            time_flushes: self.time_flushes.load(Ordering::Relaxed),
            manual_flushes: self.manual_flushes.load(Ordering::Relaxed),
            records_flushed: self.records_flushed.load(Ordering::Relaxed),
            subscriber_failures: self.subscriber_failures.load(Ordering::Relaxed),
            timer_warnings: self.timer_warnings.load(Ordering::Relaxed),
            empty_flushes: self.empty_flushes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a batcher's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatcherStats {
    /// Records accepted by `record_received`.
    pub records_received: u64,
    /// Batches flushed because they reached the size limit.
    pub size_flushes: u64,
    /// Batches flushed by an expired deadline.
    pub time_flushes: u64,
    /// Batches flushed on request.
    pub manual_flushes: u64,
    /// Records delivered across all flushed batches.
    pub records_flushed: u64,
    /// Subscriber calls that returned an error or panicked.
    pub subscriber_failures: u64,
    /// Timer bookkeeping anomalies (already armed, missing, stale).
    pub timer_warnings: u64,
    /// Flush attempts on an empty batch.
    pub empty_flushes: u64,
}

impl BatcherStats {
    /// Total number of batches emitted.
    pub fn batches_flushed(&self) -> u64 {
        self.size_flushes + self.time_flushes + self.manual_flushes
    }

    /// Records received but not yet flushed.
    pub fn records_pending(&self) -> u64 {
        self.records_received.saturating_sub(self.records_flushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = Counters::default();
        for _ in 0..7 {
            counters.record_received();
        }
        counters.record_flush(FlushReason::Size, 3, 0);
        counters.record_flush(FlushReason::Time, 2, 1);
        counters.record_empty_flush();
        counters.record_timer_warning();

        let stats = counters.snapshot();
        assert_eq!(stats.records_received, 7);
        assert_eq!(stats.size_flushes, 1);
        assert_eq!(stats.time_flushes, 1);
        assert_eq!(stats.manual_flushes, 0);
        assert_eq!(stats.batches_flushed(), 2);
        assert_eq!(stats.records_flushed, 5);
        assert_eq!(stats.records_pending(), 2);
        assert_eq!(stats.subscriber_failures, 1);
        assert_eq!(stats.empty_flushes, 1);
        assert_eq!(stats.timer_warnings, 1);
    }

    #[test]
    fn test_flush_reason_display() {
        assert_eq!(FlushReason::Size.to_string(), "size");
        assert_eq!(FlushReason::Time.to_string(), "time");
        assert_eq!(FlushReason::Manual.to_string(), "manual");
    }
}
