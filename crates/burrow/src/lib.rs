// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Burrow batching engine
//!
//! Groups records arriving from a message bus into per-source batches and
//! hands each completed batch to downstream subscribers.
//!
//! A batch is flushed when either limit is reached, first one wins:
//! - **Size** -- the batch holds `size_limit` records
//! - **Time** -- `time_limit` has elapsed since the first record of the batch
//!
//! # Architecture
//!
//! ```text
//! ingress --record_received(sender, key, payload)--> Batcher
//!                                                    +-- KeySlot "logs"    { batch, timer, guard }
//!                                                    +-- KeySlot "metrics" { batch, timer, guard }
//!                                                    |
//!                               on_batch_ready(sender, key, batch) --> subscribers (in order)
//! ```
//!
//! Every source key owns its own buffer, lock and deadline thread, so a slow
//! flush on one key never blocks another. Flushes are synchronous: the thread
//! that triggers a flush (producer or timer) delivers the batch to every
//! subscriber before returning.
//!
//! # Example
//!
//! ```
//! use burrow::{Batcher, BatcherConfig};
//! use std::time::Duration;
//!
//! let config = BatcherConfig::builder()
//!     .size_limit(3)
//!     .time_limit(Duration::from_secs(100))
//!     .build();
//! let batcher: Batcher<String> = Batcher::new("example", config)?;
//!
//! batcher.subscribe_fn("stdout", |_sender, key, batch: &[String]| {
//!     println!("{key}: {batch:?}");
//!     Ok(())
//! });
//!
//! for record in ["a", "b", "c"] {
//!     batcher.record_received("doc", "x", record.to_string())?;
//! }
//! assert_eq!(batcher.pending("x"), 0);
//! # Ok::<(), burrow::BatcherError>(())
//! ```

pub mod batcher;
pub mod config;
pub mod error;
pub mod stats;
pub mod subscriber;
mod timer;

pub use batcher::Batcher;
pub use config::{BatcherConfig, BatcherConfigBuilder, DEFAULT_SIZE_LIMIT, DEFAULT_TIME_LIMIT};
pub use error::BatcherError;
pub use stats::{BatcherStats, FlushReason};
pub use subscriber::{BatchSubscriber, FnSubscriber, SubscriberError};
