// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Burrow relay service
//!
//! Reads messages published on exchanges, batches them per exchange with a
//! [`burrow::Batcher`] and stores each batch with one SQL query.
//!
//! # Features
//!
//! - YAML configuration of blocks and flows
//! - One batcher per flow, size and time limits shared by all flows
//! - JSON lines input (file or stdin), one reader thread per input block
//! - SQLite output through [`burrow_sql`]
//! - Pending batches flushed on shutdown
//!
//! # Example
//!
//! ```no_run
//! use burrow_relay::{Relay, RelayConfig};
//!
//! let config = RelayConfig::from_file("relay.yaml")?;
//! let relay = Relay::from_config(&config)?;
//! relay.run()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod flow;
pub mod source;

pub use config::{BlockConfig, BlockKind, ConfigError, FlowConfig, RelayConfig};
pub use flow::{Flow, FlowError, Relay, StopHandle};
pub use source::{Envelope, JsonLinesSource, SourceStats};
