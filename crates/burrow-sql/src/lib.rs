// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Burrow SQL sink
//!
//! Stores batches emitted by a [`burrow::Batcher`] into SQLite.
//!
//! # Features
//!
//! - URL based connection (`sqlite:///relay.db`, `sqlite://` for in-memory)
//! - Records mapped to query parameters as-is, by position or by name
//! - Dotted paths (`payload.user.id`) into nested JSON records
//! - One transaction per batch
//!
//! # Example
//!
//! ```
//! use burrow_sql::{Database, InsertQuery, ParameterMapping};
//! use serde_json::json;
//!
//! let db = Database::open("sqlite://")?;
//! db.execute_script("CREATE TABLE logs (message TEXT)")?;
//!
//! let query = InsertQuery::new(
//!     "INSERT INTO logs VALUES (?)",
//!     ParameterMapping::Positional(vec!["payload.text".into()]),
//! );
//! let rows = db.execute_batch(&query, &[json!({ "payload": { "text": "hi" } })])?;
//! assert_eq!(rows, 1);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod database;
pub mod mapper;
pub mod output;
pub mod value;

pub use database::{Database, DatabaseTarget, InsertQuery};
pub use mapper::{resolve_path, Bindings, MappingError, ParameterMapping};
pub use output::SqlOutput;
pub use value::to_sql_value;
