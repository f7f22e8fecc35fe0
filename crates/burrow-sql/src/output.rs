// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Batch subscriber writing to a database

use crate::database::{Database, InsertQuery};
use burrow::{BatchSubscriber, SubscriberError};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Inserts every batch it receives with one query.
pub struct SqlOutput {
    name: String,
    database: Arc<Database>,
    query: InsertQuery,
    rows_inserted: AtomicU64,
    failed_batches: AtomicU64,
}

impl SqlOutput {
    /// `name` identifies the output block in log messages.
    pub fn new(name: impl Into<String>, database: Arc<Database>, query: InsertQuery) -> Self {
        Self {
            name: name.into(),
            database,
            query,
            rows_inserted: AtomicU64::new(0),
            failed_batches: AtomicU64::new(0),
        }
    }

    /// Rows inserted so far.
    pub fn rows_inserted(&self) -> u64 {
        self.rows_inserted.load(Ordering::Relaxed)
    }

    /// Batches whose transaction failed.
    pub fn failed_batches(&self) -> u64 {
        self.failed_batches.load(Ordering::Relaxed)
    }
}

impl BatchSubscriber<Value> for SqlOutput {
    fn on_batch_ready(&self, sender: &str, key: &str, batch: &[Value]) -> Result<(), SubscriberError> {
        tracing::debug!(
            output = %self.name,
            batcher = %sender,
            key = %key,
            query = %self.query.sql,
            size = batch.len(),
            "Executing query"
        );

        match self.database.execute_batch(&self.query, batch) {
            Ok(rows) => {
                self.rows_inserted.fetch_add(rows as u64, Ordering::Relaxed);
                tracing::debug!(output = %self.name, key = %key, rows, "Inserted rows");
                Ok(())
            }
            Err(e) => {
                self.failed_batches.fetch_add(1, Ordering::Relaxed);
                let detail = format!("{:#}", e);
                tracing::error!(
                    output = %self.name,
                    key = %key,
                    query = %self.query.sql,
                    batch = ?batch,
                    error = %detail,
                    "Query execution error"
                );
                Err(e.into())
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
