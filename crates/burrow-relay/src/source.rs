// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! JSON lines message source.
//!
//! Each input line is one message envelope:
//!
//! ```json
//! {"exchange": "logs", "content_type": "application/json", "payload": {"text": "hello"}}
//! ```
//!
//! The envelope is handed as a whole to every batcher bound to its exchange,
//! keyed by the exchange name.

use burrow::Batcher;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Content type the payload is expected to carry.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// One message read from the input.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope {
    pub exchange: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

/// Source statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Lines holding a message (blank lines excluded).
    pub lines_read: u64,
    /// Messages handed to at least one batcher.
    pub messages_forwarded: u64,
    /// Lines that were not a valid envelope.
    pub decode_errors: u64,
    /// Messages for an exchange no flow listens to.
    pub unrouted: u64,
}

#[derive(Debug, Default)]
struct SourceCounters {
    lines_read: AtomicU64,
    messages_forwarded: AtomicU64,
    decode_errors: AtomicU64,
    unrouted: AtomicU64,
}

/// Reads envelopes line by line and feeds the batchers bound to their exchange.
pub struct JsonLinesSource {
    name: String,
    bindings: HashMap<String, Vec<Batcher<Value>>>,
    counters: SourceCounters,
}

impl JsonLinesSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: HashMap::new(),
            counters: SourceCounters::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Route messages of `exchange` to `batcher`.
    ///
    /// An exchange may be bound to several batchers; each gets every message.
    pub fn bind(&mut self, exchange: impl Into<String>, batcher: Batcher<Value>) {
        let exchange = exchange.into();
        tracing::debug!(
            source = %self.name,
            exchange = %exchange,
            batcher = %batcher.name(),
            "Exchange bound"
        );
        self.bindings.entry(exchange).or_default().push(batcher);
    }

    /// Exchanges with at least one bound batcher, sorted.
    pub fn exchanges(&self) -> Vec<&str> {
        let mut exchanges: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        exchanges.sort_unstable();
        exchanges
    }

    /// Consume `reader` until EOF or until `running` is cleared.
    ///
    /// `running` is checked between lines; a blocked read is not interrupted.
    pub fn run<R: BufRead>(&self, reader: R, running: &AtomicBool) -> io::Result<SourceStats> {
        tracing::info!(source = %self.name, exchanges = ?self.exchanges(), "Source started");

        for line in reader.lines() {
            if !running.load(Ordering::SeqCst) {
                tracing::info!(source = %self.name, "Source stopped");
                return Ok(self.stats());
            }

            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            self.handle_line(&line);
        }

        tracing::info!(source = %self.name, "End of input");
        Ok(self.stats())
    }

    /// Decode one line and forward it.
    pub fn handle_line(&self, line: &str) {
        self.counters.lines_read.fetch_add(1, Ordering::Relaxed);

        let envelope: Envelope = match serde_json::from_str(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(source = %self.name, error = %e, line = %line, "Body decoding error");
                return;
            }
        };

        if let Some(content_type) = envelope.content_type.as_deref() {
            if content_type != JSON_CONTENT_TYPE {
                tracing::warn!(
                    source = %self.name,
                    exchange = %envelope.exchange,
                    content_type = %content_type,
                    "Unexpected content type, decoding as JSON anyway"
                );
            }
        }

        self.forward(envelope);
    }

    fn forward(&self, envelope: Envelope) {
        let Some(batchers) = self.bindings.get(&envelope.exchange) else {
            self.counters.unrouted.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(source = %self.name, exchange = %envelope.exchange, "No flow for exchange");
            return;
        };

        tracing::trace!(source = %self.name, exchange = %envelope.exchange, "Message received");

        let record = envelope_record(&envelope);
        let mut forwarded = false;
        for batcher in batchers {
            match batcher.record_received(&self.name, &envelope.exchange, record.clone()) {
                Ok(()) => forwarded = true,
                Err(e) => tracing::warn!(
                    source = %self.name,
                    batcher = %batcher.name(),
                    error = %e,
                    "Message rejected"
                ),
            }
        }

        if forwarded {
            self.counters.messages_forwarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            lines_read: self.counters.lines_read.load(Ordering::Relaxed),
            messages_forwarded: self.counters.messages_forwarded.load(Ordering::Relaxed),
            decode_errors: self.counters.decode_errors.load(Ordering::Relaxed),
            unrouted: self.counters.unrouted.load(Ordering::Relaxed),
        }
    }
}

/// Record stored in a batch: `{"exchange": .., "payload": ..}`.
fn envelope_record(envelope: &Envelope) -> Value {
    serde_json::json!({
        "exchange": envelope.exchange,
        "payload": envelope.payload,
    })
}
