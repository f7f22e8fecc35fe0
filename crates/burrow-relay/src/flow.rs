// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flow wiring.
//!
//! Builds the block instances named in a [`RelayConfig`] and connects them:
//!
//! ```text
//! source block --exchange--> Batcher "flow-<n>" --batch--> SqlOutput --> database block
//! ```

use crate::config::{BlockKind, RelayConfig};
use crate::source::{JsonLinesSource, SourceStats};
use burrow::{Batcher, BatcherError};
use burrow_sql::{Database, InsertQuery, SqlOutput};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// How often `run` checks for shutdown while sources are busy.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Flow construction and runtime errors.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Unable to create block '{block}': {reason}")]
    Block { block: String, reason: String },

    #[error("Unable to create batcher for flow {flow}: {source}")]
    Batcher {
        flow: usize,
        #[source]
        source: BatcherError,
    },

    #[error("Unable to open input of block '{block}': {source}")]
    Input {
        block: String,
        #[source]
        source: io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// A source block and where it reads from.
struct InputBlock {
    source: JsonLinesSource,
    path: Option<PathBuf>,
}

/// A flow as built from configuration.
#[derive(Clone)]
pub struct Flow {
    pub index: usize,
    pub input_block: String,
    pub exchange: String,
    pub output_block: String,
    pub batcher: Batcher<Value>,
    pub output: Arc<SqlOutput>,
}

/// Stop signal shared with the Ctrl-C handler.
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    /// Stop the relay.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Relay instance: sources, batchers and outputs wired together.
pub struct Relay {
    inputs: Vec<(String, InputBlock)>,
    databases: HashMap<String, Arc<Database>>,
    flows: Vec<Flow>,
    running: Arc<AtomicBool>,
}

impl Relay {
    /// Create every block and connect every flow.
    pub fn from_config(config: &RelayConfig) -> Result<Self, FlowError> {
        config.validate()?;
        let batcher_config = config.batcher_config()?;

        let mut inputs: Vec<(String, InputBlock)> = Vec::new();
        let mut databases: HashMap<String, Arc<Database>> = HashMap::new();

        for block in &config.blocks {
            match &block.kind {
                BlockKind::Jsonl { path } => {
                    inputs.push((
                        block.name.clone(),
                        InputBlock {
                            source: JsonLinesSource::new(&block.name),
                            path: path.clone(),
                        },
                    ));
                }
                BlockKind::Sql { url } => {
                    let database = Database::open(url).map_err(|e| {
                        let reason = format!("{:#}", e);
                        tracing::error!(block = %block.name, url = %url, error = %reason, "Unable to create block");
                        FlowError::Block {
                            block: block.name.clone(),
                            reason,
                        }
                    })?;
                    databases.insert(block.name.clone(), Arc::new(database));
                }
            }
            tracing::debug!(block = %block.name, kind = ?block.kind, "Block created");
        }

        let mut flows = Vec::with_capacity(config.flows.len());
        for (index, flow) in config.flows.iter().enumerate() {
            let batcher: Batcher<Value> = Batcher::new(format!("flow-{}", index), batcher_config)
                .map_err(|source| FlowError::Batcher { flow: index, source })?;

            // Block names and kinds were checked by `validate`.
            let database = databases.get(&flow.output.block).cloned().ok_or_else(|| {
                FlowError::Config(crate::config::ConfigError::Invalid(format!(
                    "Unknown output block '{}'",
                    flow.output.block
                )))
            })?;
            let output = Arc::new(SqlOutput::new(
                &flow.output.block,
                database,
                InsertQuery::new(&flow.output.query, flow.output.parameters.clone()),
            ));
            batcher.subscribe_arc(output.clone());

            let (_, input) = inputs
                .iter_mut()
                .find(|(name, _)| *name == flow.input.block)
                .ok_or_else(|| {
                    FlowError::Config(crate::config::ConfigError::Invalid(format!(
                        "Unknown input block '{}'",
                        flow.input.block
                    )))
                })?;
            input.source.bind(&flow.input.exchange, batcher.clone());

            tracing::info!(
                flow = index,
                input = %flow.input.block,
                exchange = %flow.input.exchange,
                output = %flow.output.block,
                "Flow created"
            );

            flows.push(Flow {
                index,
                input_block: flow.input.block.clone(),
                exchange: flow.input.exchange.clone(),
                output_block: flow.output.block.clone(),
                batcher,
                output,
            });
        }

        Ok(Self {
            inputs,
            databases,
            flows,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Flows in configuration order.
    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    /// Batchers in flow order.
    pub fn batchers(&self) -> impl Iterator<Item = &Batcher<Value>> {
        self.flows.iter().map(|flow| &flow.batcher)
    }

    /// Database opened for a `sql` block.
    pub fn database(&self, block: &str) -> Option<&Arc<Database>> {
        self.databases.get(block)
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Read every input block until it ends or the relay is stopped, then
    /// flush all pending batches.
    ///
    /// Each input block reads on its own thread. Sources stuck in a blocking
    /// read when the relay is stopped are left behind.
    pub fn run(self) -> Result<HashMap<String, SourceStats>, FlowError> {
        let Relay {
            inputs,
            flows,
            running,
            ..
        } = self;

        let mut readers = Vec::with_capacity(inputs.len());
        for (name, block) in inputs {
            let reader: Box<dyn io::Read + Send> = match &block.path {
                Some(path) => Box::new(File::open(path).map_err(|source| FlowError::Input {
                    block: name.clone(),
                    source,
                })?),
                None => Box::new(io::stdin()),
            };
            readers.push((name, block.source, reader));
        }

        let mut handles: Vec<(String, JoinHandle<io::Result<SourceStats>>)> = Vec::new();
        for (name, source, reader) in readers {
            let running = Arc::clone(&running);
            let handle = thread::Builder::new()
                .name(format!("burrow-source-{}", name.replace('\0', "")))
                .spawn(move || source.run(BufReader::new(reader), &running))
                .map_err(|e| FlowError::Input {
                    block: name.clone(),
                    source: e,
                })?;
            handles.push((name, handle));
        }

        while running.load(Ordering::SeqCst) && handles.iter().any(|(_, h)| !h.is_finished()) {
            thread::sleep(POLL_INTERVAL);
        }

        let mut stats = HashMap::new();
        for (name, handle) in handles {
            if !handle.is_finished() {
                tracing::warn!(block = %name, "Source still reading, not waiting for it");
                continue;
            }
            match handle.join() {
                Ok(Ok(source_stats)) => {
                    stats.insert(name, source_stats);
                }
                Ok(Err(e)) => tracing::error!(block = %name, error = %e, "Source read error"),
                Err(_) => tracing::error!(block = %name, "Source thread panicked"),
            }
        }

        for flow in &flows {
            let flushed = flow.batcher.flush_all();
            tracing::debug!(flow = flow.index, batches = flushed, "Pending batches flushed");
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> RelayConfig {
        RelayConfig::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_one_batcher_per_flow() {
        let relay = Relay::from_config(&config(
            r#"
size_limit: 2
time_limit: 30
blocks:
  - { name: in, type: jsonl }
  - { name: db, type: sql, url: "sqlite://" }
flows:
  - input: { block: in, exchange: logs }
    output: { block: db, query: "INSERT INTO logs VALUES (:payload)" }
  - input: { block: in, exchange: metrics }
    output: { block: db, query: "INSERT INTO metrics VALUES (:payload)" }
"#,
        ))
        .unwrap();

        let names: Vec<&str> = relay.batchers().map(|b| b.name()).collect();
        assert_eq!(names, vec!["flow-0", "flow-1"]);

        let flow = &relay.flows()[1];
        assert_eq!(flow.exchange, "metrics");
        assert_eq!(flow.batcher.config().size_limit, 2);
        assert_eq!(flow.batcher.config().time_limit, Duration::from_secs(30));
        assert_eq!(flow.batcher.subscriber_count(), 1);
        assert!(relay.database("db").is_some());
    }

    #[test]
    fn test_bad_database_url() {
        let result = Relay::from_config(&config(
            r#"
blocks:
  - { name: in, type: jsonl }
  - { name: db, type: sql, url: "postgresql://localhost/relay" }
flows:
  - input: { block: in, exchange: logs }
    output: { block: db, query: "INSERT INTO logs VALUES (:payload)" }
"#,
        ));

        match result {
            Err(FlowError::Block { block, .. }) => assert_eq!(block, "db"),
            other => panic!("expected block error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_stop_handle() {
        let relay = Relay::from_config(&config(
            r#"
blocks:
  - { name: in, type: jsonl }
  - { name: db, type: sql, url: "sqlite://" }
flows:
  - input: { block: in, exchange: logs }
    output: { block: db, query: "INSERT INTO logs VALUES (:payload)" }
"#,
        ))
        .unwrap();

        let handle = relay.stop_handle();
        assert!(handle.is_running());
        handle.clone().stop();
        assert!(!handle.is_running());
    }
}
