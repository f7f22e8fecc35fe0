// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay configuration.
//!
//! A relay is described by named blocks (message sources and databases) and
//! flows connecting an exchange of a source block to a query on a database
//! block.
//!
//! ```yaml
//! size_limit: 5
//! time_limit: 15
//! blocks:
//!   - name: input
//!     type: jsonl
//!     path: messages.jsonl
//!   - name: output
//!     type: sql
//!     url: sqlite:///relay.db
//! flows:
//!   - input: { block: input, exchange: logs }
//!     output:
//!       block: output
//!       query: "INSERT INTO logs (message) VALUES (:message)"
//!       parameters: { message: payload.text }
//! ```

use burrow::{BatcherConfig, DEFAULT_SIZE_LIMIT, DEFAULT_TIME_LIMIT};
use burrow_sql::{MappingError, ParameterMapping};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid parameters for flow {flow}: {source}")]
    Mapping {
        flow: usize,
        #[source]
        source: MappingError,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Records per batch.
    #[serde(default = "default_size_limit")]
    pub size_limit: usize,

    /// Seconds a batch may wait for more records (fractions allowed).
    #[serde(default = "default_time_limit")]
    pub time_limit: f64,

    /// Named sources and databases.
    pub blocks: Vec<BlockConfig>,

    /// Exchange to query connections.
    pub flows: Vec<FlowConfig>,
}

fn default_size_limit() -> usize {
    DEFAULT_SIZE_LIMIT
}

fn default_time_limit() -> f64 {
    DEFAULT_TIME_LIMIT.as_secs_f64()
}

/// A named block.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockConfig {
    pub name: String,

    #[serde(flatten)]
    pub kind: BlockKind,
}

/// Block type and its settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BlockKind {
    /// JSON envelopes, one per line, read from a file or stdin.
    Jsonl {
        #[serde(default)]
        path: Option<PathBuf>,
    },

    /// SQL database.
    Sql { url: String },
}

impl BlockKind {
    pub fn is_input(&self) -> bool {
        matches!(self, BlockKind::Jsonl { .. })
    }

    pub fn is_output(&self) -> bool {
        matches!(self, BlockKind::Sql { .. })
    }

    fn type_name(&self) -> &'static str {
        match self {
            BlockKind::Jsonl { .. } => "jsonl",
            BlockKind::Sql { .. } => "sql",
        }
    }
}

/// One exchange batched into one query.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowConfig {
    pub input: FlowInput,
    pub output: FlowOutput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowInput {
    /// Source block name.
    pub block: String,
    /// Exchange whose messages this flow batches.
    pub exchange: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowOutput {
    /// Database block name.
    pub block: String,
    /// Query executed once per message.
    pub query: String,
    /// How messages feed the query parameters. Messages are bound as-is when absent.
    #[serde(default)]
    pub parameters: ParameterMapping,
}

impl RelayConfig {
    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RelayConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.batcher_config()?;

        if self.flows.is_empty() {
            return Err(ConfigError::Invalid("No flows configured".into()));
        }

        let mut names = HashSet::new();
        let mut stdin_reader: Option<&str> = None;
        for block in &self.blocks {
            if block.name.is_empty() {
                return Err(ConfigError::Invalid("Block with empty name".into()));
            }
            if !names.insert(block.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate block name '{}'",
                    block.name
                )));
            }
            if matches!(block.kind, BlockKind::Jsonl { path: None }) {
                if let Some(first) = stdin_reader.replace(block.name.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "Blocks '{}' and '{}' both read stdin",
                        first, block.name
                    )));
                }
            }
        }

        for (index, flow) in self.flows.iter().enumerate() {
            let input = self.block(&flow.input.block).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "Flow {} references unknown input block '{}'",
                    index, flow.input.block
                ))
            })?;
            if !input.kind.is_input() {
                return Err(ConfigError::Invalid(format!(
                    "Flow {} input block '{}' is a {} block",
                    index,
                    input.name,
                    input.kind.type_name()
                )));
            }

            let output = self.block(&flow.output.block).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "Flow {} references unknown output block '{}'",
                    index, flow.output.block
                ))
            })?;
            if !output.kind.is_output() {
                return Err(ConfigError::Invalid(format!(
                    "Flow {} output block '{}' is a {} block",
                    index,
                    output.name,
                    output.kind.type_name()
                )));
            }

            if flow.input.exchange.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Flow {} has an empty exchange",
                    index
                )));
            }
            if flow.output.query.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("Flow {} has an empty query", index)));
            }
            flow.output
                .parameters
                .validate()
                .map_err(|source| ConfigError::Mapping { flow: index, source })?;
        }

        Ok(())
    }

    /// Look up a block by name.
    pub fn block(&self, name: &str) -> Option<&BlockConfig> {
        self.blocks.iter().find(|block| block.name == name)
    }

    /// Limits shared by every flow's batcher.
    pub fn batcher_config(&self) -> Result<BatcherConfig, ConfigError> {
        if self.size_limit == 0 {
            return Err(ConfigError::Invalid("size_limit must be at least 1".into()));
        }
        if !self.time_limit.is_finite() || self.time_limit <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "time_limit must be a positive number of seconds, got {}",
                self.time_limit
            )));
        }

        Ok(BatcherConfig::builder()
            .size_limit(self.size_limit)
            .time_limit(Duration::from_secs_f64(self.time_limit))
            .build())
    }
}
