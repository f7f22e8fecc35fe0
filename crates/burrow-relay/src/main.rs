// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Burrow relay CLI
//!
//! Batch messages per exchange and store them with SQL.
//!
//! # Usage
//!
//! ```bash
//! # Run the flows of a configuration file
//! burrow-relay relay.yaml
//!
//! # Verbose, logging to a file
//! burrow-relay relay.yaml --log-level debug --log-file relay.log
//!
//! # Check a configuration file
//! burrow-relay validate relay.yaml
//! ```

use anyhow::{bail, Context, Result};
use burrow_relay::{BlockKind, Flow, Relay, RelayConfig, StopHandle};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "burrow-relay")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Batch bus messages per exchange and store them with SQL")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Configuration file (YAML)
    config: Option<PathBuf>,

    /// Log level (RUST_LOG overrides it when set)
    #[arg(short, long, value_enum, default_value = "info")]
    log_level: LevelArg,

    /// Write logs to this file instead of stderr
    #[arg(short = 'f', long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a configuration file
    Validate {
        /// Configuration file path
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LevelArg {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LevelArg {
    fn as_str(self) -> &'static str {
        match self {
            LevelArg::Trace => "trace",
            LevelArg::Debug => "debug",
            LevelArg::Info => "info",
            LevelArg::Warn => "warn",
            LevelArg::Error => "error",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Validate { config }) = &cli.command {
        return cmd_validate(config);
    }

    let Some(config_path) = cli.config.as_deref() else {
        bail!("Missing configuration file (see --help)");
    };

    init_logging(cli.log_level, cli.log_file.as_deref())?;

    let config = RelayConfig::from_file(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    tracing::debug!(config = ?config, "Configuration loaded");

    let relay = Relay::from_config(&config).context("Failed to create relay")?;
    let flows: Vec<Flow> = relay.flows().to_vec();

    ctrlc_handler(relay.stop_handle());

    tracing::info!(
        config = %config_path.display(),
        flows = flows.len(),
        size_limit = config.size_limit,
        time_limit = config.time_limit,
        "Starting burrow relay"
    );

    let source_stats = relay.run().context("Relay error")?;

    for (block, stats) in &source_stats {
        tracing::info!(
            block = %block,
            lines = stats.lines_read,
            forwarded = stats.messages_forwarded,
            decode_errors = stats.decode_errors,
            unrouted = stats.unrouted,
            "Source statistics"
        );
    }
    for flow in &flows {
        let stats = flow.batcher.stats();
        tracing::info!(
            flow = %flow.batcher.name(),
            exchange = %flow.exchange,
            received = stats.records_received,
            batches = stats.batches_flushed(),
            rows = flow.output.rows_inserted(),
            failed_batches = flow.output.failed_batches(),
            "Flow statistics"
        );
    }

    tracing::info!("Relay stopped");
    Ok(())
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `--log-level`.
fn init_logging(level: LevelArg, log_file: Option<&Path>) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    match RelayConfig::from_file(config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Size limit: {}", config.size_limit);
            println!("Time limit: {}s", config.time_limit);
            println!("Blocks: {}", config.blocks.len());
            for block in &config.blocks {
                match &block.kind {
                    BlockKind::Jsonl { path } => println!(
                        "  {} (jsonl, {})",
                        block.name,
                        path.as_deref()
                            .map_or_else(|| "stdin".to_string(), |p| p.display().to_string())
                    ),
                    BlockKind::Sql { url } => println!("  {} (sql, {})", block.name, url),
                }
            }
            println!("Flows: {}", config.flows.len());
            for (i, flow) in config.flows.iter().enumerate() {
                println!(
                    "  [{}] {}/{} -> {}",
                    i, flow.input.block, flow.input.exchange, flow.output.block
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

fn ctrlc_handler(stop_handle: StopHandle) {
    let result = ctrlc::set_handler(move || {
        tracing::info!("Interrupted by user, flushing pending batches...");
        stop_handle.stop();
    });
    if let Err(e) = result {
        tracing::warn!(error = %e, "Unable to install Ctrl-C handler");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_arguments() {
        let cli = Cli::parse_from(["burrow-relay", "relay.yaml", "-l", "debug", "-f", "relay.log"]);

        assert_eq!(cli.config, Some(PathBuf::from("relay.yaml")));
        assert!(matches!(cli.log_level, LevelArg::Debug));
        assert_eq!(cli.log_file, Some(PathBuf::from("relay.log")));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_validate_subcommand() {
        let cli = Cli::parse_from(["burrow-relay", "validate", "relay.yaml"]);

        match cli.command {
            Some(Commands::Validate { config }) => assert_eq!(config, PathBuf::from("relay.yaml")),
            other => panic!("expected validate, got {:?}", other),
        }
    }

    #[test]
    fn test_default_log_level() {
        let cli = Cli::parse_from(["burrow-relay", "relay.yaml"]);
        assert_eq!(cli.log_level.as_str(), "info");
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        assert!(Cli::try_parse_from(["burrow-relay", "relay.yaml", "-l", "critical"]).is_err());
    }
}
