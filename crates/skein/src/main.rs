// SPDX-FileCopyrightText: 2026 Skein Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Skein - resilient telemetry ingestion.
//!
//! This is the binary entry point. It replays newline-delimited JSON events
//! through an ingestion pipeline and inspects configuration.

mod config_cmd;
mod ingest;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use skein_config::SkeinConfig;

/// Skein - resilient telemetry ingestion.
#[derive(Parser, Debug)]
#[command(name = "skein", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the standard locations.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Send events from a JSONL file (or `-` for stdin) to the collector.
    Ingest {
        /// Input file, one event per line.
        file: PathBuf,

        /// Print Prometheus metrics after the run.
        #[arg(long)]
        print_metrics: bool,
    },
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: config_cmd::ConfigAction,
    },
}

fn load_config(path: Option<&PathBuf>) -> SkeinConfig {
    let loaded = match path {
        Some(path) => skein_config::load_and_validate_path(path),
        None => skein_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            skein_config::render_errors(&errors);
            std::process::exit(2);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    match cli.command {
        Some(Commands::Ingest {
            file,
            print_metrics,
        }) => {
            init_tracing(&config.client.log_level);
            if let Err(e) = ingest::run(&config, &file, print_metrics).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Config { action }) => {
            if let Err(e) = config_cmd::run(&config, action) {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        None => {
            println!("skein: use --help for available commands");
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("skein={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
