// SPDX-License-Identifier: MIT OR Apache-2.0
//! `NodeFlow` command line.
//!
//! Loads graph documents against a small demonstration node library and
//! evaluates, inspects or re-encodes them.

mod commands;
mod library;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// `NodeFlow` - dataflow graph evaluation.
#[derive(Parser)]
#[command(name = "nodeflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a graph document and print every node's outputs
    Eval {
        /// Path to the graph document (.json or .ron)
        file: PathBuf,

        /// Evaluator settings (RON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show a graph document's structure and evaluation order
    Inspect {
        /// Path to the graph document (.json or .ron)
        file: PathBuf,
    },

    /// Re-encode a graph document; formats follow the file extensions
    Convert {
        /// Source document
        input: PathBuf,

        /// Destination document
        output: PathBuf,
    },
}

fn setup_logging(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("nodeflow_graph={level}").parse()?)
        .add_directive(format!("nodeflow_cli={level}").parse()?);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    tracing::debug!("Starting NodeFlow v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Eval { file, config } => commands::eval::run(&file, config.as_deref()),
        Commands::Inspect { file } => commands::inspect::run(&file),
        Commands::Convert { input, output } => commands::convert::run(&input, &output),
    }
}
