//! depalert - dependency change alerts for git workspaces
//!
//! Watches the git repositories behind one or more project folders and,
//! after a pull, merge or rebase that changed a dependency manifest,
//! prints which dependencies were added, removed or updated.
//!
//! # Usage
//!
//! ```bash
//! depalert                         # Watch the current directory
//! depalert ~/src/web ~/src/api     # Watch several workspaces
//! depalert --operations pull,checkout -v
//! ```

mod app;
mod config;
mod deps;
mod error;
mod git;
mod monitor;
mod report;
mod watcher;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::monitor::OperationKind;

/// Dependency change alerts for git workspaces
#[derive(Parser, Debug)]
#[command(name = "depalert")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Workspace folders to watch (defaults to the configured workspaces,
    /// then the current directory)
    paths: Vec<PathBuf>,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Git operations that trigger a report, e.g. `pull,merge`
    #[arg(long, value_delimiter = ',')]
    operations: Option<Vec<OperationKind>>,

    /// Record the current state of every workspace and exit
    #[arg(long)]
    once: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("depalert={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(operations) = args.operations {
        config.git_operation_types = operations;
    }

    // CLI paths win over configured workspaces
    let workspaces = if !args.paths.is_empty() {
        args.paths
    } else if !config.workspaces.is_empty() {
        config.workspaces.clone()
    } else {
        vec![PathBuf::from(".")]
    };

    app::App::new(config, workspaces).run(args.once).await
}
