//! Error types
//!
//! Errors raised by the git, config and watcher layers. Most of them never
//! reach the user: the monitor maps query failures to `Unknown` or
//! "no change" and only logs them.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors produced below the application layer
#[derive(Error, Debug)]
pub enum Error {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Process {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("invalid config {path}: {source}")]
    Config {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        source: notify::Error,
    },

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
