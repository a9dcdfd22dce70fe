//! Configuration
//!
//! Loaded from `config.yaml` in the platform config directory, or from an
//! explicit path. Every field is optional.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::deps::FieldKind;
use crate::error::{Error, Result};
use crate::monitor::OperationKind;

/// Manifest patterns watched when none are configured
pub const DEFAULT_MONITORED_FILES: &[&str] = &["package.json"];

/// User configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Whether watching is enabled at all
    pub enabled: bool,
    /// Operations that may trigger a report
    pub git_operation_types: Vec<OperationKind>,
    /// File patterns, relative to the repository root, to check for changes
    pub monitored_files: Vec<String>,
    /// Manifest sections included in the dependency diff
    pub dependency_fields: Vec<FieldKind>,
    /// Workspace folders to watch; the CLI paths are used when empty
    pub workspaces: Vec<PathBuf>,
    pub classify_timeout_ms: u64,
    pub diff_timeout_ms: u64,
    /// Quiet period used to coalesce bursts of filesystem events
    pub debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            git_operation_types: vec![
                OperationKind::Pull,
                OperationKind::Merge,
                OperationKind::Rebase,
            ],
            monitored_files: DEFAULT_MONITORED_FILES.iter().map(|s| s.to_string()).collect(),
            dependency_fields: vec![FieldKind::Dependencies, FieldKind::DevDependencies],
            workspaces: Vec::new(),
            classify_timeout_ms: 5_000,
            diff_timeout_ms: 10_000,
            debounce_ms: 250,
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "depalert").map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Load from `path`, or the default location when `None`.
    ///
    /// A missing file gives the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };

        Self::parse(&content).map_err(|source| Error::Config { path, source })
    }

    fn parse(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        // An empty document deserialises to unit, not a map
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    pub fn classify_timeout(&self) -> Duration {
        Duration::from_millis(self.classify_timeout_ms)
    }

    pub fn diff_timeout(&self) -> Duration {
        Duration::from_millis(self.diff_timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
