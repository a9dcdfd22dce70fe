//! History log queries
//!
//! Reads the most recent reflog entry by running `git reflog` in the
//! repository root. The query is read-only and bounded by a timeout.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Fetch the most recent reflog entry as free text
pub async fn latest_entry(repo_root: &Path, timeout: Duration) -> Result<String> {
    let mut command = Command::new("git");
    command
        .args(["reflog", "-n", "1"])
        .current_dir(repo_root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| Error::Timeout {
            operation: "git reflog",
            elapsed: timeout,
        })??;

    if !output.status.success() {
        return Err(Error::Process {
            command: "git reflog -n 1".to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let entry = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
    debug!(repo = %repo_root.display(), entry = %entry, "latest reflog entry");
    Ok(entry)
}
