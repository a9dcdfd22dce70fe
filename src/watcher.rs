//! Repository state-change notifications
//!
//! Watches a repository's git directory and forwards a notification for
//! every relevant filesystem event. Git writes many files per operation,
//! so notifications arrive in bursts; [`coalesce`] folds a burst into one.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{trace, warn};

use crate::error::{Error, Result};

/// Keeps a filesystem watch on one git directory alive
pub struct RepoWatcher {
    _watcher: RecommendedWatcher,
    git_dir: PathBuf,
}

impl RepoWatcher {
    /// Watch `git_dir` recursively, sending `()` to `notify_tx` on changes
    pub fn start(git_dir: &Path, notify_tx: UnboundedSender<()>) -> Result<Self> {
        let root = git_dir
            .canonicalize()
            .unwrap_or_else(|_| git_dir.to_path_buf());
        let handler_root = root.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    if event.paths.iter().any(|p| is_relevant(&handler_root, p)) {
                        trace!(paths = ?event.paths, "git directory changed");
                        // Receiver gone means the repository was closed
                        let _ = notify_tx.send(());
                    }
                }
                Err(err) => warn!(error = %err, "watch error"),
            }
        })
        .map_err(|source| Error::Watch {
            path: root.clone(),
            source,
        })?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|source| Error::Watch {
                path: root.clone(),
                source,
            })?;

        Ok(Self {
            _watcher: watcher,
            git_dir: root,
        })
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }
}

/// Whether a change to `path` inside `git_dir` can indicate a HEAD move.
///
/// Object writes and lock files are noise; refs, logs and the `*HEAD`
/// files are not.
pub fn is_relevant(git_dir: &Path, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(git_dir) else {
        return false;
    };

    if relative
        .extension()
        .is_some_and(|ext| ext == "lock")
    {
        return false;
    }

    match relative.components().next() {
        Some(Component::Normal(first)) => first != "objects",
        _ => false,
    }
}

/// Wait for the next notification, then swallow everything that follows
/// within `window`. Returns false once the sender side is gone.
pub async fn coalesce(rx: &mut UnboundedReceiver<()>, window: Duration) -> bool {
    if rx.recv().await.is_none() {
        return false;
    }

    loop {
        match tokio::time::timeout(window, rx.recv()).await {
            Ok(Some(())) => continue,
            Ok(None) => return true,
            Err(_) => return true,
        }
    }
}
