//! Git operation events and their delivery
//!
//! `EventBus` keeps an ordered list of listeners. Each listener runs in
//! isolation: an error or panic in one is logged and the rest still run.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::tracker::Transition;
use crate::git::{RepoId, Revision};

/// Operation inferred to have moved HEAD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Pull,
    Merge,
    Rebase,
    Checkout,
    Commit,
    Reset,
    Unknown,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Pull => "pull",
            OperationKind::Merge => "merge",
            OperationKind::Rebase => "rebase",
            OperationKind::Checkout => "checkout",
            OperationKind::Commit => "commit",
            OperationKind::Reset => "reset",
            OperationKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pull" => Ok(OperationKind::Pull),
            "merge" => Ok(OperationKind::Merge),
            "rebase" => Ok(OperationKind::Rebase),
            "checkout" => Ok(OperationKind::Checkout),
            "commit" => Ok(OperationKind::Commit),
            "reset" => Ok(OperationKind::Reset),
            "unknown" => Ok(OperationKind::Unknown),
            other => Err(format!("unknown git operation `{other}`")),
        }
    }
}

/// Whether one monitored pattern changed across a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// The monitored file pattern
    pub pattern: String,
    /// True if the patch for this pattern is non-empty
    pub changed: bool,
    /// Patch text, empty when unchanged
    pub content: String,
}

impl ChangeRecord {
    pub fn new(pattern: impl Into<String>, content: String) -> Self {
        Self {
            pattern: pattern.into(),
            changed: !content.is_empty(),
            content,
        }
    }
}

/// A completed git operation that touched monitored files
#[derive(Debug, Clone)]
pub struct GitOperationEvent {
    kind: OperationKind,
    transition: Transition,
    repository: RepoId,
    workspace: PathBuf,
    changes: Vec<ChangeRecord>,
    timestamp: DateTime<Utc>,
}

impl GitOperationEvent {
    pub fn new(
        kind: OperationKind,
        transition: Transition,
        repository: RepoId,
        workspace: PathBuf,
        changes: Vec<ChangeRecord>,
    ) -> Self {
        Self {
            kind,
            transition,
            repository,
            workspace,
            changes,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn previous(&self) -> &Revision {
        self.transition.previous()
    }

    pub fn current(&self) -> &Revision {
        self.transition.current()
    }

    pub fn repository(&self) -> &RepoId {
        &self.repository
    }

    /// Workspace folder the repository was opened for
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// One record per monitored pattern, in configuration order
    pub fn changes(&self) -> &[ChangeRecord] {
        &self.changes
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = dyn Fn(&GitOperationEvent) -> anyhow::Result<()> + Send + Sync;

/// In-process publish/subscribe for [`GitOperationEvent`]s
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(SubscriptionId, Arc<Listener>)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Listeners run in registration order.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&GitOperationEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener; returns false if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    #[cfg(test)]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Deliver an event to every listener.
    ///
    /// Returns how many listeners handled it without failing.
    pub fn emit(&self, event: &GitOperationEvent) -> usize {
        // Snapshot so listeners may subscribe/unsubscribe while running
        let listeners: Vec<_> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();

        let mut delivered = 0;
        for (id, listener) in listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => {
                    warn!(subscription = id.0, error = %err, "listener failed");
                }
                Err(_) => {
                    error!(subscription = id.0, "listener panicked");
                }
            }
        }
        delivered
    }
}
