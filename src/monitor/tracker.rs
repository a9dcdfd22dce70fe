//! Per-repository HEAD tracking
//!
//! Remembers the last HEAD seen for each repository and reports a
//! [`Transition`] only when HEAD genuinely moves. The first observation of
//! a repository sets the baseline and never reports anything.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, trace};

use crate::git::{RepoId, Repository, Revision};

/// A confirmed HEAD move; `previous` and `current` always differ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    previous: Revision,
    current: Revision,
}

impl Transition {
    /// Returns `None` unless the revisions differ and neither is empty
    pub fn new(previous: Revision, current: Revision) -> Option<Self> {
        if previous == current || previous.as_str().is_empty() || current.as_str().is_empty() {
            return None;
        }
        Some(Self { previous, current })
    }

    pub fn previous(&self) -> &Revision {
        &self.previous
    }

    pub fn current(&self) -> &Revision {
        &self.current
    }
}

/// Last-known HEAD per repository
#[derive(Debug, Default)]
pub struct StateTracker {
    heads: Mutex<HashMap<RepoId, Revision>>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the repository's HEAD and record it
    pub fn observe<R: Repository>(&self, repo: &R) -> Option<Transition> {
        self.observe_head(repo.id(), repo.head())
    }

    /// Record `head` for `id`, returning the transition if HEAD moved.
    ///
    /// The stored revision is swapped under the lock, so two racing
    /// observations of the same move report it once.
    pub fn observe_head(&self, id: &RepoId, head: Option<Revision>) -> Option<Transition> {
        let Some(head) = head else {
            trace!(repo = %id, "HEAD unavailable, skipping observation");
            return None;
        };

        let mut heads = self.heads.lock().unwrap_or_else(PoisonError::into_inner);
        match heads.get_mut(id) {
            None => {
                debug!(repo = %id, head = %head.short(), "recording baseline HEAD");
                heads.insert(id.clone(), head);
                None
            }
            Some(stored) if *stored == head => None,
            Some(stored) => {
                let previous = std::mem::replace(stored, head.clone());
                debug!(repo = %id, from = %previous.short(), to = %head.short(), "HEAD moved");
                Transition::new(previous, head)
            }
        }
    }

    /// Forget a repository; the next observation sets a fresh baseline
    pub fn release(&self, id: &RepoId) -> bool {
        self.heads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    /// Last recorded HEAD for a repository
    pub fn baseline(&self, id: &RepoId) -> Option<Revision> {
        self.heads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}
