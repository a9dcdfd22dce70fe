//! Operation classification
//!
//! Infers which git operation moved HEAD. The shipped strategy reads the
//! latest reflog entry and looks for known keywords; it is a text
//! heuristic and can be replaced by any other [`Classifier`].

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use super::event::OperationKind;
use crate::git::reflog;

/// Strategy for inferring the operation behind a HEAD move
pub trait Classifier: Send + Sync + 'static {
    /// Classify the most recent operation in the repository at `repo_root`.
    /// Never fails: anything that goes wrong yields `Unknown`.
    fn classify(&self, repo_root: &Path) -> impl Future<Output = OperationKind> + Send;
}

/// Keywords checked in this order; the first one found wins regardless of
/// where it appears in the entry
const KEYWORDS: &[(&str, OperationKind)] = &[
    ("pull", OperationKind::Pull),
    ("merge", OperationKind::Merge),
    ("checkout", OperationKind::Checkout),
    ("commit", OperationKind::Commit),
    ("rebase", OperationKind::Rebase),
];

/// Classify a reflog entry such as `4f2a1c9 HEAD@{0}: pull: Fast-forward`.
///
/// A keyword only counts when followed by `:` or a space. Matching is
/// case-sensitive.
pub fn classify_entry(entry: &str) -> OperationKind {
    KEYWORDS
        .iter()
        .find(|(keyword, _)| contains_keyword(entry, keyword))
        .map(|&(_, kind)| kind)
        .unwrap_or(OperationKind::Unknown)
}

fn contains_keyword(entry: &str, keyword: &str) -> bool {
    entry
        .match_indices(keyword)
        .any(|(at, _)| matches!(entry[at + keyword.len()..].chars().next(), Some(':' | ' ')))
}

/// Classifies by running `git reflog -n 1` in the repository
#[derive(Debug, Clone)]
pub struct ReflogClassifier {
    timeout: Duration,
}

impl ReflogClassifier {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Classifier for ReflogClassifier {
    async fn classify(&self, repo_root: &Path) -> OperationKind {
        match reflog::latest_entry(repo_root, self.timeout).await {
            Ok(entry) => {
                let kind = classify_entry(&entry);
                if kind == OperationKind::Unknown {
                    debug!(entry = %entry, "no known operation in reflog entry");
                }
                kind
            }
            Err(err) => {
                warn!(repo = %repo_root.display(), error = %err, "failed to classify git operation");
                OperationKind::Unknown
            }
        }
    }
}
