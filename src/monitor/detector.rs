//! Monitored file change detection
//!
//! Queries the revision diff for every monitored pattern concurrently.
//! The batch is all-or-nothing: one failed or timed-out query makes the
//! whole result `None`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::event::ChangeRecord;
use crate::git::{Repository, Revision};

/// Checks monitored patterns for content changes between two revisions
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    patterns: Vec<String>,
    timeout: Duration,
}

impl ChangeDetector {
    pub fn new(patterns: Vec<String>, timeout: Duration) -> Self {
        Self { patterns, timeout }
    }

    /// One record per pattern, in pattern order, or `None` if any query
    /// failed. Callers treat `None` exactly like "nothing changed".
    pub async fn detect<R: Repository>(
        &self,
        repo: &Arc<R>,
        previous: &Revision,
        current: &Revision,
    ) -> Option<Vec<ChangeRecord>> {
        let mut queries = JoinSet::new();
        for (index, pattern) in self.patterns.iter().enumerate() {
            let repo = Arc::clone(repo);
            let previous = previous.clone();
            let current = current.clone();
            let pattern = pattern.clone();
            queries.spawn(async move {
                let result = repo.diff_between(&previous, &current, &pattern).await;
                (index, result)
            });
        }

        let collect = async {
            let mut contents: Vec<Option<String>> = vec![None; self.patterns.len()];
            while let Some(joined) = queries.join_next().await {
                let (index, result) = match joined {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(repo = %repo.id(), error = %err, "diff query task failed");
                        return None;
                    }
                };
                match result {
                    Ok(content) => contents[index] = Some(content),
                    Err(err) => {
                        warn!(
                            repo = %repo.id(),
                            pattern = %self.patterns[index],
                            error = %err,
                            "diff query failed"
                        );
                        return None;
                    }
                }
            }
            contents.into_iter().collect::<Option<Vec<String>>>()
        };

        let contents = match tokio::time::timeout(self.timeout, collect).await {
            Ok(contents) => contents?,
            Err(_) => {
                warn!(repo = %repo.id(), timeout = ?self.timeout, "diff queries timed out");
                return None;
            }
        };

        let records: Vec<ChangeRecord> = self
            .patterns
            .iter()
            .zip(contents)
            .map(|(pattern, content)| ChangeRecord::new(pattern.as_str(), content))
            .collect();

        debug!(
            repo = %repo.id(),
            changed = records.iter().filter(|r| r.changed).count(),
            total = records.len(),
            "checked monitored files"
        );
        Some(records)
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::time::Duration;

    use crate::error::{Error, Result};
    use crate::git::{RepoId, Repository, Revision};

    /// In-memory repository with scripted HEAD and diff answers
    pub struct FakeRepo {
        id: RepoId,
        root: PathBuf,
        head: Mutex<Option<Revision>>,
        diffs: Mutex<HashMap<String, String>>,
        failing: Mutex<Vec<String>>,
        delay: Duration,
        head_hold: Mutex<Option<(Sender<()>, Receiver<()>)>>,
    }

    impl FakeRepo {
        pub fn new(root: &str) -> Self {
            Self {
                id: RepoId::new(root),
                root: PathBuf::from(root),
                head: Mutex::new(None),
                diffs: Mutex::new(HashMap::new()),
                failing: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
                head_hold: Mutex::new(None),
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn set_head(&self, rev: &str) {
            *self.head.lock().unwrap() = Some(Revision::new(rev));
        }

        pub fn set_diff(&self, pattern: &str, content: &str) {
            self.diffs
                .lock()
                .unwrap()
                .insert(pattern.to_string(), content.to_string());
        }

        pub fn fail_diff(&self, pattern: &str) {
            self.failing.lock().unwrap().push(pattern.to_string());
        }

        /// Make the next `head()` call signal `entered` and then block until
        /// `release` is sent
        pub fn hold_next_head(&self) -> (Receiver<()>, Sender<()>) {
            let (entered_tx, entered_rx) = mpsc::channel();
            let (release_tx, release_rx) = mpsc::channel();
            *self.head_hold.lock().unwrap() = Some((entered_tx, release_rx));
            (entered_rx, release_tx)
        }
    }

    impl Repository for FakeRepo {
        fn id(&self) -> &RepoId {
            &self.id
        }

        fn root(&self) -> &Path {
            &self.root
        }

        fn head(&self) -> Option<Revision> {
            let hold = self.head_hold.lock().unwrap().take();
            if let Some((entered, release)) = hold {
                entered.send(()).unwrap();
                release.recv().unwrap();
            }
            self.head.lock().unwrap().clone()
        }

        async fn diff_between(&self, _old: &Revision, _new: &Revision, path: &str) -> Result<String> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.failing.lock().unwrap().iter().any(|p| p == path) {
                return Err(Error::Io(std::io::Error::other("diff failed")));
            }
            Ok(self.diffs.lock().unwrap().get(path).cloned().unwrap_or_default())
        }
    }
}
