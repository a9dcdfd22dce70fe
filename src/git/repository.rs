//! Repository handles
//!
//! The monitor only needs a small slice of a repository: an identity, a
//! root, the current HEAD and a revision diff query. `Repository` captures
//! that slice so the monitor can run against fakes in tests.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result as AnyResult};
use git2::Repository as Git2Repository;
use tracing::trace;

use super::diff;
use crate::error::Result;

/// Stable identity of a repository (its canonical work tree path)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoId(PathBuf);

impl RepoId {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A commit identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(String);

impl Revision {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form (7 characters) for display
    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The parts of a version-controlled repository the monitor depends on
pub trait Repository: Send + Sync + 'static {
    /// Identity used to key per-repository state
    fn id(&self) -> &RepoId;

    /// Root of the work tree
    fn root(&self) -> &Path;

    /// Current HEAD revision, `None` while it cannot be resolved
    /// (unborn branch, operation in progress)
    fn head(&self) -> Option<Revision>;

    /// Patch text for `path` between two revisions; empty when unchanged
    fn diff_between(
        &self,
        old: &Revision,
        new: &Revision,
        path: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// A repository on disk, accessed through libgit2
#[derive(Debug, Clone)]
pub struct GitRepository {
    id: RepoId,
    root: PathBuf,
    context_lines: u32,
}

impl GitRepository {
    /// Discover the repository enclosing `path`
    pub fn discover(path: &Path) -> AnyResult<Self> {
        let repo = Git2Repository::discover(path)
            .with_context(|| format!("Failed to discover git repository at {}", path.display()))?;

        let workdir = repo
            .workdir()
            .with_context(|| format!("Repository at {} has no work tree", path.display()))?;
        let root = workdir.canonicalize().unwrap_or_else(|_| workdir.to_path_buf());

        Ok(Self {
            id: RepoId::new(root.clone()),
            root,
            context_lines: 3,
        })
    }

    /// Path of the repository's git directory
    pub fn git_dir(&self) -> Result<PathBuf> {
        let repo = Git2Repository::open(&self.root)?;
        Ok(repo.path().to_path_buf())
    }

    /// Paths matching `pathspec` modified between two revisions
    pub fn changed_files(&self, old: &Revision, new: &Revision, pathspec: &str) -> Result<Vec<String>> {
        diff::changed_files(&self.root, old.as_str(), new.as_str(), pathspec)
    }

    /// Text of `path` at `rev`, `None` if absent at that revision
    pub fn read_file_at(&self, rev: &Revision, path: &str) -> Result<Option<String>> {
        diff::read_file_at(&self.root, rev.as_str(), path)
    }
}

impl Repository for GitRepository {
    fn id(&self) -> &RepoId {
        &self.id
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn head(&self) -> Option<Revision> {
        let repo = Git2Repository::open(&self.root).ok()?;
        let head = repo.head().ok()?;
        let oid = head.target()?;
        trace!(repo = %self.id, head = %oid, "resolved HEAD");
        Some(Revision::new(oid.to_string()))
    }

    async fn diff_between(&self, old: &Revision, new: &Revision, path: &str) -> Result<String> {
        let root = self.root.clone();
        let old = old.clone();
        let new = new.clone();
        let path = path.to_string();
        let context_lines = self.context_lines;

        tokio::task::spawn_blocking(move || {
            diff::diff_between_revisions(&root, old.as_str(), new.as_str(), &path, context_lines)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::diff::fixtures::commit_files;
    use tempfile::TempDir;

    #[test]
    fn test_revision_short() {
        let rev = Revision::new("abc1234567890");
        assert_eq!(rev.short(), "abc1234");
        assert_eq!(Revision::new("abc").short(), "abc");
    }

    #[test]
    fn test_discover_from_subdirectory() {
        let dir = TempDir::new().unwrap();
        Git2Repository::init(dir.path()).unwrap();
        let nested = dir.path().join("packages/app");
        std::fs::create_dir_all(&nested).unwrap();

        let repo = GitRepository::discover(&nested).unwrap();
        assert_eq!(repo.root(), dir.path().canonicalize().unwrap());
        assert_eq!(repo.id().path(), repo.root());
    }

    #[test]
    fn test_discover_outside_repository_fails() {
        let dir = TempDir::new().unwrap();
        assert!(GitRepository::discover(dir.path()).is_err());
    }

    #[test]
    fn test_head_unborn_then_committed() {
        let dir = TempDir::new().unwrap();
        let git = Git2Repository::init(dir.path()).unwrap();
        let repo = GitRepository::discover(dir.path()).unwrap();
        assert!(repo.head().is_none());

        let oid = commit_files(&git, &[("package.json", "{}")], "init");
        assert_eq!(repo.head(), Some(Revision::new(oid.to_string())));
    }

    #[tokio::test]
    async fn test_diff_between_runs_off_thread() {
        let dir = TempDir::new().unwrap();
        let git = Git2Repository::init(dir.path()).unwrap();
        let first = commit_files(&git, &[("package.json", "{\"a\":1}\n")], "init");
        let second = commit_files(&git, &[("package.json", "{\"a\":2}\n")], "bump");
        let repo = GitRepository::discover(dir.path()).unwrap();

        let patch = repo
            .diff_between(
                &Revision::new(first.to_string()),
                &Revision::new(second.to_string()),
                "package.json",
            )
            .await
            .unwrap();
        assert!(patch.contains("+{\"a\":2}"));
    }
}
