//! Revision diffs and blob access
//!
//! Computes patch text for a path between two revisions and loads file
//! contents as they were at a given revision.

use std::path::Path;

use git2::{Delta, Diff, DiffDelta, DiffFormat, DiffOptions, Repository, Tree};

use crate::error::Result;

/// Patch text for files matching `pathspec` between two revisions.
///
/// Returns an empty string when nothing matching changed. Files that exist
/// at only one end of the range contribute nothing: only modifications are
/// reported.
pub fn diff_between_revisions(
    repo_path: &Path,
    old_rev: &str,
    new_rev: &str,
    pathspec: &str,
    context_lines: u32,
) -> Result<String> {
    let repo = Repository::open(repo_path)?;
    let diff = tree_diff(&repo, old_rev, new_rev, pathspec, context_lines)?;

    let mut patch = String::new();
    diff.print(DiffFormat::Patch, |delta, _hunk, line| {
        if !is_modification(&delta) {
            return true;
        }

        let origin = line.origin();
        if matches!(origin, '+' | '-' | ' ') {
            patch.push(origin);
        }
        patch.push_str(&String::from_utf8_lossy(line.content()));
        true
    })?;

    Ok(patch)
}

/// Paths matching `pathspec` modified between two revisions, relative to
/// the repository root. Same filtering as [`diff_between_revisions`].
pub fn changed_files(repo_path: &Path, old_rev: &str, new_rev: &str, pathspec: &str) -> Result<Vec<String>> {
    let repo = Repository::open(repo_path)?;
    let diff = tree_diff(&repo, old_rev, new_rev, pathspec, 0)?;

    Ok(diff
        .deltas()
        .filter(is_modification)
        .filter_map(|delta| delta.new_file().path().map(|p| p.to_string_lossy().into_owned()))
        .collect())
}

/// Text of `path` at `rev`, or `None` if the file does not exist there
/// or is not valid UTF-8
pub fn read_file_at(repo_path: &Path, rev: &str, path: &str) -> Result<Option<String>> {
    let repo = Repository::open(repo_path)?;
    let tree = resolve_tree(&repo, rev)?;
    Ok(load_tree_text(&repo, &tree, path))
}

fn tree_diff<'r>(
    repo: &'r Repository,
    old_rev: &str,
    new_rev: &str,
    pathspec: &str,
    context_lines: u32,
) -> Result<Diff<'r>> {
    let old_tree = resolve_tree(repo, old_rev)?;
    let new_tree = resolve_tree(repo, new_rev)?;

    let mut opts = DiffOptions::new();
    opts.pathspec(pathspec);
    opts.context_lines(context_lines);

    Ok(repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut opts))?)
}

fn is_modification(delta: &DiffDelta<'_>) -> bool {
    !matches!(delta.status(), Delta::Added | Delta::Deleted)
}

fn resolve_tree<'r>(repo: &'r Repository, rev: &str) -> Result<Tree<'r>> {
    Ok(repo.revparse_single(rev)?.peel_to_tree()?)
}

fn load_tree_text(repo: &Repository, tree: &Tree<'_>, path: &str) -> Option<String> {
    let entry = tree.get_path(Path::new(path)).ok()?;
    let object = entry.to_object(repo).ok()?;
    let blob = object.as_blob()?;
    std::str::from_utf8(blob.content()).ok().map(str::to_string)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::fs;
    use std::path::Path;

    use git2::{Oid, Repository, Signature};

    /// Write `files` into the work tree and commit them on HEAD
    pub fn commit_files(repo: &Repository, files: &[(&str, &str)], message: &str) -> Oid {
        let workdir = repo.workdir().unwrap().to_path_buf();
        let mut index = repo.index().unwrap();
        for (path, content) in files {
            let full = workdir.join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&full, content).unwrap();
            index.add_path(Path::new(path)).unwrap();
        }
        index.write().unwrap();

        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<_> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }
}
