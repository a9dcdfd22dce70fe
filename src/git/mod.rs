//! Git operations module
//!
//! Provides functionality for interacting with git repositories:
//! - Repository discovery and HEAD resolution
//! - Patch text between two revisions, file contents at a revision
//! - Latest reflog entry lookup

pub(crate) mod diff;
pub mod reflog;
mod repository;

pub use repository::{GitRepository, RepoId, Repository, Revision};
