//! Dependency manifest handling
//!
//! - Manifest parsing into per-field dependency maps
//! - Structural diff between two versions of a manifest
//! - Package manager detection for install hints

pub mod diff;
pub mod manifest;
mod package_manager;

pub use diff::{DependencyFieldChanges, diff_manifests};
pub use manifest::{FieldKind, ManifestFields, has_dependency_files, parse_manifest};
pub use package_manager::PackageManager;
