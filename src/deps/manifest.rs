//! Manifest reading
//!
//! Parses `package.json`-style manifests into per-field dependency maps.
//! Every failure (missing file, bad JSON, permissions) yields `None`
//! rather than an error.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Dependency sections of a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Dependencies,
    DevDependencies,
    PeerDependencies,
    OptionalDependencies,
}

impl FieldKind {
    /// Key of this section inside the manifest document
    pub fn key(self) -> &'static str {
        match self {
            FieldKind::Dependencies => "dependencies",
            FieldKind::DevDependencies => "devDependencies",
            FieldKind::PeerDependencies => "peerDependencies",
            FieldKind::OptionalDependencies => "optionalDependencies",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Package name to version requirement, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyMap {
    entries: IndexMap<String, String>,
}

impl DependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry. A replaced entry keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, version: impl Into<String>) {
        self.entries.insert(name.into(), version.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DependencyMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Dependency sections found in one manifest.
///
/// A section missing from the document is missing here too, so callers can
/// tell "no such field" apart from "field present but empty".
pub type ManifestFields = BTreeMap<FieldKind, DependencyMap>;

/// Read and parse a manifest from disk
pub fn read_manifest(path: &Path, fields: &[FieldKind]) -> Option<ManifestFields> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read manifest");
            return None;
        }
    };

    parse_manifest(&content, fields).or_else(|| {
        warn!(path = %path.display(), "manifest is not a JSON object");
        None
    })
}

/// Parse manifest text, keeping only the requested sections
pub fn parse_manifest(content: &str, fields: &[FieldKind]) -> Option<ManifestFields> {
    let document: Value = match serde_json::from_str(content) {
        Ok(doc) => doc,
        Err(err) => {
            debug!(error = %err, "manifest parse failed");
            return None;
        }
    };
    let object = document.as_object()?;

    let mut result = ManifestFields::new();
    for &field in fields {
        let Some(section) = object.get(field.key()).and_then(Value::as_object) else {
            continue;
        };

        let mut map = DependencyMap::new();
        for (name, version) in section {
            match version.as_str() {
                Some(version) => map.insert(name.as_str(), version),
                None => debug!(field = %field, package = %name, "skipping non-string version"),
            }
        }
        result.insert(field, map);
    }

    Some(result)
}

/// Check whether `folder` contains anything matching one of `patterns`
pub fn has_dependency_files(folder: &Path, patterns: &[String]) -> bool {
    let base = glob::Pattern::escape(&folder.to_string_lossy());

    for pattern in patterns {
        let full = format!("{}/{}", base.trim_end_matches('/'), pattern);
        match glob::glob(&full) {
            Ok(mut paths) => {
                if paths.any(|entry| entry.is_ok()) {
                    return true;
                }
            }
            Err(err) => {
                warn!(pattern = %pattern, error = %err, "invalid monitored file pattern");
            }
        }
    }

    false
}
