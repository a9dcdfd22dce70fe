//! Structural dependency diff
//!
//! Compares two versions of a dependency section. Pure: the result depends
//! only on the inputs.

use super::manifest::{DependencyMap, FieldKind, ManifestFields};

/// A version change for a package present on both sides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionChange {
    pub old_version: String,
    pub new_version: String,
}

/// Differences between two versions of one dependency section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyFieldChanges {
    pub has_changes: bool,
    pub added: DependencyMap,
    pub removed: DependencyMap,
    /// Updated packages, in the order they appear in the new section
    pub updated: Vec<(String, VersionChange)>,
}

/// Diff two optional dependency sections.
///
/// `None` means the section is absent from the manifest, which differs from
/// an empty section only in that neither produces entries.
pub fn diff_fields(old: Option<&DependencyMap>, new: Option<&DependencyMap>) -> DependencyFieldChanges {
    match (old, new) {
        (None, None) => DependencyFieldChanges::default(),
        (None, Some(new)) => DependencyFieldChanges {
            has_changes: !new.is_empty(),
            added: new.clone(),
            ..Default::default()
        },
        (Some(old), None) => DependencyFieldChanges {
            has_changes: !old.is_empty(),
            removed: old.clone(),
            ..Default::default()
        },
        (Some(old), Some(new)) => {
            let mut changes = DependencyFieldChanges::default();

            for (name, version) in new.iter() {
                match old.get(name) {
                    None => changes.added.insert(name, version),
                    Some(old_version) if old_version != version => {
                        changes.updated.push((
                            name.to_string(),
                            VersionChange {
                                old_version: old_version.to_string(),
                                new_version: version.to_string(),
                            },
                        ));
                    }
                    Some(_) => {}
                }
            }

            for (name, version) in old.iter() {
                if !new.contains(name) {
                    changes.removed.insert(name, version);
                }
            }

            changes.has_changes =
                !changes.added.is_empty() || !changes.removed.is_empty() || !changes.updated.is_empty();
            changes
        }
    }
}

/// Diff every requested section of two optional manifests.
///
/// A missing manifest behaves as if every section were absent. Sections
/// without changes are still reported so output order follows `fields`.
pub fn diff_manifests(
    old: Option<&ManifestFields>,
    new: Option<&ManifestFields>,
    fields: &[FieldKind],
) -> Vec<(FieldKind, DependencyFieldChanges)> {
    fields
        .iter()
        .map(|&field| {
            let old_section = old.and_then(|m| m.get(&field));
            let new_section = new.and_then(|m| m.get(&field));
            (field, diff_fields(old_section, new_section))
        })
        .collect()
}
