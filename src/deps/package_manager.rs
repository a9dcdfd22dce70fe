//! Package manager detection
//!
//! Picks the install command to suggest for a project from its lock files.

use std::fmt;
use std::path::Path;

/// Supported JavaScript package managers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Yarn,
    Pnpm,
}

/// Lock files checked in priority order
const LOCK_FILES: &[(&str, PackageManager)] = &[
    ("yarn.lock", PackageManager::Yarn),
    ("pnpm-lock.yaml", PackageManager::Pnpm),
    ("package-lock.json", PackageManager::Npm),
];

impl PackageManager {
    /// Detect the package manager for a project folder, defaulting to npm
    pub fn detect(folder: &Path) -> Self {
        LOCK_FILES
            .iter()
            .find(|(file, _)| folder.join(file).is_file())
            .map(|&(_, manager)| manager)
            .unwrap_or(PackageManager::Npm)
    }

    /// Command line that installs the project's dependencies
    pub fn install_command(self) -> &'static str {
        match self {
            PackageManager::Npm => "npm install",
            PackageManager::Yarn => "yarn",
            PackageManager::Pnpm => "pnpm install",
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PackageManager::Npm => "npm",
            PackageManager::Yarn => "yarn",
            PackageManager::Pnpm => "pnpm",
        };
        f.write_str(name)
    }
}
