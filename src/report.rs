//! Terminal reports for git operation events
//!
//! The default listener: for every changed manifest in an event, loads the
//! manifest at both revisions, diffs the dependency sections and prints a
//! coloured summary with an install hint.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use crossterm::style::{Color, Stylize, style};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

use crate::deps::{
    DependencyFieldChanges, FieldKind, ManifestFields, PackageManager, diff_manifests, parse_manifest,
};
use crate::git::{GitRepository, Revision};
use crate::monitor::GitOperationEvent;

/// Report palette
pub mod colors {
    use crossterm::style::Color;

    pub const ADDED: Color = Color::Rgb { r: 120, g: 200, b: 120 };
    pub const REMOVED: Color = Color::Rgb { r: 200, g: 120, b: 120 };
    pub const UPDATED: Color = Color::Rgb { r: 220, g: 190, b: 100 };
    pub const DIM: Color = Color::DarkGrey;
    pub const HEADER: Color = Color::White;
}

/// Dependency changes for one manifest file
#[derive(Debug, Clone)]
pub struct ManifestReport {
    /// Path relative to the repository root
    pub path: String,
    /// Directory an install would run in
    pub install_dir: PathBuf,
    pub manager: PackageManager,
    pub fields: Vec<(FieldKind, DependencyFieldChanges)>,
}

impl ManifestReport {
    pub fn has_changes(&self) -> bool {
        self.fields.iter().any(|(_, c)| c.has_changes)
    }
}

fn is_manifest(path: &str) -> bool {
    path.ends_with("package.json")
}

/// Build reports for every changed manifest in `event`. Blocking.
pub fn build_reports(event: &GitOperationEvent, fields: &[FieldKind]) -> Result<Vec<ManifestReport>> {
    let root = event.repository().path();
    let repo = GitRepository::discover(root)?;

    let mut reports: Vec<ManifestReport> = Vec::new();
    for record in event.changes().iter().filter(|r| r.changed) {
        let paths = repo
            .changed_files(event.previous(), event.current(), &record.pattern)
            .with_context(|| format!("Failed to list files changed under {}", record.pattern))?;

        for path in paths {
            if !is_manifest(&path) || reports.iter().any(|r| r.path == path) {
                continue;
            }

            let old = load_manifest(&repo, event.previous(), &path, fields)?;
            let new = load_manifest(&repo, event.current(), &path, fields)?;
            let install_dir = root
                .join(&path)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf());

            reports.push(ManifestReport {
                manager: PackageManager::detect(&install_dir),
                install_dir,
                fields: diff_manifests(old.as_ref(), new.as_ref(), fields),
                path,
            });
        }
    }

    Ok(reports)
}

fn load_manifest(
    repo: &GitRepository,
    rev: &Revision,
    path: &str,
    fields: &[FieldKind],
) -> Result<Option<ManifestFields>> {
    let content = repo
        .read_file_at(rev, path)
        .with_context(|| format!("Failed to read {path} at {}", rev.short()))?;
    Ok(content.and_then(|text| parse_manifest(&text, fields)))
}

/// Render an event and its manifest reports as terminal text
pub fn render(event: &GitOperationEvent, reports: &[ManifestReport]) -> String {
    let mut out = String::new();

    let time = event.timestamp().with_timezone(&Local).format("%H:%M:%S");
    out.push_str(&format!(
        "{} {} {} in {} {}\n",
        style(time).with(colors::DIM),
        style("●").with(colors::UPDATED),
        style(event.kind().to_string()).with(colors::HEADER).bold(),
        event.workspace().display(),
        style(format!("({} → {})", event.previous().short(), event.current().short())).with(colors::DIM),
    ));

    if reports.is_empty() {
        for record in event.changes().iter().filter(|r| r.changed) {
            out.push_str(&format!("  {} changed\n", record.pattern));
        }
        return out;
    }

    for report in reports {
        out.push_str(&format!("  {} changed\n", style(&report.path).bold()));
        if !report.has_changes() {
            out.push_str(&format!("    {}\n", style("no dependency changes").with(colors::DIM)));
            continue;
        }

        for (field, changes) in report.fields.iter().filter(|(_, c)| c.has_changes) {
            out.push_str(&format!("    {}\n", style(field).with(colors::DIM)));
            for (name, version) in changes.added.iter() {
                out.push_str(&line('+', colors::ADDED, name, version));
            }
            for (name, version) in changes.removed.iter() {
                out.push_str(&line('-', colors::REMOVED, name, version));
            }
            for (name, change) in &changes.updated {
                let versions = format!("{} → {}", change.old_version, change.new_version);
                out.push_str(&line('~', colors::UPDATED, name, &versions));
            }
        }

        out.push_str(&format!(
            "    run {} in {}\n",
            style(format!("`{}`", report.manager.install_command())).bold(),
            report.install_dir.display(),
        ));
    }

    out
}

fn line(marker: char, color: Color, name: &str, detail: &str) -> String {
    format!(
        "      {} {} {}\n",
        style(marker).with(color),
        style(name).with(color),
        style(detail).with(colors::DIM),
    )
}

/// Print a report for every event received until the channel closes
pub async fn run(mut events: UnboundedReceiver<GitOperationEvent>, fields: Vec<FieldKind>) {
    while let Some(event) = events.recv().await {
        let fields = fields.clone();
        let built = tokio::task::spawn_blocking(move || {
            let reports = build_reports(&event, &fields);
            (event, reports)
        })
        .await;

        match built {
            Ok((event, Ok(reports))) => {
                debug!(manifests = reports.len(), "rendering report");
                print!("{}", render(&event, &reports));
            }
            Ok((event, Err(err))) => {
                warn!(error = %err, "failed to build dependency report");
                print!("{}", render(&event, &[]));
            }
            Err(err) => warn!(error = %err, "report task failed"),
        }
    }
}
