//! Application wiring and run loop
//!
//! Discovers the repositories behind the configured workspaces, opens them
//! in the dispatcher, starts one watcher and one notification loop per
//! repository, and prints reports until interrupted.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::deps::manifest::read_manifest;
use crate::deps::has_dependency_files;
use crate::git::{GitRepository, RepoId, Repository};
use crate::monitor::{ChangeDetector, Dispatcher, EventBus, Outcome, ReflogClassifier};
use crate::report;
use crate::watcher::{self, RepoWatcher};

type GitDispatcher = Dispatcher<GitRepository, ReflogClassifier>;

/// Main application state
pub struct App {
    config: Config,
    workspaces: Vec<PathBuf>,
}

impl App {
    /// Create a new App instance
    pub fn new(config: Config, workspaces: Vec<PathBuf>) -> Self {
        Self { config, workspaces }
    }

    /// Run until Ctrl-C. With `once`, record baselines and return.
    pub async fn run(self, once: bool) -> Result<()> {
        if !self.config.enabled {
            info!("disabled by configuration");
            return Ok(());
        }

        let repos = self.discover_repositories();
        if repos.is_empty() {
            bail!("No git repositories with monitored files found in the given workspaces");
        }

        let bus = Arc::new(EventBus::new());
        let dispatcher: Arc<GitDispatcher> = Arc::new(Dispatcher::new(
            ReflogClassifier::new(self.config.classify_timeout()),
            ChangeDetector::new(self.config.monitored_files.clone(), self.config.diff_timeout()),
            self.config.git_operation_types.iter().copied(),
            Arc::clone(&bus),
        ));

        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let subscription = bus.subscribe(move |event| {
            report_tx
                .send(event.clone())
                .map_err(|_| anyhow!("report channel closed"))
        });
        let reporter = tokio::spawn(report::run(report_rx, self.config.dependency_fields.clone()));

        let mut watchers = Vec::new();
        let mut loops = JoinSet::new();
        for (repo, workspace) in repos {
            let id = repo.id().clone();
            let git_dir = repo
                .git_dir()
                .with_context(|| format!("Failed to locate git directory for {id}"))?;
            self.summarize(&workspace);
            dispatcher.open(Arc::new(repo), workspace);

            if once {
                continue;
            }

            let (notify_tx, notify_rx) = mpsc::unbounded_channel();
            match RepoWatcher::start(&git_dir, notify_tx) {
                Ok(watcher) => {
                    debug!(repo = %id, git_dir = %watcher.git_dir().display(), "watching git directory");
                    watchers.push(watcher);
                    loops.spawn(notification_loop(
                        Arc::clone(&dispatcher),
                        id,
                        notify_rx,
                        self.config.debounce(),
                    ));
                }
                Err(err) => {
                    warn!(repo = %id, error = %err, "cannot watch repository");
                    dispatcher.close(&id);
                }
            }
        }

        if !once {
            if loops.is_empty() {
                bail!("Failed to watch any repository");
            }
            println!(
                "Watching {} repositor{} for dependency changes (Ctrl-C to stop)",
                loops.len(),
                if loops.len() == 1 { "y" } else { "ies" }
            );
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("shutting down");
        }

        // In-flight dispatches see the disposed flag and emit nothing
        dispatcher.close_all();
        loops.shutdown().await;
        drop(watchers);

        bus.unsubscribe(subscription);
        reporter.await.context("Report task failed")?;
        Ok(())
    }

    /// Resolve workspaces to repositories, skipping folders without
    /// monitored files and folding workspaces that share a repository
    fn discover_repositories(&self) -> Vec<(GitRepository, PathBuf)> {
        let mut seen: HashSet<RepoId> = HashSet::new();
        let mut repos = Vec::new();

        for workspace in &self.workspaces {
            let workspace = workspace
                .canonicalize()
                .unwrap_or_else(|_| workspace.clone());

            if !has_dependency_files(&workspace, &self.config.monitored_files) {
                info!(workspace = %workspace.display(), "no monitored files, skipping");
                continue;
            }

            match GitRepository::discover(&workspace) {
                Ok(repo) => {
                    if seen.insert(repo.id().clone()) {
                        repos.push((repo, workspace));
                    } else {
                        debug!(workspace = %workspace.display(), "repository already watched");
                    }
                }
                Err(err) => warn!(workspace = %workspace.display(), error = %format!("{err:#}"), "skipping workspace"),
            }
        }

        repos
    }

    /// Log the dependencies currently declared in a workspace's manifests
    fn summarize(&self, workspace: &Path) {
        for pattern in &self.config.monitored_files {
            if glob::Pattern::escape(pattern) != *pattern {
                continue;
            }
            let Some(fields) = read_manifest(&workspace.join(pattern), &self.config.dependency_fields) else {
                continue;
            };
            for (field, deps) in &fields {
                info!(manifest = %pattern, field = %field, count = deps.len(), "current dependencies");
            }
        }
    }
}

/// Feed coalesced notifications for one repository into the dispatcher.
/// Runs until the watcher goes away or the repository is closed.
async fn notification_loop(
    dispatcher: Arc<GitDispatcher>,
    id: RepoId,
    mut notifications: UnboundedReceiver<()>,
    debounce: Duration,
) {
    while watcher::coalesce(&mut notifications, debounce).await {
        let outcome = dispatcher.notify(&id).await;
        debug!(repo = %id, ?outcome, "notification handled");
        if outcome == Outcome::NotOpen {
            break;
        }
    }
}
