//! Notification dispatch
//!
//! Turns repository state-change notifications into [`GitOperationEvent`]s.
//! Each notification runs the same pipeline: observe HEAD, classify the
//! operation, check monitored files, then emit if the operation is
//! allowed and something changed. Notifications for one repository are
//! processed one at a time; different repositories run independently.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{Instrument, Level, debug, info, span, warn};

use super::classifier::Classifier;
use super::detector::ChangeDetector;
use super::event::{EventBus, GitOperationEvent, OperationKind};
use super::tracker::StateTracker;
use crate::git::{RepoId, Repository};

/// How a notification was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The repository is not open
    NotOpen,
    /// HEAD did not move (or is unavailable, or this was the baseline)
    NoTransition,
    /// HEAD moved, but the operation is not in the allow-list
    Filtered(OperationKind),
    /// No monitored file changed, or the change query failed
    NoChanges,
    /// The repository was closed while the notification was in flight
    Discarded,
    /// An event was emitted; holds how many listeners accepted it
    Emitted(usize),
}

struct RepoSlot<R> {
    repo: Arc<R>,
    workspace: PathBuf,
    /// Serialises notifications for this repository
    gate: tokio::sync::Mutex<()>,
    disposed: AtomicBool,
}

/// Routes notifications for every open repository
pub struct Dispatcher<R, C> {
    tracker: StateTracker,
    classifier: C,
    detector: ChangeDetector,
    allowed: HashSet<OperationKind>,
    bus: Arc<EventBus>,
    repos: Mutex<HashMap<RepoId, Arc<RepoSlot<R>>>>,
}

impl<R: Repository, C: Classifier> Dispatcher<R, C> {
    pub fn new(
        classifier: C,
        detector: ChangeDetector,
        allowed: impl IntoIterator<Item = OperationKind>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            tracker: StateTracker::new(),
            classifier,
            detector,
            allowed: allowed.into_iter().collect(),
            bus,
            repos: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Start tracking a repository and record its current HEAD as baseline.
    ///
    /// Re-opening an already open repository replaces its slot.
    pub fn open(&self, repo: Arc<R>, workspace: PathBuf) {
        let id = repo.id().clone();
        let mut slots = self.slots();
        self.tracker.release(&id);
        self.tracker.observe(repo.as_ref());

        let slot = Arc::new(RepoSlot {
            repo,
            workspace,
            gate: tokio::sync::Mutex::new(()),
            disposed: AtomicBool::new(false),
        });

        if let Some(previous) = slots.insert(id.clone(), slot) {
            previous.disposed.store(true, Ordering::SeqCst);
        }
        drop(slots);

        match self.tracker.baseline(&id) {
            Some(head) => info!(repo = %id, baseline = %head.short(), "watching repository"),
            None => info!(repo = %id, "watching repository, HEAD not resolved yet"),
        }
    }

    /// Stop tracking a repository. Work already in flight finishes but
    /// emits nothing.
    pub fn close(&self, id: &RepoId) -> bool {
        let mut slots = self.slots();
        let Some(slot) = slots.remove(id) else {
            return false;
        };
        slot.disposed.store(true, Ordering::SeqCst);
        self.tracker.release(id);
        drop(slots);

        info!(repo = %id, "stopped watching repository");
        true
    }

    /// Close every open repository
    pub fn close_all(&self) {
        let ids: Vec<RepoId> = self.slots().keys().cloned().collect();
        for id in ids {
            self.close(&id);
        }
    }

    #[cfg(test)]
    pub fn is_open(&self, id: &RepoId) -> bool {
        self.slots().contains_key(id)
    }

    /// Process one state-change notification for `id`
    pub async fn notify(&self, id: &RepoId) -> Outcome {
        let Some(slot) = self.slots().get(id).cloned() else {
            debug!(repo = %id, "notification for unknown repository");
            return Outcome::NotOpen;
        };

        let span = span!(Level::DEBUG, "dispatch", repo = %id);
        self.process(slot).instrument(span).await
    }

    async fn process(&self, slot: Arc<RepoSlot<R>>) -> Outcome {
        let _guard = slot.gate.lock().await;
        if slot.disposed.load(Ordering::SeqCst) {
            return Outcome::Discarded;
        }

        let repo = Arc::clone(&slot.repo);
        let head = match tokio::task::spawn_blocking(move || repo.head()).await {
            Ok(head) => head,
            Err(err) => {
                warn!(error = %err, "failed to read HEAD");
                None
            }
        };
        let observed = self.tracker.observe_head(slot.repo.id(), head);
        if slot.disposed.load(Ordering::SeqCst) {
            // close() may have released the entry before this observation
            // re-recorded it; a re-opened slot owns its own baseline
            let slots = self.slots();
            if !slots.contains_key(slot.repo.id()) {
                self.tracker.release(slot.repo.id());
            }
            debug!("repository closed while reading HEAD");
            return Outcome::Discarded;
        }
        let Some(transition) = observed else {
            return Outcome::NoTransition;
        };

        let kind = self.classifier.classify(slot.repo.root()).await;
        if !self.allowed.contains(&kind) {
            debug!(operation = %kind, "operation not monitored");
            return Outcome::Filtered(kind);
        }

        let Some(changes) = self
            .detector
            .detect(&slot.repo, transition.previous(), transition.current())
            .await
        else {
            return Outcome::NoChanges;
        };
        if !changes.iter().any(|c| c.changed) {
            debug!(operation = %kind, "no monitored files changed");
            return Outcome::NoChanges;
        }

        if slot.disposed.load(Ordering::SeqCst) {
            debug!("repository closed during dispatch, dropping event");
            return Outcome::Discarded;
        }

        let event = GitOperationEvent::new(
            kind,
            transition,
            slot.repo.id().clone(),
            slot.workspace.clone(),
            changes,
        );
        info!(
            operation = %kind,
            from = %event.previous().short(),
            to = %event.current().short(),
            "monitored files changed"
        );
        Outcome::Emitted(self.bus.emit(&event))
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<RepoId, Arc<RepoSlot<R>>>> {
        self.repos.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::detector::fakes::FakeRepo;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Returns a fixed kind after an optional delay, counting calls
    struct FakeClassifier {
        kind: OperationKind,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FakeClassifier {
        fn new(kind: OperationKind) -> Self {
            Self {
                kind,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Classifier for FakeClassifier {
        async fn classify(&self, _repo_root: &Path) -> OperationKind {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.kind
        }
    }

    fn dispatcher(classifier: FakeClassifier) -> Dispatcher<FakeRepo, FakeClassifier> {
        Dispatcher::new(
            classifier,
            ChangeDetector::new(vec!["package.json".to_string()], Duration::from_secs(5)),
            [OperationKind::Pull, OperationKind::Merge, OperationKind::Rebase],
            Arc::new(EventBus::new()),
        )
    }

    fn recording(bus: &EventBus) -> Arc<Mutex<Vec<GitOperationEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(move |event| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });
        seen
    }

    fn open_repo(d: &Dispatcher<FakeRepo, FakeClassifier>, head: &str) -> Arc<FakeRepo> {
        let repo = Arc::new(FakeRepo::new("/repo"));
        repo.set_head(head);
        d.open(Arc::clone(&repo), PathBuf::from("/repo"));
        repo
    }

    #[tokio::test]
    async fn test_emits_for_allowed_operation_with_changes() {
        let d = dispatcher(FakeClassifier::new(OperationKind::Pull));
        let seen = recording(d.bus());
        let repo = open_repo(&d, "aaa");

        repo.set_head("bbb");
        repo.set_diff("package.json", "+  \"axios\": \"^0.21.1\"");

        assert_eq!(d.notify(repo.id()).await, Outcome::Emitted(1));

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.kind(), OperationKind::Pull);
        assert_eq!(event.previous().as_str(), "aaa");
        assert_eq!(event.current().as_str(), "bbb");
        assert_eq!(event.workspace(), Path::new("/repo"));
        assert!(event.changes()[0].changed);
    }

    #[tokio::test]
    async fn test_first_observation_never_emits() {
        let d = dispatcher(FakeClassifier::new(OperationKind::Pull));
        let seen = recording(d.bus());
        let repo = open_repo(&d, "aaa");
        repo.set_diff("package.json", "+x");

        assert_eq!(d.notify(repo.id()).await, Outcome::NoTransition);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unborn_head_seeds_on_first_resolvable_notification() {
        let d = dispatcher(FakeClassifier::new(OperationKind::Pull));
        let repo = Arc::new(FakeRepo::new("/repo"));
        d.open(Arc::clone(&repo), PathBuf::from("/repo"));
        repo.set_diff("package.json", "+x");

        repo.set_head("aaa");
        assert_eq!(d.notify(repo.id()).await, Outcome::NoTransition);
        repo.set_head("bbb");
        assert_eq!(d.notify(repo.id()).await, Outcome::Emitted(0));
    }

    #[tokio::test]
    async fn test_duplicate_notifications_emit_once() {
        let d = dispatcher(FakeClassifier::new(OperationKind::Merge));
        let seen = recording(d.bus());
        let repo = open_repo(&d, "aaa");
        repo.set_head("bbb");
        repo.set_diff("package.json", "+x");

        assert_eq!(d.notify(repo.id()).await, Outcome::Emitted(1));
        assert_eq!(d.notify(repo.id()).await, Outcome::NoTransition);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_notifications_are_serialised() {
        let mut classifier = FakeClassifier::new(OperationKind::Pull);
        classifier.delay = Duration::from_millis(20);
        let d = Arc::new(dispatcher(classifier));
        let seen = recording(d.bus());
        let repo = open_repo(&d, "aaa");
        repo.set_head("bbb");
        repo.set_diff("package.json", "+x");

        let first = tokio::spawn({
            let d = Arc::clone(&d);
            let id = repo.id().clone();
            async move { d.notify(&id).await }
        });
        let second = tokio::spawn({
            let d = Arc::clone(&d);
            let id = repo.id().clone();
            async move { d.notify(&id).await }
        });

        let mut outcomes = vec![first.await.unwrap(), second.await.unwrap()];
        outcomes.sort_by_key(|o| matches!(o, Outcome::Emitted(_)));
        assert_eq!(outcomes, vec![Outcome::NoTransition, Outcome::Emitted(1)]);
        assert_eq!(d.classifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disallowed_operation_is_filtered() {
        let d = dispatcher(FakeClassifier::new(OperationKind::Checkout));
        let seen = recording(d.bus());
        let repo = open_repo(&d, "aaa");
        repo.set_head("bbb");
        repo.set_diff("package.json", "+x");

        assert_eq!(
            d.notify(repo.id()).await,
            Outcome::Filtered(OperationKind::Checkout)
        );
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_manifest_does_not_emit() {
        let d = dispatcher(FakeClassifier::new(OperationKind::Pull));
        let seen = recording(d.bus());
        let repo = open_repo(&d, "aaa");
        repo.set_head("bbb");
        repo.set_diff("package.json", "");

        assert_eq!(d.notify(repo.id()).await, Outcome::NoChanges);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_detection_does_not_emit() {
        let d = dispatcher(FakeClassifier::new(OperationKind::Pull));
        let repo = open_repo(&d, "aaa");
        repo.set_head("bbb");
        repo.fail_diff("package.json");

        assert_eq!(d.notify(repo.id()).await, Outcome::NoChanges);
        // The transition is consumed; the next move is judged on its own
        repo.set_head("ccc");
        assert_eq!(d.notify(repo.id()).await, Outcome::NoChanges);
    }

    #[tokio::test]
    async fn test_close_during_dispatch_discards_event() {
        let mut classifier = FakeClassifier::new(OperationKind::Pull);
        classifier.delay = Duration::from_millis(50);
        let d = Arc::new(dispatcher(classifier));
        let seen = recording(d.bus());
        let repo = open_repo(&d, "aaa");
        repo.set_head("bbb");
        repo.set_diff("package.json", "+x");

        let pending = tokio::spawn({
            let d = Arc::clone(&d);
            let id = repo.id().clone();
            async move { d.notify(&id).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(d.close(repo.id()));

        assert_eq!(pending.await.unwrap(), Outcome::Discarded);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(d.notify(repo.id()).await, Outcome::NotOpen);
    }

    #[tokio::test]
    async fn test_close_during_head_read_leaves_no_baseline() {
        let d = Arc::new(dispatcher(FakeClassifier::new(OperationKind::Pull)));
        let repo = open_repo(&d, "aaa");
        repo.set_head("bbb");
        let (entered, release) = repo.hold_next_head();

        let pending = tokio::spawn({
            let d = Arc::clone(&d);
            let id = repo.id().clone();
            async move { d.notify(&id).await }
        });
        tokio::task::spawn_blocking(move || entered.recv().unwrap())
            .await
            .unwrap();
        assert!(d.close(repo.id()));
        release.send(()).unwrap();

        assert_eq!(pending.await.unwrap(), Outcome::Discarded);
        assert_eq!(d.tracker.baseline(repo.id()), None);
    }

    #[tokio::test]
    async fn test_reopen_sets_fresh_baseline() {
        let d = dispatcher(FakeClassifier::new(OperationKind::Pull));
        let repo = open_repo(&d, "aaa");
        repo.set_diff("package.json", "+x");
        d.close(repo.id());

        repo.set_head("bbb");
        d.open(Arc::clone(&repo), PathBuf::from("/repo"));
        assert_eq!(d.notify(repo.id()).await, Outcome::NoTransition);
    }

    #[tokio::test]
    async fn test_repositories_do_not_block_each_other() {
        let d = dispatcher(FakeClassifier::new(OperationKind::Pull));
        let a = Arc::new(FakeRepo::new("/a"));
        let b = Arc::new(FakeRepo::new("/b"));
        a.set_head("1");
        b.set_head("1");
        d.open(Arc::clone(&a), PathBuf::from("/a"));
        d.open(Arc::clone(&b), PathBuf::from("/b"));
        a.set_head("2");
        a.set_diff("package.json", "+x");

        assert_eq!(d.notify(b.id()).await, Outcome::NoTransition);
        assert_eq!(d.notify(a.id()).await, Outcome::Emitted(0));
        d.close_all();
        assert!(!d.is_open(a.id()));
        assert!(!d.is_open(b.id()));
    }
}
