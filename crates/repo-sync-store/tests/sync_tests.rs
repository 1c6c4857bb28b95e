use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use repo_sync::test_support::{InMemoryFetcher, gems};
use repo_sync::{
    CommitOutcome, ContentUnit, ErrorKind, FetchError, InMemoryVersionStore, Modification,
    Provenance, RemoteDescriptor, RepositoryId, RepositoryVersion, RetryPolicy, StoreError,
    SyncConfig, SyncEngine, SyncError, SyncOptions, SyncState, VersionDelta, VersionStore, modify,
};
use repo_sync_store::SqliteVersionStore;

fn backends() -> Vec<(&'static str, Arc<dyn VersionStore>)> {
    vec![
        ("memory", Arc::new(InMemoryVersionStore::new())),
        ("sqlite", Arc::new(SqliteVersionStore::open_in_memory().unwrap())),
    ]
}

fn remote() -> RemoteDescriptor {
    RemoteDescriptor::new("fixture", "memory://fixture")
}

fn create_repo(store: &dyn VersionStore) -> RepositoryId {
    let id = RepositoryId::new("gems");
    store.create_repository(&id).unwrap();
    id
}

fn unit_set(names: &[&str]) -> BTreeSet<ContentUnit> {
    gems(names).into_iter().collect()
}

fn fast_retries(max_attempts: u32) -> SyncConfig {
    SyncConfig {
        retry: RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5)),
        fetch_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn initial_sync_adds_every_remote_unit() {
    for (backend, store) in backends() {
        let id = create_repo(store.as_ref());
        let fetcher = Arc::new(InMemoryFetcher::new("mem", gems(&["u1", "u2", "u3"])));
        let engine = SyncEngine::new(store.clone(), fetcher);

        let result = engine
            .sync(&id, &remote(), SyncOptions::default())
            .await
            .unwrap()
            .result;

        assert!(result.version_created, "{backend}");
        assert_eq!(result.base_version, 0, "{backend}");
        assert_eq!(result.latest_version, 1, "{backend}");
        assert_eq!(result.added, unit_set(&["u1", "u2", "u3"]), "{backend}");
        assert!(result.removed.is_empty(), "{backend}");
        assert_eq!(store.latest(&id).unwrap().content, unit_set(&["u1", "u2", "u3"]));
    }
}

#[tokio::test]
async fn resync_with_unchanged_remote_is_a_no_op() {
    for (backend, store) in backends() {
        let id = create_repo(store.as_ref());
        let fetcher = Arc::new(InMemoryFetcher::new("mem", gems(&["u1", "u2", "u3"])));
        let engine = SyncEngine::new(store.clone(), fetcher);

        let first = engine
            .sync(&id, &remote(), SyncOptions::default())
            .await
            .unwrap()
            .result;
        let second = engine
            .sync(&id, &remote(), SyncOptions::default())
            .await
            .unwrap()
            .result;

        assert!(!second.version_created, "{backend}");
        assert_eq!(second.latest_version, first.latest_version, "{backend}");
        assert!(second.added.is_empty(), "{backend}");
        assert!(second.removed.is_empty(), "{backend}");
        assert_eq!(second.summary, first.summary, "{backend}");
        assert_eq!(second.summary.present.get("gem"), Some(&3), "{backend}");
        assert_eq!(second.summary.added.get("gem"), Some(&3), "{backend}");
        assert_eq!(store.versions(&id).unwrap(), vec![0, 1], "{backend}");
    }
}

#[tokio::test]
async fn upstream_removal_creates_new_version() {
    for (backend, store) in backends() {
        let id = create_repo(store.as_ref());
        let fetcher = Arc::new(InMemoryFetcher::new("mem", gems(&["u1", "u2", "u3"])));
        let engine = SyncEngine::new(store.clone(), fetcher.clone());
        engine.sync(&id, &remote(), SyncOptions::default()).await.unwrap();

        fetcher.set_units(gems(&["u1", "u2"]));
        let result = engine
            .sync(&id, &remote(), SyncOptions::default())
            .await
            .unwrap()
            .result;

        assert!(result.version_created, "{backend}");
        assert_eq!(result.latest_version, 2, "{backend}");
        assert!(result.added.is_empty(), "{backend}");
        assert_eq!(result.removed, unit_set(&["u3"]), "{backend}");
        assert_eq!(result.summary.removed.get("gem"), Some(&1), "{backend}");
        assert_eq!(store.latest(&id).unwrap().content, unit_set(&["u1", "u2"]));
    }
}

#[tokio::test]
async fn unreachable_remote_fails_and_leaves_repository_untouched() {
    for (backend, store) in backends() {
        let id = create_repo(store.as_ref());
        let fetcher = Arc::new(InMemoryFetcher::new("mem", gems(&["u1"])));
        let engine = SyncEngine::new(store.clone(), fetcher.clone());
        engine.sync(&id, &remote(), SyncOptions::default()).await.unwrap();

        fetcher.set_failure(Some(FetchError::Unreachable(
            "dns error: i-am-an-invalid-url.com".into(),
        )));
        let report = engine.run(&id, &remote(), SyncOptions::default()).await;

        assert!(report.is_failed(), "{backend}");
        let error = report.error().unwrap();
        assert_eq!(error.kind, ErrorKind::RemoteUnreachable, "{backend}");
        assert!(!error.description.is_empty(), "{backend}");
        assert!(error.description.contains("i-am-an-invalid-url"), "{backend}");
        assert_eq!(store.latest(&id).unwrap().number, 1, "{backend}");
    }
}

#[tokio::test]
async fn malformed_remote_fails_without_partial_version() {
    for (backend, store) in backends() {
        let id = create_repo(store.as_ref());
        let fetcher = InMemoryFetcher::new("mem", gems(&["u1"]))
            .failing(FetchError::Malformed("expected a JSON array".into()));
        let engine = SyncEngine::new(store.clone(), Arc::new(fetcher));

        let report = engine.run(&id, &remote(), SyncOptions::default()).await;

        assert_eq!(report.error().unwrap().kind, ErrorKind::RemoteMalformed, "{backend}");
        assert_eq!(store.versions(&id).unwrap(), vec![0], "{backend}");
    }
}

#[tokio::test]
async fn additive_sync_keeps_units_missing_upstream() {
    for (backend, store) in backends() {
        let id = create_repo(store.as_ref());
        let fetcher = Arc::new(InMemoryFetcher::new("mem", gems(&["u1", "u2"])));
        let engine = SyncEngine::new(store.clone(), fetcher.clone());
        engine.sync(&id, &remote(), SyncOptions::default()).await.unwrap();

        fetcher.set_units(gems(&["u3"]));
        let result = engine
            .sync(&id, &remote(), SyncOptions::additive())
            .await
            .unwrap()
            .result;

        assert_eq!(result.added, unit_set(&["u3"]), "{backend}");
        assert!(result.removed.is_empty(), "{backend}");
        assert_eq!(
            store.latest(&id).unwrap().content,
            unit_set(&["u1", "u2", "u3"]),
            "{backend}"
        );
    }
}

#[tokio::test]
async fn every_version_follows_from_its_predecessor() {
    let listings: [&[&str]; 5] = [
        &["a", "b", "c"],
        &["b", "c", "d"],
        &["b", "c", "d"],
        &[],
        &["a", "e"],
    ];

    for (backend, store) in backends() {
        let id = create_repo(store.as_ref());
        let fetcher = Arc::new(InMemoryFetcher::new("mem", []));
        let engine = SyncEngine::new(store.clone(), fetcher.clone());

        for listing in listings {
            fetcher.set_units(gems(listing));
            engine.sync(&id, &remote(), SyncOptions::default()).await.unwrap();
        }

        let numbers = store.versions(&id).unwrap();
        assert_eq!(numbers, vec![0, 1, 2, 3, 4], "{backend}");

        for pair in numbers.windows(2) {
            let previous = store.version(&id, pair[0]).unwrap();
            let current = store.version(&id, pair[1]).unwrap();
            let delta = store.delta(&id, pair[1]).unwrap();

            assert!(delta.added.is_disjoint(&previous.content), "{backend}");
            assert!(delta.removed.is_subset(&previous.content), "{backend}");
            assert!(!(delta.added.is_empty() && delta.removed.is_empty()), "{backend}");
            assert_eq!(
                previous.apply(&delta.added, &delta.removed),
                current.content,
                "{backend}"
            );
        }

        assert_eq!(store.latest(&id).unwrap().content, unit_set(&["a", "e"]));
    }
}

/// A store that lets another writer slip in a version before each of the
/// first `interlopers` commits.
struct ContendedStore {
    inner: InMemoryVersionStore,
    interlopers: AtomicU32,
}

impl ContendedStore {
    fn new(interlopers: u32) -> Self {
        Self {
            inner: InMemoryVersionStore::new(),
            interlopers: AtomicU32::new(interlopers),
        }
    }

    fn arm(&self, interlopers: u32) {
        self.interlopers.store(interlopers, Ordering::SeqCst);
    }
}

impl VersionStore for ContendedStore {
    fn create_repository(&self, id: &RepositoryId) -> Result<RepositoryVersion, StoreError> {
        self.inner.create_repository(id)
    }

    fn repositories(&self) -> Result<Vec<RepositoryId>, StoreError> {
        self.inner.repositories()
    }

    fn latest(&self, id: &RepositoryId) -> Result<RepositoryVersion, StoreError> {
        self.inner.latest(id)
    }

    fn version(&self, id: &RepositoryId, number: u64) -> Result<RepositoryVersion, StoreError> {
        self.inner.version(id, number)
    }

    fn versions(&self, id: &RepositoryId) -> Result<Vec<u64>, StoreError> {
        self.inner.versions(id)
    }

    fn delta(&self, id: &RepositoryId, number: u64) -> Result<VersionDelta, StoreError> {
        self.inner.delta(id, number)
    }

    fn commit(
        &self,
        id: &RepositoryId,
        base: &RepositoryVersion,
        added: &BTreeSet<ContentUnit>,
        removed: &BTreeSet<ContentUnit>,
        provenance: Option<Provenance>,
    ) -> Result<CommitOutcome, StoreError> {
        let remaining = self.interlopers.load(Ordering::SeqCst);
        if remaining > 0 {
            self.interlopers.store(remaining - 1, Ordering::SeqCst);
            let latest = self.inner.latest(id)?;
            let interloper =
                BTreeSet::from([ContentUnit::gem(format!("interloper-{remaining}"), "1.0.0")]);
            self.inner
                .commit(id, &latest, &interloper, &BTreeSet::new(), None)?;
        }
        self.inner.commit(id, base, added, removed, provenance)
    }
}

#[tokio::test]
async fn concurrent_modification_is_retried() {
    let store = Arc::new(ContendedStore::new(1));
    let id = create_repo(store.as_ref());
    let fetcher = Arc::new(InMemoryFetcher::new("mem", gems(&["u1", "u2"])));
    let calls = fetcher.calls();
    let engine = SyncEngine::new(store.clone(), fetcher).with_config(fast_retries(3));

    let outcome = engine
        .sync(&id, &remote(), SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.result.attempts, 2);
    assert_eq!(outcome.result.base_version, 1);
    assert_eq!(outcome.result.latest_version, 2);
    assert_eq!(outcome.result.removed, unit_set(&["interloper-1"]));
    assert_eq!(store.latest(&id).unwrap().content, unit_set(&["u1", "u2"]));
    // The listing is reused across attempts.
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn no_op_sync_against_superseded_version_is_retried() {
    let store = Arc::new(ContendedStore::new(0));
    let id = create_repo(store.as_ref());
    let fetcher = Arc::new(InMemoryFetcher::new("mem", gems(&["u1"])));
    let engine = SyncEngine::new(store.clone(), fetcher).with_config(fast_retries(3));
    engine.sync(&id, &remote(), SyncOptions::default()).await.unwrap();

    // The listing matches v1, but another writer lands v2 before the commit.
    store.arm(1);
    let result = engine
        .sync(&id, &remote(), SyncOptions::default())
        .await
        .unwrap()
        .result;

    assert_eq!(result.attempts, 2);
    assert_eq!(result.base_version, 2);
    assert_eq!(result.latest_version, 3);
    assert!(result.version_created);
    assert_eq!(result.removed, unit_set(&["interloper-1"]));
    assert_eq!(store.latest(&id).unwrap().number, 3);
    assert_eq!(store.latest(&id).unwrap().content, unit_set(&["u1"]));
}

/// A store whose history reads fail while commits still succeed.
struct UnreadableHistoryStore {
    inner: InMemoryVersionStore,
}

impl VersionStore for UnreadableHistoryStore {
    fn create_repository(&self, id: &RepositoryId) -> Result<RepositoryVersion, StoreError> {
        self.inner.create_repository(id)
    }

    fn repositories(&self) -> Result<Vec<RepositoryId>, StoreError> {
        self.inner.repositories()
    }

    fn latest(&self, id: &RepositoryId) -> Result<RepositoryVersion, StoreError> {
        self.inner.latest(id)
    }

    fn version(&self, _id: &RepositoryId, _number: u64) -> Result<RepositoryVersion, StoreError> {
        Err(StoreError::Database("disk I/O error".into()))
    }

    fn versions(&self, id: &RepositoryId) -> Result<Vec<u64>, StoreError> {
        self.inner.versions(id)
    }

    fn delta(&self, _id: &RepositoryId, _number: u64) -> Result<VersionDelta, StoreError> {
        Err(StoreError::Database("disk I/O error".into()))
    }

    fn commit(
        &self,
        id: &RepositoryId,
        base: &RepositoryVersion,
        added: &BTreeSet<ContentUnit>,
        removed: &BTreeSet<ContentUnit>,
        provenance: Option<Provenance>,
    ) -> Result<CommitOutcome, StoreError> {
        self.inner.commit(id, base, added, removed, provenance)
    }
}

#[tokio::test]
async fn created_version_is_reported_even_when_history_is_unreadable() {
    let store = Arc::new(UnreadableHistoryStore {
        inner: InMemoryVersionStore::new(),
    });
    let id = create_repo(store.as_ref());
    let fetcher = Arc::new(InMemoryFetcher::new("mem", gems(&["u1", "u2"])));
    let engine = SyncEngine::new(store.clone(), fetcher);

    let report = engine.run(&id, &remote(), SyncOptions::default()).await;

    let result = report.result().unwrap();
    assert!(result.version_created);
    assert_eq!(result.latest_version, 1);
    assert_eq!(result.summary.present.get("gem"), Some(&2));
    assert_eq!(result.summary.added.get("gem"), Some(&2));
    assert_eq!(store.latest(&id).unwrap().number, 1);
}

#[tokio::test]
async fn exhausted_retries_surface_as_failure() {
    let store = Arc::new(ContendedStore::new(10));
    let id = create_repo(store.as_ref());
    let fetcher = Arc::new(InMemoryFetcher::new("mem", gems(&["u1"])));
    let engine = SyncEngine::new(store.clone(), fetcher).with_config(fast_retries(3));

    let err = engine
        .sync(&id, &remote(), SyncOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::RetryLimitExceeded { attempts: 3 }));

    let report = engine.run(&id, &remote(), SyncOptions::default()).await;
    let error = report.error().unwrap();
    assert_eq!(error.kind, ErrorKind::RetryLimitExceeded);
    assert!(error.description.contains("3 attempts"));
}

#[tokio::test]
async fn started_sync_reports_through_handle() {
    let store: Arc<dyn VersionStore> = Arc::new(SqliteVersionStore::open_in_memory().unwrap());
    let id = create_repo(store.as_ref());
    let fetcher = Arc::new(InMemoryFetcher::new("mem", gems(&["u1", "u2", "u3"])));
    let engine = Arc::new(SyncEngine::new(store.clone(), fetcher));

    let handle = engine.start_sync(id.clone(), remote());
    assert_eq!(handle.repository(), &id);
    let task_id = handle.id();

    let report = handle.wait().await;
    assert_eq!(report.task_id, task_id);
    assert!(report.is_completed());
    assert_eq!(report.result().unwrap().latest_version, 1);
}

#[tokio::test]
async fn handle_observes_terminal_state() {
    let store: Arc<dyn VersionStore> = Arc::new(InMemoryVersionStore::new());
    let id = create_repo(store.as_ref());
    let fetcher = Arc::new(InMemoryFetcher::new("mem", gems(&["u1"])));
    let engine = Arc::new(SyncEngine::new(store, fetcher));

    let mut handle = engine.start_sync(id, remote());
    let mut last = handle.state();
    while let Some(state) = handle.next_state().await {
        last = state;
    }
    assert_eq!(last, SyncState::Completed);

    // Cancelling a finished task changes nothing.
    handle.cancel();
    assert_eq!(handle.state(), SyncState::Completed);
    assert!(handle.wait().await.is_completed());
}

#[tokio::test]
async fn cancelled_fetch_commits_nothing() {
    let store: Arc<dyn VersionStore> = Arc::new(InMemoryVersionStore::new());
    let id = create_repo(store.as_ref());
    let fetcher = InMemoryFetcher::new("mem", gems(&["u1"])).with_delay(Duration::from_secs(60));
    let engine = Arc::new(SyncEngine::new(store.clone(), Arc::new(fetcher)));

    let handle = engine.start_sync(id.clone(), remote());
    tokio::task::yield_now().await;
    handle.cancel();
    assert_eq!(handle.state(), SyncState::Failed);

    let report = handle.wait().await;
    assert_eq!(report.error().unwrap().kind, ErrorKind::Cancelled);
    assert_eq!(store.versions(&id).unwrap(), vec![0]);
}

#[tokio::test]
async fn concurrent_syncs_keep_versions_gap_free() {
    for (backend, store) in backends() {
        let id = create_repo(store.as_ref());
        let first = Arc::new(SyncEngine::new(
            store.clone(),
            Arc::new(InMemoryFetcher::new("first", gems(&["a", "b"]))),
        ));
        let second = Arc::new(SyncEngine::new(
            store.clone(),
            Arc::new(InMemoryFetcher::new("second", gems(&["b", "c"]))),
        ));

        let handles = vec![
            first.start_sync(id.clone(), remote()),
            second.start_sync(id.clone(), remote()),
            first.start_sync(id.clone(), remote()),
        ];
        for handle in handles {
            let report = handle.wait().await;
            assert!(report.is_completed(), "{backend}: {report:?}");
        }

        let numbers = store.versions(&id).unwrap();
        let expected: Vec<u64> = (0..numbers.len() as u64).collect();
        assert_eq!(numbers, expected, "{backend}");
    }
}

#[tokio::test]
async fn modification_based_on_version_a_sync_superseded_is_rejected() {
    for (backend, store) in backends() {
        let id = create_repo(store.as_ref());
        let planned = Modification {
            base: Some(store.latest(&id).unwrap().number),
            add: BTreeSet::from([ContentUnit::gem("local-patch", "0.1.0")]),
            ..Modification::default()
        };

        let engine = SyncEngine::new(
            store.clone(),
            Arc::new(InMemoryFetcher::new("mem", gems(&["u1", "u2"]))),
        );
        engine.sync(&id, &remote(), SyncOptions::default()).await.unwrap();

        let err = modify(store.as_ref(), &id, &planned).unwrap_err();
        assert!(
            matches!(err, StoreError::ConcurrentModification { expected: 0, actual: 1, .. }),
            "{backend}"
        );
        assert_eq!(store.versions(&id).unwrap(), vec![0, 1], "{backend}");

        let rebased = Modification {
            base: None,
            ..planned
        };
        let outcome = modify(store.as_ref(), &id, &rebased).unwrap();
        assert_eq!(outcome.version().number, 2, "{backend}");
        assert!(outcome.version().content.contains(&ContentUnit::gem("local-patch", "0.1.0")));
    }
}

#[tokio::test]
async fn mirror_sync_removes_content_added_by_modification() {
    for (backend, store) in backends() {
        let id = create_repo(store.as_ref());
        let fetcher = Arc::new(InMemoryFetcher::new("mem", gems(&["u1"])));
        let engine = SyncEngine::new(store.clone(), fetcher);
        engine.sync(&id, &remote(), SyncOptions::default()).await.unwrap();

        let extra = Modification {
            add: unit_set(&["extra"]),
            ..Modification::default()
        };
        modify(store.as_ref(), &id, &extra).unwrap();

        let result = engine
            .sync(&id, &remote(), SyncOptions::default())
            .await
            .unwrap()
            .result;
        assert_eq!(result.removed, unit_set(&["extra"]), "{backend}");
        assert_eq!(result.latest_version, 3, "{backend}");
    }
}
