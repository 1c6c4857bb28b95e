use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{Instant, timeout_at};
use tracing::Instrument;

use crate::config::SyncConfig;
use crate::content::ContentUnit;
use crate::diff::{SyncMode, diff};
use crate::feedback::Feedback;
use crate::remote::{FetchError, RemoteDescriptor, RemoteFetcher, UnitStream};
use crate::report::{ErrorDescription, ErrorKind, SyncResult, TaskReport};
use crate::store::{CommitOutcome, StoreError, VersionStore};
use crate::task::{TaskHandle, TaskId};
use crate::version::{ContentSummary, Provenance, RepositoryId, VersionDelta};

/// Errors that end a sync attempt.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("remote unreachable: {0}")]
    RemoteUnreachable(String),

    #[error("remote listing malformed: {0}")]
    RemoteMalformed(String),

    #[error("gave up after {attempts} attempts: repository kept changing during sync")]
    RetryLimitExceeded { attempts: u32 },

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RemoteUnreachable(_) => ErrorKind::RemoteUnreachable,
            Self::RemoteMalformed(_) => ErrorKind::RemoteMalformed,
            Self::RetryLimitExceeded { .. } => ErrorKind::RetryLimitExceeded,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<FetchError> for SyncError {
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::Unreachable(msg) => Self::RemoteUnreachable(msg),
            FetchError::Malformed(msg) => Self::RemoteMalformed(msg),
        }
    }
}

/// Where a sync task currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Fetching,
    Diffing,
    Committing,
    Completed,
    Failed,
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetching => "fetching",
            Self::Diffing => "diffing",
            Self::Committing => "committing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Per-sync options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    pub mode: SyncMode,
}

impl SyncOptions {
    pub fn additive() -> Self {
        Self {
            mode: SyncMode::Additive,
        }
    }
}

/// A successful sync and the messages it produced.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub result: SyncResult,
    pub feedback: Vec<Feedback>,
}

/// Drives fetch, diff and commit for syncs against one version store.
pub struct SyncEngine {
    store: Arc<dyn VersionStore>,
    fetcher: Arc<dyn RemoteFetcher>,
    config: SyncConfig,
    next_task: AtomicU64,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn VersionStore>, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self {
            store,
            fetcher,
            config: SyncConfig::default(),
            next_task: AtomicU64::new(1),
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn VersionStore> {
        &self.store
    }

    fn next_task_id(&self) -> TaskId {
        TaskId::new(self.next_task.fetch_add(1, Ordering::Relaxed))
    }

    /// Spawn a mirror sync of `remote` into `repository`.
    pub fn start_sync(
        self: &Arc<Self>,
        repository: RepositoryId,
        remote: RemoteDescriptor,
    ) -> TaskHandle {
        self.start_sync_with(repository, remote, SyncOptions::default())
    }

    /// Spawn a sync on the current tokio runtime.
    pub fn start_sync_with(
        self: &Arc<Self>,
        repository: RepositoryId,
        remote: RemoteDescriptor,
        options: SyncOptions,
    ) -> TaskHandle {
        let id = self.next_task_id();
        let (state_tx, state_rx) = watch::channel(SyncState::Fetching);
        let engine = Arc::clone(self);
        let task_repository = repository.clone();

        let join = tokio::spawn(async move {
            engine
                .report(id, &task_repository, &remote, options, &state_tx)
                .await
        });

        TaskHandle::new(id, repository, join, state_rx)
    }

    /// Run a sync to completion on the current task and report its outcome.
    pub async fn run(
        &self,
        repository: &RepositoryId,
        remote: &RemoteDescriptor,
        options: SyncOptions,
    ) -> TaskReport {
        let (state_tx, _state_rx) = watch::channel(SyncState::Fetching);
        self.report(self.next_task_id(), repository, remote, options, &state_tx)
            .await
    }

    /// Run a sync and return the typed result.
    pub async fn sync(
        &self,
        repository: &RepositoryId,
        remote: &RemoteDescriptor,
        options: SyncOptions,
    ) -> Result<SyncOutcome, SyncError> {
        let (state_tx, _state_rx) = watch::channel(SyncState::Fetching);
        let mut feedback = Vec::new();
        let result = self
            .execute(repository, remote, options, &state_tx, &mut feedback)
            .await?;
        Ok(SyncOutcome { result, feedback })
    }

    async fn report(
        &self,
        id: TaskId,
        repository: &RepositoryId,
        remote: &RemoteDescriptor,
        options: SyncOptions,
        state: &watch::Sender<SyncState>,
    ) -> TaskReport {
        let span = tracing::info_span!(
            "sync",
            task = %id,
            repository = %repository,
            remote = %remote.name,
        );

        async move {
            let mut feedback = Vec::new();
            match self
                .execute(repository, remote, options, state, &mut feedback)
                .await
            {
                Ok(result) => {
                    tracing::info!(
                        version = result.latest_version,
                        created = result.version_created,
                        added = result.added.len(),
                        removed = result.removed.len(),
                        "sync completed"
                    );
                    TaskReport::completed(id, repository.clone(), result, feedback)
                }
                Err(e) => {
                    state.send_replace(SyncState::Failed);
                    tracing::warn!(error = %e, "sync failed");
                    let error = ErrorDescription::from(&e);
                    TaskReport::failed(id, repository.clone(), error, feedback)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        repository: &RepositoryId,
        remote: &RemoteDescriptor,
        options: SyncOptions,
        state: &watch::Sender<SyncState>,
        feedback: &mut Vec<Feedback>,
    ) -> Result<SyncResult, SyncError> {
        state.send_replace(SyncState::Fetching);

        // Fail on an unknown repository before touching the network.
        self.store.latest(repository)?;

        let deadline = Instant::now() + self.config.fetch_timeout;
        let timed_out = || {
            SyncError::RemoteUnreachable(format!(
                "timed out after {:?} fetching {}",
                self.config.fetch_timeout, remote.url
            ))
        };

        tracing::debug!(url = %remote.url, policy = %remote.policy, "fetching remote listing");
        let stream = timeout_at(deadline, self.fetcher.fetch(remote))
            .await
            .map_err(|_| timed_out())??;

        state.send_replace(SyncState::Diffing);
        let listing = timeout_at(deadline, materialize(stream))
            .await
            .map_err(|_| timed_out())??;
        tracing::debug!(units = listing.len(), "remote listing materialized");

        let provenance = Provenance {
            remote_url: remote.url.clone(),
            policy: remote.policy,
        };
        let retry = &self.config.retry;
        let mut attempt = 1u32;

        loop {
            let base = self.store.latest(repository)?;
            let changes = diff(&listing, &base, options.mode);

            state.send_replace(SyncState::Committing);
            let committed = self.store.commit(
                repository,
                &base,
                &changes.added,
                &changes.removed,
                Some(provenance.clone()),
            );

            match committed {
                Ok(outcome) => {
                    for key in &changes.drifted {
                        feedback.push(Feedback::warning(format!(
                            "{key} differs upstream; attribute changes are not synced"
                        )));
                    }

                    let version_created = outcome.is_created();
                    let summary = match &outcome {
                        // Summarized from the commit itself; no store read.
                        CommitOutcome::Created(version) => {
                            let delta = VersionDelta {
                                number: version.number,
                                added: changes.added.clone(),
                                removed: changes.removed.clone(),
                                provenance: Some(provenance.clone()),
                            };
                            ContentSummary::for_version(version, &delta)
                        }
                        CommitOutcome::Unchanged(version) => {
                            self.store.summary(repository, version.number)?
                        }
                    };
                    let latest = outcome.into_version();
                    state.send_replace(SyncState::Completed);

                    return Ok(SyncResult {
                        repository: repository.clone(),
                        base_version: base.number,
                        latest_version: latest.number,
                        added: changes.added,
                        removed: changes.removed,
                        version_created,
                        summary,
                        attempts: attempt,
                    });
                }
                Err(StoreError::ConcurrentModification {
                    expected, actual, ..
                }) => {
                    if attempt >= retry.max_attempts {
                        return Err(SyncError::RetryLimitExceeded { attempts: attempt });
                    }
                    let delay = retry.backoff(attempt);
                    tracing::warn!(
                        attempt,
                        expected,
                        actual,
                        ?delay,
                        "repository changed during sync, retrying"
                    );
                    feedback.push(Feedback::info(format!(
                        "version {expected} was superseded by {actual}; retrying"
                    )));
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    state.send_replace(SyncState::Diffing);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Read a whole listing into a set. Exact duplicates collapse; two entries
/// sharing a key but disagreeing on attributes make the listing malformed.
async fn materialize(mut stream: UnitStream) -> Result<BTreeSet<ContentUnit>, SyncError> {
    let mut units = BTreeSet::new();
    while let Some(unit) = stream.try_next().await? {
        if let Some(existing) = units.get(&unit) {
            if unit.drifted_from(existing) {
                return Err(SyncError::RemoteMalformed(format!(
                    "conflicting entries for {}",
                    unit.key()
                )));
            }
            continue;
        }
        units.insert(unit);
    }
    Ok(units)
}
