use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::content::ContentUnit;
use crate::store::{CommitOutcome, StoreError, VersionStore, validate_delta};
use crate::version::{Provenance, RepositoryId, RepositoryVersion, VersionDelta};

struct StoredVersion {
    content: BTreeSet<ContentUnit>,
    delta: VersionDelta,
}

/// Versions of one repository, oldest first. Index equals version number.
struct RepositoryLog {
    versions: Vec<StoredVersion>,
}

impl RepositoryLog {
    fn new() -> Self {
        Self {
            versions: vec![StoredVersion {
                content: BTreeSet::new(),
                delta: VersionDelta::empty(0),
            }],
        }
    }

    fn latest_number(&self) -> u64 {
        (self.versions.len() - 1) as u64
    }

    fn snapshot(&self, id: &RepositoryId, number: u64) -> Option<RepositoryVersion> {
        let stored = self.versions.get(usize::try_from(number).ok()?)?;
        Some(RepositoryVersion {
            repository: id.clone(),
            number,
            content: stored.content.clone(),
        })
    }
}

/// A process-local [`VersionStore`].
///
/// Each repository has its own lock; the outer map lock is only held long
/// enough to look a repository up, so commits to different repositories
/// never wait on each other.
#[derive(Default)]
pub struct InMemoryVersionStore {
    repositories: Mutex<BTreeMap<RepositoryId, Arc<Mutex<RepositoryLog>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self, id: &RepositoryId) -> Result<Arc<Mutex<RepositoryLog>>, StoreError> {
        lock(&self.repositories)
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::RepositoryNotFound(id.clone()))
    }
}

impl VersionStore for InMemoryVersionStore {
    fn create_repository(&self, id: &RepositoryId) -> Result<RepositoryVersion, StoreError> {
        let mut repositories = lock(&self.repositories);
        if repositories.contains_key(id) {
            return Err(StoreError::RepositoryExists(id.clone()));
        }
        repositories.insert(id.clone(), Arc::new(Mutex::new(RepositoryLog::new())));
        tracing::debug!(repository = %id, "created repository");
        Ok(RepositoryVersion::initial(id.clone()))
    }

    fn repositories(&self) -> Result<Vec<RepositoryId>, StoreError> {
        Ok(lock(&self.repositories).keys().cloned().collect())
    }

    fn latest(&self, id: &RepositoryId) -> Result<RepositoryVersion, StoreError> {
        let log = self.log(id)?;
        let log = lock(&log);
        let number = log.latest_number();
        log.snapshot(id, number).ok_or(StoreError::VersionNotFound {
            repository: id.clone(),
            number,
        })
    }

    fn version(&self, id: &RepositoryId, number: u64) -> Result<RepositoryVersion, StoreError> {
        let log = self.log(id)?;
        let log = lock(&log);
        log.snapshot(id, number).ok_or(StoreError::VersionNotFound {
            repository: id.clone(),
            number,
        })
    }

    fn versions(&self, id: &RepositoryId) -> Result<Vec<u64>, StoreError> {
        let log = self.log(id)?;
        let log = lock(&log);
        Ok((0..=log.latest_number()).collect())
    }

    fn delta(&self, id: &RepositoryId, number: u64) -> Result<VersionDelta, StoreError> {
        let log = self.log(id)?;
        let log = lock(&log);
        usize::try_from(number)
            .ok()
            .and_then(|idx| log.versions.get(idx))
            .map(|stored| stored.delta.clone())
            .ok_or(StoreError::VersionNotFound {
                repository: id.clone(),
                number,
            })
    }

    fn commit(
        &self,
        id: &RepositoryId,
        base: &RepositoryVersion,
        added: &BTreeSet<ContentUnit>,
        removed: &BTreeSet<ContentUnit>,
        provenance: Option<Provenance>,
    ) -> Result<CommitOutcome, StoreError> {
        let log = self.log(id)?;
        let mut log = lock(&log);

        let actual = log.latest_number();
        if actual != base.number {
            return Err(StoreError::ConcurrentModification {
                repository: id.clone(),
                expected: base.number,
                actual,
            });
        }

        if added.is_empty() && removed.is_empty() {
            return Ok(CommitOutcome::Unchanged(base.clone()));
        }

        // Validate against what is stored, not what the caller claims.
        let stored_base = log.snapshot(id, actual).ok_or(StoreError::VersionNotFound {
            repository: id.clone(),
            number: actual,
        })?;
        validate_delta(&stored_base, added, removed)?;

        let number = actual + 1;
        let content = stored_base.apply(added, removed);
        log.versions.push(StoredVersion {
            content: content.clone(),
            delta: VersionDelta {
                number,
                added: added.clone(),
                removed: removed.clone(),
                provenance,
            },
        });

        tracing::debug!(
            repository = %id,
            version = number,
            added = added.len(),
            removed = removed.len(),
            "committed version"
        );

        Ok(CommitOutcome::Created(RepositoryVersion {
            repository: id.clone(),
            number,
            content,
        }))
    }
}
