use std::collections::BTreeSet;

use crate::content::ContentUnit;
use crate::version::{ContentSummary, Provenance, RepositoryId, RepositoryVersion, VersionDelta};

/// Errors raised by a [`VersionStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("repository not found: {0}")]
    RepositoryNotFound(RepositoryId),

    #[error("repository already exists: {0}")]
    RepositoryExists(RepositoryId),

    #[error("version {number} not found in repository {repository}")]
    VersionNotFound { repository: RepositoryId, number: u64 },

    #[error(
        "concurrent modification of {repository}: expected latest version {expected}, found {actual}"
    )]
    ConcurrentModification {
        repository: RepositoryId,
        expected: u64,
        actual: u64,
    },

    #[error("invalid delta for {repository}: {reason}")]
    InvalidDelta {
        repository: RepositoryId,
        reason: String,
    },

    #[error("database error: {0}")]
    Database(String),

    #[error("migration error: {0}")]
    Migration(String),
}

/// Result of a commit attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A new version was appended.
    Created(RepositoryVersion),
    /// Nothing to apply; the base version is still the latest.
    Unchanged(RepositoryVersion),
}

impl CommitOutcome {
    pub fn version(&self) -> &RepositoryVersion {
        match self {
            Self::Created(v) | Self::Unchanged(v) => v,
        }
    }

    pub fn into_version(self) -> RepositoryVersion {
        match self {
            Self::Created(v) | Self::Unchanged(v) => v,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Append-only storage of repository versions.
///
/// Every method is atomic. `commit` uses optimistic versioning: the caller
/// passes the version it diffed against and the store rejects the commit
/// with [`StoreError::ConcurrentModification`] if that is no longer the
/// latest version. At most one version is ever committed per
/// `(repository, base)`.
pub trait VersionStore: Send + Sync {
    /// Create a repository holding only the empty version 0.
    fn create_repository(&self, id: &RepositoryId) -> Result<RepositoryVersion, StoreError>;

    /// All known repositories, sorted.
    fn repositories(&self) -> Result<Vec<RepositoryId>, StoreError>;

    /// The highest-numbered version of a repository.
    fn latest(&self, id: &RepositoryId) -> Result<RepositoryVersion, StoreError>;

    fn version(&self, id: &RepositoryId, number: u64) -> Result<RepositoryVersion, StoreError>;

    /// Version numbers in ascending order.
    fn versions(&self, id: &RepositoryId) -> Result<Vec<u64>, StoreError>;

    /// The change `number` introduced over its predecessor.
    fn delta(&self, id: &RepositoryId, number: u64) -> Result<VersionDelta, StoreError>;

    fn commit(
        &self,
        id: &RepositoryId,
        base: &RepositoryVersion,
        added: &BTreeSet<ContentUnit>,
        removed: &BTreeSet<ContentUnit>,
        provenance: Option<Provenance>,
    ) -> Result<CommitOutcome, StoreError>;

    /// Per-kind counts for a version.
    fn summary(&self, id: &RepositoryId, number: u64) -> Result<ContentSummary, StoreError> {
        let version = self.version(id, number)?;
        let delta = self.delta(id, number)?;
        Ok(ContentSummary::for_version(&version, &delta))
    }
}

impl<T: VersionStore + ?Sized> VersionStore for std::sync::Arc<T> {
    fn create_repository(&self, id: &RepositoryId) -> Result<RepositoryVersion, StoreError> {
        (**self).create_repository(id)
    }

    fn repositories(&self) -> Result<Vec<RepositoryId>, StoreError> {
        (**self).repositories()
    }

    fn latest(&self, id: &RepositoryId) -> Result<RepositoryVersion, StoreError> {
        (**self).latest(id)
    }

    fn version(&self, id: &RepositoryId, number: u64) -> Result<RepositoryVersion, StoreError> {
        (**self).version(id, number)
    }

    fn versions(&self, id: &RepositoryId) -> Result<Vec<u64>, StoreError> {
        (**self).versions(id)
    }

    fn delta(&self, id: &RepositoryId, number: u64) -> Result<VersionDelta, StoreError> {
        (**self).delta(id, number)
    }

    fn commit(
        &self,
        id: &RepositoryId,
        base: &RepositoryVersion,
        added: &BTreeSet<ContentUnit>,
        removed: &BTreeSet<ContentUnit>,
        provenance: Option<Provenance>,
    ) -> Result<CommitOutcome, StoreError> {
        (**self).commit(id, base, added, removed, provenance)
    }
}

/// Check the disjointness and subset rules a commit must satisfy against
/// its base. Shared by store backends.
pub fn validate_delta(
    base: &RepositoryVersion,
    added: &BTreeSet<ContentUnit>,
    removed: &BTreeSet<ContentUnit>,
) -> Result<(), StoreError> {
    if let Some(unit) = added.iter().find(|u| base.content.contains(*u)) {
        return Err(StoreError::InvalidDelta {
            repository: base.repository.clone(),
            reason: format!("{unit} is already present in version {}", base.number),
        });
    }
    if let Some(unit) = removed.iter().find(|u| !base.content.contains(*u)) {
        return Err(StoreError::InvalidDelta {
            repository: base.repository.clone(),
            reason: format!("{unit} is not present in version {}", base.number),
        });
    }
    Ok(())
}
