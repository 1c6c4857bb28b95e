use std::collections::BTreeSet;

use crate::content::{ContentUnit, UnitKey};
use crate::store::{CommitOutcome, StoreError, VersionStore};
use crate::version::RepositoryId;

/// A direct change to a repository's content, outside of any sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modification {
    /// Version the change is based on. `None` means the latest.
    pub base: Option<u64>,
    pub add: BTreeSet<ContentUnit>,
    pub remove: BTreeSet<UnitKey>,
}

impl Modification {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Apply `modification` as a new version.
///
/// Units already present are not re-added and keys that are absent are not
/// removed, so repeating a modification is a no-op. A stale `base` fails
/// with [`StoreError::ConcurrentModification`] and commits nothing.
pub fn modify(
    store: &dyn VersionStore,
    id: &RepositoryId,
    modification: &Modification,
) -> Result<CommitOutcome, StoreError> {
    let base = match modification.base {
        Some(number) => store.version(id, number)?,
        None => store.latest(id)?,
    };

    let removed: BTreeSet<ContentUnit> = base
        .content
        .iter()
        .filter(|unit| modification.remove.contains(unit.key()))
        .cloned()
        .collect();
    let added: BTreeSet<ContentUnit> = modification
        .add
        .iter()
        .filter(|unit| !base.content.contains(*unit))
        .filter(|unit| !modification.remove.contains(unit.key()))
        .cloned()
        .collect();

    let outcome = store.commit(id, &base, &added, &removed, None)?;
    tracing::info!(
        repository = %id,
        base = base.number,
        version = outcome.version().number,
        added = added.len(),
        removed = removed.len(),
        "repository modified"
    );
    Ok(outcome)
}
