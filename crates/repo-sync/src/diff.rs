use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::content::{ContentUnit, UnitKey};
use crate::version::RepositoryVersion;

/// How remote state is reconciled with the repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// The repository ends up holding exactly what the remote lists.
    #[default]
    Mirror,
    /// Remote units are added; nothing is ever removed.
    Additive,
}

/// Difference between a remote listing and a repository version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub added: BTreeSet<ContentUnit>,
    pub removed: BTreeSet<ContentUnit>,
    /// Keys present on both sides whose attributes differ. Drift is not a
    /// change: these units are neither added nor removed.
    pub drifted: BTreeSet<UnitKey>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compare a remote listing against `current`.
///
/// Equality is by natural key. The result depends only on the inputs.
pub fn diff(remote: &BTreeSet<ContentUnit>, current: &RepositoryVersion, mode: SyncMode) -> Diff {
    let added = remote.difference(&current.content).cloned().collect();

    let removed = match mode {
        SyncMode::Mirror => current.content.difference(remote).cloned().collect(),
        SyncMode::Additive => BTreeSet::new(),
    };

    let drifted = remote
        .iter()
        .filter_map(|unit| {
            current
                .content
                .get(unit)
                .filter(|existing| existing.drifted_from(unit))
                .map(|_| unit.key().clone())
        })
        .collect();

    Diff {
        added,
        removed,
        drifted,
    }
}
