use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::content::ContentUnit;
use crate::remote::Policy;

/// Identifier of a repository. Repositories are addressed by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepositoryId(String);

impl RepositoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RepositoryId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// An immutable, numbered snapshot of a repository's content set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryVersion {
    pub repository: RepositoryId,
    pub number: u64,
    pub content: BTreeSet<ContentUnit>,
}

impl RepositoryVersion {
    /// The empty version every repository starts with.
    pub fn initial(repository: RepositoryId) -> Self {
        Self {
            repository,
            number: 0,
            content: BTreeSet::new(),
        }
    }

    /// Content of the version that would follow this one after applying
    /// `added` and `removed`.
    pub fn apply(
        &self,
        added: &BTreeSet<ContentUnit>,
        removed: &BTreeSet<ContentUnit>,
    ) -> BTreeSet<ContentUnit> {
        self.content
            .difference(removed)
            .chain(added.iter())
            .cloned()
            .collect()
    }
}

/// Where a version's content came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub remote_url: String,
    pub policy: Policy,
}

/// The immutable change a version introduced over its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDelta {
    pub number: u64,
    pub added: BTreeSet<ContentUnit>,
    pub removed: BTreeSet<ContentUnit>,
    pub provenance: Option<Provenance>,
}

impl VersionDelta {
    pub fn empty(number: u64) -> Self {
        Self {
            number,
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
            provenance: None,
        }
    }
}

/// Unit counts grouped by content kind.
pub type KindCounts = BTreeMap<String, u64>;

/// Per-kind counts of what a version holds and what it changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSummary {
    pub present: KindCounts,
    pub added: KindCounts,
    pub removed: KindCounts,
}

impl ContentSummary {
    pub fn for_version(version: &RepositoryVersion, delta: &VersionDelta) -> Self {
        Self {
            present: count_by_kind(&version.content),
            added: count_by_kind(&delta.added),
            removed: count_by_kind(&delta.removed),
        }
    }
}

fn count_by_kind<'a>(units: impl IntoIterator<Item = &'a ContentUnit>) -> KindCounts {
    let mut counts = KindCounts::new();
    for unit in units {
        *counts.entry(unit.kind().to_owned()).or_default() += 1;
    }
    counts
}
