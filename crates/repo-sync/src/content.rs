use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Content kind used when a listing entry does not name one.
pub const DEFAULT_KIND: &str = "gem";

/// Natural key of a content unit. Identity, ordering and hashing of
/// [`ContentUnit`] are defined by this key alone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitKey {
    pub kind: String,
    pub name: String,
    pub version: String,
}

impl UnitKey {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.kind, self.name, self.version)
    }
}

/// An individually addressable, synchronizable artifact.
///
/// Attributes (checksums, platform metadata, ...) travel with the unit but
/// never participate in equality: two units sharing a key are the same unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentUnit {
    key: UnitKey,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
}

impl ContentUnit {
    pub fn new(key: UnitKey) -> Self {
        Self {
            key,
            attributes: BTreeMap::new(),
        }
    }

    /// Shorthand for a unit of the default kind.
    pub fn gem(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(UnitKey::new(DEFAULT_KIND, name, version))
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn key(&self) -> &UnitKey {
        &self.key
    }

    pub fn kind(&self) -> &str {
        &self.key.kind
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn version(&self) -> &str {
        &self.key.version
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// True when both units share a key but carry different attributes.
    pub fn drifted_from(&self, other: &ContentUnit) -> bool {
        self.key == other.key && self.attributes != other.attributes
    }
}

impl PartialEq for ContentUnit {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ContentUnit {}

impl Hash for ContentUnit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for ContentUnit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ContentUnit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for ContentUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.key.fmt(f)
    }
}
