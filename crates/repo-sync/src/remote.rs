use std::fmt;
use std::sync::Arc;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::content::ContentUnit;

/// When a remote's artifacts are meant to be materialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Policy {
    #[default]
    Immediate,
    OnDemand,
}

impl Policy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::OnDemand => "on-demand",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "immediate" => Some(Self::Immediate),
            "on-demand" => Some(Self::OnDemand),
            _ => None,
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured external source of content units.
/// Owned by the caller; the sync engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDescriptor {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub policy: Policy,
}

impl RemoteDescriptor {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            policy: Policy::default(),
        }
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }
}

/// Errors a fetcher can surface. Both are terminal for a sync attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("remote unreachable: {0}")]
    Unreachable(String),

    #[error("remote listing malformed: {0}")]
    Malformed(String),
}

/// Lazy sequence of units produced by a remote listing.
pub type UnitStream = BoxStream<'static, Result<ContentUnit, FetchError>>;

/// Produces the unit listing of a remote.
///
/// Implementations know how to reach one family of URLs (HTTP, local files,
/// ...). Transport problems map to [`FetchError::Unreachable`], decoding
/// problems to [`FetchError::Malformed`].
#[async_trait::async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Human-readable label identifying this fetcher.
    fn label(&self) -> &str;

    /// Whether this fetcher knows how to reach `url`.
    fn supports(&self, url: &str) -> bool;

    /// Start fetching the listing for `remote`.
    async fn fetch(&self, remote: &RemoteDescriptor) -> Result<UnitStream, FetchError>;
}

#[async_trait::async_trait]
impl<T: RemoteFetcher + ?Sized> RemoteFetcher for Arc<T> {
    fn label(&self) -> &str {
        (**self).label()
    }

    fn supports(&self, url: &str) -> bool {
        (**self).supports(url)
    }

    async fn fetch(&self, remote: &RemoteDescriptor) -> Result<UnitStream, FetchError> {
        (**self).fetch(remote).await
    }
}

/// Scheme portion of a URL, lowercased, if it has one.
pub fn url_scheme(url: &str) -> Option<String> {
    let (scheme, _) = url.split_once("://")?;
    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return None;
    }
    Some(scheme.to_ascii_lowercase())
}
