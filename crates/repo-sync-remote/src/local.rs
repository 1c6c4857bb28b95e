use std::path::PathBuf;

use repo_sync::{FetchError, RemoteDescriptor, RemoteFetcher, UnitStream, url_scheme};

use crate::listing;

/// Reads unit listings from `file://` URLs.
#[derive(Debug, Default)]
pub struct LocalFetcher;

impl LocalFetcher {
    pub fn new() -> Self {
        Self
    }

    fn path_of(url: &str) -> Option<PathBuf> {
        let (scheme, rest) = url.split_once("://")?;
        if !scheme.eq_ignore_ascii_case("file") || rest.is_empty() {
            return None;
        }
        // `file://localhost/path` and `file:///path` name the same file.
        let rest = rest.strip_prefix("localhost").unwrap_or(rest);
        Some(PathBuf::from(rest))
    }
}

#[async_trait::async_trait]
impl RemoteFetcher for LocalFetcher {
    fn label(&self) -> &str {
        "file"
    }

    fn supports(&self, url: &str) -> bool {
        url_scheme(url).as_deref() == Some("file")
    }

    async fn fetch(&self, remote: &RemoteDescriptor) -> Result<UnitStream, FetchError> {
        let path = Self::path_of(&remote.url)
            .ok_or_else(|| FetchError::Unreachable(format!("invalid file url '{}'", remote.url)))?;

        let body = tokio::fs::read(&path)
            .await
            .map_err(|e| FetchError::Unreachable(format!("{}: {e}", path.display())))?;

        listing::parse(&body, listing::is_gzip_url(&remote.url))
    }
}
