use std::time::Duration;

use repo_sync::{FetchError, RemoteDescriptor, RemoteFetcher, UnitStream, url_scheme};

use crate::listing;

const USER_AGENT: &str = concat!("repo-sync/", env!("CARGO_PKG_VERSION"));

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches unit listings over HTTP(S).
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl RemoteFetcher for HttpFetcher {
    fn label(&self) -> &str {
        "http"
    }

    fn supports(&self, url: &str) -> bool {
        matches!(url_scheme(url).as_deref(), Some("http" | "https"))
    }

    async fn fetch(&self, remote: &RemoteDescriptor) -> Result<UnitStream, FetchError> {
        tracing::debug!(url = %remote.url, "requesting listing");

        let response = self
            .client
            .get(&remote.url)
            .header("User-Agent", USER_AGENT)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FetchError::Unreachable(format!("{}: {e}", remote.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Unreachable(format!(
                "{} returned HTTP {status}",
                remote.url
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Unreachable(format!("failed to read {}: {e}", remote.url)))?;

        tracing::debug!(url = %remote.url, bytes = body.len(), "listing downloaded");
        listing::parse(&body, listing::is_gzip_url(&remote.url))
    }
}
