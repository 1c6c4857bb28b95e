use std::sync::Arc;

use crate::remote::{FetchError, RemoteDescriptor, RemoteFetcher, UnitStream, url_scheme};

/// A fetcher that delegates to the first inner fetcher supporting the URL.
pub struct CompositeFetcher {
    fetchers: Vec<Arc<dyn RemoteFetcher>>,
}

impl CompositeFetcher {
    pub fn new(fetchers: Vec<Arc<dyn RemoteFetcher>>) -> Self {
        Self { fetchers }
    }

    fn route(&self, url: &str) -> Option<&Arc<dyn RemoteFetcher>> {
        self.fetchers.iter().find(|f| f.supports(url))
    }
}

#[async_trait::async_trait]
impl RemoteFetcher for CompositeFetcher {
    fn label(&self) -> &str {
        "all"
    }

    fn supports(&self, url: &str) -> bool {
        self.route(url).is_some()
    }

    async fn fetch(&self, remote: &RemoteDescriptor) -> Result<UnitStream, FetchError> {
        match self.route(&remote.url) {
            Some(fetcher) => {
                tracing::debug!(fetcher = fetcher.label(), url = %remote.url, "routing fetch");
                fetcher.fetch(remote).await
            }
            None => Err(FetchError::Unreachable(match url_scheme(&remote.url) {
                Some(scheme) => format!("unsupported url scheme '{scheme}' in {}", remote.url),
                None => format!("invalid url '{}'", remote.url),
            })),
        }
    }
}
