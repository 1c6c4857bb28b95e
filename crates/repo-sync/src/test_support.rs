use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::remote::url_scheme;
use crate::{ContentUnit, FetchError, RemoteDescriptor, RemoteFetcher, UnitStream};

/// Units of the default kind, all at version `1.0.0`.
pub fn gems(names: &[&str]) -> Vec<ContentUnit> {
    names.iter().map(|n| ContentUnit::gem(*n, "1.0.0")).collect()
}

/// In-memory fetcher for testing. Serves a configurable listing for
/// `memory://` URLs, optionally failing or stalling.
pub struct InMemoryFetcher {
    label: String,
    scheme: String,
    units: Mutex<Vec<ContentUnit>>,
    failure: Mutex<Option<FetchError>>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl InMemoryFetcher {
    pub fn new(label: impl Into<String>, units: impl IntoIterator<Item = ContentUnit>) -> Self {
        Self {
            label: label.into(),
            scheme: "memory".to_owned(),
            units: Mutex::new(units.into_iter().collect()),
            failure: Mutex::new(None),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Sleep this long before answering each fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every fetch with `error`.
    pub fn failing(self, error: FetchError) -> Self {
        self.set_failure(Some(error));
        self
    }

    /// Replace the listing served by subsequent fetches.
    pub fn set_units(&self, units: impl IntoIterator<Item = ContentUnit>) {
        *self.units.lock().unwrap_or_else(PoisonError::into_inner) = units.into_iter().collect();
    }

    pub fn set_failure(&self, error: Option<FetchError>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// Shared counter of `fetch` calls.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait::async_trait]
impl RemoteFetcher for InMemoryFetcher {
    fn label(&self) -> &str {
        &self.label
    }

    fn supports(&self, url: &str) -> bool {
        url_scheme(url).is_some_and(|s| s == self.scheme)
    }

    async fn fetch(&self, _remote: &RemoteDescriptor) -> Result<UnitStream, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(error) = failure {
            return Err(error);
        }

        let units = self
            .units
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(Box::pin(futures::stream::iter(units.into_iter().map(Ok))))
    }
}
