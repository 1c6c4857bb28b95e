use std::sync::Arc;

use repo_sync::CompositeFetcher;

pub mod http;
pub mod listing;
pub mod local;

pub use http::HttpFetcher;
pub use local::LocalFetcher;

/// A fetcher that understands every URL scheme this crate supports.
pub fn default_fetcher(http: HttpFetcher) -> CompositeFetcher {
    CompositeFetcher::new(vec![Arc::new(http), Arc::new(LocalFetcher::new())])
}
