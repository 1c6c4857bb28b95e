pub mod composite;
pub mod config;
pub mod content;
pub mod diff;
pub mod feedback;
pub mod memory;
pub mod modify;
pub mod remote;
pub mod report;
pub mod store;
pub mod sync;
pub mod task;
pub mod version;

pub use composite::CompositeFetcher;
pub use config::{RetryPolicy, SyncConfig};
pub use content::{ContentUnit, DEFAULT_KIND, UnitKey};
pub use diff::{Diff, SyncMode, diff};
pub use feedback::{Feedback, FeedbackLevel};
pub use memory::InMemoryVersionStore;
pub use modify::{Modification, modify};
pub use remote::{FetchError, Policy, RemoteDescriptor, RemoteFetcher, UnitStream, url_scheme};
pub use report::{ErrorDescription, ErrorKind, SyncResult, TaskOutcome, TaskReport};
pub use store::{CommitOutcome, StoreError, VersionStore, validate_delta};
pub use sync::{SyncEngine, SyncError, SyncOptions, SyncOutcome, SyncState};
pub use task::{TaskHandle, TaskId};
pub use version::{
    ContentSummary, KindCounts, Provenance, RepositoryId, RepositoryVersion, VersionDelta,
};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
