use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::report::{ErrorDescription, ErrorKind, TaskReport};
use crate::sync::{SyncError, SyncState};
use crate::version::RepositoryId;

/// Identifier of a sync task, unique per engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Handle to a sync running in the background.
///
/// Cancelling takes effect at the task's next suspension point. Fetching,
/// reading the listing and retry backoff are the only ones; a commit runs
/// to completion once started, so a cancelled sync either committed
/// nothing or committed a whole version.
pub struct TaskHandle {
    id: TaskId,
    repository: RepositoryId,
    join: JoinHandle<TaskReport>,
    state: watch::Receiver<SyncState>,
    cancelled: AtomicBool,
}

impl TaskHandle {
    pub(crate) fn new(
        id: TaskId,
        repository: RepositoryId,
        join: JoinHandle<TaskReport>,
        state: watch::Receiver<SyncState>,
    ) -> Self {
        Self {
            id,
            repository,
            join,
            state,
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn repository(&self) -> &RepositoryId {
        &self.repository
    }

    /// The state the task last reported. A task that was cancelled or
    /// died before reaching a terminal state reads as `Failed`.
    pub fn state(&self) -> SyncState {
        let state = *self.state.borrow();
        if !state.is_terminal()
            && (self.cancelled.load(Ordering::SeqCst) || self.join.is_finished())
        {
            return SyncState::Failed;
        }
        state
    }

    /// Wait for the next state transition. Returns `None` once the task
    /// has finished and will report nothing further.
    pub async fn next_state(&mut self) -> Option<SyncState> {
        self.state.changed().await.ok()?;
        Some(*self.state.borrow_and_update())
    }

    pub fn cancel(&self) {
        tracing::debug!(task = %self.id, repository = %self.repository, "cancelling sync");
        self.cancelled.store(true, Ordering::SeqCst);
        self.join.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the task to end and return its report.
    pub async fn wait(self) -> TaskReport {
        match self.join.await {
            Ok(report) => report,
            Err(e) if e.is_cancelled() => TaskReport::failed(
                self.id,
                self.repository,
                ErrorDescription::from(&SyncError::Cancelled),
                vec![],
            ),
            Err(e) => TaskReport::failed(
                self.id,
                self.repository,
                ErrorDescription::new(ErrorKind::Internal, format!("sync task panicked: {e}")),
                vec![],
            ),
        }
    }
}
