use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::content::ContentUnit;
use crate::feedback::Feedback;
use crate::sync::SyncError;
use crate::task::TaskId;
use crate::version::{ContentSummary, RepositoryId};

/// What a successful sync changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub repository: RepositoryId,
    /// Version the final diff was computed against.
    pub base_version: u64,
    /// Latest version after the sync; equals `base_version` for a no-op.
    pub latest_version: u64,
    pub added: BTreeSet<ContentUnit>,
    pub removed: BTreeSet<ContentUnit>,
    pub version_created: bool,
    /// Summary of `latest_version`. Identical across repeated no-op syncs.
    pub summary: ContentSummary,
    /// Commit attempts used, including the successful one.
    pub attempts: u32,
}

/// Classification of a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RemoteUnreachable,
    RemoteMalformed,
    RetryLimitExceeded,
    Storage,
    Cancelled,
    Internal,
}

impl ErrorKind {
    fn fallback_description(self) -> &'static str {
        match self {
            Self::RemoteUnreachable => "remote unreachable",
            Self::RemoteMalformed => "remote listing malformed",
            Self::RetryLimitExceeded => "too many concurrent modifications",
            Self::Storage => "storage failure",
            Self::Cancelled => "sync cancelled",
            Self::Internal => "internal error",
        }
    }
}

/// Human-readable failure cause. `description` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescription {
    pub kind: ErrorKind,
    pub description: String,
}

impl ErrorDescription {
    pub fn new(kind: ErrorKind, description: impl Into<String>) -> Self {
        let description = description.into();
        let description = if description.trim().is_empty() {
            kind.fallback_description().to_owned()
        } else {
            description
        };
        Self { kind, description }
    }
}

impl From<&SyncError> for ErrorDescription {
    fn from(error: &SyncError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

/// Terminal state of a sync task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskOutcome {
    Completed(SyncResult),
    Failed(ErrorDescription),
}

/// The record a sync task leaves behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub repository: RepositoryId,
    pub outcome: TaskOutcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feedback: Vec<Feedback>,
}

impl TaskReport {
    pub fn completed(
        task_id: TaskId,
        repository: RepositoryId,
        result: SyncResult,
        feedback: Vec<Feedback>,
    ) -> Self {
        Self {
            task_id,
            repository,
            outcome: TaskOutcome::Completed(result),
            feedback,
        }
    }

    pub fn failed(
        task_id: TaskId,
        repository: RepositoryId,
        error: ErrorDescription,
        feedback: Vec<Feedback>,
    ) -> Self {
        Self {
            task_id,
            repository,
            outcome: TaskOutcome::Failed(error),
            feedback,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Failed(_))
    }

    pub fn result(&self) -> Option<&SyncResult> {
        match &self.outcome {
            TaskOutcome::Completed(result) => Some(result),
            TaskOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorDescription> {
        match &self.outcome {
            TaskOutcome::Completed(_) => None,
            TaskOutcome::Failed(error) => Some(error),
        }
    }
}
