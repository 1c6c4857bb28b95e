use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of a [`Feedback`] message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackLevel {
    Info,
    Warning,
    Error,
}

/// A message produced while a sync runs.
///
/// Syncs collect these instead of printing, so the CLI can write them to
/// stderr and library callers can log or ignore them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub level: FeedbackLevel,
    pub message: String,
}

impl Feedback {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: FeedbackLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: FeedbackLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: FeedbackLevel::Error,
            message: message.into(),
        }
    }

    pub fn is_warning(&self) -> bool {
        self.level == FeedbackLevel::Warning
    }

    pub fn is_error(&self) -> bool {
        self.level == FeedbackLevel::Error
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            FeedbackLevel::Info => write!(f, "{}", self.message),
            FeedbackLevel::Warning => write!(f, "warning: {}", self.message),
            FeedbackLevel::Error => write!(f, "error: {}", self.message),
        }
    }
}
