//! Error types for the scheduler and its repository port.

use crate::models::QuizId;
use thiserror::Error;

/// Unknown value for one of the closed string enums.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Errors reported by repository implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepoError {
    /// No such item for this user.
    #[error("Record not found")]
    NotFound,
    /// The stored version differs from the expected one.
    #[error("Version conflict")]
    VersionConflict,
    /// Storage failed.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    /// Write deadline passed; nothing was stored.
    #[error("Write deadline passed")]
    Timeout,
}

impl From<rusqlite::Error> for RepoError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        Self::Unavailable(format!("JSON error: {e}"))
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors surfaced to callers of the scheduler service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// Malformed request; not worth retrying.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Item does not exist or belongs to someone else.
    #[error("Quiz item not found: {0}")]
    NotFound(QuizId),

    /// Concurrent modification persisted past the retry budget.
    #[error("Concurrent modification, gave up after {attempts} attempts")]
    Conflict { attempts: u32 },

    /// Repository failure.
    #[error("Repository unavailable: {0}")]
    Unavailable(String),

    /// Deadline passed while waiting on the repository. No review was
    /// recorded.
    #[error("Operation timed out")]
    Timeout,
}

impl SchedulerError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::Unavailable(_) | Self::Timeout
        )
    }

    /// Map a repository error that occurred while working on `id`.
    pub(crate) fn from_repo(e: RepoError, id: QuizId) -> Self {
        match e {
            RepoError::NotFound => Self::NotFound(id),
            RepoError::VersionConflict => Self::Conflict { attempts: 1 },
            RepoError::Unavailable(msg) => Self::Unavailable(msg),
            RepoError::Timeout => Self::Timeout,
        }
    }
}

impl From<ParseEnumError> for SchedulerError {
    fn from(e: ParseEnumError) -> Self {
        Self::InvalidArgument(e.to_string())
    }
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(e: toml::ser::Error) -> Self {
        Self::Toml(e.to_string())
    }
}
