//! Shared error types for the services crate.

use std::time::Duration;

use thiserror::Error;

use quiz_core::model::{HistoryEntryError, LevelResultError, SessionConfigError};
use quiz_core::parser::{ParseError, ResponseError, SchemaError};
use storage::repository::StorageError;

use crate::sessions::SessionPhase;

/// Failures of a `QuestionSource` fetch.
///
/// The session engine reports all of these as `SessionError::SourceUnavailable`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SourceError {
    #[error("question source is not configured")]
    Disabled,
    #[error("question source returned an empty response")]
    EmptyResponse,
    #[error("question source request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("question source timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Other(String),
}

/// Errors building an LLM client configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LlmConfigError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

/// An operation was invoked in a phase that does not allow it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StateError {
    #[error("no active session")]
    NoSession,
    #[error("cannot {operation} while the session is {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: SessionPhase,
    },
    #[error("question {requested} is not the active question ({active})")]
    NotActiveQuestion { requested: usize, active: usize },
    #[error("level {requested} cannot be loaded from level {current}")]
    LevelOutOfSequence { requested: u32, current: u32 },
}

/// Errors emitted by the session engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] SessionConfigError),
    #[error("question source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),
    #[error(transparent)]
    Parse(ParseError),
    #[error(transparent)]
    Schema(SchemaError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Level(#[from] LevelResultError),
    #[error(transparent)]
    History(#[from] HistoryEntryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<ResponseError> for SessionError {
    fn from(err: ResponseError) -> Self {
        match err {
            ResponseError::Parse(e) => Self::Parse(e),
            ResponseError::Schema(e) => Self::Schema(e),
        }
    }
}

impl SessionError {
    /// True for failures the caller can retry without restarting the session:
    /// the session is left exactly as it was before the failed call.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable(_) | Self::Parse(_) | Self::Schema(_) | Self::Storage(_)
        )
    }
}
