//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::QuestionId;
use storage::repository::StorageError;

/// Errors raised while selecting the next question.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SelectError {
    /// Configuration error: a catalog with no questions cannot drive a quiz.
    /// Fatal; surfaced to the caller, never retried.
    #[error("no eligible questions: the catalog is empty")]
    EmptyCatalog,
}

/// Errors emitted by `QuizService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizServiceError {
    /// An answer was submitted for a question id the catalog does not know.
    /// Rejected before any state mutation.
    #[error("unknown question id {id}")]
    QuestionNotFound { id: QuestionId },

    #[error(transparent)]
    Select(#[from] SelectError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
