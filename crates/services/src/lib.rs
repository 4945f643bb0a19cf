#![forbid(unsafe_code)]

pub mod error;
pub mod quiz_service;
pub mod selector;

pub use error::{QuizServiceError, SelectError};
pub use quiz_service::{ChunkProgress, Outcome, ProgressOverview, QuizService, StatsLine};
pub use selector::answer_options;
