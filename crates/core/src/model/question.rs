use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── QUESTION TYPES ────────────────────────────────────────────────────────────
//

/// Unvalidated question input, as produced by import tooling.
///
/// Distractors may contain blank entries (import sources pad their rows);
/// validation drops them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionDraft {
    pub prompt: String,
    pub answer: String,
    pub distractors: Vec<String>,
    pub chunk: u32,
}

impl QuestionDraft {
    /// Validate the draft and assign its identifier.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if prompt or answer is empty after trimming.
    pub fn validate(self, id: QuestionId) -> Result<Question, QuestionError> {
        let prompt = self.prompt.trim().to_owned();
        if prompt.is_empty() {
            return Err(QuestionError::EmptyPrompt { id });
        }

        let answer = self.answer.trim().to_owned();
        if answer.is_empty() {
            return Err(QuestionError::EmptyAnswer { id });
        }

        let distractors = self
            .distractors
            .into_iter()
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty())
            .collect();

        Ok(Question {
            id,
            prompt,
            answer,
            distractors,
            chunk: self.chunk,
        })
    }
}

/// A quiz question. Immutable once imported; never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    prompt: String,
    answer: String,
    distractors: Vec<String>,
    chunk: u32,
}

impl Question {
    /// Rebuild a question from already-persisted fields.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if prompt or answer is empty.
    pub fn from_persisted(
        id: QuestionId,
        prompt: String,
        answer: String,
        distractors: Vec<String>,
        chunk: u32,
    ) -> Result<Self, QuestionError> {
        QuestionDraft {
            prompt,
            answer,
            distractors,
            chunk,
        }
        .validate(id)
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn answer(&self) -> &str {
        &self.answer
    }

    #[must_use]
    pub fn distractors(&self) -> &[String] {
        &self.distractors
    }

    /// Index of the chunk this question belongs to.
    #[must_use]
    pub fn chunk(&self) -> u32 {
        self.chunk
    }
}

//
// ─── VALIDATION ERRORS ─────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuestionError {
    #[error("question {id} has an empty prompt")]
    EmptyPrompt { id: QuestionId },

    #[error("question {id} has an empty answer")]
    EmptyAnswer { id: QuestionId },
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
