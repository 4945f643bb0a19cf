use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── QUESTION STATS ────────────────────────────────────────────────────────────
//

/// Per-question performance counters.
///
/// Created lazily the first time a question is selected or observed, with the
/// configured default weight and zero attempts. Counters only ever increase;
/// the weight is recomputed by the weight engine after every attempt and is
/// never set directly by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionStats {
    pub attempts: u32,
    pub successes: u32,
    pub weight: f64,
    pub last_seen: Option<DateTime<Utc>>,
}

impl QuestionStats {
    /// A fresh record with no attempts and the given default weight.
    #[must_use]
    pub fn fresh(default_weight: f64) -> Self {
        Self {
            attempts: 0,
            successes: 0,
            weight: default_weight,
            last_seen: None,
        }
    }

    /// Rebuild a record from persisted fields.
    ///
    /// # Errors
    ///
    /// Returns `StatsError` if the counters or weight violate the record
    /// invariants (`successes <= attempts`, weight finite and positive).
    pub fn from_persisted(
        id: QuestionId,
        attempts: u32,
        successes: u32,
        weight: f64,
        last_seen: Option<DateTime<Utc>>,
    ) -> Result<Self, StatsError> {
        if successes > attempts {
            return Err(StatsError::SuccessesExceedAttempts {
                id,
                attempts,
                successes,
            });
        }
        if !weight.is_finite() || weight <= 0.0 {
            return Err(StatsError::InvalidWeight { id, weight });
        }

        Ok(Self {
            attempts,
            successes,
            weight,
            last_seen,
        })
    }

    /// Fold one answered attempt into the counters and stamp `last_seen`.
    ///
    /// The weight is left untouched; the caller recomputes it from the updated
    /// counters.
    pub fn record(&mut self, was_correct: bool, seen_at: DateTime<Utc>) {
        self.attempts = self.attempts.saturating_add(1);
        if was_correct {
            self.successes = self.successes.saturating_add(1);
        }
        self.last_seen = Some(seen_at);
    }

    /// Overall success rate; 0.0 for unattempted questions.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            f64::from(self.successes) / f64::from(self.attempts)
        }
    }
}

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StatsError {
    #[error("question {id}: successes ({successes}) exceed attempts ({attempts})")]
    SuccessesExceedAttempts {
        id: QuestionId,
        attempts: u32,
        successes: u32,
    },

    #[error("question {id}: weight {weight} is not finite and positive")]
    InvalidWeight { id: QuestionId, weight: f64 },
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
