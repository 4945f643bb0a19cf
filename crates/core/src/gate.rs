use std::collections::HashMap;

use crate::config::EngineConfig;
use crate::model::{Catalog, Progress, QuestionId, QuestionStats};
use crate::weights::WeightError;

//
// ─── GATE DECISION ─────────────────────────────────────────────────────────────
//

/// Outcome of a gate evaluation.
///
/// `advanced` is true only when the cursor actually moved; mastering the final
/// chunk reports `mastered` with the cursor unchanged (terminal state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    pub progress: Progress,
    pub mastered: bool,
    pub advanced: bool,
}

//
// ─── CHUNK GATE ────────────────────────────────────────────────────────────────
//

/// Decides whether the learner has mastered the active chunk.
///
/// The gate is a forward-only state machine over chunk indices: evaluation
/// either leaves the cursor where it is or moves it one chunk ahead, never
/// back. It is pure; callers pass a stats snapshot and persist the returned
/// progress themselves.
///
/// Mastery policy: aggregate the capped success rate over the active chunk's
/// questions that have reached the confidence threshold. Questions with fewer
/// attempts neither block nor help the aggregate, but every question in the
/// chunk must have been attempted at least once, and at least one question
/// must qualify for the aggregate, so an untouched chunk can never unlock the
/// next one.
#[derive(Debug, Clone)]
pub struct ChunkGate {
    config: EngineConfig,
}

impl ChunkGate {
    /// Create a gate with the default tuning.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default()).expect("default engine config should be valid")
    }

    /// Create a gate with custom tuning without panicking.
    ///
    /// # Errors
    ///
    /// Returns `WeightError::Config` if the config violates its invariants.
    pub fn with_config(config: EngineConfig) -> Result<Self, WeightError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate mastery of the active chunk and advance the cursor if earned.
    ///
    /// Call after every recorded attempt. Missing stats entries count as zero
    /// attempts. Idempotent: evaluating twice with no intervening attempts
    /// advances at most once, because the new active chunk starts unattempted.
    #[must_use]
    pub fn evaluate(
        &self,
        progress: Progress,
        catalog: &Catalog,
        stats: &HashMap<QuestionId, QuestionStats>,
    ) -> GateDecision {
        let chunk = progress.current_chunk();

        let mut all_attempted = true;
        let mut qualified = 0u32;
        let mut rate_sum = 0.0;

        for question in catalog.chunk_questions(chunk) {
            let (attempts, rate) = stats
                .get(&question.id())
                .map_or((0, 0.0), |s| (s.attempts, s.success_rate()));

            if attempts == 0 {
                all_attempted = false;
            }
            if attempts >= self.config.confidence_threshold {
                qualified += 1;
                rate_sum += rate.min(self.config.success_rate_cap);
            }
        }

        let mastered = all_attempted
            && qualified > 0
            && rate_sum / f64::from(qualified) >= self.config.mastery_threshold;

        let next = if mastered {
            progress.advanced(catalog.max_chunk())
        } else {
            progress
        };

        GateDecision {
            progress: next,
            mastered,
            advanced: next != progress,
        }
    }
}

impl Default for ChunkGate {
    fn default() -> Self {
        Self::new()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
