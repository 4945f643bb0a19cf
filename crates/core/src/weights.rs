use thiserror::Error;

use crate::config::{ConfigError, EngineConfig};
use crate::model::QuestionStats;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WeightError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("corrupt stats: successes ({successes}) exceed attempts ({attempts})")]
    CorruptStats { attempts: u32, successes: u32 },
}

//
// ─── WEIGHT ENGINE ─────────────────────────────────────────────────────────────
//

/// Computes a question's selection weight from its statistics.
///
/// The weight is the question's relative probability mass under weighted
/// sampling: higher weight means the question resurfaces more often. The
/// mapping from success rate to weight is an exponential decay, so a single
/// failure (which lowers the success rate) raises the weight sharply, while a
/// long run of successes pushes it toward the floor without ever reaching
/// zero.
///
/// # Examples
///
/// ```
/// # use quiz_core::weights::WeightEngine;
/// # use quiz_core::model::QuestionStats;
/// let engine = WeightEngine::new();
///
/// // Unattempted questions keep the default weight.
/// let fresh = QuestionStats::fresh(engine.config().default_weight);
/// assert_eq!(engine.compute_weight(&fresh)?, 10.0);
/// # Ok::<(), quiz_core::weights::WeightError>(())
/// ```
#[derive(Debug, Clone)]
pub struct WeightEngine {
    config: EngineConfig,
}

impl WeightEngine {
    /// Create an engine with the default tuning.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
            .expect("default engine config should be valid")
    }

    /// Create an engine with custom tuning without panicking.
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

    /// Compute the selection weight for a question's current statistics.
    ///
    /// - Zero attempts: the default weight, unconditionally.
    /// - Below the confidence threshold: the success rate is not yet trusted,
    ///   so the raw decayed weight is blended toward the default in proportion
    ///   to `attempts / confidence_threshold`. A single early failure cannot
    ///   catapult the weight straight to the ceiling.
    /// - At or above the threshold: pure exponential decay on the capped
    ///   success rate, clamped to `[floor, ceil]`.
    ///
    /// The result is always finite and strictly positive.
    ///
    /// # Errors
    ///
    /// Returns `WeightError::CorruptStats` if `successes > attempts`. That
    /// indicates caller misuse and is fatal, never recovered.
    pub fn compute_weight(&self, stats: &QuestionStats) -> Result<f64, WeightError> {
        if stats.successes > stats.attempts {
            return Err(WeightError::CorruptStats {
                attempts: stats.attempts,
                successes: stats.successes,
            });
        }

        let cfg = &self.config;
        if stats.attempts == 0 {
            return Ok(cfg.default_weight);
        }

        let capped_rate = stats.success_rate().min(cfg.success_rate_cap);
        let span = cfg.weight_ceil - cfg.weight_floor;
        let raw = cfg.weight_floor + span * (-cfg.decay_rate * capped_rate).exp();

        let weight = if stats.attempts < cfg.confidence_threshold {
            let confidence =
                f64::from(stats.attempts) / f64::from(cfg.confidence_threshold);
            cfg.default_weight - (cfg.default_weight - raw) * confidence
        } else {
            raw
        };

        Ok(weight.clamp(cfg.weight_floor, cfg.weight_ceil))
    }
}

impl Default for WeightEngine {
    fn default() -> Self {
        Self::new()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn stats(attempts: u32, successes: u32) -> QuestionStats {
        QuestionStats {
            attempts,
            successes,
            weight: 10.0,
            last_seen: None,
        }
    }

    #[test]
    fn zero_attempts_returns_default_weight() {
        let engine = WeightEngine::new();
        let w = engine.compute_weight(&stats(0, 0)).unwrap();
        assert_eq!(w, 10.0);
    }

    #[test]
    fn three_straight_failures_sit_at_the_ceiling() {
        // Success rate 0 means no decay at all, so the weight stays at the
        // ceiling and never exceeds it.
        let engine = WeightEngine::new();
        let w = engine.compute_weight(&stats(3, 0)).unwrap();
        assert_eq!(w, 10.0);
    }

    #[test]
    fn sustained_success_approaches_the_floor() {
        let engine = WeightEngine::new();
        let w = engine.compute_weight(&stats(20, 20)).unwrap();
        let floor = engine.config().weight_floor;
        assert!(w >= floor);
        assert!(w < 2.0, "expected near-floor weight, got {w}");
    }

    #[test]
    fn perfect_streak_never_reaches_zero_or_floor_underflow() {
        // The success-rate cap keeps even a perfect record selectable.
        let engine = WeightEngine::new();
        for attempts in 1..=50 {
            let w = engine.compute_weight(&stats(attempts, attempts)).unwrap();
            assert!(w >= engine.config().weight_floor);
            assert!(w.is_finite());
            assert!(w > 0.0);
        }
    }

    #[test]
    fn weight_stays_within_bounds_for_all_counter_shapes() {
        let engine = WeightEngine::new();
        let cfg = *engine.config();
        for attempts in 0..=30 {
            for successes in 0..=attempts {
                let w = engine.compute_weight(&stats(attempts, successes)).unwrap();
                assert!(w >= cfg.weight_floor, "({attempts},{successes}) -> {w}");
                assert!(w <= cfg.weight_ceil, "({attempts},{successes}) -> {w}");
            }
        }
    }

    #[test]
    fn at_fixed_attempts_weight_is_non_increasing_in_successes() {
        // Swapping one recorded failure for a success may only lower (or keep)
        // the weight, and vice versa.
        let engine = WeightEngine::new();
        for attempts in 1..=20 {
            let mut previous = f64::INFINITY;
            for successes in 0..=attempts {
                let w = engine.compute_weight(&stats(attempts, successes)).unwrap();
                assert!(
                    w <= previous + 1e-12,
                    "weight increased with successes at attempts={attempts}"
                );
                previous = w;
            }
        }
    }

    #[test]
    fn early_failure_is_softened_by_the_confidence_blend() {
        // One failure out of one attempt: raw decay says ceiling, but with only
        // a third of the needed confidence the blend keeps some distance from
        // a fully-confident all-failure record only when the default differs
        // from the ceiling. With default == ceiling both land on 10.0.
        let engine = WeightEngine::new();
        let one_failure = engine.compute_weight(&stats(1, 0)).unwrap();
        assert_eq!(one_failure, 10.0);

        // One success out of one attempt must not slam to the near-floor raw
        // value the way a confident perfect record does.
        let one_success = engine.compute_weight(&stats(1, 1)).unwrap();
        let confident_success = engine.compute_weight(&stats(3, 3)).unwrap();
        assert!(one_success > confident_success);
        assert!(one_success < 10.0);
    }

    #[test]
    fn compute_weight_rejects_corrupt_counters() {
        let engine = WeightEngine::new();
        let err = engine.compute_weight(&stats(1, 2)).unwrap_err();
        assert!(matches!(err, WeightError::CorruptStats { .. }));
    }

    #[test]
    fn with_config_rejects_invalid_tuning() {
        let cfg = EngineConfig {
            decay_rate: f64::NAN,
            ..EngineConfig::default()
        };
        assert!(matches!(
            WeightEngine::with_config(cfg),
            Err(WeightError::Config(_))
        ));
    }

    #[test]
    fn recorded_attempt_then_recompute_keeps_invariants() {
        let engine = WeightEngine::new();
        let mut s = QuestionStats::fresh(engine.config().default_weight);
        for i in 0..10 {
            s.record(i % 3 != 0, fixed_now());
            s.weight = engine.compute_weight(&s).unwrap();
            assert!(s.weight >= engine.config().weight_floor);
            assert!(s.weight <= engine.config().weight_ceil);
            assert!(s.successes <= s.attempts);
        }
    }
}
