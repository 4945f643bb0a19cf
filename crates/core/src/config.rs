use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ENGINE CONFIG ─────────────────────────────────────────────────────────────
//

/// The single tuning surface for the adaptive engine.
///
/// Both the weight engine and the chunk gate read from one config so the
/// shared constants (notably the confidence threshold) cannot drift apart.
///
/// # Fields
///
/// * `default_weight` - weight assigned to questions with no attempts (10.0)
/// * `weight_floor` / `weight_ceil` - hard clamp bounds for computed weights
/// * `decay_rate` - steepness of the exponential decay on success rate
/// * `confidence_threshold` - attempts needed before a success rate is trusted
/// * `success_rate_cap` - ceiling applied to success rates so a lucky streak
///   never drives a weight to the floor and starves the question
/// * `mastery_threshold` - aggregate success rate required to unlock a chunk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub default_weight: f64,
    pub weight_floor: f64,
    pub weight_ceil: f64,
    pub decay_rate: f64,
    pub confidence_threshold: u32,
    pub success_rate_cap: f64,
    pub mastery_threshold: f64,
}

impl EngineConfig {
    /// Check the config invariants without panicking.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` describing the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.weight_floor.is_finite() || self.weight_floor <= 0.0 {
            return Err(ConfigError::InvalidFloor {
                provided: self.weight_floor,
            });
        }
        if !self.weight_ceil.is_finite() || self.weight_ceil < self.weight_floor {
            return Err(ConfigError::InvalidCeil {
                provided: self.weight_ceil,
            });
        }
        if !(self.weight_floor..=self.weight_ceil).contains(&self.default_weight) {
            return Err(ConfigError::DefaultOutOfBounds {
                provided: self.default_weight,
            });
        }
        if !self.decay_rate.is_finite() || self.decay_rate < 0.0 {
            return Err(ConfigError::InvalidDecayRate {
                provided: self.decay_rate,
            });
        }
        if self.confidence_threshold == 0 {
            return Err(ConfigError::ZeroConfidenceThreshold);
        }
        if !(0.0..=1.0).contains(&self.success_rate_cap) || self.success_rate_cap == 0.0 {
            return Err(ConfigError::InvalidRate {
                field: "success_rate_cap",
                provided: self.success_rate_cap,
            });
        }
        if !(0.0..=1.0).contains(&self.mastery_threshold) || self.mastery_threshold == 0.0 {
            return Err(ConfigError::InvalidRate {
                field: "mastery_threshold",
                provided: self.mastery_threshold,
            });
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_weight: 10.0,
            weight_floor: 1.0,
            weight_ceil: 10.0,
            decay_rate: 4.0,
            confidence_threshold: 3,
            success_rate_cap: 0.95,
            mastery_threshold: 0.80,
        }
    }
}

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("weight floor must be finite and positive, got {provided}")]
    InvalidFloor { provided: f64 },

    #[error("weight ceiling must be finite and >= the floor, got {provided}")]
    InvalidCeil { provided: f64 },

    #[error("default weight must lie within [floor, ceil], got {provided}")]
    DefaultOutOfBounds { provided: f64 },

    #[error("decay rate must be finite and non-negative, got {provided}")]
    InvalidDecayRate { provided: f64 },

    #[error("confidence threshold must be at least 1")]
    ZeroConfidenceThreshold,

    #[error("{field} must be in (0, 1], got {provided}")]
    InvalidRate { field: &'static str, provided: f64 },
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_bounds() {
        let cfg = EngineConfig {
            weight_floor: 5.0,
            weight_ceil: 1.0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidCeil { .. })
        ));
    }

    #[test]
    fn rejects_zero_floor() {
        let cfg = EngineConfig {
            weight_floor: 0.0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidFloor { .. })
        ));
    }

    #[test]
    fn rejects_default_weight_outside_bounds() {
        let cfg = EngineConfig {
            default_weight: 50.0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::DefaultOutOfBounds { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_rates() {
        for (cap, mastery) in [(0.0, 0.8), (1.5, 0.8), (0.95, 0.0), (0.95, 1.1)] {
            let cfg = EngineConfig {
                success_rate_cap: cap,
                mastery_threshold: mastery,
                ..EngineConfig::default()
            };
            assert!(matches!(cfg.validate(), Err(ConfigError::InvalidRate { .. })));
        }
    }

    #[test]
    fn rejects_zero_confidence_threshold() {
        let cfg = EngineConfig {
            confidence_threshold: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::ZeroConfidenceThreshold)
        ));
    }
}
