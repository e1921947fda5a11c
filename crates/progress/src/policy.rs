//! Progression decision policy.

use drill_core::Evolution;
use serde::{Deserialize, Serialize};

use crate::error::{ProgressError, Result};

/// Success rate at or above which the learner advances.
///
/// Product has used both 0.8 and 0.95 here; 0.8 is the default until settled.
pub const ADVANCE_THRESHOLD: f64 = 0.8;

/// Success rate strictly below which the learner regresses.
pub const REGRESS_THRESHOLD: f64 = 0.5;

/// Outcome of applying the policy to a success rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Move to the next-harder level
    Advance,
    /// Stay on the current level
    Hold,
    /// Move to the next-easier level
    Regress,
}

impl Decision {
    /// Evolution tag recorded for this decision.
    pub fn evolution(&self) -> Evolution {
        match self {
            Decision::Advance => Evolution::Advanced,
            Decision::Hold => Evolution::Held,
            Decision::Regress => Evolution::Regressed,
        }
    }
}

/// Thresholds applied to a window's success rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionPolicy {
    /// Rate at or above which the learner advances
    pub advance_threshold: f64,
    /// Rate below which the learner regresses
    pub regress_threshold: f64,
}

impl Default for ProgressionPolicy {
    fn default() -> Self {
        Self {
            advance_threshold: ADVANCE_THRESHOLD,
            regress_threshold: REGRESS_THRESHOLD,
        }
    }
}

impl ProgressionPolicy {
    /// Check that both thresholds lie in `[0, 1]` and regress < advance.
    pub fn validate(&self) -> Result<()> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(self.advance_threshold) || !in_unit(self.regress_threshold) {
            return Err(ProgressError::InvalidPolicy(format!(
                "thresholds must lie in [0, 1], got advance={} regress={}",
                self.advance_threshold, self.regress_threshold
            )));
        }
        if self.regress_threshold >= self.advance_threshold {
            return Err(ProgressError::InvalidPolicy(format!(
                "regress threshold {} must be below advance threshold {}",
                self.regress_threshold, self.advance_threshold
            )));
        }
        Ok(())
    }

    /// Decide what a (rounded) success rate means.
    pub fn decide(&self, success_rate: f64) -> Decision {
        if success_rate >= self.advance_threshold {
            Decision::Advance
        } else if success_rate < self.regress_threshold {
            Decision::Regress
        } else {
            Decision::Hold
        }
    }
}

/// `correct / total`, rounded to two decimal places.
pub fn success_rate(correct: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let rate = correct as f64 / total as f64;
    (rate * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries() {
        let policy = ProgressionPolicy::default();
        assert_eq!(policy.decide(success_rate(8, 10)), Decision::Advance);
        assert_eq!(policy.decide(success_rate(5, 10)), Decision::Hold);
        assert_eq!(policy.decide(success_rate(79, 100)), Decision::Hold);
        assert_eq!(policy.decide(success_rate(49, 100)), Decision::Regress);
        assert_eq!(policy.decide(1.0), Decision::Advance);
        assert_eq!(policy.decide(0.0), Decision::Regress);
    }

    #[test]
    fn test_rate_is_rounded_to_two_places() {
        assert_eq!(success_rate(2, 3), 0.67);
        assert_eq!(success_rate(1, 3), 0.33);
        assert_eq!(success_rate(9, 10), 0.9);
        assert_eq!(success_rate(0, 0), 0.0);
    }

    #[test]
    fn test_stricter_advance_threshold() {
        let policy = ProgressionPolicy {
            advance_threshold: 0.95,
            ..ProgressionPolicy::default()
        };
        assert_eq!(policy.decide(0.9), Decision::Hold);
        assert_eq!(policy.decide(0.95), Decision::Advance);
    }

    #[test]
    fn test_validate() {
        assert!(ProgressionPolicy::default().validate().is_ok());
        let inverted = ProgressionPolicy {
            advance_threshold: 0.4,
            regress_threshold: 0.5,
        };
        assert!(inverted.validate().is_err());
        let out_of_range = ProgressionPolicy {
            advance_threshold: 1.5,
            regress_threshold: 0.5,
        };
        assert!(out_of_range.validate().is_err());
    }

    #[test]
    fn test_decision_tags() {
        assert_eq!(Decision::Advance.evolution(), Evolution::Advanced);
        assert_eq!(Decision::Hold.evolution(), Evolution::Held);
        assert_eq!(Decision::Regress.evolution(), Evolution::Regressed);
    }
}
