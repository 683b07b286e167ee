//! Decisions and autonomy levels.

use serde::{Deserialize, Serialize};

// ============================================================================
// DECISION
// ============================================================================

/// What the decision loop intends to do with an analysis result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    /// Proceed to action generation and gating
    ExecuteNow,
    /// Generate actions but force them through human review
    ReviewRequired,
    /// Stop the cycle without generating actions
    Reject,
}

/// A decision derived from an analysis result, either extracted from the
/// agent's own output or synthesized from a numeric score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: DecisionAction,
    /// Confidence in the decision, 0.0 to 1.0
    pub confidence: f32,
    /// Short human-readable rationale
    pub reasoning: String,
}

impl Decision {
    /// Synthesize a decision from a numeric analysis score using the
    /// configured bands.
    pub fn from_score(score: f32, bands: &DecisionBands) -> Self {
        let score = score.clamp(0.0, 1.0);
        let action = if score >= bands.execute_min {
            DecisionAction::ExecuteNow
        } else if score >= bands.review_min {
            DecisionAction::ReviewRequired
        } else {
            DecisionAction::Reject
        };
        Self {
            action,
            confidence: score,
            reasoning: format!("synthesized from analysis score {:.2}", score),
        }
    }
}

/// Score bands for synthesizing a decision when the analysis result carries
/// none. Configurable defaults, not load-bearing business rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionBands {
    /// Minimum score for `ExecuteNow`
    pub execute_min: f32,
    /// Minimum score for `ReviewRequired`; below this the cycle rejects
    pub review_min: f32,
}

impl Default for DecisionBands {
    fn default() -> Self {
        Self {
            execute_min: 0.7,
            review_min: 0.4,
        }
    }
}

// ============================================================================
// AUTONOMY LEVEL
// ============================================================================

/// Ordinal setting controlling how much human approval an action requires.
/// Levels are strictly ordered: Manual < Assisted < Supervised < Autonomous
/// < Proactive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    /// Every action requires human approval
    Manual,
    /// Low-risk, high-confidence actions may auto-execute
    #[default]
    Assisted,
    /// Allowed action types auto-execute above the confidence threshold
    Supervised,
    /// Auto-execution is the default; only blocked types and high risk queue
    Autonomous,
    /// As Autonomous, and the loop may act without an external trigger
    Proactive,
}

impl AutonomyLevel {
    /// Whether this level permits any auto-execution at all.
    pub fn allows_auto_execution(&self) -> bool {
        *self >= AutonomyLevel::Assisted
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_bands() {
        let bands = DecisionBands::default();
        assert_eq!(
            Decision::from_score(0.9, &bands).action,
            DecisionAction::ExecuteNow
        );
        assert_eq!(
            Decision::from_score(0.7, &bands).action,
            DecisionAction::ExecuteNow
        );
        assert_eq!(
            Decision::from_score(0.5, &bands).action,
            DecisionAction::ReviewRequired
        );
        assert_eq!(
            Decision::from_score(0.39, &bands).action,
            DecisionAction::Reject
        );
    }

    #[test]
    fn test_from_score_clamps() {
        let bands = DecisionBands::default();
        let decision = Decision::from_score(3.0, &bands);
        assert_eq!(decision.confidence, 1.0);
        assert_eq!(decision.action, DecisionAction::ExecuteNow);
    }

    #[test]
    fn test_autonomy_ordering() {
        assert!(AutonomyLevel::Manual < AutonomyLevel::Assisted);
        assert!(AutonomyLevel::Assisted < AutonomyLevel::Supervised);
        assert!(AutonomyLevel::Supervised < AutonomyLevel::Autonomous);
        assert!(AutonomyLevel::Autonomous < AutonomyLevel::Proactive);
        assert!(!AutonomyLevel::Manual.allows_auto_execution());
        assert!(AutonomyLevel::Supervised.allows_auto_execution());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// A higher score never produces a weaker decision.
            #[test]
            fn prop_from_score_is_monotone(a in 0.0f32..=1.0, b in 0.0f32..=1.0) {
                let bands = DecisionBands::default();
                let (low, high) = if a <= b { (a, b) } else { (b, a) };
                let rank = |d: DecisionAction| match d {
                    DecisionAction::Reject => 0,
                    DecisionAction::ReviewRequired => 1,
                    DecisionAction::ExecuteNow => 2,
                };
                let low_rank = rank(Decision::from_score(low, &bands).action);
                let high_rank = rank(Decision::from_score(high, &bands).action);
                prop_assert!(low_rank <= high_rank);
            }
        }
    }
}
