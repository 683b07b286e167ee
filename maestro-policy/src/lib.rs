//! MAESTRO Policy - Action Selection, Budget, and Safety
//!
//! The three gating collaborators of the autonomous decision loop:
//! - `PolicyEngine`: per-context multi-armed bandit (UCB1 or Thompson
//!   sampling) with reward-based updates
//! - `BudgetGovernor`: rolling day/month spend tracking, cost estimation,
//!   and tier selection
//! - `SafetyGate`: deny-list, PII, and instruction-override content scoring
//!
//! All three are plain synchronous components; callers hold them behind
//! `Arc` and share them between the wrapper, the scheduler, and request
//! handlers.

mod bandit;
mod budget;
mod safety;

pub use bandit::{
    compute_reward, ActionStats, PolicyContextSnapshot, PolicyEngine, SelectionStrategy,
};
pub use budget::{BudgetConfig, BudgetDecision, BudgetGovernor, CostTier, TierCost};
pub use safety::{SafetyConfig, SafetyGate, SafetyIssue, SafetyIssueKind, SafetyLevel, SafetyReport};
