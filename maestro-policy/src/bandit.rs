//! Per-context multi-armed bandit for action selection.
//!
//! Each decision context (e.g. "content_generation") keeps an action -> stats
//! table. Selection is stateless (`&self`, no mutation); only
//! `update_policy` folds new observations in, and statistics are monotonic -
//! never rolled back.
//!
//! # Algorithms
//! 1. UCB1: score = mean_reward + sqrt(2 ln N / n), zero-pull arms first
//! 2. Thompson sampling: sample reward ~ Beta(successes + 1, failures + 1)
//!    per arm, pick the maximum

use maestro_core::{MaestroResult, PolicyError};
use rand::Rng;
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

// ============================================================================
// ACTION STATISTICS
// ============================================================================

/// Running statistics for one action within a context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ActionStats {
    /// Times this action was selected and updated
    pub pulls: u64,
    /// Incremental mean reward
    pub mean_reward: f64,
    /// Welford M2 accumulator for the reward variance
    pub m2: f64,
    /// Successful outcomes
    pub successes: u64,
    /// Failed outcomes
    pub failures: u64,
    /// Cumulative cost attributed to this action
    pub total_cost: f64,
}

impl ActionStats {
    /// Fold one observation into the running statistics.
    fn record(&mut self, success: bool, reward: f64, cost: f64) {
        self.pulls += 1;
        let delta = reward - self.mean_reward;
        self.mean_reward += delta / self.pulls as f64;
        self.m2 += delta * (reward - self.mean_reward);
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.total_cost += cost;
    }

    /// Sample variance of observed rewards. Zero until two pulls exist.
    pub fn variance(&self) -> f64 {
        if self.pulls < 2 {
            0.0
        } else {
            self.m2 / (self.pulls - 1) as f64
        }
    }

    /// Beta posterior parameters for Thompson sampling, with +1 pseudo-counts
    /// so the distribution is always well-formed.
    pub fn beta_params(&self) -> (f64, f64) {
        (self.successes as f64 + 1.0, self.failures as f64 + 1.0)
    }
}

// ============================================================================
// SELECTION STRATEGY
// ============================================================================

/// Which action-selection rule the engine applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Upper confidence bound: mean + sqrt(2 ln N / n)
    #[default]
    Ucb1,
    /// Beta-posterior Thompson sampling
    Thompson,
}

// ============================================================================
// POLICY ENGINE
// ============================================================================

/// One named decision domain.
#[derive(Debug, Default)]
struct PolicyContext {
    actions: HashMap<String, ActionStats>,
    total_pulls: u64,
}

/// Snapshot of a context's statistics for introspection and persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyContextSnapshot {
    pub context: String,
    pub total_pulls: u64,
    pub actions: HashMap<String, ActionStats>,
}

/// Multi-armed-bandit action selector with reward-based policy updates.
///
/// Contexts are created lazily on first update and persist for the process
/// lifetime. Thread-safe; selection takes a read lock only.
pub struct PolicyEngine {
    contexts: RwLock<HashMap<String, PolicyContext>>,
    strategy: SelectionStrategy,
}

impl PolicyEngine {
    /// Create an engine with the given default selection strategy.
    pub fn new(strategy: SelectionStrategy) -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
            strategy,
        }
    }

    /// Select one of `candidates` for the context using the default strategy.
    ///
    /// Does not mutate any statistics. Candidates the context has never
    /// pulled are chosen first, uniformly at random (forced exploration).
    pub fn select_action(&self, context: &str, candidates: &[String]) -> MaestroResult<String> {
        self.select_with_strategy(context, candidates, self.strategy)
    }

    /// Select with an explicit strategy, overriding the default.
    pub fn select_with_strategy(
        &self,
        context: &str,
        candidates: &[String],
        strategy: SelectionStrategy,
    ) -> MaestroResult<String> {
        if candidates.is_empty() {
            return Err(PolicyError::NoCandidates {
                context: context.to_string(),
            }
            .into());
        }

        let contexts = self.contexts.read().expect("policy table poisoned");
        let ctx = contexts.get(context);

        let mut rng = rand::rng();

        // Forced exploration: any arm without a single pull goes first.
        let unplayed: Vec<&String> = candidates
            .iter()
            .filter(|c| {
                ctx.and_then(|ctx| ctx.actions.get(c.as_str()))
                    .map(|s| s.pulls == 0)
                    .unwrap_or(true)
            })
            .collect();
        if !unplayed.is_empty() {
            let pick = unplayed[rng.random_range(0..unplayed.len())];
            return Ok(pick.clone());
        }

        // All arms have data; ctx must exist past this point.
        let ctx = ctx.expect("played arms imply existing context");

        let selected = match strategy {
            SelectionStrategy::Ucb1 => {
                let ln_n = (ctx.total_pulls.max(1) as f64).ln();
                let mut best = &candidates[0];
                let mut best_score = f64::NEG_INFINITY;
                for candidate in candidates {
                    let stats = &ctx.actions[candidate.as_str()];
                    let exploration = (2.0 * ln_n / stats.pulls as f64).sqrt();
                    let score = stats.mean_reward + exploration;
                    if score > best_score {
                        best_score = score;
                        best = candidate;
                    }
                }
                best.clone()
            }
            SelectionStrategy::Thompson => {
                let mut best = &candidates[0];
                let mut best_sample = f64::NEG_INFINITY;
                for candidate in candidates {
                    let stats = &ctx.actions[candidate.as_str()];
                    let (alpha, beta) = stats.beta_params();
                    let sample = match Beta::new(alpha, beta) {
                        Ok(dist) => dist.sample(&mut rng),
                        // alpha/beta are >= 1.0 by construction; fall back to
                        // the posterior mean if the distribution is rejected
                        Err(_) => alpha / (alpha + beta),
                    };
                    if sample > best_sample {
                        best_sample = sample;
                        best = candidate;
                    }
                }
                best.clone()
            }
        };

        Ok(selected)
    }

    /// Fold one observed outcome into the context's statistics.
    ///
    /// The only mutator on the engine. Creates the context and the action
    /// entry lazily.
    pub fn update_policy(
        &self,
        context: &str,
        action: &str,
        success: bool,
        reward: f64,
        cost: Option<f64>,
    ) {
        let mut contexts = self.contexts.write().expect("policy table poisoned");
        let ctx = contexts.entry(context.to_string()).or_default();
        ctx.total_pulls += 1;
        let stats = ctx.actions.entry(action.to_string()).or_default();
        stats.record(success, reward.clamp(0.0, 1.0), cost.unwrap_or(0.0));

        tracing::debug!(
            context,
            action,
            success,
            reward,
            pulls = stats.pulls,
            mean_reward = stats.mean_reward,
            "Policy updated"
        );
    }

    /// Top-k actions for a context by mean reward, descending.
    pub fn get_best_actions(&self, context: &str, k: usize) -> Vec<(String, f64)> {
        let contexts = self.contexts.read().expect("policy table poisoned");
        let Some(ctx) = contexts.get(context) else {
            return Vec::new();
        };
        let mut ranked: Vec<(String, f64)> = ctx
            .actions
            .iter()
            .map(|(name, stats)| (name.clone(), stats.mean_reward))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(k);
        ranked
    }

    /// Statistics snapshot for a context, if it exists.
    pub fn snapshot(&self, context: &str) -> Option<PolicyContextSnapshot> {
        let contexts = self.contexts.read().expect("policy table poisoned");
        contexts.get(context).map(|ctx| PolicyContextSnapshot {
            context: context.to_string(),
            total_pulls: ctx.total_pulls,
            actions: ctx.actions.clone(),
        })
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new(SelectionStrategy::default())
    }
}

// ============================================================================
// REWARD BLEND
// ============================================================================

/// Combine an outcome into a bounded scalar reward in [0, 1].
///
/// Deterministic given the same inputs: 0.55 for task success, 0.30 weighted
/// by the self-assessed quality score (0.5 when the agent reported none),
/// minus penalties of up to 0.10 for cost (normalized against one currency
/// unit) and 0.05 for latency (normalized against 30s).
pub fn compute_reward(success: bool, quality: Option<f32>, cost: f64, latency_ms: u64) -> f64 {
    let success_term = if success { 0.55 } else { 0.0 };
    let quality_term = 0.30 * quality.unwrap_or(0.5).clamp(0.0, 1.0) as f64;
    let cost_penalty = 0.10 * (cost / 1.0).clamp(0.0, 1.0);
    let latency_penalty = 0.05 * (latency_ms as f64 / 30_000.0).clamp(0.0, 1.0);
    (success_term + quality_term - cost_penalty - latency_penalty).clamp(0.0, 1.0)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_candidates_rejected() {
        let engine = PolicyEngine::default();
        assert!(engine.select_action("content", &[]).is_err());
    }

    #[test]
    fn test_unplayed_arms_selected_first() {
        let engine = PolicyEngine::default();
        let arms = candidates(&["a", "b"]);
        engine.update_policy("content", "a", true, 0.9, None);

        // "b" has zero pulls so it must be chosen every time.
        for _ in 0..20 {
            assert_eq!(engine.select_action("content", &arms).unwrap(), "b");
        }
    }

    #[test]
    fn test_select_does_not_mutate() {
        let engine = PolicyEngine::default();
        let arms = candidates(&["a", "b"]);
        engine.update_policy("content", "a", true, 0.8, None);
        engine.update_policy("content", "b", false, 0.1, None);

        let before = engine.snapshot("content").unwrap();
        for _ in 0..50 {
            engine.select_action("content", &arms).unwrap();
            engine
                .select_with_strategy("content", &arms, SelectionStrategy::Thompson)
                .unwrap();
        }
        let after = engine.snapshot("content").unwrap();
        assert_eq!(before.total_pulls, after.total_pulls);
        assert_eq!(before.actions, after.actions);
    }

    #[test]
    fn test_ucb_prefers_higher_mean_with_equal_pulls() {
        let engine = PolicyEngine::default();
        let arms = candidates(&["good", "bad"]);
        for _ in 0..50 {
            engine.update_policy("ctx", "good", true, 0.9, None);
            engine.update_policy("ctx", "bad", false, 0.1, None);
        }
        assert_eq!(engine.select_action("ctx", &arms).unwrap(), "good");
    }

    #[test]
    fn test_incremental_mean() {
        let engine = PolicyEngine::default();
        engine.update_policy("ctx", "a", true, 1.0, None);
        engine.update_policy("ctx", "a", true, 0.0, None);
        engine.update_policy("ctx", "a", true, 0.5, None);

        let snapshot = engine.snapshot("ctx").unwrap();
        let stats = &snapshot.actions["a"];
        assert_eq!(stats.pulls, 3);
        assert!((stats.mean_reward - 0.5).abs() < 1e-9);
        assert!(stats.variance() > 0.0);
    }

    #[test]
    fn test_stats_monotonic() {
        let engine = PolicyEngine::default();
        engine.update_policy("ctx", "a", false, 0.0, Some(0.3));
        engine.update_policy("ctx", "a", true, 1.0, Some(0.2));

        let stats = engine.snapshot("ctx").unwrap().actions["a"];
        assert_eq!(stats.pulls, 2);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.failures, 1);
        assert!((stats.total_cost - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_get_best_actions_ranked() {
        let engine = PolicyEngine::default();
        for _ in 0..10 {
            engine.update_policy("ctx", "high", true, 0.9, None);
            engine.update_policy("ctx", "mid", true, 0.5, None);
            engine.update_policy("ctx", "low", false, 0.1, None);
        }

        let best = engine.get_best_actions("ctx", 2);
        assert_eq!(best.len(), 2);
        assert_eq!(best[0].0, "high");
        assert_eq!(best[1].0, "mid");

        assert!(engine.get_best_actions("missing", 3).is_empty());
    }

    #[test]
    fn test_thompson_explores_uncertain_arms() {
        let engine = PolicyEngine::default();
        let arms = candidates(&["confident", "uncertain"]);
        // Confident arm: many pulls, decent record. Uncertain arm: one pull.
        for _ in 0..30 {
            engine.update_policy("ctx", "confident", true, 0.8, None);
        }
        engine.update_policy("ctx", "uncertain", true, 0.8, None);

        let mut uncertain_picks = 0;
        for _ in 0..500 {
            let pick = engine
                .select_with_strategy("ctx", &arms, SelectionStrategy::Thompson)
                .unwrap();
            if pick == "uncertain" {
                uncertain_picks += 1;
            }
        }
        // Beta(2,1) vs Beta(31,1): the wide posterior must win sometimes.
        assert!(
            uncertain_picks > 0,
            "Thompson sampling never explored the uncertain arm"
        );
    }

    #[test]
    fn test_compute_reward_deterministic_and_bounded() {
        let r1 = compute_reward(true, Some(0.8), 0.1, 2_000);
        let r2 = compute_reward(true, Some(0.8), 0.1, 2_000);
        assert_eq!(r1, r2);
        assert!(r1 > 0.0 && r1 <= 1.0);

        // Failure with maximum penalties still bounded at zero.
        assert_eq!(compute_reward(false, Some(0.0), 10.0, 600_000), 0.0);
        // Perfect outcome bounded at one.
        assert!(compute_reward(true, Some(1.0), 0.0, 0) <= 1.0);
    }
}
