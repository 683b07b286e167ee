//! Budget governor: spend tracking, cost estimation, and tier selection.
//!
//! Tracks cumulative cost per rolling day and month against configured
//! ceilings. `record_usage` is the only mutator and must be called exactly
//! once per billable action; every other method is a read.

use chrono::{Datelike, NaiveDate, Utc};
use maestro_core::Timestamp;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

// ============================================================================
// COST TIERS
// ============================================================================

/// Quality/cost tier for a billable call.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum CostTier {
    Economy,
    #[default]
    Standard,
    Premium,
}

impl CostTier {
    /// The next cheaper tier, if any.
    pub fn downgrade(&self) -> Option<CostTier> {
        match self {
            CostTier::Premium => Some(CostTier::Standard),
            CostTier::Standard => Some(CostTier::Economy),
            CostTier::Economy => None,
        }
    }
}

/// Cost table entry for one tier, in account currency units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierCost {
    /// Flat cost per call
    pub base: f64,
    /// Cost per 1000 input units
    pub per_kilo_input: f64,
    /// Cost per 1000 output units
    pub per_kilo_output: f64,
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Budget governor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Hard ceiling on spend per calendar day (default: 25.0)
    pub daily_limit: f64,
    /// Hard ceiling on spend per calendar month (default: 400.0)
    pub monthly_limit: f64,
    /// When remaining daily budget falls below this fraction, prefer a
    /// cheaper tier (default: 0.2)
    pub downgrade_threshold: f64,
    /// Importance at or above which a call keeps its preferred tier despite
    /// a low remaining budget (default: 0.8)
    pub importance_override: f32,
    pub economy: TierCost,
    pub standard: TierCost,
    pub premium: TierCost,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_limit: 25.0,
            monthly_limit: 400.0,
            downgrade_threshold: 0.2,
            importance_override: 0.8,
            economy: TierCost {
                base: 0.0005,
                per_kilo_input: 0.0003,
                per_kilo_output: 0.0015,
            },
            standard: TierCost {
                base: 0.001,
                per_kilo_input: 0.003,
                per_kilo_output: 0.015,
            },
            premium: TierCost {
                base: 0.002,
                per_kilo_input: 0.015,
                per_kilo_output: 0.075,
            },
        }
    }
}

impl BudgetConfig {
    /// Create a BudgetConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `MAESTRO_BUDGET_DAILY_LIMIT`: daily ceiling (default: 25.0)
    /// - `MAESTRO_BUDGET_MONTHLY_LIMIT`: monthly ceiling (default: 400.0)
    /// - `MAESTRO_BUDGET_DOWNGRADE_THRESHOLD`: low-budget fraction (default: 0.2)
    /// - `MAESTRO_BUDGET_IMPORTANCE_OVERRIDE`: override importance (default: 0.8)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            daily_limit: env_f64("MAESTRO_BUDGET_DAILY_LIMIT", defaults.daily_limit),
            monthly_limit: env_f64("MAESTRO_BUDGET_MONTHLY_LIMIT", defaults.monthly_limit),
            downgrade_threshold: env_f64(
                "MAESTRO_BUDGET_DOWNGRADE_THRESHOLD",
                defaults.downgrade_threshold,
            ),
            importance_override: env_f64(
                "MAESTRO_BUDGET_IMPORTANCE_OVERRIDE",
                defaults.importance_override as f64,
            ) as f32,
            ..defaults
        }
    }

    /// Cost table entry for a tier.
    pub fn cost_for(&self, tier: CostTier) -> TierCost {
        match tier {
            CostTier::Economy => self.economy,
            CostTier::Standard => self.standard,
            CostTier::Premium => self.premium,
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

// ============================================================================
// GOVERNOR
// ============================================================================

/// Result of a spend-approval check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetDecision {
    pub allowed: bool,
    /// Human-readable reason, also used for approval-queue entries
    pub reason: String,
}

#[derive(Debug)]
struct BudgetState {
    day: NaiveDate,
    day_spend: f64,
    month: (i32, u32),
    month_spend: f64,
}

/// Tracks spend against rolling day/month ceilings and selects cost tiers.
pub struct BudgetGovernor {
    config: BudgetConfig,
    state: Mutex<BudgetState>,
}

impl BudgetGovernor {
    pub fn new(config: BudgetConfig) -> Self {
        let today = Utc::now().date_naive();
        Self {
            config,
            state: Mutex::new(BudgetState {
                day: today,
                day_spend: 0.0,
                month: (today.year(), today.month()),
                month_spend: 0.0,
            }),
        }
    }

    /// Estimate the cost of a call. Pure function of the per-tier cost table.
    pub fn estimate_cost(&self, tier: CostTier, input_size: usize, output_size: usize) -> f64 {
        let cost = self.config.cost_for(tier);
        cost.base
            + cost.per_kilo_input * (input_size as f64 / 1000.0)
            + cost.per_kilo_output * (output_size as f64 / 1000.0)
    }

    /// Check whether a spend of `estimated_cost` is allowed right now.
    /// Callers must check this before spending.
    pub fn can_execute(&self, estimated_cost: f64) -> BudgetDecision {
        self.can_execute_at(estimated_cost, Utc::now())
    }

    fn can_execute_at(&self, estimated_cost: f64, now: Timestamp) -> BudgetDecision {
        let mut state = self.state.lock().expect("budget state poisoned");
        roll_windows(&mut state, now);

        if state.day_spend + estimated_cost > self.config.daily_limit {
            return BudgetDecision {
                allowed: false,
                reason: format!(
                    "daily budget exceeded: spent {:.4} of {:.4}, estimate {:.4}",
                    state.day_spend, self.config.daily_limit, estimated_cost
                ),
            };
        }
        if state.month_spend + estimated_cost > self.config.monthly_limit {
            return BudgetDecision {
                allowed: false,
                reason: format!(
                    "monthly budget exceeded: spent {:.4} of {:.4}, estimate {:.4}",
                    state.month_spend, self.config.monthly_limit, estimated_cost
                ),
            };
        }
        BudgetDecision {
            allowed: true,
            reason: format!(
                "within budget: {:.4} of {:.4} daily remaining",
                self.config.daily_limit - state.day_spend,
                self.config.daily_limit
            ),
        }
    }

    /// Pick the tier a call should run at.
    ///
    /// Downgrades from `preferred` while the estimated cost does not fit the
    /// remaining daily budget. When the remaining fraction is below the
    /// configured threshold, calls below the importance override also step
    /// down one tier. The monthly ceiling is hard - importance never
    /// overrides it.
    pub fn select_tier(&self, preferred: CostTier, importance: f32, estimated_size: usize) -> CostTier {
        self.select_tier_at(preferred, importance, estimated_size, Utc::now())
    }

    fn select_tier_at(
        &self,
        preferred: CostTier,
        importance: f32,
        estimated_size: usize,
        now: Timestamp,
    ) -> CostTier {
        let (day_remaining, month_remaining) = {
            let mut state = self.state.lock().expect("budget state poisoned");
            roll_windows(&mut state, now);
            (
                self.config.daily_limit - state.day_spend,
                self.config.monthly_limit - state.month_spend,
            )
        };

        let mut tier = preferred;

        // Low remaining budget: non-critical calls step down one tier.
        let low_budget = day_remaining < self.config.daily_limit * self.config.downgrade_threshold;
        if low_budget && importance < self.config.importance_override {
            if let Some(cheaper) = tier.downgrade() {
                tier = cheaper;
            }
        }

        // Hard ceilings: keep downgrading while the estimate does not fit.
        loop {
            let estimate = self.estimate_cost(tier, estimated_size, estimated_size);
            if estimate <= day_remaining && estimate <= month_remaining {
                break;
            }
            match tier.downgrade() {
                Some(cheaper) => tier = cheaper,
                None => break,
            }
        }

        if tier != preferred {
            tracing::info!(
                preferred = ?preferred,
                selected = ?tier,
                importance,
                day_remaining,
                "Cost tier downgraded"
            );
        }
        tier
    }

    /// Record actual spend. The only mutator; call exactly once per billable
    /// action.
    pub fn record_usage(&self, cost: f64) {
        self.record_usage_at(cost, Utc::now());
    }

    fn record_usage_at(&self, cost: f64, now: Timestamp) {
        let mut state = self.state.lock().expect("budget state poisoned");
        roll_windows(&mut state, now);
        state.day_spend += cost;
        state.month_spend += cost;
        tracing::debug!(
            cost,
            day_spend = state.day_spend,
            month_spend = state.month_spend,
            "Usage recorded"
        );
    }

    /// Spend so far today and this month.
    pub fn current_spend(&self) -> (f64, f64) {
        let mut state = self.state.lock().expect("budget state poisoned");
        roll_windows(&mut state, Utc::now());
        (state.day_spend, state.month_spend)
    }
}

/// Reset counters when the calendar day or month has rolled over.
fn roll_windows(state: &mut BudgetState, now: Timestamp) {
    let today = now.date_naive();
    if today != state.day {
        state.day = today;
        state.day_spend = 0.0;
    }
    let month = (today.year(), today.month());
    if month != state.month {
        state.month = month;
        state.month_spend = 0.0;
    }
}

// ============================================================================
// TESTS
// ============================================================================
