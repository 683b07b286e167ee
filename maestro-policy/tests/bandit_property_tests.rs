//! Property tests for the policy engine.

use maestro_policy::{compute_reward, PolicyEngine, SelectionStrategy};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Under a stationary reward distribution the estimated mean converges to
/// the true expected reward: 10,000 pulls at win probability 0.7 land within
/// 0.05 of it.
#[test]
fn test_mean_reward_converges_under_stationary_distribution() {
    let engine = PolicyEngine::default();
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..10_000 {
        let success = rng.random_bool(0.7);
        let reward = if success { 1.0 } else { 0.0 };
        engine.update_policy("convergence", "post_daily", success, reward, None);
    }

    let snapshot = engine.snapshot("convergence").unwrap();
    let stats = &snapshot.actions["post_daily"];
    assert_eq!(stats.pulls, 10_000);
    assert!(
        (stats.mean_reward - 0.7).abs() < 0.05,
        "estimated mean {} not within 0.05 of 0.7",
        stats.mean_reward
    );
}

/// With enough pulls, both strategies settle on the arm with the higher true
/// reward.
#[test]
fn test_both_strategies_find_the_better_arm() {
    let engine = PolicyEngine::default();
    let mut rng = StdRng::seed_from_u64(7);
    let arms = vec!["good".to_string(), "bad".to_string()];

    for _ in 0..2_000 {
        let arm = engine.select_action("learning", &arms).unwrap();
        let p = if arm == "good" { 0.8 } else { 0.2 };
        let success = rng.random_bool(p);
        engine.update_policy("learning", &arm, success, if success { 1.0 } else { 0.0 }, None);
    }

    let best = engine.get_best_actions("learning", 1);
    assert_eq!(best[0].0, "good");

    // Thompson agrees once the posteriors have separated.
    let mut thompson_good = 0;
    for _ in 0..200 {
        if engine
            .select_with_strategy("learning", &arms, SelectionStrategy::Thompson)
            .unwrap()
            == "good"
        {
            thompson_good += 1;
        }
    }
    assert!(thompson_good > 150, "thompson picked good {}/200", thompson_good);
}

proptest! {
    /// The reward blend is always a bounded scalar.
    #[test]
    fn prop_compute_reward_bounded(
        success in any::<bool>(),
        quality in proptest::option::of(0.0f32..=1.0),
        cost in 0.0f64..100.0,
        latency_ms in 0u64..3_600_000,
    ) {
        let reward = compute_reward(success, quality, cost, latency_ms);
        prop_assert!((0.0..=1.0).contains(&reward));
    }

    /// The running mean stays inside the observed reward range.
    #[test]
    fn prop_mean_reward_stays_in_range(rewards in proptest::collection::vec(0.0f64..=1.0, 1..50)) {
        let engine = PolicyEngine::default();
        for reward in &rewards {
            engine.update_policy("range", "arm", *reward > 0.5, *reward, None);
        }
        let stats = engine.snapshot("range").unwrap().actions["arm"];
        let min = rewards.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = rewards.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(stats.mean_reward >= min - 1e-9);
        prop_assert!(stats.mean_reward <= max + 1e-9);
        prop_assert_eq!(stats.pulls, rewards.len() as u64);
    }

    /// Selection never invents an arm outside the candidate set.
    #[test]
    fn prop_selection_returns_a_candidate(candidates in proptest::collection::vec("[a-z]{1,8}", 1..6)) {
        let engine = PolicyEngine::default();
        let selected = engine.select_action("any", &candidates).unwrap();
        prop_assert!(candidates.contains(&selected));
    }
}
