//! Adaptive selector: learning, exploration and persisted history.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::{any, prop, prop_assert, prop_assert_eq, proptest};
use proptest::strategy::Strategy as _;

use autocheck::domain::models::{AttemptRecord, Strategy};
use autocheck::services::{AdaptiveSelector, HistoryConfig, SelectorConfig, StrategyHistory};

fn learned_history() -> Arc<StrategyHistory> {
    let history = Arc::new(StrategyHistory::in_memory(1000));
    for i in 0..25 {
        let record = if i % 2 == 0 {
            AttemptRecord::new(Strategy::ApiDirect, true, 2.0)
        } else {
            AttemptRecord::new(Strategy::ProxyHybrid, false, 10.0)
        };
        history.append(record);
    }
    history
}

fn frequency(selector: &AdaptiveSelector, strategy: Strategy, draws: usize) -> f64 {
    let exclude = HashSet::new();
    let hits = (0..draws)
        .filter(|_| selector.select(&exclude) == Some(strategy))
        .count();
    hits as f64 / draws as f64
}

#[test]
fn test_learning_prefers_the_reliable_strategy() {
    let config = SelectorConfig::default()
        .with_strategies([Strategy::ApiDirect, Strategy::ProxyHybrid])
        .with_epsilon(0.0);
    let selector = AdaptiveSelector::with_seed(config, learned_history(), 11);

    let weights = selector.weights();
    let a = weights.get(Strategy::ApiDirect).unwrap();
    let b = weights.get(Strategy::ProxyHybrid).unwrap();
    assert!((a - 0.99).abs() < 1e-9, "weight_a = {a}");
    assert!((b - 0.25).abs() < 1e-9, "weight_b = {b}");
    assert_eq!(selector.best_strategy(), Some(Strategy::ApiDirect));

    // p(A) = exp(2 * 0.99) / (exp(2 * 0.99) + exp(2 * 0.25))
    let expected = 1.0 / (1.0 + (-2.0_f64 * (a - b)).exp());
    let softmax = selector.softmax(selector.strategies());
    assert!((softmax[0].1 - expected).abs() < 1e-9);

    let observed = frequency(&selector, Strategy::ApiDirect, 4000);
    assert!((observed - expected).abs() < 0.03, "observed {observed}, expected {expected}");
}

#[test]
fn test_full_exploration_is_uniform() {
    let config = SelectorConfig::default()
        .with_strategies(Strategy::ALL)
        .with_epsilon(1.0);
    let selector = AdaptiveSelector::with_seed(config, learned_history(), 5);

    let exclude = HashSet::new();
    let mut counts = [0usize; 5];
    for _ in 0..1000 {
        let chosen = selector.select(&exclude).unwrap();
        counts[chosen.ordinal()] += 1;
    }
    for (i, count) in counts.iter().enumerate() {
        let share = *count as f64 / 1000.0;
        assert!((share - 0.2).abs() <= 0.05, "{:?} chosen {share}", Strategy::ALL[i]);
    }
}

#[test]
fn test_short_history_selects_uniformly() {
    let history = Arc::new(StrategyHistory::in_memory(1000));
    // Lopsided, but below the learning threshold.
    for _ in 0..10 {
        history.append(AttemptRecord::new(Strategy::ApiDirect, true, 1.0));
    }
    let config = SelectorConfig::default()
        .with_strategies(Strategy::ALL)
        .with_epsilon(0.0);
    let selector = AdaptiveSelector::with_seed(config, history, 23);

    let exclude = HashSet::new();
    let mut counts = [0usize; 5];
    for _ in 0..2000 {
        counts[selector.select(&exclude).unwrap().ordinal()] += 1;
    }
    for (i, count) in counts.iter().enumerate() {
        let share = *count as f64 / 2000.0;
        assert!((share - 0.2).abs() <= 0.05, "{:?} chosen {share}", Strategy::ALL[i]);
    }
}

#[test]
fn test_reloaded_history_reproduces_weights() {
    let dir = common::temp_dir();
    let config = HistoryConfig {
        path: Some(dir.path().join("history.json")),
        cap: 100,
        flush_every: 10,
    };
    let history = Arc::new(StrategyHistory::open(config.clone()));
    for record in learned_history().all() {
        history.append(record.for_handle(1, "someone"));
    }
    history.flush();

    let selector_config = SelectorConfig::default().with_strategies([Strategy::ApiDirect, Strategy::ProxyHybrid]);
    let before = AdaptiveSelector::with_seed(selector_config.clone(), history, 1);
    let after = AdaptiveSelector::with_seed(selector_config, Arc::new(StrategyHistory::open(config)), 1);

    assert_eq!(after.history().len(), 25);
    assert_eq!(*before.weights(), *after.weights());
    for n in [1, 5, 24, 25, 100] {
        assert_eq!(before.statistics(n), after.statistics(n), "statistics({n})");
    }
    assert_eq!(after.history().all()[0].username.as_deref(), Some("someone"));
}

fn any_record() -> impl proptest::strategy::Strategy<Value = AttemptRecord> {
    (0usize..5, any::<bool>(), 0.0f64..600.0).prop_map(|(index, success, latency)| {
        AttemptRecord::new(Strategy::ALL[index], success, latency)
    })
}

proptest! {
    #[test]
    fn prop_history_never_exceeds_cap(
        cap in 1usize..50,
        records in prop::collection::vec(any_record(), 0..200),
    ) {
        let history = StrategyHistory::in_memory(cap);
        for record in records.iter().cloned() {
            history.append(record);
            prop_assert!(history.len() <= cap);
        }
        prop_assert_eq!(history.len(), records.len().min(cap));
        // The newest record is always kept.
        if let Some(last) = records.last() {
            let all = history.all();
            prop_assert_eq!(all.last(), Some(last));
        }
    }

    #[test]
    fn prop_weights_and_probabilities_are_bounded(
        records in prop::collection::vec(any_record(), 0..300),
        seed in any::<u64>(),
    ) {
        let history = Arc::new(StrategyHistory::in_memory(1000));
        for record in records {
            history.append(record);
        }
        let config = SelectorConfig::default().with_strategies(Strategy::ALL);
        let selector = AdaptiveSelector::with_seed(config, history, seed);
        selector.recompute_weights();

        for (_, weight) in selector.weights().iter() {
            prop_assert!((0.0..=1.0).contains(&weight));
        }
        let probabilities = selector.softmax(selector.strategies());
        let sum: f64 = probabilities.iter().map(|(_, p)| p).sum();
        prop_assert!((sum - 1.0).abs() < 1e-9);
        prop_assert!(selector.select(&HashSet::new()).is_some());
    }
}
