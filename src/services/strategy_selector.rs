//! Adaptive strategy selection (ε-greedy with softmax exploitation).
//!
//! Weights are derived from the most recent `window` history records:
//! `0.7 * success_rate + 0.3 * clamp(1 - avg_latency / 60, 0, 1)`. Until the
//! history holds `min_history` records every weight stays at 1.0 and
//! selection is uniform.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::models::{AttemptRecord, LearningConfig, Strategy};
use crate::services::strategy_history::StrategyHistory;

pub const NEUTRAL_WEIGHT: f64 = 1.0;
const SUCCESS_SHARE: f64 = 0.7;
const SPEED_SHARE: f64 = 0.3;
const LATENCY_HORIZON_SECONDS: f64 = 60.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorConfig {
    pub strategies: Vec<Strategy>,
    pub epsilon: f64,
    pub temperature: f64,
    pub min_history: usize,
    pub window: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self::from(&LearningConfig::default())
    }
}

impl From<&LearningConfig> for SelectorConfig {
    fn from(config: &LearningConfig) -> Self {
        Self {
            strategies: config.strategies.clone(),
            epsilon: config.exploration_epsilon,
            temperature: config.softmax_temperature,
            min_history: config.min_history_for_learning,
            window: config.weight_window,
        }
    }
}

impl SelectorConfig {
    #[must_use]
    pub fn with_strategies(mut self, strategies: impl IntoIterator<Item = Strategy>) -> Self {
        self.strategies = strategies.into_iter().collect();
        self
    }

    #[must_use]
    pub const fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }
}

/// Immutable per-strategy weights. Replaced wholesale on recomputation.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    entries: Vec<(Strategy, f64)>,
}

impl WeightTable {
    pub fn neutral(strategies: &[Strategy]) -> Self {
        Self {
            entries: strategies.iter().map(|s| (*s, NEUTRAL_WEIGHT)).collect(),
        }
    }

    pub fn get(&self, strategy: Strategy) -> Option<f64> {
        self.entries
            .iter()
            .find(|(s, _)| *s == strategy)
            .map(|(_, w)| *w)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Strategy, f64)> + '_ {
        self.entries.iter().copied()
    }

    /// Derive weights from `window` records. Strategies with no attempts in
    /// the window keep their weight from `previous`.
    pub fn derive(
        previous: &Self,
        window: &[AttemptRecord],
        total_history: usize,
        min_history: usize,
    ) -> Self {
        if total_history < min_history {
            let strategies: Vec<Strategy> = previous.entries.iter().map(|(s, _)| *s).collect();
            return Self::neutral(&strategies);
        }

        let tallies = tally(window);
        let entries = previous
            .entries
            .iter()
            .map(|&(strategy, old)| {
                let weight = tallies
                    .get(&strategy)
                    .map_or(old, |tally| tally.weight());
                (strategy, weight)
            })
            .collect();
        Self { entries }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    attempts: u64,
    successes: u64,
    latency_sum: f64,
}

impl Tally {
    fn success_rate(self) -> f64 {
        self.successes as f64 / self.attempts as f64
    }

    fn mean_latency(self) -> f64 {
        self.latency_sum / self.attempts as f64
    }

    fn weight(self) -> f64 {
        let time_score = (1.0 - self.mean_latency() / LATENCY_HORIZON_SECONDS).clamp(0.0, 1.0);
        (SUCCESS_SHARE * self.success_rate() + SPEED_SHARE * time_score).clamp(0.0, 1.0)
    }
}

fn tally(records: &[AttemptRecord]) -> HashMap<Strategy, Tally> {
    let mut tallies: HashMap<Strategy, Tally> = HashMap::new();
    for record in records {
        let Some(strategy) = record.parsed_strategy() else {
            continue;
        };
        let entry = tallies.entry(strategy).or_default();
        entry.attempts += 1;
        entry.successes += u64::from(record.success);
        entry.latency_sum += record.response_time.max(0.0);
    }
    tallies
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyStats {
    pub strategy: Strategy,
    pub attempts: u64,
    pub successes: u64,
    /// Fraction in [0, 1].
    pub success_rate: f64,
    pub mean_latency_seconds: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectorStatistics {
    pub window: usize,
    pub total_attempts: u64,
    pub total_successes: u64,
    pub success_rate: f64,
    pub strategies: Vec<StrategyStats>,
}

pub struct AdaptiveSelector {
    config: SelectorConfig,
    history: Arc<StrategyHistory>,
    weights: RwLock<Arc<WeightTable>>,
    rng: Mutex<StdRng>,
}

impl AdaptiveSelector {
    pub fn new(config: SelectorConfig, history: Arc<StrategyHistory>) -> Self {
        Self::with_rng(config, history, StdRng::from_entropy())
    }

    /// Deterministic selector for tests and benchmarks.
    pub fn with_seed(config: SelectorConfig, history: Arc<StrategyHistory>, seed: u64) -> Self {
        Self::with_rng(config, history, StdRng::seed_from_u64(seed))
    }

    fn with_rng(mut config: SelectorConfig, history: Arc<StrategyHistory>, rng: StdRng) -> Self {
        let mut strategies = config.strategies.clone();
        strategies.sort_by_key(|s| s.ordinal());
        strategies.dedup();
        config.strategies = strategies;

        let selector = Self {
            weights: RwLock::new(Arc::new(WeightTable::neutral(&config.strategies))),
            config,
            history,
            rng: Mutex::new(rng),
        };
        selector.recompute_weights();
        selector
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.config.strategies
    }

    pub fn history(&self) -> &Arc<StrategyHistory> {
        &self.history
    }

    /// Current weight snapshot.
    pub fn weights(&self) -> Arc<WeightTable> {
        Arc::clone(
            &self
                .weights
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        )
    }

    pub fn recompute_weights(&self) {
        let previous = self.weights();
        let window = self.history.snapshot(self.config.window);
        let table = WeightTable::derive(
            &previous,
            &window,
            self.history.len(),
            self.config.min_history,
        );
        debug!(weights = ?table.entries, "Strategy weights recomputed");
        self.store_weights(table);
    }

    pub fn reset_weights(&self) {
        self.store_weights(WeightTable::neutral(&self.config.strategies));
    }

    /// Empty the history (persisting the empty log) and reset all weights.
    pub fn clear_history(&self) {
        self.history.clear();
        self.reset_weights();
    }

    fn store_weights(&self, table: WeightTable) {
        *self
            .weights
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Arc::new(table);
    }

    /// Pick a strategy not in `exclude`, using the configured ε.
    pub fn select(&self, exclude: &HashSet<Strategy>) -> Option<Strategy> {
        self.select_with_epsilon(exclude, self.config.epsilon)
    }

    pub fn select_with_epsilon(&self, exclude: &HashSet<Strategy>, epsilon: f64) -> Option<Strategy> {
        let allowed: Vec<Strategy> = self
            .config
            .strategies
            .iter()
            .copied()
            .filter(|s| !exclude.contains(s))
            .collect();
        if allowed.is_empty() {
            return None;
        }

        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if self.history.len() < self.config.min_history {
            debug!(
                history = self.history.len(),
                required = self.config.min_history,
                "Insufficient data for learning, selecting uniformly"
            );
            return allowed.choose(&mut *rng).copied();
        }

        if rng.gen::<f64>() < epsilon {
            debug!("Exploring: selecting uniformly");
            return allowed.choose(&mut *rng).copied();
        }

        let probabilities = self.softmax(&allowed);
        match WeightedIndex::new(probabilities.iter().map(|(_, p)| *p)) {
            Ok(dist) => Some(probabilities[dist.sample(&mut *rng)].0),
            Err(e) => {
                warn!(error = %e, "Degenerate softmax distribution, selecting uniformly");
                allowed.choose(&mut *rng).copied()
            }
        }
    }

    /// Exploitation distribution over `allowed`: `p ∝ exp(T · weight)`.
    pub fn softmax(&self, allowed: &[Strategy]) -> Vec<(Strategy, f64)> {
        let weights = self.weights();
        let temperature = self.config.temperature;
        let scaled: Vec<(Strategy, f64)> = allowed
            .iter()
            .map(|s| (*s, temperature * weights.get(*s).unwrap_or(NEUTRAL_WEIGHT)))
            .collect();
        let max = scaled
            .iter()
            .map(|(_, v)| *v)
            .fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<(Strategy, f64)> = scaled
            .into_iter()
            .map(|(s, v)| (s, (v - max).exp()))
            .collect();
        let sum: f64 = exps.iter().map(|(_, e)| e).sum();
        exps.into_iter().map(|(s, e)| (s, e / sum)).collect()
    }

    /// Highest-weighted strategy; ties go to the earlier strategy.
    pub fn best_strategy(&self) -> Option<Strategy> {
        let weights = self.weights();
        let mut best: Option<(Strategy, f64)> = None;
        for (strategy, weight) in weights.iter() {
            if best.map_or(true, |(_, w)| weight > w) {
                best = Some((strategy, weight));
            }
        }
        best.map(|(s, _)| s)
    }

    /// Record an attempt. On a checkpoint, weights are re-derived and the
    /// history is flushed on the blocking pool.
    pub async fn record(&self, record: AttemptRecord) {
        if self.history.append(record) {
            self.recompute_weights();
            self.flush().await;
        }
    }

    pub async fn flush(&self) {
        let history = Arc::clone(&self.history);
        if let Err(e) = tokio::task::spawn_blocking(move || history.flush()).await {
            warn!(error = %e, "Strategy history flush task failed");
        }
    }

    /// Per-strategy figures over the last `n` records.
    pub fn statistics(&self, n: usize) -> SelectorStatistics {
        let records = self.history.snapshot(n);
        let tallies = tally(&records);
        let weights = self.weights();

        let strategies = self
            .config
            .strategies
            .iter()
            .map(|&strategy| {
                let tally = tallies.get(&strategy).copied().unwrap_or_default();
                let (success_rate, mean_latency_seconds) = if tally.attempts == 0 {
                    (0.0, 0.0)
                } else {
                    (tally.success_rate(), tally.mean_latency())
                };
                StrategyStats {
                    strategy,
                    attempts: tally.attempts,
                    successes: tally.successes,
                    success_rate,
                    mean_latency_seconds,
                    weight: weights.get(strategy).unwrap_or(NEUTRAL_WEIGHT),
                }
            })
            .collect();

        let total_attempts = records.len() as u64;
        let total_successes = records.iter().filter(|r| r.success).count() as u64;
        SelectorStatistics {
            window: n,
            total_attempts,
            total_successes,
            success_rate: if total_attempts == 0 {
                0.0
            } else {
                total_successes as f64 / total_attempts as f64
            },
            strategies,
        }
    }
}

impl std::fmt::Debug for AdaptiveSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveSelector")
            .field("config", &self.config)
            .field("weights", &self.weights())
            .finish_non_exhaustive()
    }
}
