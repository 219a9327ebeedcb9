//! Aggregate statistics for an evaluation round

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::messages::EvaluationResult;
use crate::utils::stats::Welford;

/// Statistics over every completed episode of a round
///
/// Episodes finished by a worker that later failed are included; a
/// timed-out worker simply contributes nothing. With no episodes at all
/// the reward statistics are zero and `n_episodes` is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    /// Mean episode return
    pub mean_reward: f64,
    /// Population standard deviation of episode returns
    pub std_reward: f64,
    /// Lowest episode return
    pub min_reward: f64,
    /// Highest episode return
    pub max_reward: f64,
    /// Mean episode length
    pub mean_length: f64,
    /// Fraction of episodes reporting success
    pub success_rate: f64,
    /// Workers in the round
    pub n_workers: usize,
    /// Workers that faulted or timed out
    pub n_failed_workers: usize,
    /// Completed episodes across all workers
    pub n_episodes: usize,
}

impl EvaluationSummary {
    /// Aggregate one round's results
    pub fn from_results(results: &[EvaluationResult]) -> Self {
        let rewards: Welford = results.iter().flat_map(|r| r.rewards.iter().copied()).collect();
        let lengths: Welford =
            results.iter().flat_map(|r| r.lengths.iter().map(|&l| l as f64)).collect();
        let successes = results.iter().flat_map(|r| &r.successes).filter(|&&s| s).count();

        let n_episodes = rewards.count();
        let success_rate =
            if n_episodes == 0 { 0.0 } else { successes as f64 / n_episodes as f64 };

        Self {
            mean_reward: rewards.mean(),
            std_reward: rewards.std(),
            min_reward: rewards.min(),
            max_reward: rewards.max(),
            mean_length: lengths.mean(),
            success_rate,
            n_workers: results.len(),
            n_failed_workers: results.iter().filter(|r| r.failed).count(),
            n_episodes,
        }
    }

    /// Whether every worker finished without fault
    pub fn complete(&self) -> bool {
        self.n_failed_workers == 0
    }

    /// Whether the round produced any statistics at all
    pub fn has_episodes(&self) -> bool {
        self.n_episodes > 0
    }

    /// Flatten into named scalars for a metrics record
    pub fn scalars(&self) -> BTreeMap<String, f64> {
        [
            ("eval_mean_reward", self.mean_reward),
            ("eval_std_reward", self.std_reward),
            ("eval_min_reward", self.min_reward),
            ("eval_max_reward", self.max_reward),
            ("eval_mean_length", self.mean_length),
            ("eval_success_rate", self.success_rate),
            ("eval_episodes", self.n_episodes as f64),
            ("eval_failed_workers", self.n_failed_workers as f64),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}
