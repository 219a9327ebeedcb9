//! Training statistics for PPO
//!
//! Metrics reported by one call to [`PPOTrainer::update`](super::PPOTrainer::update).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Training statistics for a PPO update
///
/// Loss and diagnostic values are those of the last minibatch processed;
/// `num_updates` and `epochs_completed` cover the whole update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingStats {
    /// Policy loss
    pub policy_loss: f64,

    /// Value function loss
    pub value_loss: f64,

    /// Mean entropy of the action distribution
    pub entropy: f64,

    /// Total loss (weighted sum of policy, value, and entropy losses)
    pub total_loss: f64,

    /// Fraction of clipped policy updates
    pub clip_fraction: f64,

    /// Approximate KL divergence between old and new policies
    pub approx_kl: f64,

    /// Explained variance of value function predictions
    pub explained_var: f64,

    /// Number of gradient updates performed
    pub num_updates: usize,

    /// Epochs that ran to completion
    pub epochs_completed: usize,

    /// Whether the KL target stopped the update early
    pub early_stopped: bool,
}

impl TrainingStats {
    /// Create zero-initialized statistics
    pub fn zeros() -> Self {
        Self::default()
    }

    /// Flatten into named scalars for a metrics record
    pub fn scalars(&self) -> BTreeMap<String, f64> {
        [
            ("policy_loss", self.policy_loss),
            ("value_loss", self.value_loss),
            ("total_loss", self.total_loss),
            ("entropy", self.entropy),
            ("clip_fraction", self.clip_fraction),
            ("approx_kl", self.approx_kl),
            ("explained_variance", self.explained_var),
            ("num_updates", self.num_updates as f64),
            ("epochs_completed", self.epochs_completed as f64),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}
