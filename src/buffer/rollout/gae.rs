//! Generalized Advantage Estimation (GAE) computation
//!
//! This module implements GAE for computing advantages from trajectories.
//! GAE helps reduce variance in policy gradient methods while maintaining
//! sufficient bias for learning.

use super::storage::RolloutBuffer;
use crate::error::{ensure_len, InvariantError};
use crate::utils::stats;

/// Added to the standard deviation when normalizing advantages
pub const ADVANTAGE_EPSILON: f64 = 1e-8;

/// Compute raw GAE advantages and returns for one trajectory segment
///
/// # Arguments
/// * `rewards` - Reward per step
/// * `values` - Value estimate per step
/// * `dones` - Episode-end flag per step
/// * `bootstrap_value` - Value estimate of the state after the last step
/// * `gamma` - Discount factor (0 < gamma <= 1)
/// * `gae_lambda` - GAE lambda parameter (0 <= lambda <= 1)
///
/// # Mathematical Formula
/// ```text
/// next_v_t = V_{t+1}            (t < T-1)
///          = bootstrap_value    (t = T-1)
/// δ_t = r_t + γ * next_v_t * (1 - done_t) - V_t
/// A_t = δ_t + γ * λ * (1 - done_t) * A_{t+1}
/// R_t = A_t + V_t
/// ```
///
/// The `(1 - done_t)` mask stops both the bootstrap and the carried
/// advantage at episode boundaries, so nothing after a `done` step
/// influences the steps before it.
///
/// # Returns
/// `(advantages, returns)`, both un-normalized
pub fn compute_gae(
    rewards: &[f64],
    values: &[f64],
    dones: &[bool],
    bootstrap_value: f64,
    gamma: f64,
    gae_lambda: f64,
) -> Result<(Vec<f64>, Vec<f64>), InvariantError> {
    let num_steps = rewards.len();
    ensure_len("values", num_steps, values.len())?;
    ensure_len("dones", num_steps, dones.len())?;

    let mut advantages = vec![0.0; num_steps];
    let mut returns = vec![0.0; num_steps];
    let mut last_gae = 0.0;

    for t in (0..num_steps).rev() {
        let next_value = if t + 1 == num_steps { bootstrap_value } else { values[t + 1] };
        let next_non_terminal = if dones[t] { 0.0 } else { 1.0 };

        let delta = rewards[t] + gamma * next_value * next_non_terminal - values[t];
        last_gae = delta + gamma * gae_lambda * next_non_terminal * last_gae;

        advantages[t] = last_gae;
        returns[t] = last_gae + values[t];
    }

    Ok((advantages, returns))
}

/// Normalize advantages in place to zero mean and unit variance
///
/// Uses `(a - mean) / (std + ADVANTAGE_EPSILON)` with the population
/// standard deviation.
pub fn normalize_advantages(advantages: &mut [f64]) {
    if advantages.is_empty() {
        return;
    }

    let (mean, std) = stats::mean_std(advantages);
    let denom = std + ADVANTAGE_EPSILON;
    for a in advantages.iter_mut() {
        *a = (*a - mean) / denom;
    }
}

impl RolloutBuffer {
    /// Compute advantages and returns for a full rollout
    ///
    /// Returns are derived from the raw advantages; only the advantages
    /// handed back are normalized.
    ///
    /// # Arguments
    /// * `bootstrap_value` - Value estimate of the state following the last transition
    /// * `gamma` - Discount factor
    /// * `gae_lambda` - GAE lambda parameter
    ///
    /// # Errors
    /// [`InvariantError::RolloutIncomplete`] unless the buffer is full.
    pub fn compute_advantages(
        &self,
        bootstrap_value: f64,
        gamma: f64,
        gae_lambda: f64,
    ) -> Result<(Vec<f64>, Vec<f64>), InvariantError> {
        if !self.is_full() {
            return Err(InvariantError::RolloutIncomplete {
                len: self.len(),
                horizon: self.horizon(),
            });
        }

        let (mut advantages, returns) = compute_gae(
            &self.rewards(),
            &self.values(),
            &self.dones(),
            bootstrap_value,
            gamma,
            gae_lambda,
        )?;
        normalize_advantages(&mut advantages);

        Ok((advantages, returns))
    }
}
