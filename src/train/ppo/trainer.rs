//! PPO Trainer implementation
//!
//! This module contains the [`PPOTrainer`], the policy update engine. It
//! owns the update hyperparameters and the minibatch RNG; the policy it
//! updates is borrowed per call so the orchestrator keeps ownership.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::config::PPOConfig;
use super::loss::{compute_entropy_loss, compute_policy_loss, compute_value_loss};
use super::stats::TrainingStats;
use crate::buffer::rollout::{generate_minibatch_indices, Minibatch, RolloutBatch};
use crate::error::ensure_len;
use crate::policy::{OptimizerSettings, OutputGradients, Policy};

/// PPO Trainer for policy optimization
///
/// Runs multi-epoch minibatch updates with the clipped surrogate objective.
#[derive(Debug)]
pub struct PPOTrainer {
    config: PPOConfig,
    rng: StdRng,
    total_updates: usize,
}

impl PPOTrainer {
    /// Create a new PPO trainer
    ///
    /// # Arguments
    ///
    /// * `config` - PPO configuration parameters
    pub fn new(config: PPOConfig) -> Result<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self { config, rng, total_updates: 0 })
    }

    /// Get the configuration
    pub fn config(&self) -> &PPOConfig {
        &self.config
    }

    /// Optimizer steps taken over the trainer's lifetime
    pub fn total_updates(&self) -> usize {
        self.total_updates
    }

    /// Run one PPO update over a full rollout
    ///
    /// For each epoch the rollout is reshuffled into minibatches of
    /// `batch_size`; every minibatch produces exactly one optimizer step.
    ///
    /// # Arguments
    ///
    /// * `policy` - Model to update
    /// * `batch` - Flattened rollout (observations, actions, old log probs, old values)
    /// * `advantages` - Normalized advantages, one per sample
    /// * `returns` - Returns, one per sample
    ///
    /// # Returns
    /// Statistics of the final minibatch processed
    ///
    /// # Errors
    /// [`InvariantError::ShapeMismatch`](crate::error::InvariantError::ShapeMismatch)
    /// when the inputs disagree in length; any policy error is propagated.
    pub fn update<P: Policy + ?Sized>(
        &mut self,
        policy: &mut P,
        batch: &RolloutBatch,
        advantages: &[f64],
        returns: &[f64],
    ) -> Result<TrainingStats> {
        batch.validate()?;
        ensure_len("advantages", batch.len(), advantages.len())?;
        ensure_len("returns", batch.len(), returns.len())?;

        let settings = OptimizerSettings {
            learning_rate: self.config.learning_rate,
            max_grad_norm: self.config.max_grad_norm,
        };

        let mut stats = TrainingStats::zeros();

        'epochs: for epoch in 0..self.config.n_epochs {
            let minibatches =
                generate_minibatch_indices(batch.len(), self.config.batch_size, &mut self.rng);

            for indices in &minibatches {
                let mb = Minibatch::gather(batch, advantages, returns, indices)?;

                let eval = policy.evaluate_actions(&mb.observations, &mb.actions)?;
                ensure_len("evaluated log_probs", mb.size(), eval.log_probs.len())?;
                ensure_len("evaluated values", mb.size(), eval.values.len())?;
                ensure_len("evaluated entropy", mb.size(), eval.entropy.len())?;

                let policy_loss = compute_policy_loss(
                    &eval.log_probs,
                    &mb.old_log_probs,
                    &mb.advantages,
                    self.config.clip_range,
                );
                let value_loss = compute_value_loss(
                    &eval.values,
                    &mb.old_values,
                    &mb.returns,
                    self.config.clip_range_vf,
                );
                let (entropy_loss, entropy_grad) = compute_entropy_loss(&eval.entropy);

                let total_loss = policy_loss.loss
                    + self.config.vf_coef * value_loss.loss
                    + self.config.ent_coef * entropy_loss;

                let gradients = OutputGradients {
                    log_probs: policy_loss.grad_log_probs,
                    values: value_loss.grad_values.iter().map(|g| self.config.vf_coef * g).collect(),
                    entropy: entropy_grad.iter().map(|g| self.config.ent_coef * g).collect(),
                };
                policy.apply_gradients(&mb.observations, &mb.actions, &gradients, &settings)?;

                stats.policy_loss = policy_loss.loss;
                stats.value_loss = value_loss.loss;
                stats.entropy = -entropy_loss;
                stats.total_loss = total_loss;
                stats.clip_fraction = policy_loss.clip_fraction;
                stats.approx_kl = policy_loss.approx_kl;
                stats.explained_var = value_loss.explained_var;
                stats.num_updates += 1;
                self.total_updates += 1;

                if let Some(target_kl) = self.config.target_kl {
                    if policy_loss.approx_kl > 1.5 * target_kl {
                        tracing::info!(
                            "Early stopping at epoch {} due to reaching max kl: {:.4}",
                            epoch,
                            policy_loss.approx_kl
                        );
                        stats.early_stopped = true;
                        break 'epochs;
                    }
                }
            }

            stats.epochs_completed += 1;
        }

        tracing::debug!(
            "PPO update: policy_loss={:.4} value_loss={:.4} entropy={:.4} kl={:.4} updates={}",
            stats.policy_loss,
            stats.value_loss,
            stats.entropy,
            stats.approx_kl,
            stats.num_updates
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::rollout::{RolloutBuffer, Transition};
    use crate::env::StepInfo;
    use crate::error::InvariantError;
    use crate::policy::LinearPolicy;

    fn rollout(policy: &mut LinearPolicy, n: usize) -> (RolloutBatch, Vec<f64>, Vec<f64>) {
        let mut buffer = RolloutBuffer::new(n);
        for i in 0..n {
            let state = (i % 2) as f32;
            let obs = vec![state, 1.0 - state];
            let sample = policy.act(&obs).unwrap();
            let reward = if sample.action == state as i64 { 1.0 } else { 0.0 };
            buffer
                .append(Transition {
                    observation: obs.clone(),
                    action: sample.action,
                    reward,
                    next_observation: obs,
                    done: true,
                    value: sample.value,
                    log_prob: sample.log_prob,
                    info: StepInfo::new(),
                })
                .unwrap();
        }
        let (advantages, returns) = buffer.compute_advantages(0.0, 0.99, 0.95).unwrap();
        (buffer.batch(), advantages, returns)
    }

    #[test]
    fn test_update_step_count() {
        let mut policy = LinearPolicy::new(2, 2, 0);
        let (batch, advantages, returns) = rollout(&mut policy, 10);

        let config = PPOConfig::new().n_epochs(3).batch_size(4).seed(1);
        let mut trainer = PPOTrainer::new(config).unwrap();
        let stats = trainer.update(&mut policy, &batch, &advantages, &returns).unwrap();

        // ceil(10 / 4) = 3 minibatches per epoch
        assert_eq!(stats.num_updates, 9);
        assert_eq!(stats.epochs_completed, 3);
        assert!(!stats.early_stopped);
        assert_eq!(trainer.total_updates(), 9);
    }

    #[test]
    fn test_update_rejects_shape_mismatch() {
        let mut policy = LinearPolicy::new(2, 2, 0);
        let (batch, advantages, returns) = rollout(&mut policy, 6);
        let before = policy.params().clone();

        let mut trainer = PPOTrainer::new(PPOConfig::new().seed(0)).unwrap();
        let err = trainer.update(&mut policy, &batch, &advantages[..5], &returns).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<InvariantError>(),
            Some(InvariantError::ShapeMismatch { what: "advantages", expected: 6, actual: 5 })
        ));
        assert_eq!(policy.params(), &before, "policy must not change on a rejected update");
    }

    #[test]
    fn test_first_minibatch_has_zero_kl() {
        let mut policy = LinearPolicy::new(2, 2, 3);
        let (batch, advantages, returns) = rollout(&mut policy, 8);

        // One minibatch covering everything: metrics are from before the step.
        let config = PPOConfig::new().n_epochs(1).batch_size(8).seed(0);
        let stats = PPOTrainer::new(config)
            .unwrap()
            .update(&mut policy, &batch, &advantages, &returns)
            .unwrap();

        assert!(stats.approx_kl.abs() < 1e-12);
        assert_eq!(stats.clip_fraction, 0.0);
        assert!((stats.entropy - 2.0_f64.ln()).abs() < 1e-12);
        let expected_total = stats.policy_loss + 0.5 * stats.value_loss;
        assert!((stats.total_loss - expected_total).abs() < 1e-12);
    }

    #[test]
    fn test_target_kl_stops_early() {
        let mut policy = LinearPolicy::new(2, 2, 0);
        let (batch, advantages, returns) = rollout(&mut policy, 16);

        let config = PPOConfig::new()
            .n_epochs(50)
            .batch_size(4)
            .learning_rate(5.0)
            .max_grad_norm(0.0)
            .target_kl(1e-4)
            .seed(2);
        let stats = PPOTrainer::new(config)
            .unwrap()
            .update(&mut policy, &batch, &advantages, &returns)
            .unwrap();

        assert!(stats.early_stopped);
        assert!(stats.num_updates < 200);
    }

    #[test]
    fn test_update_improves_bandit_policy() {
        let mut policy = LinearPolicy::new(2, 2, 7);
        let config = PPOConfig::new().n_epochs(4).batch_size(16).learning_rate(0.5).seed(3);
        let mut trainer = PPOTrainer::new(config).unwrap();

        for _ in 0..30 {
            let (batch, advantages, returns) = rollout(&mut policy, 64);
            trainer.update(&mut policy, &batch, &advantages, &returns).unwrap();
        }

        let p0 = policy.action_probs(&[0.0, 1.0]).unwrap();
        let p1 = policy.action_probs(&[1.0, 0.0]).unwrap();
        println!("P(correct | state 0) = {:.3}, P(correct | state 1) = {:.3}", p0[0], p1[1]);
        assert!(p0[0] > 0.8);
        assert!(p1[1] > 0.8);
    }
}
