//! PPO configuration and hyperparameters
//!
//! This module defines the configuration parameters for PPO training
//! and provides validation and builder pattern methods.
//!
//! In serialized form the fields use the names of the trainer's
//! configuration file (`epochs`, `minibatch_size`, `value_coefficient`,
//! `entropy_coefficient`); the Rust field names are accepted as aliases.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// PPO configuration parameters
///
/// These hyperparameters control the PPO update. Defaults are common
/// settings that work well for small discrete-action problems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PPOConfig {
    /// Learning rate for policy and value function
    pub learning_rate: f64,

    /// Number of training epochs per rollout
    #[serde(rename = "epochs", alias = "n_epochs")]
    pub n_epochs: usize,

    /// Minibatch size for training
    #[serde(rename = "minibatch_size", alias = "batch_size")]
    pub batch_size: usize,

    /// Discount factor (gamma)
    pub gamma: f64,

    /// GAE lambda parameter
    pub gae_lambda: f64,

    /// PPO clipping parameter (epsilon)
    pub clip_range: f64,

    /// Value function clipping parameter, unclipped when `None`
    pub clip_range_vf: Option<f64>,

    /// Value function loss coefficient
    #[serde(rename = "value_coefficient", alias = "vf_coef")]
    pub vf_coef: f64,

    /// Entropy bonus coefficient
    #[serde(rename = "entropy_coefficient", alias = "ent_coef")]
    pub ent_coef: f64,

    /// Maximum gradient norm for clipping
    pub max_grad_norm: f64,

    /// Target KL divergence for early stopping, disabled when `None`
    pub target_kl: Option<f64>,

    /// Seed for minibatch shuffling, from entropy when `None`
    pub seed: Option<u64>,
}

impl Default for PPOConfig {
    fn default() -> Self {
        Self {
            learning_rate: 3e-4,
            n_epochs: 10,
            batch_size: 64,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_range: 0.2,
            clip_range_vf: None,
            vf_coef: 0.5,
            ent_coef: 0.0,
            max_grad_norm: 0.5,
            target_kl: None,
            seed: None,
        }
    }
}

impl PPOConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.learning_rate <= 0.0 {
            return Err(anyhow!("learning_rate must be positive"));
        }
        if self.n_epochs == 0 {
            return Err(anyhow!("epochs must be positive"));
        }
        if self.batch_size == 0 {
            return Err(anyhow!("minibatch_size must be positive"));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(anyhow!("gamma must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.gae_lambda) {
            return Err(anyhow!("gae_lambda must be in [0, 1]"));
        }
        if self.clip_range <= 0.0 {
            return Err(anyhow!("clip_range must be positive"));
        }
        if matches!(self.clip_range_vf, Some(c) if c <= 0.0) {
            return Err(anyhow!("clip_range_vf must be positive"));
        }
        if self.vf_coef < 0.0 {
            return Err(anyhow!("value_coefficient must be non-negative"));
        }
        if self.ent_coef < 0.0 {
            return Err(anyhow!("entropy_coefficient must be non-negative"));
        }
        if self.max_grad_norm < 0.0 {
            return Err(anyhow!("max_grad_norm must be non-negative"));
        }
        if matches!(self.target_kl, Some(kl) if kl <= 0.0) {
            return Err(anyhow!("target_kl must be positive"));
        }
        Ok(())
    }

    /// Set learning rate
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set number of training epochs
    pub fn n_epochs(mut self, epochs: usize) -> Self {
        self.n_epochs = epochs;
        self
    }

    /// Set minibatch size
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set discount factor
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set GAE lambda
    pub fn gae_lambda(mut self, lambda: f64) -> Self {
        self.gae_lambda = lambda;
        self
    }

    /// Set PPO clipping parameter
    pub fn clip_range(mut self, clip: f64) -> Self {
        self.clip_range = clip;
        self
    }

    /// Set value function clipping parameter
    pub fn clip_range_vf(mut self, clip: f64) -> Self {
        self.clip_range_vf = Some(clip);
        self
    }

    /// Set value function loss coefficient
    pub fn vf_coef(mut self, coef: f64) -> Self {
        self.vf_coef = coef;
        self
    }

    /// Set entropy bonus coefficient
    pub fn ent_coef(mut self, coef: f64) -> Self {
        self.ent_coef = coef;
        self
    }

    /// Set maximum gradient norm (0 disables clipping)
    pub fn max_grad_norm(mut self, norm: f64) -> Self {
        self.max_grad_norm = norm;
        self
    }

    /// Set target KL divergence
    pub fn target_kl(mut self, kl: f64) -> Self {
        self.target_kl = Some(kl);
        self
    }

    /// Set minibatch shuffling seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
