//! Proximal Policy Optimization (PPO) algorithm
//!
//! This module implements the PPO update for training RL agents.
//! PPO is a policy gradient method that uses a clipped surrogate objective
//! to ensure stable, reliable policy updates.
//!
//! # Algorithm Overview
//!
//! ```text
//! For each rollout:
//!   1. Collect `horizon` transitions using current policy
//!   2. Compute advantages using GAE
//!   3. For multiple epochs:
//!      a. Shuffle the rollout into minibatches
//!      b. Compute PPO loss (clipped objective)
//!      c. Update policy via one optimizer step per minibatch
//! ```
//!
//! # References
//!
//! - [Proximal Policy Optimization Algorithms](https://arxiv.org/abs/1707.06347)
//! - [OpenAI Spinning Up: PPO](https://spinningup.openai.com/en/latest/algorithms/ppo.html)

pub mod config;
pub mod loss;
pub mod stats;
pub mod trainer;

pub use config::PPOConfig;
pub use loss::{
    clipped_surrogate, compute_entropy_loss, compute_policy_loss, compute_value_loss,
    explained_variance, PolicyLoss, ValueLoss,
};
pub use stats::TrainingStats;
pub use trainer::PPOTrainer;
