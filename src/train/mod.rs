//! Training algorithms and the training loop
//!
//! - [`ppo`]: the PPO update engine
//! - [`orchestrator`]: the phase machine that drives collection, updates,
//!   evaluation and checkpointing

pub mod orchestrator;
pub mod ppo;

pub use orchestrator::{CheckpointReason, Phase, TrainingContext, TrainingOrchestrator, TrainingState};
pub use ppo::{
    compute_entropy_loss, compute_policy_loss, compute_value_loss, PPOConfig, PPOTrainer,
    TrainingStats,
};
