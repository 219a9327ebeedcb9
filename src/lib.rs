//! # Thrust
//!
//! On-policy reinforcement learning core in Rust
//!
//! Thrust trains a discrete-action policy with PPO: it collects fixed-horizon
//! rollouts, estimates advantages with GAE, runs clipped multi-epoch
//! minibatch updates, evaluates snapshots on a pool of worker threads and
//! checkpoints the best one. Neural-network policies are available through
//! tch-rs behind the `tch` feature; everything else is pure Rust.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use thrust_rl::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = TrainerConfig::new().horizon(256).max_steps(10_000).eval_interval(2_048);
//!
//! let pool = EvaluationWorkerPool::new(4, Duration::from_secs(30), None, |i| {
//!     SimpleBandit::seeded(i as u64, 100)
//! })?;
//! let ctx = TrainingContext::new(
//!     SimpleBandit::new(),
//!     LinearPolicy::new(1, 2, 0),
//!     FileCheckpointStore::new("checkpoints")?,
//!     TracingSink,
//! )
//! .with_evaluator(pool);
//!
//! let state = TrainingOrchestrator::new(config, ctx)?.run()?;
//! println!("best eval reward: {:?}", state.best_eval_reward);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Environment traits and implementations
pub mod env;

/// Policy/value models
pub mod policy;

/// Rollout and replay buffers
pub mod buffer;

/// PPO update engine and the training loop
pub mod train;

/// Parallel evaluation
pub mod eval;

/// Checkpoint persistence
pub mod checkpoint;

/// Metrics sinks
pub mod metrics;

/// Run configuration
pub mod config;

/// Invariant violations
pub mod error;

/// Utility functions and helpers
pub mod utils;

/// Prelude module for convenient imports
///
/// This module re-exports commonly used types and traits for convenience.
pub mod prelude {
    pub use crate::buffer::{PrioritizedReplayBuffer, RolloutBuffer, Transition};
    pub use crate::checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore};
    pub use crate::config::TrainerConfig;
    pub use crate::env::{Environment, SimpleBandit, SpaceInfo, SpaceType, StepInfo, StepResult};
    pub use crate::error::InvariantError;
    pub use crate::eval::{EvaluationRequest, EvaluationResult, EvaluationSummary, EvaluationWorkerPool};
    pub use crate::metrics::{JsonLinesSink, MemorySink, MetricsRecord, MetricsSink, RecordKind, TracingSink};
    pub use crate::policy::{LinearPolicy, Policy, PolicySnapshot};
    pub use crate::train::{
        PPOConfig, PPOTrainer, Phase, TrainingContext, TrainingOrchestrator, TrainingState,
        TrainingStats,
    };
}

/// Current version of thrust-rl
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
