//! Experience buffers
//!
//! - [`rollout`]: fixed-horizon on-policy storage with GAE, consumed by PPO
//! - [`replay`]: bounded ring buffer with proportional priority sampling

pub mod replay;
pub mod rollout;

pub use replay::{PrioritizedReplayBuffer, ReplayRecord, ReplaySample};
pub use rollout::{RolloutBatch, RolloutBuffer, Transition};
