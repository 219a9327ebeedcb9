//! Rollout buffer for storing and processing trajectories
//!
//! This module implements experience storage for PPO training, including:
//! - Trajectory storage, one [`Transition`] per environment step
//! - GAE (Generalized Advantage Estimation) computation
//! - Minibatch sampling for multi-epoch training
//!
//! # Lifecycle
//!
//! A buffer is filled to exactly `horizon` transitions, advantages are
//! computed once, the flattened [`RolloutBatch`] is handed to the update
//! engine, and the buffer is cleared. Appending to a full buffer and
//! computing advantages on a partial one are both invariant violations.
//!
//! ```rust
//! use thrust_rl::buffer::rollout::{RolloutBuffer, Transition};
//! use thrust_rl::env::StepInfo;
//!
//! let mut buffer = RolloutBuffer::new(2);
//! for _ in 0..2 {
//!     buffer
//!         .append(Transition {
//!             observation: vec![0.0],
//!             action: 0,
//!             reward: 1.0,
//!             next_observation: vec![0.0],
//!             done: false,
//!             value: 0.5,
//!             log_prob: -0.69,
//!             info: StepInfo::new(),
//!         })
//!         .unwrap();
//! }
//!
//! let (advantages, returns) = buffer.compute_advantages(0.0, 0.99, 0.95).unwrap();
//! assert_eq!(advantages.len(), 2);
//! assert_eq!(returns.len(), 2);
//! buffer.clear();
//! ```

mod gae;
mod sampling;
mod storage;

#[cfg(test)]
mod tests;

pub use gae::{compute_gae, normalize_advantages, ADVANTAGE_EPSILON};
pub use sampling::{generate_minibatch_indices, Minibatch};
pub use storage::{RolloutBatch, RolloutBuffer, Transition};
