//! Rollout buffer storage and data management
//!
//! This module handles the core storage functionality for rollout buffers,
//! including data insertion, retrieval, and flattening for training.

use crate::env::StepInfo;
use crate::error::{ensure_len, InvariantError};

/// One environment step as seen by the learner
///
/// Immutable once appended to a [`RolloutBuffer`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Observation the action was chosen from
    pub observation: Vec<f32>,

    /// Action taken
    pub action: i64,

    /// Reward received
    pub reward: f64,

    /// Observation after the step
    pub next_observation: Vec<f32>,

    /// Whether the episode ended on this step (terminated or truncated)
    pub done: bool,

    /// Value estimate for `observation` at collection time
    pub value: f64,

    /// Log probability of `action` at collection time
    pub log_prob: f64,

    /// Auxiliary step information
    pub info: StepInfo,
}

/// Rollout buffer for storing trajectories
///
/// Holds at most `horizon` transitions in insertion order.
#[derive(Debug, Clone)]
pub struct RolloutBuffer {
    /// Number of transitions per rollout
    horizon: usize,

    /// Observation width, fixed by the first transition
    obs_dim: Option<usize>,

    /// Transitions in insertion order
    transitions: Vec<Transition>,
}

impl RolloutBuffer {
    /// Create a new rollout buffer
    ///
    /// # Arguments
    ///
    /// * `horizon` - Number of transitions per rollout
    pub fn new(horizon: usize) -> Self {
        Self { horizon, obs_dim: None, transitions: Vec::with_capacity(horizon) }
    }

    /// Add a transition to the buffer
    ///
    /// Fails with [`InvariantError::BufferFull`] once `horizon` transitions
    /// are stored, and with [`InvariantError::ShapeMismatch`] if the
    /// observation width differs from earlier transitions.
    pub fn append(&mut self, transition: Transition) -> Result<(), InvariantError> {
        if self.is_full() {
            return Err(InvariantError::BufferFull { horizon: self.horizon });
        }

        let width = transition.observation.len();
        match self.obs_dim {
            Some(expected) => ensure_len("observation", expected, width)?,
            None => self.obs_dim = Some(width),
        }

        self.transitions.push(transition);
        Ok(())
    }

    /// Whether the buffer holds exactly `horizon` transitions
    pub fn is_full(&self) -> bool {
        self.transitions.len() >= self.horizon
    }

    /// Drop all transitions so the buffer can be refilled
    pub fn clear(&mut self) {
        self.transitions.clear();
        self.obs_dim = None;
    }

    /// Number of stored transitions
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Capacity of the buffer
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Observation width, once known
    pub fn obs_dim(&self) -> Option<usize> {
        self.obs_dim
    }

    /// Stored transitions in insertion order
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Rewards in insertion order
    pub fn rewards(&self) -> Vec<f64> {
        self.transitions.iter().map(|t| t.reward).collect()
    }

    /// Value estimates in insertion order
    pub fn values(&self) -> Vec<f64> {
        self.transitions.iter().map(|t| t.value).collect()
    }

    /// Episode-end flags in insertion order
    pub fn dones(&self) -> Vec<bool> {
        self.transitions.iter().map(|t| t.done).collect()
    }

    /// Flatten the stored transitions for the update engine
    pub fn batch(&self) -> RolloutBatch {
        RolloutBatch::from_buffer(self)
    }
}

/// A flattened rollout ready for training
#[derive(Debug, Clone, Default)]
pub struct RolloutBatch {
    /// Observations: \[len * obs_dim\]
    pub observations: Vec<f32>,

    /// Observation width
    pub obs_dim: usize,

    /// Actions: \[len\]
    pub actions: Vec<i64>,

    /// Log probabilities at collection time: \[len\]
    pub old_log_probs: Vec<f64>,

    /// Value estimates at collection time: \[len\]
    pub old_values: Vec<f64>,
}

impl RolloutBatch {
    /// Flatten every transition in `buffer`
    pub fn from_buffer(buffer: &RolloutBuffer) -> Self {
        let n = buffer.len();
        let obs_dim = buffer.obs_dim().unwrap_or(0);

        let mut observations = Vec::with_capacity(n * obs_dim);
        let mut actions = Vec::with_capacity(n);
        let mut old_log_probs = Vec::with_capacity(n);
        let mut old_values = Vec::with_capacity(n);

        for t in buffer.transitions() {
            observations.extend_from_slice(&t.observation);
            actions.push(t.action);
            old_log_probs.push(t.log_prob);
            old_values.push(t.value);
        }

        Self { observations, obs_dim, actions, old_log_probs, old_values }
    }

    /// Get batch size
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Check if batch is empty
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Observation of sample `index`
    pub fn observation(&self, index: usize) -> &[f32] {
        &self.observations[index * self.obs_dim..(index + 1) * self.obs_dim]
    }

    /// Check that every per-sample column has the same length
    pub fn validate(&self) -> Result<(), InvariantError> {
        let n = self.len();
        ensure_len("observations", n * self.obs_dim, self.observations.len())?;
        ensure_len("old_log_probs", n, self.old_log_probs.len())?;
        ensure_len("old_values", n, self.old_values.len())
    }
}
