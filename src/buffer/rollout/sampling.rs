//! Data sampling and batching for rollout buffers
//!
//! This module provides utilities for creating training minibatches from a
//! flattened rollout, including shuffled index generation.

use rand::seq::SliceRandom;
use rand::Rng;

use super::storage::RolloutBatch;
use crate::error::{ensure_len, InvariantError};

/// Generate minibatch indices for PPO training
///
/// Creates shuffled minibatches from a buffer of the given size. Every index
/// appears exactly once; the final minibatch is short when `batch_size` does
/// not divide `buffer_size`.
///
/// # Arguments
/// * `buffer_size` - Total number of samples in buffer
/// * `batch_size` - Desired size of each minibatch
/// * `rng` - Source of the shuffle
///
/// # Returns
/// Vector of vectors, where each inner vector contains indices for one minibatch
pub fn generate_minibatch_indices<R: Rng + ?Sized>(
    buffer_size: usize,
    batch_size: usize,
    rng: &mut R,
) -> Vec<Vec<usize>> {
    let mut indices: Vec<usize> = (0..buffer_size).collect();
    indices.shuffle(rng);

    indices.chunks(batch_size.max(1)).map(|chunk| chunk.to_vec()).collect()
}

/// Minibatch data for training
///
/// Contains a subset of rollout data arranged for the policy's batched
/// evaluation.
#[derive(Debug, Clone)]
pub struct Minibatch {
    /// Observations [batch_size * obs_dim]
    pub observations: Vec<f32>,

    /// Actions [batch_size]
    pub actions: Vec<i64>,

    /// Old log probabilities [batch_size]
    pub old_log_probs: Vec<f64>,

    /// Old value estimates [batch_size]
    pub old_values: Vec<f64>,

    /// Advantages [batch_size]
    pub advantages: Vec<f64>,

    /// Returns [batch_size]
    pub returns: Vec<f64>,

    /// Observation dimension
    obs_dim: usize,
}

impl Minibatch {
    /// Gather the samples at `indices`
    ///
    /// # Arguments
    /// * `batch` - Flattened rollout
    /// * `advantages` - Normalized advantages, one per sample
    /// * `returns` - Returns, one per sample
    /// * `indices` - Samples to include
    pub fn gather(
        batch: &RolloutBatch,
        advantages: &[f64],
        returns: &[f64],
        indices: &[usize],
    ) -> Result<Self, InvariantError> {
        ensure_len("advantages", batch.len(), advantages.len())?;
        ensure_len("returns", batch.len(), returns.len())?;

        let size = indices.len();
        let obs_dim = batch.obs_dim;
        let mut minibatch = Self {
            observations: Vec::with_capacity(size * obs_dim),
            actions: Vec::with_capacity(size),
            old_log_probs: Vec::with_capacity(size),
            old_values: Vec::with_capacity(size),
            advantages: Vec::with_capacity(size),
            returns: Vec::with_capacity(size),
            obs_dim,
        };

        for &idx in indices {
            if idx >= batch.len() {
                return Err(InvariantError::ShapeMismatch {
                    what: "minibatch index",
                    expected: batch.len(),
                    actual: idx,
                });
            }
            minibatch.observations.extend_from_slice(batch.observation(idx));
            minibatch.actions.push(batch.actions[idx]);
            minibatch.old_log_probs.push(batch.old_log_probs[idx]);
            minibatch.old_values.push(batch.old_values[idx]);
            minibatch.advantages.push(advantages[idx]);
            minibatch.returns.push(returns[idx]);
        }

        Ok(minibatch)
    }

    /// Get batch size
    pub fn size(&self) -> usize {
        self.actions.len()
    }

    /// Get observation shape for batched evaluation
    pub fn obs_shape(&self) -> (usize, usize) {
        (self.size(), self.obs_dim)
    }

    /// Check if batch is empty
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}
