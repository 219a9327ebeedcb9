//! Inference-only model format
//!
//! A pure Rust forward pass for the two-layer actor-critic MLP. This is the
//! snapshot form of the tch [`MlpPolicy`](super::mlp): evaluation workers run
//! it on their own threads without touching libtorch.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::{argmax, PolicySnapshot};
use crate::error::ensure_len;

/// Hidden-layer activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InferenceActivation {
    /// max(0, x)
    ReLU,
    /// tanh(x)
    Tanh,
}

impl InferenceActivation {
    fn apply(self, x: f32) -> f32 {
        match self {
            Self::ReLU => x.max(0.0),
            Self::Tanh => x.tanh(),
        }
    }
}

/// A serializable MLP model for inference
///
/// Weight matrices are stored row-major as `[out_dim][in_dim]`, the layout
/// of a torch linear layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceModel {
    /// Input dimension
    pub obs_dim: usize,
    /// Output dimension (number of actions)
    pub action_dim: usize,
    /// Hidden layer dimension
    pub hidden_dim: usize,
    /// Activation after each shared layer
    pub activation: InferenceActivation,

    /// Shared layer 1: weights [hidden_dim, obs_dim]
    pub shared_fc1_weight: Vec<Vec<f32>>,
    /// Shared layer 1: bias [hidden_dim]
    pub shared_fc1_bias: Vec<f32>,

    /// Shared layer 2: weights [hidden_dim, hidden_dim]
    pub shared_fc2_weight: Vec<Vec<f32>>,
    /// Shared layer 2: bias [hidden_dim]
    pub shared_fc2_bias: Vec<f32>,

    /// Policy head: weights [action_dim, hidden_dim]
    pub policy_weight: Vec<Vec<f32>>,
    /// Policy head: bias [action_dim]
    pub policy_bias: Vec<f32>,

    /// Value head: weights [1, hidden_dim]
    pub value_weight: Vec<Vec<f32>>,
    /// Value head: bias [1]
    pub value_bias: Vec<f32>,
}

fn dense(weight: &[Vec<f32>], bias: &[f32], input: &[f32]) -> Vec<f32> {
    weight
        .iter()
        .zip(bias)
        .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>() + b)
        .collect()
}

impl InferenceModel {
    /// Save model to JSON file
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)
            .with_context(|| format!("failed to write {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Load model from JSON file
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read {}", path.as_ref().display()))?;
        let model = serde_json::from_str(&json)?;
        Ok(model)
    }

    /// Forward pass: compute action logits and value
    ///
    /// # Arguments
    /// * `obs` - Observation vector [obs_dim]
    ///
    /// # Returns
    /// * `(logits, value)` - Action logits [action_dim] and state value (scalar)
    pub fn forward(&self, obs: &[f32]) -> Result<(Vec<f32>, f32)> {
        ensure_len("observation", self.obs_dim, obs.len())?;

        let mut hidden = dense(&self.shared_fc1_weight, &self.shared_fc1_bias, obs);
        hidden.iter_mut().for_each(|h| *h = self.activation.apply(*h));

        let mut hidden = dense(&self.shared_fc2_weight, &self.shared_fc2_bias, &hidden);
        hidden.iter_mut().for_each(|h| *h = self.activation.apply(*h));

        let logits = dense(&self.policy_weight, &self.policy_bias, &hidden);
        let value = dense(&self.value_weight, &self.value_bias, &hidden)
            .first()
            .copied()
            .context("value head has no output")?;

        Ok((logits, value))
    }

    /// Greedy action: the index of the largest logit
    pub fn get_action(&self, obs: &[f32]) -> Result<usize> {
        let (logits, _value) = self.forward(obs)?;
        Ok(argmax(&logits))
    }
}

impl PolicySnapshot for InferenceModel {
    fn predict(&self, observation: &[f32]) -> Result<i64> {
        Ok(self.get_action(observation)? as i64)
    }
}
