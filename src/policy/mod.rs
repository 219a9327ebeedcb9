//! Policy and value models
//!
//! The trainer drives a model only through the [`Policy`] trait: it samples
//! actions during collection, evaluates stored actions during updates, and
//! hands back the gradient of the PPO loss with respect to the model's
//! outputs. How those gradients reach the parameters (autograd, analytic
//! back-propagation) is the model's business.
//!
//! Evaluation workers never see the live model. They receive a
//! [`PolicySnapshot`], an immutable value copy that is cheap to clone and
//! safe to move across threads.
//!
//! Implementations:
//! - [`LinearPolicy`]: pure Rust softmax-linear actor-critic
//! - [`MlpPolicy`]: tch MLP actor-critic (feature `tch`), snapshotted as an
//!   [`InferenceModel`]

use std::path::Path;

use anyhow::{Context, Result};

pub mod inference;
pub mod linear;

#[cfg(feature = "tch")]
pub mod mlp;

pub use inference::{InferenceActivation, InferenceModel};
pub use linear::{LinearParams, LinearPolicy};
#[cfg(feature = "tch")]
pub use mlp::{Activation, MlpConfig, MlpPolicy};

/// An action sampled during collection, with the quantities PPO stores
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionSample {
    /// Sampled action index
    pub action: i64,

    /// Log probability of `action` under the current policy
    pub log_prob: f64,

    /// Value estimate of the observation
    pub value: f64,
}

/// Batched re-evaluation of stored actions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionEvaluation {
    /// Log probability of each action under the current policy
    pub log_probs: Vec<f64>,

    /// Value estimate of each observation
    pub values: Vec<f64>,

    /// Entropy of the action distribution at each observation
    pub entropy: Vec<f64>,
}

impl ActionEvaluation {
    /// Number of evaluated samples
    pub fn len(&self) -> usize {
        self.log_probs.len()
    }

    /// Whether no samples were evaluated
    pub fn is_empty(&self) -> bool {
        self.log_probs.is_empty()
    }
}

/// Gradient of the combined loss with respect to each model output
///
/// Entry `i` of each vector is `∂loss / ∂output_i` for sample `i` of the
/// minibatch the outputs were evaluated on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputGradients {
    /// ∂loss / ∂log_prob
    pub log_probs: Vec<f64>,

    /// ∂loss / ∂value
    pub values: Vec<f64>,

    /// ∂loss / ∂entropy
    pub entropy: Vec<f64>,
}

/// Settings for one optimizer step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerSettings {
    /// Step size
    pub learning_rate: f64,

    /// Maximum global gradient norm; larger gradients are rescaled
    pub max_grad_norm: f64,
}

/// Immutable copy of policy parameters used for evaluation
pub trait PolicySnapshot: Clone + Send + 'static {
    /// Deterministic action for `observation`
    fn predict(&self, observation: &[f32]) -> Result<i64>;
}

/// A trainable policy/value model over discrete actions
pub trait Policy: Send {
    /// Immutable copy handed to evaluation workers
    type Snapshot: PolicySnapshot;

    /// Deterministic action for `observation`
    fn predict(&self, observation: &[f32]) -> Result<i64>;

    /// Sample an action and report its log probability and the state value
    fn act(&mut self, observation: &[f32]) -> Result<ActionSample>;

    /// Value estimate of `observation`
    fn value(&self, observation: &[f32]) -> Result<f64>;

    /// Re-evaluate `actions` taken at `observations`
    ///
    /// `observations` is a flattened `[actions.len(), obs_dim]` block.
    fn evaluate_actions(&self, observations: &[f32], actions: &[i64]) -> Result<ActionEvaluation>;

    /// Take exactly one optimizer step
    ///
    /// The outputs are recomputed for `observations`/`actions` and
    /// `gradients` is back-propagated through them.
    fn apply_gradients(
        &mut self,
        observations: &[f32],
        actions: &[i64],
        gradients: &OutputGradients,
        settings: &OptimizerSettings,
    ) -> Result<()>;

    /// Copy the current parameters for evaluation
    fn snapshot(&self) -> Result<Self::Snapshot>;

    /// Serialize parameters
    fn state_dict(&self) -> Result<Vec<u8>>;

    /// Restore parameters produced by [`Policy::state_dict`]
    fn load_state_dict(&mut self, bytes: &[u8]) -> Result<()>;

    /// Save model parameters to a file
    fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.state_dict()?;
        std::fs::write(path, bytes)
            .with_context(|| format!("failed to write policy to {}", path.display()))
    }

    /// Load model parameters from a file
    fn load(&mut self, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read policy from {}", path.display()))?;
        self.load_state_dict(&bytes)
    }
}

/// Numerically stable softmax, returned as `(probs, log_probs)`
pub(crate) fn log_softmax(logits: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let log_sum = logits.iter().map(|&l| (l - max).exp()).sum::<f64>().ln() + max;
    let log_probs: Vec<f64> = logits.iter().map(|&l| l - log_sum).collect();
    let probs = log_probs.iter().map(|lp| lp.exp()).collect();
    (probs, log_probs)
}

/// Entropy of a categorical distribution
pub(crate) fn entropy(probs: &[f64], log_probs: &[f64]) -> f64 {
    -probs.iter().zip(log_probs).map(|(p, lp)| p * lp).sum::<f64>()
}

/// Index of the largest value, ties resolved to the lowest index
pub(crate) fn argmax<T: PartialOrd + Copy>(values: &[T]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}
