//! Linear actor-critic policy
//!
//! A dependency-free policy for small discrete problems and for exercising
//! the training loop without libtorch:
//!
//! ```text
//! logits = W x + b        (actor, softmax over actions)
//! value  = u · x + c      (critic)
//! ```
//!
//! Gradients with respect to the outputs are back-propagated analytically
//! and applied with plain SGD after global-norm clipping.

use anyhow::{bail, Context, Result};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::{
    argmax, entropy, log_softmax, ActionEvaluation, ActionSample, OptimizerSettings,
    OutputGradients, Policy, PolicySnapshot,
};
use crate::error::{ensure_len, InvariantError};

/// Parameters of a [`LinearPolicy`]; also its snapshot form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearParams {
    /// Observation width
    pub obs_dim: usize,

    /// Number of discrete actions
    pub action_dim: usize,

    /// Actor weights \[action_dim\]\[obs_dim\]
    pub policy_weight: Vec<Vec<f64>>,

    /// Actor bias \[action_dim\]
    pub policy_bias: Vec<f64>,

    /// Critic weights \[obs_dim\]
    pub value_weight: Vec<f64>,

    /// Critic bias
    pub value_bias: f64,
}

impl LinearParams {
    /// Zero-initialized parameters (uniform policy, zero value)
    pub fn zeros(obs_dim: usize, action_dim: usize) -> Self {
        Self {
            obs_dim,
            action_dim,
            policy_weight: vec![vec![0.0; obs_dim]; action_dim],
            policy_bias: vec![0.0; action_dim],
            value_weight: vec![0.0; obs_dim],
            value_bias: 0.0,
        }
    }

    /// Check that every parameter vector agrees with `obs_dim` and `action_dim`
    pub fn check_shapes(&self) -> Result<(), InvariantError> {
        ensure_len("policy_weight rows", self.action_dim, self.policy_weight.len())?;
        for row in &self.policy_weight {
            ensure_len("policy_weight columns", self.obs_dim, row.len())?;
        }
        ensure_len("policy_bias", self.action_dim, self.policy_bias.len())?;
        ensure_len("value_weight", self.obs_dim, self.value_weight.len())
    }

    fn check_observation(&self, observation: &[f32]) -> Result<(), InvariantError> {
        ensure_len("observation", self.obs_dim, observation.len())
    }

    /// Action logits for one observation
    pub fn logits(&self, observation: &[f32]) -> Vec<f64> {
        self.policy_weight
            .iter()
            .zip(&self.policy_bias)
            .map(|(row, b)| dot(row, observation) + b)
            .collect()
    }

    /// Critic output for one observation
    pub fn state_value(&self, observation: &[f32]) -> f64 {
        dot(&self.value_weight, observation) + self.value_bias
    }

    fn action_index(&self, action: i64) -> Result<usize> {
        match usize::try_from(action) {
            Ok(a) if a < self.action_dim => Ok(a),
            _ => bail!("action {} outside [0, {})", action, self.action_dim),
        }
    }
}

impl PolicySnapshot for LinearParams {
    fn predict(&self, observation: &[f32]) -> Result<i64> {
        self.check_observation(observation)?;
        Ok(argmax(&self.logits(observation)) as i64)
    }
}

fn dot(weights: &[f64], observation: &[f32]) -> f64 {
    weights.iter().zip(observation).map(|(w, &x)| w * x as f64).sum()
}

/// Softmax-linear actor with a linear critic
#[derive(Debug, Clone)]
pub struct LinearPolicy {
    params: LinearParams,
    rng: StdRng,
}

impl LinearPolicy {
    /// Create a zero-initialized policy
    ///
    /// # Arguments
    ///
    /// * `obs_dim` - Observation space dimensionality
    /// * `action_dim` - Number of discrete actions
    /// * `seed` - Seed for action sampling
    pub fn new(obs_dim: usize, action_dim: usize, seed: u64) -> Self {
        Self::from_params(LinearParams::zeros(obs_dim, action_dim), seed)
    }

    /// Wrap existing parameters
    pub fn from_params(params: LinearParams, seed: u64) -> Self {
        Self { params, rng: StdRng::seed_from_u64(seed) }
    }

    /// Current parameters
    pub fn params(&self) -> &LinearParams {
        &self.params
    }

    /// Action probabilities for one observation
    pub fn action_probs(&self, observation: &[f32]) -> Result<Vec<f64>> {
        self.params.check_observation(observation)?;
        Ok(log_softmax(&self.params.logits(observation)).0)
    }

    fn rows<'a>(&self, observations: &'a [f32], n: usize) -> Result<std::slice::ChunksExact<'a, f32>> {
        let obs_dim = self.params.obs_dim;
        ensure_len("observations", n * obs_dim, observations.len())?;
        Ok(observations.chunks_exact(obs_dim.max(1)))
    }
}

impl Policy for LinearPolicy {
    type Snapshot = LinearParams;

    fn predict(&self, observation: &[f32]) -> Result<i64> {
        self.params.predict(observation)
    }

    fn act(&mut self, observation: &[f32]) -> Result<ActionSample> {
        self.params.check_observation(observation)?;
        let (probs, log_probs) = log_softmax(&self.params.logits(observation));

        let dist = WeightedIndex::new(&probs).context("action probabilities are degenerate")?;
        let action = dist.sample(&mut self.rng);

        Ok(ActionSample {
            action: action as i64,
            log_prob: log_probs[action],
            value: self.params.state_value(observation),
        })
    }

    fn value(&self, observation: &[f32]) -> Result<f64> {
        self.params.check_observation(observation)?;
        Ok(self.params.state_value(observation))
    }

    fn evaluate_actions(&self, observations: &[f32], actions: &[i64]) -> Result<ActionEvaluation> {
        let rows = self.rows(observations, actions.len())?;

        let mut out = ActionEvaluation {
            log_probs: Vec::with_capacity(actions.len()),
            values: Vec::with_capacity(actions.len()),
            entropy: Vec::with_capacity(actions.len()),
        };
        for (obs, &action) in rows.zip(actions) {
            let a = self.params.action_index(action)?;
            let (probs, log_probs) = log_softmax(&self.params.logits(obs));
            out.log_probs.push(log_probs[a]);
            out.values.push(self.params.state_value(obs));
            out.entropy.push(entropy(&probs, &log_probs));
        }
        Ok(out)
    }

    fn apply_gradients(
        &mut self,
        observations: &[f32],
        actions: &[i64],
        gradients: &OutputGradients,
        settings: &OptimizerSettings,
    ) -> Result<()> {
        let n = actions.len();
        ensure_len("log_prob gradients", n, gradients.log_probs.len())?;
        ensure_len("value gradients", n, gradients.values.len())?;
        ensure_len("entropy gradients", n, gradients.entropy.len())?;
        let rows = self.rows(observations, n)?;

        let p = &self.params;
        let mut grad = LinearParams::zeros(p.obs_dim, p.action_dim);

        for (i, (obs, &action)) in rows.zip(actions).enumerate() {
            let a = p.action_index(action)?;
            let (probs, log_probs) = log_softmax(&p.logits(obs));
            let h = entropy(&probs, &log_probs);

            for k in 0..p.action_dim {
                // d log_prob(a) / d logit_k = 1[k == a] - p_k
                // d entropy / d logit_k     = -p_k (log p_k + H)
                let indicator = if k == a { 1.0 } else { 0.0 };
                let g_logit = gradients.log_probs[i] * (indicator - probs[k])
                    - gradients.entropy[i] * probs[k] * (log_probs[k] + h);

                for (g, &x) in grad.policy_weight[k].iter_mut().zip(obs) {
                    *g += g_logit * x as f64;
                }
                grad.policy_bias[k] += g_logit;
            }

            let g_value = gradients.values[i];
            for (g, &x) in grad.value_weight.iter_mut().zip(obs) {
                *g += g_value * x as f64;
            }
            grad.value_bias += g_value;
        }

        let norm = grad
            .policy_weight
            .iter()
            .flatten()
            .chain(&grad.policy_bias)
            .chain(&grad.value_weight)
            .chain(std::iter::once(&grad.value_bias))
            .map(|g| g * g)
            .sum::<f64>()
            .sqrt();
        if !norm.is_finite() {
            bail!("non-finite gradient norm");
        }
        let scale = if settings.max_grad_norm > 0.0 && norm > settings.max_grad_norm {
            settings.max_grad_norm / norm
        } else {
            1.0
        };
        let step = settings.learning_rate * scale;

        let p = &mut self.params;
        for (row, grow) in p.policy_weight.iter_mut().zip(&grad.policy_weight) {
            for (w, g) in row.iter_mut().zip(grow) {
                *w -= step * g;
            }
        }
        for (b, g) in p.policy_bias.iter_mut().zip(&grad.policy_bias) {
            *b -= step * g;
        }
        for (w, g) in p.value_weight.iter_mut().zip(&grad.value_weight) {
            *w -= step * g;
        }
        p.value_bias -= step * grad.value_bias;

        Ok(())
    }

    fn snapshot(&self) -> Result<LinearParams> {
        Ok(self.params.clone())
    }

    fn state_dict(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.params)?)
    }

    fn load_state_dict(&mut self, bytes: &[u8]) -> Result<()> {
        let params: LinearParams =
            serde_json::from_slice(bytes).context("invalid linear policy state")?;
        if params.obs_dim != self.params.obs_dim || params.action_dim != self.params.action_dim {
            bail!(
                "policy state has shape ({}, {}), expected ({}, {})",
                params.obs_dim,
                params.action_dim,
                self.params.obs_dim,
                self.params.action_dim
            );
        }
        params.check_shapes().context("invalid linear policy state")?;
        self.params = params;
        Ok(())
    }
}
