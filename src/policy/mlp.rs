//! Multi-Layer Perceptron (MLP) policy for discrete actions
//!
//! This module provides a feedforward actor-critic network using tch-rs.
//! The policy outputs both action logits and value estimates, and owns its
//! Adam optimizer so the trainer only has to supply output gradients.
//!
//! # Architecture
//!
//! ```text
//! Input (observations)
//!         |
//!     [Dense(hidden)]
//!         |
//!     Activation
//!         |
//!     [Dense(hidden)]
//!         |
//!     Activation
//!      /     \
//!  Policy   Value
//!  Network  Network
//!     |        |
//! [Dense(n)]  [Dense(1)]
//!     |        |
//!  Actions   Value
//! ```

use std::io::Cursor;

use anyhow::{Context, Result};
use tch::{
    nn::{self, Init, Module, OptimizerConfig},
    Device, Kind, Tensor,
};

use super::inference::{InferenceActivation, InferenceModel};
use super::{ActionEvaluation, ActionSample, OptimizerSettings, OutputGradients, Policy};
use crate::error::ensure_len;

/// Configuration for MLP policy architecture
#[derive(Debug, Clone)]
pub struct MlpConfig {
    /// Width of both shared layers
    pub hidden_dim: i64,
    /// Orthogonal initialization (otherwise small Gaussian)
    pub use_orthogonal_init: bool,
    /// Activation after each shared layer
    pub activation: Activation,
    /// Initial Adam learning rate
    pub learning_rate: f64,
}

/// Hidden-layer activation
#[derive(Debug, Clone, Copy)]
pub enum Activation {
    /// max(0, x)
    ReLU,
    /// tanh(x)
    Tanh,
}

impl Activation {
    fn apply(self, x: &Tensor) -> Tensor {
        match self {
            Activation::ReLU => x.relu(),
            Activation::Tanh => x.tanh(),
        }
    }
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_dim: 64,
            use_orthogonal_init: true,
            activation: Activation::Tanh,
            learning_rate: 3e-4,
        }
    }
}

/// Multi-layer perceptron policy for discrete actions
///
/// Implements an actor-critic architecture with:
/// - Two shared feature extraction layers
/// - Orthogonal weight initialization (better for RL)
/// - Separate policy head (outputs action logits)
/// - Separate value head (outputs state value estimate)
pub struct MlpPolicy {
    vs: nn::VarStore,
    shared: nn::Sequential,
    policy_head: nn::Linear,
    value_head: nn::Linear,
    optimizer: nn::Optimizer,
    device: Device,
    config: MlpConfig,
    obs_dim: i64,
    action_dim: i64,
}

impl MlpPolicy {
    /// Create a new MLP policy with the default architecture
    ///
    /// # Arguments
    ///
    /// * `obs_dim` - Observation space dimensionality
    /// * `action_dim` - Number of discrete actions
    /// * `hidden_dim` - Size of hidden layers
    pub fn new(obs_dim: i64, action_dim: i64, hidden_dim: i64) -> Result<Self> {
        let config = MlpConfig { hidden_dim, ..Default::default() };
        Self::with_config(obs_dim, action_dim, config)
    }

    /// Create a new MLP policy with custom configuration
    ///
    /// # Arguments
    ///
    /// * `obs_dim` - Observation space dimensionality
    /// * `action_dim` - Number of discrete actions
    /// * `config` - Architecture configuration
    pub fn with_config(obs_dim: i64, action_dim: i64, config: MlpConfig) -> Result<Self> {
        let device = Device::cuda_if_available();
        tracing::info!("MlpPolicy using device: {:?}", device);
        let vs = nn::VarStore::new(device);
        let root = vs.root();

        let hidden_init = if config.use_orthogonal_init {
            Init::Orthogonal { gain: 2.0_f64.sqrt() }
        } else {
            Init::Randn { mean: 0.0, stdev: 0.01 }
        };
        let linear_config = nn::LinearConfig { ws_init: hidden_init, ..Default::default() };

        let activation = config.activation;
        let shared = nn::seq()
            .add(nn::linear(&root / "shared" / "fc1", obs_dim, config.hidden_dim, linear_config))
            .add_fn(move |x| activation.apply(x))
            .add(nn::linear(
                &root / "shared" / "fc2",
                config.hidden_dim,
                config.hidden_dim,
                linear_config,
            ))
            .add_fn(move |x| activation.apply(x));

        // Smaller gain for output layers
        let output_init = if config.use_orthogonal_init {
            Init::Orthogonal { gain: 0.01 }
        } else {
            Init::Randn { mean: 0.0, stdev: 0.01 }
        };
        let output_config = nn::LinearConfig { ws_init: output_init, ..Default::default() };

        let policy_head =
            nn::linear(&root / "policy", config.hidden_dim, action_dim, output_config);
        let value_head = nn::linear(&root / "value", config.hidden_dim, 1, output_config);

        let optimizer = nn::Adam::default()
            .build(&vs, config.learning_rate)
            .context("failed to build Adam optimizer")?;

        Ok(Self {
            vs,
            shared,
            policy_head,
            value_head,
            optimizer,
            device,
            config,
            obs_dim,
            action_dim,
        })
    }

    /// Forward pass: compute action logits and values
    pub fn forward(&self, obs: &Tensor) -> (Tensor, Tensor) {
        let features = self.shared.forward(obs);
        let logits = self.policy_head.forward(&features);
        let values = self.value_head.forward(&features).squeeze_dim(-1);
        (logits, values)
    }

    /// Per-sample log probabilities, entropies and values, with autograd
    fn evaluate_tensors(&self, obs: &Tensor, actions: &Tensor) -> (Tensor, Tensor, Tensor) {
        let (logits, values) = self.forward(obs);

        let log_probs = logits.log_softmax(-1, Kind::Float);
        let probs = log_probs.exp();

        let action_log_probs = log_probs.gather(-1, &actions.unsqueeze(-1), false).squeeze_dim(-1);
        let entropy = -(probs * &log_probs).sum_dim_intlist(-1, false, Kind::Float);
        (action_log_probs, entropy, values)
    }

    fn obs_tensor(&self, observations: &[f32], n: usize) -> Result<Tensor> {
        ensure_len("observations", n * self.obs_dim as usize, observations.len())?;
        Ok(Tensor::from_slice(observations).view([n as i64, self.obs_dim]).to_device(self.device))
    }

    fn action_tensor(&self, actions: &[i64]) -> Result<Tensor> {
        if let Some(&bad) = actions.iter().find(|&&a| a < 0 || a >= self.action_dim) {
            anyhow::bail!("action {} outside [0, {})", bad, self.action_dim);
        }
        Ok(Tensor::from_slice(actions).to_device(self.device))
    }

    fn grad_tensor(&self, values: &[f64]) -> Tensor {
        Tensor::from_slice(values).to_kind(Kind::Float).to_device(self.device)
    }

    /// Get the device this policy is on (CPU or CUDA)
    pub fn device(&self) -> Device {
        self.device
    }

    /// Get reference to variable store
    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    /// Export model weights as a pure Rust [`InferenceModel`]
    pub fn export_for_inference(&self) -> Result<InferenceModel> {
        let variables = self.vs.variables();
        let get = |name: &str| {
            variables.get(name).with_context(|| format!("missing variable {}", name))
        };

        let activation = match self.config.activation {
            Activation::ReLU => InferenceActivation::ReLU,
            Activation::Tanh => InferenceActivation::Tanh,
        };

        Ok(InferenceModel {
            obs_dim: self.obs_dim as usize,
            action_dim: self.action_dim as usize,
            hidden_dim: self.config.hidden_dim as usize,
            activation,
            shared_fc1_weight: tensor_to_2d(get("shared.fc1.weight")?)?,
            shared_fc1_bias: tensor_to_1d(get("shared.fc1.bias")?)?,
            shared_fc2_weight: tensor_to_2d(get("shared.fc2.weight")?)?,
            shared_fc2_bias: tensor_to_1d(get("shared.fc2.bias")?)?,
            policy_weight: tensor_to_2d(get("policy.weight")?)?,
            policy_bias: tensor_to_1d(get("policy.bias")?)?,
            value_weight: tensor_to_2d(get("value.weight")?)?,
            value_bias: tensor_to_1d(get("value.bias")?)?,
        })
    }
}

/// Copy a 1D tensor to the host as `Vec<f32>`
fn tensor_to_1d(tensor: &Tensor) -> Result<Vec<f32>> {
    let flat = tensor.to_device(Device::Cpu).to_kind(Kind::Float).contiguous().view([-1]);
    Ok(Vec::<f32>::try_from(&flat)?)
}

/// Copy a 2D tensor to the host as row-major `Vec<Vec<f32>>`
fn tensor_to_2d(tensor: &Tensor) -> Result<Vec<Vec<f32>>> {
    let size = tensor.size();
    anyhow::ensure!(size.len() == 2, "expected 2D tensor, got shape {:?}", size);
    let cols = size[1] as usize;
    let flat = tensor_to_1d(tensor)?;
    Ok(flat.chunks(cols.max(1)).map(<[f32]>::to_vec).collect())
}

/// Copy a 1D tensor to the host as `Vec<f64>`
fn to_f64_vec(tensor: &Tensor) -> Result<Vec<f64>> {
    let flat = tensor.to_device(Device::Cpu).to_kind(Kind::Double).contiguous().view([-1]);
    Ok(Vec::<f64>::try_from(&flat)?)
}

impl Policy for MlpPolicy {
    type Snapshot = InferenceModel;

    fn predict(&self, observation: &[f32]) -> Result<i64> {
        let obs = self.obs_tensor(observation, 1)?;
        let logits = tch::no_grad(|| self.forward(&obs).0);
        Ok(logits.argmax(-1, false).f_int64_value(&[0])?)
    }

    fn act(&mut self, observation: &[f32]) -> Result<ActionSample> {
        let obs = self.obs_tensor(observation, 1)?;
        let (action, log_prob, value) = tch::no_grad(|| {
            let (logits, values) = self.forward(&obs);
            let log_probs_all = logits.log_softmax(-1, Kind::Float);
            let actions = log_probs_all.exp().multinomial(1, true);
            let log_prob = log_probs_all.gather(-1, &actions, false);
            (actions, log_prob, values)
        });

        Ok(ActionSample {
            action: action.f_int64_value(&[0, 0])?,
            log_prob: log_prob.f_double_value(&[0, 0])?,
            value: value.f_double_value(&[0])?,
        })
    }

    fn value(&self, observation: &[f32]) -> Result<f64> {
        let obs = self.obs_tensor(observation, 1)?;
        let values = tch::no_grad(|| self.forward(&obs).1);
        Ok(values.f_double_value(&[0])?)
    }

    fn evaluate_actions(&self, observations: &[f32], actions: &[i64]) -> Result<ActionEvaluation> {
        let obs = self.obs_tensor(observations, actions.len())?;
        let acts = self.action_tensor(actions)?;
        let (log_probs, entropy, values) = tch::no_grad(|| self.evaluate_tensors(&obs, &acts));

        Ok(ActionEvaluation {
            log_probs: to_f64_vec(&log_probs)?,
            values: to_f64_vec(&values)?,
            entropy: to_f64_vec(&entropy)?,
        })
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

        let obs = self.obs_tensor(observations, n)?;
        let acts = self.action_tensor(actions)?;
        let (log_probs, entropy, values) = self.evaluate_tensors(&obs, &acts);

        // Σ output_i * ∂loss/∂output_i has the same parameter gradient as the loss
        let surrogate = (log_probs * self.grad_tensor(&gradients.log_probs)).sum(Kind::Float)
            + (values * self.grad_tensor(&gradients.values)).sum(Kind::Float)
            + (entropy * self.grad_tensor(&gradients.entropy)).sum(Kind::Float);

        self.optimizer.set_lr(settings.learning_rate);
        self.optimizer.zero_grad();
        surrogate.backward();
        if settings.max_grad_norm > 0.0 {
            self.optimizer.clip_grad_norm(settings.max_grad_norm);
        }
        self.optimizer.step();
        Ok(())
    }

    fn snapshot(&self) -> Result<InferenceModel> {
        self.export_for_inference()
    }

    fn state_dict(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.vs.save_to_stream(&mut bytes).context("failed to serialize MLP parameters")?;
        Ok(bytes)
    }

    fn load_state_dict(&mut self, bytes: &[u8]) -> Result<()> {
        self.vs
            .load_from_stream(Cursor::new(bytes))
            .context("failed to restore MLP parameters")?;
        Ok(())
    }
}
