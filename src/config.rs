//! Training run configuration
//!
//! [`TrainerConfig`] is the full configuration surface of a training run:
//! rollout length, run length, evaluation and checkpoint cadence, and the
//! PPO hyperparameters (flattened into the same JSON object). Every option
//! has a default, so a config file only needs the values it changes:
//!
//! ```
//! use thrust_rl::config::TrainerConfig;
//!
//! let config = TrainerConfig::from_json_str(r#"{ "horizon": 256, "epochs": 4 }"#).unwrap();
//! assert_eq!(config.horizon, 256);
//! assert_eq!(config.ppo.n_epochs, 4);
//! assert_eq!(config.ppo.batch_size, 64);
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::train::PPOConfig;

/// Configuration of a training run
///
/// An interval of `0` disables that cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Transitions per rollout
    pub horizon: usize,

    /// Environment steps before the run finalizes
    pub max_steps: usize,

    /// Steps between evaluation rounds
    pub eval_interval: usize,

    /// Episodes each evaluation worker runs per round
    pub eval_episode_count: usize,

    /// Deadline for one evaluation round
    pub eval_timeout_seconds: f64,

    /// Evaluation worker threads
    pub eval_workers: usize,

    /// Cap on evaluation episode length
    pub eval_max_episode_steps: Option<usize>,

    /// Steps between periodic checkpoints
    pub checkpoint_interval: usize,

    /// Periodic checkpoints to retain, all when `None`
    pub checkpoint_keep_last: Option<usize>,

    /// Whether a round with failed workers may set a new best reward
    pub partial_rounds_set_best: bool,

    /// PPO update hyperparameters
    #[serde(flatten)]
    pub ppo: PPOConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            horizon: 2048,
            max_steps: 1_000_000,
            eval_interval: 10_000,
            eval_episode_count: 5,
            eval_timeout_seconds: 300.0,
            eval_workers: 4,
            eval_max_episode_steps: None,
            checkpoint_interval: 50_000,
            checkpoint_keep_last: None,
            partial_rounds_set_best: true,
            ppo: PPOConfig::default(),
        }
    }
}

impl TrainerConfig {
    /// Create a default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("invalid trainer configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("in config {}", path.display()))
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(anyhow!("horizon must be positive"));
        }
        if self.eval_interval > 0 {
            if self.eval_workers == 0 {
                return Err(anyhow!("eval_workers must be positive when evaluation is enabled"));
            }
            if !(self.eval_timeout_seconds.is_finite() && self.eval_timeout_seconds > 0.0) {
                return Err(anyhow!("eval_timeout_seconds must be positive"));
            }
        }
        if self.eval_max_episode_steps == Some(0) {
            return Err(anyhow!("eval_max_episode_steps must be positive"));
        }
        if self.checkpoint_keep_last == Some(0) {
            return Err(anyhow!("checkpoint_keep_last must be positive"));
        }
        self.ppo.validate()
    }

    /// Evaluation round deadline
    ///
    /// Values too large for a [`Duration`] saturate to [`Duration::MAX`],
    /// which the pool treats as no deadline.
    pub fn eval_timeout(&self) -> Result<Duration> {
        let seconds = self.eval_timeout_seconds;
        if !(seconds.is_finite() && seconds > 0.0) {
            return Err(anyhow!("invalid eval_timeout_seconds {}", seconds));
        }
        Ok(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX))
    }

    /// Set rollout length
    pub fn horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    /// Set run length in environment steps
    pub fn max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps;
        self
    }

    /// Set evaluation cadence
    pub fn eval_interval(mut self, interval: usize) -> Self {
        self.eval_interval = interval;
        self
    }

    /// Set episodes per worker per round
    pub fn eval_episode_count(mut self, count: usize) -> Self {
        self.eval_episode_count = count;
        self
    }

    /// Set evaluation round deadline
    pub fn eval_timeout_seconds(mut self, seconds: f64) -> Self {
        self.eval_timeout_seconds = seconds;
        self
    }

    /// Set number of evaluation workers
    pub fn eval_workers(mut self, workers: usize) -> Self {
        self.eval_workers = workers;
        self
    }

    /// Set periodic checkpoint cadence
    pub fn checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Set PPO hyperparameters
    pub fn ppo(mut self, ppo: PPOConfig) -> Self {
        self.ppo = ppo;
        self
    }
}
