//! Simple Contextual Bandit Environment
//!
//! A trivial environment for checking that the PPO pipeline learns:
//! - State: Single binary value (0 or 1)
//! - Actions: Two choices (0 or 1)
//! - Optimal policy: Always choose action = state
//! - Reward: +1.0 if action == state, 0.0 otherwise
//! - Episodes: Fixed length (100 steps by default)
//!
//! When an episode ends the step info carries `"success": true` if at least
//! 90% of the episode's actions matched the state.

use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{Environment, SpaceInfo, SpaceType, StepInfo, StepResult};

/// Fraction of correct actions an episode needs to count as a success
const SUCCESS_RATE: f64 = 0.9;

/// Simple contextual bandit for testing PPO correctness
#[derive(Debug)]
pub struct SimpleBandit {
    state: f32,
    steps: usize,
    hits: usize,
    max_steps: usize,
    rng: StdRng,
}

impl SimpleBandit {
    /// Create a new simple bandit environment with 100-step episodes
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy(), 100)
    }

    /// Create a deterministic bandit
    ///
    /// # Arguments
    ///
    /// * `seed` - Seed for the state sequence
    /// * `max_steps` - Episode length
    pub fn seeded(seed: u64, max_steps: usize) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), max_steps)
    }

    fn with_rng(rng: StdRng, max_steps: usize) -> Self {
        Self { state: 0.0, steps: 0, hits: 0, max_steps: max_steps.max(1), rng }
    }

    /// Current state as an action index
    pub fn state(&self) -> i64 {
        self.state as i64
    }
}

impl Default for SimpleBandit {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimpleBandit {
    fn reset(&mut self) -> Result<Vec<f32>> {
        self.state = self.rng.gen_range(0..2) as f32;
        self.steps = 0;
        self.hits = 0;
        Ok(vec![self.state])
    }

    fn step(&mut self, action: i64) -> Result<StepResult> {
        let hit = action == self.state as i64;
        let reward = if hit { 1.0 } else { 0.0 };

        self.steps += 1;
        self.hits += usize::from(hit);
        let terminated = self.steps >= self.max_steps;

        self.state = self.rng.gen_range(0..2) as f32;

        let mut info = StepInfo::new();
        if terminated {
            let rate = self.hits as f64 / self.steps as f64;
            info.insert("success", rate >= SUCCESS_RATE);
        }

        Ok(StepResult {
            observation: vec![self.state],
            reward,
            terminated,
            truncated: false,
            info,
        })
    }

    fn observation_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![1], dtype: SpaceType::Continuous }
    }

    fn action_space(&self) -> SpaceInfo {
        SpaceInfo { shape: vec![], dtype: SpaceType::Discrete(2) }
    }
}
