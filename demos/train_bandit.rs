//! Train PPO on SimpleBandit (Correctness Test)
//!
//! SimpleBandit is trivial: state is 0 or 1, optimal action equals state.
//! A working pipeline drives the evaluation success rate to 1.0.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example train_bandit --release -- [config.json] [checkpoint_dir]
//! ```
//!
//! Set `RUST_LOG=debug` to see per-update PPO diagnostics.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use thrust_rl::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => TrainerConfig::from_json_file(path)?,
        None => TrainerConfig::new()
            .horizon(256)
            .max_steps(20_000)
            .eval_interval(2_048)
            .eval_episode_count(4)
            .eval_workers(4)
            .eval_timeout_seconds(30.0)
            .checkpoint_interval(5_120)
            .ppo(PPOConfig::new().learning_rate(0.1).n_epochs(4).batch_size(64).seed(0)),
    };
    let checkpoint_dir = PathBuf::from(args.next().unwrap_or_else(|| "checkpoints/bandit".to_string()));

    let env = SimpleBandit::new();
    let obs_dim = env.observation_space().flat_dim();
    let action_dim = match env.action_space().dtype {
        SpaceType::Discrete(n) => n,
        SpaceType::Continuous => bail!("expected a discrete action space"),
    };

    tracing::info!("Environment: SimpleBandit");
    tracing::info!("  Observation dim: {}", obs_dim);
    tracing::info!("  Action dim: {}", action_dim);
    tracing::info!("  Checkpoints: {}", checkpoint_dir.display());

    let pool = EvaluationWorkerPool::new(
        config.eval_workers,
        config.eval_timeout()?,
        config.eval_max_episode_steps,
        |_| SimpleBandit::new(),
    )?;

    let mut store = FileCheckpointStore::new(&checkpoint_dir)?;
    if let Some(keep) = config.checkpoint_keep_last {
        store = store.with_keep_last(keep);
    }

    let ctx = TrainingContext::new(env, LinearPolicy::new(obs_dim, action_dim, 0), store, TracingSink)
        .with_evaluator(pool);

    let mut orchestrator = TrainingOrchestrator::new(config, ctx)?;
    let state = orchestrator.run()?;

    tracing::info!("Training complete: {} steps, {} episodes", state.step, state.episode);
    match orchestrator.last_evaluation() {
        Some(eval) => tracing::info!(
            "Last evaluation: mean reward {:.2}, success rate {:.1}%",
            eval.mean_reward,
            eval.success_rate * 100.0
        ),
        None => tracing::info!("No evaluation rounds ran"),
    }
    if let Some(best) = state.best_eval_reward {
        tracing::info!("Best evaluation reward: {:.2}", best);
    }

    if let Some(pool) = orchestrator.into_context().evaluator {
        pool.shutdown(Duration::from_secs(1));
    }
    Ok(())
}
