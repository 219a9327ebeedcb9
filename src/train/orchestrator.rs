//! Training loop
//!
//! [`TrainingOrchestrator`] is a small phase machine. Each call to
//! [`tick`](TrainingOrchestrator::tick) runs one phase and picks the next:
//!
//! ```text
//! Collecting ──(buffer full)──────────────► Updating ──┐
//!     │  ▲                                              │
//!     │  └──────────────────────────────────────────────┤
//!     ├──(eval due)──────────────────────► Evaluating ──┤
//!     ├──(new best / checkpoint due)──► Checkpointing ──┘
//!     └──(step >= max_steps)──► Finalizing ──► Checkpointing(final) ──► Done
//! ```
//!
//! All training state lives here and is only touched from the calling
//! thread. The evaluation pool is the one place work leaves that thread,
//! and it only ever sees immutable policy snapshots.

use std::fmt;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::ppo::{PPOTrainer, TrainingStats};
use crate::buffer::rollout::{RolloutBuffer, Transition};
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::TrainerConfig;
use crate::env::Environment;
use crate::eval::{EvaluationRequest, EvaluationSummary, EvaluationWorkerPool};
use crate::metrics::{MetricsRecord, MetricsSink, RecordKind};
use crate::policy::Policy;
use crate::utils::stats::mean_std;

/// Progress of a training run
///
/// `step` and `episode` only increase. `best_eval_reward` is `None` until
/// the first evaluation round that produced any episodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    /// Environment steps taken
    pub step: usize,
    /// Episodes completed
    pub episode: usize,
    /// Best mean evaluation reward seen so far
    pub best_eval_reward: Option<f64>,
}

/// Why a checkpoint is being written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointReason {
    /// A new best evaluation reward
    Best,
    /// The periodic checkpoint cadence
    Periodic,
    /// End of the run
    Final,
}

impl CheckpointReason {
    /// Store tag for a checkpoint written at `step`
    pub fn tag(self, step: usize) -> String {
        match self {
            CheckpointReason::Best => "best".to_string(),
            CheckpointReason::Periodic => format!("step_{}", step),
            CheckpointReason::Final => "final".to_string(),
        }
    }
}

/// Orchestrator phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Stepping the environment into the rollout buffer
    Collecting,
    /// Running GAE and a PPO update on a full buffer
    Updating,
    /// Running an evaluation round
    Evaluating,
    /// Writing a checkpoint
    Checkpointing(CheckpointReason),
    /// Wrapping up the run
    Finalizing,
    /// The run is over
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Collecting => write!(f, "COLLECTING"),
            Phase::Updating => write!(f, "UPDATING"),
            Phase::Evaluating => write!(f, "EVALUATING"),
            Phase::Checkpointing(reason) => write!(f, "CHECKPOINTING({:?})", reason),
            Phase::Finalizing => write!(f, "FINALIZING"),
            Phase::Done => write!(f, "DONE"),
        }
    }
}

/// Collaborators of a training run
pub struct TrainingContext<P: Policy, E: Environment> {
    /// Environment used for collection
    pub env: E,
    /// Policy being trained
    pub policy: P,
    /// Evaluation pool; evaluation is skipped when `None`
    pub evaluator: Option<EvaluationWorkerPool<P::Snapshot>>,
    /// Checkpoint destination
    pub checkpoints: Box<dyn CheckpointStore>,
    /// Metrics destination
    pub metrics: Box<dyn MetricsSink>,
}

impl<P: Policy, E: Environment> TrainingContext<P, E> {
    /// Context without an evaluation pool
    pub fn new(
        env: E,
        policy: P,
        checkpoints: impl CheckpointStore + 'static,
        metrics: impl MetricsSink + 'static,
    ) -> Self {
        Self {
            env,
            policy,
            evaluator: None,
            checkpoints: Box::new(checkpoints),
            metrics: Box::new(metrics),
        }
    }

    /// Attach an evaluation pool
    pub fn with_evaluator(mut self, evaluator: EvaluationWorkerPool<P::Snapshot>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }
}

/// Drives collection, updates, evaluation and checkpointing
pub struct TrainingOrchestrator<P: Policy, E: Environment> {
    config: TrainerConfig,
    ctx: TrainingContext<P, E>,
    trainer: PPOTrainer,
    buffer: RolloutBuffer,
    state: TrainingState,
    phase: Phase,
    observation: Vec<f32>,
    rollouts: usize,
    episode_reward: f64,
    finished_rewards: Vec<f64>,
    eval_due: bool,
    periodic_due: bool,
    best_due: bool,
    last_stats: Option<TrainingStats>,
    last_evaluation: Option<EvaluationSummary>,
}

impl<P: Policy, E: Environment> TrainingOrchestrator<P, E> {
    /// Validate `config`, reset the environment, and prepare the first phase
    pub fn new(config: TrainerConfig, mut ctx: TrainingContext<P, E>) -> Result<Self> {
        config.validate()?;
        let trainer = PPOTrainer::new(config.ppo.clone())?;
        let observation = ctx.env.reset().context("failed to reset environment")?;

        if config.eval_interval > 0 && ctx.evaluator.is_none() {
            tracing::warn!("eval_interval is set but no evaluation pool was provided; skipping evaluation");
        }

        let mut orchestrator = Self {
            buffer: RolloutBuffer::new(config.horizon),
            config,
            ctx,
            trainer,
            state: TrainingState::default(),
            phase: Phase::Collecting,
            observation,
            rollouts: 0,
            episode_reward: 0.0,
            finished_rewards: Vec::new(),
            eval_due: false,
            periodic_due: false,
            best_due: false,
            last_stats: None,
            last_evaluation: None,
        };
        orchestrator.phase = orchestrator.next_phase();
        Ok(orchestrator)
    }

    /// Resume from a checkpoint
    ///
    /// Restores the policy parameters and the training counters. Any
    /// partially collected rollout is discarded.
    pub fn restore(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        self.ctx
            .policy
            .load_state_dict(&checkpoint.policy_state)
            .with_context(|| format!("failed to restore policy from checkpoint '{}'", checkpoint.tag))?;

        self.state = checkpoint.training_state.clone();
        self.buffer.clear();
        self.episode_reward = 0.0;
        self.finished_rewards.clear();
        self.eval_due = false;
        self.periodic_due = false;
        self.best_due = false;
        self.observation = self.ctx.env.reset().context("failed to reset environment")?;
        self.phase = self.next_phase();

        tracing::info!(
            "Restored checkpoint '{}' at step {} (episode {})",
            checkpoint.tag,
            self.state.step,
            self.state.episode
        );
        Ok(())
    }

    /// Run until the phase machine reaches [`Phase::Done`]
    pub fn run(&mut self) -> Result<TrainingState> {
        tracing::info!(
            "Training for {} steps (horizon {}, eval every {}, checkpoint every {})",
            self.config.max_steps,
            self.config.horizon,
            self.config.eval_interval,
            self.config.checkpoint_interval
        );

        while self.phase != Phase::Done {
            self.tick()?;
        }
        Ok(self.state.clone())
    }

    /// Run the current phase and move to the next one
    ///
    /// Returns the new phase. Errors are fatal: the orchestrator should not
    /// be ticked again after one.
    pub fn tick(&mut self) -> Result<Phase> {
        self.phase = match self.phase {
            Phase::Collecting => {
                self.collect()?;
                self.next_phase()
            }
            Phase::Updating => {
                self.update()?;
                self.next_phase()
            }
            Phase::Evaluating => {
                self.evaluate()?;
                self.next_phase()
            }
            Phase::Checkpointing(reason) => {
                self.checkpoint(reason)?;
                if reason == CheckpointReason::Final {
                    Phase::Done
                } else {
                    self.next_phase()
                }
            }
            Phase::Finalizing => {
                tracing::info!(
                    "Finalizing after {} steps, {} episodes, {} updates",
                    self.state.step,
                    self.state.episode,
                    self.rollouts
                );
                Phase::Checkpointing(CheckpointReason::Final)
            }
            Phase::Done => Phase::Done,
        };
        Ok(self.phase)
    }

    fn next_phase(&self) -> Phase {
        if self.buffer.is_full() {
            Phase::Updating
        } else if self.eval_due {
            Phase::Evaluating
        } else if self.best_due {
            Phase::Checkpointing(CheckpointReason::Best)
        } else if self.periodic_due {
            Phase::Checkpointing(CheckpointReason::Periodic)
        } else if self.state.step >= self.config.max_steps {
            Phase::Finalizing
        } else {
            Phase::Collecting
        }
    }

    fn collect(&mut self) -> Result<()> {
        let step = self.state.step;
        let sample = self
            .ctx
            .policy
            .act(&self.observation)
            .with_context(|| format!("policy failed to act at step {}", step))?;
        let result = self
            .ctx
            .env
            .step(sample.action)
            .with_context(|| format!("environment step failed at step {}", step))?;
        let done = result.is_done();

        self.buffer
            .append(Transition {
                observation: std::mem::take(&mut self.observation),
                action: sample.action,
                reward: result.reward,
                next_observation: result.observation.clone(),
                done,
                value: sample.value,
                log_prob: sample.log_prob,
                info: result.info,
            })
            .with_context(|| format!("rollout {} rejected transition at step {}", self.rollouts, step))?;

        self.state.step += 1;
        self.episode_reward += result.reward;

        if done {
            self.state.episode += 1;
            self.finished_rewards.push(self.episode_reward);
            self.episode_reward = 0.0;
            self.observation = self
                .ctx
                .env
                .reset()
                .with_context(|| format!("failed to reset environment at step {}", self.state.step))?;
        } else {
            self.observation = result.observation;
        }

        let step = self.state.step;
        if self.config.eval_interval > 0
            && step % self.config.eval_interval == 0
            && self.ctx.evaluator.is_some()
        {
            self.eval_due = true;
        }
        if self.config.checkpoint_interval > 0 && step % self.config.checkpoint_interval == 0 {
            self.periodic_due = true;
        }
        Ok(())
    }

    fn update(&mut self) -> Result<()> {
        let rollout = self.rollouts;
        self.rollouts += 1;

        let outcome = self.optimize();
        self.buffer.clear();
        let stats = outcome.with_context(|| {
            format!("update failed for rollout {} at step {}", rollout, self.state.step)
        })?;

        let mut record = MetricsRecord::new(RecordKind::Update, self.state.step, self.state.episode)
            .with_scalars(stats.scalars())
            .with_scalar("rollout", rollout as f64);
        if !self.finished_rewards.is_empty() {
            let (mean, _) = mean_std(&self.finished_rewards);
            record = record
                .with_scalar("mean_episode_reward", mean)
                .with_scalar("episodes_finished", self.finished_rewards.len() as f64);
            self.finished_rewards.clear();
        }
        self.ctx.metrics.record(&record);

        tracing::info!(
            "Step {:>8} | rollout {:>5} | policy_loss {:.4} | value_loss {:.4} | total_loss {:.4}",
            self.state.step,
            rollout,
            stats.policy_loss,
            stats.value_loss,
            stats.total_loss
        );
        self.last_stats = Some(stats);
        Ok(())
    }

    fn optimize(&mut self) -> Result<TrainingStats> {
        let bootstrap = self.ctx.policy.value(&self.observation)?;
        let (advantages, returns) = self.buffer.compute_advantages(
            bootstrap,
            self.config.ppo.gamma,
            self.config.ppo.gae_lambda,
        )?;
        let batch = self.buffer.batch();
        self.trainer.update(&mut self.ctx.policy, &batch, &advantages, &returns)
    }

    fn evaluate(&mut self) -> Result<()> {
        self.eval_due = false;
        if self.ctx.evaluator.is_none() {
            return Ok(());
        }

        let snapshot = self
            .ctx
            .policy
            .snapshot()
            .with_context(|| format!("failed to snapshot policy at step {}", self.state.step))?;
        let request = EvaluationRequest::new(snapshot, self.config.eval_episode_count);
        let Some(pool) = self.ctx.evaluator.as_mut() else {
            return Ok(());
        };
        let results = pool.submit(request);
        let summary = EvaluationSummary::from_results(&results);

        let record = MetricsRecord::new(RecordKind::Evaluation, self.state.step, self.state.episode)
            .with_scalars(summary.scalars());
        self.ctx.metrics.record(&record);

        tracing::info!(
            "Eval at step {} | mean {:.3} ± {:.3} | success {:.2} | episodes {} | failed workers {}/{}",
            self.state.step,
            summary.mean_reward,
            summary.std_reward,
            summary.success_rate,
            summary.n_episodes,
            summary.n_failed_workers,
            summary.n_workers
        );

        let eligible = summary.has_episodes()
            && (summary.complete() || self.config.partial_rounds_set_best);
        let improved = self.state.best_eval_reward.map_or(true, |best| summary.mean_reward > best);
        if eligible && improved {
            tracing::info!("New best evaluation reward {:.3}", summary.mean_reward);
            self.state.best_eval_reward = Some(summary.mean_reward);
            self.best_due = true;
        }

        self.last_evaluation = Some(summary);
        Ok(())
    }

    fn checkpoint(&mut self, reason: CheckpointReason) -> Result<()> {
        match reason {
            CheckpointReason::Best => self.best_due = false,
            CheckpointReason::Periodic => self.periodic_due = false,
            CheckpointReason::Final => {}
        }

        let tag = reason.tag(self.state.step);
        let written = match self.ctx.policy.state_dict() {
            Ok(bytes) => self.ctx.checkpoints.write(&tag, &bytes, &self.state),
            Err(e) => Err(e.context("failed to serialize policy")),
        };

        if let Err(e) = written {
            let message = format!("checkpoint '{}' failed at step {}: {:#}", tag, self.state.step, e);
            tracing::warn!("{}", message);
            self.ctx.metrics.warn(self.state.step, self.state.episode, &message);
        }
        Ok(())
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Training counters
    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    /// Run configuration
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Rollout buffer being filled
    pub fn buffer(&self) -> &RolloutBuffer {
        &self.buffer
    }

    /// Policy being trained
    pub fn policy(&self) -> &P {
        &self.ctx.policy
    }

    /// Rollouts consumed by updates so far, failed ones included
    pub fn rollouts(&self) -> usize {
        self.rollouts
    }

    /// Statistics of the most recent update
    pub fn last_stats(&self) -> Option<&TrainingStats> {
        self.last_stats.as_ref()
    }

    /// Summary of the most recent evaluation round
    pub fn last_evaluation(&self) -> Option<&EvaluationSummary> {
        self.last_evaluation.as_ref()
    }

    /// Tear down and hand back the collaborators
    pub fn into_context(self) -> TrainingContext<P, E> {
        self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{SimpleBandit, SpaceInfo, SpaceType, StepInfo, StepResult};
    use crate::metrics::MemorySink;
    use crate::policy::{
        ActionEvaluation, ActionSample, LinearParams, LinearPolicy, OptimizerSettings,
        OutputGradients,
    };
    use crate::train::PPOConfig;
    use anyhow::bail;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    /// Records tags in memory; optionally refuses every write
    #[derive(Clone, Default)]
    struct RecordingStore {
        writes: Arc<Mutex<Vec<(String, TrainingState)>>>,
        fail: bool,
    }

    impl CheckpointStore for RecordingStore {
        fn write(&mut self, tag: &str, _policy: &[u8], state: &TrainingState) -> Result<()> {
            if self.fail {
                bail!("disk full");
            }
            self.writes.lock().push((tag.to_string(), state.clone()));
            Ok(())
        }
    }

    impl RecordingStore {
        fn tags(&self) -> Vec<String> {
            self.writes.lock().iter().map(|(t, _)| t.clone()).collect()
        }
    }

    /// Linear policy whose optimizer step always fails
    struct BrokenOptimizer(LinearPolicy);

    impl Policy for BrokenOptimizer {
        type Snapshot = <LinearPolicy as Policy>::Snapshot;

        fn predict(&self, observation: &[f32]) -> Result<i64> {
            self.0.predict(observation)
        }

        fn act(&mut self, observation: &[f32]) -> Result<ActionSample> {
            self.0.act(observation)
        }

        fn value(&self, observation: &[f32]) -> Result<f64> {
            self.0.value(observation)
        }

        fn evaluate_actions(&self, observations: &[f32], actions: &[i64]) -> Result<ActionEvaluation> {
            self.0.evaluate_actions(observations, actions)
        }

        fn apply_gradients(
            &mut self,
            _observations: &[f32],
            _actions: &[i64],
            _gradients: &OutputGradients,
            _settings: &OptimizerSettings,
        ) -> Result<()> {
            bail!("optimizer diverged")
        }

        fn snapshot(&self) -> Result<Self::Snapshot> {
            self.0.snapshot()
        }

        fn state_dict(&self) -> Result<Vec<u8>> {
            self.0.state_dict()
        }

        fn load_state_dict(&mut self, bytes: &[u8]) -> Result<()> {
            self.0.load_state_dict(bytes)
        }
    }

    fn config(horizon: usize, max_steps: usize) -> TrainerConfig {
        TrainerConfig::new()
            .horizon(horizon)
            .max_steps(max_steps)
            .eval_interval(0)
            .checkpoint_interval(0)
            .ppo(PPOConfig::new().n_epochs(2).batch_size(4).seed(0))
    }

    #[test]
    fn test_phase_sequence() {
        let store = RecordingStore::default();
        let ctx = TrainingContext::new(
            SimpleBandit::seeded(0, 3),
            LinearPolicy::new(1, 2, 0),
            store.clone(),
            MemorySink::new(),
        );
        let mut orchestrator = TrainingOrchestrator::new(config(4, 8).checkpoint_interval(8), ctx).unwrap();

        let mut phases = vec![orchestrator.phase()];
        while orchestrator.phase() != Phase::Done {
            phases.push(orchestrator.tick().unwrap());
        }

        let collecting = |n| std::iter::repeat(Phase::Collecting).take(n);
        let expected: Vec<Phase> = collecting(4)
            .chain([Phase::Updating])
            .chain(collecting(4))
            .chain([
                Phase::Updating,
                Phase::Checkpointing(CheckpointReason::Periodic),
                Phase::Finalizing,
                Phase::Checkpointing(CheckpointReason::Final),
                Phase::Done,
            ])
            .collect();
        assert_eq!(phases, expected);
        assert_eq!(store.tags(), vec!["step_8", "final"]);
    }

    #[test]
    fn test_episodes_cross_rollouts() {
        let metrics = MemorySink::new();
        let ctx = TrainingContext::new(
            SimpleBandit::seeded(1, 3),
            LinearPolicy::new(1, 2, 0),
            RecordingStore::default(),
            metrics.clone(),
        );
        let mut orchestrator = TrainingOrchestrator::new(config(4, 12), ctx).unwrap();
        let state = orchestrator.run().unwrap();

        assert_eq!(state.step, 12);
        assert_eq!(state.episode, 4);
        assert!(orchestrator.buffer().is_empty());

        let updates = metrics.of_kind(RecordKind::Update);
        assert_eq!(updates.len(), 3);
        assert_eq!(updates.iter().map(|r| r.step).collect::<Vec<_>>(), vec![4, 8, 12]);
        assert!(updates.iter().all(|r| r.scalar("policy_loss").is_some()));
        assert!(updates.iter().all(|r| r.scalar("total_loss").is_some()));
    }

    #[test]
    fn test_checkpoint_failure_is_a_warning() {
        let metrics = MemorySink::new();
        let ctx = TrainingContext::new(
            SimpleBandit::seeded(2, 5),
            LinearPolicy::new(1, 2, 0),
            RecordingStore { fail: true, ..Default::default() },
            metrics.clone(),
        );
        let mut orchestrator =
            TrainingOrchestrator::new(config(4, 8).checkpoint_interval(4), ctx).unwrap();
        let state = orchestrator.run().unwrap();

        assert_eq!(state.step, 8);
        let warnings = metrics.of_kind(RecordKind::Warning);
        // step_4, step_8 and final all fail
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].message.as_deref().unwrap().contains("disk full"));
    }

    #[test]
    fn test_update_failure_is_fatal_and_clears_buffer() {
        let ctx = TrainingContext::new(
            SimpleBandit::seeded(3, 10),
            BrokenOptimizer(LinearPolicy::new(1, 2, 0)),
            RecordingStore::default(),
            MemorySink::new(),
        );
        let mut orchestrator = TrainingOrchestrator::new(config(4, 100), ctx).unwrap();

        let err = orchestrator.run().unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("rollout 0"), "{}", message);
        assert!(message.contains("step 4"), "{}", message);
        assert!(message.contains("optimizer diverged"), "{}", message);
        assert!(orchestrator.buffer().is_empty());
    }

    #[test]
    fn test_zero_steps_finalizes_immediately() {
        let store = RecordingStore::default();
        let ctx = TrainingContext::new(
            SimpleBandit::seeded(0, 3),
            LinearPolicy::new(1, 2, 0),
            store.clone(),
            MemorySink::new(),
        );
        let mut orchestrator = TrainingOrchestrator::new(config(4, 0), ctx).unwrap();

        assert_eq!(orchestrator.phase(), Phase::Finalizing);
        assert_eq!(orchestrator.run().unwrap().step, 0);
        assert_eq!(store.tags(), vec!["final"]);
    }

    #[test]
    fn test_restore_resumes_counters() {
        let policy = LinearPolicy::new(1, 2, 9);
        let checkpoint = Checkpoint {
            tag: "step_8".to_string(),
            training_state: TrainingState { step: 8, episode: 2, best_eval_reward: Some(1.0) },
            policy_state: policy.state_dict().unwrap(),
        };

        let ctx = TrainingContext::new(
            SimpleBandit::seeded(0, 3),
            LinearPolicy::new(1, 2, 0),
            RecordingStore::default(),
            MemorySink::new(),
        );
        let mut orchestrator = TrainingOrchestrator::new(config(4, 12), ctx).unwrap();
        orchestrator.restore(&checkpoint).unwrap();

        assert_eq!(orchestrator.policy().params(), policy.params());
        let state = orchestrator.run().unwrap();
        assert_eq!(state.step, 12);
        assert_eq!(state.best_eval_reward, Some(1.0));
    }

    #[derive(Clone, Copy)]
    enum EvalBehaviour {
        Pays(f64),
        Fails,
        Stalls,
    }

    /// Two-step evaluation episodes whose outcome ignores the policy
    struct EvalEnv {
        behaviour: EvalBehaviour,
        t: usize,
    }

    impl Environment for EvalEnv {
        fn reset(&mut self) -> Result<Vec<f32>> {
            self.t = 0;
            Ok(vec![0.0])
        }

        fn step(&mut self, _action: i64) -> Result<StepResult> {
            self.t += 1;
            let reward = match self.behaviour {
                EvalBehaviour::Pays(reward) => reward,
                EvalBehaviour::Fails => bail!("evaluation env crashed"),
                EvalBehaviour::Stalls => {
                    std::thread::sleep(Duration::from_millis(300));
                    0.0
                }
            };
            Ok(StepResult {
                observation: vec![0.0],
                reward,
                terminated: self.t >= 2,
                truncated: false,
                info: StepInfo::new(),
            })
        }

        fn observation_space(&self) -> SpaceInfo {
            SpaceInfo { shape: vec![1], dtype: SpaceType::Continuous }
        }

        fn action_space(&self) -> SpaceInfo {
            SpaceInfo { shape: vec![], dtype: SpaceType::Discrete(2) }
        }
    }

    fn eval_pool(behaviours: Vec<EvalBehaviour>, timeout: Duration) -> EvaluationWorkerPool<LinearParams> {
        EvaluationWorkerPool::new(behaviours.len(), timeout, None, move |id| EvalEnv {
            behaviour: behaviours[id],
            t: 0,
        })
        .unwrap()
    }

    /// Two rollouts of 4 steps with an evaluation round after each
    fn evaluated_run(
        config: TrainerConfig,
        pool: EvaluationWorkerPool<LinearParams>,
        prior_best: Option<f64>,
    ) -> (TrainingState, Vec<String>, MemorySink) {
        let store = RecordingStore::default();
        let metrics = MemorySink::new();
        let ctx = TrainingContext::new(
            SimpleBandit::seeded(4, 3),
            LinearPolicy::new(1, 2, 0),
            store.clone(),
            metrics.clone(),
        )
        .with_evaluator(pool);
        let mut orchestrator = TrainingOrchestrator::new(config, ctx).unwrap();

        if prior_best.is_some() {
            let checkpoint = Checkpoint {
                tag: "best".to_string(),
                training_state: TrainingState { step: 0, episode: 0, best_eval_reward: prior_best },
                policy_state: LinearPolicy::new(1, 2, 0).state_dict().unwrap(),
            };
            orchestrator.restore(&checkpoint).unwrap();
        }

        let state = orchestrator.run().unwrap();
        (state, store.tags(), metrics)
    }

    fn eval_config() -> TrainerConfig {
        config(4, 8).eval_interval(4).eval_episode_count(1)
    }

    #[test]
    fn test_equal_mean_does_not_replace_best() {
        // Every round scores exactly 2.0
        let pool = eval_pool(vec![EvalBehaviour::Pays(1.0); 2], Duration::from_secs(10));
        let (state, tags, metrics) = evaluated_run(eval_config(), pool, None);

        assert_eq!(metrics.of_kind(RecordKind::Evaluation).len(), 2);
        assert_eq!(state.best_eval_reward, Some(2.0));
        assert_eq!(tags, vec!["best", "final"]);

        // A prior best equal to every round is never replaced
        let pool = eval_pool(vec![EvalBehaviour::Pays(1.0); 2], Duration::from_secs(10));
        let (state, tags, _) = evaluated_run(eval_config(), pool, Some(2.0));
        assert_eq!(state.best_eval_reward, Some(2.0));
        assert_eq!(tags, vec!["final"]);
    }

    #[test]
    fn test_partial_round_sets_best_only_when_allowed() {
        let behaviours = vec![EvalBehaviour::Pays(1.0), EvalBehaviour::Fails];

        let mut strict = eval_config();
        strict.partial_rounds_set_best = false;
        let pool = eval_pool(behaviours.clone(), Duration::from_secs(10));
        let (state, tags, metrics) = evaluated_run(strict, pool, None);

        let evaluations = metrics.of_kind(RecordKind::Evaluation);
        assert_eq!(evaluations.len(), 2);
        assert!(evaluations.iter().all(|r| r.scalar("eval_failed_workers") == Some(1.0)));
        assert_eq!(state.best_eval_reward, None);
        assert_eq!(tags, vec!["final"]);

        let pool = eval_pool(behaviours, Duration::from_secs(10));
        let (state, tags, _) = evaluated_run(eval_config(), pool, None);
        assert_eq!(state.best_eval_reward, Some(2.0));
        assert_eq!(tags, vec!["best", "final"]);
    }

    #[test]
    fn test_round_without_episodes_leaves_best_unchanged() {
        // Every worker misses the deadline, so each round has zero episodes.
        // Its zero mean would beat a negative best if it were counted.
        let pool = eval_pool(vec![EvalBehaviour::Stalls; 2], Duration::from_millis(50));
        let (state, tags, metrics) = evaluated_run(eval_config(), pool, Some(-5.0));

        let evaluations = metrics.of_kind(RecordKind::Evaluation);
        assert_eq!(evaluations.len(), 2);
        assert!(evaluations.iter().all(|r| r.scalar("eval_episodes") == Some(0.0)));
        assert_eq!(state.best_eval_reward, Some(-5.0));
        assert_eq!(tags, vec!["final"]);

        let pool = eval_pool(vec![EvalBehaviour::Stalls; 2], Duration::from_millis(50));
        let (state, tags, _) = evaluated_run(eval_config(), pool, None);
        assert_eq!(state.best_eval_reward, None);
        assert_eq!(tags, vec!["final"]);
    }
}
