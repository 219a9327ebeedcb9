//! Evaluation worker thread body

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};
use crossbeam_channel::{Receiver, Sender};

use super::messages::{EpisodeOutcome, EvaluationResult, WorkerCommand, WorkerReply};
use crate::env::Environment;
use crate::policy::PolicySnapshot;

pub(crate) struct Worker<E> {
    pub id: usize,
    pub env: E,
    pub max_episode_steps: Option<usize>,
}

impl<E: Environment> Worker<E> {
    /// Serve rounds until told to stop or the pool goes away
    pub fn run<S: PolicySnapshot>(
        mut self,
        commands: Receiver<WorkerCommand<S>>,
        replies: Sender<WorkerReply>,
    ) {
        tracing::debug!("evaluation worker {} started", self.id);

        while let Ok(command) = commands.recv() {
            match command {
                WorkerCommand::Evaluate { round, snapshot, episode_count, cancel } => {
                    let result = self.evaluate(&snapshot, episode_count, &cancel);
                    if replies.send(WorkerReply { round, result }).is_err() {
                        break;
                    }
                }
                WorkerCommand::Stop => break,
            }
        }

        tracing::debug!("evaluation worker {} stopped", self.id);
    }

    fn evaluate<S: PolicySnapshot>(
        &mut self,
        snapshot: &S,
        episode_count: usize,
        cancel: &AtomicBool,
    ) -> EvaluationResult {
        let mut result = EvaluationResult::new(self.id);

        for _ in 0..episode_count {
            let outcome =
                catch_unwind(AssertUnwindSafe(|| self.run_episode(snapshot, cancel)));
            match outcome {
                Ok(Ok(episode)) => result.push(episode),
                Ok(Err(e)) => {
                    tracing::warn!("evaluation worker {} failed: {:#}", self.id, e);
                    result.fail(format!("{:#}", e));
                    break;
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::warn!("evaluation worker {} panicked: {}", self.id, message);
                    result.fail(format!("panic: {}", message));
                    break;
                }
            }
        }

        result
    }

    fn run_episode<S: PolicySnapshot>(
        &mut self,
        snapshot: &S,
        cancel: &AtomicBool,
    ) -> Result<EpisodeOutcome> {
        let mut observation = self.env.reset()?;
        let mut episode = EpisodeOutcome { reward: 0.0, length: 0, success: false };

        loop {
            if cancel.load(Ordering::Relaxed) {
                bail!("round cancelled");
            }

            let action = snapshot.predict(&observation)?;
            let step = self.env.step(action)?;
            episode.reward += step.reward;
            episode.length += 1;

            if step.is_done() {
                episode.success = step.info.success();
                return Ok(episode);
            }
            if self.max_episode_steps.is_some_and(|max| episode.length >= max) {
                return Ok(episode);
            }
            observation = step.observation;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
