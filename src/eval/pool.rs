//! Fan-out/fan-in worker pool

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};

use super::messages::{EvaluationRequest, EvaluationResult, WorkerCommand, WorkerReply};
use super::worker::Worker;
use crate::env::Environment;
use crate::policy::PolicySnapshot;

struct WorkerHandle<S> {
    id: usize,
    commands: Sender<WorkerCommand<S>>,
    thread: Option<JoinHandle<()>>,
}

/// Pool of evaluation workers
///
/// Each worker is a named thread that owns one environment for the pool's
/// lifetime. Rounds are synchronous: [`submit`](Self::submit) returns only
/// after every worker has replied or the round timeout has passed.
///
/// Workers that miss the deadline are reported as failed and signalled to
/// abandon the round; the pool does not wait for them. Their late replies
/// are recognised by round id and dropped.
pub struct EvaluationWorkerPool<S: PolicySnapshot> {
    workers: Vec<WorkerHandle<S>>,
    replies: Receiver<WorkerReply>,
    timeout: Duration,
    next_round: u64,
}

impl<S: PolicySnapshot> EvaluationWorkerPool<S> {
    /// Spawn `n_workers` workers
    ///
    /// # Arguments
    ///
    /// * `n_workers` - Number of worker threads, at least one
    /// * `timeout` - Deadline for a whole round
    /// * `max_episode_steps` - Optional cap on evaluation episode length
    /// * `make_env` - Builds the environment for worker `i`
    pub fn new<E, F>(
        n_workers: usize,
        timeout: Duration,
        max_episode_steps: Option<usize>,
        make_env: F,
    ) -> Result<Self>
    where
        E: Environment + 'static,
        F: Fn(usize) -> E,
    {
        ensure!(n_workers > 0, "evaluation pool needs at least one worker");

        let (reply_tx, replies) = unbounded();
        let mut workers = Vec::with_capacity(n_workers);

        for id in 0..n_workers {
            let (commands, command_rx) = unbounded();
            let worker = Worker { id, env: make_env(id), max_episode_steps };
            let reply_tx = reply_tx.clone();

            let thread = std::thread::Builder::new()
                .name(format!("eval-worker-{}", id))
                .spawn(move || worker.run(command_rx, reply_tx))
                .with_context(|| format!("failed to spawn evaluation worker {}", id))?;

            workers.push(WorkerHandle { id, commands, thread: Some(thread) });
        }

        tracing::info!("Started {} evaluation workers (timeout {:?})", n_workers, timeout);
        Ok(Self { workers, replies, timeout, next_round: 0 })
    }

    /// Number of workers
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Always false; a pool has at least one worker
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Round timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one evaluation round
    ///
    /// Returns one result per worker, in worker-id order.
    pub fn submit(&mut self, request: EvaluationRequest<S>) -> Vec<EvaluationResult> {
        let round = self.next_round;
        self.next_round += 1;

        let cancel = Arc::new(AtomicBool::new(false));
        // A timeout too large to add to `now` means wait without a deadline
        let deadline = Instant::now().checked_add(self.timeout);
        let mut results: Vec<Option<EvaluationResult>> = vec![None; self.workers.len()];
        let mut pending = 0usize;

        for worker in &self.workers {
            let command = WorkerCommand::Evaluate {
                round,
                snapshot: request.snapshot.clone(),
                episode_count: request.episode_count,
                cancel: Arc::clone(&cancel),
            };
            if worker.commands.send(command).is_err() {
                let mut result = EvaluationResult::new(worker.id);
                result.fail("worker thread has exited");
                results[worker.id] = Some(result);
            } else {
                pending += 1;
            }
        }

        while pending > 0 {
            let received = match deadline {
                Some(deadline) => self.replies.recv_deadline(deadline).ok(),
                None => self.replies.recv().ok(),
            };
            let Some(reply) = received else { break };

            if reply.round != round {
                tracing::debug!(
                    "discarding stale reply from worker {} (round {}, current {})",
                    reply.result.worker_id,
                    reply.round,
                    round
                );
                continue;
            }

            let id = reply.result.worker_id;
            match results.get_mut(id) {
                Some(slot) if slot.is_none() => {
                    *slot = Some(reply.result);
                    pending -= 1;
                }
                _ => tracing::debug!("ignoring duplicate reply from worker {}", id),
            }
        }

        if pending > 0 {
            cancel.store(true, Ordering::Relaxed);
            tracing::warn!(
                "evaluation round {} timed out after {:?}: {} of {} workers did not reply",
                round,
                self.timeout,
                pending,
                self.workers.len()
            );
        }

        results
            .into_iter()
            .enumerate()
            .map(|(id, result)| result.unwrap_or_else(|| EvaluationResult::timed_out(id)))
            .collect()
    }

    /// Stop all workers
    ///
    /// Joins the workers that exit within `grace`; the rest are detached.
    /// Returns the number of workers joined.
    pub fn shutdown(mut self, grace: Duration) -> usize {
        self.signal_stop();

        let deadline = Instant::now().checked_add(grace);
        let mut joined = 0;
        loop {
            for worker in &mut self.workers {
                if worker.thread.as_ref().is_some_and(|t| t.is_finished()) {
                    if let Some(thread) = worker.thread.take() {
                        if thread.join().is_err() {
                            tracing::warn!("evaluation worker {} panicked on exit", worker.id);
                        }
                        joined += 1;
                    }
                }
            }

            let running = self.workers.iter().filter(|w| w.thread.is_some()).count();
            if running == 0 {
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::warn!("detaching {} evaluation workers still running", running);
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        joined
    }

    fn signal_stop(&self) {
        for worker in &self.workers {
            let _ = worker.commands.send(WorkerCommand::Stop);
        }
    }
}

impl<S: PolicySnapshot> Drop for EvaluationWorkerPool<S> {
    fn drop(&mut self) {
        self.signal_stop();
    }
}
