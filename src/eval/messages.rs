//! Messages exchanged with evaluation workers

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// One evaluation round
///
/// The snapshot is cloned for every worker, so nothing the caller does to
/// its policy after submitting can be observed by a running round.
#[derive(Debug, Clone)]
pub struct EvaluationRequest<S> {
    /// Frozen policy to evaluate
    pub snapshot: S,
    /// Episodes each worker runs
    pub episode_count: usize,
}

impl<S> EvaluationRequest<S> {
    /// Create a request
    pub fn new(snapshot: S, episode_count: usize) -> Self {
        Self { snapshot, episode_count }
    }
}

/// A completed evaluation episode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeOutcome {
    /// Undiscounted episode return
    pub reward: f64,
    /// Steps taken
    pub length: usize,
    /// The environment's success flag on the final step
    pub success: bool,
}

/// One worker's share of a round
///
/// `rewards`, `lengths` and `successes` are index-aligned and only hold
/// episodes that ran to completion. A failed worker keeps the episodes it
/// finished before the fault.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    /// Worker that produced the result
    pub worker_id: usize,
    /// Episode returns
    pub rewards: Vec<f64>,
    /// Episode lengths
    pub lengths: Vec<usize>,
    /// Episode success flags
    pub successes: Vec<bool>,
    /// Whether the worker faulted or missed the deadline
    pub failed: bool,
    /// What went wrong, when `failed`
    pub error: Option<String>,
}

impl EvaluationResult {
    /// An empty, successful result
    pub fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            rewards: Vec::new(),
            lengths: Vec::new(),
            successes: Vec::new(),
            failed: false,
            error: None,
        }
    }

    /// Result for a worker that did not reply before the deadline
    pub fn timed_out(worker_id: usize) -> Self {
        let mut result = Self::new(worker_id);
        result.fail("timed out");
        result
    }

    /// Record a finished episode
    pub fn push(&mut self, episode: EpisodeOutcome) {
        self.rewards.push(episode.reward);
        self.lengths.push(episode.length);
        self.successes.push(episode.success);
    }

    /// Mark the result failed
    pub fn fail(&mut self, error: impl Into<String>) {
        self.failed = true;
        self.error = Some(error.into());
    }

    /// Number of completed episodes
    pub fn episodes(&self) -> usize {
        self.rewards.len()
    }
}

pub(crate) enum WorkerCommand<S> {
    Evaluate { round: u64, snapshot: S, episode_count: usize, cancel: Arc<AtomicBool> },
    Stop,
}

pub(crate) struct WorkerReply {
    pub round: u64,
    pub result: EvaluationResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_keeps_episodes_on_failure() {
        let mut result = EvaluationResult::new(2);
        result.push(EpisodeOutcome { reward: 3.0, length: 10, success: true });
        result.fail("env exploded");

        assert!(result.failed);
        assert_eq!(result.episodes(), 1);
        assert_eq!(result.error.as_deref(), Some("env exploded"));
    }

    #[test]
    fn test_timed_out_is_empty() {
        let result = EvaluationResult::timed_out(1);
        assert!(result.failed);
        assert_eq!(result.worker_id, 1);
        assert_eq!(result.episodes(), 0);
    }
}
