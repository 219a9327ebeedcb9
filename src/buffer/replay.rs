//! Prioritized replay buffer
//!
//! A bounded ring buffer of transitions. Records are sampled with
//! probability proportional to their priority and evicted strictly in
//! insertion order once the buffer is at capacity.
//!
//! ```text
//! P(i) = p_i / Σ_j p_j
//! ```
//!
//! New records enter with priority `1.0`. Priorities written through
//! [`PrioritizedReplayBuffer::update_priorities`] are offset by
//! [`PRIORITY_EPSILON`] so no record becomes unsampleable.

use anyhow::{Context, Result};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use super::rollout::Transition;
use crate::error::{ensure_len, InvariantError};

/// Priority assigned to newly inserted records
pub const INITIAL_PRIORITY: f64 = 1.0;

/// Offset added to every updated priority
pub const PRIORITY_EPSILON: f64 = 1e-6;

/// A stored transition and its sampling priority
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayRecord {
    /// The stored transition
    pub transition: Transition,

    /// Sampling weight, always `> 0`
    pub priority: f64,
}

/// Result of a prioritized draw
#[derive(Debug, Clone)]
pub struct ReplaySample {
    /// Slot index of each drawn record, for later priority updates
    pub indices: Vec<usize>,

    /// Copies of the drawn transitions
    pub transitions: Vec<Transition>,

    /// Sampling probability of each drawn record
    pub probabilities: Vec<f64>,
}

/// Bounded ring buffer with proportional priority sampling
#[derive(Debug, Clone)]
pub struct PrioritizedReplayBuffer {
    capacity: usize,
    records: Vec<ReplayRecord>,
    /// Next slot to overwrite once full
    position: usize,
}

impl PrioritizedReplayBuffer {
    /// Create an empty buffer holding at most `capacity` records
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, records: Vec::with_capacity(capacity), position: 0 }
    }

    /// Insert a transition with [`INITIAL_PRIORITY`]
    ///
    /// When full, the oldest record is overwritten.
    pub fn push(&mut self, transition: Transition) {
        let record = ReplayRecord { transition, priority: INITIAL_PRIORITY };

        if self.records.len() < self.capacity {
            self.records.push(record);
        } else {
            self.records[self.position] = record;
        }
        self.position = (self.position + 1) % self.capacity;
    }

    /// Draw `batch_size` records with replacement, proportional to priority
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<ReplaySample> {
        if self.records.is_empty() {
            return Err(InvariantError::EmptyReplay.into());
        }

        let total: f64 = self.records.iter().map(|r| r.priority).sum();
        let dist = WeightedIndex::new(self.records.iter().map(|r| r.priority))
            .context("replay priorities do not form a valid distribution")?;

        let indices: Vec<usize> = (0..batch_size).map(|_| dist.sample(rng)).collect();
        let transitions = indices.iter().map(|&i| self.records[i].transition.clone()).collect();
        let probabilities = indices.iter().map(|&i| self.records[i].priority / total).collect();

        Ok(ReplaySample { indices, transitions, probabilities })
    }

    /// Overwrite the priorities of the records at `indices`
    ///
    /// Each stored priority is `priority + PRIORITY_EPSILON`; negative or
    /// non-finite inputs are treated as zero.
    pub fn update_priorities(&mut self, indices: &[usize], priorities: &[f64]) -> Result<()> {
        ensure_len("priorities", indices.len(), priorities.len())?;

        let len = self.records.len();
        for (&idx, &priority) in indices.iter().zip(priorities) {
            let record = self
                .records
                .get_mut(idx)
                .with_context(|| format!("replay index {} out of range ({} records)", idx, len))?;
            let priority = if priority.is_finite() { priority.max(0.0) } else { 0.0 };
            record.priority = priority + PRIORITY_EPSILON;
        }
        Ok(())
    }

    /// Records in slot order
    pub fn records(&self) -> &[ReplayRecord] {
        &self.records
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum number of records
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::env::StepInfo;

    fn transition(tag: f32) -> Transition {
        Transition {
            observation: vec![tag],
            action: 0,
            reward: tag as f64,
            next_observation: vec![tag],
            done: false,
            value: 0.0,
            log_prob: 0.0,
            info: StepInfo::new(),
        }
    }

    #[test]
    fn test_fifo_eviction() {
        let mut buffer = PrioritizedReplayBuffer::new(3);
        for i in 0..5 {
            buffer.push(transition(i as f32));
            assert!(buffer.len() <= 3);
        }

        // Slots 0 and 1 were overwritten by records 3 and 4.
        let tags: Vec<f32> = buffer.records().iter().map(|r| r.transition.observation[0]).collect();
        assert_eq!(tags, vec![3.0, 4.0, 2.0]);
    }

    #[test]
    fn test_eviction_ignores_priority() {
        let mut buffer = PrioritizedReplayBuffer::new(2);
        buffer.push(transition(0.0));
        buffer.push(transition(1.0));
        buffer.update_priorities(&[0], &[100.0]).unwrap();

        buffer.push(transition(2.0));
        assert_eq!(buffer.records()[0].transition.observation[0], 2.0);
        assert_eq!(buffer.records()[0].priority, INITIAL_PRIORITY);
    }

    #[test]
    fn test_sample_empty_fails() {
        let buffer = PrioritizedReplayBuffer::new(4);
        let err = buffer.sample(2, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert_eq!(err.downcast_ref::<InvariantError>(), Some(&InvariantError::EmptyReplay));
    }

    #[test]
    fn test_sampling_follows_priority() {
        let mut buffer = PrioritizedReplayBuffer::new(2);
        buffer.push(transition(0.0));
        buffer.push(transition(1.0));
        buffer.update_priorities(&[0, 1], &[9.0, 1.0]).unwrap();

        let mut rng = StdRng::seed_from_u64(11);
        let sample = buffer.sample(10_000, &mut rng).unwrap();
        let heavy = sample.indices.iter().filter(|&&i| i == 0).count() as f64 / 10_000.0;

        println!("Fraction drawn from heavy record: {:.3}", heavy);
        assert!((heavy - 0.9).abs() < 0.03);
        assert_eq!(sample.transitions.len(), 10_000);
    }

    #[test]
    fn test_zero_priority_stays_positive() {
        let mut buffer = PrioritizedReplayBuffer::new(2);
        buffer.push(transition(0.0));
        buffer.update_priorities(&[0], &[0.0]).unwrap();
        assert!(buffer.records()[0].priority > 0.0);

        buffer.update_priorities(&[0], &[f64::NAN]).unwrap();
        assert_eq!(buffer.records()[0].priority, PRIORITY_EPSILON);
    }

    #[test]
    fn test_update_out_of_range() {
        let mut buffer = PrioritizedReplayBuffer::new(2);
        buffer.push(transition(0.0));
        assert!(buffer.update_priorities(&[1], &[1.0]).is_err());
        assert!(buffer.update_priorities(&[0, 0], &[1.0]).is_err());
    }
}
