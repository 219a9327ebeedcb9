//! Typed invariant violations
//!
//! Everything else in the crate reports failures through `anyhow`. The
//! variants here are the conditions that indicate a programming or
//! configuration error rather than an environmental fault, so callers that
//! need to distinguish them can `downcast_ref::<InvariantError>()`.

use thiserror::Error;

/// Invariant violations raised by buffers and the update engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantError {
    /// Append attempted on a rollout buffer that already holds `horizon` transitions
    #[error("rollout buffer is full (horizon {horizon}); clear it before appending")]
    BufferFull {
        /// Capacity of the buffer
        horizon: usize,
    },

    /// Advantage computation requested before the rollout was complete
    #[error("rollout holds {len} of {horizon} transitions; advantages need a full rollout")]
    RolloutIncomplete {
        /// Transitions currently stored
        len: usize,
        /// Capacity of the buffer
        horizon: usize,
    },

    /// Two sequences that must agree in length (or width) do not
    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Which quantity disagreed
        what: &'static str,
        /// Expected length
        expected: usize,
        /// Observed length
        actual: usize,
    },

    /// Sampling requested from a replay buffer with no records
    #[error("cannot sample from an empty replay buffer")]
    EmptyReplay,
}

/// Return a `ShapeMismatch` unless `actual == expected`
pub(crate) fn ensure_len(
    what: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), InvariantError> {
    if expected == actual {
        Ok(())
    } else {
        Err(InvariantError::ShapeMismatch { what, expected, actual })
    }
}
