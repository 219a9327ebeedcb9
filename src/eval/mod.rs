//! Parallel policy evaluation
//!
//! [`EvaluationWorkerPool`] owns a fixed set of worker threads, each with
//! its own environment. A round broadcasts one policy snapshot to every
//! worker, waits for all of them (or the round timeout), and returns one
//! [`EvaluationResult`] per worker. [`EvaluationSummary`] folds a round's
//! results into the statistics the orchestrator logs and compares.

mod messages;
mod pool;
mod summary;
mod worker;

pub use messages::{EpisodeOutcome, EvaluationRequest, EvaluationResult};
pub use pool::EvaluationWorkerPool;
pub use summary::EvaluationSummary;
