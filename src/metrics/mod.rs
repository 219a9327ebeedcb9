//! Metrics sinks
//!
//! The orchestrator reports one [`MetricsRecord`] per update and per
//! evaluation round, and a warning record whenever it swallows a
//! recoverable fault such as a failed checkpoint write. Where the records
//! go is up to the [`MetricsSink`] the caller plugs in.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// What produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A PPO update finished
    Update,
    /// An evaluation round finished
    Evaluation,
    /// A recoverable fault
    Warning,
}

/// One metrics record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    /// Environment steps taken when the record was emitted
    pub step: usize,
    /// Episodes completed when the record was emitted
    pub episode: usize,
    /// Record kind
    pub kind: RecordKind,
    /// Named scalar values
    pub scalars: BTreeMap<String, f64>,
    /// Free-form message, set on warnings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MetricsRecord {
    /// Create a record with no scalars
    pub fn new(kind: RecordKind, step: usize, episode: usize) -> Self {
        Self { step, episode, kind, scalars: BTreeMap::new(), message: None }
    }

    /// Add a scalar
    pub fn with_scalar(mut self, name: impl Into<String>, value: f64) -> Self {
        self.scalars.insert(name.into(), value);
        self
    }

    /// Merge a map of scalars
    pub fn with_scalars(mut self, scalars: BTreeMap<String, f64>) -> Self {
        self.scalars.extend(scalars);
        self
    }

    /// Attach a message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Look up a scalar by name
    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.scalars.get(name).copied()
    }
}

/// Destination for training metrics
///
/// Recording is infallible from the caller's point of view: a sink that
/// cannot persist a record logs the problem and drops it.
pub trait MetricsSink: Send {
    /// Record one entry
    fn record(&mut self, record: &MetricsRecord);

    /// Record a warning
    fn warn(&mut self, step: usize, episode: usize, message: &str) {
        self.record(&MetricsRecord::new(RecordKind::Warning, step, episode).with_message(message));
    }
}

impl<S: MetricsSink + ?Sized> MetricsSink for Box<S> {
    fn record(&mut self, record: &MetricsRecord) {
        (**self).record(record)
    }
}

/// Sink that forwards records to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn record(&mut self, record: &MetricsRecord) {
        let scalars = record
            .scalars
            .iter()
            .map(|(k, v)| format!("{}={:.4}", k, v))
            .collect::<Vec<_>>()
            .join(" ");

        match record.kind {
            RecordKind::Warning => tracing::warn!(
                step = record.step,
                episode = record.episode,
                "{}",
                record.message.as_deref().unwrap_or("")
            ),
            RecordKind::Update => {
                tracing::info!(step = record.step, episode = record.episode, "update {}", scalars)
            }
            RecordKind::Evaluation => {
                tracing::info!(step = record.step, episode = record.episode, "eval {}", scalars)
            }
        }
    }
}

/// In-memory sink
///
/// Clones share the same storage, so a test can keep one handle and pass
/// another to the orchestrator.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<MetricsRecord>>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn records(&self) -> Vec<MetricsRecord> {
        self.records.lock().clone()
    }

    /// Records of one kind
    pub fn of_kind(&self, kind: RecordKind) -> Vec<MetricsRecord> {
        self.records.lock().iter().filter(|r| r.kind == kind).cloned().collect()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl MetricsSink for MemorySink {
    fn record(&mut self, record: &MetricsRecord) {
        self.records.lock().push(record.clone());
    }
}

/// Sink that appends one JSON object per line to a file
pub struct JsonLinesSink {
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    /// Open `path` for appending, creating it if needed
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open metrics file {}", path.display()))?;
        Ok(Self { writer: BufWriter::new(file) })
    }

    fn write_line(&mut self, record: &MetricsRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl MetricsSink for JsonLinesSink {
    fn record(&mut self, record: &MetricsRecord) {
        if let Err(e) = self.write_line(record) {
            tracing::warn!("dropping metrics record at step {}: {:#}", record.step, e);
        }
    }
}
