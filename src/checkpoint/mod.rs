//! Checkpoint persistence
//!
//! The orchestrator hands the store an opaque policy blob (from
//! [`Policy::state_dict`](crate::policy::Policy::state_dict)) and the
//! [`TrainingState`] at the time of the write. [`FileCheckpointStore`]
//! keeps one file per tag:
//!
//! ```text
//! <dir>/checkpoint_<tag>.ckpt
//!
//! [ magic "THRC" | u32 LE header length | JSON header | policy bytes ]
//! ```
//!
//! Files are written to a temporary sibling, synced, and renamed into
//! place, so a reader never observes a half-written checkpoint.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::train::TrainingState;

const MAGIC: &[u8; 4] = b"THRC";
const FILE_PREFIX: &str = "checkpoint_";
const FILE_EXTENSION: &str = "ckpt";

/// Destination for checkpoints
pub trait CheckpointStore: Send {
    /// Persist `policy_state` and `training_state` under `tag`, replacing
    /// any previous checkpoint with the same tag
    fn write(&mut self, tag: &str, policy_state: &[u8], training_state: &TrainingState) -> Result<()>;
}

impl<S: CheckpointStore + ?Sized> CheckpointStore for Box<S> {
    fn write(&mut self, tag: &str, policy_state: &[u8], training_state: &TrainingState) -> Result<()> {
        (**self).write(tag, policy_state, training_state)
    }
}

/// A checkpoint read back from storage
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    /// Tag it was written under
    pub tag: String,
    /// Training progress at write time
    pub training_state: TrainingState,
    /// Serialized policy parameters
    pub policy_state: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    tag: String,
    training_state: TrainingState,
    policy_bytes: usize,
}

/// Checkpoint store backed by a directory
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    keep_last: Option<usize>,
}

impl FileCheckpointStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create checkpoint directory {}", dir.display()))?;
        Ok(Self { dir, keep_last: None })
    }

    /// Keep only the newest `n` periodic (`step_*`) checkpoints
    pub fn with_keep_last(mut self, n: usize) -> Self {
        self.keep_last = Some(n);
        self
    }

    /// Directory the store writes to
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the checkpoint file for `tag`
    pub fn path_for(&self, tag: &str) -> PathBuf {
        self.dir.join(format!("{}{}.{}", FILE_PREFIX, tag, FILE_EXTENSION))
    }

    /// Whether a checkpoint exists for `tag`
    pub fn exists(&self, tag: &str) -> bool {
        self.path_for(tag).is_file()
    }

    /// Read the checkpoint stored under `tag`
    pub fn read(&self, tag: &str) -> Result<Checkpoint> {
        validate_tag(tag)?;
        let path = self.path_for(tag);
        let mut bytes = Vec::new();
        File::open(&path)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .with_context(|| format!("failed to read checkpoint {}", path.display()))?;

        decode(&bytes).with_context(|| format!("corrupt checkpoint {}", path.display()))
    }

    /// Tags of all stored checkpoints, sorted
    pub fn tags(&self) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            if let Some(tag) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_prefix(FILE_PREFIX))
            {
                tags.push(tag.to_string());
            }
        }
        tags.sort();
        Ok(tags)
    }

    fn prune(&self) -> Result<()> {
        let Some(keep) = self.keep_last else {
            return Ok(());
        };

        let mut periodic: Vec<(usize, String)> = self
            .tags()?
            .into_iter()
            .filter_map(|t| t.strip_prefix("step_").and_then(|n| n.parse().ok()).map(|n| (n, t)))
            .collect();
        periodic.sort();

        let excess = periodic.len().saturating_sub(keep);
        for (_, tag) in periodic.into_iter().take(excess) {
            match fs::remove_file(self.path_for(&tag)) {
                Ok(()) => tracing::debug!("pruned checkpoint {}", tag),
                Err(e) => tracing::warn!("failed to prune checkpoint {}: {}", tag, e),
            }
        }
        Ok(())
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn write(&mut self, tag: &str, policy_state: &[u8], training_state: &TrainingState) -> Result<()> {
        validate_tag(tag)?;

        let bytes = encode(tag, policy_state, training_state)?;
        let path = self.path_for(tag);
        let tmp = path.with_extension(format!("{}.tmp", FILE_EXTENSION));

        {
            let mut file = File::create(&tmp)
                .with_context(|| format!("failed to create {}", tmp.display()))?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to move checkpoint into {}", path.display()))?;

        tracing::info!("Saved checkpoint '{}' at step {}", tag, training_state.step);

        // The checkpoint is already durable; pruning is best effort
        if tag.starts_with("step_") {
            if let Err(e) = self.prune() {
                tracing::warn!("failed to prune old checkpoints: {:#}", e);
            }
        }
        Ok(())
    }
}

fn validate_tag(tag: &str) -> Result<()> {
    ensure!(!tag.is_empty(), "checkpoint tag must not be empty");
    ensure!(
        tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
        "invalid checkpoint tag {:?}",
        tag
    );
    Ok(())
}

fn encode(tag: &str, policy_state: &[u8], training_state: &TrainingState) -> Result<Vec<u8>> {
    let header = serde_json::to_vec(&Header {
        tag: tag.to_string(),
        training_state: training_state.clone(),
        policy_bytes: policy_state.len(),
    })?;
    let header_len = u32::try_from(header.len()).context("checkpoint header too large")?;

    let mut bytes = Vec::with_capacity(MAGIC.len() + 4 + header.len() + policy_state.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&header_len.to_le_bytes());
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(policy_state);
    Ok(bytes)
}

fn decode(bytes: &[u8]) -> Result<Checkpoint> {
    if bytes.len() < MAGIC.len() + 4 || &bytes[..MAGIC.len()] != MAGIC {
        bail!("missing checkpoint magic");
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&bytes[MAGIC.len()..MAGIC.len() + 4]);
    let header_len = u32::from_le_bytes(len_bytes) as usize;

    let body = &bytes[MAGIC.len() + 4..];
    ensure!(body.len() >= header_len, "truncated checkpoint header");
    let header: Header = serde_json::from_slice(&body[..header_len])?;

    let policy_state = &body[header_len..];
    ensure!(
        policy_state.len() == header.policy_bytes,
        "policy state is {} bytes, header says {}",
        policy_state.len(),
        header.policy_bytes
    );

    Ok(Checkpoint {
        tag: header.tag,
        training_state: header.training_state,
        policy_state: policy_state.to_vec(),
    })
}
