//! # Checkpoint Manager
//!
//! Durable, resumable progress snapshots. One JSON file per session id,
//! overwritten at every checkpoint; read once at session start when resume is
//! requested. Checkpoints are taken only at batch boundaries, never
//! mid-batch. Save/load I/O failures are logged and non-fatal: a failed write
//! only degrades resume capability for that interval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::types::SessionTotals;

/// Durable snapshot of session progress at a batch boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub totals: SessionTotals,
    pub batches_processed: usize,
    /// Estimated total batch count at the time of the snapshot
    pub total_batches: usize,
    pub current_batch_size: usize,
    pub total_items: usize,
    pub completion_percentage: f64,
}

/// Writes and restores per-session checkpoint files.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
    interval: usize,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>, interval: usize) -> Self {
        Self {
            dir: dir.into(),
            interval,
        }
    }

    /// True when enough items have been processed since the last checkpoint.
    /// An interval of 0 disables checkpointing.
    pub fn should_checkpoint(&self, processed_since_last: usize) -> bool {
        self.interval > 0 && processed_since_last >= self.interval
    }

    pub fn interval(&self) -> usize {
        self.interval
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.checkpoint.json"))
    }

    /// Persist a checkpoint without stalling the caller: the write runs on a
    /// spawned task and failures are logged, not surfaced. The returned
    /// handle lets the session await the final flush at shutdown.
    pub fn save(&self, checkpoint: &Checkpoint) -> JoinHandle<()> {
        let path = self.path_for(&checkpoint.session_id);
        let dir = self.dir.clone();
        let payload = serde_json::to_vec_pretty(checkpoint);
        let session_id = checkpoint.session_id.clone();
        let processed = checkpoint.totals.processed;
        let total = checkpoint.total_items;

        tokio::spawn(async move {
            let payload = match payload {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "⚠️ CHECKPOINT: serialization failed");
                    return;
                }
            };
            if let Err(e) = tokio::fs::create_dir_all(&dir).await {
                warn!(session_id = %session_id, error = %e, "⚠️ CHECKPOINT: could not create checkpoint dir");
                return;
            }
            match tokio::fs::write(&path, payload).await {
                Ok(()) => {
                    info!(
                        session_id = %session_id,
                        processed,
                        total,
                        "📍 CHECKPOINT: saved"
                    );
                }
                Err(e) => {
                    warn!(
                        session_id = %session_id,
                        path = %path.display(),
                        error = %e,
                        "⚠️ CHECKPOINT: write failed, resume disabled for this interval"
                    );
                }
            }
        })
    }

    /// Restore the checkpoint for `session_id`, if one exists and parses.
    /// Missing or corrupt files yield `None` with a log line, never an error.
    pub async fn load(&self, session_id: &str) -> Option<Checkpoint> {
        let path = self.path_for(session_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(
                    session_id = %session_id,
                    path = %path.display(),
                    error = %e,
                    "CHECKPOINT: no checkpoint to load"
                );
                return None;
            }
        };

        match serde_json::from_slice::<Checkpoint>(&bytes) {
            Ok(checkpoint) => {
                info!(
                    session_id = %session_id,
                    processed = checkpoint.totals.processed,
                    total = checkpoint.total_items,
                    "📍 CHECKPOINT: loaded for resume"
                );
                Some(checkpoint)
            }
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    error = %e,
                    "⚠️ CHECKPOINT: file is corrupt, starting fresh"
                );
                None
            }
        }
    }

    /// Whether a checkpoint file exists for the session.
    pub fn can_resume(&self, session_id: &str) -> bool {
        self.path_for(session_id).exists()
    }
}
