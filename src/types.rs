//! Shared types for the batch engine: the sink contract, per-batch progress,
//! and session-level state and results.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Disposition of a single item accepted by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Item was imported by the downstream sink
    Imported,
    /// Sink deliberately skipped the item (duplicate, filtered, etc.)
    Skipped,
}

/// Failure detail for a single rejected item. Never aborts a batch.
#[derive(Debug, Clone, Error)]
#[error("sink rejected item: {reason}")]
pub struct SinkError {
    pub reason: String,
}

impl SinkError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Downstream sink the engine delivers items to, one at a time.
///
/// Implementations must be safe to call concurrently when
/// `sink_concurrency > 1`. The engine imposes nothing on `Item` beyond
/// being deliverable.
#[async_trait]
pub trait ItemSink<Item>: Send + Sync {
    async fn deliver(&self, item: &Item) -> std::result::Result<Delivery, SinkError>;
}

/// Cumulative progress reported to the caller after every completed batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
    pub success: usize,
    pub fail: usize,
    pub skipped: usize,
    /// 1-based index of the batch that just completed
    pub batch_num: usize,
    /// Estimated total batch count at the current batch size
    pub total_batches: usize,
    pub batch_size: usize,
    /// Wall-clock duration of the batch that just completed
    pub batch_duration: Duration,
    pub estimated_remaining: Duration,
}

impl Progress {
    /// Human-readable remaining-time estimate ("42 seconds", "3.5 minutes",
    /// "1.2 hours").
    pub fn format_remaining(&self) -> String {
        let secs = self.estimated_remaining.as_secs_f64();
        if secs < 60.0 {
            format!("{secs:.0} seconds")
        } else if secs < 3600.0 {
            format!("{:.1} minutes", secs / 60.0)
        } else {
            format!("{:.1} hours", secs / 3600.0)
        }
    }
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session constructed but not yet driving batches
    Init,
    /// Batches are being executed
    Running,
    /// All input consumed
    Completed,
    /// Caller-requested cancellation honored at a batch boundary
    Cancelled,
    /// Orchestrator-level failure; no further batches run
    Failed,
}

impl SessionStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Running totals for one session. `processed == success + fail + skipped`
/// holds at every observation point.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionTotals {
    pub processed: usize,
    pub success: usize,
    pub fail: usize,
    pub skipped: usize,
}

impl SessionTotals {
    pub fn record(&mut self, success: usize, fail: usize, skipped: usize) {
        self.processed += success + fail + skipped;
        self.success += success;
        self.fail += fail;
        self.skipped += skipped;
    }
}

/// Final report for a completed, cancelled, or failed session. Always carries
/// full statistics, even on early termination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: String,
    pub status: SessionStatus,
    pub totals: SessionTotals,
    pub total_items: usize,
    pub batches_processed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Items per minute over the whole session
    pub throughput: f64,
    /// Checkpoint trail accumulated during the run
    pub checkpoints: Vec<crate::checkpoint::Checkpoint>,
    /// Triggering error for `Failed` sessions
    pub error: Option<String>,
}
