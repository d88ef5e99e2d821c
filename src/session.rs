//! # Session Orchestrator
//!
//! End-to-end driver for one batch-processing session: partitions the input
//! lazily (the size for batch *k+1* is read fresh from the optimizer after
//! batch *k* completes), feeds results into the performance history, taps the
//! checkpoint manager, and reports progress after every batch.
//!
//! State machine: `Init → Running → (Completed | Cancelled | Failed)`.
//! Cancellation is coarse-grained: the signal is checked between batches
//! only, and an in-flight batch always runs to completion.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::checkpoint::{Checkpoint, CheckpointManager};
use crate::config::EngineConfig;
use crate::executor::BatchExecutor;
use crate::metrics::{PerformanceHistory, ResourceSampler};
use crate::optimizer::BatchSizeOptimizer;
use crate::types::{ItemSink, Progress, SessionResult, SessionStatus, SessionTotals};

/// Cloneable cancellation signal for a session. Honored at the next batch
/// boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Seed state carried into the processing loop when resuming.
#[derive(Debug, Clone, Default)]
struct ResumePoint {
    totals: SessionTotals,
    batches_processed: usize,
}

/// Drives a full item set through batch execution, optimization, and
/// checkpointing. One session at a time; two orchestrators never share
/// history or state.
pub struct SessionOrchestrator {
    config: EngineConfig,
    session_id: String,
    sampler: ResourceSampler,
    history: Arc<PerformanceHistory>,
    optimizer: Arc<BatchSizeOptimizer>,
    executor: BatchExecutor,
    checkpoint_manager: Option<CheckpointManager>,
    cancel: CancelHandle,
}

impl SessionOrchestrator {
    pub fn new(config: EngineConfig) -> crate::error::Result<Self> {
        config.validate()?;

        let sampler = ResourceSampler::new(config.sampler_interval(), config.sampler_probe_timeout());
        let history = Arc::new(PerformanceHistory::new(config.history_capacity));
        let optimizer = Arc::new(BatchSizeOptimizer::new(config.clone(), Arc::clone(&history)));
        let executor = BatchExecutor::new(
            sampler.clone(),
            config.sink_concurrency,
            config.sink_timeout(),
        );

        Ok(Self {
            session_id: generate_session_id(),
            config,
            sampler,
            history,
            optimizer,
            executor,
            checkpoint_manager: None,
            cancel: CancelHandle::default(),
        })
    }

    /// Enable durable checkpoints (and resume) through the given manager.
    pub fn with_checkpoints(mut self, manager: CheckpointManager) -> Self {
        self.checkpoint_manager = Some(manager);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Handle callers use to request cancellation from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// The optimizer backing this session, for predictions and
    /// recommendations.
    pub fn optimizer(&self) -> &BatchSizeOptimizer {
        &self.optimizer
    }

    pub fn history(&self) -> &Arc<PerformanceHistory> {
        &self.history
    }

    pub fn sampler(&self) -> &ResourceSampler {
        &self.sampler
    }

    /// Process the full item set. Always returns a complete [`SessionResult`],
    /// even on cancellation or failure.
    pub async fn run<I, S, F>(&mut self, items: &[I], sink: &S, progress_cb: F) -> SessionResult
    where
        I: Sync,
        S: ItemSink<I> + ?Sized,
        F: FnMut(Progress),
    {
        self.drive(items, 0, ResumePoint::default(), sink, progress_cb)
            .await
    }

    /// Resume a previously checkpointed session over the same full item set.
    /// Exactly the items beyond the checkpoint are processed; none twice,
    /// none skipped. Without a loadable checkpoint the run starts fresh.
    pub async fn resume<I, S, F>(
        &mut self,
        session_id: &str,
        items: &[I],
        sink: &S,
        progress_cb: F,
    ) -> SessionResult
    where
        I: Sync,
        S: ItemSink<I> + ?Sized,
        F: FnMut(Progress),
    {
        let checkpoint = match &self.checkpoint_manager {
            Some(manager) => manager.load(session_id).await,
            None => None,
        };

        match checkpoint {
            Some(checkpoint) => {
                self.session_id = session_id.to_string();
                let offset = checkpoint.totals.processed.min(items.len());
                let resume_point = ResumePoint {
                    totals: checkpoint.totals,
                    batches_processed: checkpoint.batches_processed,
                };
                info!(
                    session_id = %self.session_id,
                    resuming_at = offset,
                    total = items.len(),
                    "🚀 SESSION: resuming from checkpoint"
                );
                self.drive(items, offset, resume_point, sink, progress_cb)
                    .await
            }
            None => self.drive(items, 0, ResumePoint::default(), sink, progress_cb).await,
        }
    }

    async fn drive<I, S, F>(
        &mut self,
        items: &[I],
        start_offset: usize,
        resume_point: ResumePoint,
        sink: &S,
        mut progress_cb: F,
    ) -> SessionResult
    where
        I: Sync,
        S: ItemSink<I> + ?Sized,
        F: FnMut(Progress),
    {
        let started_at = Utc::now();
        let total = items.len();

        // Session cap is an orchestrator-level failure: no batches run.
        if self.config.max_items_per_session > 0 && total > self.config.max_items_per_session {
            let message = format!(
                "item count ({total}) exceeds session limit ({})",
                self.config.max_items_per_session
            );
            error!(session_id = %self.session_id, %message, "❌ SESSION: rejected");
            return SessionResult {
                session_id: self.session_id.clone(),
                status: SessionStatus::Failed,
                totals: resume_point.totals,
                total_items: total,
                batches_processed: resume_point.batches_processed,
                started_at,
                finished_at: Utc::now(),
                throughput: 0.0,
                checkpoints: Vec::new(),
                error: Some(message),
            };
        }

        self.sampler.start();

        info!(
            session_id = %self.session_id,
            total_items = total,
            batch_size = self.optimizer.current_batch_size(),
            "🚀 SESSION: starting batch processing"
        );

        let mut status = SessionStatus::Running;
        let mut totals = resume_point.totals;
        let mut batch_num = resume_point.batches_processed;
        let mut offset = start_offset;
        let mut processed_since_checkpoint = 0usize;
        let mut checkpoints: Vec<Checkpoint> = Vec::new();
        let mut pending_save: Option<JoinHandle<()>> = None;

        while offset < total {
            // Cancellation is only honored here, between batches.
            if self.cancel.is_cancelled() {
                status = SessionStatus::Cancelled;
                break;
            }

            // Size is read fresh each iteration; the optimizer may have
            // tuned it after the previous batch.
            let size = self.optimizer.current_batch_size();
            let end = (offset + size).min(total);
            let batch = &items[offset..end];
            batch_num += 1;

            let outcome = self.executor.run_batch(batch_num, batch, sink).await;
            totals.record(outcome.success, outcome.fail, outcome.skipped);
            offset = end;
            processed_since_checkpoint += batch.len();

            self.history.record(outcome.sample.clone());
            self.optimizer.on_batch_complete(&outcome.sample);

            let next_size = self.optimizer.current_batch_size();
            let remaining_batches = (total - offset).div_ceil(next_size);
            let estimated_remaining = outcome
                .sample
                .duration
                .checked_mul(remaining_batches as u32)
                .unwrap_or(Duration::ZERO);

            progress_cb(Progress {
                processed: totals.processed,
                total,
                success: totals.success,
                fail: totals.fail,
                skipped: totals.skipped,
                batch_num,
                total_batches: batch_num + remaining_batches,
                batch_size: batch.len(),
                batch_duration: outcome.sample.duration,
                estimated_remaining,
            });

            if let Some(manager) = &self.checkpoint_manager {
                if manager.should_checkpoint(processed_since_checkpoint) {
                    let checkpoint = self.build_checkpoint(
                        started_at,
                        &totals,
                        batch_num,
                        batch_num + remaining_batches,
                        total,
                    );
                    checkpoints.push(checkpoint.clone());
                    pending_save = Some(manager.save(&checkpoint));
                    processed_since_checkpoint = 0;
                }
            }
        }

        if status == SessionStatus::Running {
            status = SessionStatus::Completed;
        }

        // Final checkpoint so a cancelled run resumes at the right offset.
        if let Some(manager) = &self.checkpoint_manager {
            if processed_since_checkpoint > 0 {
                let checkpoint =
                    self.build_checkpoint(started_at, &totals, batch_num, batch_num, total);
                checkpoints.push(checkpoint.clone());
                pending_save = Some(manager.save(&checkpoint));
            }
        }
        if let Some(handle) = pending_save {
            let _ = handle.await;
        }

        let finished_at = Utc::now();
        let elapsed_minutes = (finished_at - started_at).num_milliseconds() as f64 / 60_000.0;
        let throughput = if elapsed_minutes > 0.0 {
            totals.processed as f64 / elapsed_minutes
        } else {
            0.0
        };

        info!(
            session_id = %self.session_id,
            status = %status,
            processed = totals.processed,
            success = totals.success,
            fail = totals.fail,
            skipped = totals.skipped,
            batches = batch_num,
            throughput = format!("{throughput:.1}/min"),
            "📊 SESSION: finished"
        );

        SessionResult {
            session_id: self.session_id.clone(),
            status,
            totals,
            total_items: total,
            batches_processed: batch_num,
            started_at,
            finished_at,
            throughput,
            checkpoints,
            error: None,
        }
    }

    fn build_checkpoint(
        &self,
        started_at: chrono::DateTime<Utc>,
        totals: &SessionTotals,
        batches_processed: usize,
        total_batches: usize,
        total_items: usize,
    ) -> Checkpoint {
        let completion_percentage = if total_items > 0 {
            totals.processed as f64 / total_items as f64 * 100.0
        } else {
            100.0
        };
        Checkpoint {
            session_id: self.session_id.clone(),
            started_at,
            recorded_at: Utc::now(),
            totals: *totals,
            batches_processed,
            total_batches,
            current_batch_size: self.optimizer.current_batch_size(),
            total_items,
            completion_percentage,
        }
    }

    /// Stop the background sampler. Call once when the engine is done; the
    /// orchestrator itself holds no other background state.
    pub async fn shutdown(&self) {
        self.sampler.stop().await;
    }
}

/// Timestamp-derived session identifier with a short random suffix so two
/// sessions started in the same second stay independent.
fn generate_session_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("bulk_{timestamp}_{}", &suffix[..8])
}
