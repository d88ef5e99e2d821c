//! # Batch Executor
//!
//! Runs one batch of items against the sink and produces the
//! [`PerformanceSample`] that feeds the optimizer. Every item in a batch is
//! attempted: per-item failures are counted, never fatal (no fail-fast). Sink
//! calls within a batch may run with bounded concurrency; the batch is
//! complete only when all items have returned.

use futures::stream::{self, StreamExt};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::metrics::{PerformanceSample, ResourceSampler};
use crate::types::{Delivery, ItemSink, SinkError};

/// Outcome of one executed batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub success: usize,
    pub fail: usize,
    pub skipped: usize,
    pub sample: PerformanceSample,
}

/// Executes batches sequentially; at most one batch runs at a time per
/// session.
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    sampler: ResourceSampler,
    concurrency: usize,
    sink_timeout: Option<Duration>,
}

impl BatchExecutor {
    pub fn new(
        sampler: ResourceSampler,
        concurrency: usize,
        sink_timeout: Option<Duration>,
    ) -> Self {
        Self {
            sampler,
            concurrency: concurrency.max(1),
            sink_timeout,
        }
    }

    /// Attempt every item in `items` against `sink`, accumulating counts and
    /// wall-clock time. Resource fields on the sample come from the latest
    /// sampler snapshot at completion.
    pub async fn run_batch<I, S>(&self, batch_num: usize, items: &[I], sink: &S) -> BatchOutcome
    where
        I: Sync,
        S: ItemSink<I> + ?Sized,
    {
        let started = Instant::now();
        let batch_size = items.len();

        let mut success = 0usize;
        let mut fail = 0usize;
        let mut skipped = 0usize;

        let mut deliveries = stream::iter(items.iter().map(|item| self.deliver_one(sink, item)))
            .buffer_unordered(self.concurrency);

        while let Some(outcome) = deliveries.next().await {
            match outcome {
                Ok(Delivery::Imported) => success += 1,
                Ok(Delivery::Skipped) => skipped += 1,
                Err(e) => {
                    debug!(batch_num, reason = %e.reason, "item rejected by sink");
                    fail += 1;
                }
            }
        }
        drop(deliveries);

        let elapsed = started.elapsed();
        let processed = success + fail + skipped;
        let elapsed_secs = elapsed.as_secs_f64();

        // Zero elapsed time is indeterminate; report 0 rather than dividing.
        let items_per_second = if elapsed_secs > 0.0 {
            processed as f64 / elapsed_secs
        } else {
            0.0
        };
        let throughput = items_per_second * 60.0;
        let success_rate = if processed > 0 {
            success as f64 / processed as f64
        } else {
            0.0
        };

        let snapshot = self.sampler.latest();
        let sample = PerformanceSample {
            recorded_at: chrono::Utc::now(),
            batch_size,
            duration: elapsed,
            items_per_second,
            throughput,
            success_rate,
            memory_usage: snapshot.memory_usage,
            cpu_usage: snapshot.cpu_usage,
            error_count: fail,
        };

        if fail > 0 {
            warn!(
                batch_num,
                batch_size,
                fail,
                success_rate = format!("{:.1}%", success_rate * 100.0),
                "📦 BATCH: completed with failures"
            );
        } else {
            debug!(
                batch_num,
                batch_size,
                duration_ms = elapsed.as_millis() as u64,
                throughput = format!("{throughput:.1}/min"),
                "📦 BATCH: completed"
            );
        }

        BatchOutcome {
            success,
            fail,
            skipped,
            sample,
        }
    }

    async fn deliver_one<I, S>(&self, sink: &S, item: &I) -> Result<Delivery, SinkError>
    where
        I: Sync,
        S: ItemSink<I> + ?Sized,
    {
        match self.sink_timeout {
            Some(timeout) => tokio::time::timeout(timeout, sink.deliver(item))
                .await
                .unwrap_or_else(|_| {
                    Err(SinkError::new(format!(
                        "sink call exceeded {}ms timeout",
                        timeout.as_millis()
                    )))
                }),
            None => sink.deliver(item).await,
        }
    }
}
