//! End-to-end session tests: full runs, progress reporting, cancellation,
//! and checkpoint resume through the public API.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use bulkflow::checkpoint::CheckpointManager;
use bulkflow::config::EngineConfig;
use bulkflow::session::SessionOrchestrator;
use bulkflow::types::{Delivery, ItemSink, Progress, SessionStatus, SinkError};

/// Sink that fails every nth delivery (by call order) and records every item
/// it saw, so tests can assert none was attempted twice.
struct RecordingSink {
    fail_every: usize,
    calls: AtomicUsize,
    seen: Mutex<Vec<u32>>,
}

impl RecordingSink {
    fn new(fail_every: usize) -> Self {
        Self {
            fail_every,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<u32> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ItemSink<u32> for RecordingSink {
    async fn deliver(&self, item: &u32) -> Result<Delivery, SinkError> {
        self.seen.lock().unwrap().push(*item);
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_every > 0 && call % self.fail_every == 0 {
            Err(SinkError::new("synthetic failure"))
        } else {
            Ok(Delivery::Imported)
        }
    }
}

/// Long sampler interval (one initial probe only) and a disarmed memory
/// safety valve, so batch counts stay deterministic under load.
fn fast_config() -> EngineConfig {
    EngineConfig {
        sampler_interval_ms: 60_000,
        valve_memory_threshold: 1.0,
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn test_full_run_with_periodic_failures() {
    let mut session = SessionOrchestrator::new(fast_config()).unwrap();
    let items: Vec<u32> = (0..1000).collect();
    let sink = RecordingSink::new(10);

    let progress_log: Mutex<Vec<Progress>> = Mutex::new(Vec::new());
    let result = session
        .run(&items, &sink, |p| progress_log.lock().unwrap().push(p))
        .await;

    assert_eq!(result.status, SessionStatus::Completed);
    assert_eq!(result.totals.processed, 1000);
    assert_eq!(result.totals.success, 900);
    assert_eq!(result.totals.fail, 100);
    assert_eq!(result.totals.skipped, 0);
    assert_eq!(result.total_items, 1000);
    assert!(result.throughput > 0.0);

    // Default size 50 over 1000 items: 20 batches, one callback each (the
    // optimizer stays at 50 while every size observed is identical).
    let progress_log = progress_log.into_inner().unwrap();
    assert_eq!(result.batches_processed, 20);
    assert_eq!(progress_log.len(), 20);

    // processed must rise monotonically and land exactly on the total.
    for pair in progress_log.windows(2) {
        assert!(pair[1].processed > pair[0].processed);
    }
    assert_eq!(progress_log.last().unwrap().processed, 1000);

    // Every item attempted exactly once.
    let mut seen = sink.seen();
    seen.sort_unstable();
    assert_eq!(seen, items);

    session.shutdown().await;
}

#[tokio::test]
async fn test_totals_conserve_across_dispositions() {
    struct MixedSink;

    #[async_trait]
    impl ItemSink<u32> for MixedSink {
        async fn deliver(&self, item: &u32) -> Result<Delivery, SinkError> {
            match item % 3 {
                0 => Ok(Delivery::Imported),
                1 => Ok(Delivery::Skipped),
                _ => Err(SinkError::new("rejected")),
            }
        }
    }

    let mut session = SessionOrchestrator::new(fast_config()).unwrap();
    let items: Vec<u32> = (0..300).collect();
    let result = session.run(&items, &MixedSink, |_| {}).await;

    assert_eq!(result.totals.processed, 300);
    assert_eq!(
        result.totals.success + result.totals.fail + result.totals.skipped,
        result.totals.processed
    );
    assert_eq!(result.totals.success, 100);
    assert_eq!(result.totals.skipped, 100);
    assert_eq!(result.totals.fail, 100);
    session.shutdown().await;
}

#[tokio::test]
async fn test_cancellation_stops_at_batch_boundary() {
    let mut session = SessionOrchestrator::new(fast_config()).unwrap();
    let cancel = session.cancel_handle();
    let items: Vec<u32> = (0..1000).collect();
    let sink = RecordingSink::new(0);

    // Cancel from inside the progress callback, after the third batch. The
    // in-flight batch always completes, so processed lands on a batch edge.
    let result = session
        .run(&items, &sink, |p| {
            if p.batch_num == 3 {
                cancel.cancel();
            }
        })
        .await;

    assert_eq!(result.status, SessionStatus::Cancelled);
    assert_eq!(result.batches_processed, 3);
    assert_eq!(result.totals.processed, 150);
    assert_eq!(sink.seen().len(), 150);
    session.shutdown().await;
}

#[tokio::test]
async fn test_checkpoint_resume_processes_only_remaining_items() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        checkpoint_interval: 100,
        ..fast_config()
    };
    let items: Vec<u32> = (0..500).collect();

    // First leg: cancel after 4 batches (200 items, two checkpoints taken).
    let mut first = SessionOrchestrator::new(config.clone())
        .unwrap()
        .with_checkpoints(CheckpointManager::new(dir.path(), config.checkpoint_interval));
    let cancel = first.cancel_handle();
    let sink = RecordingSink::new(0);
    let result = first
        .run(&items, &sink, |p| {
            if p.batch_num == 4 {
                cancel.cancel();
            }
        })
        .await;
    assert_eq!(result.status, SessionStatus::Cancelled);
    assert_eq!(result.totals.processed, 200);
    assert!(!result.checkpoints.is_empty());
    let session_id = result.session_id.clone();
    first.shutdown().await;

    // Second leg: resume must attempt exactly the 300 unprocessed items.
    let mut second = SessionOrchestrator::new(config.clone())
        .unwrap()
        .with_checkpoints(CheckpointManager::new(dir.path(), config.checkpoint_interval));
    let resume_sink = RecordingSink::new(0);
    let resumed = second
        .resume(&session_id, &items, &resume_sink, |_| {})
        .await;

    assert_eq!(resumed.status, SessionStatus::Completed);
    assert_eq!(resumed.totals.processed, 500);
    assert_eq!(resumed.totals.success, 500);

    let mut seen = resume_sink.seen();
    seen.sort_unstable();
    let expected: Vec<u32> = (200..500).collect();
    assert_eq!(seen, expected, "resume must not reprocess checkpointed items");
    second.shutdown().await;
}

#[tokio::test]
async fn test_resume_without_checkpoint_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config();
    let mut session = SessionOrchestrator::new(config.clone())
        .unwrap()
        .with_checkpoints(CheckpointManager::new(dir.path(), 100));

    let items: Vec<u32> = (0..100).collect();
    let sink = RecordingSink::new(0);
    let result = session.resume("no_such_session", &items, &sink, |_| {}).await;

    assert_eq!(result.status, SessionStatus::Completed);
    assert_eq!(result.totals.processed, 100);
    assert_eq!(sink.seen().len(), 100);
    session.shutdown().await;
}

#[tokio::test]
async fn test_completed_run_leaves_resumable_final_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        checkpoint_interval: 100,
        ..fast_config()
    };
    let mut session = SessionOrchestrator::new(config.clone())
        .unwrap()
        .with_checkpoints(CheckpointManager::new(dir.path(), config.checkpoint_interval));

    let items: Vec<u32> = (0..250).collect();
    let sink = RecordingSink::new(0);
    let result = session.run(&items, &sink, |_| {}).await;
    assert_eq!(result.status, SessionStatus::Completed);

    let manager = CheckpointManager::new(dir.path(), config.checkpoint_interval);
    let checkpoint = manager.load(&result.session_id).await.unwrap();
    assert_eq!(checkpoint.totals.processed, 250);
    assert!((checkpoint.completion_percentage - 100.0).abs() < 1e-9);
    session.shutdown().await;
}

#[tokio::test]
async fn test_last_short_batch_is_processed() {
    let mut session = SessionOrchestrator::new(fast_config()).unwrap();
    // 1030 items at size 50 leaves a final batch of 30.
    let items: Vec<u32> = (0..1030).collect();
    let sink = RecordingSink::new(0);

    let sizes: Mutex<Vec<usize>> = Mutex::new(Vec::new());
    let result = session
        .run(&items, &sink, |p| sizes.lock().unwrap().push(p.batch_size))
        .await;

    assert_eq!(result.totals.processed, 1030);
    assert_eq!(*sizes.lock().unwrap().last().unwrap(), 30);
    session.shutdown().await;
}
