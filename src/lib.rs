#![allow(clippy::doc_markdown)] // Allow technical terms like TOML, JSON in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Bulkflow
//!
//! Adaptive batch-processing engine: partitions a large item set into
//! batches, delivers each item to a caller-supplied sink, and continuously
//! tunes the batch size from measured throughput, success rate, and live
//! resource pressure.
//!
//! ## Architecture
//!
//! One [`session::SessionOrchestrator`] drives a session end to end. Batch
//! sizes are decided by a feedback loop: the [`executor::BatchExecutor`]
//! produces a [`metrics::PerformanceSample`] per batch, the
//! [`metrics::PerformanceHistory`] ring retains the recent window, and the
//! [`optimizer::BatchSizeOptimizer`] scores sizes, detects throughput
//! degradation, and applies a memory safety valve. Progress is durably
//! checkpointed through the [`checkpoint::CheckpointManager`] so interrupted
//! sessions resume without reprocessing.
//!
//! ## Module Organization
//!
//! - [`session`] - Session lifecycle, cancellation, and resume
//! - [`executor`] - Per-batch delivery with bounded sink concurrency
//! - [`optimizer`] - Batch-size tuning, prediction, and recommendations
//! - [`metrics`] - Resource sampling and the performance history ring
//! - [`checkpoint`] - Durable progress snapshots
//! - [`types`] - Sink trait, progress reporting, session results
//! - [`config`] - Engine configuration (defaults, TOML file, environment)
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging initialization
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bulkflow::config::EngineConfig;
//! use bulkflow::session::SessionOrchestrator;
//! use bulkflow::types::{Delivery, ItemSink, SinkError};
//! use async_trait::async_trait;
//!
//! struct PrintSink;
//!
//! #[async_trait]
//! impl ItemSink<String> for PrintSink {
//!     async fn deliver(&self, item: &String) -> Result<Delivery, SinkError> {
//!         println!("{item}");
//!         Ok(Delivery::Imported)
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::default();
//! let mut session = SessionOrchestrator::new(config)?;
//!
//! let items: Vec<String> = (0..1000).map(|i| format!("item-{i}")).collect();
//! let result = session
//!     .run(&items, &PrintSink, |progress| {
//!         println!(
//!             "{}/{} processed, ~{} remaining",
//!             progress.processed,
//!             progress.total,
//!             progress.format_remaining()
//!         );
//!     })
//!     .await;
//!
//! println!("{}: {} succeeded", result.status, result.totals.success);
//! session.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod optimizer;
pub mod session;
pub mod types;

pub use checkpoint::{Checkpoint, CheckpointManager};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use executor::{BatchExecutor, BatchOutcome};
pub use metrics::{PerformanceHistory, PerformanceSample, ResourceSampler, ResourceSnapshot};
pub use optimizer::{
    BatchCharacteristics, BatchSizeOptimizer, OptimizerPhase, OptimizerSummary, Priority,
    Recommendation, RecommendationCategory, ResourcePrediction,
};
pub use session::{CancelHandle, SessionOrchestrator};
pub use types::{
    Delivery, ItemSink, Progress, SessionResult, SessionStatus, SessionTotals, SinkError,
};
