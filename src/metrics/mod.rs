//! # Metrics
//!
//! Resource sampling and the bounded performance history that feeds the
//! batch-size optimizer.

pub mod history;
pub mod sampler;

pub use history::{HistoryAggregate, PerformanceHistory, PerformanceSample};
pub use sampler::{ResourceSampler, ResourceSnapshot};
