//! # Performance History
//!
//! Bounded, time-ordered ring of completed-batch measurements. Single writer
//! (the orchestrator, after each batch), multiple readers (optimizer, status
//! surfaces). Oldest samples are evicted FIFO once capacity is reached.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Immutable measurement of one completed batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub recorded_at: DateTime<Utc>,
    pub batch_size: usize,
    pub duration: Duration,
    /// Items processed per second of wall-clock time
    pub items_per_second: f64,
    /// Items processed per minute; the unit the optimizer scores in
    pub throughput: f64,
    /// Fraction of attempted items that succeeded, in `[0, 1]`
    pub success_rate: f64,
    /// System memory fraction at batch completion, in `[0, 1]`
    pub memory_usage: f64,
    /// System CPU fraction at batch completion, in `[0, 1]`
    pub cpu_usage: f64,
    pub error_count: usize,
}

/// Zero-valued aggregate over a window of samples. Empty-history queries
/// return the default.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HistoryAggregate {
    pub throughput: f64,
    pub success_rate: f64,
    pub memory_usage: f64,
    pub cpu_usage: f64,
}

/// Bounded FIFO log of past batch outcomes.
#[derive(Debug)]
pub struct PerformanceHistory {
    samples: RwLock<VecDeque<PerformanceSample>>,
    capacity: usize,
}

impl PerformanceHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    /// Append a sample, evicting the oldest once capacity is exceeded.
    pub fn record(&self, sample: PerformanceSample) {
        let mut samples = self.samples.write();
        samples.push_back(sample);
        while samples.len() > self.capacity {
            samples.pop_front();
        }
    }

    /// Last `n` samples in chronological order (fewer if the history is
    /// shorter).
    pub fn recent(&self, n: usize) -> Vec<PerformanceSample> {
        let samples = self.samples.read();
        let skip = samples.len().saturating_sub(n);
        samples.iter().skip(skip).cloned().collect()
    }

    /// Averages over the most recent `window` samples, or all available if
    /// fewer exist.
    pub fn average(&self, window: usize) -> HistoryAggregate {
        let recent = self.recent(window);
        if recent.is_empty() {
            return HistoryAggregate::default();
        }

        let len = recent.len() as f64;
        HistoryAggregate {
            throughput: recent.iter().map(|s| s.throughput).sum::<f64>() / len,
            success_rate: recent.iter().map(|s| s.success_rate).sum::<f64>() / len,
            memory_usage: recent.iter().map(|s| s.memory_usage).sum::<f64>() / len,
            cpu_usage: recent.iter().map(|s| s.cpu_usage).sum::<f64>() / len,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }

    /// Most recent sample, if any.
    pub fn last(&self) -> Option<PerformanceSample> {
        self.samples.read().back().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_with(batch_size: usize, throughput: f64) -> PerformanceSample {
        PerformanceSample {
            recorded_at: Utc::now(),
            batch_size,
            duration: Duration::from_secs(1),
            items_per_second: throughput / 60.0,
            throughput,
            success_rate: 1.0,
            memory_usage: 0.5,
            cpu_usage: 0.4,
            error_count: 0,
        }
    }

    #[test]
    fn test_fifo_eviction_at_capacity() {
        let history = PerformanceHistory::new(1000);
        for i in 0..1005 {
            history.record(sample_with(i, 100.0));
        }

        assert_eq!(history.len(), 1000);
        // Samples 0..5 were evicted; the first retained one carries index 5.
        let oldest = history.recent(1000).first().cloned().unwrap();
        assert_eq!(oldest.batch_size, 5);
    }

    #[test]
    fn test_recent_returns_chronological_tail() {
        let history = PerformanceHistory::new(10);
        for i in 0..6 {
            history.record(sample_with(i, 100.0));
        }

        let recent = history.recent(3);
        let sizes: Vec<usize> = recent.iter().map(|s| s.batch_size).collect();
        assert_eq!(sizes, vec![3, 4, 5]);
    }

    #[test]
    fn test_recent_with_short_history() {
        let history = PerformanceHistory::new(10);
        history.record(sample_with(1, 100.0));
        assert_eq!(history.recent(5).len(), 1);
    }

    #[test]
    fn test_empty_average_is_zero_valued() {
        let history = PerformanceHistory::new(10);
        assert_eq!(history.average(5), HistoryAggregate::default());
    }

    #[test]
    fn test_average_over_window() {
        let history = PerformanceHistory::new(10);
        history.record(sample_with(50, 100.0));
        history.record(sample_with(50, 200.0));
        history.record(sample_with(50, 300.0));

        let aggregate = history.average(2);
        assert!((aggregate.throughput - 250.0).abs() < f64::EPSILON);
        assert!((aggregate.success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_last_returns_newest() {
        let history = PerformanceHistory::new(3);
        assert!(history.last().is_none());
        history.record(sample_with(10, 100.0));
        history.record(sample_with(20, 100.0));
        assert_eq!(history.last().unwrap().batch_size, 20);
    }
}
