//! # Batch-Size Optimizer
//!
//! Decides the batch size for the next batch from recorded performance
//! history and live resource pressure. Three mechanisms, checked after every
//! completed batch:
//!
//! - **Score-and-select**: every `optimization_interval` batches, each
//!   distinct batch size in the recent window is scored by
//!   `throughput * success_rate * max(0.1, 1 - memory_usage)` and the best
//!   average becomes the new size, clamped to the configured bounds.
//! - **Degradation detection**: when the average throughput of the last 3
//!   batches drops below `degradation_ratio` of the 2 before them, a re-score
//!   runs immediately instead of waiting for the interval.
//! - **Safety valve**: when the latest sample's memory usage crosses
//!   `valve_memory_threshold`, the size shrinks by `valve_shrink_factor`
//!   at once, bypassing scoring entirely.
//!
//! The optimizer is the only writer of `current_batch_size`; the orchestrator
//! reads it fresh before each batch.

pub mod prediction;
pub mod recommendations;

pub use prediction::{BatchCharacteristics, ResourcePrediction};
pub use recommendations::{Priority, Recommendation, RecommendationCategory};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::metrics::{HistoryAggregate, PerformanceHistory, PerformanceSample};

/// Minimum history before the optimizer leaves the collecting phase.
pub const MIN_SAMPLES_FOR_TUNING: usize = 3;

/// Tuning phase for one session. No terminal state: tuning continues for the
/// session's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerPhase {
    /// Fewer than [`MIN_SAMPLES_FOR_TUNING`] samples; the configured default
    /// size is used unchanged
    Collecting,
    /// Actively scoring and adjusting
    Tuning,
}

/// Point-in-time view of the optimizer for status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizerSummary {
    pub current_batch_size: usize,
    pub phase: OptimizerPhase,
    pub batches_tracked: usize,
    pub rescores_applied: usize,
    pub average_throughput: f64,
    pub average_success_rate: f64,
    pub average_memory_usage: f64,
    pub average_cpu_usage: f64,
}

/// Feedback-control engine for batch sizing.
#[derive(Debug)]
pub struct BatchSizeOptimizer {
    pub(crate) config: EngineConfig,
    pub(crate) history: Arc<PerformanceHistory>,
    current_batch_size: AtomicUsize,
    batch_counter: AtomicUsize,
    rescores_applied: AtomicUsize,
}

impl BatchSizeOptimizer {
    pub fn new(config: EngineConfig, history: Arc<PerformanceHistory>) -> Self {
        let initial = config
            .default_batch_size
            .clamp(config.min_batch_size, config.max_batch_size);
        Self {
            config,
            history,
            current_batch_size: AtomicUsize::new(initial),
            batch_counter: AtomicUsize::new(0),
            rescores_applied: AtomicUsize::new(0),
        }
    }

    /// Batch size the next batch should use. Always within
    /// `[min_batch_size, max_batch_size]`.
    pub fn current_batch_size(&self) -> usize {
        self.current_batch_size.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> OptimizerPhase {
        if self.history.len() < MIN_SAMPLES_FOR_TUNING {
            OptimizerPhase::Collecting
        } else {
            OptimizerPhase::Tuning
        }
    }

    /// Feed one completed batch into the control loop. Called by the
    /// orchestrator after the sample is already recorded in history.
    pub fn on_batch_complete(&self, sample: &PerformanceSample) {
        let completed = self.batch_counter.fetch_add(1, Ordering::AcqRel) + 1;

        // Hard safety valve: immediate shrink on memory pressure, no scoring.
        if sample.memory_usage > self.config.valve_memory_threshold {
            let before = self.current_batch_size();
            let shrunk = ((before as f64 * self.config.valve_shrink_factor) as usize)
                .max(self.config.min_batch_size);
            self.current_batch_size.store(shrunk, Ordering::Release);
            warn!(
                memory_usage = format!("{:.1}%", sample.memory_usage * 100.0),
                batch_size_before = before,
                batch_size_after = shrunk,
                "🎛️ OPTIMIZER: memory safety valve tripped, shrinking batch size"
            );
            return;
        }

        if self.phase() == OptimizerPhase::Collecting {
            return;
        }

        // Degradation is checked after every batch, not only at the interval.
        if self.degradation_detected() {
            warn!("🎛️ OPTIMIZER: throughput degradation detected, re-scoring early");
            self.rescore();
            return;
        }

        if completed % self.config.optimization_interval == 0 {
            self.rescore();
        }
    }

    /// Score every distinct batch size in the recent window and adopt the
    /// best performer.
    pub fn rescore(&self) {
        let window = self.config.optimization_interval.max(MIN_SAMPLES_FOR_TUNING);
        let recent = self.history.recent(window);
        if recent.len() < MIN_SAMPLES_FOR_TUNING {
            return;
        }

        let Some(best) = Self::best_scoring_size(&recent) else {
            return;
        };
        let clamped = best.clamp(self.config.min_batch_size, self.config.max_batch_size);

        let previous = self.current_batch_size.swap(clamped, Ordering::AcqRel);
        self.rescores_applied.fetch_add(1, Ordering::AcqRel);

        if previous != clamped {
            info!(
                batch_size_before = previous,
                batch_size_after = clamped,
                window = recent.len(),
                "🎛️ OPTIMIZER: adopted best-scoring batch size"
            );
        } else {
            debug!(
                batch_size = clamped,
                "OPTIMIZER: re-score kept current batch size"
            );
        }
    }

    /// Highest average `throughput * success_rate * max(0.1, 1 - memory)`
    /// across samples sharing a batch size.
    fn best_scoring_size(samples: &[PerformanceSample]) -> Option<usize> {
        let mut scores: HashMap<usize, Vec<f64>> = HashMap::new();
        for sample in samples {
            let memory_efficiency = (1.0 - sample.memory_usage).max(0.1);
            let score = sample.throughput * sample.success_rate * memory_efficiency;
            scores.entry(sample.batch_size).or_default().push(score);
        }

        scores
            .into_iter()
            .map(|(size, scores)| {
                let avg = scores.iter().sum::<f64>() / scores.len() as f64;
                (size, avg)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(size, _)| size)
    }

    /// Compare the last 3 batches' average throughput against the 2 before
    /// them. Zero-throughput samples carry no signal and are ignored.
    fn degradation_detected(&self) -> bool {
        let recent = self.history.recent(5);
        if recent.len() < 5 {
            return false;
        }

        let older: Vec<f64> = recent[..2]
            .iter()
            .map(|s| s.throughput)
            .filter(|t| *t > 0.0)
            .collect();
        let newer: Vec<f64> = recent[2..]
            .iter()
            .map(|s| s.throughput)
            .filter(|t| *t > 0.0)
            .collect();

        if older.is_empty() || newer.is_empty() {
            return false;
        }

        let older_avg = older.iter().sum::<f64>() / older.len() as f64;
        let newer_avg = newer.iter().sum::<f64>() / newer.len() as f64;
        newer_avg < older_avg * self.config.degradation_ratio
    }

    /// Status snapshot for callers.
    pub fn summary(&self) -> OptimizerSummary {
        let HistoryAggregate {
            throughput,
            success_rate,
            memory_usage,
            cpu_usage,
        } = self.history.average(self.history.len());

        OptimizerSummary {
            current_batch_size: self.current_batch_size(),
            phase: self.phase(),
            batches_tracked: self.batch_counter.load(Ordering::Acquire),
            rescores_applied: self.rescores_applied.load(Ordering::Acquire),
            average_throughput: throughput,
            average_success_rate: success_rate,
            average_memory_usage: memory_usage,
            average_cpu_usage: cpu_usage,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_collecting_phase_returns_default_size() {
        let (optimizer, history) = optimizer_with(EngineConfig::default());
        assert_eq!(optimizer.phase(), OptimizerPhase::Collecting);

        // Two samples favoring a larger size must not change anything yet.
        for s in [sample(200, 5000.0), sample(200, 5000.0)] {
            history.record(s.clone());
            optimizer.on_batch_complete(&s);
        }
        assert_eq!(optimizer.current_batch_size(), 50);
    }

    #[test]
    fn test_rescore_adopts_best_scoring_size() {
        let (optimizer, history) = optimizer_with(EngineConfig::default());

        for s in [
            sample_full(50, 400.0, 1.0, 0.5, 0.4),
            sample_full(100, 900.0, 1.0, 0.5, 0.4),
            sample_full(50, 420.0, 1.0, 0.5, 0.4),
            sample_full(100, 880.0, 1.0, 0.5, 0.4),
        ] {
            history.record(s);
        }

        optimizer.rescore();
        assert_eq!(optimizer.current_batch_size(), 100);
    }

    #[test]
    fn test_score_penalizes_memory_pressure() {
        let (optimizer, history) = optimizer_with(EngineConfig::default());

        // Higher raw throughput but at near-exhausted memory loses to a
        // slower size running comfortably.
        for s in [
            sample_full(300, 1000.0, 1.0, 0.95, 0.4),
            sample_full(80, 700.0, 1.0, 0.3, 0.4),
            sample_full(300, 1000.0, 1.0, 0.95, 0.4),
            sample_full(80, 700.0, 1.0, 0.3, 0.4),
        ] {
            history.record(s);
        }

        optimizer.rescore();
        assert_eq!(optimizer.current_batch_size(), 80);
    }

    #[test]
    fn test_rescore_clamps_to_bounds() {
        let config = EngineConfig {
            max_batch_size: 60,
            ..EngineConfig::default()
        };
        let (optimizer, history) = optimizer_with(config);

        for _ in 0..3 {
            history.record(sample(500, 9000.0));
        }
        optimizer.rescore();
        assert_eq!(optimizer.current_batch_size(), 60);
    }

    #[test]
    fn test_safety_valve_shrinks_immediately() {
        let (optimizer, history) = optimizer_with(EngineConfig::default());
        let before = optimizer.current_batch_size();

        let hot = sample_full(50, 800.0, 1.0, 0.95, 0.5);
        history.record(hot.clone());
        optimizer.on_batch_complete(&hot);

        let after = optimizer.current_batch_size();
        assert!(after <= (before as f64 * 0.7) as usize);
        assert!(after >= 5);
    }

    #[test]
    fn test_safety_valve_floors_at_min() {
        let config = EngineConfig {
            default_batch_size: 6,
            ..EngineConfig::default()
        };
        let (optimizer, history) = optimizer_with(config);

        let hot = sample_full(6, 800.0, 1.0, 0.99, 0.5);
        history.record(hot.clone());
        optimizer.on_batch_complete(&hot);
        assert_eq!(optimizer.current_batch_size(), 5);
    }

    #[test]
    fn test_degradation_triggers_early_rescore() {
        let (optimizer, history) = optimizer_with(EngineConfig::default());

        // 3 healthy batches at 1000/min, then 2 at 500/min: the 5th
        // completion sees last-3 avg 666 < 0.8 * older-2 avg 1000.
        let samples = [
            sample(50, 1000.0),
            sample(50, 1000.0),
            sample(50, 1000.0),
            sample(50, 500.0),
            sample(50, 500.0),
        ];
        let mut rescored_early = false;
        for (i, s) in samples.iter().enumerate() {
            history.record(s.clone());
            optimizer.on_batch_complete(s);
            let interval_reached = (i + 1) % optimizer.config.optimization_interval == 0;
            if optimizer.rescores_applied.load(Ordering::Acquire) > 0 && !interval_reached {
                rescored_early = true;
            }
        }
        assert!(
            rescored_early,
            "optimizer must re-score before the configured interval"
        );
    }

    #[test]
    fn test_no_degradation_on_stable_throughput() {
        let (optimizer, history) = optimizer_with(EngineConfig::default());
        for _ in 0..5 {
            history.record(sample(50, 1000.0));
        }
        assert!(!optimizer.degradation_detected());
    }

    #[test]
    fn test_summary_reflects_state() {
        let (optimizer, history) = optimizer_with(EngineConfig::default());
        let s = sample(50, 600.0);
        history.record(s.clone());
        optimizer.on_batch_complete(&s);

        let summary = optimizer.summary();
        assert_eq!(summary.current_batch_size, 50);
        assert_eq!(summary.phase, OptimizerPhase::Collecting);
        assert_eq!(summary.batches_tracked, 1);
        assert!((summary.average_throughput - 600.0).abs() < f64::EPSILON);
    }
}
