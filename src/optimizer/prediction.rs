//! # Resource Prediction
//!
//! On-demand estimation of duration, memory, and CPU for a hypothetical batch
//! of N items, using the recent performance history as a linear baseline.
//! Degenerate inputs (no history, zero throughput) yield the cold-start
//! defaults, never an error or a NaN.

use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::BatchSizeOptimizer;

/// Number of recent samples the linear baseline averages over.
const PREDICTION_WINDOW: usize = 10;

/// Fallback throughput (items per minute) when no positive measurement
/// exists.
const FALLBACK_THROUGHPUT: f64 = 1000.0;

/// Known characteristics of the items in a prospective batch. All fields are
/// optional signals; the defaults describe a plain, small-item workload.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchCharacteristics {
    /// Whether items carry attachments (default `false`). Attachment-heavy
    /// batches get a memory uplift and an extra risk factor.
    pub has_attachments: bool,
    /// Average serialized item size in bytes (default `0` = unknown/small).
    pub avg_item_bytes: u64,
}

/// Predicted resource requirements for a not-yet-run batch. Computed on
/// demand; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ResourcePrediction {
    pub estimated_duration: Duration,
    pub predicted_memory: f64,
    pub predicted_cpu: f64,
    pub recommended_batch_size: usize,
    /// In `[0.1, 0.95]`; at most 0.3 until enough history exists
    pub confidence: f64,
    pub risk_factors: Vec<String>,
}

impl BatchSizeOptimizer {
    /// Predict resource needs for a batch of `item_count` items.
    pub fn predict(
        &self,
        item_count: usize,
        characteristics: &BatchCharacteristics,
    ) -> ResourcePrediction {
        let recent = self.history.recent(PREDICTION_WINDOW);
        if recent.len() < super::MIN_SAMPLES_FOR_TUNING {
            return self.cold_start_prediction(item_count, characteristics);
        }

        let positive: Vec<f64> = recent
            .iter()
            .map(|s| s.throughput)
            .filter(|t| *t > 0.0)
            .collect();
        let avg_throughput = if positive.is_empty() {
            FALLBACK_THROUGHPUT
        } else {
            positive.iter().sum::<f64>() / positive.len() as f64
        };

        let len = recent.len() as f64;
        let avg_memory = recent.iter().map(|s| s.memory_usage).sum::<f64>() / len;
        let avg_cpu = recent.iter().map(|s| s.cpu_usage).sum::<f64>() / len;
        let avg_success = recent.iter().map(|s| s.success_rate).sum::<f64>() / len;

        // A vanishing-but-positive average throughput can push the estimate
        // past what Duration can hold; fall back to the neutral baseline.
        let estimated_duration = Duration::try_from_secs_f64(
            (item_count as f64 / avg_throughput) * 60.0,
        )
        .unwrap_or_else(|_| fallback_duration(item_count));

        // Crude linear scale against a 100-item baseline.
        let scale_factor = item_count as f64 / 100.0;
        let mut predicted_memory = (avg_memory * (1.0 + scale_factor * 0.01)).min(0.9);
        if characteristics.has_attachments {
            predicted_memory = (predicted_memory * 1.1).min(0.9);
        }
        let predicted_cpu = (avg_cpu * (1.0 + scale_factor * 0.005)).min(0.95);

        let recommended_batch_size =
            self.recommend_size_for(item_count, predicted_memory, predicted_cpu);

        let confidence = Self::confidence_from_spread(&positive);
        let risk_factors = self.collect_risk_factors(
            item_count,
            predicted_memory,
            predicted_cpu,
            avg_success,
            characteristics,
        );

        debug!(
            item_count,
            estimated_duration_secs = estimated_duration.as_secs_f64(),
            recommended_batch_size,
            confidence = format!("{confidence:.2}"),
            "OPTIMIZER: resource prediction computed"
        );

        ResourcePrediction {
            estimated_duration,
            predicted_memory,
            predicted_cpu,
            recommended_batch_size,
            confidence,
            risk_factors,
        }
    }

    /// Defaults used while history is too thin to extrapolate from.
    fn cold_start_prediction(
        &self,
        item_count: usize,
        characteristics: &BatchCharacteristics,
    ) -> ResourcePrediction {
        let estimated_duration = fallback_duration(item_count);

        let mut risk_factors = vec!["Insufficient historical data".to_string()];
        if characteristics.has_attachments {
            risk_factors.push("Attachment-heavy items".to_string());
        }

        ResourcePrediction {
            estimated_duration,
            predicted_memory: (item_count as f64 / 10_000.0).min(0.5),
            predicted_cpu: 0.6,
            recommended_batch_size: self.current_batch_size(),
            confidence: 0.3,
            risk_factors,
        }
    }

    /// Recommended size for the given projected pressure, folding in the
    /// item count, clamped to the configured bounds.
    fn recommend_size_for(
        &self,
        item_count: usize,
        projected_memory: f64,
        projected_cpu: f64,
    ) -> usize {
        let mut size = self.current_batch_size() as f64;

        if projected_memory > 0.8 {
            size *= 0.7;
        } else if projected_memory < 0.3 {
            size *= 1.3;
        }

        if projected_cpu > 0.9 {
            size *= 0.8;
        } else if projected_cpu < 0.4 {
            size *= 1.2;
        }

        let mut size = size as usize;
        if item_count > 1000 {
            size = size.min(100);
        } else if item_count < 50 {
            size = size.min(item_count.max(1));
        }

        size.clamp(self.config.min_batch_size, self.config.max_batch_size)
    }

    /// `1 - coefficient_of_variation` over positive throughputs, clamped to
    /// `[0.1, 0.95]`.
    fn confidence_from_spread(throughputs: &[f64]) -> f64 {
        if throughputs.len() < 2 {
            return 0.1;
        }
        let mean = throughputs.iter().sum::<f64>() / throughputs.len() as f64;
        if mean <= 0.0 {
            return 0.1;
        }
        let variance = throughputs
            .iter()
            .map(|t| (t - mean).powi(2))
            .sum::<f64>()
            / (throughputs.len() - 1) as f64;
        let stdev = variance.sqrt();
        (1.0 - stdev / mean).clamp(0.1, 0.95)
    }

    fn collect_risk_factors(
        &self,
        item_count: usize,
        predicted_memory: f64,
        predicted_cpu: f64,
        avg_success: f64,
        characteristics: &BatchCharacteristics,
    ) -> Vec<String> {
        let mut risks = Vec::new();
        if predicted_memory > self.config.memory_ceiling {
            risks.push("High memory usage predicted".to_string());
        }
        if predicted_cpu > self.config.cpu_ceiling {
            risks.push("High CPU usage predicted".to_string());
        }
        if avg_success < 0.9 {
            risks.push("Low historical success rate".to_string());
        }
        if item_count > 1000 {
            risks.push("Large batch size".to_string());
        }
        if characteristics.has_attachments {
            risks.push("Attachment-heavy items".to_string());
        }
        if characteristics.avg_item_bytes > 1024 * 1024 {
            risks.push("Large average item size".to_string());
        }
        risks
    }
}

/// Duration estimate at the fallback throughput. Always representable.
fn fallback_duration(item_count: usize) -> Duration {
    Duration::from_secs_f64((item_count as f64 / FALLBACK_THROUGHPUT) * 60.0)
}

/// Sanity bound used by callers validating predictions.
pub fn is_well_formed(prediction: &ResourcePrediction) -> bool {
    let finite = prediction.predicted_memory.is_finite()
        && prediction.predicted_cpu.is_finite()
        && prediction.confidence.is_finite()
        && prediction.estimated_duration.as_secs_f64().is_finite();
    let bounded = (0.0..=0.9).contains(&prediction.predicted_memory)
        && (0.0..=0.95).contains(&prediction.predicted_cpu)
        && (0.1..=0.95).contains(&prediction.confidence);
    finite && bounded
}
