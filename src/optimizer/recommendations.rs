//! # Optimization Recommendations
//!
//! Human-readable tuning suggestions derived by comparing recent averages
//! against the configured targets. Read-only output; never fed back into the
//! control loop.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use super::{BatchSizeOptimizer, MIN_SAMPLES_FOR_TUNING};

/// Recommendation priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    DataCollection,
    BatchSizing,
    ErrorReduction,
    MemoryOptimization,
    CpuOptimization,
    ThroughputOptimization,
}

/// One actionable tuning suggestion with confidence scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: RecommendationCategory,
    pub text: String,
    /// In `[0, 1]`
    pub confidence: f64,
    /// Expected relative improvement if applied
    pub expected_improvement: f64,
    pub priority: Priority,
}

/// Window of recent samples the recommendation engine averages over.
const RECOMMENDATION_WINDOW: usize = 10;

impl BatchSizeOptimizer {
    /// One recommendation per violated target. With fewer than
    /// [`MIN_SAMPLES_FOR_TUNING`] samples, a single collect-more-data entry.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        if self.history.len() < MIN_SAMPLES_FOR_TUNING {
            return vec![Recommendation {
                category: RecommendationCategory::DataCollection,
                text: "Continue processing to collect performance data for optimization"
                    .to_string(),
                confidence: 1.0,
                expected_improvement: 0.0,
                priority: Priority::Low,
            }];
        }

        let mut recommendations = Vec::new();
        let recent = self.history.recent(RECOMMENDATION_WINDOW);
        let aggregate = self.history.average(RECOMMENDATION_WINDOW);

        // Batch sizing: only meaningful once more than one size was observed.
        let mut sizes: Vec<usize> = recent.iter().map(|s| s.batch_size).collect();
        sizes.sort_unstable();
        sizes.dedup();
        if sizes.len() > 1 {
            let current = self.current_batch_size();
            if let Some(best) = Self::best_scoring_size(&recent) {
                let best = best.clamp(self.config.min_batch_size, self.config.max_batch_size);
                if best != current {
                    let improvement = best.abs_diff(current) as f64 / current as f64 * 0.1;
                    recommendations.push(Recommendation {
                        category: RecommendationCategory::BatchSizing,
                        text: format!("Adjust batch size from {current} to {best}"),
                        confidence: 0.8,
                        expected_improvement: improvement,
                        priority: Priority::Medium,
                    });
                }
            }
        }

        if aggregate.success_rate < self.config.target_success_rate {
            recommendations.push(Recommendation {
                category: RecommendationCategory::ErrorReduction,
                text: format!(
                    "Investigate sink failures (current success rate: {:.1}%)",
                    aggregate.success_rate * 100.0
                ),
                confidence: 0.9,
                expected_improvement: self.config.target_success_rate - aggregate.success_rate,
                priority: Priority::High,
            });
        }

        if aggregate.memory_usage > self.config.memory_ceiling {
            recommendations.push(Recommendation {
                category: RecommendationCategory::MemoryOptimization,
                text: format!(
                    "Reduce batch size or free memory (usage: {:.1}%)",
                    aggregate.memory_usage * 100.0
                ),
                confidence: 0.9,
                expected_improvement: 0.2,
                priority: Priority::High,
            });
        }

        if aggregate.cpu_usage > self.config.cpu_ceiling {
            recommendations.push(Recommendation {
                category: RecommendationCategory::CpuOptimization,
                text: format!(
                    "Reduce batch size or sink concurrency (CPU: {:.1}%)",
                    aggregate.cpu_usage * 100.0
                ),
                confidence: 0.8,
                expected_improvement: 0.15,
                priority: Priority::High,
            });
        }

        if aggregate.throughput < self.config.target_throughput {
            let improvement_needed = (self.config.target_throughput - aggregate.throughput)
                / self.config.target_throughput;
            recommendations.push(Recommendation {
                category: RecommendationCategory::ThroughputOptimization,
                text: format!(
                    "Optimize processing pipeline (current: {:.0} items/min)",
                    aggregate.throughput
                ),
                confidence: 0.7,
                expected_improvement: improvement_needed,
                priority: Priority::Medium,
            });
        }

        info!(
            count = recommendations.len(),
            "🎛️ OPTIMIZER: generated recommendations"
        );
        recommendations
    }
}
