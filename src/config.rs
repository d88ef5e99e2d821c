//! # Engine Configuration
//!
//! Explicit, validated configuration for the batch engine. All tuning knobs
//! live here with their defaults; nothing is read ad hoc from the environment
//! at use sites. Values load from an optional TOML file with
//! `BULKFLOW_`-prefixed environment overrides layered on top.
//!
//! The heuristic constants (degradation ratio, safety-valve shrink factor,
//! score weighting) are tuning values inherited from operational experience,
//! not derived from measurement. They are configurable rather than assumed
//! optimal.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{EngineError, Result};

/// Complete configuration for a batch-processing engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Batch size used until the optimizer has enough history to tune
    pub default_batch_size: usize,
    /// Lower bound the optimizer may never cross
    pub min_batch_size: usize,
    /// Upper bound the optimizer may never cross
    pub max_batch_size: usize,
    /// Re-score batch sizes every N completed batches
    pub optimization_interval: usize,
    /// Write a checkpoint every N processed items
    pub checkpoint_interval: usize,
    /// Hard cap on items accepted into a single session (0 disables the cap)
    pub max_items_per_session: usize,
    /// Bounded concurrency for sink calls within one batch (1 = sequential)
    pub sink_concurrency: usize,
    /// Per-call sink timeout in milliseconds (0 disables the timeout)
    pub sink_timeout_ms: u64,
    /// Resource sampler tick interval in milliseconds
    pub sampler_interval_ms: u64,
    /// Upper bound on a single OS resource probe in milliseconds
    pub sampler_probe_timeout_ms: u64,
    /// Bounded capacity of the performance history ring
    pub history_capacity: usize,
    /// Success-rate target used by the recommendation engine
    pub target_success_rate: f64,
    /// Throughput target in items per minute
    pub target_throughput: f64,
    /// Memory fraction above which recommendations fire
    pub memory_ceiling: f64,
    /// CPU fraction above which recommendations fire
    pub cpu_ceiling: f64,
    /// Recent/older throughput ratio below which degradation is declared
    pub degradation_ratio: f64,
    /// Memory fraction that trips the immediate batch-size safety valve
    pub valve_memory_threshold: f64,
    /// Multiplier applied to the batch size when the safety valve trips
    pub valve_shrink_factor: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_batch_size: 50,
            min_batch_size: 5,
            max_batch_size: 500,
            optimization_interval: 10,
            checkpoint_interval: 100,
            max_items_per_session: 0,
            sink_concurrency: 1,
            sink_timeout_ms: 0,
            sampler_interval_ms: 5000,
            sampler_probe_timeout_ms: 1000,
            history_capacity: 1000,
            target_success_rate: 0.95,
            target_throughput: 1000.0,
            memory_ceiling: 0.8,
            cpu_ceiling: 0.9,
            degradation_ratio: 0.8,
            valve_memory_threshold: 0.9,
            valve_shrink_factor: 0.7,
        }
    }
}

impl EngineConfig {
    /// Load configuration from an optional TOML file plus environment
    /// overrides (`BULKFLOW_MAX_BATCH_SIZE=200` etc.), then validate.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(config::Environment::with_prefix("BULKFLOW"));

        let loaded: EngineConfig = builder
            .build()
            .map_err(|e| EngineError::Configuration(format!("Failed to load config: {e}")))?
            .try_deserialize()
            .map_err(|e| EngineError::Configuration(format!("Failed to parse config: {e}")))?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Validate invariants between knobs. Called by [`EngineConfig::load`];
    /// callers constructing configs in code should call it themselves.
    pub fn validate(&self) -> Result<()> {
        if self.min_batch_size == 0 {
            return Err(EngineError::InvalidParameter(
                "min_batch_size must be at least 1".to_string(),
            ));
        }
        if self.min_batch_size > self.max_batch_size {
            return Err(EngineError::InvalidParameter(format!(
                "min_batch_size ({}) exceeds max_batch_size ({})",
                self.min_batch_size, self.max_batch_size
            )));
        }
        if self.default_batch_size < self.min_batch_size
            || self.default_batch_size > self.max_batch_size
        {
            return Err(EngineError::InvalidParameter(format!(
                "default_batch_size ({}) outside [{}, {}]",
                self.default_batch_size, self.min_batch_size, self.max_batch_size
            )));
        }
        if self.optimization_interval == 0 {
            return Err(EngineError::InvalidParameter(
                "optimization_interval must be at least 1".to_string(),
            ));
        }
        if self.history_capacity == 0 {
            return Err(EngineError::InvalidParameter(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        if self.sink_concurrency == 0 {
            return Err(EngineError::InvalidParameter(
                "sink_concurrency must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("target_success_rate", self.target_success_rate),
            ("memory_ceiling", self.memory_ceiling),
            ("cpu_ceiling", self.cpu_ceiling),
            ("degradation_ratio", self.degradation_ratio),
            ("valve_memory_threshold", self.valve_memory_threshold),
            ("valve_shrink_factor", self.valve_shrink_factor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::InvalidParameter(format!(
                    "{name} ({value}) must be between 0.0 and 1.0"
                )));
            }
        }
        if self.target_throughput <= 0.0 {
            return Err(EngineError::InvalidParameter(
                "target_throughput must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sampler_interval(&self) -> Duration {
        Duration::from_millis(self.sampler_interval_ms)
    }

    pub fn sampler_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.sampler_probe_timeout_ms)
    }

    /// Per-call sink timeout, if one is configured.
    pub fn sink_timeout(&self) -> Option<Duration> {
        (self.sink_timeout_ms > 0).then(|| Duration::from_millis(self.sink_timeout_ms))
    }
}
