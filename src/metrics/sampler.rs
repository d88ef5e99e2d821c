//! # Resource Sampler
//!
//! Periodically probes process/system resource usage (memory and CPU
//! fractions) on a supervised background task and exposes the most recent
//! fully-formed snapshot. Callers of [`ResourceSampler::latest`] never block
//! on an in-flight OS probe.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Point-in-time resource usage. `memory_usage` and `cpu_usage` are fractions
/// in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub memory_usage: f64,
    pub cpu_usage: f64,
    pub sampled_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct SamplerState {
    running: AtomicBool,
    shutdown_notify: Notify,
    snapshot: RwLock<ResourceSnapshot>,
    // System holds OS handles and CPU usage deltas between refreshes; it is
    // shared with the blocking probe so a timed-out probe does not lose it.
    system: Mutex<System>,
}

/// Background resource sampler bound to the engine's lifetime.
///
/// `start` is idempotent, `stop` joins the sampling task, and the sampler is
/// restartable after a stop.
#[derive(Debug, Clone)]
pub struct ResourceSampler {
    state: Arc<SamplerState>,
    interval: Duration,
    probe_timeout: Duration,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ResourceSampler {
    pub fn new(interval: Duration, probe_timeout: Duration) -> Self {
        Self {
            state: Arc::new(SamplerState {
                running: AtomicBool::new(false),
                shutdown_notify: Notify::new(),
                snapshot: RwLock::new(ResourceSnapshot::default()),
                system: Mutex::new(System::new()),
            }),
            interval,
            probe_timeout,
            handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Begin sampling on the configured interval. Calling while already
    /// running is a no-op.
    pub fn start(&self) {
        if self
            .state
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("SAMPLER: already running, start ignored");
            return;
        }

        info!(
            interval_ms = self.interval.as_millis() as u64,
            "📡 SAMPLER: starting resource sampling"
        );

        let state = Arc::clone(&self.state);
        let interval = self.interval;
        let probe_timeout = self.probe_timeout;

        let handle = tokio::spawn(async move {
            // Probe once immediately so the first batch sees real numbers.
            Self::probe_once(&state, probe_timeout).await;

            while state.running.load(Ordering::Acquire) {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        Self::probe_once(&state, probe_timeout).await;
                    }
                    _ = state.shutdown_notify.notified() => break,
                }
            }
            debug!("SAMPLER: sampling loop exited");
        });

        *self.handle.lock() = Some(handle);
    }

    /// Halt sampling and join the background task. Safe to call when not
    /// running.
    pub async fn stop(&self) {
        if !self.state.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.state.shutdown_notify.notify_waiters();

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .is_err()
            {
                warn!("SAMPLER: sampling task did not stop within 5s");
            }
        }
        info!("📡 SAMPLER: stopped");
    }

    /// Most recent snapshot, or a zero-valued one if no probe has completed
    /// yet. Never blocks on an OS probe.
    pub fn latest(&self) -> ResourceSnapshot {
        *self.state.snapshot.read()
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    /// Run one probe under `spawn_blocking` with a bounded wait. A failed or
    /// slow probe is logged and skipped; the prior snapshot stays in place. A
    /// timed-out probe never stores its result, even once it finishes.
    async fn probe_once(state: &Arc<SamplerState>, probe_timeout: Duration) {
        let probe_state = Arc::clone(state);
        let probe = tokio::task::spawn_blocking(move || {
            let mut sys = probe_state.system.lock();
            sys.refresh_memory();
            sys.refresh_cpu_usage();

            let total = sys.total_memory();
            let memory_usage = if total > 0 {
                sys.used_memory() as f64 / total as f64
            } else {
                0.0
            };
            let cpu_usage = (f64::from(sys.global_cpu_info().cpu_usage()) / 100.0).clamp(0.0, 1.0);

            ResourceSnapshot {
                memory_usage,
                cpu_usage,
                sampled_at: Some(Utc::now()),
            }
        });

        match tokio::time::timeout(probe_timeout, probe).await {
            Ok(Ok(snapshot)) => {
                *state.snapshot.write() = snapshot;
                debug!(
                    memory_usage = snapshot.memory_usage,
                    cpu_usage = snapshot.cpu_usage,
                    "SAMPLER: probe completed"
                );
            }
            Ok(Err(e)) => {
                warn!(error = %e, "SAMPLER: probe task failed, keeping prior snapshot");
            }
            Err(_) => {
                warn!(
                    timeout_ms = probe_timeout.as_millis() as u64,
                    "SAMPLER: probe timed out, keeping prior snapshot"
                );
            }
        }
    }

    /// Overwrite the current snapshot. Test hook for deterministic optimizer
    /// and executor behavior.
    pub fn inject_snapshot(&self, snapshot: ResourceSnapshot) {
        *self.state.snapshot.write() = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_sampler() -> ResourceSampler {
        ResourceSampler::new(Duration::from_millis(50), Duration::from_secs(1))
    }

    #[test]
    fn test_latest_before_any_probe_is_zero_valued() {
        let sampler = test_sampler();
        let snapshot = sampler.latest();
        assert_eq!(snapshot.memory_usage, 0.0);
        assert_eq!(snapshot.cpu_usage, 0.0);
        assert!(snapshot.sampled_at.is_none());
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let sampler = test_sampler();
        sampler.start();
        sampler.start();
        assert!(sampler.is_running());
        sampler.stop().await;
        assert!(!sampler.is_running());
    }

    #[tokio::test]
    async fn test_stop_without_start_is_safe() {
        let sampler = test_sampler();
        sampler.stop().await;
        assert!(!sampler.is_running());
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let sampler = test_sampler();
        sampler.start();
        sampler.stop().await;
        sampler.start();
        assert!(sampler.is_running());
        sampler.stop().await;
    }

    #[tokio::test]
    async fn test_probe_populates_snapshot() {
        let sampler = test_sampler();
        sampler.start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let snapshot = sampler.latest();
        assert!(snapshot.sampled_at.is_some());
        assert!((0.0..=1.0).contains(&snapshot.memory_usage));
        assert!((0.0..=1.0).contains(&snapshot.cpu_usage));
        sampler.stop().await;
    }

    #[tokio::test]
    async fn test_timed_out_probe_keeps_prior_snapshot() {
        // A 1ns budget forces every probe to miss; the late result must never
        // replace the snapshot in place.
        let sampler = ResourceSampler::new(Duration::from_millis(20), Duration::from_nanos(1));
        sampler.inject_snapshot(ResourceSnapshot {
            memory_usage: 0.42,
            cpu_usage: 0.17,
            sampled_at: Some(Utc::now()),
        });

        sampler.start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        sampler.stop().await;

        let snapshot = sampler.latest();
        assert_eq!(snapshot.memory_usage, 0.42);
        assert_eq!(snapshot.cpu_usage, 0.17);
    }

    #[test]
    fn test_injected_snapshot_is_returned() {
        let sampler = test_sampler();
        sampler.inject_snapshot(ResourceSnapshot {
            memory_usage: 0.42,
            cpu_usage: 0.1,
            sampled_at: Some(Utc::now()),
        });
        assert_eq!(sampler.latest().memory_usage, 0.42);
    }
}
