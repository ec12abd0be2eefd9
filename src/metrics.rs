// Export metrics module
//
// Lightweight counters for exports, compile passes and metadata sync, logged on shutdown

use crate::models::ExportSession;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Process-wide pipeline metrics
///
/// Uses atomic operations so the export pipeline, the watch loop and the synchronizer
/// can record without locks.
#[derive(Debug)]
pub struct Metrics {
    /// Exports started
    pub exports_started: AtomicUsize,

    /// Exports that passed every gate (degraded ones included)
    pub exports_succeeded: AtomicUsize,

    /// Exports stopped by a gate, a cancellation or a fatal stage
    pub exports_aborted: AtomicUsize,

    /// Successful exports with item errors
    pub exports_degraded: AtomicUsize,

    pub assemblies_exported: AtomicUsize,
    pub bundles_produced: AtomicUsize,

    /// Total export time in milliseconds
    pub total_export_time_ms: AtomicU64,

    /// Compile passes finalized while the process was watching
    pub compile_passes: AtomicU64,

    /// Writes to the About document
    pub metadata_pushes: AtomicU64,

    /// Mirrored fields written into the settings record
    pub metadata_pulls: AtomicU64,

    /// Sync ticks skipped (disabled, missing or malformed document, re-entrancy)
    pub metadata_skips: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            exports_started: AtomicUsize::new(0),
            exports_succeeded: AtomicUsize::new(0),
            exports_aborted: AtomicUsize::new(0),
            exports_degraded: AtomicUsize::new(0),
            assemblies_exported: AtomicUsize::new(0),
            bundles_produced: AtomicUsize::new(0),
            total_export_time_ms: AtomicU64::new(0),
            compile_passes: AtomicU64::new(0),
            metadata_pushes: AtomicU64::new(0),
            metadata_pulls: AtomicU64::new(0),
            metadata_skips: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record the outcome of a finished export session
    pub fn record_export(&self, session: &ExportSession) {
        self.exports_started.fetch_add(1, Ordering::Relaxed);

        if session.success {
            self.exports_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.exports_aborted.fetch_add(1, Ordering::Relaxed);
        }
        if session.degraded {
            self.exports_degraded.fetch_add(1, Ordering::Relaxed);
        }

        self.assemblies_exported
            .fetch_add(session.assemblies_exported, Ordering::Relaxed);
        self.bundles_produced
            .fetch_add(session.bundles_produced, Ordering::Relaxed);
        self.record_export_time(session.duration);
    }

    pub fn record_export_time(&self, duration: Duration) {
        self.total_export_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_compile_pass(&self) {
        self.compile_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_metadata_push(&self) {
        self.metadata_pushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_metadata_pulls(&self, fields: usize) {
        self.metadata_pulls.fetch_add(fields as u64, Ordering::Relaxed);
    }

    pub fn record_metadata_skip(&self) {
        self.metadata_skips.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average time per started export in milliseconds
    pub fn avg_export_time_ms(&self) -> f64 {
        let total = self.total_export_time_ms.load(Ordering::Relaxed);
        let count = self.exports_started.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        let uptime = self.uptime();
        tracing::info!("=== Pipeline Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", uptime.as_secs_f64());
        tracing::info!(
            "Exports: {} started, {} succeeded ({} degraded), {} aborted",
            self.exports_started.load(Ordering::Relaxed),
            self.exports_succeeded.load(Ordering::Relaxed),
            self.exports_degraded.load(Ordering::Relaxed),
            self.exports_aborted.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Output: {} assemblies, {} bundles; export time {:.2}s (avg: {:.2}ms)",
            self.assemblies_exported.load(Ordering::Relaxed),
            self.bundles_produced.load(Ordering::Relaxed),
            self.total_export_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_export_time_ms()
        );
        tracing::info!(
            "Compile passes: {}; metadata: {} pushes, {} field pulls, {} skipped ticks",
            self.compile_passes.load(Ordering::Relaxed),
            self.metadata_pushes.load(Ordering::Relaxed),
            self.metadata_pulls.load(Ordering::Relaxed),
            self.metadata_skips.load(Ordering::Relaxed)
        );
    }

    /// Log periodic metrics (for the watch loop)
    pub fn log_periodic(&self) {
        tracing::info!(
            "Metrics: {} compile passes, {} metadata pushes, {} field pulls, uptime {:.0}s",
            self.compile_passes.load(Ordering::Relaxed),
            self.metadata_pushes.load(Ordering::Relaxed),
            self.metadata_pulls.load(Ordering::Relaxed),
            self.uptime().as_secs_f64()
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
