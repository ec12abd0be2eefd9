//! Two-way sync of the mirrored metadata fields.
//!
//! The settings record held by the [`StateManager`] and the About document on disk both
//! carry Name, Author and Version. Each tick of [`MetadataSynchronizer`]:
//!
//! 1. **Pull**: fields whose document value changed since the last tick are copied into the
//!    settings record. Values are trimmed and empty values are never pulled.
//! 2. **Push**: when the settings record changed since the last tick, the document is
//!    rewritten with the three values. All other content of the document is preserved.
//!
//! Every write is equality-gated against the current value on the target side, and both
//! snapshots are updated right after a successful write, so a push is never echoed back as
//! a pull (and the other way around). On the first tick there is no document snapshot yet;
//! the settings record wins.
//!
//! A missing or malformed document skips the tick and leaves both snapshots untouched so
//! the next tick retries.

use crate::metrics::Metrics;
use crate::models::{MirroredField, MirroredFields};
use crate::services::about::{AboutDocument, AboutError};
use crate::state::StateManager;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Document(#[from] AboutError),
}

/// Why a tick did nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    MissingDocument,
    Malformed(String),
    WriteFailed(String),
    /// Another sync was still running
    WriteInProgress,
}

/// What one sync pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Writes to the About document (0 or 1)
    pub external_writes: usize,
    /// Fields written into the settings record
    pub internal_writes: Vec<MirroredField>,
    pub skipped: Option<SkipReason>,
}

impl SyncReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    /// True when neither side was written
    pub fn is_noop(&self) -> bool {
        self.external_writes == 0 && self.internal_writes.is_empty()
    }
}

/// Last values each side was known to hold after a sync
#[derive(Debug, Default)]
struct Snapshots {
    internal: Option<MirroredFields>,
    external: Option<MirroredFields>,
}

/// Resets the in-progress flag when a sync pass ends
struct WriteGuard<'a>(&'a AtomicBool);

impl<'a> WriteGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct MetadataSynchronizer {
    about_path: Utf8PathBuf,
    state: StateManager,
    enabled: AtomicBool,
    write_in_progress: AtomicBool,
    snapshots: Mutex<Snapshots>,
    metrics: Option<Arc<Metrics>>,
}

impl MetadataSynchronizer {
    pub fn new(about_path: impl Into<Utf8PathBuf>, state: StateManager) -> Self {
        Self {
            about_path: about_path.into(),
            state,
            enabled: AtomicBool::new(true),
            write_in_progress: AtomicBool::new(false),
            snapshots: Mutex::new(Snapshots::default()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn about_path(&self) -> &Utf8Path {
        &self.about_path
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        tracing::info!(
            "Metadata watcher {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// One periodic sync pass; problems are logged and reported as skips
    pub fn tick(&self) -> SyncReport {
        if !self.is_enabled() {
            return self.observe(SyncReport::skipped(SkipReason::Disabled));
        }

        let report = match self.run(false) {
            Ok(report) => report,
            Err(SyncError::Document(AboutError::Write { path, source })) => {
                tracing::warn!("Failed to update {}: {}", path, source);
                SyncReport::skipped(SkipReason::WriteFailed(source.to_string()))
            }
            Err(SyncError::Document(e)) => {
                tracing::warn!("Skipping metadata sync: {}", e);
                SyncReport::skipped(SkipReason::Malformed(e.to_string()))
            }
        };
        self.observe(report)
    }

    /// Sync immediately, whether or not the watcher is enabled
    ///
    /// With `force` the document is rewritten from the settings record even when the record
    /// did not change since the last sync; unchanged values are still never written.
    pub fn sync_now(&self, force: bool) -> Result<SyncReport, SyncError> {
        let report = self.run(force)?;
        Ok(self.observe(report))
    }

    /// Pull every non-empty document value that differs from the settings record
    ///
    /// Used at startup and on file-change notifications. Ignores the snapshots and resets
    /// both of them afterwards.
    pub fn apply_external(&self) -> Result<SyncReport, SyncError> {
        let Some(_guard) = WriteGuard::acquire(&self.write_in_progress) else {
            return Ok(self.observe(SyncReport::skipped(SkipReason::WriteInProgress)));
        };

        let Some(document) = AboutDocument::load(&self.about_path)? else {
            tracing::debug!("No About document at {}", self.about_path);
            return Ok(self.observe(SyncReport::skipped(SkipReason::MissingDocument)));
        };

        let external = document.mirrored_fields();
        let internal = self.state.settings().mirrored_fields();
        let pulls = pulled_values(&external, &internal, &MirroredField::ALL);

        let mut report = SyncReport::default();
        if !pulls.is_empty() {
            self.state.set_mirrored(&pulls);
            report.internal_writes = pulls.iter().map(|(field, _)| *field).collect();
            tracing::info!(
                "Applied {} from {}",
                field_list(&report.internal_writes),
                self.about_path
            );
        }

        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        snapshots.external = Some(external);
        snapshots.internal = Some(self.state.settings().mirrored_fields());

        Ok(self.observe(report))
    }

    fn run(&self, force: bool) -> Result<SyncReport, SyncError> {
        let Some(_guard) = WriteGuard::acquire(&self.write_in_progress) else {
            tracing::debug!("Metadata sync already in progress");
            return Ok(SyncReport::skipped(SkipReason::WriteInProgress));
        };

        let Some(document) = AboutDocument::load(&self.about_path)? else {
            tracing::debug!("No About document at {}", self.about_path);
            return Ok(SyncReport::skipped(SkipReason::MissingDocument));
        };

        let mut snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        let mut report = SyncReport::default();
        let external = document.mirrored_fields();

        // External -> internal
        let changed = snapshots
            .external
            .as_ref()
            .map(|previous| previous.differing(&external));
        if let Some(changed) = changed {
            let internal = self.state.settings().mirrored_fields();
            let pulls = pulled_values(&external, &internal, &changed);

            if !pulls.is_empty() {
                self.state.set_mirrored(&pulls);
                let snapshot = snapshots.internal.get_or_insert_with(|| internal.clone());
                for (field, value) in &pulls {
                    snapshot.set(*field, value.clone());
                }
                report.internal_writes = pulls.iter().map(|(field, _)| *field).collect();
                tracing::info!(
                    "Pulled {} from {}",
                    field_list(&report.internal_writes),
                    self.about_path
                );
            }
        }
        snapshots.external = Some(external.clone());

        // Internal -> external
        let internal = self.state.settings().mirrored_fields();
        if force || snapshots.internal.as_ref() != Some(&internal) {
            if internal != external {
                let rendered = document.render_with(&internal)?;
                AboutDocument::write(&self.about_path, &rendered)?;
                report.external_writes = 1;
                snapshots.external = Some(internal.clone());
                tracing::info!(
                    "Updated {} in {}",
                    field_list(&internal.differing(&external)),
                    self.about_path
                );
            }
            snapshots.internal = Some(internal);
        }

        Ok(report)
    }

    fn observe(&self, report: SyncReport) -> SyncReport {
        if let Some(metrics) = &self.metrics {
            if report.skipped.is_some() {
                metrics.record_metadata_skip();
            }
            if report.external_writes > 0 {
                metrics.record_metadata_push();
            }
            metrics.record_metadata_pulls(report.internal_writes.len());
        }
        report
    }

    /// Run [`tick`](Self::tick) every `interval` until the handle is stopped
    pub fn start(self: Arc<Self>, interval: Duration) -> SyncHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::debug!("Metadata sync loop started ({:?} interval)", interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick();
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!("Metadata sync loop stopped");
        });

        SyncHandle { stop_tx, task }
    }
}

/// Trimmed, non-empty document values among `fields` that differ from the settings record
fn pulled_values(
    external: &MirroredFields,
    internal: &MirroredFields,
    fields: &[MirroredField],
) -> Vec<(MirroredField, String)> {
    fields
        .iter()
        .filter_map(|field| {
            let value = external.get(*field).trim();
            (!value.is_empty() && value != internal.get(*field))
                .then(|| (*field, value.to_string()))
        })
        .collect()
}

fn field_list(fields: &[MirroredField]) -> String {
    fields
        .iter()
        .map(|field| field.element_name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Handle to a running sync loop
pub struct SyncHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Stop the loop and wait for it to finish
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("Metadata sync loop ended abnormally: {}", e);
        }
    }
}
