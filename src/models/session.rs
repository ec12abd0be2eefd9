use crate::models::settings::{ExportSettings, ValidationError};
use camino::Utf8PathBuf;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Pipeline stages of one export, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportStage {
    Validate,
    Preflight,
    CompileGate,
    PrepareWorkspace,
    Assemblies,
    AuxiliaryData,
    Bundles,
    Publish,
}

impl ExportStage {
    pub const ALL: [ExportStage; 8] = [
        Self::Validate,
        Self::Preflight,
        Self::CompileGate,
        Self::PrepareWorkspace,
        Self::Assemblies,
        Self::AuxiliaryData,
        Self::Bundles,
        Self::Publish,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Preflight => "preflight",
            Self::CompileGate => "compile-gate",
            Self::PrepareWorkspace => "prepare-workspace",
            Self::Assemblies => "assemblies",
            Self::AuxiliaryData => "auxiliary-data",
            Self::Bundles => "bundles",
            Self::Publish => "publish",
        }
    }
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a single stage ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    /// Finished, but some items failed and were skipped
    Degraded { errors: usize },
    Skipped { reason: String },
    Aborted { reason: String },
}

/// Per-item failure recorded while staging; never aborts the session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemIoError {
    #[error("{unit}: compiled binary not found at {path}")]
    MissingBinary { unit: String, path: Utf8PathBuf },

    #[error("{unit}: debug symbols not found at {path}")]
    MissingDebugSymbols { unit: String, path: Utf8PathBuf },

    #[error("{unit}: could not resolve assembly unit: {reason}")]
    UnresolvableUnit { unit: String, reason: String },

    #[error("artifact not found: {path}")]
    MissingArtifact { path: Utf8PathBuf },

    #[error("failed to copy {path}: {reason}")]
    CopyFailed { path: Utf8PathBuf, reason: String },

    #[error("failed to tag asset {asset}: {reason}")]
    TagFailed { asset: String, reason: String },
}

/// Reason an export stopped before publishing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExportAbort {
    #[error("Invalid export settings: {0}")]
    Validation(#[from] ValidationError),

    #[error("Export cancelled by user")]
    Cancelled,

    #[error("Unsaved changes remain after saving: {}", items.join(", "))]
    UnsavedChanges { items: Vec<String> },

    #[error("Last compile pass had errors in: {}", units.join(", "))]
    CompileErrors { units: Vec<String> },

    #[error("Failed to save pending changes: {0}")]
    Preflight(String),

    #[error("Failed to prepare workspace: {0}")]
    Workspace(String),

    #[error("Bundle packaging failed: {0}")]
    Packaging(String),

    #[error("Publish failed: {0}")]
    Publish(String),
}

impl ExportAbort {
    /// User-directed outcomes are not errors
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Record of one export invocation
#[derive(Debug, Clone)]
pub struct ExportSession {
    pub settings_snapshot: ExportSettings,
    pub workspace_path: Utf8PathBuf,
    pub stage_results: Vec<(ExportStage, StageOutcome)>,
    pub assemblies_exported: usize,
    pub bundles_produced: usize,
    pub item_errors: Vec<ItemIoError>,
    pub abort: Option<ExportAbort>,
    pub published_path: Option<Utf8PathBuf>,
    pub duration: Duration,

    /// True when every gate passed; stays true for degraded sessions
    pub success: bool,

    /// True when the session succeeded with one or more item errors
    pub degraded: bool,
}

impl ExportSession {
    pub fn new(settings: ExportSettings, workspace_path: Utf8PathBuf) -> Self {
        Self {
            settings_snapshot: settings,
            workspace_path,
            stage_results: Vec::new(),
            assemblies_exported: 0,
            bundles_produced: 0,
            item_errors: Vec::new(),
            abort: None,
            published_path: None,
            duration: Duration::ZERO,
            success: false,
            degraded: false,
        }
    }

    pub fn record(&mut self, stage: ExportStage, outcome: StageOutcome) {
        self.stage_results.push((stage, outcome));
    }

    pub fn outcome_of(&self, stage: ExportStage) -> Option<&StageOutcome> {
        self.stage_results
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, outcome)| outcome)
    }

    pub fn ran(&self, stage: ExportStage) -> bool {
        self.outcome_of(stage).is_some()
    }

    /// Close the session after all stages ran
    pub fn complete(&mut self) {
        self.success = true;
        self.degraded = !self.item_errors.is_empty();
    }

    /// Close the session after a gating or fatal failure
    pub fn fail(&mut self, abort: ExportAbort) {
        self.success = false;
        self.degraded = false;
        self.abort = Some(abort);
    }

    /// One-line summary for logs and the CLI
    pub fn summary(&self) -> String {
        if let Some(abort) = &self.abort {
            return format!("Export of {} failed: {}", self.settings_snapshot.name, abort);
        }

        let mut summary = format!(
            "Exported {}: {} assemblies, {} bundles in {:.2}s",
            self.settings_snapshot.name,
            self.assemblies_exported,
            self.bundles_produced,
            self.duration.as_secs_f64()
        );
        if self.degraded {
            summary.push_str(&format!(" ({} item errors)", self.item_errors.len()));
        }
        summary
    }
}
