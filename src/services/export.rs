//! The staged export pipeline.
//!
//! [`ExportOrchestrator::export`] runs the stages of [`ExportStage::ALL`] strictly in order.
//! Each stage returns `Result<StageOutcome, ExportAbort>`: an `Err` stops the pipeline and
//! nothing after it runs. Item-level problems (a missing binary, a failed copy) are recorded
//! on the session as [`ItemIoError`]s and the stage carries on; the session then completes
//! as degraded.
//!
//! Nothing is written before the compile gate passes. Files already staged are not rolled
//! back when a later stage fails.

use crate::host::{AssetEntry, AssetKind, AssetPackagingBackend};
use crate::models::{
    ContentTypes, ExportAbort, ExportSession, ExportSettings, ExportStage, ItemIoError,
    PlatformTarget, ProjectLayout, StageOutcome, ValidationError,
};
use crate::services::compile_monitor::CompilePassMonitor;
use crate::services::fs_utils::{self, copy_file, copy_tree, is_sidecar, recreate_dir};
use crate::services::preflight::{PreflightCoordinator, PreflightOutcome};
use crate::state::StateManager;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use serde::Deserialize;
use std::fs;
use std::sync::Arc;
use std::time::Instant;

/// Extension of assembly definition files
pub const ASSEMBLY_DEFINITION_EXTENSION: &str = "asmdef";

/// Directory a publish is staged in, created next to the destination
fn staging_name(mod_name: &str) -> String {
    format!(".{}.publishing", mod_name)
}

#[derive(Debug, Deserialize)]
struct AssemblyDefinition {
    name: String,
}

/// Resolve an assembly identifier to its unit name
///
/// Identifiers ending in `.asmdef` are project-relative definition files whose `name`
/// field is the unit name; anything else already is one.
pub fn resolve_assembly_unit(layout: &ProjectLayout, identifier: &str) -> Result<String> {
    let as_path = Utf8Path::new(identifier);
    let is_definition = as_path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ASSEMBLY_DEFINITION_EXTENSION));

    if !is_definition {
        return Ok(identifier.to_string());
    }

    let path = layout.resolve(as_path);
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read assembly definition: {}", path))?;
    // Definition files are often saved with a byte-order mark
    let contents = contents.trim_start_matches('\u{feff}');
    let definition: AssemblyDefinition = serde_json::from_str(contents)
        .with_context(|| format!("Failed to parse assembly definition: {}", path))?;

    if definition.name.trim().is_empty() {
        anyhow::bail!("Assembly definition has an empty name: {}", path);
    }
    Ok(definition.name)
}

/// Drop editor-only and package assets, keeping the first occurrence of each path
pub fn filter_eligible_assets(assets: Vec<AssetEntry>) -> Vec<AssetEntry> {
    let unique: IndexSet<AssetEntry> = assets
        .into_iter()
        .filter(|asset| !asset.path.contains("Editor") && !asset.path.starts_with("Packages"))
        .collect();
    unique.into_iter().collect()
}

/// Runs exports against one project
pub struct ExportOrchestrator {
    layout: ProjectLayout,
    preflight: Arc<PreflightCoordinator>,
    monitor: Arc<CompilePassMonitor>,
    packager: Arc<dyn AssetPackagingBackend>,
    platform: PlatformTarget,
    state: Option<StateManager>,
}

impl ExportOrchestrator {
    pub fn new(
        layout: ProjectLayout,
        preflight: Arc<PreflightCoordinator>,
        monitor: Arc<CompilePassMonitor>,
        packager: Arc<dyn AssetPackagingBackend>,
    ) -> Self {
        Self {
            layout,
            preflight,
            monitor,
            packager,
            platform: PlatformTarget::default(),
            state: None,
        }
    }

    pub fn with_platform(mut self, platform: PlatformTarget) -> Self {
        self.platform = platform;
        self
    }

    /// Report export progress through a [`StateManager`]
    pub fn with_state(mut self, state: StateManager) -> Self {
        self.state = Some(state);
        self
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Export a mod with the given settings
    ///
    /// Always returns a session; `success` is false when a gate or fatal stage aborted,
    /// and `degraded` marks a successful session with item errors.
    pub async fn export(&self, settings: &ExportSettings) -> ExportSession {
        let start = Instant::now();
        let workspace = self.layout.workspace_for(&settings.name);
        let mut session = ExportSession::new(settings.clone(), workspace);

        if let Some(state) = &self.state {
            state.begin_export();
        }
        tracing::info!("Starting export of {}", settings.name);

        let result = self.run_stages(&mut session).await;
        session.duration = start.elapsed();

        match result {
            Ok(()) => {
                session.complete();
                if session.degraded {
                    tracing::warn!("{}", session.summary());
                } else {
                    tracing::info!("{}", session.summary());
                }
            }
            Err(abort) => {
                if abort.is_cancellation() {
                    tracing::info!("Export of {} cancelled", settings.name);
                } else {
                    tracing::error!("Export of {} failed: {}", settings.name, abort);
                }
                session.fail(abort);
            }
        }

        if let Some(state) = &self.state {
            state.finish_export(session.success, session.degraded);
        }

        session
    }

    async fn run_stages(&self, session: &mut ExportSession) -> Result<(), ExportAbort> {
        for stage in ExportStage::ALL {
            if let Some(state) = &self.state {
                state.enter_stage(stage);
            }
            tracing::debug!("Entering stage {}", stage);

            let result = match stage {
                ExportStage::Validate => self.validate(session),
                ExportStage::Preflight => self.preflight(),
                ExportStage::CompileGate => self.compile_gate(),
                ExportStage::PrepareWorkspace => self.prepare_workspace(session),
                ExportStage::Assemblies => self.export_assemblies(session),
                ExportStage::AuxiliaryData => self.copy_auxiliary_data(session),
                ExportStage::Bundles => self.package_bundles(session).await,
                ExportStage::Publish => self.publish(session),
            };

            match result {
                Ok(outcome) => {
                    tracing::debug!("Stage {} finished: {:?}", stage, outcome);
                    session.record(stage, outcome);
                }
                Err(abort) => {
                    session.record(
                        stage,
                        StageOutcome::Aborted {
                            reason: abort.to_string(),
                        },
                    );
                    return Err(abort);
                }
            }
        }

        Ok(())
    }

    fn validate(&self, session: &ExportSession) -> Result<StageOutcome, ExportAbort> {
        session.settings_snapshot.validate()?;
        Ok(StageOutcome::Completed)
    }

    fn preflight(&self) -> Result<StageOutcome, ExportAbort> {
        match self.preflight.commit_pending_changes() {
            Ok(PreflightOutcome::Committed { residual }) => {
                if !residual.is_empty() {
                    tracing::warn!(
                        "Continuing export with {} unsaved item(s)",
                        residual.len()
                    );
                }
                Ok(StageOutcome::Completed)
            }
            Ok(PreflightOutcome::Cancelled { at }) => {
                tracing::info!("User cancelled saving at {:?}", at);
                Err(ExportAbort::Cancelled)
            }
            Ok(PreflightOutcome::ResidualDirty { items }) => {
                Err(ExportAbort::UnsavedChanges { items })
            }
            Err(e) => Err(ExportAbort::Preflight(format!("{:#}", e))),
        }
    }

    fn compile_gate(&self) -> Result<StageOutcome, ExportAbort> {
        let last = self.monitor.last_pass_result();

        if last.had_errors {
            return Err(ExportAbort::CompileErrors {
                units: last.errored_units,
            });
        }

        if last.pass_id == 0 {
            tracing::debug!("No compile pass observed yet; assuming a clean build");
        }
        Ok(StageOutcome::Completed)
    }

    fn prepare_workspace(&self, session: &ExportSession) -> Result<StageOutcome, ExportAbort> {
        recreate_dir(&session.workspace_path)
            .map_err(|e| ExportAbort::Workspace(format!("{:#}", e)))?;

        tracing::info!("Prepared workspace {}", session.workspace_path);
        Ok(StageOutcome::Completed)
    }

    fn export_assemblies(&self, session: &mut ExportSession) -> Result<StageOutcome, ExportAbort> {
        let settings = &session.settings_snapshot;
        if !settings.content_types.contains(ContentTypes::ASSEMBLIES) {
            return Ok(StageOutcome::Skipped {
                reason: "assemblies not selected".to_string(),
            });
        }

        let identifiers = settings.assemblies.clone();
        let include_symbols = settings.include_debug_symbols;
        let errors_before = session.item_errors.len();
        let mut exported = 0;

        for identifier in &identifiers {
            let unit = match resolve_assembly_unit(&self.layout, identifier) {
                Ok(unit) => unit,
                Err(e) => {
                    record_item_error(
                        session,
                        ItemIoError::UnresolvableUnit {
                            unit: identifier.clone(),
                            reason: format!("{:#}", e),
                        },
                    );
                    continue;
                }
            };

            let binary = self.layout.build_output_dir.join(format!("{}.dll", unit));
            if !binary.is_file() {
                record_item_error(
                    session,
                    ItemIoError::MissingBinary {
                        unit,
                        path: binary,
                    },
                );
                continue;
            }

            let mut files = vec![binary];
            if include_symbols {
                let symbols = self.layout.build_output_dir.join(format!("{}.pdb", unit));
                if !symbols.is_file() {
                    record_item_error(
                        session,
                        ItemIoError::MissingDebugSymbols {
                            unit,
                            path: symbols,
                        },
                    );
                    continue;
                }
                files.push(symbols);
            }

            let mut copied = true;
            for file in files {
                let Some(file_name) = file.file_name() else {
                    continue;
                };
                let destination = session.workspace_path.join(file_name);
                if let Err(e) = copy_file(&file, &destination) {
                    record_item_error(
                        session,
                        ItemIoError::CopyFailed {
                            path: file.clone(),
                            reason: format!("{:#}", e),
                        },
                    );
                    copied = false;
                    break;
                }
            }

            if copied {
                tracing::info!("Exported assembly {}", unit);
                exported += 1;
            }
        }

        session.assemblies_exported = exported;
        Ok(stage_outcome(session, errors_before))
    }

    fn copy_auxiliary_data(
        &self,
        session: &mut ExportSession,
    ) -> Result<StageOutcome, ExportAbort> {
        let errors_before = session.item_errors.len();
        let workspace = session.workspace_path.clone();

        for directory in &self.layout.data_directories {
            let source = self.layout.assets_dir.join(directory);
            if !source.is_dir() {
                tracing::debug!("Data directory {} not present, skipping", source);
                continue;
            }

            let report = copy_tree(&source, &workspace.join(directory), is_sidecar);
            tracing::info!("Copied {} file(s) from {}", report.files_copied, source);
            record_copy_failures(session, report.failures);
        }

        let artifacts = session.settings_snapshot.artifacts.clone();
        for artifact in &artifacts {
            let source = self.layout.resolve(artifact);

            if source.is_dir() {
                let Some(dir_name) = source.file_name() else {
                    continue;
                };
                let report = copy_tree(&source, &workspace.join(dir_name), is_sidecar);
                record_copy_failures(session, report.failures);
            } else if source.is_file() {
                let Some(file_name) = source.file_name() else {
                    continue;
                };
                if let Err(e) = copy_file(&source, &workspace.join(file_name)) {
                    record_item_error(
                        session,
                        ItemIoError::CopyFailed {
                            path: source.clone(),
                            reason: format!("{:#}", e),
                        },
                    );
                }
            } else {
                record_item_error(session, ItemIoError::MissingArtifact { path: source });
            }
        }

        Ok(stage_outcome(session, errors_before))
    }

    async fn package_bundles(
        &self,
        session: &mut ExportSession,
    ) -> Result<StageOutcome, ExportAbort> {
        let content_types = session.settings_snapshot.content_types;
        let include_general = content_types.contains(ContentTypes::PREFABS);
        let include_scenes = content_types.contains(ContentTypes::SCENES);

        if !include_general && !include_scenes {
            return Ok(StageOutcome::Skipped {
                reason: "no bundle content selected".to_string(),
            });
        }

        let assets = self
            .packager
            .eligible_assets()
            .map_err(|e| ExportAbort::Packaging(format!("{:#}", e)))?;

        let errors_before = session.item_errors.len();
        let bundle = session.settings_snapshot.bundle_identifier().to_string();
        let mut tagged = 0;

        for asset in filter_eligible_assets(assets) {
            let wanted = match asset.kind {
                AssetKind::General => include_general,
                AssetKind::Scene => include_scenes,
            };
            if !wanted {
                continue;
            }

            match self.packager.tag_asset(&asset, &bundle, asset.kind.variant()) {
                Ok(()) => tagged += 1,
                Err(e) => record_item_error(
                    session,
                    ItemIoError::TagFailed {
                        asset: asset.path.clone(),
                        reason: format!("{:#}", e),
                    },
                ),
            }
        }
        tracing::info!("Tagged {} asset(s) for bundle {}", tagged, bundle);

        let output = session
            .workspace_path
            .join(self.platform.directory_name());
        fs::create_dir_all(&output).map_err(|e| {
            ExportAbort::Packaging(format!("Failed to create directory {}: {}", output, e))
        })?;

        let produced = self
            .packager
            .build_bundles(&output, self.platform)
            .await
            .map_err(|e| ExportAbort::Packaging(format!("{:#}", e)))?;

        tracing::info!("Built {} bundle(s) for {}", produced, self.platform);
        session.bundles_produced = produced;
        Ok(stage_outcome(session, errors_before))
    }

    /// Copy the workspace next to the destination, then swap it into place
    fn publish(&self, session: &mut ExportSession) -> Result<StageOutcome, ExportAbort> {
        let settings = &session.settings_snapshot;
        let Some(output_dir) = settings.output_directory.clone() else {
            return Err(ValidationError::MissingOutputDirectory.into());
        };

        let destination = output_dir.join(&settings.name);
        let staging = output_dir.join(staging_name(&settings.name));

        fs::create_dir_all(&output_dir).map_err(|e| {
            ExportAbort::Publish(format!("Failed to create directory {}: {}", output_dir, e))
        })?;
        fs_utils::remove_dir_if_exists(&staging).map_err(|e| {
            ExportAbort::Publish(format!("Failed to clear staging directory {}: {}", staging, e))
        })?;

        let report = copy_tree(&session.workspace_path, &staging, |_| false);
        if let Some((path, reason)) = report.failures.first() {
            if let Err(e) = fs_utils::remove_dir_if_exists(&staging) {
                tracing::warn!("Failed to clean up {}: {}", staging, e);
            }
            return Err(ExportAbort::Publish(format!(
                "Failed to copy {}: {} ({} failure(s))",
                path,
                reason,
                report.failures.len()
            )));
        }

        swap_into_place(&staging, &destination)?;

        tracing::info!(
            "Published {} file(s) to {}",
            report.files_copied,
            destination
        );
        session.published_path = Some(destination);
        Ok(StageOutcome::Completed)
    }
}

fn swap_into_place(staging: &Utf8Path, destination: &Utf8PathBuf) -> Result<(), ExportAbort> {
    fs_utils::remove_dir_if_exists(destination).map_err(|e| {
        ExportAbort::Publish(format!("Failed to remove previous {}: {}", destination, e))
    })?;
    fs::rename(staging, destination).map_err(|e| {
        ExportAbort::Publish(format!(
            "Failed to move {} to {}: {}",
            staging, destination, e
        ))
    })
}

fn record_item_error(session: &mut ExportSession, error: ItemIoError) {
    tracing::error!("{}", error);
    session.item_errors.push(error);
}

fn record_copy_failures(session: &mut ExportSession, failures: Vec<(Utf8PathBuf, String)>) {
    for (path, reason) in failures {
        record_item_error(session, ItemIoError::CopyFailed { path, reason });
    }
}

fn stage_outcome(session: &ExportSession, errors_before: usize) -> StageOutcome {
    match session.item_errors.len() - errors_before {
        0 => StageOutcome::Completed,
        errors => StageOutcome::Degraded { errors },
    }
}
