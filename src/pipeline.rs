//! Pipeline entry points.
//!
//! [`Pipeline`] wires the services to one project and exposes the operations the
//! command line (or any other front end) binds to:
//!
//! - [`export_mod`](Pipeline::export_mod) / [`export_and_run`](Pipeline::export_and_run)
//! - [`sync_metadata_now`](Pipeline::sync_metadata_now) and
//!   [`apply_metadata`](Pipeline::apply_metadata)
//! - [`set_watcher_enabled`](Pipeline::set_watcher_enabled), persisted as a preference
//! - [`set_development_build`](Pipeline::set_development_build), mirrored into the
//!   `DEVELOPMENT_BUILD` scripting define
//! - [`watch`](Pipeline::watch), the periodic compile poll and metadata sync loop

use crate::config::ConfigManager;
use crate::host::{
    AssetPackagingBackend, CleanWorkspace, CommandCompilerHost, CompilerEvent, CompilerHost,
    ProcessLauncher, ProjectAssetBackend, RuntimeLauncher, UnsavedResourceEnumerator,
};
use crate::metrics::Metrics;
use crate::models::{AppConfig, ExportSession, ValidationError, WATCHER_ENABLED_KEY};
use crate::services::about;
use crate::services::launch::{LaunchError, RuntimeLocator, launch_runtime};
use crate::services::{
    CompilePassMonitor, DefineSync, ExportOrchestrator, MetadataSynchronizer, PassResult,
    PreflightCoordinator, SyncError, SyncReport,
};
use crate::state::{StateChange, StateManager};
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// File the local asset backend writes its bundle manifest to, inside the scratch directory
pub const BUNDLE_MANIFEST_FILE: &str = "LaunchPadBundles.yaml";

/// Lower bound for the watch loop interval
const MIN_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// How often the watch loop logs metrics
const METRICS_LOG_INTERVAL: Duration = Duration::from_secs(300);

/// The host collaborators a pipeline runs against
pub struct Hosts {
    pub compiler: Arc<dyn CompilerHost>,
    pub resources: Arc<dyn UnsavedResourceEnumerator>,
    pub packager: Arc<dyn AssetPackagingBackend>,
    pub launcher: Arc<dyn RuntimeLauncher>,
}

impl Hosts {
    /// Command-line hosts for `app_config`, plus the compiler event stream to attach
    pub fn local(app_config: &AppConfig) -> (Self, mpsc::UnboundedReceiver<CompilerEvent>) {
        let layout = app_config.layout();
        let (compiler, events) = CommandCompilerHost::new(
            app_config.compile_command.clone(),
            layout.root.clone(),
        );
        let packager = ProjectAssetBackend::new(
            layout.root.clone(),
            layout.assets_dir.clone(),
            layout.scratch_dir.join(BUNDLE_MANIFEST_FILE),
            app_config.packager_command.clone(),
        );

        let hosts = Self {
            compiler: Arc::new(compiler),
            resources: Arc::new(CleanWorkspace),
            packager: Arc::new(packager),
            launcher: Arc::new(ProcessLauncher),
        };
        (hosts, events)
    }
}

/// Result of [`Pipeline::export_and_run`]
#[derive(Debug)]
pub struct RunOutcome {
    pub session: ExportSession,
    /// Process id of the runtime; `None` when the export did not succeed
    pub pid: Option<u32>,
}

/// Result of [`Pipeline::check`]
#[derive(Debug)]
pub struct CheckReport {
    pub validation: Result<(), ValidationError>,
    pub warnings: Vec<String>,
    pub unsaved_items: Vec<String>,
    pub last_pass: PassResult,
}

impl CheckReport {
    pub fn is_ready(&self) -> bool {
        self.validation.is_ok() && !self.last_pass.had_errors
    }
}

pub struct Pipeline {
    config: ConfigManager,
    app_config: AppConfig,
    state: StateManager,
    metrics: Arc<Metrics>,
    monitor: Arc<CompilePassMonitor>,
    preflight: Arc<PreflightCoordinator>,
    orchestrator: ExportOrchestrator,
    synchronizer: Arc<MetadataSynchronizer>,
    define_sync: DefineSync,
    locator: RuntimeLocator,
    launcher: Arc<dyn RuntimeLauncher>,
}

impl Pipeline {
    /// Load the settings record and preferences and wire the services together
    pub fn new(config: ConfigManager, app_config: AppConfig, hosts: Hosts) -> Result<Self> {
        let settings = config.load_settings(&app_config.project_root)?;
        let preferences = config.load_preferences()?;

        let state = StateManager::with_settings(settings);
        let metrics = Arc::new(Metrics::new());
        let monitor = Arc::new(CompilePassMonitor::new(hosts.compiler));
        let preflight = Arc::new(PreflightCoordinator::new(hosts.resources));

        let orchestrator = ExportOrchestrator::new(
            app_config.layout(),
            Arc::clone(&preflight),
            Arc::clone(&monitor),
            hosts.packager,
        )
        .with_platform(app_config.platform)
        .with_state(state.clone());

        let synchronizer = Arc::new(
            MetadataSynchronizer::new(app_config.about_path(), state.clone())
                .with_metrics(Arc::clone(&metrics)),
        );
        synchronizer.set_enabled(preferences.watcher_enabled());

        let define_sync =
            DefineSync::new(app_config.project_settings_path(), &app_config.define_group);
        let locator = RuntimeLocator::from_config(&app_config);

        Ok(Self {
            config,
            app_config,
            state,
            metrics,
            monitor,
            preflight,
            orchestrator,
            synchronizer,
            define_sync,
            locator,
            launcher: hosts.launcher,
        })
    }

    /// Feed compiler events into the compile monitor; must be called inside the runtime
    pub fn attach_compiler_events(
        &self,
        events: mpsc::UnboundedReceiver<CompilerEvent>,
    ) -> JoinHandle<()> {
        self.monitor.attach(events)
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn monitor(&self) -> &Arc<CompilePassMonitor> {
        &self.monitor
    }

    pub fn synchronizer(&self) -> &Arc<MetadataSynchronizer> {
        &self.synchronizer
    }

    pub fn app_config(&self) -> &AppConfig {
        &self.app_config
    }

    /// Request a compile pass and wait for it
    pub async fn compile(&self) -> PassResult {
        self.monitor.wait_for_next_pass(true).await
    }

    /// Export the mod described by the current settings record
    pub async fn export_mod(&self) -> ExportSession {
        let settings = self.state.settings();
        let session = self.orchestrator.export(&settings).await;
        self.metrics.record_export(&session);
        session
    }

    /// Export, then start the runtime if the export succeeded
    pub async fn export_and_run(&self) -> Result<RunOutcome, LaunchError> {
        let session = self.export_mod().await;
        if !session.success {
            tracing::info!("Not launching the runtime: export did not succeed");
            return Ok(RunOutcome { session, pid: None });
        }

        let pid = launch_runtime(
            self.launcher.as_ref(),
            &self.locator,
            &session.settings_snapshot,
        )
        .await?;

        Ok(RunOutcome {
            session,
            pid: Some(pid),
        })
    }

    /// Sync the mirrored fields immediately; pulled values are persisted
    pub fn sync_metadata_now(&self, force: bool) -> Result<SyncReport, SyncError> {
        let report = self.synchronizer.sync_now(force)?;
        self.persist_if_pulled(&report);
        Ok(report)
    }

    /// Pull the About document's values into the settings record
    pub fn apply_metadata(&self) -> Result<SyncReport, SyncError> {
        let report = self.synchronizer.apply_external()?;
        self.persist_if_pulled(&report);
        Ok(report)
    }

    /// Enable or disable the watcher and persist the preference
    pub fn set_watcher_enabled(&self, enabled: bool) -> Result<()> {
        self.config.set_preference(WATCHER_ENABLED_KEY, enabled)?;
        self.synchronizer.set_enabled(enabled);
        Ok(())
    }

    pub fn watcher_enabled(&self) -> bool {
        self.synchronizer.is_enabled()
    }

    /// Set the development build flag, save it and update the scripting define
    pub fn set_development_build(&self, enabled: bool) -> Result<()> {
        self.state.update(|state| state.settings.development_build = enabled);
        self.persist_settings()?;
        self.sync_development_define()?;
        Ok(())
    }

    pub fn development_build(&self) -> bool {
        self.state.read(|state| state.settings.development_build)
    }

    /// Bring the scripting define in line with the settings; true when the file changed
    pub fn sync_development_define(&self) -> Result<bool> {
        self.define_sync.sync(self.development_build())
    }

    /// Write a default About document if there is none; true when one was created
    pub fn init_about(&self) -> Result<bool> {
        let path = self.app_config.about_path();
        about::create_default(&path, &self.state.settings())
            .with_context(|| format!("Failed to create About document at {}", path))
    }

    /// Report whether an export could start, without side effects
    pub fn check(&self) -> CheckReport {
        CheckReport {
            validation: self.state.read(|state| state.settings.validate()),
            warnings: self.state.read(|state| state.settings.warnings()),
            unsaved_items: self.preflight.unsaved_items(),
            last_pass: self.monitor.last_pass_result(),
        }
    }

    pub fn persist_settings(&self) -> Result<()> {
        self.config.save_settings(&self.state.settings())
    }

    fn persist_if_pulled(&self, report: &SyncReport) {
        if report.internal_writes.is_empty() {
            return;
        }
        if let Err(e) = self.persist_settings() {
            tracing::error!("Failed to save settings after metadata sync: {:#}", e);
        }
    }

    /// Poll the compiler and sync metadata until `shutdown` resolves
    ///
    /// The About document is applied once at startup. Settings are saved whenever the
    /// settings record changes, and the development build define follows its flag.
    pub async fn watch<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let interval =
            Duration::from_millis(self.app_config.sync_interval_ms).max(MIN_TICK_INTERVAL);

        if self.synchronizer.is_enabled() {
            if let Err(e) = self.apply_metadata() {
                tracing::warn!("Could not apply About document at startup: {}", e);
            }
        }

        if let Err(e) = self.sync_development_define() {
            tracing::warn!("Could not sync the development build define: {:#}", e);
        }
        let mut development_build = self.development_build();

        let mut changes = self.state.subscribe();
        let mut passes = self.monitor.subscribe();
        let mut passes_open = true;
        let sync_handle = Arc::clone(&self.synchronizer).start(interval);

        let mut poll = tokio::time::interval(interval);
        let mut metrics_log = tokio::time::interval_at(
            tokio::time::Instant::now() + METRICS_LOG_INTERVAL,
            METRICS_LOG_INTERVAL,
        );

        tracing::info!("Watching {} every {:?}", self.app_config.project_root, interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = poll.tick() => self.monitor.poll(),
                _ = metrics_log.tick() => self.metrics.log_periodic(),
                changed = passes.changed(), if passes_open => match changed {
                    Ok(()) => self.metrics.record_compile_pass(),
                    Err(_) => passes_open = false,
                },
                change = changes.recv() => match change {
                    Ok(StateChange::MetadataChanged { .. }) => {
                        if let Err(e) = self.persist_settings() {
                            tracing::error!("Failed to save settings: {:#}", e);
                        }
                    }
                    Ok(StateChange::SettingsChanged) => {
                        if let Err(e) = self.persist_settings() {
                            tracing::error!("Failed to save settings: {:#}", e);
                        }
                        let enabled = self.development_build();
                        if enabled != development_build {
                            development_build = enabled;
                            if let Err(e) = self.sync_development_define() {
                                tracing::warn!("Could not sync the development build define: {:#}", e);
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Missed {} state change(s); saving settings", skipped);
                        if let Err(e) = self.persist_settings() {
                            tracing::error!("Failed to save settings: {:#}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        tracing::info!("Stopping watch loop");
        sync_handle.stop().await;
        Ok(())
    }
}
