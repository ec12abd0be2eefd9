//! Command-line interface
//!
//! Each subcommand maps onto one [`Pipeline`] entry point.

use crate::pipeline::Pipeline;
use crate::services::SyncReport;
use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};

/// LaunchPad - export mods from a game project
#[derive(Parser, Debug)]
#[command(name = "launchpad")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding ExportSettings.yaml, Preferences.yaml and launchpad.yaml
    #[arg(long, global = true, default_value = ".launchpad", env = "LAUNCHPAD_CONFIG_DIR")]
    pub config_dir: Utf8PathBuf,

    /// Project root, overriding the configured one
    #[arg(short, long, global = true)]
    pub project: Option<Utf8PathBuf>,

    /// Log directory, relative to the project root
    #[arg(long, global = true, default_value = "logs", env = "LAUNCHPAD_LOG_DIR")]
    pub log_dir: Utf8PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log to files only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Where log files go, before any configuration is read
    pub fn log_path(&self) -> Utf8PathBuf {
        let root = self.project.as_deref().unwrap_or(Utf8Path::new("."));
        root.join(&self.log_dir)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export the mod to its output directory
    Export {
        /// Use the last compile result instead of running the compile command first
        #[arg(long)]
        no_compile: bool,
    },

    /// Export the mod, then start the game if the export succeeded
    ExportAndRun {
        #[arg(long)]
        no_compile: bool,
    },

    /// Sync Name/Author/Version between the settings and the About document
    SyncMetadata {
        /// Rewrite the About document even if the settings did not change
        #[arg(long)]
        force: bool,
    },

    /// Copy Name/Author/Version from the About document into the settings
    ApplyMetadata,

    /// Enable, disable or show the metadata watcher
    Watcher {
        #[command(subcommand)]
        action: Toggle,
    },

    /// Enable, disable or show the development build flag and its DEVELOPMENT_BUILD define
    #[command(alias = "dev-build")]
    DevelopmentBuild {
        #[command(subcommand)]
        action: Toggle,
    },

    /// Poll the compiler and keep metadata in sync until interrupted
    Watch,

    /// Create a default About document if the project has none
    InitAbout,

    /// Validate the settings and report unsaved items and the last compile result
    Check,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Enable,
    Disable,
    Status,
}

impl Commands {
    /// Run the command; returns false when the operation did not succeed
    pub async fn execute(&self, pipeline: &Pipeline) -> Result<bool> {
        match self {
            Self::Export { no_compile } => {
                compile_first(pipeline, *no_compile).await;
                let session = pipeline.export_mod().await;
                println!("{}", session.summary());
                if let Some(path) = &session.published_path {
                    println!("Published to {}", path);
                }
                Ok(session.success)
            }
            Self::ExportAndRun { no_compile } => {
                compile_first(pipeline, *no_compile).await;
                let outcome = pipeline.export_and_run().await?;
                println!("{}", outcome.session.summary());
                if let Some(pid) = outcome.pid {
                    println!("Started runtime (pid {})", pid);
                }
                Ok(outcome.session.success)
            }
            Self::SyncMetadata { force } => {
                let report = pipeline.sync_metadata_now(*force)?;
                print_sync_report(&report);
                Ok(true)
            }
            Self::ApplyMetadata => {
                let report = pipeline.apply_metadata()?;
                print_sync_report(&report);
                Ok(true)
            }
            Self::Watcher { action } => {
                if let Some(enabled) = action.target() {
                    pipeline.set_watcher_enabled(enabled)?;
                }
                println!("Metadata watcher is {}", on_off(pipeline.watcher_enabled()));
                Ok(true)
            }
            Self::DevelopmentBuild { action } => {
                if let Some(enabled) = action.target() {
                    pipeline.set_development_build(enabled)?;
                }
                println!("Development build is {}", on_off(pipeline.development_build()));
                Ok(true)
            }
            Self::Watch => {
                pipeline
                    .watch(async {
                        if let Err(e) = tokio::signal::ctrl_c().await {
                            tracing::error!("Failed to listen for Ctrl+C: {}", e);
                        }
                    })
                    .await?;
                Ok(true)
            }
            Self::InitAbout => {
                let path = pipeline.app_config().about_path();
                if pipeline.init_about()? {
                    println!("Created {}", path);
                } else {
                    println!("{} already exists", path);
                }
                Ok(true)
            }
            Self::Check => {
                let report = pipeline.check();
                match &report.validation {
                    Ok(()) => println!("Settings: ok"),
                    Err(e) => println!("Settings: {}", e),
                }
                for warning in &report.warnings {
                    println!("Warning: {}", warning);
                }
                if report.last_pass.had_errors {
                    println!(
                        "Last compile had errors in: {}",
                        report.last_pass.errored_units.join(", ")
                    );
                }
                for item in &report.unsaved_items {
                    println!("Unsaved: {}", item);
                }
                Ok(report.is_ready())
            }
        }
    }
}

impl Toggle {
    /// The requested state; `None` for a status query
    pub fn target(self) -> Option<bool> {
        match self {
            Self::Enable => Some(true),
            Self::Disable => Some(false),
            Self::Status => None,
        }
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}

async fn compile_first(pipeline: &Pipeline, skip: bool) {
    if skip || pipeline.app_config().compile_command.is_none() {
        return;
    }
    let result = pipeline.compile().await;
    tracing::info!(
        "Compile pass {} finished (errors: {})",
        result.pass_id,
        result.had_errors
    );
}

fn print_sync_report(report: &SyncReport) {
    if let Some(reason) = &report.skipped {
        println!("Metadata sync skipped: {:?}", reason);
    } else if report.is_noop() {
        println!("Metadata already in sync");
    } else {
        if report.external_writes > 0 {
            println!("Updated the About document");
        }
        for field in &report.internal_writes {
            println!("Updated {} in the settings", field);
        }
    }
}
