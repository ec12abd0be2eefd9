//! LaunchPad - mod export pipeline
//!
//! Main entry point for the command-line tool.
//!
//! # Execution Flow
//!
//! 1. Parse arguments
//! 2. Initialize logging → `<project>/<log-dir>/launchpad.<date>`
//! 3. Load `launchpad.yaml` (layered with `LAUNCHPAD_*` environment variables)
//! 4. Create the tokio runtime with 4 worker threads
//! 5. Wire the pipeline to the local hosts and attach the compiler event stream
//! 6. Run the subcommand
//! 7. Log metrics and shut the runtime down
//!
//! The process exits with a non-zero code when the operation did not succeed.

use anyhow::Result;
use clap::Parser;
use launchpad_exporter::cli::Cli;
use launchpad_exporter::logging::{self, LOG_PREFIX};
use launchpad_exporter::{APP_NAME, ConfigManager, Hosts, Pipeline, VERSION};
use std::process::ExitCode;
use std::time::Duration;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logging comes first so configuration warnings are recorded
    let _guard =
        logging::setup_logging_with_console(&cli.log_path(), LOG_PREFIX, cli.debug, !cli.quiet)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let mut app_config = config_manager.load_app_config()?;
    if let Some(project) = &cli.project {
        app_config.project_root = project.clone();
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .thread_name("launchpad-worker")
        .build()?;

    tracing::info!("Tokio runtime initialized with {} worker threads", 4);

    let (hosts, compiler_events) = Hosts::local(&app_config);
    let pipeline = Pipeline::new(config_manager, app_config, hosts)?;

    let result = runtime.block_on(async {
        let events_task = pipeline.attach_compiler_events(compiler_events);
        let result = cli.command.execute(&pipeline).await;
        events_task.abort();
        result
    });

    pipeline.metrics().log_summary();
    runtime.shutdown_timeout(Duration::from_secs(5));

    match result {
        Ok(true) => Ok(ExitCode::SUCCESS),
        Ok(false) => Ok(ExitCode::FAILURE),
        Err(e) => {
            tracing::error!("{:#}", e);
            Err(e)
        }
    }
}
