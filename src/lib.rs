// LaunchPad Exporter - mod export pipeline
//
// This is the library crate containing the export pipeline, the metadata synchronizer and
// the host boundary. The binary crate (main.rs) provides the command-line entry point.

pub mod cli;
pub mod config;
pub mod host;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::Metrics;
pub use models::{AppConfig, AppState, ExportSession, ExportSettings};
pub use pipeline::{Hosts, Pipeline};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
