//! Services module - the export pipeline and its gating components.
//!
//! Everything here talks to the host environment only through the traits in
//! [`crate::host`], so each component can be driven by mocks in tests.
//!
//! # Components
//!
//! - [`CompilePassMonitor`]: Reconciles the host's compile liveness poll with its compiler
//!   events into one pass state machine. Answers "did the last build have errors" and lets
//!   callers await the next pass.
//!
//! - [`PreflightCoordinator`]: Saves open documents, the active sub-editor and dirty assets
//!   before an export, honoring user cancellation.
//!
//! - [`ExportOrchestrator`]: Runs the staged pipeline:
//!   - Validation, preflight and compile gates
//!   - Assembly, data directory and artifact staging into a scratch workspace
//!   - Asset tagging and bundle packaging
//!   - Stage-and-rename publish into the output directory
//!
//! - [`MetadataSynchronizer`]: Keeps Name/Author/Version consistent between the settings
//!   record and the About document without oscillating.
//!
//! Supporting modules: [`about`] (About document parsing and rewriting), [`fs_utils`]
//! (recursive copies), [`launch`] (runtime discovery and launch after an export) and
//! [`define_sync`] (the `DEVELOPMENT_BUILD` scripting define).
//!
//! # Usage Example
//!
//! ```ignore
//! use launchpad_exporter::services::ExportOrchestrator;
//!
//! let orchestrator = ExportOrchestrator::new(layout, preflight, monitor, packager);
//! let session = orchestrator.export(&settings).await;
//!
//! if session.success {
//!     println!("{}", session.summary());
//! }
//! ```

pub mod about;
pub mod compile_monitor;
pub mod define_sync;
pub mod export;
pub mod fs_utils;
pub mod launch;
pub mod metadata_sync;
pub mod preflight;

pub use about::{AboutDocument, AboutError};
pub use compile_monitor::{CompilePassMonitor, PassId, PassResult, PassStatus};
pub use define_sync::{DEVELOPMENT_DEFINE, DefineSync};
pub use export::ExportOrchestrator;
pub use launch::{LaunchError, RuntimeLocator, launch_runtime};
pub use metadata_sync::{MetadataSynchronizer, SkipReason, SyncError, SyncHandle, SyncReport};
pub use preflight::{CancelPoint, PreflightCoordinator, PreflightOutcome, ResidualPolicy};
