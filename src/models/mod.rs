//! Data models for the export pipeline.
//!
//! - [`AppState`]: The live settings record plus export progress, held by
//!   [`StateManager`](crate::state::StateManager)
//! - [`ExportSettings`]: The persisted per-mod settings record (`ExportSettings.yaml`),
//!   including the three mirrored metadata fields
//! - [`MirroredFields`]: Name/Author/Version as seen on one side of the metadata sync
//! - [`ExportSession`]: Per-invocation record of an export, with stage outcomes and item errors
//! - [`AppConfig`]: Tool configuration and project layout (`launchpad.yaml`)
//! - [`Preferences`]: Named boolean preferences (`Preferences.yaml`)
//!
//! Everything that is persisted derives `Serialize`/`Deserialize`. The live settings record is
//! held by [`StateManager`](crate::state::StateManager); mutate it through `update()` so change
//! events are emitted.

pub mod app_config;
pub mod app_state;
pub mod metadata;
pub mod preferences;
pub mod session;
pub mod settings;

pub use app_config::{AppConfig, CommandSpec, PlatformTarget, ProjectLayout};
pub use app_state::AppState;
pub use metadata::{MirroredField, MirroredFields};
pub use preferences::{Preferences, WATCHER_ENABLED_KEY};
pub use session::{ExportAbort, ExportSession, ExportStage, ItemIoError, StageOutcome};
pub use settings::{ContentTypes, DEFAULT_VERSION, ExportSettings, ValidationError};
