use crate::models::session::ExportStage;
use crate::models::settings::ExportSettings;

/// Single source of truth for the live settings record and export progress.
///
/// # Thread Safety
///
/// `AppState` is wrapped in `Arc<RwLock<AppState>>` by [`crate::state::StateManager`].
/// Never mutate it directly; use [`update()`](crate::state::StateManager::update) so
/// change events are emitted.
///
/// # Related Types
///
/// - [`crate::state::StateChange`]: Event types for state mutations
/// - [`crate::services::MetadataSynchronizer`]: Pulls About document edits into `settings`
/// - [`crate::services::ExportOrchestrator`]: Reports stage progress here
#[derive(Clone, Debug, Default)]
pub struct AppState {
    /// The internal settings record
    pub settings: ExportSettings,

    // Runtime state
    pub is_exporting: bool,
    pub current_stage: Option<ExportStage>,

    // Result of the most recent export
    pub last_export_success: Option<bool>,
    pub last_export_degraded: bool,
}

impl AppState {
    pub fn new(settings: ExportSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Ready to export: valid settings and nothing running
    pub fn can_export(&self) -> bool {
        !self.is_exporting && self.settings.validate().is_ok()
    }
}
