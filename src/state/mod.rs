// State management module
//
// This module provides the StateManager which wraps AppState with thread-safe access
// using Arc<RwLock<T>> and emits change events to subscribers (the watch loop persists
// settings on MetadataChanged/SettingsChanged).

use crate::models::{AppState, ExportSettings, ExportStage, MirroredField};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// One or more mirrored fields (Name/Author/Version) of the settings record changed
    MetadataChanged { fields: Vec<MirroredField> },

    /// Any other settings field changed
    SettingsChanged,

    /// An export has started
    ExportStarted { mod_name: String },

    /// The running export entered a new stage
    StageChanged { stage: ExportStage },

    /// An export has finished
    ExportFinished { success: bool, degraded: bool },
}

/// Thread-safe state manager with event emission
///
/// This is the central state management component that:
/// - Provides thread-safe access to [`AppState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// # Usage
///
/// - [`read()`](Self::read) for reading state
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
pub struct StateManager {
    /// The application state protected by RwLock for thread-safe access
    state: Arc<RwLock<AppState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state
    pub fn new() -> Self {
        Self::with_settings(ExportSettings::default())
    }

    /// Create a StateManager holding a loaded settings record
    pub fn with_settings(settings: ExportSettings) -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(AppState::new(settings))),
            state_tx,
        }
    }

    /// Get a cloned snapshot of the current state
    pub fn snapshot(&self) -> AppState {
        self.read(AppState::clone)
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let name = state_manager.read(|state| state.settings.name.clone());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// 1. Captures the old state
    /// 2. Applies the update function
    /// 3. Detects what changed
    /// 4. Emits appropriate events
    ///
    /// # Returns
    /// A vector of StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = self.detect_changes(&old_state, &state);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn detect_changes(&self, old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        let fields = old
            .settings
            .mirrored_fields()
            .differing(&new.settings.mirrored_fields());
        if !fields.is_empty() {
            changes.push(StateChange::MetadataChanged { fields });
        }

        // Compare everything except the mirrored fields
        let mut old_rest = old.settings.clone();
        for field in MirroredField::ALL {
            old_rest.set_mirrored(field, new.settings.mirrored_fields().get(field));
        }
        if old_rest != new.settings {
            changes.push(StateChange::SettingsChanged);
        }

        if !old.is_exporting && new.is_exporting {
            changes.push(StateChange::ExportStarted {
                mod_name: new.settings.name.clone(),
            });
        }

        if old.current_stage != new.current_stage {
            if let Some(stage) = new.current_stage {
                changes.push(StateChange::StageChanged { stage });
            }
        }

        if old.is_exporting && !new.is_exporting {
            changes.push(StateChange::ExportFinished {
                success: new.last_export_success.unwrap_or(false),
                degraded: new.last_export_degraded,
            });
        }

        changes
    }

    // Convenience methods for common state updates

    /// Clone of the internal settings record
    pub fn settings(&self) -> ExportSettings {
        self.read(|state| state.settings.clone())
    }

    /// Replace the whole settings record
    pub fn replace_settings(&self, settings: ExportSettings) -> Vec<StateChange> {
        self.update(|state| state.settings = settings)
    }

    /// Write mirrored field values into the settings record
    pub fn set_mirrored(&self, values: &[(MirroredField, String)]) -> Vec<StateChange> {
        self.update(|state| {
            for (field, value) in values {
                state.settings.set_mirrored(*field, value.clone());
            }
        })
    }

    pub fn begin_export(&self) -> Vec<StateChange> {
        self.update(|state| {
            state.is_exporting = true;
            state.current_stage = None;
            state.last_export_success = None;
            state.last_export_degraded = false;
        })
    }

    pub fn enter_stage(&self, stage: ExportStage) -> Vec<StateChange> {
        self.update(|state| state.current_stage = Some(stage))
    }

    pub fn finish_export(&self, success: bool, degraded: bool) -> Vec<StateChange> {
        self.update(|state| {
            state.is_exporting = false;
            state.current_stage = None;
            state.last_export_success = Some(success);
            state.last_export_degraded = degraded;
        })
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Clones share the same state and channel
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
