use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Preference key storing whether the metadata watcher runs
pub const WATCHER_ENABLED_KEY: &str = "MetadataWatcher.Enabled";

/// Named boolean preferences persisted in `Preferences.yaml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preferences {
    pub flags: IndexMap<String, bool>,
}

impl Preferences {
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.flags.get(key).copied().unwrap_or(default)
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.flags.insert(key.into(), value);
    }

    /// The watcher defaults to enabled
    pub fn watcher_enabled(&self) -> bool {
        self.get_bool(WATCHER_ENABLED_KEY, true)
    }

    pub fn set_watcher_enabled(&mut self, enabled: bool) {
        self.set_bool(WATCHER_ENABLED_KEY, enabled);
    }
}
