use crate::models::{AppConfig, ExportSettings, Preferences};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Prefix of environment variables overriding `launchpad.yaml` (`LAUNCHPAD_SYNC_INTERVAL_MS`, ...)
pub const ENV_PREFIX: &str = "LAUNCHPAD";

/// Configuration manager for the tool's YAML files.
///
/// Manages three files inside the configuration directory:
/// - `ExportSettings.yaml`: The persisted settings record of the mod
/// - `Preferences.yaml`: Named boolean preferences (watcher enabled, ...)
/// - `launchpad.yaml`: Tool configuration, layered with `LAUNCHPAD_*` environment variables
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
    preferences_path: Utf8PathBuf,
    app_config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join("ExportSettings.yaml"),
            preferences_path: config_dir.join("Preferences.yaml"),
            app_config_path: config_dir.join("launchpad.yaml"),
            config_dir,
        })
    }

    /// Load the export settings record.
    ///
    /// # Returns
    /// The saved settings, or project defaults if the file doesn't exist
    pub fn load_settings(&self, project_root: &Utf8Path) -> Result<ExportSettings> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Export settings not found at {}, using project defaults",
                self.settings_path
            );
            return Ok(ExportSettings::for_project(project_root));
        }

        let file_contents = fs::read_to_string(&self.settings_path).with_context(|| {
            format!("Failed to read export settings: {}", self.settings_path)
        })?;

        let settings: ExportSettings = serde_yaml_ng::from_str(&file_contents).with_context(|| {
            format!("Failed to parse export settings: {}", self.settings_path)
        })?;

        tracing::info!("Loaded export settings from {}", self.settings_path);
        Ok(settings)
    }

    /// Save the export settings record.
    pub fn save_settings(&self, settings: &ExportSettings) -> Result<()> {
        let yaml_string = serde_yaml_ng::to_string(settings)
            .context("Failed to serialize export settings to YAML")?;

        fs::write(&self.settings_path, yaml_string).with_context(|| {
            format!("Failed to write export settings: {}", self.settings_path)
        })?;

        tracing::debug!("Saved export settings to {}", self.settings_path);
        Ok(())
    }

    /// Load the preferences file.
    ///
    /// # Returns
    /// The loaded Preferences, or defaults if the file doesn't exist
    pub fn load_preferences(&self) -> Result<Preferences> {
        if !self.preferences_path.exists() {
            return Ok(Preferences::default());
        }

        let file_contents = fs::read_to_string(&self.preferences_path)
            .with_context(|| format!("Failed to read preferences: {}", self.preferences_path))?;

        // An empty file deserializes as unit, not as a map
        if file_contents.trim().is_empty() {
            return Ok(Preferences::default());
        }

        let preferences: Preferences = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse preferences: {}", self.preferences_path))?;

        Ok(preferences)
    }

    /// Save the preferences file.
    pub fn save_preferences(&self, preferences: &Preferences) -> Result<()> {
        let yaml_string = serde_yaml_ng::to_string(preferences)
            .context("Failed to serialize preferences to YAML")?;

        fs::write(&self.preferences_path, yaml_string)
            .with_context(|| format!("Failed to write preferences: {}", self.preferences_path))?;

        tracing::debug!("Saved preferences to {}", self.preferences_path);
        Ok(())
    }

    /// Set one named boolean preference and persist it immediately.
    pub fn set_preference(&self, key: &str, value: bool) -> Result<()> {
        let mut preferences = self.load_preferences()?;
        preferences.set_bool(key, value);
        self.save_preferences(&preferences)?;

        tracing::info!("Preference {} set to {}", key, value);
        Ok(())
    }

    /// Load the tool configuration.
    ///
    /// Sources, lowest priority first: built-in defaults, `launchpad.yaml` (optional),
    /// `LAUNCHPAD_*` environment variables with `__` separating nested keys.
    pub fn load_app_config(&self) -> Result<AppConfig> {
        self.build_app_config(config::Environment::with_prefix(ENV_PREFIX))
    }

    fn build_app_config(&self, environment: config::Environment) -> Result<AppConfig> {
        if !self.app_config_path.exists() {
            tracing::debug!(
                "Tool config not found at {}, using defaults and environment",
                self.app_config_path
            );
        }

        let layered = config::Config::builder()
            .add_source(
                config::File::new(self.app_config_path.as_str(), config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                environment
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load tool config: {}", self.app_config_path))?;

        let app_config: AppConfig = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse tool config: {}", self.app_config_path))?;

        Ok(app_config)
    }

    /// Save the tool configuration (used to write a starter `launchpad.yaml`).
    pub fn save_app_config(&self, app_config: &AppConfig) -> Result<()> {
        let yaml_string = serde_yaml_ng::to_string(app_config)
            .context("Failed to serialize tool config to YAML")?;

        fs::write(&self.app_config_path, yaml_string)
            .with_context(|| format!("Failed to write tool config: {}", self.app_config_path))?;

        tracing::info!("Saved tool config to {}", self.app_config_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}
