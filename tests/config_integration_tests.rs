//! Integration tests for ConfigManager and configuration file handling
//!
//! These tests verify:
//! - The on-disk format of ExportSettings.yaml and Preferences.yaml
//! - Partial and hand-edited files load with defaults filled in
//! - Broken files fail with the offending path in the error
//! - Tool config round-trips through launchpad.yaml

use camino::Utf8PathBuf;
use launchpad_exporter::ConfigManager;
use launchpad_exporter::models::{
    AppConfig, CommandSpec, ContentTypes, ExportSettings, PlatformTarget, Preferences,
    WATCHER_ENABLED_KEY,
};
use std::fs;
use tempfile::TempDir;

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

#[test]
fn test_create_config_manager_creates_directory() {
    let (_temp_dir, base) = create_test_config_dir();
    let config_path = base.join("nested/.launchpad");

    let manager = ConfigManager::new(&config_path).unwrap();

    assert!(config_path.is_dir());
    assert_eq!(manager.config_dir(), &config_path);
    assert_eq!(manager.settings_path(), config_path.join("ExportSettings.yaml"));
}

#[test]
fn test_settings_file_uses_pascal_case_keys() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let settings = ExportSettings {
        name: "Foo".to_string(),
        author: "Bar".to_string(),
        content_types: ContentTypes::ASSEMBLIES | ContentTypes::SCENES,
        include_debug_symbols: true,
        ..ExportSettings::default()
    };
    manager.save_settings(&settings).unwrap();

    let yaml = fs::read_to_string(manager.settings_path()).unwrap();
    assert!(yaml.contains("Name: Foo"));
    assert!(yaml.contains("Author: Bar"));
    assert!(yaml.contains("ContentTypes: 10"));
    assert!(yaml.contains("IncludeDebugSymbols: true"));
}

#[test]
fn test_partial_settings_file_fills_defaults() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(
        manager.settings_path(),
        "Name: Foo\nOutputDirectory: /mods\nAssemblies:\n  - Foo.Scripts\n  - Assets/Scripts/Foo.Patches.asmdef\n",
    )
    .unwrap();

    let settings = manager.load_settings(&config_path).unwrap();

    assert_eq!(settings.name, "Foo");
    assert_eq!(settings.version, "1.0.0");
    assert_eq!(settings.output_directory, Some(Utf8PathBuf::from("/mods")));
    assert_eq!(settings.assemblies.len(), 2);
    assert_eq!(settings.content_types, ContentTypes::ALL);
    assert!(!settings.include_debug_symbols);
}

#[test]
fn test_content_types_read_as_bit_set() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(manager.settings_path(), "Name: Foo\nContentTypes: 4\n").unwrap();
    let settings = manager.load_settings(&config_path).unwrap();

    assert!(settings.content_types.contains(ContentTypes::PREFABS));
    assert!(!settings.content_types.contains(ContentTypes::ASSEMBLIES));
}

#[test]
fn test_malformed_settings_error_names_file() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(manager.settings_path(), "Name: [unclosed\n").unwrap();
    let err = manager.load_settings(&config_path).unwrap_err();

    let message = format!("{:#}", err);
    assert!(message.contains("Failed to parse export settings"));
    assert!(message.contains("ExportSettings.yaml"));
}

#[test]
fn test_preferences_file_is_a_flat_map() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    manager.set_preference(WATCHER_ENABLED_KEY, false).unwrap();
    manager.set_preference("Export.ConfirmOverwrite", true).unwrap();

    let yaml = fs::read_to_string(config_path.join("Preferences.yaml")).unwrap();
    assert!(yaml.contains("MetadataWatcher.Enabled: false"));

    let preferences = manager.load_preferences().unwrap();
    assert!(!preferences.watcher_enabled());
    assert!(preferences.get_bool("Export.ConfirmOverwrite", false));
}

#[test]
fn test_empty_preferences_file_uses_defaults() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(config_path.join("Preferences.yaml"), "").unwrap();

    assert_eq!(manager.load_preferences().unwrap(), Preferences::default());
    assert!(manager.load_preferences().unwrap().watcher_enabled());
}

#[test]
fn test_app_config_round_trip() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let app_config = AppConfig {
        project_root: Utf8PathBuf::from("/projects/Foo"),
        platform: PlatformTarget::StandaloneWindows64,
        compile_command: Some(CommandSpec {
            program: "dotnet".to_string(),
            args: vec!["build".to_string(), "Foo.sln".to_string()],
        }),
        data_directories: vec!["GameData".to_string()],
        ..AppConfig::default()
    };
    manager.save_app_config(&app_config).unwrap();

    let loaded = manager.load_app_config().unwrap();
    assert_eq!(loaded.project_root, "/projects/Foo");
    assert_eq!(loaded.platform, PlatformTarget::StandaloneWindows64);
    assert_eq!(loaded.compile_command, app_config.compile_command);
    assert_eq!(loaded.data_directories, vec!["GameData"]);
    assert_eq!(loaded.layout().assets_dir, "/projects/Foo/Assets");
}
