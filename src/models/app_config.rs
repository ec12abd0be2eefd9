use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform a bundle build targets; its name is the bundle output subdirectory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlatformTarget {
    #[default]
    StandaloneWindows,
    StandaloneWindows64,
    StandaloneLinux64,
    StandaloneOSX,
}

impl PlatformTarget {
    pub fn directory_name(self) -> &'static str {
        match self {
            Self::StandaloneWindows => "StandaloneWindows",
            Self::StandaloneWindows64 => "StandaloneWindows64",
            Self::StandaloneLinux64 => "StandaloneLinux64",
            Self::StandaloneOSX => "StandaloneOSX",
        }
    }
}

impl fmt::Display for PlatformTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.directory_name())
    }
}

/// An external command: program plus arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Tool configuration loaded from `launchpad.yaml` and `LAUNCHPAD_*` variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub project_root: Utf8PathBuf,

    // Project layout, relative to project_root
    pub assets_dir: Utf8PathBuf,
    pub build_output_dir: Utf8PathBuf,
    pub scratch_dir: Utf8PathBuf,
    pub about_file: Utf8PathBuf,

    /// Directories under assets_dir copied into the mod root
    pub data_directories: Vec<String>,

    pub platform: PlatformTarget,

    /// Build command whose output reports per-unit compiler errors
    pub compile_command: Option<CommandSpec>,

    /// Command that turns the tagged asset manifest into bundles
    pub packager_command: Option<CommandSpec>,

    /// Executable started by export-and-run, inside the runtime directory
    pub runtime_executable: String,

    /// Search Steam and itch.io installs when no runtime directory is configured
    pub runtime_discovery: bool,

    /// Folder under `steamapps/common` holding the runtime
    pub steam_app_folder: String,

    /// Project settings file holding the scripting define symbols, relative to project_root
    pub project_settings_file: Utf8PathBuf,

    /// Build target group whose define symbols follow the development build flag
    pub define_group: String,

    pub sync_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            project_root: Utf8PathBuf::from("."),
            assets_dir: Utf8PathBuf::from("Assets"),
            build_output_dir: Utf8PathBuf::from("Library/ScriptAssemblies"),
            scratch_dir: Utf8PathBuf::from("Temp"),
            about_file: Utf8PathBuf::from("Assets/About/About.xml"),
            data_directories: vec!["GameData".to_string(), "About".to_string()],
            platform: PlatformTarget::StandaloneWindows,
            compile_command: None,
            packager_command: None,
            runtime_executable: "rocketstation.exe".to_string(),
            runtime_discovery: true,
            steam_app_folder: "Stationeers".to_string(),
            project_settings_file: Utf8PathBuf::from("ProjectSettings/ProjectSettings.asset"),
            define_group: "Standalone".to_string(),
            sync_interval_ms: 500,
        }
    }
}

impl AppConfig {
    pub fn layout(&self) -> ProjectLayout {
        let root = &self.project_root;
        ProjectLayout {
            root: root.clone(),
            assets_dir: root.join(&self.assets_dir),
            build_output_dir: root.join(&self.build_output_dir),
            scratch_dir: root.join(&self.scratch_dir),
            data_directories: self.data_directories.clone(),
        }
    }

    pub fn about_path(&self) -> Utf8PathBuf {
        self.project_root.join(&self.about_file)
    }

    pub fn project_settings_path(&self) -> Utf8PathBuf {
        self.project_root.join(&self.project_settings_file)
    }
}

/// Resolved project locations the export pipeline reads from and writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub root: Utf8PathBuf,
    pub assets_dir: Utf8PathBuf,
    pub build_output_dir: Utf8PathBuf,
    pub scratch_dir: Utf8PathBuf,
    pub data_directories: Vec<String>,
}

impl ProjectLayout {
    /// Layout with the default directory names under `root`
    pub fn new(root: impl AsRef<Utf8Path>) -> Self {
        AppConfig {
            project_root: root.as_ref().to_path_buf(),
            ..AppConfig::default()
        }
        .layout()
    }

    /// Scratch workspace of a mod: `<scratch>/<name>`
    pub fn workspace_for(&self, mod_name: &str) -> Utf8PathBuf {
        self.scratch_dir.join(mod_name)
    }

    pub fn resolve(&self, project_relative: impl AsRef<Utf8Path>) -> Utf8PathBuf {
        self.root.join(project_relative)
    }
}
