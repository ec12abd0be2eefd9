//! Runtime launch after an export.
//!
//! The runtime executable is taken from the configured external runtime directory. When
//! none is configured, [`RuntimeLocator`] searches Steam libraries (including the extra
//! libraries listed in `libraryfolders.vdf`) and then itch.io app installs.
//!
//! Before launching, the player's `boot.config` is updated so the runtime waits for a
//! managed debugger exactly when the settings ask for it.

use crate::host::RuntimeLauncher;
use crate::models::{AppConfig, ExportSettings};
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use regex::Regex;
use std::fs;
use thiserror::Error;
use walkdir::WalkDir;

/// Directory levels searched below an itch.io apps root
const ITCH_SEARCH_DEPTH: usize = 5;

/// Player boot option that holds startup until a managed debugger attaches
pub const WAIT_FOR_DEBUGGER_KEY: &str = "wait-for-managed-debugger";

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("External runtime directory is not set and no installed runtime was found")]
    RuntimeDirectoryNotSet,

    #[error("Runtime executable not found: {0}")]
    ExecutableNotFound(Utf8PathBuf),

    #[error("Failed to start {path}: {reason}")]
    Spawn { path: Utf8PathBuf, reason: String },
}

/// Finds the runtime executable for export-and-run
#[derive(Debug, Clone)]
pub struct RuntimeLocator {
    executable: String,
    steam_app_folder: String,
    steam_roots: Vec<Utf8PathBuf>,
    itch_roots: Vec<Utf8PathBuf>,
}

impl RuntimeLocator {
    /// Locator that only honours the configured runtime directory
    pub fn new(executable: impl Into<String>, steam_app_folder: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            steam_app_folder: steam_app_folder.into(),
            steam_roots: Vec::new(),
            itch_roots: Vec::new(),
        }
    }

    pub fn from_config(app_config: &AppConfig) -> Self {
        let locator = Self::new(&app_config.runtime_executable, &app_config.steam_app_folder);
        if app_config.runtime_discovery {
            locator.with_platform_defaults()
        } else {
            locator
        }
    }

    /// Add the usual Steam and itch.io install locations of this platform
    pub fn with_platform_defaults(mut self) -> Self {
        let utf8 = |path: std::path::PathBuf| Utf8PathBuf::from_path_buf(path).ok();

        if let Some(program_files) = std::env::var_os("ProgramFiles(x86)").and_then(|p| utf8(p.into())) {
            self.steam_roots.push(program_files.join("Steam"));
        }
        if let Some(home) = dirs::home_dir().and_then(utf8) {
            self.steam_roots.push(home.join(".steam/steam"));
        }
        if let Some(data) = dirs::data_dir().and_then(utf8) {
            self.steam_roots.push(data.join("Steam"));
        }
        if let Some(config) = dirs::config_dir().and_then(utf8) {
            self.itch_roots.push(config.join("itch/apps"));
        }
        self
    }

    pub fn with_steam_root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.steam_roots.push(root.into());
        self
    }

    pub fn with_itch_root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.itch_roots.push(root.into());
        self
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Resolve the executable to launch for `settings`
    ///
    /// A configured runtime directory is authoritative; discovery only runs without one.
    pub fn locate(&self, settings: &ExportSettings) -> Result<Utf8PathBuf, LaunchError> {
        if let Some(directory) = settings
            .external_runtime_directory
            .as_deref()
            .filter(|dir| !dir.as_str().trim().is_empty())
        {
            let path = directory.join(&self.executable);
            if !path.is_file() {
                return Err(LaunchError::ExecutableNotFound(path));
            }
            return Ok(path);
        }

        if let Some(path) = self.find_steam_install() {
            tracing::info!("Found runtime in Steam library: {}", path);
            return Ok(path);
        }
        if let Some(path) = self.find_itch_install() {
            tracing::info!("Found runtime in itch.io apps: {}", path);
            return Ok(path);
        }
        Err(LaunchError::RuntimeDirectoryNotSet)
    }

    /// `steamapps` directories of every known Steam library, without duplicates
    pub fn steam_libraries(&self) -> Vec<Utf8PathBuf> {
        let path_pattern =
            Regex::new(r#"(?i)"path"\s*"([^"]+)""#).expect("Invalid library folder regex");
        let mut libraries = IndexSet::new();

        for root in &self.steam_roots {
            let default_library = root.join("steamapps");
            if default_library.is_dir() {
                libraries.insert(default_library);
            }

            let folders = root.join("config/libraryfolders.vdf");
            let Ok(text) = fs::read_to_string(&folders) else {
                continue;
            };
            for captures in path_pattern.captures_iter(&text) {
                let library = Utf8PathBuf::from(captures[1].replace(r"\\", r"\")).join("steamapps");
                if library.is_dir() {
                    libraries.insert(library);
                }
            }
        }

        libraries.into_iter().collect()
    }

    fn find_steam_install(&self) -> Option<Utf8PathBuf> {
        self.steam_libraries().into_iter().find_map(|library| {
            let path = library
                .join("common")
                .join(&self.steam_app_folder)
                .join(&self.executable);
            path.is_file().then_some(path)
        })
    }

    fn find_itch_install(&self) -> Option<Utf8PathBuf> {
        self.itch_roots.iter().filter(|root| root.is_dir()).find_map(|root| {
            WalkDir::new(root)
                .max_depth(ITCH_SEARCH_DEPTH)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_file())
                .find(|entry| {
                    entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| name.eq_ignore_ascii_case(&self.executable))
                })
                .and_then(|entry| Utf8PathBuf::from_path_buf(entry.into_path()).ok())
        })
    }
}

/// `<dir>/<stem>_Data/boot.config` of a runtime executable
pub fn boot_config_path(executable: &Utf8Path) -> Option<Utf8PathBuf> {
    let stem = executable.file_stem()?;
    Some(executable.parent()?.join(format!("{}_Data", stem)).join("boot.config"))
}

/// Set or clear the debugger wait in the runtime's boot config; true when the file changed
pub fn apply_debugger_wait(executable: &Utf8Path, wait: bool) -> anyhow::Result<bool> {
    let Some(path) = boot_config_path(executable).filter(|path| path.is_file()) else {
        if wait {
            tracing::warn!("No boot.config next to {}; cannot wait for a debugger", executable);
        }
        return Ok(false);
    };

    let text = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read boot config: {}", path))?;
    let is_wait_key =
        |line: &str| line.split('=').next().map(str::trim) == Some(WAIT_FOR_DEBUGGER_KEY);
    let entry = format!("{}=1", WAIT_FOR_DEBUGGER_KEY);

    let existing: Vec<&str> = text.lines().filter(|line| is_wait_key(*line)).collect();
    let unchanged = if wait {
        existing == [entry.as_str()]
    } else {
        existing.is_empty()
    };
    if unchanged {
        return Ok(false);
    }

    let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
    let mut lines: Vec<&str> = text.lines().filter(|line| !is_wait_key(*line)).collect();
    if wait {
        lines.push(&entry);
    }
    let mut updated = lines.join(newline);
    if !updated.is_empty() {
        updated.push_str(newline);
    }

    fs::write(&path, updated).with_context(|| format!("Failed to write boot config: {}", path))?;
    tracing::info!(
        "{} debugger wait in {}",
        if wait { "Enabled" } else { "Disabled" },
        path
    );
    Ok(true)
}

/// Start the runtime for an exported mod, returning its process id
pub async fn launch_runtime(
    launcher: &dyn RuntimeLauncher,
    locator: &RuntimeLocator,
    settings: &ExportSettings,
) -> Result<u32, LaunchError> {
    let path = locator.locate(settings)?;
    if let Err(e) = apply_debugger_wait(&path, settings.waits_for_debugger()) {
        tracing::warn!("Could not update the debugger wait: {:#}", e);
    }

    launcher
        .launch(&path, settings.runtime_arguments.trim())
        .await
        .map_err(|e| spawn_error(&path, e))
}

fn spawn_error(path: &Utf8Path, error: anyhow::Error) -> LaunchError {
    LaunchError::Spawn {
        path: path.to_path_buf(),
        reason: format!("{:#}", error),
    }
}
