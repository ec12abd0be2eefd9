//! Host implementations for running the pipeline from the command line.
//!
//! Outside an interactive editor there is nothing to prompt for and no live compiler, so:
//!
//! - [`CommandCompilerHost`] runs a configured build command and turns its MSBuild-style
//!   diagnostics into per-unit [`CompilerEvent`]s
//! - [`CleanWorkspace`] reports no unsaved state
//! - [`ProjectAssetBackend`] scans the assets directory, records tags in a YAML manifest and
//!   hands the manifest to an optional packager command
//! - [`ProcessLauncher`] starts the runtime with `tokio::process`

use super::{
    AssetEntry, AssetKind, AssetPackagingBackend, CompilerEvent, CompilerHost, CompilerMessage,
    DirtyDocument, MessageSeverity, PromptChoice, RuntimeLauncher, SubEditorContext,
    UnsavedResourceEnumerator,
};
use crate::models::{CommandSpec, PlatformTarget};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::process::Command;
use tokio::sync::mpsc;
use walkdir::WalkDir;

/// Unit name used for diagnostics that carry no project attribution
pub const DEFAULT_UNIT: &str = "build";

/// Compiler host backed by an external build command
///
/// Each recompile request runs the command once. Diagnostics are grouped by the project
/// named in the trailing `[...]` of each line, falling back to [`DEFAULT_UNIT`].
pub struct CommandCompilerHost {
    command: Option<CommandSpec>,
    working_dir: Utf8PathBuf,
    compiling: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<CompilerEvent>,
    /// Matches `File.cs(12,5): error CS0246: message [Project.csproj]`
    diagnostic_pattern: Regex,
}

impl CommandCompilerHost {
    /// Create the host together with the receiving end of its event channel
    pub fn new(
        command: Option<CommandSpec>,
        working_dir: impl Into<Utf8PathBuf>,
    ) -> (Self, mpsc::UnboundedReceiver<CompilerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let host = Self {
            command,
            working_dir: working_dir.into(),
            compiling: Arc::new(AtomicBool::new(false)),
            events,
            diagnostic_pattern: Regex::new(
                r"(?m)^\s*(?:[^\r\n(]+\(\d+,\d+\)\s*:\s*)?(?P<severity>error|warning)\s+(?P<code>[A-Za-z]+\d+)\s*:\s*(?P<message>[^\r\n\[]*?)\s*(?:\[(?P<project>[^\]\r\n]+)\])?\s*$",
            )
            .expect("Invalid diagnostic regex"),
        };
        (host, rx)
    }

    /// Group the diagnostics in build output by unit, in order of first appearance
    pub fn parse_diagnostics(&self, output: &str) -> IndexMap<String, Vec<CompilerMessage>> {
        let mut units: IndexMap<String, Vec<CompilerMessage>> = IndexMap::new();

        for caps in self.diagnostic_pattern.captures_iter(output) {
            let severity = match &caps["severity"] {
                "error" => MessageSeverity::Error,
                _ => MessageSeverity::Warning,
            };
            let unit = caps
                .name("project")
                .and_then(|p| Utf8Path::new(p.as_str().trim()).file_stem().map(str::to_string))
                .unwrap_or_else(|| DEFAULT_UNIT.to_string());
            let message = CompilerMessage {
                severity,
                message: format!("{}: {}", &caps["code"], &caps["message"]),
            };

            let messages = units.entry(unit).or_default();
            // MSBuild repeats every diagnostic in its summary
            if !messages.contains(&message) {
                messages.push(message);
            }
        }

        units
    }

    async fn run_build(
        command: CommandSpec,
        working_dir: Utf8PathBuf,
    ) -> Result<(bool, String)> {
        tracing::info!("Executing: {} {}", command.program, command.args.join(" "));
        let start = Instant::now();

        let output = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&working_dir)
            .output()
            .await
            .with_context(|| format!("Failed to run build command {}", command.program))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push('\n');
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        tracing::info!(
            "Build command completed in {:.2}s with exit code {}",
            start.elapsed().as_secs_f32(),
            output.status.code().unwrap_or(-1)
        );

        Ok((output.status.success(), text))
    }

    fn events_for(&self, succeeded: bool, output: &str) -> Vec<CompilerEvent> {
        let mut units = self.parse_diagnostics(output);

        if !succeeded && !units.values().flatten().any(CompilerMessage::is_error) {
            units
                .entry(DEFAULT_UNIT.to_string())
                .or_default()
                .push(CompilerMessage::error("build command failed without diagnostics"));
        }
        if units.is_empty() {
            units.insert(DEFAULT_UNIT.to_string(), Vec::new());
        }

        units
            .into_iter()
            .map(|(unit, messages)| CompilerEvent::UnitCompiled { unit, messages })
            .chain(std::iter::once(CompilerEvent::PassCompleted))
            .collect()
    }
}

impl CompilerHost for CommandCompilerHost {
    fn is_compiling(&self) -> bool {
        self.compiling.load(Ordering::SeqCst)
    }

    fn request_recompile(&self) -> bool {
        let Some(command) = self.command.clone() else {
            tracing::debug!("No compile command configured");
            return false;
        };

        if self.compiling.swap(true, Ordering::SeqCst) {
            return true;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("Cannot start a build outside the async runtime");
            self.compiling.store(false, Ordering::SeqCst);
            return false;
        };

        let working_dir = self.working_dir.clone();
        let compiling = Arc::clone(&self.compiling);
        let events = self.events.clone();
        let parser = Self {
            command: None,
            working_dir: working_dir.clone(),
            compiling: Arc::clone(&compiling),
            events: events.clone(),
            diagnostic_pattern: self.diagnostic_pattern.clone(),
        };

        runtime.spawn(async move {
            let batch = match Self::run_build(command, working_dir).await {
                Ok((succeeded, output)) => parser.events_for(succeeded, &output),
                Err(e) => {
                    tracing::error!("Build failed to run: {:#}", e);
                    vec![
                        CompilerEvent::UnitCompiled {
                            unit: DEFAULT_UNIT.to_string(),
                            messages: vec![CompilerMessage::error(format!("{:#}", e))],
                        },
                        CompilerEvent::PassCompleted,
                    ]
                }
            };

            compiling.store(false, Ordering::SeqCst);
            for event in batch {
                if events.send(event).is_err() {
                    tracing::debug!("Compiler event receiver dropped");
                    break;
                }
            }
        });

        true
    }
}

/// Unsaved-state enumerator for non-interactive runs: nothing is ever dirty
#[derive(Debug, Default, Clone, Copy)]
pub struct CleanWorkspace;

impl UnsavedResourceEnumerator for CleanWorkspace {
    fn dirty_documents(&self) -> Vec<DirtyDocument> {
        Vec::new()
    }

    fn active_sub_editor(&self) -> Option<SubEditorContext> {
        None
    }

    fn dirty_assets(&self) -> Vec<String> {
        Vec::new()
    }

    fn save_documents_with_prompt(&self) -> bool {
        true
    }

    fn prompt_sub_editor_save(&self, _context: &SubEditorContext) -> PromptChoice {
        PromptChoice::Save
    }

    fn save_sub_editor(&self, _context: &SubEditorContext) -> Result<()> {
        Ok(())
    }

    fn persist_dirty_assets(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct BundleManifest<'a> {
    platform: &'a str,
    output: &'a str,
    /// bundle -> variant -> asset paths
    bundles: IndexMap<String, IndexMap<String, Vec<String>>>,
}

/// Asset backend that scans the project's assets directory
pub struct ProjectAssetBackend {
    project_root: Utf8PathBuf,
    assets_dir: Utf8PathBuf,
    manifest_path: Utf8PathBuf,
    packager: Option<CommandSpec>,
    /// asset path -> (bundle, variant)
    tags: Mutex<IndexMap<String, (String, String)>>,
}

impl ProjectAssetBackend {
    pub fn new(
        project_root: impl Into<Utf8PathBuf>,
        assets_dir: impl Into<Utf8PathBuf>,
        manifest_path: impl Into<Utf8PathBuf>,
        packager: Option<CommandSpec>,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            assets_dir: assets_dir.into(),
            manifest_path: manifest_path.into(),
            packager,
            tags: Mutex::new(IndexMap::new()),
        }
    }

    fn kind_of(path: &Utf8Path) -> Option<AssetKind> {
        match path.extension()?.to_ascii_lowercase().as_str() {
            "prefab" | "asset" => Some(AssetKind::General),
            "unity" => Some(AssetKind::Scene),
            _ => None,
        }
    }

    fn write_manifest(&self, output_dir: &Utf8Path, platform: PlatformTarget) -> Result<()> {
        // Each build consumes the tags recorded since the previous one
        let tags = std::mem::take(&mut *self.tags.lock().unwrap_or_else(PoisonError::into_inner));

        let mut bundles: IndexMap<String, IndexMap<String, Vec<String>>> = IndexMap::new();
        for (asset, (bundle, variant)) in tags {
            bundles
                .entry(bundle)
                .or_default()
                .entry(variant)
                .or_default()
                .push(asset);
        }

        let manifest = BundleManifest {
            platform: platform.directory_name(),
            output: output_dir.as_str(),
            bundles,
        };
        let yaml_string =
            serde_yaml_ng::to_string(&manifest).context("Failed to serialize bundle manifest")?;

        if let Some(parent) = self.manifest_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent))?;
        }
        fs::write(&self.manifest_path, yaml_string)
            .with_context(|| format!("Failed to write bundle manifest: {}", self.manifest_path))?;
        Ok(())
    }

    /// Bundles in `output_dir`, not counting the packager's `.manifest` sidecars
    fn count_bundles(output_dir: &Utf8Path) -> Result<usize> {
        let entries = fs::read_dir(output_dir)
            .with_context(|| format!("Failed to read bundle output: {}", output_dir))?;

        let mut count = 0;
        for entry in entries {
            let path = entry?.path();
            let is_manifest = path.extension().is_some_and(|ext| ext == "manifest");
            if path.is_file() && !is_manifest {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl AssetPackagingBackend for ProjectAssetBackend {
    fn eligible_assets(&self) -> Result<Vec<AssetEntry>> {
        let mut assets = Vec::new();

        if !self.assets_dir.exists() {
            tracing::warn!("Assets directory not found: {}", self.assets_dir);
            return Ok(assets);
        }

        for entry in WalkDir::new(&self.assets_dir).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to scan {}", self.assets_dir))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(path) = Utf8Path::from_path(entry.path()) else {
                continue;
            };
            let Some(kind) = Self::kind_of(path) else {
                continue;
            };

            let relative = path.strip_prefix(&self.project_root).unwrap_or(path);
            let normalized = relative.as_str().replace('\\', "/");
            assets.push(AssetEntry::new(normalized, kind));
        }

        Ok(assets)
    }

    fn tag_asset(&self, asset: &AssetEntry, bundle: &str, variant: &str) -> Result<()> {
        let mut tags = self.tags.lock().unwrap_or_else(PoisonError::into_inner);
        tags.insert(asset.path.clone(), (bundle.to_string(), variant.to_string()));
        Ok(())
    }

    async fn build_bundles(
        &self,
        output_dir: &Utf8Path,
        platform: PlatformTarget,
    ) -> Result<usize> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create bundle output: {}", output_dir))?;
        self.write_manifest(output_dir, platform)?;

        let Some(packager) = &self.packager else {
            tracing::warn!(
                "No packager command configured; tags written to {} but no bundles built",
                self.manifest_path
            );
            return Ok(0);
        };

        let args: Vec<String> = packager
            .args
            .iter()
            .map(|arg| {
                arg.replace("{manifest}", self.manifest_path.as_str())
                    .replace("{output}", output_dir.as_str())
                    .replace("{platform}", platform.directory_name())
            })
            .collect();

        tracing::info!("Executing: {} {}", packager.program, args.join(" "));
        let status = Command::new(&packager.program)
            .args(&args)
            .current_dir(&self.project_root)
            .status()
            .await
            .with_context(|| format!("Failed to run packager {}", packager.program))?;

        if !status.success() {
            bail!(
                "Packager {} exited with code {}",
                packager.program,
                status.code().unwrap_or(-1)
            );
        }

        Self::count_bundles(output_dir)
    }
}

/// Starts the runtime executable as a detached child process
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

#[async_trait]
impl RuntimeLauncher for ProcessLauncher {
    async fn launch(&self, executable: &Utf8Path, arguments: &str) -> Result<u32> {
        let mut command = Command::new(executable);
        command.args(arguments.split_whitespace());
        if let Some(dir) = executable.parent() {
            command.current_dir(dir);
        }

        let child = command
            .spawn()
            .with_context(|| format!("Failed to start {}", executable))?;
        let pid = child.id().unwrap_or_default();

        tracing::info!("Started {} (pid {}) with arguments: {}", executable, pid, arguments);
        Ok(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BUILD_OUTPUT: &str = "\
Assets/Scripts/Door.cs(12,5): error CS0246: The type or namespace name 'Foo' could not be found [/p/Game.Scripts.csproj]
Assets/Scripts/Door.cs(20,1): warning CS0618: 'Bar' is obsolete [/p/Game.Scripts.csproj]
Assets/Editor/Tool.cs(3,3): warning CS0168: unused variable [/p/Game.Editor.csproj]
Build FAILED.
Assets/Scripts/Door.cs(12,5): error CS0246: The type or namespace name 'Foo' could not be found [/p/Game.Scripts.csproj]
";

    #[test]
    fn test_parse_diagnostics_groups_by_project() {
        let (host, _rx) = CommandCompilerHost::new(None, ".");
        let units = host.parse_diagnostics(BUILD_OUTPUT);

        assert_eq!(units.len(), 2);
        let scripts = &units["Game.Scripts"];
        assert_eq!(scripts.len(), 2);
        assert!(scripts[0].is_error());
        assert!(scripts[0].message.starts_with("CS0246:"));
        assert!(!units["Game.Editor"][0].is_error());
    }

    #[test]
    fn test_failed_build_without_diagnostics_reports_error() {
        let (host, _rx) = CommandCompilerHost::new(None, ".");
        let events = host.events_for(false, "something went wrong\n");

        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            CompilerEvent::UnitCompiled { unit, messages } if unit == DEFAULT_UNIT && messages[0].is_error()
        ));
        assert_eq!(events[1], CompilerEvent::PassCompleted);
    }

    #[test]
    fn test_request_without_command_schedules_nothing() {
        let (host, _rx) = CommandCompilerHost::new(None, ".");
        assert!(!host.request_recompile());
        assert!(!host.is_compiling());
    }

    #[test]
    fn test_eligible_assets_scan() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let assets = root.join("Assets");
        fs::create_dir_all(assets.join("Prefabs")).unwrap();
        fs::create_dir_all(assets.join("Scenes")).unwrap();
        fs::write(assets.join("Prefabs/Door.prefab"), "").unwrap();
        fs::write(assets.join("Prefabs/Door.prefab.meta"), "").unwrap();
        fs::write(assets.join("Scenes/Main.unity"), "").unwrap();
        fs::write(assets.join("readme.txt"), "").unwrap();

        let backend = ProjectAssetBackend::new(&root, &assets, root.join("Temp/manifest.yaml"), None);
        let found = backend.eligible_assets().unwrap();

        assert_eq!(
            found,
            vec![
                AssetEntry::new("Assets/Prefabs/Door.prefab", AssetKind::General),
                AssetEntry::new("Assets/Scenes/Main.unity", AssetKind::Scene),
            ]
        );
    }

    #[tokio::test]
    async fn test_build_without_packager_writes_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manifest = root.join("Temp/manifest.yaml");
        let backend = ProjectAssetBackend::new(&root, root.join("Assets"), &manifest, None);

        let asset = AssetEntry::new("Assets/Prefabs/Door.prefab", AssetKind::General);
        backend.tag_asset(&asset, "Foo", "assets").unwrap();

        let count = backend
            .build_bundles(&root.join("out/StandaloneWindows"), PlatformTarget::StandaloneWindows)
            .await
            .unwrap();

        assert_eq!(count, 0);
        let written = fs::read_to_string(&manifest).unwrap();
        assert!(written.contains("platform: StandaloneWindows"));
        assert!(written.contains("Assets/Prefabs/Door.prefab"));
    }

    #[tokio::test]
    async fn test_manifest_holds_only_the_latest_build() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manifest = root.join("Temp/manifest.yaml");
        let backend = ProjectAssetBackend::new(&root, root.join("Assets"), &manifest, None);
        let output = root.join("out/StandaloneWindows");

        let window = AssetEntry::new("Assets/Prefabs/Window.prefab", AssetKind::General);
        let door = AssetEntry::new("Assets/Prefabs/Door.prefab", AssetKind::General);
        backend.tag_asset(&window, "OldName", "assets").unwrap();
        backend
            .build_bundles(&output, PlatformTarget::StandaloneWindows)
            .await
            .unwrap();

        backend.tag_asset(&door, "NewName", "assets").unwrap();
        backend
            .build_bundles(&output, PlatformTarget::StandaloneWindows)
            .await
            .unwrap();

        let written = fs::read_to_string(&manifest).unwrap();
        assert!(written.contains("NewName"));
        assert!(!written.contains("OldName"));
        assert!(!written.contains("Window.prefab"));

        backend
            .build_bundles(&output, PlatformTarget::StandaloneWindows)
            .await
            .unwrap();
        let written = fs::read_to_string(&manifest).unwrap();
        assert!(!written.contains("Door.prefab"));
    }
}
