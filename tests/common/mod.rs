//! Shared fixtures for the integration tests: a temporary project tree and hand-written
//! host fakes.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use launchpad_exporter::host::{
    AssetEntry, AssetPackagingBackend, CompilerHost, DirtyDocument, PromptChoice,
    RuntimeLauncher, SubEditorContext, UnsavedResourceEnumerator,
};
use launchpad_exporter::models::{ExportSettings, PlatformTarget, ProjectLayout};
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

/// A project directory with the default layout under a temp dir
pub struct TestProject {
    _temp_dir: TempDir,
    pub root: Utf8PathBuf,
    pub layout: ProjectLayout,
    pub output_dir: Utf8PathBuf,
}

impl TestProject {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let root = base.join("project");
        let output_dir = base.join("out");

        let layout = ProjectLayout::new(&root);
        fs::create_dir_all(&layout.assets_dir).unwrap();
        fs::create_dir_all(&layout.build_output_dir).unwrap();

        Self {
            _temp_dir: temp_dir,
            root,
            layout,
            output_dir,
        }
    }

    /// Put a compiled binary for `unit` into the build output
    pub fn add_assembly(&self, unit: &str) {
        fs::write(
            self.layout.build_output_dir.join(format!("{}.dll", unit)),
            format!("binary of {}", unit),
        )
        .unwrap();
    }

    pub fn add_debug_symbols(&self, unit: &str) {
        fs::write(
            self.layout.build_output_dir.join(format!("{}.pdb", unit)),
            "symbols",
        )
        .unwrap();
    }

    /// Write a project-relative file, creating parents
    pub fn write(&self, relative: &str, contents: &str) -> Utf8PathBuf {
        let path = self.root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    /// Settings that pass validation and publish into this project's output dir
    pub fn settings(&self, assemblies: &[&str]) -> ExportSettings {
        ExportSettings {
            name: "Foo".to_string(),
            author: "Bar".to_string(),
            version: "1.0.0".to_string(),
            description: "d".to_string(),
            output_directory: Some(self.output_dir.clone()),
            assemblies: assemblies.iter().map(|a| a.to_string()).collect(),
            ..ExportSettings::default()
        }
    }

    pub fn published(&self, name: &str) -> Utf8PathBuf {
        self.output_dir.join(name)
    }
}

/// Compiler host whose liveness flag and recompile answer are set by the test
#[derive(Default)]
pub struct FakeCompiler {
    pub compiling: AtomicBool,
    pub accept_recompile: AtomicBool,
    pub recompile_requests: AtomicUsize,
}

impl FakeCompiler {
    pub fn accepting() -> Self {
        let compiler = Self::default();
        compiler.accept_recompile.store(true, Ordering::SeqCst);
        compiler
    }

    pub fn set_compiling(&self, compiling: bool) {
        self.compiling.store(compiling, Ordering::SeqCst);
    }
}

impl CompilerHost for FakeCompiler {
    fn is_compiling(&self) -> bool {
        self.compiling.load(Ordering::SeqCst)
    }

    fn request_recompile(&self) -> bool {
        self.recompile_requests.fetch_add(1, Ordering::SeqCst);
        self.accept_recompile.load(Ordering::SeqCst)
    }
}

/// Editor state with scripted dirty documents and prompt answers
pub struct FakeEditor {
    pub documents: Mutex<Vec<DirtyDocument>>,
    pub sub_editor: Mutex<Option<SubEditorContext>>,
    pub accept_document_prompt: bool,
    pub sub_editor_choice: PromptChoice,
    pub persisted: AtomicBool,
}

impl FakeEditor {
    pub fn clean() -> Self {
        Self {
            documents: Mutex::new(Vec::new()),
            sub_editor: Mutex::new(None),
            accept_document_prompt: true,
            sub_editor_choice: PromptChoice::Save,
            persisted: AtomicBool::new(false),
        }
    }

    /// One unsaved document; the save prompt is cancelled
    pub fn cancelling() -> Self {
        Self {
            documents: Mutex::new(vec![DirtyDocument {
                name: "Main".to_string(),
                path: Some("Assets/Scenes/Main.unity".to_string()),
            }]),
            accept_document_prompt: false,
            ..Self::clean()
        }
    }
}

impl UnsavedResourceEnumerator for FakeEditor {
    fn dirty_documents(&self) -> Vec<DirtyDocument> {
        self.documents.lock().unwrap().clone()
    }

    fn active_sub_editor(&self) -> Option<SubEditorContext> {
        self.sub_editor.lock().unwrap().clone()
    }

    fn dirty_assets(&self) -> Vec<String> {
        Vec::new()
    }

    fn save_documents_with_prompt(&self) -> bool {
        if self.accept_document_prompt {
            self.documents.lock().unwrap().clear();
        }
        self.accept_document_prompt
    }

    fn prompt_sub_editor_save(&self, _context: &SubEditorContext) -> PromptChoice {
        self.sub_editor_choice
    }

    fn save_sub_editor(&self, _context: &SubEditorContext) -> Result<()> {
        if let Some(context) = self.sub_editor.lock().unwrap().as_mut() {
            context.is_dirty = false;
        }
        Ok(())
    }

    fn persist_dirty_assets(&self) -> Result<()> {
        self.persisted.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Packager that records tags and writes one bundle file per build
#[derive(Default)]
pub struct FakePackager {
    pub assets: Vec<AssetEntry>,
    pub tags: Mutex<Vec<(String, String, String)>>,
    pub builds: AtomicUsize,
    pub fail_build: bool,
}

impl FakePackager {
    pub fn with_assets(assets: Vec<AssetEntry>) -> Self {
        Self {
            assets,
            ..Self::default()
        }
    }
}

#[async_trait]
impl AssetPackagingBackend for FakePackager {
    fn eligible_assets(&self) -> Result<Vec<AssetEntry>> {
        Ok(self.assets.clone())
    }

    fn tag_asset(&self, asset: &AssetEntry, bundle: &str, variant: &str) -> Result<()> {
        self.tags.lock().unwrap().push((
            asset.path.clone(),
            bundle.to_string(),
            variant.to_string(),
        ));
        Ok(())
    }

    async fn build_bundles(
        &self,
        output_dir: &Utf8Path,
        platform: PlatformTarget,
    ) -> Result<usize> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if self.fail_build {
            anyhow::bail!("packager crashed");
        }
        fs::write(output_dir.join("foo.bundle"), platform.directory_name())?;
        Ok(1)
    }
}

/// Launcher that records launches instead of starting processes
#[derive(Default)]
pub struct FakeLauncher {
    pub launches: Mutex<Vec<(Utf8PathBuf, String)>>,
}

#[async_trait]
impl RuntimeLauncher for FakeLauncher {
    async fn launch(&self, executable: &Utf8Path, arguments: &str) -> Result<u32> {
        self.launches
            .lock()
            .unwrap()
            .push((executable.to_path_buf(), arguments.to_string()));
        Ok(1234)
    }
}
