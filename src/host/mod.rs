//! Host environment boundary.
//!
//! The export pipeline never talks to an editor, compiler or packager directly. It consumes
//! these collaborators through the traits below:
//!
//! - [`CompilerHost`]: compile liveness flag for polling and a recompile request. Per-unit
//!   results arrive separately as [`CompilerEvent`]s over a channel
//! - [`UnsavedResourceEnumerator`]: dirty documents, the active sub-editor and dirty assets,
//!   plus the save-with-prompt primitives
//! - [`AssetPackagingBackend`]: eligible asset listing, tagging and bundle building
//! - [`RuntimeLauncher`]: starts the packaged product after an export
//!
//! [`local`] provides the implementations used by the command-line tool.

pub mod local;

use crate::models::PlatformTarget;
use anyhow::Result;
use async_trait::async_trait;
use camino::Utf8Path;

pub use local::{
    CleanWorkspace, CommandCompilerHost, ProcessLauncher, ProjectAssetBackend,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Error,
    Warning,
    Info,
}

/// A single diagnostic reported for a compiled unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerMessage {
    pub severity: MessageSeverity,
    pub message: String,
}

impl CompilerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: MessageSeverity::Error,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: MessageSeverity::Warning,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == MessageSeverity::Error
    }
}

/// Discrete notifications from the host's compiler integration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilerEvent {
    UnitCompiled {
        unit: String,
        messages: Vec<CompilerMessage>,
    },
    PassCompleted,
}

#[cfg_attr(test, mockall::automock)]
pub trait CompilerHost: Send + Sync {
    /// Liveness flag sampled by the periodic poll
    fn is_compiling(&self) -> bool;

    /// Ask the host to schedule a compile cycle
    ///
    /// Returns false when nothing was scheduled.
    fn request_recompile(&self) -> bool;
}

/// An open document with unsaved modifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyDocument {
    pub name: String,
    /// `None` for documents that were never saved
    pub path: Option<String>,
}

/// An isolated editing context (such as a prefab stage) layered over the documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubEditorContext {
    pub asset_path: Option<String>,
    pub is_dirty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    Save,
    Cancel,
}

#[cfg_attr(test, mockall::automock)]
pub trait UnsavedResourceEnumerator: Send + Sync {
    fn dirty_documents(&self) -> Vec<DirtyDocument>;

    fn active_sub_editor(&self) -> Option<SubEditorContext>;

    /// Asset paths of dirty persisted objects reachable from the asset graph
    fn dirty_assets(&self) -> Vec<String>;

    /// Show the host's standard save dialog for dirty documents
    ///
    /// Returns false when the user cancelled.
    fn save_documents_with_prompt(&self) -> bool;

    fn prompt_sub_editor_save(&self, context: &SubEditorContext) -> PromptChoice;

    fn save_sub_editor(&self, context: &SubEditorContext) -> Result<()>;

    fn persist_dirty_assets(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    General,
    Scene,
}

impl AssetKind {
    /// Bundle variant label assets of this kind are tagged with
    pub fn variant(self) -> &'static str {
        match self {
            Self::General => "assets",
            Self::Scene => "scenes",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetEntry {
    pub path: String,
    pub kind: AssetKind,
}

impl AssetEntry {
    pub fn new(path: impl Into<String>, kind: AssetKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetPackagingBackend: Send + Sync {
    /// All bundle-able assets in the project, unfiltered
    fn eligible_assets(&self) -> Result<Vec<AssetEntry>>;

    fn tag_asset(&self, asset: &AssetEntry, bundle: &str, variant: &str) -> Result<()>;

    /// Build every tagged bundle into `output_dir`, returning the bundle count
    async fn build_bundles(
        &self,
        output_dir: &Utf8Path,
        platform: PlatformTarget,
    ) -> Result<usize>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuntimeLauncher: Send + Sync {
    /// Start `executable` with whitespace-separated `arguments`, returning its process id
    async fn launch(&self, executable: &Utf8Path, arguments: &str) -> Result<u32>;
}
