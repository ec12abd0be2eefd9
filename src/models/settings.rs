use crate::models::metadata::{MirroredField, MirroredFields};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default version given to a freshly created settings record
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Bit set selecting which kinds of content an export includes
///
/// The bit values match the persisted settings format, so existing
/// `ExportSettings.yaml` files keep their meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentTypes(u8);

impl ContentTypes {
    pub const NONE: Self = Self(0);
    pub const ASSEMBLIES: Self = Self(2);
    pub const PREFABS: Self = Self(4);
    pub const SCENES: Self = Self(8);
    pub const ALL: Self = Self(2 | 4 | 8);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 & Self::ALL.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl Default for ContentTypes {
    fn default() -> Self {
        Self::ALL
    }
}

impl std::ops::BitOr for ContentTypes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for ContentTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::ASSEMBLIES) {
            names.push("assemblies");
        }
        if self.contains(Self::PREFABS) {
            names.push("prefabs");
        }
        if self.contains(Self::SCENES) {
            names.push("scenes");
        }

        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// Reasons a settings record cannot be exported
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("All mod details must be specified: {0} is empty")]
    MissingDetail(&'static str),

    #[error("Name \"{0}\" cannot be used as a folder name")]
    UnsafeName(String),

    #[error("Output directory is not set")]
    MissingOutputDirectory,

    #[error("You must include some content in your mod")]
    NoContent,
}

/// Characters that are not portable in a file name
const RESERVED_NAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Whether `name` is a single plain folder name
///
/// The mod name becomes the workspace and published directory names, so it must be
/// exactly one normal path component.
fn is_folder_name(name: &str) -> bool {
    if name != name.trim()
        || name.starts_with('.')
        || name.chars().any(|c| c.is_control() || RESERVED_NAME_CHARS.contains(&c))
    {
        return false;
    }

    let mut components = Utf8Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Utf8Component::Normal(part)), None) if part == name
    )
}

/// Persisted export settings for one mod
///
/// This is the internal side of the mirrored metadata: Name, Author and
/// Version are kept in step with the mod's About document by the
/// [`MetadataSynchronizer`](crate::services::MetadataSynchronizer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ExportSettings {
    pub name: String,
    pub author: String,
    pub version: String,
    pub description: String,
    pub tags: String,
    pub workshop_handle: String,

    pub output_directory: Option<Utf8PathBuf>,
    pub external_runtime_directory: Option<Utf8PathBuf>,
    pub runtime_arguments: String,

    /// Assembly unit names or paths to `.asmdef` files, in export order
    pub assemblies: Vec<String>,

    /// Project-relative files and directories copied straight into the mod root
    pub artifacts: Vec<String>,

    pub content_types: ContentTypes,
    pub include_debug_symbols: bool,

    /// Mirrored into the `DEVELOPMENT_BUILD` scripting define
    pub development_build: bool,

    /// Make the launched runtime wait for a managed debugger; needs `development_build`
    pub wait_for_debugger: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            author: String::new(),
            version: DEFAULT_VERSION.to_string(),
            description: String::new(),
            tags: String::new(),
            workshop_handle: String::new(),
            output_directory: None,
            external_runtime_directory: None,
            runtime_arguments: String::new(),
            assemblies: Vec::new(),
            artifacts: Vec::new(),
            content_types: ContentTypes::ALL,
            include_debug_symbols: false,
            development_build: false,
            wait_for_debugger: false,
        }
    }
}

impl ExportSettings {
    /// Build the settings a project starts with before anything was saved
    ///
    /// The name comes from the project folder and the author from the
    /// current user, falling back to "Unknown".
    pub fn for_project(project_root: &Utf8Path) -> Self {
        let name = project_root
            .canonicalize_utf8()
            .ok()
            .and_then(|p| p.file_name().map(str::to_string))
            .or_else(|| project_root.file_name().map(str::to_string))
            .unwrap_or_default();

        let author = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "Unknown".to_string());

        Self {
            name,
            author,
            ..Self::default()
        }
    }

    /// Check that the record can drive an export
    ///
    /// Runs before any side effect; the first problem found is reported.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let details = [
            ("Name", &self.name),
            ("Author", &self.author),
            ("Version", &self.version),
            ("Description", &self.description),
        ];

        for (label, value) in details {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingDetail(label));
            }
        }

        if !is_folder_name(&self.name) {
            return Err(ValidationError::UnsafeName(self.name.clone()));
        }

        if self.content_types.is_empty() {
            return Err(ValidationError::NoContent);
        }

        match &self.output_directory {
            Some(dir) if !dir.as_str().trim().is_empty() => Ok(()),
            _ => Err(ValidationError::MissingOutputDirectory),
        }
    }

    /// Problems that do not block an export
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.development_build && !self.include_debug_symbols {
            warnings.push(
                "Development build is enabled but debug symbols are not included; \
                 attached debuggers will not resolve mod code"
                    .to_string(),
            );
        }
        warnings
    }

    /// Whether the launched runtime should wait for a debugger to attach
    pub fn waits_for_debugger(&self) -> bool {
        self.development_build && self.wait_for_debugger
    }

    /// Identifier every packaged asset is tagged with
    pub fn bundle_identifier(&self) -> &str {
        &self.name
    }

    /// The three fields mirrored into the About document
    pub fn mirrored_fields(&self) -> MirroredFields {
        MirroredFields {
            name: self.name.clone(),
            author: self.author.clone(),
            version: self.version.clone(),
        }
    }

    pub fn set_mirrored(&mut self, field: MirroredField, value: impl Into<String>) {
        let value = value.into();
        match field {
            MirroredField::Name => self.name = value,
            MirroredField::Author => self.author = value,
            MirroredField::Version => self.version = value,
        }
    }
}
