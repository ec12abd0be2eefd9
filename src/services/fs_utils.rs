//! Filesystem helpers for staging and publishing.
//!
//! Copies walk the source with `walkdir` and keep going past individual failures; the
//! caller decides whether a failed entry is an item-level error or fatal.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use walkdir::WalkDir;

/// Extension of the per-asset sidecar files the host writes next to every asset
pub const SIDECAR_EXTENSION: &str = "meta";

/// Outcome of a recursive copy
#[derive(Debug, Default)]
pub struct CopyReport {
    pub files_copied: usize,
    pub failures: Vec<(Utf8PathBuf, String)>,
}

impl CopyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// True for host sidecar files, which never ship with a mod
pub fn is_sidecar(path: &Utf8Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(SIDECAR_EXTENSION))
}

/// Remove a directory tree; a missing directory is not an error
pub fn remove_dir_if_exists(path: &Utf8Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Delete `path` if present and create it again, empty
pub fn recreate_dir(path: &Utf8Path) -> Result<()> {
    remove_dir_if_exists(path)
        .with_context(|| format!("Failed to remove directory: {}", path))?;
    fs::create_dir_all(path).with_context(|| format!("Failed to create directory: {}", path))?;
    Ok(())
}

/// Copy a single file, creating the destination's parent directories
pub fn copy_file(from: &Utf8Path, to: &Utf8Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent))?;
    }
    fs::copy(from, to).with_context(|| format!("Failed to copy {} to {}", from, to))?;
    Ok(())
}

/// Recursively copy `from` into `to`, skipping files for which `skip` returns true
///
/// Per-entry failures are collected in the report rather than stopping the walk.
pub fn copy_tree<F>(from: &Utf8Path, to: &Utf8Path, skip: F) -> CopyReport
where
    F: Fn(&Utf8Path) -> bool,
{
    let mut report = CopyReport::default();

    for entry in WalkDir::new(from).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .and_then(|p| Utf8Path::from_path(p))
                    .map(Utf8Path::to_path_buf)
                    .unwrap_or_else(|| from.to_path_buf());
                report.failures.push((path, e.to_string()));
                continue;
            }
        };

        let Some(source) = Utf8Path::from_path(entry.path()) else {
            report.failures.push((
                from.to_path_buf(),
                format!("non UTF-8 path: {}", entry.path().display()),
            ));
            continue;
        };

        let Ok(relative) = source.strip_prefix(from) else {
            continue;
        };
        let destination = to.join(relative);

        if entry.file_type().is_dir() {
            if let Err(e) = fs::create_dir_all(&destination) {
                report.failures.push((source.to_path_buf(), e.to_string()));
            }
            continue;
        }

        if skip(source) {
            continue;
        }

        match copy_file(source, &destination) {
            Ok(()) => report.files_copied += 1,
            Err(e) => report.failures.push((source.to_path_buf(), format!("{:#}", e))),
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_root() -> (TempDir, Utf8PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        (temp_dir, root)
    }

    #[test]
    fn test_is_sidecar() {
        assert!(is_sidecar(Utf8Path::new("Assets/GameData/items.xml.meta")));
        assert!(is_sidecar(Utf8Path::new("Assets/About.META")));
        assert!(!is_sidecar(Utf8Path::new("Assets/GameData/items.xml")));
        assert!(!is_sidecar(Utf8Path::new("Assets/metadata")));
    }

    #[test]
    fn test_copy_tree_skips_sidecars() {
        let (_temp_dir, root) = temp_root();
        let source = root.join("GameData");
        fs::create_dir_all(source.join("nested")).unwrap();
        fs::write(source.join("items.xml"), "<items/>").unwrap();
        fs::write(source.join("items.xml.meta"), "guid: 1").unwrap();
        fs::write(source.join("nested/recipes.xml"), "<recipes/>").unwrap();

        let dest = root.join("out/GameData");
        let report = copy_tree(&source, &dest, is_sidecar);

        assert!(report.is_clean());
        assert_eq!(report.files_copied, 2);
        assert!(dest.join("items.xml").exists());
        assert!(dest.join("nested/recipes.xml").exists());
        assert!(!dest.join("items.xml.meta").exists());
    }

    #[test]
    fn test_copy_tree_reports_missing_source() {
        let (_temp_dir, root) = temp_root();
        let report = copy_tree(&root.join("missing"), &root.join("dest"), |_| false);

        assert_eq!(report.files_copied, 0);
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn test_recreate_dir_empties_existing() {
        let (_temp_dir, root) = temp_root();
        let workspace = root.join("Temp/Foo");
        fs::create_dir_all(&workspace).unwrap();
        fs::write(workspace.join("stale.dll"), "old").unwrap();

        recreate_dir(&workspace).unwrap();

        assert!(workspace.exists());
        assert_eq!(fs::read_dir(&workspace).unwrap().count(), 0);
    }

    #[test]
    fn test_remove_missing_dir_is_ok() {
        let (_temp_dir, root) = temp_root();
        assert!(remove_dir_if_exists(&root.join("nope")).is_ok());
    }
}
