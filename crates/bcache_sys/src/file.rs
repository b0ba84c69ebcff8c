//! Filesystem helpers: extension manipulation, filtered walks, scoped
//! temporary files.

use std::path::{Path, PathBuf};

use crate::error::SysError;

/// Returns the file extension, lowercased and including the leading dot,
/// or an empty string if there is none.
pub fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Returns a copy of the path with its extension replaced.
///
/// `new_ext` includes the leading dot (e.g. `".rmeta"`).
pub fn change_extension(path: &Path, new_ext: &str) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default();
    let mut name = stem.to_os_string();
    name.push(new_ext);
    path.with_file_name(name)
}

/// Returns the basename of a path as a string.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Reads a file's content.
pub fn read(path: &Path) -> Result<Vec<u8>, SysError> {
    std::fs::read(path).map_err(|e| SysError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Reads a file's content as a string (lossy).
pub fn read_to_string(path: &Path) -> Result<String, SysError> {
    read(path).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Recursively collects all regular files under `dir` whose extension
/// matches `ext` (leading dot, case-insensitive). The result is sorted.
pub fn walk_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, SysError> {
    let mut files = Vec::new();
    walk(dir, ext, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk(dir: &Path, ext: &str, files: &mut Vec<PathBuf>) -> Result<(), SysError> {
    let entries = std::fs::read_dir(dir).map_err(|e| SysError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| SysError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_dir() {
            walk(&path, ext, files)?;
        } else if extension(&path) == ext {
            files.push(path);
        }
    }
    Ok(())
}

/// A temporary file with scoped cleanup.
///
/// The file exists for the lifetime of the value and is deleted on drop,
/// regardless of how the scope exits. Used as scratch space for compiler
/// probes (e.g. rustc dep-info output).
pub struct TmpFile {
    inner: tempfile::NamedTempFile,
}

impl TmpFile {
    /// Creates a temporary file with the given suffix in the system temp
    /// directory.
    pub fn with_suffix(suffix: &str) -> Result<Self, SysError> {
        let inner = tempfile::Builder::new()
            .prefix("buildcache-")
            .suffix(suffix)
            .tempfile()
            .map_err(|e| SysError::Io {
                path: std::env::temp_dir(),
                source: e,
            })?;
        Ok(Self { inner })
    }

    /// The path of the temporary file.
    pub fn path(&self) -> &Path {
        self.inner.path()
    }
}
