//! Executable identity: the command as invoked and its resolved location.

use std::path::{Path, PathBuf};

/// The identity of an executable being wrapped.
///
/// `literal` is the command exactly as invoked (argv[0]); it is used when the
/// same tool must be respawned under the same name. `real` is the absolute
/// path after PATH lookup and symlink resolution; it is used for capability
/// probing, so that `cc -> clang` symlinks are classified by what they point
/// at.
#[derive(Debug, Clone)]
pub struct ExePath {
    literal: PathBuf,
    real: PathBuf,
}

impl ExePath {
    /// Resolves a command string into an executable identity.
    ///
    /// Commands containing a path separator are resolved relative to the
    /// working directory; bare names are searched on `PATH`. If resolution
    /// fails the literal command doubles as the real path.
    pub fn from_command(command: &str) -> Self {
        let literal = PathBuf::from(command);
        let real = resolve(&literal).unwrap_or_else(|| literal.clone());
        Self { literal, real }
    }

    /// Creates an identity from explicit literal and real paths.
    pub fn new(literal: PathBuf, real: PathBuf) -> Self {
        Self { literal, real }
    }

    /// The command as invoked.
    pub fn literal(&self) -> &Path {
        &self.literal
    }

    /// The resolved absolute path.
    pub fn real(&self) -> &Path {
        &self.real
    }

    /// The lowercased basename of the resolved path, extension stripped.
    ///
    /// This is the string every dialect probe matches against: `CL.EXE`
    /// becomes `cl`, `/opt/bin/arm-none-eabi-gcc` becomes `arm-none-eabi-gcc`.
    pub fn command_stem(&self) -> String {
        self.real
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }
}

/// Resolves a command to an absolute path, following symlinks.
fn resolve(command: &Path) -> Option<PathBuf> {
    let candidate = if command.components().count() > 1 {
        command.to_path_buf()
    } else {
        search_path(command)?
    };
    std::fs::canonicalize(&candidate).ok()
}

/// Searches the `PATH` directories for an executable with the given name.
fn search_path(name: &Path) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}
