//! The contract every dialect wrapper implements.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::WrapperError;

/// Optional engine behaviors a dialect supports or requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Inputs must be hashed directly (no preprocessor equivalence exists
    /// for this dialect). The engine hashes input and implicit-input file
    /// contents instead of preprocessed text.
    ForceDirectMode,

    /// Cached artifacts may be materialized as hard links. Only effective
    /// when the store keeps blobs uncompressed.
    HardLinks,
}

/// An artifact the real compiler is expected to produce.
///
/// `required` means absence after a successful compile is a wrapper error;
/// optional files are captured if present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedFile {
    /// Absolute or working-directory-relative path of the artifact.
    pub path: PathBuf,
    /// Whether the compile must produce this file.
    pub required: bool,
}

impl ExpectedFile {
    /// An artifact that must exist after a successful compile.
    pub fn required(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            required: true,
        }
    }

    /// An artifact that is captured only if present.
    pub fn optional(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            required: false,
        }
    }
}

/// The per-dialect wrapper contract.
///
/// A wrapper is a per-invocation value: it is constructed with the
/// executable identity and raw argv, lives for one cache decision, and is
/// discarded. Operations that probe the compiler memoize their results so
/// the compiler is consulted at most once per operation.
///
/// Lifecycle: the dispatcher gates on [`can_handle_command`], the engine
/// then calls [`resolve_args`] once, and afterwards the remaining
/// operations in any order.
///
/// [`can_handle_command`]: ProgramWrapper::can_handle_command
/// [`resolve_args`]: ProgramWrapper::resolve_args
pub trait ProgramWrapper {
    /// The dialect name used in diagnostics (`"gcc"`, `"rust"`, ...).
    fn dialect(&self) -> &'static str;

    /// Returns `true` if this dialect matches the invoked executable.
    /// Pure and side-effect free; inspects only the resolved basename.
    fn can_handle_command(&self) -> bool;

    /// Parses the raw argv into the classified argument list, expanding
    /// response files and performing dialect-specific rewrites. Fails if a
    /// mandatory option is missing or any option is unsupported.
    fn resolve_args(&mut self) -> Result<(), WrapperError>;

    /// Declares optional engine behaviors this dialect supports or requires.
    fn get_capabilities(&self) -> Vec<Capability> {
        Vec::new()
    }

    /// Returns a stable identifier for the compiler binary: at minimum a
    /// format-version tag plus the compiler's self-reported version.
    fn get_program_id(&mut self) -> Result<String, WrapperError>;

    /// Returns the canonical argument projection whose change should
    /// invalidate the cache. A pure function of the classified list.
    fn get_relevant_arguments(&self) -> Vec<String>;

    /// Returns the environment variables whose change should invalidate
    /// the cache. Empty for most dialects.
    fn get_relevant_env_vars(&mut self) -> Result<BTreeMap<String, String>, WrapperError> {
        Ok(BTreeMap::new())
    }

    /// Files whose contents are hashed into the fingerprint directly:
    /// explicit source inputs and extern libraries.
    fn get_input_files(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Files discovered by consulting the compiler (dep-info for rustc).
    /// Sorted; empty for preprocess-first dialects.
    fn get_implicit_input_files(&mut self) -> Result<Vec<PathBuf>, WrapperError> {
        Ok(Vec::new())
    }

    /// Produces the preprocessed form of the primary translation unit.
    /// Only preprocess-first dialects implement this.
    fn preprocess_source(&mut self) -> Result<Vec<u8>, WrapperError> {
        Err(WrapperError::Unsupported {
            dialect: self.dialect(),
            reason: "this dialect does not support preprocessing".to_string(),
        })
    }

    /// Enumerates the artifacts the real compiler is expected to write,
    /// keyed by stable logical names.
    fn get_build_files(&mut self) -> Result<BTreeMap<String, ExpectedFile>, WrapperError>;
}
