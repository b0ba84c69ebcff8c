//! Fingerprint assembly.
//!
//! The fingerprint is the digest that keys the cache: a deterministic
//! composition of the program ID, the relevant arguments, the relevant
//! environment, and the input contents. Two invocations with the same
//! fingerprint must be interchangeable.

use std::fmt;

use bcache_common::FingerprintHasher;

use crate::error::WrapperError;
use crate::wrapper::{Capability, ProgramWrapper};

/// Tick this if the fingerprint composition changes incompatibly: every
/// existing cache entry then misses instead of returning stale artifacts.
const FINGERPRINT_FORMAT_VERSION: &str = "1";

/// How input content enters the fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashMode {
    /// Hash the preprocessed translation unit: identical preprocessed text
    /// implies identical dependencies, so header enumeration is subsumed.
    Preprocess,
    /// Hash input and implicit-input file contents directly. Required for
    /// dialects with no preprocessor equivalence (rustc).
    Direct,
}

/// A computed invocation fingerprint (hex digest).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The digest as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Selects the hash mode from a wrapper's declared capabilities.
pub fn select_mode(capabilities: &[Capability]) -> HashMode {
    if capabilities.contains(&Capability::ForceDirectMode) {
        HashMode::Direct
    } else {
        HashMode::Preprocess
    }
}

/// Computes the fingerprint for a resolved invocation.
///
/// Composition order is fixed: format version, program ID, relevant
/// arguments, relevant environment (sorted by name), input file contents,
/// then either the preprocessed source bytes or the sorted implicit-input
/// contents depending on the mode.
pub fn compute_fingerprint(
    wrapper: &mut dyn ProgramWrapper,
) -> Result<Fingerprint, WrapperError> {
    let dialect = wrapper.dialect();
    let mode = select_mode(&wrapper.get_capabilities());

    let mut hasher = FingerprintHasher::new();
    hasher.update(FINGERPRINT_FORMAT_VERSION);
    hasher.update(wrapper.get_program_id()?);

    for arg in wrapper.get_relevant_arguments() {
        hasher.update(arg);
    }

    // BTreeMap iteration gives a stable name order.
    for (name, value) in wrapper.get_relevant_env_vars()? {
        hasher.update(format!("{name}={value}"));
    }

    for path in wrapper.get_input_files() {
        hasher.update_file(&path).map_err(|e| WrapperError::Io {
            dialect,
            path,
            source: e,
        })?;
    }

    match mode {
        HashMode::Preprocess => {
            hasher.update(wrapper.preprocess_source()?);
        }
        HashMode::Direct => {
            for path in wrapper.get_implicit_input_files()? {
                hasher.update_file(&path).map_err(|e| WrapperError::Io {
                    dialect,
                    path,
                    source: e,
                })?;
            }
        }
    }

    Ok(Fingerprint(hasher.finalize()))
}
