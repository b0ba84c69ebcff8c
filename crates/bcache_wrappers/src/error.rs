//! Error taxonomy for the wrapper layer.
//!
//! "No wrapper claims this command" is not an error; the dispatcher models
//! it by returning `None`. Everything else a wrapper can report is one of
//! the variants below. `Unsupported` and `Probe` are recoverable: the
//! engine degrades them to a pass-through execution of the real compiler.

use std::path::PathBuf;

/// Errors reported by dialect wrappers.
#[derive(Debug, thiserror::Error)]
pub enum WrapperError {
    /// The invocation cannot be cached: an unsupported or unhandled flag,
    /// a missing required field, or a violated constraint.
    #[error("{dialect}: unsupported invocation: {reason}")]
    Unsupported {
        /// The dialect that declined the invocation.
        dialect: &'static str,
        /// What was wrong, suitable for a user-facing diagnostic.
        reason: String,
    },

    /// A child compiler probe (version, file names, dep-info) failed or
    /// produced no output.
    #[error("{dialect}: probe failed: {reason}")]
    Probe {
        /// The dialect whose probe failed.
        dialect: &'static str,
        /// What failed.
        reason: String,
    },

    /// Predicted outputs disagree with what the compiler actually wrote.
    /// The compile result is still valid; the entry must not be cached.
    #[error("{dialect}: internal inconsistency: {reason}")]
    Inconsistent {
        /// The dialect that made the wrong prediction.
        dialect: &'static str,
        /// The disagreement.
        reason: String,
    },

    /// An I/O error while reading an input, response file, or probe output.
    #[error("{dialect}: I/O error at {path}: {source}")]
    Io {
        /// The dialect performing the operation.
        dialect: &'static str,
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

impl WrapperError {
    /// Returns `true` if the engine should fall back to running the real
    /// compiler without caching.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WrapperError::Unsupported { .. } | WrapperError::Probe { .. }
        )
    }
}
