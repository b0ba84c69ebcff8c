//! Error types for system operations.

use std::path::PathBuf;

/// Errors that can occur in the process and filesystem facades.
#[derive(Debug, thiserror::Error)]
pub enum SysError {
    /// An I/O error occurred while reading or writing a file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A child process could not be spawned.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// The program that could not be started.
        program: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A command was invoked with an empty argument vector.
    #[error("cannot run an empty command line")]
    EmptyCommand,
}
