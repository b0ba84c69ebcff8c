//! Error types for cache store operations.

use std::path::PathBuf;

/// Errors that can occur while writing to or extracting from the cache.
///
/// Reads are fail-safe and surface as misses; this enum covers the write
/// and materialization paths, where an error must abort the operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A blob referenced by an entry is missing from the store.
    #[error("missing cache blob {key}")]
    MissingBlob {
        /// The content key of the missing blob.
        key: String,
    },

    /// A blob's content does not match its recorded checksum.
    #[error("checksum mismatch for blob {key}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The content key of the corrupt blob.
        key: String,
        /// The checksum recorded in the entry.
        expected: String,
        /// The checksum computed from the stored content.
        actual: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display() {
        let err = StoreError::Io {
            path: PathBuf::from("/cache/entries/abc.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("cache I/O error"));
        assert!(msg.contains("abc.json"));
    }

    #[test]
    fn missing_blob_display() {
        let err = StoreError::MissingBlob {
            key: "deadbeef".to_string(),
        };
        assert!(err.to_string().contains("deadbeef"));
    }

    #[test]
    fn checksum_mismatch_display() {
        let err = StoreError::ChecksumMismatch {
            key: "k".to_string(),
            expected: "aabb".to_string(),
            actual: "ccdd".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aabb"));
        assert!(msg.contains("ccdd"));
    }
}
