//! Cache entry format.
//!
//! One entry is stored per fingerprint as `entries/<fingerprint>.json`. The
//! entry carries everything needed to replay the original compiler
//! invocation: exit code, stdout, stderr, and a map from logical output
//! names to blob records in the content-addressed store.

use std::collections::BTreeMap;
use std::path::Path;

use bcache_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Current entry format version. Increment on breaking changes; entries
/// with a different version read as misses.
pub(crate) const ENTRY_FORMAT_VERSION: u32 = 1;

/// A stored cache entry for one invocation fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Entry format version.
    pub format_version: u32,

    /// The wrapped compiler's exit code.
    pub return_code: i32,

    /// The wrapped compiler's stdout, replayed verbatim on a hit.
    pub std_out: String,

    /// The wrapped compiler's stderr, replayed verbatim on a hit.
    pub std_err: String,

    /// Output blobs keyed by the wrapper's logical file name
    /// (`"object_file"`, `"dep_file"`, an artifact filename, ...).
    pub files: BTreeMap<String, CachedFile>,
}

/// A record for one stored output blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedFile {
    /// Content key addressing the blob file.
    pub blob_key: String,

    /// Checksum of the original (uncompressed) content.
    pub checksum: ContentHash,

    /// Whether the stored payload is zlib-compressed.
    pub compressed: bool,

    /// Size of the original content in bytes.
    pub size: u64,
}

impl CacheEntry {
    /// Loads an entry from a file, returning `None` if the file doesn't
    /// exist, can't be parsed, or has an incompatible format version.
    /// This is fail-safe: any problem reads as a cache miss.
    pub fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        let entry: Self = serde_json::from_str(&content).ok()?;
        (entry.format_version == ENTRY_FORMAT_VERSION).then_some(entry)
    }

    /// Saves the entry to a file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| StoreError::Serialization {
            reason: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}
