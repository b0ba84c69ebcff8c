//! The cache backend seam.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::entry::CacheEntry;
use crate::error::StoreError;

/// The captured outcome of a real compiler run, as handed to the store.
#[derive(Debug, Clone)]
pub struct CachedResult {
    /// The compiler's exit code.
    pub return_code: i32,
    /// The compiler's stdout.
    pub std_out: String,
    /// The compiler's stderr.
    pub std_err: String,
}

/// Aggregate statistics for a cache store.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of stored entries.
    pub entry_count: usize,
    /// Number of stored blobs.
    pub blob_count: usize,
    /// Total stored blob bytes (as stored, i.e. after compression).
    pub blob_bytes: u64,
}

/// A cache store keyed by invocation fingerprint.
///
/// The engine only ever talks to this trait; local and remote stores are
/// interchangeable behind it. Lookups are fail-safe: a corrupt or
/// incompatible entry is a miss, not an error.
pub trait CacheBackend {
    /// Looks up the entry for a fingerprint.
    fn lookup(&self, fingerprint: &str) -> Option<CacheEntry>;

    /// Stores the result of a compile together with its output files.
    ///
    /// `files` maps logical output names to the paths the compiler wrote.
    /// Returns the stored entry.
    fn put(
        &self,
        fingerprint: &str,
        result: &CachedResult,
        files: &BTreeMap<String, PathBuf>,
    ) -> Result<CacheEntry, StoreError>;

    /// Materializes a stored blob at `dest`, validating its checksum.
    ///
    /// When `hard_link` is true and the blob is stored uncompressed, the
    /// destination is hard-linked to the blob instead of copied (with a
    /// silent fallback to copying).
    fn extract_blob(
        &self,
        entry: &CacheEntry,
        logical_name: &str,
        dest: &Path,
        hard_link: bool,
    ) -> Result<(), StoreError>;

    /// Returns aggregate statistics.
    fn stats(&self) -> Result<CacheStats, StoreError>;

    /// Removes all entries and blobs. Returns the number of files removed.
    fn clear(&self) -> Result<usize, StoreError>;
}
