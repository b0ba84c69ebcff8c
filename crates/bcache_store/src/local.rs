//! Local on-disk cache store.
//!
//! Layout under the cache directory:
//!
//! ```text
//! entries/<fingerprint>.json   one entry per invocation fingerprint
//! blobs/<content-hash>.blob    content-addressed output payloads
//! ```
//!
//! Blobs are shared between entries: two invocations producing an identical
//! object file store its bytes once. Payloads are zlib-compressed unless the
//! store was opened with compression off, in which case hard-link
//! materialization becomes possible.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use bcache_common::ContentHash;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::backend::{CacheBackend, CacheStats, CachedResult};
use crate::entry::{CacheEntry, CachedFile, ENTRY_FORMAT_VERSION};
use crate::error::StoreError;

/// Subdirectory for per-fingerprint entries.
const ENTRIES_SUBDIR: &str = "entries";

/// Subdirectory for content-addressed blobs.
const BLOBS_SUBDIR: &str = "blobs";

/// File extension for blob files.
const BLOB_EXT: &str = "blob";

/// The local filesystem cache store.
pub struct LocalCacheStore {
    /// Root cache directory.
    dir: PathBuf,

    /// Whether new blob payloads are zlib-compressed.
    compress: bool,
}

impl LocalCacheStore {
    /// Opens a store rooted at the given directory.
    ///
    /// The directory is created lazily on the first write.
    pub fn new(dir: &Path, compress: bool) -> Self {
        Self {
            dir: dir.to_path_buf(),
            compress,
        }
    }

    fn entry_path(&self, fingerprint: &str) -> PathBuf {
        self.dir
            .join(ENTRIES_SUBDIR)
            .join(format!("{fingerprint}.json"))
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.dir.join(BLOBS_SUBDIR).join(format!("{key}.{BLOB_EXT}"))
    }

    /// Writes a blob for `content` if it is not already stored, returning
    /// its record.
    fn write_blob(&self, content: &[u8]) -> Result<CachedFile, StoreError> {
        let checksum = ContentHash::from_bytes(content);
        let key = checksum.to_string();
        let path = self.blob_path(&key);

        if !path.exists() {
            let blob_dir = self.dir.join(BLOBS_SUBDIR);
            std::fs::create_dir_all(&blob_dir).map_err(|e| StoreError::Io {
                path: blob_dir,
                source: e,
            })?;

            let payload = if self.compress {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder
                    .write_all(content)
                    .and_then(|()| encoder.finish())
                    .map_err(|e| StoreError::Io {
                        path: path.clone(),
                        source: e,
                    })?
            } else {
                content.to_vec()
            };

            std::fs::write(&path, payload).map_err(|e| StoreError::Io {
                path: path.clone(),
                source: e,
            })?;
        }

        Ok(CachedFile {
            blob_key: key,
            checksum,
            compressed: self.compress,
            size: content.len() as u64,
        })
    }

    /// Reads a blob's original content, decompressing and validating it.
    fn read_blob(&self, record: &CachedFile) -> Result<Vec<u8>, StoreError> {
        let path = self.blob_path(&record.blob_key);
        let stored = std::fs::read(&path).map_err(|_| StoreError::MissingBlob {
            key: record.blob_key.clone(),
        })?;

        let content = if record.compressed {
            let mut decoder = ZlibDecoder::new(stored.as_slice());
            let mut out = Vec::with_capacity(record.size as usize);
            decoder.read_to_end(&mut out).map_err(|e| StoreError::Io {
                path: path.clone(),
                source: e,
            })?;
            out
        } else {
            stored
        };

        let actual = ContentHash::from_bytes(&content);
        if actual != record.checksum {
            return Err(StoreError::ChecksumMismatch {
                key: record.blob_key.clone(),
                expected: record.checksum.to_string(),
                actual: actual.to_string(),
            });
        }

        Ok(content)
    }
}

impl CacheBackend for LocalCacheStore {
    fn lookup(&self, fingerprint: &str) -> Option<CacheEntry> {
        CacheEntry::load(&self.entry_path(fingerprint))
    }

    fn put(
        &self,
        fingerprint: &str,
        result: &CachedResult,
        files: &BTreeMap<String, PathBuf>,
    ) -> Result<CacheEntry, StoreError> {
        let mut stored_files = BTreeMap::new();
        for (logical_name, path) in files {
            let content = std::fs::read(path).map_err(|e| StoreError::Io {
                path: path.clone(),
                source: e,
            })?;
            stored_files.insert(logical_name.clone(), self.write_blob(&content)?);
        }

        let entry = CacheEntry {
            format_version: ENTRY_FORMAT_VERSION,
            return_code: result.return_code,
            std_out: result.std_out.clone(),
            std_err: result.std_err.clone(),
            files: stored_files,
        };
        entry.save(&self.entry_path(fingerprint))?;
        Ok(entry)
    }

    fn extract_blob(
        &self,
        entry: &CacheEntry,
        logical_name: &str,
        dest: &Path,
        hard_link: bool,
    ) -> Result<(), StoreError> {
        let record = entry
            .files
            .get(logical_name)
            .ok_or_else(|| StoreError::MissingBlob {
                key: logical_name.to_string(),
            })?;

        // Validates the checksum even on the hard-link path.
        let content = self.read_blob(record)?;

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        if hard_link && !record.compressed {
            let blob = self.blob_path(&record.blob_key);
            if dest.exists() {
                let _ = std::fs::remove_file(dest);
            }
            if std::fs::hard_link(&blob, dest).is_ok() {
                return Ok(());
            }
            // Cross-device or unsupported: fall through to a copy.
        }

        std::fs::write(dest, content).map_err(|e| StoreError::Io {
            path: dest.to_path_buf(),
            source: e,
        })
    }

    fn stats(&self) -> Result<CacheStats, StoreError> {
        let mut stats = CacheStats::default();

        let entries_dir = self.dir.join(ENTRIES_SUBDIR);
        if entries_dir.is_dir() {
            stats.entry_count = count_files(&entries_dir)?.0;
        }

        let blobs_dir = self.dir.join(BLOBS_SUBDIR);
        if blobs_dir.is_dir() {
            let (count, bytes) = count_files(&blobs_dir)?;
            stats.blob_count = count;
            stats.blob_bytes = bytes;
        }

        Ok(stats)
    }

    fn clear(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        for subdir in [ENTRIES_SUBDIR, BLOBS_SUBDIR] {
            let dir = self.dir.join(subdir);
            if !dir.is_dir() {
                continue;
            }
            removed += count_files(&dir)?.0;
            std::fs::remove_dir_all(&dir).map_err(|e| StoreError::Io {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(removed)
    }
}

/// Counts regular files in a directory (non-recursive) and sums their sizes.
fn count_files(dir: &Path) -> Result<(usize, u64), StoreError> {
    let mut count = 0;
    let mut bytes = 0;
    let entries = std::fs::read_dir(dir).map_err(|e| StoreError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        if entry.path().is_file() {
            count += 1;
            bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    Ok((count, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_result() -> CachedResult {
        CachedResult {
            return_code: 0,
            std_out: "compiled\n".to_string(),
            std_err: String::new(),
        }
    }

    fn write_outputs(dir: &Path) -> BTreeMap<String, PathBuf> {
        let obj = dir.join("a.o");
        std::fs::write(&obj, b"object file bytes").unwrap();
        let mut files = BTreeMap::new();
        files.insert("object_file".to_string(), obj);
        files
    }

    #[test]
    fn put_then_lookup_hits() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalCacheStore::new(&dir.path().join("cache"), true);
        let files = write_outputs(dir.path());

        store.put("fp1", &fake_result(), &files).unwrap();

        let entry = store.lookup("fp1").unwrap();
        assert_eq!(entry.return_code, 0);
        assert_eq!(entry.std_out, "compiled\n");
        assert!(entry.files.contains_key("object_file"));
    }

    #[test]
    fn lookup_unknown_fingerprint_misses() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalCacheStore::new(dir.path(), true);
        assert!(store.lookup("unseen").is_none());
    }

    #[test]
    fn extract_restores_original_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalCacheStore::new(&dir.path().join("cache"), true);
        let files = write_outputs(dir.path());

        let entry = store.put("fp1", &fake_result(), &files).unwrap();

        let dest = dir.path().join("restored").join("a.o");
        store
            .extract_blob(&entry, "object_file", &dest, false)
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"object file bytes");
    }

    #[test]
    fn extract_uncompressed_with_hard_link() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalCacheStore::new(&dir.path().join("cache"), false);
        let files = write_outputs(dir.path());

        let entry = store.put("fp1", &fake_result(), &files).unwrap();

        let dest = dir.path().join("linked.o");
        store
            .extract_blob(&entry, "object_file", &dest, true)
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"object file bytes");
    }

    #[test]
    fn extract_unknown_logical_name_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalCacheStore::new(&dir.path().join("cache"), true);
        let files = write_outputs(dir.path());
        let entry = store.put("fp1", &fake_result(), &files).unwrap();

        let err = store
            .extract_blob(&entry, "dep_file", &dir.path().join("x.d"), false)
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingBlob { .. }));
    }

    #[test]
    fn extract_corrupt_blob_errors() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let store = LocalCacheStore::new(&cache_dir, false);
        let files = write_outputs(dir.path());
        let entry = store.put("fp1", &fake_result(), &files).unwrap();

        // Tamper with the stored blob.
        let key = &entry.files["object_file"].blob_key;
        let blob = cache_dir.join("blobs").join(format!("{key}.blob"));
        std::fs::write(&blob, b"tampered").unwrap();

        let err = store
            .extract_blob(&entry, "object_file", &dir.path().join("x.o"), false)
            .unwrap_err();
        assert!(matches!(err, StoreError::ChecksumMismatch { .. }));
    }

    #[test]
    fn identical_content_shares_one_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalCacheStore::new(&dir.path().join("cache"), true);

        let obj_a = dir.path().join("a.o");
        let obj_b = dir.path().join("b.o");
        std::fs::write(&obj_a, b"same bytes").unwrap();
        std::fs::write(&obj_b, b"same bytes").unwrap();

        let mut files_a = BTreeMap::new();
        files_a.insert("object_file".to_string(), obj_a);
        let mut files_b = BTreeMap::new();
        files_b.insert("object_file".to_string(), obj_b);

        store.put("fp_a", &fake_result(), &files_a).unwrap();
        store.put("fp_b", &fake_result(), &files_b).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.blob_count, 1);
    }

    #[test]
    fn stats_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalCacheStore::new(&dir.path().join("never-written"), true);
        let stats = store.stats().unwrap();
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.blob_count, 0);
        assert_eq!(stats.blob_bytes, 0);
    }

    #[test]
    fn clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalCacheStore::new(&dir.path().join("cache"), true);
        let files = write_outputs(dir.path());
        store.put("fp1", &fake_result(), &files).unwrap();

        let removed = store.clear().unwrap();
        assert_eq!(removed, 2); // one entry + one blob
        assert!(store.lookup("fp1").is_none());
    }

    #[test]
    fn missing_output_file_on_put_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalCacheStore::new(&dir.path().join("cache"), true);
        let mut files = BTreeMap::new();
        files.insert(
            "object_file".to_string(),
            dir.path().join("never-written.o"),
        );
        let err = store.put("fp1", &fake_result(), &files).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
