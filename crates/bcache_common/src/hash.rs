//! Content hashing for cache addressing and fingerprint composition.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::Path;

use xxhash_rust::xxh3::Xxh3;

/// A 128-bit content hash computed using XXH3.
///
/// Two byte streams with the same `ContentHash` are assumed to have identical
/// content. Used for cache blob addressing and for integrity validation of
/// stored artifacts.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Computes a content hash from a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// A streaming hasher for composing invocation fingerprints.
///
/// Accepts arbitrary byte chunks and named-file contents, and finalizes to a
/// lowercase hex digest. Chunk boundaries are made significant by an internal
/// separator so that `["ab", "c"]` and `["a", "bc"]` do not collide.
#[derive(Default)]
pub struct FingerprintHasher {
    state: Xxh3,
}

/// Separator inserted between logical chunks to keep boundaries unambiguous.
const CHUNK_SEPARATOR: [u8; 1] = [0x1f];

impl FingerprintHasher {
    /// Creates a fresh hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk of bytes to the digest.
    pub fn update(&mut self, data: impl AsRef<[u8]>) {
        self.state.update(data.as_ref());
        self.state.update(&CHUNK_SEPARATOR);
    }

    /// Appends the content of a file to the digest.
    ///
    /// The file is read in full; only the byte content contributes, never
    /// timestamps or other attributes.
    pub fn update_file(&mut self, path: &Path) -> io::Result<()> {
        let content = std::fs::read(path)?;
        self.update(&content);
        Ok(())
    }

    /// Consumes the hasher and returns the digest as a 32-character hex string.
    pub fn finalize(self) -> String {
        let digest = self.state.digest128();
        ContentHash(digest.to_le_bytes()).to_string()
    }
}
