//! Configuration types deserialized from `config.toml`.

use serde::Deserialize;
use std::path::PathBuf;

/// The resolved buildcache configuration.
///
/// Produced by the loader after merging defaults, the optional
/// `config.toml`, and `BUILDCACHE_*` environment overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildCacheConfig {
    /// Root directory for cache entries and blobs.
    #[serde(skip, default)]
    pub dir: PathBuf,

    /// Print diagnostic chatter to stderr.
    #[serde(default)]
    pub debug: bool,

    /// Bypass the cache entirely and pass every invocation through.
    #[serde(default)]
    pub disable: bool,

    /// Compress cached blob payloads.
    #[serde(default = "default_true")]
    pub compress: bool,

    /// Materialize cache hits via hard links where possible.
    ///
    /// Only effective when compression is off: a compressed blob cannot be
    /// linked into place.
    #[serde(default)]
    pub hard_links: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BuildCacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::new(),
            debug: false,
            disable: false,
            compress: true,
            hard_links: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BuildCacheConfig::default();
        assert!(!config.debug);
        assert!(!config.disable);
        assert!(config.compress);
        assert!(!config.hard_links);
    }
}
