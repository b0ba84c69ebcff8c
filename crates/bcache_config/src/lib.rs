//! Configuration for the buildcache compiler cache.
//!
//! Settings come from three layers, weakest first: built-in defaults, an
//! optional `config.toml` in the cache directory, and `BUILDCACHE_*`
//! environment variables. The environment always wins so that a single
//! build invocation can be reconfigured without touching files.

#![warn(missing_docs)]

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, resolve_cache_dir};
pub use types::BuildCacheConfig;
