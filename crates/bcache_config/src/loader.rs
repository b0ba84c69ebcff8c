//! Configuration file loading and environment overrides.

use std::path::{Path, PathBuf};

use bcache_sys::EnvVar;

use crate::error::ConfigError;
use crate::types::BuildCacheConfig;

/// Name of the configuration file within the cache directory.
const CONFIG_FILE: &str = "config.toml";

/// Resolves the cache root directory.
///
/// `$BUILDCACHE_DIR` wins if set; otherwise `$HOME/.buildcache`; as a last
/// resort `.buildcache` under the working directory.
pub fn resolve_cache_dir() -> PathBuf {
    let explicit = EnvVar::new("BUILDCACHE_DIR").as_string();
    if !explicit.is_empty() {
        return PathBuf::from(explicit);
    }
    let home = EnvVar::new("HOME").as_string();
    if !home.is_empty() {
        return Path::new(&home).join(".buildcache");
    }
    PathBuf::from(".buildcache")
}

/// Loads the configuration for the given cache directory.
///
/// A missing `config.toml` is not an error; a malformed one is. Environment
/// overrides are applied on top of whatever the file provided.
pub fn load_config(cache_dir: &Path) -> Result<BuildCacheConfig, ConfigError> {
    let config_path = cache_dir.join(CONFIG_FILE);
    let mut config = if config_path.is_file() {
        let content = std::fs::read_to_string(&config_path)?;
        parse_config(&content)?
    } else {
        BuildCacheConfig::default()
    };
    config.dir = cache_dir.to_path_buf();
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parses and applies environment overrides to a configuration given as a
/// string. Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<BuildCacheConfig, ConfigError> {
    let mut config = parse_config(content)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

fn parse_config(content: &str) -> Result<BuildCacheConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Applies `BUILDCACHE_*` environment variables over the file settings.
fn apply_env_overrides(config: &mut BuildCacheConfig) {
    for (name, slot) in [
        ("BUILDCACHE_DEBUG", &mut config.debug),
        ("BUILDCACHE_DISABLE", &mut config.disable),
        ("BUILDCACHE_COMPRESS", &mut config.compress),
        ("BUILDCACHE_HARD_LINKS", &mut config.hard_links),
    ] {
        let var = EnvVar::new(name);
        if var.defined() {
            *slot = var.as_bool();
        }
    }
}
