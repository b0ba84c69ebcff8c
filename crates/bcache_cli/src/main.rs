//! buildcache — a transparent compiler cache.
//!
//! Invoke as `buildcache <compiler> <args…>`: the compiler's arguments pass
//! through verbatim. On a cache hit the stored artifacts are materialized
//! and the original stdout, stderr and exit code are replayed; on a miss
//! the real compiler runs and its outputs are recorded. Maintenance flags
//! (`--stats`, `--clear`, `--show-config`) apply when no compiler is
//! given.

#![warn(missing_docs)]

use std::process;

use bcache_cli::engine;

use clap::Parser;

use bcache_config::BuildCacheConfig;
use bcache_store::{CacheBackend, LocalCacheStore};

/// buildcache — a transparent compiler cache.
#[derive(Parser, Debug)]
#[command(name = "buildcache", version, about = "A transparent compiler cache")]
pub struct Cli {
    /// Print cache statistics and exit.
    #[arg(long)]
    pub stats: bool,

    /// Remove all cached entries and blobs, then exit.
    #[arg(long)]
    pub clear: bool,

    /// Print the effective configuration and exit.
    #[arg(long)]
    pub show_config: bool,

    /// The compiler to wrap.
    pub compiler: Option<String>,

    /// The compiler's arguments, passed through verbatim.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    let cache_dir = bcache_config::resolve_cache_dir();
    let config = match bcache_config::load_config(&cache_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("buildcache: error: {e}");
            process::exit(1);
        }
    };
    let store = LocalCacheStore::new(&config.dir, config.compress);

    let result = match &cli.compiler {
        Some(compiler) => engine::run_buildcache(compiler, &cli.args, &config, &store),
        None => run_maintenance(&cli, &config, &store),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("buildcache: error: {e}");
            process::exit(1);
        }
    }
}

/// Handles the maintenance flags used without a wrapped compiler.
fn run_maintenance(
    cli: &Cli,
    config: &BuildCacheConfig,
    store: &dyn CacheBackend,
) -> Result<i32, Box<dyn std::error::Error>> {
    if cli.stats {
        let stats = store.stats()?;
        println!("Entries:    {}", stats.entry_count);
        println!("Blobs:      {}", stats.blob_count);
        println!("Blob bytes: {}", stats.blob_bytes);
        return Ok(0);
    }

    if cli.clear {
        let removed = store.clear()?;
        println!("Removed {removed} files.");
        return Ok(0);
    }

    if cli.show_config {
        println!("Cache dir:  {}", config.dir.display());
        println!("Debug:      {}", config.debug);
        println!("Disabled:   {}", config.disable);
        println!("Compress:   {}", config.compress);
        println!("Hard links: {}", config.hard_links);
        return Ok(0);
    }

    Err("no compiler given (try `buildcache <compiler> <args…>` or --stats)".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_compiler_and_args() {
        let cli = Cli::parse_from(["buildcache", "gcc", "-O2", "-c", "a.c", "-o", "a.o"]);
        assert_eq!(cli.compiler.as_deref(), Some("gcc"));
        assert_eq!(cli.args, vec!["-O2", "-c", "a.c", "-o", "a.o"]);
        assert!(!cli.stats);
        assert!(!cli.clear);
    }

    #[test]
    fn hyphen_values_pass_through() {
        let cli = Cli::parse_from([
            "buildcache",
            "rustc",
            "--crate-name",
            "foo",
            "--emit=link,metadata",
            "-",
        ]);
        assert_eq!(cli.compiler.as_deref(), Some("rustc"));
        assert_eq!(cli.args, vec!["--crate-name", "foo", "--emit=link,metadata", "-"]);
    }

    #[test]
    fn parse_stats_flag() {
        let cli = Cli::parse_from(["buildcache", "--stats"]);
        assert!(cli.stats);
        assert!(cli.compiler.is_none());
    }

    #[test]
    fn parse_clear_flag() {
        let cli = Cli::parse_from(["buildcache", "--clear"]);
        assert!(cli.clear);
    }

    #[test]
    fn parse_show_config_flag() {
        let cli = Cli::parse_from(["buildcache", "--show-config"]);
        assert!(cli.show_config);
    }

    #[test]
    fn compiler_path_with_slashes() {
        let cli = Cli::parse_from(["buildcache", "/usr/bin/clang++", "-c", "x.cpp"]);
        assert_eq!(cli.compiler.as_deref(), Some("/usr/bin/clang++"));
    }
}
