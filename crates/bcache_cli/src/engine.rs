//! The hit/miss engine.
//!
//! Orchestrates one wrapped invocation:
//! dispatch → resolve → fingerprint → lookup → replay-or-compile-and-capture.
//! Every recoverable wrapper failure degrades to a pass-through execution
//! of the real compiler, so a build never breaks because the cache could
//! not help.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use bcache_config::BuildCacheConfig;
use bcache_store::{CacheBackend, CacheEntry, CachedResult};
use bcache_sys::{ExePath, RunResult};
use bcache_wrappers::wrapper::ExpectedFile;
use bcache_wrappers::{compute_fingerprint, find_wrapper, Capability};

/// Runs one wrapped compiler invocation, returning the exit code to
/// propagate.
pub fn run_buildcache(
    compiler: &str,
    args: &[String],
    config: &BuildCacheConfig,
    store: &dyn CacheBackend,
) -> Result<i32, Box<dyn std::error::Error>> {
    if config.disable {
        return passthrough(compiler, args);
    }

    // Step 1: Select the dialect wrapper.
    let exe = ExePath::from_command(compiler);
    let mut wrapper = match find_wrapper(&exe, args) {
        Some(wrapper) => wrapper,
        None => {
            debug_log(config, &format!("no wrapper claims {compiler}, passing through"));
            return passthrough(compiler, args);
        }
    };

    // Step 2: Parse, validate, classify.
    if let Err(e) = wrapper.resolve_args() {
        debug_log(config, &format!("{e}, passing through"));
        return passthrough(compiler, args);
    }

    // Step 3: Compose the fingerprint.
    let fingerprint = match compute_fingerprint(wrapper.as_mut()) {
        Ok(fingerprint) => fingerprint,
        Err(e) => {
            debug_log(config, &format!("{e}, passing through"));
            return passthrough(compiler, args);
        }
    };

    // Step 4: Predict the build artifacts.
    let build_files = match wrapper.get_build_files() {
        Ok(files) => files,
        Err(e) => {
            debug_log(config, &format!("{e}, passing through"));
            return passthrough(compiler, args);
        }
    };

    // Step 5: Replay a hit.
    if let Some(entry) = store.lookup(fingerprint.as_str()) {
        let hard_links =
            config.hard_links && wrapper.get_capabilities().contains(&Capability::HardLinks);
        match materialize(store, &entry, &build_files, hard_links) {
            Ok(()) => {
                debug_log(config, &format!("cache hit for {fingerprint}"));
                replay_output(&entry.std_out, &entry.std_err);
                return Ok(entry.return_code);
            }
            Err(e) => {
                // A corrupt or incomplete entry is a miss, never a failure.
                debug_log(config, &format!("discarding cache entry: {e}"));
            }
        }
    }

    // Step 6: Miss. Run the real compiler.
    let result = bcache_sys::run(&command_line(compiler, args), true)?;
    replay_output(&result.std_out, &result.std_err);
    if result.return_code != 0 {
        return Ok(result.return_code);
    }

    // Step 7: Capture the outputs for next time.
    match collect_outputs(&build_files) {
        Ok(outputs) => {
            let cached = CachedResult {
                return_code: result.return_code,
                std_out: result.std_out,
                std_err: result.std_err,
            };
            if let Err(e) = store.put(fingerprint.as_str(), &cached, &outputs) {
                debug_log(config, &format!("failed to store cache entry: {e}"));
            }
        }
        Err(missing) => {
            // The prediction disagrees with reality: the compile result
            // stands, but the entry must not be cached.
            debug_log(
                config,
                &format!(
                    "{}: required output {} was not produced, not caching",
                    wrapper.dialect(),
                    missing.display()
                ),
            );
        }
    }

    Ok(result.return_code)
}

/// Runs the compiler untouched, forwarding its output and exit code.
pub fn passthrough(compiler: &str, args: &[String]) -> Result<i32, Box<dyn std::error::Error>> {
    let result: RunResult = bcache_sys::run(&command_line(compiler, args), true)?;
    replay_output(&result.std_out, &result.std_err);
    Ok(result.return_code)
}

fn command_line(compiler: &str, args: &[String]) -> Vec<String> {
    let mut cmd = Vec::with_capacity(args.len() + 1);
    cmd.push(compiler.to_string());
    cmd.extend(args.iter().cloned());
    cmd
}

/// Writes captured compiler output to our own streams, verbatim.
fn replay_output(std_out: &str, std_err: &str) {
    let _ = std::io::stdout().write_all(std_out.as_bytes());
    let _ = std::io::stderr().write_all(std_err.as_bytes());
}

/// Materializes every expected file of a hit from the stored entry.
///
/// A required file missing from the entry fails the whole materialization
/// so the engine falls back to a real compile.
fn materialize(
    store: &dyn CacheBackend,
    entry: &CacheEntry,
    build_files: &BTreeMap<String, ExpectedFile>,
    hard_links: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    for (logical_name, expected) in build_files {
        if entry.files.contains_key(logical_name) {
            store.extract_blob(entry, logical_name, &expected.path, hard_links)?;
        } else if expected.required {
            return Err(format!("entry is missing required file {logical_name}").into());
        }
    }
    Ok(())
}

/// Maps the predicted files to the paths the compiler actually wrote.
///
/// Returns the path of the first missing required file as the error.
fn collect_outputs(
    build_files: &BTreeMap<String, ExpectedFile>,
) -> Result<BTreeMap<String, PathBuf>, PathBuf> {
    let mut outputs = BTreeMap::new();
    for (logical_name, expected) in build_files {
        if expected.path.is_file() {
            outputs.insert(logical_name.clone(), expected.path.clone());
        } else if expected.required {
            return Err(expected.path.clone());
        }
    }
    Ok(outputs)
}

/// Prints diagnostic chatter to stderr when debug output is enabled.
fn debug_log(config: &BuildCacheConfig, message: &str) {
    if config.debug {
        eprintln!("buildcache: {message}");
    }
}
