//! Wrapper for cargo-invoked `rustc`.
//!
//! rustc offers no preprocessed-text equivalence, so this is the one
//! direct-mode dialect: dependency discovery goes through
//! `--emit=dep-info`, and the program ID must cover everything the
//! compiler links into its output: the sysroot shared libraries, any
//! static libraries resolved from `-L`/`-l static=`, and the working
//! directory (rustc embeds paths into artifacts).
//!
//! The caching rules follow the ones sccache established for rustc, with
//! the same caveats.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bcache_common::FingerprintHasher;
use bcache_sys::{file, ExePath, RunResult, ScopedUnsetEnv, TmpFile};

use crate::error::WrapperError;
use crate::wrapper::{Capability, ExpectedFile, ProgramWrapper};

const DIALECT: &str = "rust";

// Tick this to a new number if the format has changed in a
// non-backwards-compatible way.
const HASH_VERSION: &str = "1";

/// Environment variables unset around every child rustc invocation. They
/// leak into `--emit=dep-info` output or the compiler's own behavior
/// without affecting the build result.
const VOLATILE_ENV_VARS: &[&str] = &[
    "LD_PRELOAD",
    "RUNNING_UNDER_RR",
    "HOSTNAME",
    "PWD",
    "HOST",
    "RPM_BUILD_ROOT",
    "SOURCE_DATE_EPOCH",
    "RPM_PACKAGE_RELEASE",
    "MINICOM",
    "RPM_PACKAGE_VERSION",
];

/// Categories of options that can be passed to rustc and how we handle them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptionKind {
    Unsupported,
    Unhandled,
    Ignored,
    LibraryPath,
    Library,
    CrateType,
    CrateName,
    Emit,
    CodeGen,
    OutDir,
    Target,
    Extern,
    ResponseFile,
    Path,
}

/// Figures out which category an option belongs to, and whether it
/// requires an argument. This should correspond to all options available
/// to an invocation of rustc.
fn classify(flag: &str) -> (OptionKind, bool) {
    use OptionKind::*;
    match flag {
        "-" => (Unsupported, false),
        "-h" | "--help" => (Unhandled, false),
        "--cfg" => (Ignored, true),
        "-L" => (LibraryPath, true),
        "-l" => (Library, true),
        "--crate-type" => (CrateType, true),
        "--crate-name" => (CrateName, true),
        "--edition" => (Ignored, true),
        "--emit" => (Emit, true),
        "--print" => (Unhandled, true),
        "-g" | "-O" => (CodeGen, false),
        "-o" => (Unsupported, true),
        "--out-dir" => (OutDir, true),
        "--explain" => (Unhandled, true),
        "--test" => (Unhandled, false),
        "--target" => (Target, true),
        "-A" | "--allow" | "-W" | "--warn" | "--force-warn" | "-D" | "--deny" | "-F"
        | "--forbid" | "--cap-lints" => (Ignored, true),
        "-C" | "--codegen" => (CodeGen, true),
        "-V" | "--version" => (Unhandled, false),
        "-v" | "--verbose" => (Ignored, false),
        "--extern" => (Extern, true),
        "--sysroot" => (Unsupported, true),
        "--error-format" | "--json" | "--color" | "--diagnostic-width" => (Ignored, true),
        "--remap-path-prefix" => (Unsupported, true),
        "@" => (ResponseFile, false),
        _ => (Path, false),
    }
}

/// Splits a raw token into `(flag, attached_value)`.
///
/// Handles `--flag=value`, the short forms `-X…` (for the known short
/// option characters), the literal `-`, `@response-file`, and bare
/// positionals. Returns `None` for tokens that cannot be parsed at all.
fn tokenize(token: &str) -> Option<(String, String)> {
    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return None;
    }
    if token == "-" {
        return Some(("-".to_string(), String::new()));
    }
    if token.starts_with("--") {
        return match token.split_once('=') {
            Some((flag, value)) => Some((flag.to_string(), value.to_string())),
            None => Some((token.to_string(), String::new())),
        };
    }
    if let Some(rest) = token.strip_prefix('@') {
        if !rest.is_empty() {
            return Some(("@".to_string(), rest.to_string()));
        }
    }
    if let Some(rest) = token.strip_prefix('-') {
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            if "hLlgOoAWDFCVv".contains(c) {
                return Some((format!("-{c}"), chars.as_str().to_string()));
            }
        }
    }
    Some((token.to_string(), String::new()))
}

/// Parses the content of a `--emit=dep-info` file.
///
/// The first line is the dependency rule: the target, then the
/// space-separated source dependencies. Subsequent lines may carry
/// `# env-dep:NAME=VALUE` annotations; the prefix is matched exactly and
/// the remainder splits at the first `=` only, so dependency paths
/// containing colons cannot misparse. `RUSTC_COLOR` is controlled from the
/// command line and `CARGO_MAKEFLAGS` is not cacheable; both are dropped.
fn parse_dep_file(content: &str) -> (Vec<PathBuf>, BTreeMap<String, String>) {
    let mut files: Vec<PathBuf> = Vec::new();
    let mut env_vars = BTreeMap::new();

    let mut lines = content.lines();
    if let Some(first) = lines.next() {
        files = first
            .split_whitespace()
            .skip(1)
            .map(PathBuf::from)
            .collect();
    }

    for line in lines {
        if let Some(entry) = line.strip_prefix("# env-dep:") {
            let (name, value) = match entry.split_once('=') {
                Some((name, value)) => (name, value),
                None => (entry, ""),
            };
            if name == "RUSTC_COLOR" || name == "CARGO_MAKEFLAGS" {
                continue;
            }
            env_vars.insert(name.to_string(), value.to_string());
        }
    }

    files.sort();
    (files, env_vars)
}

/// Resolves `-l static=` names against the `-L` search paths.
///
/// For each (name, path) pair the candidates `lib{name}.a`, `{name}.lib`
/// and `{name}.a` are tried in that order, stopping at the first that
/// exists.
fn find_static_libraries(names: &[String], paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut libraries = Vec::new();
    for name in names {
        for path in paths {
            let candidates = [
                path.join(format!("lib{name}.a")),
                path.join(format!("{name}.lib")),
                path.join(format!("{name}.a")),
            ];
            if let Some(hit) = candidates.iter().find(|c| c.is_file()) {
                libraries.push(hit.clone());
            }
        }
    }
    libraries.sort();
    libraries
}

/// Runs rustc with the volatile environment variables scrubbed.
///
/// The guards restore the prior environment on every exit path.
fn run_rustc(args: &[String], quiet: bool) -> Result<RunResult, bcache_sys::SysError> {
    let _scrubbed: Vec<ScopedUnsetEnv> = VOLATILE_ENV_VARS
        .iter()
        .map(|name| ScopedUnsetEnv::new(name))
        .collect();
    bcache_sys::run(args, quiet)
}

/// All shared libraries shipped with the compiler.
///
/// The location and extension are platform specific: `lib/*.so` on Unix,
/// `bin/*.dll` on Windows. The result is sorted for a stable program ID.
fn compiler_shared_libraries(sysroot: &str) -> Vec<PathBuf> {
    let (subdir, ext) = if cfg!(windows) {
        ("bin", ".dll")
    } else {
        ("lib", ".so")
    };
    let lib_dir = Path::new(sysroot).join(subdir);
    if !lib_dir.is_dir() {
        return Vec::new();
    }
    file::walk_with_extension(&lib_dir, ext).unwrap_or_default()
}

/// The rustc dialect wrapper.
pub struct RustWrapper {
    exe: ExePath,
    raw_args: Vec<String>,

    /// The normalized argv (program first) used to respawn rustc probes.
    parsed_args: Vec<String>,

    relevant_args: Vec<String>,
    output_dir: PathBuf,
    externs: Vec<PathBuf>,
    static_libraries: Vec<PathBuf>,
    crate_name: String,
    dep_info: String,
    emit: Vec<String>,
    input: PathBuf,

    /// Memoized dep-info scan: implicit inputs and env-dep variables are
    /// produced by the same rustc call, so they are computed together and
    /// at most once.
    dep_scan: Option<(Vec<PathBuf>, BTreeMap<String, String>)>,
}

impl RustWrapper {
    /// Creates a wrapper for one invocation. `args` excludes argv[0].
    pub fn new(exe: ExePath, args: Vec<String>) -> Self {
        Self {
            exe,
            raw_args: args,
            parsed_args: Vec::new(),
            relevant_args: Vec::new(),
            output_dir: PathBuf::new(),
            externs: Vec::new(),
            static_libraries: Vec::new(),
            crate_name: String::new(),
            dep_info: String::new(),
            emit: Vec::new(),
            input: PathBuf::new(),
            dep_scan: None,
        }
    }

    /// Prefixes a diagnostic with the crate name when known.
    fn with_crate_prefix(crate_name: &str, message: &str) -> String {
        let header = if crate_name.is_empty() {
            "<unknown crate>"
        } else {
            crate_name
        };
        format!("{header}: {message}")
    }

    fn unsupported(&self, message: &str) -> WrapperError {
        WrapperError::Unsupported {
            dialect: DIALECT,
            reason: Self::with_crate_prefix(&self.crate_name, message),
        }
    }

    fn probe_failure(&self, message: &str) -> WrapperError {
        WrapperError::Probe {
            dialect: DIALECT,
            reason: Self::with_crate_prefix(&self.crate_name, message),
        }
    }

    /// Parses and verifies all options passed to the invocation, collecting
    /// the facts the other contract operations need.
    ///
    /// Errors are collected comprehensively rather than failing on the
    /// first bad option, so one diagnostic covers the whole command line.
    fn parse_options(&mut self) -> Result<(), WrapperError> {
        let mut parsed_args = vec![self.exe.literal().to_string_lossy().into_owned()];
        let mut relevant_args = Vec::new();
        let mut static_library_paths: Vec<PathBuf> = Vec::new();
        let mut static_library_names: Vec<String> = Vec::new();
        let mut crate_type_rlib = false;
        let mut crate_type_static_lib = false;
        let mut crate_name = String::new();
        let mut emit: Vec<String> = Vec::new();
        let mut extra_filename = String::new();
        let mut output_dir = String::new();
        let mut externs: Vec<PathBuf> = Vec::new();
        let mut input = String::new();
        let mut errors: Vec<String> = Vec::new();

        let cwd = std::env::current_dir().unwrap_or_default();

        let tokens = self.raw_args.clone();
        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            i += 1;

            let (flag, attached) = match tokenize(token) {
                Some(parsed) => parsed,
                None => {
                    errors.push(token.clone());
                    continue;
                }
            };
            let (kind, takes_value) = classify(&flag);

            let needs_value = takes_value && attached.is_empty();
            let value = if needs_value && i < tokens.len() {
                let next = tokens[i].clone();
                i += 1;
                next
            } else {
                attached
            };
            if takes_value && value.is_empty() {
                errors.push(format!(
                    "Can't parse arguments, missing argument for {flag}"
                ));
                continue;
            }

            parsed_args.push(flag.clone());
            if !value.is_empty() {
                parsed_args.push(value.clone());
            }

            // The value as it should appear in the relevant-argument
            // projection; `None` keeps this option out of the projection.
            let mut relevant: Option<String> = Some(value.clone());

            match kind {
                OptionKind::Unsupported => {
                    errors.push(format!("Unsupported compiler argument {flag}"));
                    continue;
                }
                OptionKind::Unhandled => {
                    errors.push(format!("Unhandled compiler argument {flag}"));
                    continue;
                }
                OptionKind::Ignored => continue,
                OptionKind::LibraryPath => {
                    let (lib_kind, path) = match value.split_once('=') {
                        Some((k, p)) => (k, p),
                        None => ("", value.as_str()),
                    };
                    if lib_kind.is_empty() || lib_kind == "native" || lib_kind == "all" {
                        static_library_paths.push(PathBuf::from(path));
                    }
                    // The search paths are not relevant arguments: the
                    // contents of the resolved libraries go into the
                    // program ID instead.
                    continue;
                }
                OptionKind::Library => {
                    if let Some((lib_kind, name)) = value.split_once('=') {
                        if lib_kind == "static" {
                            static_library_names.push(name.to_string());
                        }
                    }
                }
                OptionKind::CrateType => {
                    let types: Vec<&str> = value.split(',').collect();
                    // lib implies rlib; only lib, rlib and staticlib are
                    // supported.
                    crate_type_rlib = crate_type_rlib
                        || types.contains(&"lib")
                        || types.contains(&"rlib");
                    crate_type_static_lib =
                        crate_type_static_lib || types.contains(&"staticlib");
                }
                OptionKind::CrateName => {
                    crate_name = value.clone();
                }
                OptionKind::Emit => {
                    if !emit.is_empty() {
                        errors.push("Cannot handle more than one --emit".to_string());
                        continue;
                    }
                    emit = value.split(',').map(str::to_string).collect();
                    emit.sort();
                    // The projection carries the sorted member list so
                    // permuted --emit values fingerprint identically.
                    relevant = Some(emit.join(","));
                }
                OptionKind::CodeGen => {
                    if !value.is_empty() {
                        let (option, option_value) = match value.split_once('=') {
                            Some((o, v)) => (o, v),
                            None => (value.as_str(), ""),
                        };
                        if option == "extra-filename" {
                            extra_filename = option_value.to_string();
                            if extra_filename.is_empty() {
                                errors.push("Can't cache extra-filename".to_string());
                                continue;
                            }
                        }
                        if option == "incremental" {
                            errors.push("Can't cache incremental builds".to_string());
                            continue;
                        }
                    }
                }
                OptionKind::OutDir => {
                    output_dir = value.clone();
                    // Where the result is stored is not relevant to the hash.
                    continue;
                }
                OptionKind::Target => {
                    if file::extension(Path::new(&value)) == ".json"
                        || Path::new(&format!("{value}.json")).is_file()
                    {
                        errors.push(format!("Can't cache target {value}"));
                        continue;
                    }
                }
                OptionKind::Extern => {
                    if let Some((_, extern_lib)) = value.split_once('=') {
                        if !extern_lib.is_empty() {
                            // Relative externs are resolved against the
                            // working directory.
                            externs.push(cwd.join(extern_lib));
                        }
                    }
                    // The extern locations are not relevant arguments: the
                    // library contents are hashed as input files.
                    continue;
                }
                OptionKind::ResponseFile => {
                    errors.push(format!("Cannot handle response file @{value}"));
                    continue;
                }
                OptionKind::Path => {
                    if !input.is_empty() {
                        errors.push(format!("Cannot handle multiple inputs {flag}"));
                        continue;
                    }
                    input = flag.clone();
                }
            }

            relevant_args.push(flag);
            if let Some(value) = relevant.filter(|v| !v.is_empty()) {
                relevant_args.push(value);
            }
        }

        // Parsing is done; record the crate name first so every diagnostic
        // below carries it.
        self.crate_name = crate_name;

        if !errors.is_empty() {
            return Err(self.unsupported(&errors.join("\n")));
        }

        if input.is_empty() {
            return Err(self.unsupported("input file required to cache cargo/rustc compilation"));
        }

        // Only link, metadata and dep-info may be emitted, and link and
        // metadata are required.
        let allowed = ["dep-info", "link", "metadata"];
        let has_required =
            emit.iter().any(|e| e == "link") && emit.iter().any(|e| e == "metadata");
        let all_allowed = emit.iter().all(|e| allowed.contains(&e.as_str()));
        if emit.is_empty() || !has_required || !all_allowed {
            return Err(self.unsupported("--emit required to cache cargo/rustc compilation"));
        }

        if output_dir.is_empty() {
            return Err(
                self.unsupported("--out-dir required to cache cargo/rustc compilation")
            );
        }

        if self.crate_name.is_empty() {
            return Err(
                self.unsupported("--crate-name required to cache cargo/rustc compilation")
            );
        }

        if !crate_type_rlib && !crate_type_static_lib {
            return Err(
                self.unsupported("--crate-type required to cache cargo/rustc compilation")
            );
        }

        self.static_libraries =
            find_static_libraries(&static_library_names, &static_library_paths);

        if emit.iter().any(|e| e == "dep-info") {
            self.dep_info = format!("{}{}.d", self.crate_name, extra_filename);
        }

        // Cargo does not guarantee the order of externs.
        externs.sort();

        self.parsed_args = parsed_args;
        self.relevant_args = relevant_args;
        self.output_dir = PathBuf::from(output_dir);
        self.externs = externs;
        self.emit = emit;
        self.input = PathBuf::from(input);
        Ok(())
    }

    /// Runs the dep-info scan once, producing the implicit input files and
    /// the env-dep variables together.
    fn scan_dep_info(&mut self) -> Result<(), WrapperError> {
        if self.dep_scan.is_some() {
            return Ok(());
        }

        let tmp_file = TmpFile::with_suffix(".d").map_err(|e| self.probe_failure(&e.to_string()))?;

        // Re-emitting dep-info requires dropping the original --emit and
        // --out-dir along with every -C option and value.
        let mut filtered_args = Vec::with_capacity(self.parsed_args.len());
        let mut to_remove = false;
        for arg in &self.parsed_args {
            if to_remove || arg == "--emit" || arg == "--out-dir" || arg == "-C" {
                to_remove = !to_remove;
                continue;
            }
            filtered_args.push(arg.clone());
        }
        filtered_args.push("-o".to_string());
        filtered_args.push(tmp_file.path().to_string_lossy().into_owned());
        filtered_args.push("--emit=dep-info".to_string());

        let result =
            run_rustc(&filtered_args, false).map_err(|e| self.probe_failure(&e.to_string()))?;
        if result.return_code != 0 {
            return Err(self.probe_failure(&format!(
                "Failed to call {}",
                filtered_args.join(" ")
            )));
        }

        let content = file::read_to_string(tmp_file.path())
            .map_err(|e| self.probe_failure(&e.to_string()))?;

        let (implicit_files, mut env_vars) = parse_dep_file(&content);

        // All CARGO_-named environment variables are relevant, except the
        // MAKEFLAGS jobserver handshake.
        for (name, value) in bcache_sys::env::get_env_all() {
            if !name.contains("CARGO_") || name == "CARGO_MAKEFLAGS" {
                continue;
            }
            env_vars.insert(name, value);
        }

        self.dep_scan = Some((implicit_files, env_vars));
        Ok(())
    }
}

impl ProgramWrapper for RustWrapper {
    fn dialect(&self) -> &'static str {
        DIALECT
    }

    fn can_handle_command(&self) -> bool {
        // TODO: handle rustup proxying, where argv[0] resolves to the
        // rustup shim rather than the real rustc.
        self.exe.command_stem() == "rustc"
    }

    fn resolve_args(&mut self) -> Result<(), WrapperError> {
        self.parse_options()
    }

    fn get_capabilities(&self) -> Vec<Capability> {
        // Direct mode is required by the way rustc is invoked. Hard links
        // are safe since rustc never overwrites an existing artifact in
        // place, but compressed stores leave them ineffective in practice.
        vec![Capability::ForceDirectMode, Capability::HardLinks]
    }

    fn get_program_id(&mut self) -> Result<String, WrapperError> {
        // Quite a lot goes into the program ID, so it is hashed here and
        // returned as a hex string.
        let mut hasher = FingerprintHasher::new();
        hasher.update(HASH_VERSION);

        let exe = self.parsed_args[0].clone();

        let result = run_rustc(&[exe.clone(), "-vV".to_string()], true)
            .map_err(|e| self.probe_failure(&e.to_string()))?;
        if result.return_code != 0 {
            return Err(
                self.probe_failure("Unable to get the compiler version information string.")
            );
        }
        hasher.update(&result.std_out);

        let result = run_rustc(&[exe, "--print=sysroot".to_string()], true)
            .map_err(|e| self.probe_failure(&e.to_string()))?;
        if result.return_code != 0 {
            return Err(self.probe_failure("Unable to get the compiler sysroot."));
        }
        let sysroot = result.std_out.trim().to_string();

        // rustc embeds paths into its output, so the working directory is
        // part of the compiler identity.
        let cwd = std::env::current_dir().unwrap_or_default();
        hasher.update(cwd.to_string_lossy().as_bytes());

        for shared_library in compiler_shared_libraries(&sysroot) {
            hasher
                .update_file(&shared_library)
                .map_err(|e| self.probe_failure(&e.to_string()))?;
        }

        // Static libraries are hashed by name and contents.
        for static_lib in &self.static_libraries {
            hasher.update(static_lib.to_string_lossy().as_bytes());
            hasher
                .update_file(static_lib)
                .map_err(|e| self.probe_failure(&e.to_string()))?;
        }

        Ok(hasher.finalize())
    }

    fn get_relevant_arguments(&self) -> Vec<String> {
        self.relevant_args.clone()
    }

    fn get_relevant_env_vars(&mut self) -> Result<BTreeMap<String, String>, WrapperError> {
        self.scan_dep_info()?;
        Ok(self
            .dep_scan
            .as_ref()
            .map(|(_, env)| env.clone())
            .unwrap_or_default())
    }

    fn get_input_files(&self) -> Vec<PathBuf> {
        // The single input source plus every extern named on the command
        // line.
        let mut files = vec![self.input.clone()];
        files.extend(self.externs.iter().cloned());
        files
    }

    fn get_implicit_input_files(&mut self) -> Result<Vec<PathBuf>, WrapperError> {
        self.scan_dep_info()?;
        Ok(self
            .dep_scan
            .as_ref()
            .map(|(files, _)| files.clone())
            .unwrap_or_default())
    }

    fn get_build_files(&mut self) -> Result<BTreeMap<String, ExpectedFile>, WrapperError> {
        // The link artifact names are platform- and crate-type-dependent,
        // so rustc itself is asked via --print file-names.
        let mut cmd = self.parsed_args.clone();
        cmd.push("--print".to_string());
        cmd.push("file-names".to_string());
        let result = run_rustc(&cmd, true).map_err(|e| self.probe_failure(&e.to_string()))?;
        if result.return_code != 0 {
            return Err(self.probe_failure(&format!("Failed to call {}", cmd.join(" "))));
        }

        let mut files: Vec<String> = result
            .std_out
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        if self.emit.iter().any(|e| e == "metadata") {
            // The metadata file names cannot be queried, but they mirror
            // the .rlib names.
            let metadata: Vec<String> = files
                .iter()
                .filter(|f| file::extension(Path::new(f)) == ".rlib")
                .map(|f| {
                    file::change_extension(Path::new(f), ".rmeta")
                        .to_string_lossy()
                        .into_owned()
                })
                .collect();
            files.extend(metadata);
        }

        if self.emit.iter().any(|e| e == "dep-info") {
            files.push(self.dep_info.clone());
        }

        // Keyed by file name, which also deduplicates predicted entries.
        let mut build_files = BTreeMap::new();
        for name in files {
            build_files.insert(
                name.clone(),
                ExpectedFile::required(self.output_dir.join(&name)),
            );
        }
        Ok(build_files)
    }
}
