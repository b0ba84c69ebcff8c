//! Wrapper for the TI code generation tools.
//!
//! Covers the per-family drivers: `armcl` (Arm), `cl2000` (C2000), `cl430`
//! (MSP430), `cl6x` (C6000), `cl7x` (C7000) and `clpru` (PRU). TI long
//! options are equals-joined (`--output_file=a.obj`); the short
//! `-D`/`-I`/`-U` forms accept concatenated or separate values.
//! Preprocessed output is requested with `--preproc_to_stdout`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use bcache_sys::ExePath;

use crate::args::{render_tokens, ArgAtom};
use crate::dialects::{default_object_path, is_c_source_file};
use crate::error::WrapperError;
use crate::wrapper::{ExpectedFile, ProgramWrapper};

const DIALECT: &str = "ti";

const HASH_VERSION: &str = "1";

/// Driver basenames this wrapper claims.
const DRIVER_NAMES: &[&str] = &["armcl", "cl2000", "cl430", "cl6x", "cl7x", "clpru"];

/// Options that disqualify an invocation from caching.
const UNSUPPORTED_OPTIONS: &[&str] = &[
    "--preproc_only",
    "--preproc_to_stdout",
    "--run_linker",
    "-z",
];

/// Long options excluded from the relevant-argument projection.
const IRRELEVANT_LONG_OPTIONS: &[&str] = &[
    "--output_file",
    "--include_path",
    "--define",
    "--undefine",
    "--preproc_dependency",
];

/// Long options this wrapper understands, bare or equals-joined.
const KNOWN_LONG_OPTIONS: &[&str] = &[
    "--compile_only",
    "--output_file",
    "--define",
    "--undefine",
    "--include_path",
    "--preproc_dependency",
    "--opt_level",
    "--opt_for_speed",
    "--abi",
    "--silicon_version",
    "--float_support",
    "--endian",
    "--c99",
    "--c11",
    "--cpp14",
    "--display_error_number",
    "--diag_warning",
    "--diag_suppress",
    "--diag_error",
    "--emit_warnings_as_errors",
    "--gen_func_subsections",
];

/// Recognized short flags with no value.
const KNOWN_BARE_OPTIONS: &[&str] = &["-c", "-g"];

/// Recognized short option families matched by prefix.
const KNOWN_OPTION_PREFIXES: &[&str] = &["-O", "-mv"];

/// The TI dialect wrapper.
pub struct TiWrapper {
    exe: ExePath,
    raw_args: Vec<String>,
    atoms: Vec<ArgAtom>,
    source: PathBuf,
    object: PathBuf,
    dep_file: Option<PathBuf>,
}

impl TiWrapper {
    /// Creates a wrapper for one invocation. `args` excludes argv[0].
    pub fn new(exe: ExePath, args: Vec<String>) -> Self {
        Self {
            exe,
            raw_args: args,
            atoms: Vec::new(),
            source: PathBuf::new(),
            object: PathBuf::new(),
            dep_file: None,
        }
    }

    fn find_long_option(&self, flag: &str) -> Option<&ArgAtom> {
        self.atoms.iter().find(|a| a.flag == flag)
    }
}

impl ProgramWrapper for TiWrapper {
    fn dialect(&self) -> &'static str {
        DIALECT
    }

    fn can_handle_command(&self) -> bool {
        DRIVER_NAMES.contains(&self.exe.command_stem().as_str())
    }

    fn resolve_args(&mut self) -> Result<(), WrapperError> {
        let mut atoms = Vec::new();
        let mut sources = Vec::new();
        let mut errors = Vec::new();

        let mut i = 0;
        while i < self.raw_args.len() {
            let token = &self.raw_args[i];
            i += 1;

            if !token.starts_with('-') {
                if is_c_source_file(token) {
                    sources.push(PathBuf::from(token));
                } else {
                    errors.push(format!("unrecognized input {token}"));
                }
                continue;
            }

            if UNSUPPORTED_OPTIONS.contains(&token.as_str()) {
                errors.push(format!("unsupported compiler argument {token}"));
                continue;
            }

            if token.starts_with("--") {
                if let Some((flag, value)) = token.split_once('=') {
                    if KNOWN_LONG_OPTIONS.contains(&flag) {
                        atoms.push(ArgAtom::equals(flag, value));
                    } else {
                        errors.push(format!("unsupported compiler argument {token}"));
                    }
                } else if KNOWN_LONG_OPTIONS.contains(&token.as_str())
                    || token.starts_with("--symdebug:")
                {
                    atoms.push(ArgAtom::bare(token));
                } else {
                    errors.push(format!("unsupported compiler argument {token}"));
                }
                continue;
            }

            // Short -D/-I/-U: concatenated or separate value.
            if let Some(prefix) = ["-D", "-I", "-U"]
                .iter()
                .find(|p| token.starts_with(**p))
            {
                if token.len() > prefix.len() {
                    atoms.push(ArgAtom::concatenated(*prefix, &token[prefix.len()..]));
                } else {
                    match self.raw_args.get(i) {
                        Some(value) => {
                            atoms.push(ArgAtom::separate(*prefix, value));
                            i += 1;
                        }
                        None => errors.push(format!("missing argument for {token}")),
                    }
                }
                continue;
            }

            // Parsing is total: a flag outside the recognized tables could
            // affect semantics, so it declines caching instead of falling
            // through.
            if KNOWN_BARE_OPTIONS.contains(&token.as_str())
                || KNOWN_OPTION_PREFIXES.iter().any(|p| token.starts_with(p))
            {
                atoms.push(ArgAtom::bare(token));
            } else {
                errors.push(format!("unsupported compiler argument {token}"));
            }
        }

        if !errors.is_empty() {
            return Err(WrapperError::Unsupported {
                dialect: DIALECT,
                reason: errors.join("\n"),
            });
        }

        let compile_step = atoms
            .iter()
            .any(|a| a.flag == "-c" || a.flag == "--compile_only");
        if !compile_step {
            return Err(WrapperError::Unsupported {
                dialect: DIALECT,
                reason: "only object compiles (--compile_only) can be cached".to_string(),
            });
        }

        if sources.len() != 1 {
            return Err(WrapperError::Unsupported {
                dialect: DIALECT,
                reason: format!("a single source file is required, got {}", sources.len()),
            });
        }
        let source = sources.into_iter().next().unwrap_or_default();

        self.atoms = atoms;
        self.object = self
            .find_long_option("--output_file")
            .map(|a| PathBuf::from(&a.value))
            .unwrap_or_else(|| default_object_path(&source, ".obj"));
        self.dep_file = self
            .find_long_option("--preproc_dependency")
            .map(|a| PathBuf::from(&a.value));
        self.source = source;
        Ok(())
    }

    fn get_program_id(&mut self) -> Result<String, WrapperError> {
        let cmd = vec![
            self.exe.literal().to_string_lossy().into_owned(),
            "-version".to_string(),
        ];
        let result = bcache_sys::run(&cmd, true).map_err(|e| WrapperError::Probe {
            dialect: DIALECT,
            reason: e.to_string(),
        })?;
        let banner = format!("{}{}", result.std_out, result.std_err);
        if banner.is_empty() {
            return Err(WrapperError::Probe {
                dialect: DIALECT,
                reason: "unable to get the compiler version information string".to_string(),
            });
        }
        Ok(format!("{HASH_VERSION}{banner}"))
    }

    fn get_relevant_arguments(&self) -> Vec<String> {
        self.atoms
            .iter()
            .filter(|a| {
                !IRRELEVANT_LONG_OPTIONS.contains(&a.flag.as_str())
                    && !matches!(a.flag.as_str(), "-D" | "-I" | "-U")
            })
            .flat_map(ArgAtom::to_tokens)
            .collect()
    }

    fn preprocess_source(&mut self) -> Result<Vec<u8>, WrapperError> {
        let mut cmd = vec![self.exe.literal().to_string_lossy().into_owned()];
        let kept: Vec<ArgAtom> = self
            .atoms
            .iter()
            .filter(|a| {
                !matches!(
                    a.flag.as_str(),
                    "-c" | "--compile_only" | "--output_file" | "--preproc_dependency"
                )
            })
            .cloned()
            .collect();
        cmd.extend(render_tokens(&kept));
        cmd.push("--preproc_to_stdout".to_string());
        cmd.push(self.source.to_string_lossy().into_owned());
        super::gcc::GccWrapper::run_preprocessor(DIALECT, &cmd)
    }

    fn get_build_files(&mut self) -> Result<BTreeMap<String, ExpectedFile>, WrapperError> {
        let mut files = BTreeMap::new();
        files.insert(
            "object_file".to_string(),
            ExpectedFile::required(self.object.clone()),
        );
        if let Some(dep) = &self.dep_file {
            files.insert("dep_file".to_string(), ExpectedFile::required(dep.clone()));
        }
        Ok(files)
    }
}
