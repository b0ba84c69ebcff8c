//! Wrapper for the Green Hills compiler drivers.
//!
//! Green Hills ships one driver per target architecture, named `cc<arch>`
//! for C and `cx<arch>` for C++ (`ccarm`, `cxppc`, `ccrh850`, ...). The
//! drivers accept a GCC-like flag subset, preprocess with `-E`, and report
//! their version with `-V`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use bcache_sys::ExePath;

use crate::args::{render_tokens, ArgAtom};
use crate::dialects::{default_object_path, is_c_source_file};
use crate::error::WrapperError;
use crate::wrapper::{ExpectedFile, ProgramWrapper};

const DIALECT: &str = "ghs";

const HASH_VERSION: &str = "1";

/// Architecture suffixes the `cc`/`cx` driver prefix combines with.
const ARCH_SUFFIXES: &[&str] = &["arm", "thumb", "ppc", "intppc", "rh850", "v850", "tri", "86"];

/// Options whose value may follow as a separate token.
const TWO_TOKEN_OPTIONS: &[&str] = &["-o", "-I", "-D", "-U"];

/// Option prefixes that accept a concatenated value.
const CONCAT_PREFIXES: &[&str] = &["-I", "-D", "-U", "-o", "-l", "-L"];

/// Options that disqualify an invocation from caching.
const UNSUPPORTED_OPTIONS: &[&str] = &["-E", "-S", "-P", "-M"];

/// Recognized flags with no value, accepted as-is.
const KNOWN_BARE_OPTIONS: &[&str] = &[
    "-c", "-g", "-G", "--c99", "--c11", "--gnu99", "--cpp11", "--cpp14", "--cpp17",
    "--exceptions", "--no_exceptions", "--signed_chars", "--unsigned_chars",
    "--short_enum", "--big_endian", "--little_endian",
];

/// Recognized option families matched by prefix.
const KNOWN_OPTION_PREFIXES: &[&str] = &["-O", "-cpu="];

/// Recognized `--flag=value` options.
const KNOWN_EQUALS_OPTIONS: &[&str] = &["--diag_suppress", "--diag_warning", "--diag_error"];

/// Returns `true` if a valueless token is a flag this dialect recognizes.
fn is_known_option(token: &str) -> bool {
    KNOWN_BARE_OPTIONS.contains(&token)
        || KNOWN_OPTION_PREFIXES.iter().any(|p| token.starts_with(p))
}

/// The Green Hills dialect wrapper.
pub struct GhsWrapper {
    exe: ExePath,
    raw_args: Vec<String>,
    atoms: Vec<ArgAtom>,
    source: PathBuf,
    object: PathBuf,
}

impl GhsWrapper {
    /// Creates a wrapper for one invocation. `args` excludes argv[0].
    pub fn new(exe: ExePath, args: Vec<String>) -> Self {
        Self {
            exe,
            raw_args: args,
            atoms: Vec::new(),
            source: PathBuf::new(),
            object: PathBuf::new(),
        }
    }
}

impl ProgramWrapper for GhsWrapper {
    fn dialect(&self) -> &'static str {
        DIALECT
    }

    fn can_handle_command(&self) -> bool {
        let stem = self.exe.command_stem();
        let arch = match stem.strip_prefix("cc").or_else(|| stem.strip_prefix("cx")) {
            Some(arch) => arch,
            None => return false,
        };
        ARCH_SUFFIXES.contains(&arch)
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

            if TWO_TOKEN_OPTIONS.contains(&token.as_str()) {
                match self.raw_args.get(i) {
                    Some(value) => {
                        atoms.push(ArgAtom::separate(token, value));
                        i += 1;
                    }
                    None => errors.push(format!("missing argument for {token}")),
                }
                continue;
            }

            if let Some(prefix) = CONCAT_PREFIXES
                .iter()
                .find(|p| token.starts_with(**p) && token.len() > p.len())
            {
                atoms.push(ArgAtom::concatenated(*prefix, &token[prefix.len()..]));
                continue;
            }

            if token.starts_with("--") {
                if let Some((flag, value)) = token.split_once('=') {
                    if KNOWN_EQUALS_OPTIONS.contains(&flag) {
                        atoms.push(ArgAtom::equals(flag, value));
                    } else {
                        errors.push(format!("unsupported compiler argument {token}"));
                    }
                    continue;
                }
            }

            // Parsing is total: a flag outside the recognized tables could
            // affect semantics, so it declines caching instead of falling
            // through.
            if is_known_option(token) {
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

        if !atoms.iter().any(|a| a.flag == "-c") {
            return Err(WrapperError::Unsupported {
                dialect: DIALECT,
                reason: "only object compiles (-c) can be cached".to_string(),
            });
        }

        if sources.len() != 1 {
            return Err(WrapperError::Unsupported {
                dialect: DIALECT,
                reason: format!("a single source file is required, got {}", sources.len()),
            });
        }
        self.source = sources.into_iter().next().unwrap_or_default();

        self.object = atoms
            .iter()
            .find(|a| a.flag == "-o")
            .map(|a| PathBuf::from(&a.value))
            .unwrap_or_else(|| default_object_path(&self.source, ".o"));

        self.atoms = atoms;
        Ok(())
    }

    fn get_program_id(&mut self) -> Result<String, WrapperError> {
        // The drivers report their version with -V; the banner lands on
        // stderr and the exit code is not meaningful without input files.
        let cmd = vec![
            self.exe.literal().to_string_lossy().into_owned(),
            "-V".to_string(),
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
            .filter(|a| !matches!(a.flag.as_str(), "-I" | "-D" | "-U" | "-o"))
            .flat_map(ArgAtom::to_tokens)
            .collect()
    }

    fn preprocess_source(&mut self) -> Result<Vec<u8>, WrapperError> {
        let mut cmd = vec![self.exe.literal().to_string_lossy().into_owned()];
        let kept: Vec<ArgAtom> = self
            .atoms
            .iter()
            .filter(|a| !matches!(a.flag.as_str(), "-c" | "-o"))
            .cloned()
            .collect();
        cmd.extend(render_tokens(&kept));
        cmd.push("-E".to_string());
        cmd.push(self.source.to_string_lossy().into_owned());
        super::gcc::GccWrapper::run_preprocessor(DIALECT, &cmd)
    }

    fn get_build_files(&mut self) -> Result<BTreeMap<String, ExpectedFile>, WrapperError> {
        let mut files = BTreeMap::new();
        files.insert(
            "object_file".to_string(),
            ExpectedFile::required(self.object.clone()),
        );
        Ok(files)
    }
}
