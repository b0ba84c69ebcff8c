//! Wrapper for the Microsoft Visual C++ compiler (`cl`).
//!
//! MSVC options accept either `/` or `-` as the option character; both are
//! preserved through the round trip. As with the GCC family, only `/c`
//! object compiles are cacheable and header discovery is subsumed by the
//! preprocessor (`/EP` to stdout).

use std::collections::BTreeMap;
use std::path::PathBuf;

use bcache_sys::ExePath;

use crate::args::{expand_response_files, render_tokens, ArgAtom};
use crate::dialects::{default_object_path, is_c_source_file};
use crate::error::WrapperError;
use crate::wrapper::{ExpectedFile, ProgramWrapper};

const DIALECT: &str = "msvc";

const HASH_VERSION: &str = "1";

/// Option bodies that disqualify an invocation: preprocessor-only output,
/// PDB debug info, and precompiled headers all produce artifacts we cannot
/// fingerprint deterministically.
const UNSUPPORTED_BODIES: &[&str] = &["E", "EP", "P", "Zi", "ZI"];

/// Option body prefixes that disqualify an invocation.
const UNSUPPORTED_BODY_PREFIXES: &[&str] = &["Yc", "Yu", "Fd", "FR", "Fr", "Fp"];

/// Recognized option bodies with no value, accepted as-is.
const KNOWN_BODIES: &[&str] = &[
    "c", "nologo", "w", "utf-8", "FS", "bigobj", "showIncludes", "TP", "TC", "Z7", "MD",
    "MT", "MDd", "MTd", "GR", "GR-", "GS", "GS-", "Gy", "GF", "permissive-", "MP",
];

/// Recognized option families matched by body prefix: warning levels and
/// ids, optimization, exception handling, conformance, standards, floating
/// point and architecture selection.
const KNOWN_BODY_PREFIXES: &[&str] = &["W", "wd", "we", "O", "EH", "Zc:", "std:", "fp:", "arch:"];

/// Returns `true` if a valueless option body is one this dialect
/// recognizes.
fn is_known_body(body: &str) -> bool {
    KNOWN_BODIES.contains(&body) || KNOWN_BODY_PREFIXES.iter().any(|p| body.starts_with(p))
}

/// The MSVC dialect wrapper.
pub struct MsvcWrapper {
    exe: ExePath,
    raw_args: Vec<String>,
    atoms: Vec<ArgAtom>,
    source: PathBuf,
    object: PathBuf,
}

impl MsvcWrapper {
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

    pub(crate) fn exe(&self) -> &ExePath {
        &self.exe
    }

    /// The option body without its `/` or `-` option character.
    fn body(flag: &str) -> &str {
        flag.get(1..).unwrap_or("")
    }

    /// Parses tokens into atoms plus source positionals. Shared with the
    /// clang-cl wrapper, which speaks the same grammar.
    pub(crate) fn parse_tokens(
        dialect: &'static str,
        tokens: &[String],
    ) -> Result<(Vec<ArgAtom>, Vec<PathBuf>), WrapperError> {
        let mut atoms = Vec::new();
        let mut sources = Vec::new();
        let mut errors = Vec::new();

        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            i += 1;

            // Source extensions win over the option characters so that
            // absolute paths like /src/main.cpp are not read as options.
            if is_c_source_file(token) {
                sources.push(PathBuf::from(token));
                continue;
            }

            if !token.starts_with('/') && !token.starts_with('-') {
                errors.push(format!("unrecognized input {token}"));
                continue;
            }

            let opt = &token[..1];
            let body = Self::body(token);

            if UNSUPPORTED_BODIES.contains(&body)
                || UNSUPPORTED_BODY_PREFIXES
                    .iter()
                    .any(|p| body.starts_with(p))
            {
                errors.push(format!("unsupported compiler argument {token}"));
                continue;
            }

            // /Fo takes its value attached.
            if let Some(value) = body.strip_prefix("Fo") {
                if value.is_empty() {
                    errors.push(format!("missing argument for {token}"));
                } else {
                    atoms.push(ArgAtom::concatenated(format!("{opt}Fo"), value));
                }
                continue;
            }

            // /D, /I, /U: attached or separate value.
            if let Some(letter) = body
                .chars()
                .next()
                .filter(|c| matches!(c, 'D' | 'I' | 'U'))
            {
                let flag = format!("{opt}{letter}");
                if body.len() > 1 {
                    atoms.push(ArgAtom::concatenated(flag, &body[1..]));
                } else {
                    match tokens.get(i) {
                        Some(value) => {
                            atoms.push(ArgAtom::separate(flag, value));
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
            if is_known_body(body) {
                atoms.push(ArgAtom::bare(token));
            } else {
                errors.push(format!("unsupported compiler argument {token}"));
            }
        }

        if !errors.is_empty() {
            return Err(WrapperError::Unsupported {
                dialect,
                reason: errors.join("\n"),
            });
        }

        Ok((atoms, sources))
    }

    /// Validates the parsed invocation. Shared with clang-cl.
    pub(crate) fn resolve_parsed(
        dialect: &'static str,
        atoms: Vec<ArgAtom>,
        sources: Vec<PathBuf>,
    ) -> Result<(Vec<ArgAtom>, PathBuf, PathBuf), WrapperError> {
        let compile_step = atoms.iter().any(|a| Self::body(&a.flag) == "c");
        if !compile_step {
            return Err(WrapperError::Unsupported {
                dialect,
                reason: "only object compiles (/c) can be cached".to_string(),
            });
        }

        if sources.len() != 1 {
            return Err(WrapperError::Unsupported {
                dialect,
                reason: format!("a single source file is required, got {}", sources.len()),
            });
        }
        let source = sources.into_iter().next().unwrap_or_default();

        let object = atoms
            .iter()
            .find(|a| Self::body(&a.flag) == "Fo")
            .map(|a| {
                // A trailing separator means an output directory.
                if a.value.ends_with('/') || a.value.ends_with('\\') {
                    PathBuf::from(&a.value).join(default_object_path(&source, ".obj"))
                } else {
                    PathBuf::from(&a.value)
                }
            })
            .unwrap_or_else(|| default_object_path(&source, ".obj"));

        Ok((atoms, source, object))
    }

    /// The canonical relevant-argument projection. Shared with clang-cl.
    pub(crate) fn project_relevant(atoms: &[ArgAtom]) -> Vec<String> {
        atoms
            .iter()
            .filter(|a| !matches!(Self::body(&a.flag), "D" | "I" | "U" | "Fo"))
            .flat_map(ArgAtom::to_tokens)
            .collect()
    }

    /// Builds the preprocessor command (`/EP` to stdout). Shared with
    /// clang-cl.
    pub(crate) fn preprocess_command(&self) -> Vec<String> {
        let mut cmd = vec![self.exe.literal().to_string_lossy().into_owned()];
        let kept: Vec<ArgAtom> = self
            .atoms
            .iter()
            .filter(|a| !matches!(Self::body(&a.flag), "c" | "Fo"))
            .cloned()
            .collect();
        cmd.extend(render_tokens(&kept));
        cmd.push("/EP".to_string());
        cmd.push(self.source.to_string_lossy().into_owned());
        cmd
    }
}

impl ProgramWrapper for MsvcWrapper {
    fn dialect(&self) -> &'static str {
        DIALECT
    }

    fn can_handle_command(&self) -> bool {
        self.exe.command_stem() == "cl"
    }

    fn resolve_args(&mut self) -> Result<(), WrapperError> {
        let tokens = expand_response_files(DIALECT, &self.raw_args)?;
        let (atoms, sources) = Self::parse_tokens(DIALECT, &tokens)?;
        let (atoms, source, object) = Self::resolve_parsed(DIALECT, atoms, sources)?;
        self.atoms = atoms;
        self.source = source;
        self.object = object;
        Ok(())
    }

    fn get_program_id(&mut self) -> Result<String, WrapperError> {
        // cl prints its version banner to stderr when run without input.
        let cmd = vec![self.exe.literal().to_string_lossy().into_owned()];
        let result = bcache_sys::run(&cmd, true).map_err(|e| WrapperError::Probe {
            dialect: DIALECT,
            reason: e.to_string(),
        })?;
        let banner = if result.std_out.is_empty() {
            result.std_err
        } else {
            result.std_out
        };
        if banner.is_empty() {
            return Err(WrapperError::Probe {
                dialect: DIALECT,
                reason: "unable to get the compiler version information string".to_string(),
            });
        }
        Ok(format!("{HASH_VERSION}{banner}"))
    }

    fn get_relevant_arguments(&self) -> Vec<String> {
        Self::project_relevant(&self.atoms)
    }

    fn preprocess_source(&mut self) -> Result<Vec<u8>, WrapperError> {
        let cmd = self.preprocess_command();
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
