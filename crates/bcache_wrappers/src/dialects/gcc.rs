//! Wrapper for the GCC and Clang driver family.
//!
//! Covers `gcc`, `g++`, `cc`, `c++`, `clang`, `clang++` and cross drivers
//! like `arm-none-eabi-gcc`. Only single-source object compiles (`-c`) are
//! cacheable. Header discovery is subsumed by preprocessing: the engine
//! hashes the `-E` output, so include paths and macro definitions are not
//! part of the relevant-argument projection.

use std::collections::BTreeMap;
use std::path::PathBuf;

use bcache_sys::{file, ExePath};

use crate::args::{expand_response_files, render_tokens, ArgAtom};
use crate::dialects::{default_object_path, is_c_source_file};
use crate::error::WrapperError;
use crate::wrapper::{ExpectedFile, ProgramWrapper};

const DIALECT: &str = "gcc";

// Tick this if the fingerprint composition changes incompatibly.
const HASH_VERSION: &str = "1";

/// Driver basenames this wrapper claims (exact or as a `-` suffix).
const DRIVER_NAMES: &[&str] = &["gcc", "g++", "cc", "c++", "clang", "clang++"];

/// Options whose value may follow as a separate token.
const TWO_TOKEN_OPTIONS: &[&str] = &[
    "-o", "-I", "-D", "-U", "-isystem", "-include", "-imacros", "-x", "-MF", "-MT", "-MQ",
    "-arch", "-target", "-L", "-l",
];

/// Option prefixes that accept a concatenated value (`-Ipath`).
const CONCAT_PREFIXES: &[&str] = &["-I", "-D", "-U", "-o", "-l", "-L"];

/// Options that disqualify an invocation from caching.
const UNSUPPORTED_OPTIONS: &[&str] = &["-E", "-S", "-M", "-MM", "-save-temps", "--coverage"];

/// Recognized flags with no value, accepted as-is.
const KNOWN_BARE_OPTIONS: &[&str] = &[
    "-c", "-v", "--verbose", "-w", "-pipe", "-pthread", "-ansi", "-pedantic",
    "-pedantic-errors", "-nostdinc", "-nostdinc++", "-MD", "-MMD", "-MP",
];

/// Recognized option families matched by prefix: optimization and debug
/// levels, language standards, machine selection, warning suppression,
/// diagnostics color, and the `-V<variant>` toolchain selector that QCC
/// routes through this grammar.
const KNOWN_OPTION_PREFIXES: &[&str] = &[
    "-O", "-g", "-std=", "-m", "-Wno-", "-fdiagnostics-color", "-V",
];

/// The `-f` code generation options this wrapper understands. An `-f`
/// option outside this set could affect semantics in ways the fingerprint
/// does not model, so it declines caching.
const KNOWN_F_OPTIONS: &[&str] = &[
    "-fPIC", "-fpic", "-fPIE", "-fpie", "-fexceptions", "-fno-exceptions",
    "-frtti", "-fno-rtti", "-fsigned-char", "-funsigned-char",
    "-fomit-frame-pointer", "-fno-omit-frame-pointer", "-ffunction-sections",
    "-fdata-sections", "-fstack-protector", "-fstack-protector-strong",
    "-fstack-protector-all", "-fstrict-aliasing", "-fno-strict-aliasing",
    "-ffast-math", "-fno-builtin", "-ffreestanding", "-fshort-enums",
    "-fno-common", "-fvisibility=default", "-fvisibility=hidden",
    "-fno-inline", "-finline-functions", "-funroll-loops",
];

/// The warning selections this wrapper understands. Warnings shape the
/// diagnostics, and diagnostics are part of the cached output.
const KNOWN_W_OPTIONS: &[&str] = &[
    "-Wall", "-Wextra", "-Werror", "-Wpedantic", "-Wshadow", "-Wconversion",
    "-Wsign-conversion", "-Wsign-compare", "-Wundef", "-Wunused", "-Wvla",
    "-Wuninitialized", "-Wdouble-promotion", "-Wfloat-equal", "-Wformat",
    "-Wformat=2", "-Wwrite-strings", "-Wcast-align", "-Wcast-qual",
    "-Wswitch-enum", "-Wswitch-default", "-Wmissing-declarations",
    "-Wmissing-prototypes", "-Wstrict-prototypes", "-Wnull-dereference",
];

/// Recognized `--flag=value` options.
const KNOWN_EQUALS_OPTIONS: &[&str] = &["--sysroot", "--std", "--param", "--target"];

/// Returns `true` if a valueless token is a flag this dialect recognizes.
fn is_known_option(token: &str) -> bool {
    KNOWN_BARE_OPTIONS.contains(&token)
        || KNOWN_F_OPTIONS.contains(&token)
        || KNOWN_W_OPTIONS.contains(&token)
        || KNOWN_OPTION_PREFIXES.iter().any(|p| token.starts_with(p))
}

/// Options excluded from the relevant-argument projection: include paths
/// and defines are captured by the preprocessed text, the rest are output
/// locations, dep-file plumbing, or pure diagnostics decoration.
const IRRELEVANT_OPTIONS: &[&str] = &[
    "-I", "-isystem", "-include", "-imacros", "-D", "-U", "-o", "-MF", "-MT", "-MQ", "-MD",
    "-MMD", "-MP", "-v", "--verbose",
];

/// Options dropped when building the preprocessor command line.
const NON_PREPROCESS_OPTIONS: &[&str] =
    &["-c", "-o", "-MF", "-MT", "-MQ", "-MD", "-MMD", "-MP"];

/// The GCC/Clang dialect wrapper.
pub struct GccWrapper {
    exe: ExePath,
    raw_args: Vec<String>,
    atoms: Vec<ArgAtom>,
    source: PathBuf,
    object: PathBuf,
    dep_file: Option<PathBuf>,
}

impl GccWrapper {
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

    pub(crate) fn exe(&self) -> &ExePath {
        &self.exe
    }

    /// Parses tokens into atoms plus the single source positional.
    ///
    /// Shared with the QCC wrapper, which speaks the same grammar.
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

            if !token.starts_with('-') {
                if is_c_source_file(token) {
                    sources.push(PathBuf::from(token));
                } else {
                    errors.push(format!("unrecognized input {token}"));
                }
                continue;
            }

            if token == "-" {
                errors.push("cannot cache compilation from standard input".to_string());
                continue;
            }

            if UNSUPPORTED_OPTIONS.contains(&token.as_str())
                || token.starts_with("-save-temps=")
                || token.starts_with("-fprofile")
                || token == "-ftest-coverage"
            {
                errors.push(format!("unsupported compiler argument {token}"));
                continue;
            }

            if TWO_TOKEN_OPTIONS.contains(&token.as_str()) {
                match tokens.get(i) {
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
                dialect,
                reason: errors.join("\n"),
            });
        }

        Ok((atoms, sources))
    }

    /// Validates the parsed invocation and extracts the compile facts.
    /// Shared with the QCC wrapper.
    pub(crate) fn resolve_parsed(
        dialect: &'static str,
        atoms: Vec<ArgAtom>,
        sources: Vec<PathBuf>,
    ) -> Result<(Vec<ArgAtom>, PathBuf, PathBuf, Option<PathBuf>), WrapperError> {
        let compile_step = atoms.iter().any(|a| a.flag == "-c");
        if !compile_step {
            return Err(WrapperError::Unsupported {
                dialect,
                reason: "only object compiles (-c) can be cached".to_string(),
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
            .find(|a| a.flag == "-o")
            .map(|a| PathBuf::from(&a.value))
            .unwrap_or_else(|| default_object_path(&source, ".o"));

        let dep_file = atoms
            .iter()
            .find(|a| a.flag == "-MF")
            .map(|a| PathBuf::from(&a.value))
            .or_else(|| {
                atoms
                    .iter()
                    .any(|a| a.flag == "-MD" || a.flag == "-MMD")
                    .then(|| file::change_extension(&object, ".d"))
            });

        Ok((atoms, source, object, dep_file))
    }

    /// Builds the canonical relevant-argument projection. Shared with QCC.
    pub(crate) fn project_relevant(atoms: &[ArgAtom]) -> Vec<String> {
        atoms
            .iter()
            .filter(|a| {
                !IRRELEVANT_OPTIONS.contains(&a.flag.as_str())
                    && !a.flag.starts_with("-fdiagnostics-color")
            })
            .flat_map(ArgAtom::to_tokens)
            .collect()
    }

    /// Builds the preprocessor command line (`-E` to stdout). Shared with
    /// QCC; GHS uses the same shape with its own parse.
    pub(crate) fn preprocess_command(&self) -> Vec<String> {
        let mut cmd = vec![self.exe.literal().to_string_lossy().into_owned()];
        let kept: Vec<ArgAtom> = self
            .atoms
            .iter()
            .filter(|a| !NON_PREPROCESS_OPTIONS.contains(&a.flag.as_str()))
            .cloned()
            .collect();
        cmd.extend(render_tokens(&kept));
        cmd.push("-E".to_string());
        cmd.push(self.source.to_string_lossy().into_owned());
        cmd
    }

    pub(crate) fn run_preprocessor(
        dialect: &'static str,
        cmd: &[String],
    ) -> Result<Vec<u8>, WrapperError> {
        let result = bcache_sys::run(cmd, true).map_err(|e| WrapperError::Probe {
            dialect,
            reason: e.to_string(),
        })?;
        if result.return_code != 0 {
            return Err(WrapperError::Probe {
                dialect,
                reason: "preprocessing command was unsuccessful".to_string(),
            });
        }
        Ok(result.std_out.into_bytes())
    }
}

impl ProgramWrapper for GccWrapper {
    fn dialect(&self) -> &'static str {
        DIALECT
    }

    fn can_handle_command(&self) -> bool {
        let stem = self.exe.command_stem();
        DRIVER_NAMES
            .iter()
            .any(|name| stem == *name || stem.ends_with(&format!("-{name}")))
    }

    fn resolve_args(&mut self) -> Result<(), WrapperError> {
        let tokens = expand_response_files(DIALECT, &self.raw_args)?;
        let (atoms, sources) = Self::parse_tokens(DIALECT, &tokens)?;
        let (atoms, source, object, dep_file) = Self::resolve_parsed(DIALECT, atoms, sources)?;
        self.atoms = atoms;
        self.source = source;
        self.object = object;
        self.dep_file = dep_file;
        Ok(())
    }

    fn get_program_id(&mut self) -> Result<String, WrapperError> {
        let cmd = vec![
            self.exe.literal().to_string_lossy().into_owned(),
            "--version".to_string(),
        ];
        let result = bcache_sys::run(&cmd, true).map_err(|e| WrapperError::Probe {
            dialect: DIALECT,
            reason: e.to_string(),
        })?;
        if result.return_code != 0 || result.std_out.is_empty() {
            return Err(WrapperError::Probe {
                dialect: DIALECT,
                reason: "unable to get the compiler version information string".to_string(),
            });
        }
        Ok(format!("{HASH_VERSION}{}", result.std_out))
    }

    fn get_relevant_arguments(&self) -> Vec<String> {
        Self::project_relevant(&self.atoms)
    }

    fn preprocess_source(&mut self) -> Result<Vec<u8>, WrapperError> {
        let cmd = self.preprocess_command();
        Self::run_preprocessor(DIALECT, &cmd)
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

#[cfg(test)]
mod tests {
    use super::*;

    fn wrapper_for(command: &str, args: &[&str]) -> GccWrapper {
        let exe = ExePath::new(PathBuf::from(command), PathBuf::from(command));
        GccWrapper::new(exe, args.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn claims_driver_names() {
        for name in ["gcc", "g++", "cc", "c++", "clang", "clang++"] {
            assert!(wrapper_for(name, &[]).can_handle_command(), "{name}");
        }
        assert!(wrapper_for("/opt/bin/arm-none-eabi-gcc", &[]).can_handle_command());
        assert!(wrapper_for("x86_64-linux-gnu-g++", &[]).can_handle_command());
    }

    #[test]
    fn declines_other_tools() {
        for name in ["rustc", "cl", "clang-cl", "cppcheck", "armcl", "ccppc"] {
            assert!(!wrapper_for(name, &[]).can_handle_command(), "{name}");
        }
    }

    #[test]
    fn hit_path_scenario() {
        // gcc -O2 -DFOO=1 -I./inc -c a.c -o a.o
        let mut w = wrapper_for("gcc", &["-O2", "-DFOO=1", "-I./inc", "-c", "a.c", "-o", "a.o"]);
        w.resolve_args().unwrap();

        // Includes, defines and the output path are not relevant.
        assert_eq!(w.get_relevant_arguments(), vec!["-O2", "-c"]);

        let files = w.get_build_files().unwrap();
        assert_eq!(files.len(), 1);
        let object = &files["object_file"];
        assert_eq!(object.path, PathBuf::from("a.o"));
        assert!(object.required);
    }

    #[test]
    fn default_object_name_without_dash_o() {
        let mut w = wrapper_for("gcc", &["-c", "src/widget.cpp"]);
        w.resolve_args().unwrap();
        let files = w.get_build_files().unwrap();
        assert_eq!(files["object_file"].path, PathBuf::from("widget.o"));
    }

    #[test]
    fn define_shapes_classify_identically() {
        let mut concat = wrapper_for("gcc", &["-DFOO=1", "-c", "a.c"]);
        concat.resolve_args().unwrap();
        let mut separate = wrapper_for("gcc", &["-D", "FOO=1", "-c", "a.c"]);
        separate.resolve_args().unwrap();

        let pick = |w: &GccWrapper| {
            let a = w.atoms.iter().find(|a| a.flag == "-D").unwrap();
            (a.flag.clone(), a.value.clone())
        };
        assert_eq!(pick(&concat), pick(&separate));
    }

    #[test]
    fn missing_dash_c_is_unsupported() {
        let mut w = wrapper_for("gcc", &["a.c", "-o", "a.o"]);
        let err = w.resolve_args().unwrap_err();
        assert!(matches!(err, WrapperError::Unsupported { .. }));
        assert!(err.to_string().contains("-c"));
    }

    #[test]
    fn multiple_sources_are_unsupported() {
        let mut w = wrapper_for("gcc", &["-c", "a.c", "b.c"]);
        assert!(w.resolve_args().is_err());
    }

    #[test]
    fn preprocessor_only_flags_are_unsupported() {
        for flag in ["-E", "-S", "-M", "-MM", "-save-temps", "--coverage"] {
            let mut w = wrapper_for("gcc", &[flag, "-c", "a.c"]);
            let err = w.resolve_args().unwrap_err();
            assert!(matches!(err, WrapperError::Unsupported { .. }), "{flag}");
        }
    }

    #[test]
    fn profiling_flags_are_unsupported() {
        let mut w = wrapper_for("gcc", &["-fprofile-arcs", "-c", "a.c"]);
        assert!(w.resolve_args().is_err());
    }

    #[test]
    fn unrecognized_flags_are_declined() {
        for flag in ["-flto", "-fsanitize=address", "-Wfoo-nonexistent", "--unknown=1"] {
            let mut w = wrapper_for("gcc", &[flag, "-c", "a.c"]);
            let err = w.resolve_args().unwrap_err();
            assert!(matches!(err, WrapperError::Unsupported { .. }), "{flag}");
            assert!(err.to_string().contains(flag), "{flag}");
        }
    }

    #[test]
    fn recognized_flag_families_are_accepted() {
        let mut w = wrapper_for(
            "gcc",
            &[
                "-fPIC", "-Wall", "-Wno-unused-local-typedef", "-march=armv7-a", "-std=c11",
                "-g3", "-Os", "-c", "a.c",
            ],
        );
        w.resolve_args().unwrap();
        let relevant = w.get_relevant_arguments();
        assert!(relevant.contains(&"-fPIC".to_string()));
        assert!(relevant.contains(&"-march=armv7-a".to_string()));
    }

    #[test]
    fn dep_file_from_mf() {
        let mut w = wrapper_for("gcc", &["-c", "a.c", "-o", "a.o", "-MD", "-MF", "deps/a.d"]);
        w.resolve_args().unwrap();
        let files = w.get_build_files().unwrap();
        assert_eq!(files["dep_file"].path, PathBuf::from("deps/a.d"));
        assert!(files["dep_file"].required);
    }

    #[test]
    fn dep_file_derived_from_md() {
        let mut w = wrapper_for("gcc", &["-c", "a.c", "-o", "out/a.o", "-MMD"]);
        w.resolve_args().unwrap();
        let files = w.get_build_files().unwrap();
        assert_eq!(files["dep_file"].path, PathBuf::from("out/a.d"));
    }

    #[test]
    fn dep_flags_are_not_relevant() {
        let mut with_deps = wrapper_for(
            "gcc",
            &["-O2", "-c", "a.c", "-o", "a.o", "-MD", "-MF", "a.d", "-MT", "a.o"],
        );
        with_deps.resolve_args().unwrap();
        let mut without = wrapper_for("gcc", &["-O2", "-c", "a.c", "-o", "a.o"]);
        without.resolve_args().unwrap();
        assert_eq!(
            with_deps.get_relevant_arguments(),
            without.get_relevant_arguments()
        );
    }

    #[test]
    fn verbosity_and_color_are_not_relevant() {
        let mut noisy = wrapper_for(
            "gcc",
            &["-O2", "-v", "-fdiagnostics-color=always", "-c", "a.c", "-o", "a.o"],
        );
        noisy.resolve_args().unwrap();
        let mut plain = wrapper_for("gcc", &["-O2", "-c", "a.c", "-o", "a.o"]);
        plain.resolve_args().unwrap();
        assert_eq!(
            noisy.get_relevant_arguments(),
            plain.get_relevant_arguments()
        );
    }

    #[test]
    fn preprocess_command_shape() {
        let mut w = wrapper_for("gcc", &["-O2", "-DFOO=1", "-I./inc", "-c", "a.c", "-o", "a.o"]);
        w.resolve_args().unwrap();
        let cmd = w.preprocess_command();
        // Defines and includes stay, -c/-o go, -E and the source are appended.
        assert_eq!(cmd, vec!["gcc", "-O2", "-DFOO=1", "-I./inc", "-E", "a.c"]);
    }

    #[test]
    fn round_trip_reparse_is_stable() {
        let mut w = wrapper_for(
            "gcc",
            &["-O2", "-D", "FOO=1", "-Iinc", "-c", "a.c", "-o", "a.o", "--sysroot=/sr"],
        );
        w.resolve_args().unwrap();

        let mut rendered = render_tokens(&w.atoms);
        rendered.push(w.source.to_string_lossy().into_owned());

        let mut again = wrapper_for("gcc", &[]);
        again.raw_args = rendered;
        again.resolve_args().unwrap();

        assert_eq!(w.atoms, again.atoms);
        assert_eq!(w.source, again.source);
    }

    #[test]
    fn missing_value_for_two_token_option() {
        let mut w = wrapper_for("gcc", &["-c", "a.c", "-o"]);
        let err = w.resolve_args().unwrap_err();
        assert!(err.to_string().contains("missing argument for -o"));
    }

    #[test]
    fn stdin_input_is_unsupported() {
        let mut w = wrapper_for("gcc", &["-c", "-", "-o", "a.o"]);
        assert!(w.resolve_args().is_err());
    }

    #[test]
    fn unrecognized_positional_is_unsupported() {
        let mut w = wrapper_for("gcc", &["-c", "a.c", "extra.o"]);
        assert!(w.resolve_args().is_err());
    }
}
