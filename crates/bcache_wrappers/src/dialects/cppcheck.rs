//! Wrapper for the Cppcheck static analyzer.
//!
//! Cppcheck is not a compiler, but its invocation pattern mirrors one: a
//! preprocessable translation unit goes in, a deterministic report comes
//! out. A fixed allow-list of flags is enforced; anything outside it is
//! fatal, because an unknown flag could change the analysis result.

use std::collections::BTreeMap;
use std::path::Path;

use bcache_sys::{file, ExePath};

use crate::args::ArgAtom;
use crate::error::WrapperError;
use crate::wrapper::{ExpectedFile, ProgramWrapper};

const DIALECT: &str = "cppcheck";

// Tick this to a new number if the format has changed in a
// non-backwards-compatible way.
const HASH_VERSION: &str = "1";

/// Source extensions Cppcheck analyzes.
const SOURCE_EXTENSIONS: &[&str] = &[
    ".cpp", ".cxx", ".cc", ".c++", ".c", ".ipp", ".ixx", ".tpp", ".txx",
];

/// Options that take their value as a following token.
const TWO_PART_OPTIONS: &[&str] = &["-D", "-U", "-I", "-i", "-j", "-l"];

/// The supported argument allow-list. Everything else is fatal.
const SUPPORTED_OPTIONS: &[&str] = &[
    "--check-level",
    "--check-library",
    "--disable",
    "-D",
    "--enable",
    "--error-exitcode",
    "--exitcode-suppressions",
    "--file-filter",
    "-f",
    "--force",
    "--fsigned-char",
    "--funsigned-char",
    "-I",
    "-i",
    "--inconclusive",
    "--inline-suppr",
    "--language",
    "--max-configs",
    "--max-ctu-depth",
    "--output-file",
    "--platform",
    "--premium",
    "-q",
    "--quiet",
    "-rp",
    "--relative-paths",
    "--rule",
    "--showtime",
    "--std",
    "--suppress",
    "--template",
    "--template-location",
    "-U",
    "-v",
    "--verbose",
    "--xml",
];

fn is_source_file(token: &str) -> bool {
    let ext = file::extension(Path::new(token));
    SOURCE_EXTENSIONS.contains(&ext.as_str())
}

fn is_two_part_arg(arg: &str) -> bool {
    TWO_PART_OPTIONS.contains(&arg)
}

fn is_supported_arg(arg: &str) -> bool {
    SUPPORTED_OPTIONS.contains(&arg) || is_source_file(arg)
}

/// The Cppcheck dialect wrapper.
pub struct CppcheckWrapper {
    exe: ExePath,
    raw_args: Vec<String>,
    pairs: Vec<ArgAtom>,
}

impl CppcheckWrapper {
    /// Creates a wrapper for one invocation. `args` excludes argv[0].
    pub fn new(exe: ExePath, args: Vec<String>) -> Self {
        Self {
            exe,
            raw_args: args,
            pairs: Vec::new(),
        }
    }

    /// Parses the raw arguments into (flag, value) pairs.
    ///
    /// Four shapes: two-token (`-D name`), concatenated (`-Dname`, split
    /// into a pair to enforce consistent arguments), equals-joined
    /// (`--flag=value`), and bare.
    fn parse_arguments(&mut self) -> Result<(), WrapperError> {
        self.pairs.clear();

        let mut i = 0;
        while i < self.raw_args.len() {
            let arg = &self.raw_args[i];
            if is_two_part_arg(arg) && (i + 1) < self.raw_args.len() {
                self.pairs
                    .push(ArgAtom::separate(arg, &self.raw_args[i + 1]));
                i += 2;
                continue;
            }
            i += 1;

            // Can this argument be split into a pair?
            let first_two: String = arg.chars().take(2).collect();
            if arg.len() > 2 && is_two_part_arg(&first_two) {
                self.pairs.push(ArgAtom::separate(&first_two, &arg[2..]));
            } else if let Some((flag, value)) = arg.split_once('=') {
                self.pairs.push(ArgAtom::equals(flag, value));
            } else {
                self.pairs.push(ArgAtom::bare(arg));
            }
        }

        // Check that we only have supported arguments.
        for pair in &self.pairs {
            if !is_supported_arg(&pair.flag) {
                return Err(WrapperError::Unsupported {
                    dialect: DIALECT,
                    reason: format!(
                        "Unsupported argument: {}",
                        pair.to_tokens().join(" ")
                    ),
                });
            }
        }

        Ok(())
    }

    /// Builds the preprocessor command: everything except `--output-file`,
    /// with `-E` appended.
    fn make_preprocessor_cmd(&self) -> Vec<String> {
        let mut cmd = vec![self.exe.literal().to_string_lossy().into_owned()];
        for pair in &self.pairs {
            if pair.flag == "--output-file" {
                continue;
            }
            cmd.extend(pair.to_tokens());
        }
        cmd.push("-E".to_string());
        cmd
    }
}

impl ProgramWrapper for CppcheckWrapper {
    fn dialect(&self) -> &'static str {
        DIALECT
    }

    fn can_handle_command(&self) -> bool {
        self.exe.command_stem().contains("cppcheck")
    }

    fn resolve_args(&mut self) -> Result<(), WrapperError> {
        self.parse_arguments()
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
        if result.return_code != 0 {
            return Err(WrapperError::Probe {
                dialect: DIALECT,
                reason: "Unable to get the Cppcheck version information string.".to_string(),
            });
        }
        Ok(format!("{HASH_VERSION}{}", result.std_out))
    }

    fn get_relevant_arguments(&self) -> Vec<String> {
        let mut filtered = Vec::new();

        // The first argument is the analyzer binary without the path.
        filtered.push(file::file_name(self.exe.literal()));

        for pair in &self.pairs {
            // Includes, defines and undefines are subsumed by the
            // preprocessed text.
            // Note: the source file path is deliberately included, as it is
            // printed as given (relative or absolute) in the report.
            let is_unwanted = matches!(pair.flag.as_str(), "-I" | "-D" | "-U");
            if is_unwanted {
                continue;
            }
            if pair.flag == "--output-file" {
                // Special case: the presence of --output-file changes the
                // program output, but the file name itself does not matter
                // at this stage.
                filtered.push(pair.flag.clone());
            } else {
                filtered.extend(pair.to_tokens());
            }
        }

        filtered
    }

    fn preprocess_source(&mut self) -> Result<Vec<u8>, WrapperError> {
        let cmd = self.make_preprocessor_cmd();
        let result = bcache_sys::run(&cmd, true).map_err(|e| WrapperError::Probe {
            dialect: DIALECT,
            reason: e.to_string(),
        })?;
        if result.return_code != 0 {
            return Err(WrapperError::Probe {
                dialect: DIALECT,
                reason: "Preprocessing command was unsuccessful.".to_string(),
            });
        }
        Ok(result.std_out.into_bytes())
    }

    fn get_build_files(&mut self) -> Result<BTreeMap<String, ExpectedFile>, WrapperError> {
        let mut files = BTreeMap::new();
        for pair in &self.pairs {
            if pair.flag == "--output-file" {
                if files.contains_key("output_file") {
                    return Err(WrapperError::Unsupported {
                        dialect: DIALECT,
                        reason: "Only a single output file can be specified.".to_string(),
                    });
                }
                files.insert(
                    "output_file".to_string(),
                    ExpectedFile::required(pair.value.clone()),
                );
            }
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Joined;
    use std::path::PathBuf;

    fn wrapper_for(command: &str, args: &[&str]) -> CppcheckWrapper {
        let exe = ExePath::new(PathBuf::from(command), PathBuf::from(command));
        CppcheckWrapper::new(exe, args.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn claims_cppcheck() {
        assert!(wrapper_for("cppcheck", &[]).can_handle_command());
        assert!(wrapper_for("/usr/bin/cppcheck", &[]).can_handle_command());
        assert!(!wrapper_for("gcc", &[]).can_handle_command());
    }

    #[test]
    fn unknown_flag_is_fatal() {
        let mut w = wrapper_for("cppcheck", &["--unknown-flag", "src.cpp"]);
        let err = w.resolve_args().unwrap_err();
        assert!(err
            .to_string()
            .contains("Unsupported argument: --unknown-flag"));
    }

    #[test]
    fn double_output_file_is_fatal() {
        let mut w = wrapper_for(
            "cppcheck",
            &["--output-file=a.xml", "--output-file=b.xml", "x.cpp"],
        );
        w.resolve_args().unwrap();
        let err = w.get_build_files().unwrap_err();
        assert!(err
            .to_string()
            .contains("Only a single output file can be specified."));
    }

    #[test]
    fn output_file_captured() {
        let mut w = wrapper_for("cppcheck", &["--output-file=report.xml", "x.cpp"]);
        w.resolve_args().unwrap();
        let files = w.get_build_files().unwrap();
        let output = &files["output_file"];
        assert_eq!(output.path, PathBuf::from("report.xml"));
        assert!(output.required);
    }

    #[test]
    fn relevant_args_keep_bare_output_file_token() {
        let mut w = wrapper_for(
            "cppcheck",
            &["--enable=all", "-Iinc", "-DFOO=1", "--output-file=report.xml", "x.cpp"],
        );
        w.resolve_args().unwrap();
        assert_eq!(
            w.get_relevant_arguments(),
            vec!["cppcheck", "--enable=all", "--output-file", "x.cpp"]
        );
    }

    #[test]
    fn concatenated_defines_normalize_to_pairs() {
        let mut concat = wrapper_for("cppcheck", &["-DFOO=1", "x.cpp"]);
        concat.resolve_args().unwrap();
        let mut separate = wrapper_for("cppcheck", &["-D", "FOO=1", "x.cpp"]);
        separate.resolve_args().unwrap();
        assert_eq!(concat.pairs, separate.pairs);
    }

    #[test]
    fn preprocessor_cmd_drops_output_file() {
        let mut w = wrapper_for(
            "cppcheck",
            &["--enable=all", "-DFOO=1", "--output-file=report.xml", "x.cpp"],
        );
        w.resolve_args().unwrap();
        assert_eq!(
            w.make_preprocessor_cmd(),
            vec!["cppcheck", "--enable=all", "-D", "FOO=1", "x.cpp", "-E"]
        );
    }

    #[test]
    fn source_files_are_supported_arguments() {
        let mut w = wrapper_for("cppcheck", &["x.cpp", "y.CC"]);
        assert!(w.resolve_args().is_ok());
    }

    #[test]
    fn env_vars_are_empty() {
        let mut w = wrapper_for("cppcheck", &["x.cpp"]);
        w.resolve_args().unwrap();
        assert!(w.get_relevant_env_vars().unwrap().is_empty());
    }

    #[test]
    fn no_output_file_means_no_build_files() {
        let mut w = wrapper_for("cppcheck", &["--enable=all", "x.cpp"]);
        w.resolve_args().unwrap();
        assert!(w.get_build_files().unwrap().is_empty());
    }

    #[test]
    fn equals_joined_pairs_preserve_shape() {
        let mut w = wrapper_for("cppcheck", &["--std=c++17", "x.cpp"]);
        w.resolve_args().unwrap();
        let pair = &w.pairs[0];
        assert_eq!(pair.flag, "--std");
        assert_eq!(pair.value, "c++17");
        assert_eq!(pair.joined, Joined::Equals);
        assert_eq!(pair.to_tokens(), vec!["--std=c++17"]);
    }
}
