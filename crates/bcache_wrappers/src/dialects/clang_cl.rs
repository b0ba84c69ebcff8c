//! Wrapper for `clang-cl`, Clang's MSVC-compatible driver.
//!
//! The argument grammar is MSVC's, so parsing, validation, projection and
//! preprocessing are shared with [`MsvcWrapper`]. Only identification
//! differs: the basename is `clang-cl`, and the binary answers `--version`
//! like the rest of the Clang family.

use std::collections::BTreeMap;

use bcache_sys::ExePath;

use crate::error::WrapperError;
use crate::wrapper::{ExpectedFile, ProgramWrapper};

use super::msvc::MsvcWrapper;

const DIALECT: &str = "clang-cl";

const HASH_VERSION: &str = "1";

/// The clang-cl dialect wrapper.
pub struct ClangClWrapper {
    inner: MsvcWrapper,
}

impl ClangClWrapper {
    /// Creates a wrapper for one invocation. `args` excludes argv[0].
    pub fn new(exe: ExePath, args: Vec<String>) -> Self {
        Self {
            inner: MsvcWrapper::new(exe, args),
        }
    }
}

impl ProgramWrapper for ClangClWrapper {
    fn dialect(&self) -> &'static str {
        DIALECT
    }

    fn can_handle_command(&self) -> bool {
        self.inner.exe().command_stem() == "clang-cl"
    }

    fn resolve_args(&mut self) -> Result<(), WrapperError> {
        self.inner.resolve_args().map_err(redialect)
    }

    fn get_program_id(&mut self) -> Result<String, WrapperError> {
        let cmd = vec![
            self.inner.exe().literal().to_string_lossy().into_owned(),
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
        self.inner.get_relevant_arguments()
    }

    fn preprocess_source(&mut self) -> Result<Vec<u8>, WrapperError> {
        self.inner.preprocess_source().map_err(redialect)
    }

    fn get_build_files(&mut self) -> Result<BTreeMap<String, ExpectedFile>, WrapperError> {
        self.inner.get_build_files().map_err(redialect)
    }
}

/// Rewrites delegated errors to carry this dialect's name.
fn redialect(err: WrapperError) -> WrapperError {
    match err {
        WrapperError::Unsupported { reason, .. } => WrapperError::Unsupported {
            dialect: DIALECT,
            reason,
        },
        WrapperError::Probe { reason, .. } => WrapperError::Probe {
            dialect: DIALECT,
            reason,
        },
        WrapperError::Inconsistent { reason, .. } => WrapperError::Inconsistent {
            dialect: DIALECT,
            reason,
        },
        WrapperError::Io { path, source, .. } => WrapperError::Io {
            dialect: DIALECT,
            path,
            source,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn wrapper_for(command: &str, args: &[&str]) -> ClangClWrapper {
        let exe = ExePath::new(PathBuf::from(command), PathBuf::from(command));
        ClangClWrapper::new(exe, args.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn claims_only_clang_cl() {
        assert!(wrapper_for("clang-cl", &[]).can_handle_command());
        assert!(wrapper_for("/opt/llvm/bin/clang-cl", &[]).can_handle_command());
        assert!(!wrapper_for("cl", &[]).can_handle_command());
        assert!(!wrapper_for("clang", &[]).can_handle_command());
    }

    #[test]
    fn msvc_grammar_applies() {
        let mut w = wrapper_for("clang-cl", &["/c", "/O2", "/DFOO=1", "main.cpp", "/Foa.obj"]);
        w.resolve_args().unwrap();
        assert_eq!(w.get_relevant_arguments(), vec!["/c", "/O2"]);
        let files = w.get_build_files().unwrap();
        assert_eq!(files["object_file"].path, PathBuf::from("a.obj"));
    }

    #[test]
    fn errors_carry_this_dialect() {
        let mut w = wrapper_for("clang-cl", &["main.cpp"]);
        let err = w.resolve_args().unwrap_err();
        assert!(err.to_string().starts_with("clang-cl:"));
    }

    #[test]
    fn unrecognized_flags_are_declined() {
        let mut w = wrapper_for("clang-cl", &["/c", "/Qunknown", "main.cpp"]);
        let err = w.resolve_args().unwrap_err();
        assert!(err.to_string().starts_with("clang-cl:"));
        assert!(err.to_string().contains("/Qunknown"));
    }
}
