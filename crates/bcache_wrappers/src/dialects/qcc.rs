//! Wrapper for the QNX `qcc` / `q++` drivers.
//!
//! qcc is a thin shell over a GCC backend, so the argument grammar,
//! validation, projection and preprocessing are shared with [`GccWrapper`].
//! Two things differ: the `-V<variant>` selector that picks the backing
//! toolchain is a relevant argument (kept by the shared projection as a
//! bare atom), and the version probe is `-V`, since qcc does not answer
//! `--version`.

use std::collections::BTreeMap;

use bcache_sys::ExePath;

use crate::error::WrapperError;
use crate::wrapper::{ExpectedFile, ProgramWrapper};

use super::gcc::GccWrapper;

const DIALECT: &str = "qcc";

const HASH_VERSION: &str = "1";

/// The QCC dialect wrapper.
pub struct QccWrapper {
    inner: GccWrapper,
}

impl QccWrapper {
    /// Creates a wrapper for one invocation. `args` excludes argv[0].
    pub fn new(exe: ExePath, args: Vec<String>) -> Self {
        Self {
            inner: GccWrapper::new(exe, args),
        }
    }
}

impl ProgramWrapper for QccWrapper {
    fn dialect(&self) -> &'static str {
        DIALECT
    }

    fn can_handle_command(&self) -> bool {
        matches!(self.inner.exe().command_stem().as_str(), "qcc" | "q++")
    }

    fn resolve_args(&mut self) -> Result<(), WrapperError> {
        self.inner.resolve_args().map_err(redialect)
    }

    fn get_program_id(&mut self) -> Result<String, WrapperError> {
        // `qcc -V` lists the installed toolchain variants; the banner goes
        // to stderr and the exit code is not meaningful, so only empty
        // output counts as a failed probe.
        let cmd = vec![
            self.inner.exe().literal().to_string_lossy().into_owned(),
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
