//! Child-process execution with captured output.

use std::io::Write;
use std::process::Command;

use crate::error::SysError;

/// The captured result of a finished child process.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// The child's exit code (`-1` if terminated by a signal).
    pub return_code: i32,
    /// Everything the child wrote to stdout, lossily decoded.
    pub std_out: String,
    /// Everything the child wrote to stderr, lossily decoded.
    pub std_err: String,
}

impl RunResult {
    /// Returns `true` if the child exited with code zero.
    pub fn ok(&self) -> bool {
        self.return_code == 0
    }
}

/// Runs a command to completion, capturing stdout and stderr.
///
/// `args[0]` is the program; the remaining elements are its arguments. When
/// `quiet` is false, the captured output is forwarded to this process's own
/// stdout/stderr after the child exits.
pub fn run(args: &[String], quiet: bool) -> Result<RunResult, SysError> {
    let program = args.first().ok_or(SysError::EmptyCommand)?;

    let output = Command::new(program)
        .args(&args[1..])
        .output()
        .map_err(|e| SysError::Spawn {
            program: program.clone(),
            source: e,
        })?;

    let result = RunResult {
        return_code: output.status.code().unwrap_or(-1),
        std_out: String::from_utf8_lossy(&output.stdout).into_owned(),
        std_err: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if !quiet {
        // Forward verbatim; the child's output belongs to the caller's user.
        let _ = std::io::stdout().write_all(result.std_out.as_bytes());
        let _ = std::io::stderr().write_all(result.std_err.as_bytes());
    }

    Ok(result)
}
