//! System facades for the buildcache compiler cache.
//!
//! This crate provides the small set of OS services the wrapper layer
//! consumes: child-process execution with captured output, environment
//! variable access with scoped mutation guards, executable identity
//! resolution, and filesystem helpers (extension manipulation, filtered
//! directory walks, scoped temporary files).

#![warn(missing_docs)]

pub mod env;
pub mod error;
pub mod exe;
pub mod file;
pub mod proc;

pub use env::{env_defined, get_env, set_env, unset_env, EnvVar, ScopedSetEnv, ScopedUnsetEnv};
pub use error::SysError;
pub use exe::ExePath;
pub use file::TmpFile;
pub use proc::{run, RunResult};
