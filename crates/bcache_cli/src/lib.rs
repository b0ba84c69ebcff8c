//! Library surface of the buildcache CLI.
//!
//! The binary in `main.rs` is a thin argument-parsing shell; the engine
//! that orchestrates dispatch, fingerprinting, lookup and capture lives
//! here so integration tests can drive it directly.

#![warn(missing_docs)]

pub mod engine;
