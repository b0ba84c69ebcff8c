//! Shared foundational types used across the buildcache compiler cache.
//!
//! This crate provides content hashing: the one-shot [`ContentHash`] used for
//! cache blob addressing and integrity checks, and the streaming
//! [`FingerprintHasher`] used to compose invocation fingerprints.

#![warn(missing_docs)]

pub mod hash;

pub use hash::{ContentHash, FingerprintHasher};
