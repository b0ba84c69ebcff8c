//! Compiler invocation normalization for buildcache.
//!
//! This crate is the core of the cache: it decides whether an invocation is
//! cacheable, what minimal fingerprint distinguishes it from non-equivalent
//! invocations, what artifacts it will produce, and what implicit inputs
//! must invalidate it.
//!
//! The pieces:
//!
//! - [`args`]: the dialect-independent argument model.
//! - [`wrapper`]: the contract every dialect wrapper implements.
//! - [`dialects`]: one wrapper per compiler family (GCC/Clang, MSVC,
//!   clang-cl, QCC, Green Hills, TI, Cppcheck, rustc).
//! - [`dispatch`]: selects the wrapper claiming an invocation.
//! - [`fingerprint`]: composes the stable cache key.

#![warn(missing_docs)]

pub mod args;
pub mod dialects;
pub mod dispatch;
pub mod error;
pub mod fingerprint;
pub mod wrapper;

pub use args::{ArgAtom, Joined};
pub use dispatch::find_wrapper;
pub use error::WrapperError;
pub use fingerprint::{compute_fingerprint, Fingerprint, HashMode};
pub use wrapper::{Capability, ExpectedFile, ProgramWrapper};
