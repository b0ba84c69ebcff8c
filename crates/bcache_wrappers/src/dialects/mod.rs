//! Dialect wrappers, one per compiler family.

pub mod clang_cl;
pub mod cppcheck;
pub mod gcc;
pub mod ghs;
pub mod msvc;
pub mod qcc;
pub mod rustc;
pub mod ti;

pub use clang_cl::ClangClWrapper;
pub use cppcheck::CppcheckWrapper;
pub use gcc::GccWrapper;
pub use ghs::GhsWrapper;
pub use msvc::MsvcWrapper;
pub use qcc::QccWrapper;
pub use rustc::RustWrapper;
pub use ti::TiWrapper;

use std::path::{Path, PathBuf};

/// Source extensions recognized by the C-family compile-step wrappers.
pub(crate) const C_SOURCE_EXTENSIONS: &[&str] = &[
    ".c", ".cc", ".cpp", ".cxx", ".c++", ".m", ".mm",
];

/// Returns `true` if the token names a C-family source file.
pub(crate) fn is_c_source_file(token: &str) -> bool {
    let ext = bcache_sys::file::extension(Path::new(token));
    C_SOURCE_EXTENSIONS.contains(&ext.as_str())
}

/// The default object path a driver produces for a source file: the source
/// basename with the given extension, in the working directory.
pub(crate) fn default_object_path(source: &Path, ext: &str) -> PathBuf {
    let stem = source.file_stem().unwrap_or_default();
    let mut name = stem.to_os_string();
    name.push(ext);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_source_detection() {
        assert!(is_c_source_file("main.c"));
        assert!(is_c_source_file("src/widget.CPP"));
        assert!(is_c_source_file("a.c++"));
        assert!(!is_c_source_file("lib.rs"));
        assert!(!is_c_source_file("a.o"));
        assert!(!is_c_source_file("noext"));
    }

    #[test]
    fn default_object_in_working_directory() {
        assert_eq!(
            default_object_path(Path::new("src/deep/a.c"), ".o"),
            PathBuf::from("a.o")
        );
        assert_eq!(
            default_object_path(Path::new("b.cpp"), ".obj"),
            PathBuf::from("b.obj")
        );
    }
}
