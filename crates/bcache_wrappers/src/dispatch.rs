//! Wrapper selection.
//!
//! Given the invoked executable and its arguments, each registered dialect
//! is constructed lazily and asked whether it claims the command; the
//! first match wins. `None` means the engine bypasses caching and execs
//! the compiler directly.

use bcache_sys::ExePath;

use crate::dialects::{
    ClangClWrapper, CppcheckWrapper, GccWrapper, GhsWrapper, MsvcWrapper, QccWrapper,
    RustWrapper, TiWrapper,
};
use crate::wrapper::ProgramWrapper;

type WrapperFactory = fn(ExePath, Vec<String>) -> Box<dyn ProgramWrapper>;

/// The registered dialects, most specific first. The GCC wrapper claims
/// the broadest set of driver names, so it goes last.
const FACTORIES: &[WrapperFactory] = &[
    |exe, args| Box::new(RustWrapper::new(exe, args)),
    |exe, args| Box::new(CppcheckWrapper::new(exe, args)),
    |exe, args| Box::new(ClangClWrapper::new(exe, args)),
    |exe, args| Box::new(MsvcWrapper::new(exe, args)),
    |exe, args| Box::new(QccWrapper::new(exe, args)),
    |exe, args| Box::new(GhsWrapper::new(exe, args)),
    |exe, args| Box::new(TiWrapper::new(exe, args)),
    |exe, args| Box::new(GccWrapper::new(exe, args)),
];

/// Returns the first wrapper claiming the invocation, or `None` if no
/// dialect matches.
pub fn find_wrapper(exe: &ExePath, args: &[String]) -> Option<Box<dyn ProgramWrapper>> {
    for factory in FACTORIES {
        let wrapper = factory(exe.clone(), args.to_vec());
        if wrapper.can_handle_command() {
            return Some(wrapper);
        }
    }
    None
}
