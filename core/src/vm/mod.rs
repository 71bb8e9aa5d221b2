//! Bytecode runtime
//!
//! A [`Runtime`] owns one value stack and runs code held by registered
//! [`CodeEnv`](crate::codeenv::CodeEnv)s. Control crosses between bytecode and
//! native functions in both directions; see [`Runtime::invoke`] and
//! [`NativeArgs`].

mod dispatch;
mod frame;
mod native;
mod ops;
mod panic;
mod runtime;

pub use frame::*;
pub use native::NativeArgs;
pub use panic::VmPanic;
pub use runtime::*;

#[cfg(test)]
mod vm_test;
