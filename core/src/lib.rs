pub mod bytecode;
pub mod codeenv;
pub mod lir;
pub mod metrics;
pub mod util;
pub mod value;
pub mod vm;

pub use codeenv::{CodeAddress, CodeEnv};
pub use lir::{CommitError, CompilerOptions, LirCompiler, LirFunction};
pub use value::{CallStatus, Value};
pub use vm::{NativeArgs, Runtime, RuntimeOptions};
