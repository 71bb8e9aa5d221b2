pub(super) use crate::{
    bytecode::{CallMode, CastKind, ConsKind, Operator},
    codeenv::{CodeAddress, CodeEnv},
    lir::{DataRef, FunctionId, LirCompiler, LirFunction},
    value::{CallStatus, FunctionRef, Value},
    vm::{NativeArgs, Runtime, RuntimeOptions},
};

pub(super) fn entry(env: &CodeEnv, id: FunctionId) -> CodeAddress {
    env.entry_address(id.index()).expect("function entry")
}

pub(super) fn native(function: fn(&mut Runtime, NativeArgs) -> CallStatus) -> Value {
    Value::Function(FunctionRef::Native(function))
}

/// `fn(x) -> x + x`, the only function of its own environment.
pub(super) fn doubler_env() -> (CodeEnv, CodeAddress) {
    let mut compiler = LirCompiler::default();
    let mut f = LirFunction::new("double");
    let x = f.argument(0);
    let r = f.register();
    f.op(Operator::AddI, r, x, x);
    f.ret(r);
    let id = compiler.add_function(f);
    let env = compiler.commit().expect("commits");
    let addr = entry(&env, id);
    (env, addr)
}

/// Recursive `sum(n) = n + sum(n - 1)`, `sum(0) = 0`.
pub(super) fn recursive_sum_env() -> (CodeEnv, CodeAddress) {
    let mut compiler = LirCompiler::default();
    let sum = compiler.declare();
    let sum_ref = compiler.function_constant(sum);
    let zero = compiler.constant(Value::Int(0));
    let one = compiler.constant(Value::Int(1));

    let mut f = LirFunction::new("sum");
    let n = f.argument(0);
    let z = f.register();
    let base = f.label();
    f.load(z, zero);
    f.jeq(n, z, base);
    let o = f.register();
    let m = f.register();
    let callee = f.register();
    let partial = f.register();
    let total = f.register();
    f.load(o, one);
    f.op(Operator::SubI, m, n, o);
    f.push(m);
    f.load(callee, sum_ref);
    f.call(CallMode::Script, callee, partial, 1);
    f.op(Operator::AddI, total, n, partial);
    f.ret(total);
    f.bind(base);
    f.ret(z);
    compiler.define(sum, f);

    let env = compiler.commit().expect("commits");
    let addr = entry(&env, sum);
    (env, addr)
}

mod calls;
mod faults;
mod growth;
mod native;
mod scenarios;
