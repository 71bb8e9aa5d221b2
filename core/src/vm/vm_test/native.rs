use std::cell::Cell;

use super::*;

thread_local! {
    static JIT_TARGET: Cell<Option<CodeAddress>> = const { Cell::new(None) };
    static NESTED_TARGET: Cell<Option<CodeAddress>> = const { Cell::new(None) };
}

fn add_args(rt: &mut Runtime, args: NativeArgs) -> CallStatus {
    let (Some(Value::Int(x)), Some(Value::Int(y))) = (rt.argument(args, 0), rt.argument(args, 1)) else {
        return CallStatus::Aborted;
    };
    let sum = x + y;
    rt.set_return(args, Value::Int(sum));
    CallStatus::Normal
}

fn pause(rt: &mut Runtime, args: NativeArgs) -> CallStatus {
    rt.set_return(args, Value::Int(5));
    CallStatus::Yield
}

fn refuse(_rt: &mut Runtime, _args: NativeArgs) -> CallStatus {
    CallStatus::Aborted
}

fn jump_to_script(rt: &mut Runtime, _args: NativeArgs) -> CallStatus {
    match JIT_TARGET.with(Cell::get) {
        Some(target) if rt.redirect(target) => CallStatus::Resync,
        _ => CallStatus::Aborted,
    }
}

fn answer_in_place(rt: &mut Runtime, args: NativeArgs) -> CallStatus {
    rt.set_return(args, Value::Int(41));
    CallStatus::Resync
}

fn grow_then_answer(rt: &mut Runtime, args: NativeArgs) -> CallStatus {
    rt.reserve_stack(1000);
    rt.set_return(args, Value::Int(41));
    CallStatus::Resync
}

fn double_twice(rt: &mut Runtime, args: NativeArgs) -> CallStatus {
    let (Some(target), Some(x)) = (NESTED_TARGET.with(Cell::get), rt.argument(args, 0).cloned()) else {
        return CallStatus::Aborted;
    };
    let Ok(once) = rt.call(target, &[x]) else {
        return CallStatus::Aborted;
    };
    let Ok(twice) = rt.call(target, &[once]) else {
        return CallStatus::Aborted;
    };
    rt.set_return(args, twice);
    CallStatus::Normal
}

/// `fn(x) -> callee(x, extra...) + 1` where `callee` is a native constant.
fn call_native_env(callee: Value, mode: CallMode, extra: &[Value]) -> (CodeEnv, FunctionId) {
    let mut compiler = LirCompiler::default();
    let callee = compiler.constant(callee);
    let one = compiler.constant(Value::Int(1));
    let extra: Vec<DataRef> = extra.iter().map(|value| compiler.constant(value.clone())).collect();

    let mut f = LirFunction::new("call_native");
    let x = f.argument(0);
    let t = f.register();
    let result = f.register();
    let o = f.register();
    let out = f.register();
    for &data in extra.iter().rev() {
        f.push_data(data);
    }
    f.push(x);
    f.load(t, callee);
    f.call(mode, t, result, 1 + extra.len() as u16);
    f.load(o, one);
    f.op(Operator::AddI, out, result, o);
    f.ret(out);
    let id = compiler.add_function(f);
    (compiler.commit().expect("commits"), id)
}

#[test]
fn test_vm_native_reads_arguments_in_order() {
    let (env, id) = call_native_env(native(add_args), CallMode::Native, &[Value::Int(30)]);
    let mut rt = Runtime::default();
    let sp = rt.sp_from_end();
    assert_eq!(rt.call(entry(&env, id), &[Value::Int(11)]), Ok(Value::Int(42)));
    assert_eq!(rt.sp_from_end(), sp);
}

#[test]
fn test_vm_dynamic_call_reaches_natives() {
    let (env, id) = call_native_env(native(add_args), CallMode::Dynamic, &[Value::Int(1)]);
    let mut rt = Runtime::default();
    assert_eq!(rt.call(entry(&env, id), &[Value::Int(1)]), Ok(Value::Int(3)));
}

#[test]
fn test_vm_native_yield_then_resume() {
    let (env, id) = call_native_env(native(pause), CallMode::Native, &[]);
    let mut rt = Runtime::default();
    let sp = rt.sp_from_end();

    assert_eq!(rt.call(entry(&env, id), &[Value::Int(0)]), Err(CallStatus::Yield));
    assert!(rt.is_suspended());
    assert!(rt.ip().is_some());

    assert_eq!(rt.resume(), CallStatus::Normal);
    assert!(!rt.is_suspended());
    assert_eq!(rt.pop_result(1), Value::Int(6));
    assert_eq!(rt.sp_from_end(), sp);
}

#[test]
fn test_vm_resume_without_yield_aborts() {
    let mut rt = Runtime::default();
    assert_eq!(rt.resume(), CallStatus::Aborted);
}

#[test]
fn test_vm_abort_rolls_back_state() {
    let (env, id) = call_native_env(native(refuse), CallMode::Native, &[]);
    let mut rt = Runtime::default();
    let (sp, sb, ip) = (rt.sp_from_end(), rt.sb_from_end(), rt.ip());

    assert_eq!(rt.call(entry(&env, id), &[Value::Int(9)]), Err(CallStatus::Aborted));
    assert_eq!((rt.sp_from_end(), rt.sb_from_end(), rt.ip()), (sp, sb, ip));

    // The runtime stays usable after the rollback.
    let (_doubler, double) = doubler_env();
    assert_eq!(rt.call(double, &[Value::Int(4)]), Ok(Value::Int(8)));
}

#[test]
fn test_vm_invoke_unknown_entry_aborts() {
    let mut rt = Runtime::default();
    assert_eq!(rt.invoke(CodeAddress(u64::MAX - 1)), CallStatus::Aborted);
}

#[test]
fn test_vm_jit_redirect_runs_script_in_far_frame() {
    let (_doubler, double) = doubler_env();
    JIT_TARGET.with(|target| target.set(Some(double)));

    let jit = Value::Function(FunctionRef::Jit(jump_to_script));
    let (env, id) = call_native_env(jit, CallMode::Jit, &[]);
    let mut rt = Runtime::default();
    let sp = rt.sp_from_end();
    assert_eq!(rt.call(entry(&env, id), &[Value::Int(21)]), Ok(Value::Int(43)));
    assert_eq!(rt.sp_from_end(), sp);
}

#[test]
fn test_vm_jit_resync_without_redirect_returns_to_caller() {
    for (jit, grows) in [
        (FunctionRef::Jit(answer_in_place), false),
        (FunctionRef::Jit(grow_then_answer), true),
    ] {
        let (env, id) = call_native_env(Value::Function(jit), CallMode::Jit, &[]);
        let mut rt = Runtime::default();
        let (sp, sb) = (rt.sp_from_end(), rt.sb_from_end());
        assert_eq!(rt.call(entry(&env, id), &[Value::Int(0)]), Ok(Value::Int(42)));
        assert_eq!((rt.sp_from_end(), rt.sb_from_end()), (sp, sb));
        assert_eq!(rt.stack_realloc_version() > 0, grows);
    }
}

#[test]
fn test_vm_native_can_reenter_the_runtime() {
    let (_doubler, double) = doubler_env();
    NESTED_TARGET.with(|target| target.set(Some(double)));

    let (env, id) = call_native_env(native(double_twice), CallMode::Native, &[]);
    let mut rt = Runtime::default();
    let sp = rt.sp_from_end();
    assert_eq!(rt.call(entry(&env, id), &[Value::Int(5)]), Ok(Value::Int(21)));
    assert_eq!(rt.sp_from_end(), sp);
    assert!(!rt.is_suspended());
}

#[test]
#[should_panic(expected = "cannot call")]
fn test_vm_script_mode_rejects_natives() {
    let (env, id) = call_native_env(native(add_args), CallMode::Script, &[]);
    let mut rt = Runtime::default();
    let _ = rt.call(entry(&env, id), &[Value::Int(1)]);
}
