use std::cell::RefCell;

use super::*;

thread_local! {
    static FRAME_STATES: RefCell<Vec<(usize, usize)>> = const { RefCell::new(Vec::new()) };
}

fn record_frame(rt: &mut Runtime, _args: NativeArgs) -> CallStatus {
    let state = (rt.sp_from_end(), rt.sb_from_end());
    FRAME_STATES.with(|states| states.borrow_mut().push(state));
    CallStatus::Normal
}

#[test]
fn test_vm_call_return_restores_frame() {
    let mut compiler = LirCompiler::default();
    let callee = compiler.declare();
    let callee_ref = compiler.function_constant(callee);
    let record_ref = compiler.constant(native(record_frame));
    let answer = compiler.constant(Value::Int(42));

    let mut f = LirFunction::new("callee");
    let r = f.register();
    f.load(r, answer);
    f.ret(r);
    compiler.define(callee, f);

    let mut f = LirFunction::new("caller");
    let p = f.register();
    let t = f.register();
    let before = f.register();
    let result = f.register();
    let after = f.register();
    f.load(p, record_ref);
    f.call(CallMode::Native, p, before, 0);
    f.load(t, callee_ref);
    f.call(CallMode::Script, t, result, 0);
    f.call(CallMode::Native, p, after, 0);
    f.ret(result);
    let caller = compiler.add_function(f);
    let env = compiler.commit().expect("commits");

    let mut rt = Runtime::default();
    let sp = rt.sp_from_end();
    let sb = rt.sb_from_end();
    assert_eq!(rt.call(entry(&env, caller), &[]), Ok(Value::Int(42)));
    assert_eq!((rt.sp_from_end(), rt.sb_from_end()), (sp, sb));
    assert_eq!(rt.ip(), None);

    let states = FRAME_STATES.with(|states| states.borrow().clone());
    assert_eq!(states.len(), 2);
    assert_eq!(states[0], states[1]);
}

#[test]
fn test_vm_recursive_calls() {
    let (_env, sum) = recursive_sum_env();
    let mut rt = Runtime::default();
    assert_eq!(rt.call(sum, &[Value::Int(10)]), Ok(Value::Int(55)));
    assert_eq!(rt.call(sum, &[Value::Int(0)]), Ok(Value::Int(0)));
}

#[test]
fn test_vm_far_call_into_another_environment() {
    let (_doubler, double) = doubler_env();

    let mut compiler = LirCompiler::default();
    let target = compiler.constant(Value::Function(FunctionRef::Script(double)));
    let one = compiler.constant(Value::Int(1));
    let mut f = LirFunction::new("far_caller");
    let x = f.argument(0);
    let t = f.register();
    let doubled = f.register();
    let o = f.register();
    let out = f.register();
    f.push(x);
    f.load(t, target);
    f.call(CallMode::Script, t, doubled, 1);
    f.load(o, one);
    f.op(Operator::AddI, out, doubled, o);
    f.ret(out);
    let id = compiler.add_function(f);
    let env = compiler.commit().expect("commits");

    let mut rt = Runtime::default();
    assert_eq!(rt.call(entry(&env, id), &[Value::Int(20)]), Ok(Value::Int(41)));
}

#[test]
fn test_vm_closure_captures_come_first() {
    let mut compiler = LirCompiler::default();
    let body = compiler.declare();
    let body_ref = compiler.function_constant(body);
    let ten = compiler.constant(Value::Int(10));

    let mut f = LirFunction::new("add_captured");
    let captured = f.argument(0);
    let x = f.argument(1);
    let r = f.register();
    f.op(Operator::SubI, r, x, captured);
    f.ret_closure(r, 1);
    compiler.define(body, f);

    let mut f = LirFunction::new("make_and_call");
    let x = f.argument(0);
    let cap = f.register();
    let func = f.register();
    let closure = f.register();
    let result = f.register();
    f.load(cap, ten);
    f.push(cap);
    f.load(func, body_ref);
    f.mk_closure(closure, func, 1);
    f.push(x);
    f.call(CallMode::Dynamic, closure, result, 1);
    f.ret(result);
    let main = compiler.add_function(f);
    let env = compiler.commit().expect("commits");

    let mut rt = Runtime::default();
    let sp = rt.sp_from_end();
    assert_eq!(rt.call(entry(&env, main), &[Value::Int(15)]), Ok(Value::Int(5)));
    assert_eq!(rt.sp_from_end(), sp);
}

#[test]
fn test_vm_closure_value_is_returned_intact() {
    let mut compiler = LirCompiler::default();
    let body = compiler.declare();
    let body_ref = compiler.function_constant(body);
    let a = compiler.constant(Value::Int(1));
    let b = compiler.constant(Value::str("two"));

    let mut f = LirFunction::new("body");
    let r = f.argument(0);
    f.ret_closure(r, 2);
    compiler.define(body, f);

    let mut f = LirFunction::new("make");
    let ra = f.register();
    let rb = f.register();
    let func = f.register();
    let closure = f.register();
    f.load(ra, a);
    f.load(rb, b);
    f.push(rb);
    f.push(ra);
    f.load(func, body_ref);
    f.mk_closure(closure, func, 2);
    f.ret(closure);
    let make = compiler.add_function(f);
    let env = compiler.commit().expect("commits");

    let mut rt = Runtime::default();
    let Ok(Value::Closure(closure)) = rt.call(entry(&env, make), &[]) else {
        panic!("expected a closure");
    };
    assert_eq!(closure.captures.as_ref(), &[Value::Int(1), Value::str("two")]);
    assert_eq!(
        closure.function,
        FunctionRef::Script(entry(&env, body))
    );
}
