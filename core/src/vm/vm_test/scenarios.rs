use super::*;

/// Stores a constant into a static, then spins on `jmp self`.
fn spin_env() -> (CodeEnv, FunctionId, usize) {
    let mut compiler = LirCompiler::default();
    let value = compiler.constant(Value::Int(123321));
    let slot = compiler.static_slot();

    let mut f = LirFunction::new("spin");
    let r = f.register();
    let spin = f.label();
    f.load(r, value);
    f.store(slot, r);
    f.bind(spin);
    f.jmp(spin);
    let id = compiler.add_function(f);
    (compiler.commit().expect("commits"), id, slot.index() as usize)
}

#[test]
fn test_vm_budget_preempts_infinite_loop() {
    let (env, id, slot) = spin_env();
    let mut rt = Runtime::default();
    rt.set_dispatch_budget(Some(4));

    assert_eq!(rt.invoke(entry(&env, id)), CallStatus::Yield);
    assert_eq!(env.load(slot), Value::Int(123321));
    assert_eq!(rt.dispatch_budget(), Some(0));

    for _ in 0..3 {
        rt.set_dispatch_budget(Some(100));
        assert_eq!(rt.resume(), CallStatus::Yield);
        assert!(rt.is_suspended());
    }
    assert_eq!(env.load(slot), Value::Int(123321));
}

#[test]
fn test_vm_loop_sum() {
    let mut compiler = LirCompiler::default();
    let zero = compiler.constant(Value::Int(0));
    let one = compiler.constant(Value::Int(1));

    let mut f = LirFunction::new("loop_sum");
    let n = f.argument(0);
    let i = f.register();
    let acc = f.register();
    let step = f.register();
    let more = f.register();
    let head = f.label();
    let done = f.label();
    f.load(i, one);
    f.load(acc, zero);
    f.load(step, one);
    f.bind(head);
    f.op(Operator::GtI, more, i, n);
    f.jnz(more, done);
    f.op(Operator::AddI, acc, acc, i);
    f.op(Operator::AddI, i, i, step);
    f.jmp(head);
    f.bind(done);
    f.ret(acc);
    let id = compiler.add_function(f);
    let env = compiler.commit().expect("commits");

    let mut rt = Runtime::default();
    assert_eq!(rt.call(entry(&env, id), &[Value::Int(100)]), Ok(Value::Int(5050)));
    assert_eq!(rt.call(entry(&env, id), &[Value::Int(0)]), Ok(Value::Int(0)));
}

#[test]
fn test_vm_constructors_keep_push_order() {
    let mut compiler = LirCompiler::default();
    let a = compiler.constant(Value::Int(1));
    let b = compiler.constant(Value::str("b"));
    let k1 = compiler.constant(Value::str("k1"));
    let k2 = compiler.constant(Value::str("k2"));

    let mut f = LirFunction::new("containers");
    let array = f.register();
    let map = f.register();
    let record = f.register();
    let all = f.register();
    f.push_data(b);
    f.push_data(a);
    f.cons(ConsKind::Array, array, 2);
    f.push_data(b);
    f.push_data(k2);
    f.push_data(a);
    f.push_data(k1);
    f.cons(ConsKind::Map, map, 2);
    f.push(map);
    f.push(array);
    f.cons(ConsKind::Struct, record, 2);
    f.push(record);
    f.cons(ConsKind::Array, all, 1);
    f.ret(all);
    let id = compiler.add_function(f);
    let env = compiler.commit().expect("commits");

    let mut rt = Runtime::default();
    let sp = rt.sp_from_end();
    let Ok(Value::Array(all)) = rt.call(entry(&env, id), &[]) else {
        panic!("expected an array");
    };
    assert_eq!(rt.sp_from_end(), sp);

    let array = Value::Array(vec![Value::Int(1), Value::str("b")].into());
    let map = Value::Map(
        vec![
            (Value::str("k1"), Value::Int(1)),
            (Value::str("k2"), Value::str("b")),
        ]
        .into(),
    );
    assert_eq!(all.as_ref(), &[Value::Struct(vec![array, map].into())]);
}

#[test]
fn test_vm_casts_and_unary_ops() {
    let mut compiler = LirCompiler::default();
    let seven = compiler.constant(Value::Int(7));

    let mut f = LirFunction::new("casts");
    let i = f.register();
    let r = f.register();
    let s = f.register();
    let neg = f.register();
    let text = f.register();
    let joined = f.register();
    f.load(i, seven);
    f.cast(CastKind::IntToReal, r, i);
    f.cast(CastKind::RealToStr, s, r);
    f.unary(Operator::NegI, neg, i);
    f.cast(CastKind::IntToStr, text, neg);
    f.op(Operator::AddS, joined, s, text);
    f.ret(joined);
    let id = compiler.add_function(f);
    let env = compiler.commit().expect("commits");

    let mut rt = Runtime::default();
    assert_eq!(rt.call(entry(&env, id), &[]), Ok(Value::str("7.0-7")));
}

#[test]
fn test_vm_pop_into_register_and_static() {
    let mut compiler = LirCompiler::default();
    let a = compiler.constant(Value::Int(10));
    let b = compiler.constant(Value::Int(20));
    let slot = compiler.static_slot();

    let mut f = LirFunction::new("pops");
    let x = f.register();
    let y = f.register();
    f.push_data(a);
    f.push_data(b);
    f.pop(x);
    f.pop_static(slot);
    f.load(y, slot.into());
    f.op(Operator::SubI, x, x, y);
    f.ret(x);
    let id = compiler.add_function(f);
    let env = compiler.commit().expect("commits");

    let mut rt = Runtime::default();
    assert_eq!(rt.call(entry(&env, id), &[]), Ok(Value::Int(10)));
    assert_eq!(env.load(slot.index() as usize), Value::Int(10));
}

#[test]
fn test_vm_conditional_branches() {
    let mut compiler = LirCompiler::default();
    let yes = compiler.constant(Value::str("same"));
    let no = compiler.constant(Value::str("different"));

    let mut f = LirFunction::new("compare");
    let lhs = f.argument(0);
    let rhs = f.argument(1);
    let out = f.register();
    let differ = f.label();
    f.jneq(lhs, rhs, differ);
    f.load(out, yes);
    f.ret(out);
    f.bind(differ);
    f.load(out, no);
    f.ret(out);
    let id = compiler.add_function(f);
    let env = compiler.commit().expect("commits");

    let mut rt = Runtime::default();
    let addr = entry(&env, id);
    assert_eq!(rt.call(addr, &[Value::Int(3), Value::Int(3)]), Ok(Value::str("same")));
    assert_eq!(rt.call(addr, &[Value::Int(3), Value::Real(3.0)]), Ok(Value::str("different")));
    assert_eq!(rt.call(addr, &[Value::str("a"), Value::str("a")]), Ok(Value::str("same")));
}

#[test]
#[should_panic(expected = "division by zero")]
fn test_vm_integer_division_by_zero_panics() {
    let mut compiler = LirCompiler::default();
    let zero = compiler.constant(Value::Int(0));
    let mut f = LirFunction::new("div");
    let x = f.argument(0);
    let z = f.register();
    let q = f.register();
    f.load(z, zero);
    f.op(Operator::DivI, q, x, z);
    f.ret(q);
    let id = compiler.add_function(f);
    let env = compiler.commit().expect("commits");

    let _ = Runtime::default().call(entry(&env, id), &[Value::Int(1)]);
}
