use super::*;

#[test]
fn test_vm_deep_recursion_survives_relocation() {
    let (_env, sum) = recursive_sum_env();

    let mut small = Runtime::default();
    assert_eq!(small.call(sum, &[Value::Int(200)]), Ok(Value::Int(20100)));
    assert!(small.stack_realloc_version() >= 3);

    let mut presized = Runtime::new(RuntimeOptions {
        initial_stack_slots: 4096,
        ..RuntimeOptions::default()
    });
    assert_eq!(presized.call(sum, &[Value::Int(200)]), Ok(Value::Int(20100)));
    assert_eq!(presized.stack_realloc_version(), 0);

    // Frames are relative to the end of the stack, so a grown runtime keeps
    // working and does not need to grow again.
    let version = small.stack_realloc_version();
    assert_eq!(small.call(sum, &[Value::Int(150)]), Ok(Value::Int(11325)));
    assert_eq!(small.stack_realloc_version(), version);
}

#[test]
#[should_panic(expected = "stack overflow")]
fn test_vm_stack_limit_is_fatal() {
    let (_env, sum) = recursive_sum_env();
    let mut rt = Runtime::new(RuntimeOptions {
        initial_stack_slots: 16,
        max_stack_slots: 64,
    });
    let _ = rt.call(sum, &[Value::Int(200)]);
}

fn greedy_sum(rt: &mut Runtime, args: NativeArgs) -> CallStatus {
    rt.reserve_stack(1000);
    let total: i64 = (0..args.len())
        .filter_map(|i| rt.argument(args, i).and_then(Value::as_int))
        .sum();
    rt.set_return(args, Value::Int(total));
    CallStatus::Normal
}

#[test]
fn test_vm_native_growth_keeps_arguments() {
    let mut compiler = LirCompiler::default();
    let greedy = compiler.constant(native(greedy_sum));
    let three = compiler.constant(Value::Int(3));
    let four = compiler.constant(Value::Int(4));

    let mut f = LirFunction::new("grow_in_native");
    let a = f.register();
    let b = f.register();
    let g = f.register();
    let total = f.register();
    let out = f.register();
    f.load(a, three);
    f.load(b, four);
    f.push(b);
    f.push(a);
    f.load(g, greedy);
    f.call(CallMode::Native, g, total, 2);
    // Locals must still be readable after the native moved the stack.
    f.op(Operator::MulI, out, total, a);
    f.ret(out);
    let id = compiler.add_function(f);
    let env = compiler.commit().expect("commits");

    let mut rt = Runtime::default();
    let sp = rt.sp_from_end();
    assert_eq!(rt.call(entry(&env, id), &[]), Ok(Value::Int(21)));
    assert!(rt.stack_realloc_version() > 0);
    assert!(rt.stack_len() >= 1000);
    assert_eq!(rt.sp_from_end(), sp);
}
