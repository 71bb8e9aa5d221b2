use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use woort_core::bytecode::{CallMode, Operator};
use woort_core::lir::{FunctionId, LirCompiler, LirFunction};
use woort_core::{CodeAddress, CodeEnv, Runtime, Value};

fn loop_sum_env() -> (CodeEnv, CodeAddress) {
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
    let env = compiler.commit().unwrap();
    let entry = entry(&env, id);
    (env, entry)
}

fn fib_env() -> (CodeEnv, CodeAddress) {
    let mut compiler = LirCompiler::default();
    let fib = compiler.declare();
    let fib_ref = compiler.function_constant(fib);
    let two = compiler.constant(Value::Int(2));
    let one = compiler.constant(Value::Int(1));

    let mut f = LirFunction::new("fib");
    let n = f.argument(0);
    let limit = f.register();
    let small = f.register();
    let base = f.label();
    f.load(limit, two);
    f.op(Operator::LtI, small, n, limit);
    f.jnz(small, base);
    let o = f.register();
    let m = f.register();
    let callee = f.register();
    let a = f.register();
    let b = f.register();
    let sum = f.register();
    f.load(o, one);
    f.load(callee, fib_ref);
    f.op(Operator::SubI, m, n, o);
    f.push(m);
    f.call(CallMode::Script, callee, a, 1);
    f.op(Operator::SubI, m, m, o);
    f.push(m);
    f.call(CallMode::Script, callee, b, 1);
    f.op(Operator::AddI, sum, a, b);
    f.ret(sum);
    f.bind(base);
    f.ret(n);
    compiler.define(fib, f);
    let env = compiler.commit().unwrap();
    let entry = entry(&env, fib);
    (env, entry)
}

fn entry(env: &CodeEnv, id: FunctionId) -> CodeAddress {
    env.entry_address(id.index()).unwrap()
}

fn bench_loop(c: &mut Criterion) {
    let (_env, entry) = loop_sum_env();
    let mut rt = Runtime::default();
    let mut group = c.benchmark_group("dispatch_loop_sum");
    for n in [100i64, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| black_box(rt.call(entry, &[Value::Int(black_box(n))]).unwrap()))
        });
    }
    group.finish();
}

fn bench_calls(c: &mut Criterion) {
    let (_env, entry) = fib_env();
    let mut rt = Runtime::default();
    c.bench_function("dispatch_fib_20", |b| {
        b.iter(|| black_box(rt.call(entry, &[Value::Int(black_box(20))]).unwrap()))
    });
}

criterion_group!(benches, bench_loop, bench_calls);
criterion_main!(benches);
