//! Built-in LIR programs exercised by `woort run` and `woort disasm`.

use anyhow::Context;
use clap::ValueEnum;
use woort_core::{
    CodeAddress, CodeEnv, LirCompiler, LirFunction, NativeArgs, Runtime,
    bytecode::{CallMode, CastKind, Operator},
    lir::{FunctionId, StaticSlot},
    metrics::CommitStats,
    value::{CallStatus, FunctionRef, Value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    /// Recursive Fibonacci through script calls.
    Fib,
    /// Sums 1..=n in a backward-jumping loop.
    LoopSum,
    /// Writes a constant into a static slot and reads it back.
    StaticStore,
    /// Calls a native function and formats its result.
    Native,
}

/// A committed demo, ready to invoke.
pub struct Program {
    pub env: CodeEnv,
    pub entry: CodeAddress,
    pub args: Vec<Value>,
    pub statics: Vec<StaticSlot>,
    pub stats: CommitStats,
}

impl Demo {
    pub fn build(self) -> anyhow::Result<Program> {
        let mut compiler = LirCompiler::default();
        let (entry, args, statics) = match self {
            Demo::Fib => (fib(&mut compiler), vec![Value::Int(20)], Vec::new()),
            Demo::LoopSum => (loop_sum(&mut compiler), vec![Value::Int(1000)], Vec::new()),
            Demo::StaticStore => {
                let (entry, slot) = static_store(&mut compiler);
                (entry, Vec::new(), vec![slot])
            }
            Demo::Native => (native_sum(&mut compiler), vec![Value::Int(10)], Vec::new()),
        };
        let env = compiler
            .commit()
            .with_context(|| format!("commit demo `{}`", self.name()))?;
        let entry = env
            .entry_address(entry.index())
            .with_context(|| format!("demo `{}` has no entry", self.name()))?;
        Ok(Program {
            env,
            entry,
            args,
            statics,
            stats: compiler.stats().clone(),
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Demo::Fib => "fib",
            Demo::LoopSum => "loop-sum",
            Demo::StaticStore => "static-store",
            Demo::Native => "native",
        }
    }
}

impl Program {
    /// Runs the entry point, resuming after every yield. Returns the result
    /// and the number of yields.
    pub fn run(&self, rt: &mut Runtime, budget: Option<u64>) -> anyhow::Result<(Value, u64)> {
        rt.set_dispatch_budget(budget);
        for arg in self.args.iter().rev() {
            rt.push(arg.clone());
        }
        let mut status = rt.invoke(self.entry);
        let mut yields = 0;
        while status == CallStatus::Yield {
            yields += 1;
            rt.set_dispatch_budget(budget);
            status = rt.resume();
        }
        match status {
            CallStatus::Normal => Ok((rt.pop_result(self.args.len()), yields)),
            other => anyhow::bail!("program ended with status {other:?}"),
        }
    }
}

fn fib(compiler: &mut LirCompiler) -> FunctionId {
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
    fib
}

fn loop_sum(compiler: &mut LirCompiler) -> FunctionId {
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
    compiler.add_function(f)
}

fn static_store(compiler: &mut LirCompiler) -> (FunctionId, StaticSlot) {
    let value = compiler.constant(Value::Int(123321));
    let slot = compiler.static_slot();

    let mut f = LirFunction::new("static_store");
    let r = f.register();
    let back = f.register();
    f.load(r, value);
    f.store(slot, r);
    f.load(back, slot.into());
    f.ret(back);
    (compiler.add_function(f), slot)
}

fn sum_args(rt: &mut Runtime, args: NativeArgs) -> CallStatus {
    let mut total = 0i64;
    for index in 0..args.len() {
        match rt.argument(args, index) {
            Some(Value::Int(value)) => total += value,
            _ => return CallStatus::Aborted,
        }
    }
    rt.set_return(args, Value::Int(total));
    CallStatus::Normal
}

fn native_sum(compiler: &mut LirCompiler) -> FunctionId {
    let native = compiler.constant(Value::Function(FunctionRef::Native(sum_args)));
    let twenty = compiler.constant(Value::Int(20));
    let thirty = compiler.constant(Value::Int(30));
    let prefix = compiler.constant(Value::str("sum = "));

    let mut f = LirFunction::new("native_sum");
    let x = f.argument(0);
    let t = f.register();
    let total = f.register();
    let text = f.register();
    let head = f.register();
    let out = f.register();
    f.push_data(thirty);
    f.push_data(twenty);
    f.push(x);
    f.load(t, native);
    f.call(CallMode::Native, t, total, 3);
    f.cast(CastKind::IntToStr, text, total);
    f.load(head, prefix);
    f.op(Operator::AddS, out, head, text);
    f.ret(out);
    compiler.add_function(f)
}
