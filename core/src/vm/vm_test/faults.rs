use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};

use super::*;
use crate::bytecode::Instruction;
use crate::codeenv::DataSlot;

thread_local! {
    static CALLER_ENV: RefCell<Option<CodeEnv>> = const { RefCell::new(None) };
}

fn assemble(instrs: &[Instruction]) -> Vec<u32> {
    let mut words = Vec::new();
    for instr in instrs {
        instr.encode(&mut words);
    }
    words
}

#[test]
fn test_vm_unknown_opcode_syncs_then_panics() {
    // Opcode 63 is unassigned.
    let env = CodeEnv::create(vec![0x0000_00fc], Vec::new(), vec![0]);
    let addr = env.base();
    let mut rt = Runtime::default();

    let outcome = catch_unwind(AssertUnwindSafe(|| rt.call(addr, &[])));
    let message = outcome
        .expect_err("bad opcode is fatal")
        .downcast::<String>()
        .expect("formatted panic message");
    assert!(message.starts_with("woort runtime panic: bad opcode"), "{message}");
    assert!(message.contains("0x000000fc"), "{message}");
    assert_eq!(rt.ip(), Some(addr));
}

#[test]
#[should_panic(expected = "bad callstack")]
fn test_vm_clobbered_frame_link_panics() {
    let code = assemble(&[
        Instruction::Reserve { slots: 1 },
        Instruction::Load { dst: 0, index: 0 },
        // Frame offset -1 is the link slot.
        Instruction::Mov { dst: -1, src: 0 },
        Instruction::Ret { src: 0 },
    ]);
    let env = CodeEnv::create(code, vec![DataSlot::Constant(Value::Int(7))], vec![0]);
    let _ = Runtime::default().call(env.base(), &[]);
}

fn drop_caller_env(_rt: &mut Runtime, _args: NativeArgs) -> CallStatus {
    if let Some(env) = CALLER_ENV.with(|slot| slot.borrow_mut().take()) {
        env.unshare();
    }
    CallStatus::Normal
}

#[test]
#[should_panic(expected = "no code environment contains")]
fn test_vm_far_return_into_dropped_env_panics() {
    let mut compiler = LirCompiler::default();
    let dropper = compiler.constant(native(drop_caller_env));
    let mut f = LirFunction::new("drops_caller");
    let x = f.argument(0);
    let d = f.register();
    let ignored = f.register();
    let r = f.register();
    f.load(d, dropper);
    f.call(CallMode::Native, d, ignored, 0);
    f.op(Operator::AddI, r, x, x);
    f.ret(r);
    let id = compiler.add_function(f);
    let callee_env = compiler.commit().expect("commits");
    let callee = entry(&callee_env, id);

    let mut compiler = LirCompiler::default();
    let target = compiler.constant(Value::Function(FunctionRef::Script(callee)));
    let mut f = LirFunction::new("far_caller");
    let x = f.argument(0);
    let t = f.register();
    let result = f.register();
    f.push(x);
    f.load(t, target);
    f.call(CallMode::Script, t, result, 1);
    f.ret(result);
    let id = compiler.add_function(f);
    let caller_env = compiler.commit().expect("commits");
    let caller = entry(&caller_env, id);

    // The runtime holds the last other reference only until the far call
    // switches environments.
    CALLER_ENV.with(|slot| *slot.borrow_mut() = Some(caller_env));
    let _ = Runtime::default().call(caller, &[Value::Int(1)]);
}
