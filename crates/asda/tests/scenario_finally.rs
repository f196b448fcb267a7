//! A finally body runs on every exit path, both when the protected region
//! finishes normally and when it raises.

mod common;

use std::path::Path;

use asda::{decode_file, Builtins, BuiltinTypes, CallOutcome, ExcType, Heap, ModuleRegistry, Scope, Value, Vm};
use common::{build_file, builtin_idx, FunctionSpec, OpBuilder};

fn run(ops: OpBuilder, nlocals: u16, maxstacksz: u16) -> asda::RunResult<CallOutcome> {
    let bytes = build_file("main.a", &[], vec![FunctionSpec::new(nlocals, maxstacksz, ops)]);
    let decoded = decode_file(&bytes, Path::new("/base")).unwrap();

    let mut heap = Heap::new();
    let registry = ModuleRegistry::new();
    let builtins = Builtins::default();
    let builtin_types = BuiltinTypes::new();
    let mut vm = Vm {
        heap: &mut heap,
        modules: &registry,
        builtins: &builtins,
        builtin_types: &builtin_types,
    };

    let main = decoded.functions[decoded.main_index].clone();
    let scope = Scope::new_global(main.nlocals);
    vm.run_call(main, scope, decoded.types.clone().into(), decoded.functions.clone().into())
}

#[test]
fn finally_body_runs_and_normal_flow_resumes() {
    // Slot 0 is a marker: the finally body sets it to 1 before FS_APPLY
    // resumes normal control flow, proving the body executed.
    let mut ops = OpBuilder::new();
    ops.fs_ok()
        .push_int(&1u8.to_le_bytes(), false)
        .set_local(0, 0)
        .fs_apply()
        .get_local(0, 0)
        .value_return();

    let outcome = run(ops, 1, 2).unwrap();
    let CallOutcome::Value(v) = outcome else {
        panic!("expected a value return");
    };
    assert_eq!(v, Value::SmallInt(1));
}

#[test]
fn finally_body_reraises_the_error_it_was_handling() {
    // The handler catches its own thrown value-error, stashes it as a
    // pending FS_ERROR state, runs the finally body (slot 0 marker), then
    // FS_APPLY re-raises it since nothing discarded the pending state.
    let mut ops = OpBuilder::new();
    ops.eh_add_builtin(4, builtin_idx::VALUE_ERROR, 0, 0)
        .push_str("boom")
        .call_constructor_builtin(builtin_idx::VALUE_ERROR, 1)
        .throw()
        .get_local(0, 0)
        .fs_error()
        .push_int(&1u8.to_le_bytes(), false)
        .set_local(0, 0)
        .fs_apply();

    let err = run(ops, 1, 2).expect_err("the finally body must re-raise the pending error");
    assert_eq!(err.exc_type(), &ExcType::Value);
    assert_eq!(err.message(), "boom");
}
