//! General properties that aren't tied to one literal scenario: refcount
//! balance across a full run, and decode-time rejection of a jump target
//! outside a function's own op range.

mod common;

use std::path::Path;

use asda::{decode_file, Builtins, BuiltinTypes, CallOutcome, Heap, ModuleRegistry, Scope, Vm};
use common::{build_file, FunctionSpec, OpBuilder};

#[test]
fn heap_is_fully_reclaimed_once_every_allocation_is_dropped() {
    // Builds, joins, and discards a string, then separately allocates and
    // discards a big-int sum; nothing survives past the final POP.
    let mut ops = OpBuilder::new();
    ops.push_str("a")
        .push_str("b")
        .str_join(2)
        .pop()
        .push_int(&i64::MAX.to_le_bytes(), false)
        .push_int(&1u8.to_le_bytes(), false)
        .int_add()
        .pop()
        .ret();

    let bytes = build_file("main.a", &[], vec![FunctionSpec::new(0, 3, ops)]);
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
    let outcome = vm
        .run_call(main, scope, decoded.types.clone().into(), decoded.functions.clone().into())
        .unwrap();

    assert!(matches!(outcome, CallOutcome::Void));
    assert_eq!(heap.live_count(), 0, "every allocation made during the run must be reclaimed");
}

#[test]
fn decoder_rejects_a_jump_target_outside_the_function() {
    let mut ops = OpBuilder::new();
    ops.jump(5); // the function has exactly one op; index 5 is out of range
    let bytes = build_file("main.a", &[], vec![FunctionSpec::new(0, 1, ops)]);

    let err = decode_file(&bytes, Path::new("/base")).expect_err("an out-of-range jump target must be rejected");
    assert!(err.message().contains("out of range"));
}
