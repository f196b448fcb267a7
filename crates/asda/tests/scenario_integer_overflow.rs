//! Integer arithmetic that overflows `SmallInt` range promotes to a heap
//! bigint.

mod common;

use std::path::Path;

use asda::{decode_file, Builtins, BuiltinTypes, CallOutcome, Heap, HeapData, ModuleRegistry, Scope, Vm};
use common::{build_file, FunctionSpec, OpBuilder};

#[test]
fn small_plus_small_overflow_yields_big_int() {
    const SMALL_MAX: i64 = (i64::MAX - 1) / 2;

    let mut ops = OpBuilder::new();
    ops.push_int(&SMALL_MAX.to_le_bytes(), false)
        .push_int(&1u8.to_le_bytes(), false)
        .int_add()
        .value_return();
    let bytes = build_file("main.a", &[], vec![FunctionSpec::new(0, 4, ops)]);
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

    let CallOutcome::Value(v) = outcome else {
        panic!("expected a value return");
    };
    let id = v.as_object_id().expect("overflowed sum must be a heap bigint, not a small int");
    match heap.get(id) {
        HeapData::Big(b) => assert_eq!(b.to_string(), (i128::from(SMALL_MAX) + 1).to_string()),
        other => panic!("expected Big, got {}", other.type_name()),
    }
}
