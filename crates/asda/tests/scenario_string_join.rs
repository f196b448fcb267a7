//! String concatenation of three literals in one `STRJOIN`.

mod common;

use std::path::Path;

use asda::{decode_file, Builtins, BuiltinTypes, CallOutcome, Heap, HeapData, ModuleRegistry, Scope, Vm};
use common::{build_file, FunctionSpec, OpBuilder};

#[test]
fn str_join_concatenates_three_literals() {
    let mut ops = OpBuilder::new();
    ops.push_str("a").push_str("b").push_str("c").str_join(3).value_return();
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

    let CallOutcome::Value(v) = outcome else {
        panic!("expected a value return");
    };
    let id = v.as_object_id().expect("joined result should be a heap string");
    match heap.get(id) {
        HeapData::Str(s) => assert_eq!(s.codepoints(), "abc".chars().collect::<Vec<_>>()),
        other => panic!("expected Str, got {}", other.type_name()),
    }
    assert_eq!(heap.live_count(), 1, "the three source literals must be decreffed away by STRJOIN");
}
