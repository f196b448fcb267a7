//! A handler catches one error type while a different type thrown from
//! inside the handler body propagates past it.

mod common;

use std::path::Path;

use asda::{decode_file, Builtins, BuiltinTypes, ExcType, Heap, ModuleRegistry, Scope, Vm};
use common::{build_file, builtin_idx, FunctionSpec, OpBuilder};

#[test]
fn handler_catches_variable_error_but_not_the_value_error_it_raises() {
    // nlocals=2: slot 1 is read while unset, to raise a variable-error;
    // slot 0 receives the caught error value (unused by this test).
    let mut ops = OpBuilder::new();
    ops.eh_add_builtin(2, builtin_idx::VARIABLE_ERROR, 0, 0)
        .get_local(0, 1)
        .push_str("boom")
        .call_constructor_builtin(builtin_idx::VALUE_ERROR, 1)
        .throw();

    let bytes = build_file("main.a", &[], vec![FunctionSpec::new(2, 2, ops)]);
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
    let err = vm
        .run_call(main, scope, decoded.types.clone().into(), decoded.functions.clone().into())
        .expect_err("the value-error raised inside the handler body must propagate");

    assert_eq!(err.exc_type(), &ExcType::Value);
    assert_eq!(err.message(), "boom");
}
