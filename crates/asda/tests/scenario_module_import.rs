//! Importing a module makes its top-level locals visible to
//! `GETFROMMODULE`, and an unset export surfaces as a variable-error that
//! propagates out of the whole import.

mod common;

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use asda::{import, Builtins, ExcType, ImportError, Value};
use common::{build_file, FunctionSpec, OpBuilder};

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique_dir() -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!("asda-import-scenario-{}-{n}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn imported_modules_export_value_is_visible_through_getfrommodule() {
    let dir = unique_dir();

    let mut a_ops = OpBuilder::new();
    a_ops.push_int(&42u8.to_le_bytes(), false).set_local(0, 0).ret();
    fs::write(dir.join("a.a"), build_file("a.a", &[], vec![FunctionSpec::new(1, 2, a_ops)])).unwrap();

    let a_path = dir.join("a.a").to_string_lossy().into_owned();
    let mut b_ops = OpBuilder::new();
    b_ops.get_from_module(&a_path, 0).set_local(0, 0).ret();
    fs::write(dir.join("b.a"), build_file("b.a", &["a.a"], vec![FunctionSpec::new(1, 2, b_ops)])).unwrap();

    let driver = import(dir.clone(), std::path::Path::new("b.a"), Builtins::default()).unwrap();

    let b_module = driver.registry().get(&dir.join("b.a")).unwrap();
    assert_eq!(b_module.scope.get_local(0).unwrap(), Value::SmallInt(42));
}

#[test]
fn reading_an_unset_export_surfaces_as_a_variable_error() {
    let dir = unique_dir();

    // `a.a` declares one local and never sets it before returning.
    let a_ops = OpBuilder::new();
    fs::write(dir.join("a.a"), build_file("a.a", &[], vec![FunctionSpec::new(1, 1, {
        let mut ops = a_ops;
        ops.ret();
        ops
    })]))
    .unwrap();

    let a_path = dir.join("a.a").to_string_lossy().into_owned();
    let mut b_ops = OpBuilder::new();
    b_ops.get_from_module(&a_path, 0).set_local(0, 0).ret();
    fs::write(dir.join("b.a"), build_file("b.a", &["a.a"], vec![FunctionSpec::new(1, 2, b_ops)])).unwrap();

    let err = import(dir.clone(), std::path::Path::new("b.a"), Builtins::default())
        .expect_err("an unset export must fail the whole import");

    let ImportError::Run(run_err) = err else {
        panic!("expected a Run error, got {err:?}");
    };
    assert_eq!(run_err.exc_type(), &ExcType::Variable);
}
