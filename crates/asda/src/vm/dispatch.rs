//! One-op-at-a-time semantics: the full operation table the bytecode format
//! defines, each arm executing exactly one instruction's effect.
//!
//! `step` is a pure function of `(vm, frame, op)` that performs exactly one
//! operation's effect and reports how the caller's dispatch loop
//! (`Vm::run_call`) should continue: advance, jump, return, or propagate a
//! failure up through `Vm::handle_error`.

use std::cmp::Ordering;
use std::path::Path;
use std::rc::Rc;

use crate::bigint;
use crate::bytecode::code::Op;
use crate::exceptions::{ExcType, ExcValue, RunError};
use crate::function::FunctionObj;
use crate::heap::{Heap, HeapData, Value};
use crate::string_obj::StringObj;

use super::finally::FinallyState;
use super::{CallOutcome, ErrorHandlerEntry, Frame, Vm};

/// What the dispatch loop should do after one op has run.
pub enum Step {
    Next,
    Jump(usize),
    Return(CallOutcome),
    Fail(RunError),
}

/// Runs exactly one operation against `frame`'s stack/scope/handlers.
#[allow(clippy::too_many_lines)]
pub(super) fn step(vm: &mut Vm, frame: &mut Frame, op: &Op) -> Step {
    match op {
        Op::PushStr(chars) => {
            let id = vm.heap.allocate(HeapData::Str(StringObj::from_codepoints_ref(chars)));
            frame.stack.push(Value::Object(id));
            Step::Next
        }
        Op::PushInt { magnitude_le, negative } => {
            let value = bigint::from_bytes(magnitude_le, *negative, vm.heap);
            frame.stack.push(value);
            Step::Next
        }
        Op::GetBuiltinVar(idx) => {
            let value = *vm
                .builtins
                .vars
                .get(*idx)
                .unwrap_or_else(|| panic!("GETBUILTINVAR: index {idx} out of range"));
            frame.stack.push(value.dup_with_heap(vm.heap));
            Step::Next
        }
        Op::SetLocal(var) => {
            let value = frame.stack.pop().expect("SETLOCAL: empty operand stack");
            let scope = frame.scope.get_for_level(var.level);
            if let Some(old) = scope.set_local(var.index, value) {
                old.drop_with_heap(vm.heap);
            }
            Step::Next
        }
        Op::GetLocal(var) => {
            let scope = frame.scope.get_for_level(var.level);
            match scope.get_local(var.index) {
                Ok(value) => {
                    frame.stack.push(value.dup_with_heap(vm.heap));
                    Step::Next
                }
                Err(e) => Step::Fail(e),
            }
        }
        Op::GetFromModule(mvref) => {
            let Some(module) = vm.modules.get(Path::new(&mvref.module_path)) else {
                return Step::Fail(ExcType::variable_error(format!(
                    "module {} is not loaded",
                    mvref.module_path
                )));
            };
            match module.scope.get_local(mvref.index) {
                Ok(value) => {
                    frame.stack.push(value.dup_with_heap(vm.heap));
                    Step::Next
                }
                Err(e) => Step::Fail(e),
            }
        }
        Op::CreateBox => {
            let value = frame.stack.pop().expect("CREATEBOX: empty operand stack");
            let id = vm.heap.allocate(HeapData::Box(Some(value)));
            frame.stack.push(Value::Object(id));
            Step::Next
        }
        Op::SetToBox => {
            let new_value = frame.stack.pop().expect("SETTOBOX: empty operand stack (value)");
            let box_value = frame.stack.pop().expect("SETTOBOX: empty operand stack (box)");
            let id = box_value.as_object_id().expect("SETTOBOX: receiver is not a box");
            let old = match vm.heap.get_mut(id) {
                HeapData::Box(slot) => slot.replace(new_value),
                other => panic!("SETTOBOX: not a box: {}", other.type_name()),
            };
            if let Some(old) = old {
                old.drop_with_heap(vm.heap);
            }
            vm.heap.dec_ref(id);
            Step::Next
        }
        Op::Unbox => {
            let box_value = frame.stack.pop().expect("UNBOX: empty operand stack");
            let id = box_value.as_object_id().expect("UNBOX: receiver is not a box");
            let inner = match vm.heap.get(id) {
                HeapData::Box(slot) => *slot,
                other => panic!("UNBOX: not a box: {}", other.type_name()),
            };
            vm.heap.dec_ref(id);
            match inner {
                Some(v) => {
                    frame.stack.push(v.dup_with_heap(vm.heap));
                    Step::Next
                }
                None => Step::Fail(ExcType::variable_error("box has no value set")),
            }
        }
        Op::GetAttr { ty, attr } => get_attr(vm, frame, ty, *attr),
        Op::SetAttr { ty, attr } => set_attr(vm, frame, ty, *attr),
        Op::CreateFunc { func_index } => {
            let code = Rc::clone(
                frame
                    .functions
                    .get(*func_index)
                    .unwrap_or_else(|| panic!("CREATEFUNC: function index {func_index} out of range")),
            );
            let func = FunctionObj::Asda {
                code,
                def_scope: frame.scope.clone(),
                types: Rc::clone(&frame.types),
                functions: Rc::clone(&frame.functions),
            };
            let id = vm.heap.allocate(HeapData::Function(func));
            frame.stack.push(Value::Object(id));
            Step::Next
        }
        Op::CallBuiltin(idx) => {
            let arity = *vm
                .builtins
                .arities
                .get(*idx)
                .unwrap_or_else(|| panic!("CALLBUILTIN: index {idx} out of range"));
            let args = pop_n(&mut frame.stack, arity);
            let func = *vm
                .builtins
                .functions
                .get(*idx)
                .unwrap_or_else(|| panic!("CALLBUILTIN: index {idx} out of range"));
            match func(vm.heap, args) {
                Ok(Some(v)) => {
                    frame.stack.push(v);
                    Step::Next
                }
                Ok(None) => Step::Next,
                Err(e) => Step::Fail(e),
            }
        }
        Op::CallFunc(nargs) => {
            let args = pop_n(&mut frame.stack, *nargs);
            let func = frame.stack.pop().expect("CALLFUNC: empty operand stack (function)");
            let result = vm.call_function(func, args);
            func.drop_with_heap(vm.heap);
            match result {
                Ok(Some(v)) => {
                    frame.stack.push(v);
                    Step::Next
                }
                Ok(None) => Step::Next,
                Err(e) => Step::Fail(e),
            }
        }
        Op::CallConstructor { ty, nargs } => {
            let resolved = frame.resolve_type(ty, vm.builtin_types);
            let args = pop_n(&mut frame.stack, *nargs);
            let ctor = resolved
                .constructor
                .unwrap_or_else(|| panic!("CALLCONSTRUCTOR: {} has no constructor", resolved.class_name()));
            match ctor(&resolved, args, vm.heap) {
                Ok(v) => {
                    frame.stack.push(v);
                    Step::Next
                }
                Err(e) => Step::Fail(e),
            }
        }
        Op::CreatePartial(n) => {
            let inner = frame.stack.pop().expect("CREATEPARTIAL: empty operand stack (inner)");
            let captured = pop_n(&mut frame.stack, *n);
            match FunctionObj::make_partial(inner, captured) {
                Some(partial) => {
                    let id = vm.heap.allocate(HeapData::Function(partial));
                    frame.stack.push(Value::Object(id));
                }
                None => frame.stack.push(inner),
            }
            Step::Next
        }
        Op::Jump(idx) => Step::Jump(*idx),
        Op::JumpIf(idx) => {
            let cond = frame.stack.pop().expect("JUMPIF: empty operand stack");
            match cond {
                Value::Bool(true) => Step::Jump(*idx),
                Value::Bool(false) => Step::Next,
                other => panic!("JUMPIF: not a bool: {other:?}"),
            }
        }
        Op::JumpIfEqInt(idx) => {
            let b = frame.stack.pop().expect("JUMPIFEQINT: empty operand stack");
            let a = frame.stack.pop().expect("JUMPIFEQINT: empty operand stack");
            let equal = bigint::compare(a, b, vm.heap) == Ordering::Equal;
            drop_int_operand(vm.heap, a);
            drop_int_operand(vm.heap, b);
            if equal {
                Step::Jump(*idx)
            } else {
                Step::Next
            }
        }
        Op::JumpIfEqStr(idx) => {
            let b = frame.stack.pop().expect("JUMPIFEQSTR: empty operand stack");
            let a = frame.stack.pop().expect("JUMPIFEQSTR: empty operand stack");
            let aid = a.as_object_id().expect("JUMPIFEQSTR: operand is not a string");
            let bid = b.as_object_id().expect("JUMPIFEQSTR: operand is not a string");
            let equal = match (vm.heap.get(aid), vm.heap.get(bid)) {
                (HeapData::Str(x), HeapData::Str(y)) => x.codepoints_equal(y),
                _ => panic!("JUMPIFEQSTR: operand is not a string"),
            };
            vm.heap.dec_ref(aid);
            vm.heap.dec_ref(bid);
            if equal {
                Step::Jump(*idx)
            } else {
                Step::Next
            }
        }
        Op::StrJoin(n) => {
            let parts = pop_n(&mut frame.stack, *n);
            let joined = {
                let mut strs = Vec::with_capacity(parts.len());
                for v in &parts {
                    let id = v.as_object_id().expect("STRJOIN: operand is not a string");
                    match vm.heap.get(id) {
                        HeapData::Str(s) => strs.push(s),
                        other => panic!("STRJOIN: operand is not a string: {}", other.type_name()),
                    }
                }
                StringObj::join(&strs)
            };
            let id = vm.heap.allocate(HeapData::Str(joined));
            for v in parts {
                if let Value::Object(pid) = v {
                    vm.heap.dec_ref(pid);
                }
            }
            frame.stack.push(Value::Object(id));
            Step::Next
        }
        Op::StoreRetVal => {
            let value = frame.stack.pop().expect("STORERETVAL: empty operand stack");
            frame.retval = Some(value);
            Step::Next
        }
        Op::Throw => {
            let value = frame.stack.pop().expect("THROW: empty operand stack");
            Step::Fail(error_value_to_run_error(vm.heap, value))
        }
        Op::Return => Step::Return(CallOutcome::Void),
        Op::ValueReturn => {
            let value = frame.stack.pop().expect("VALUERETURN: empty operand stack");
            Step::Return(CallOutcome::Value(value))
        }
        Op::Pop => {
            frame.stack.pop().expect("POP: empty operand stack").drop_with_heap(vm.heap);
            Step::Next
        }
        Op::Swap => {
            let b = frame.stack.pop().expect("SWAP: empty operand stack");
            let a = frame.stack.pop().expect("SWAP: empty operand stack");
            frame.stack.push(b);
            frame.stack.push(a);
            Step::Next
        }
        Op::Dup => {
            let top = *frame.stack.last().expect("DUP: empty operand stack");
            frame.stack.push(top.dup_with_heap(vm.heap));
            Step::Next
        }
        Op::IntAdd => binary_int_op(vm, frame, bigint::add),
        Op::IntSub => binary_int_op(vm, frame, bigint::sub),
        Op::IntMul => binary_int_op(vm, frame, bigint::mul),
        Op::IntNeg => {
            let a = frame.stack.pop().expect("INTNEG: empty operand stack");
            let result = bigint::neg(a, vm.heap);
            drop_int_operand(vm.heap, a);
            frame.stack.push(result);
            Step::Next
        }
        Op::EhAdd { jump_idx, err_type, errvar } => {
            let exc_type = frame.resolve_exc_type(err_type, vm.builtin_types);
            frame.handlers.push(ErrorHandlerEntry {
                jump_idx: *jump_idx,
                exc_type,
                errvar: *errvar,
            });
            Step::Next
        }
        Op::EhRm => {
            frame.handlers.pop().expect("EHRM: empty handler stack");
            Step::Next
        }
        Op::FsOk => {
            frame.finally_stack.push(FinallyState::Ok);
            Step::Next
        }
        Op::FsError => {
            let value = frame.stack.pop().expect("FS_ERROR: empty operand stack");
            frame.finally_stack.push(FinallyState::Error(value));
            Step::Next
        }
        Op::FsValueReturn => {
            let value = frame.retval.take().expect("FS_VALUERETURN: no stored return value");
            frame.finally_stack.push(FinallyState::ValueReturn(value));
            Step::Next
        }
        Op::FsJump(idx) => {
            frame.finally_stack.push(FinallyState::Jump(*idx));
            Step::Next
        }
        Op::FsApply => match frame.finally_stack.pop().expect("FS_APPLY: empty finally-state stack") {
            FinallyState::Ok => Step::Next,
            FinallyState::Jump(idx) => Step::Jump(idx),
            FinallyState::ValueReturn(v) => Step::Return(CallOutcome::Value(v)),
            FinallyState::Error(v) => Step::Fail(error_value_to_run_error(vm.heap, v)),
        },
        Op::FsDiscard => {
            match frame.finally_stack.pop().expect("FS_DISCARD: empty finally-state stack") {
                FinallyState::Error(v) | FinallyState::ValueReturn(v) => v.drop_with_heap(vm.heap),
                FinallyState::Ok | FinallyState::Jump(_) => {}
            }
            Step::Next
        }
        Op::SetMethods2Class { ty, count } => {
            let resolved = frame.resolve_type(ty, vm.builtin_types);
            let funcs = pop_n(&mut frame.stack, *count);
            for slot in resolved.install_methods(funcs).into_iter().flatten() {
                slot.drop_with_heap(vm.heap);
            }
            Step::Next
        }
    }
}

/// Pops the last `n` values off `stack`, preserving their original
/// left-to-right order.
fn pop_n(stack: &mut Vec<Value>, n: usize) -> Vec<Value> {
    let start = stack.len() - n;
    stack.split_off(start)
}

fn drop_int_operand(heap: &mut Heap, v: Value) {
    if let Value::Object(id) = v {
        heap.dec_ref(id);
    }
}

fn binary_int_op(vm: &mut Vm, frame: &mut Frame, op: fn(Value, Value, &mut Heap) -> Value) -> Step {
    let b = frame.stack.pop().expect("int op: empty operand stack");
    let a = frame.stack.pop().expect("int op: empty operand stack");
    let result = op(a, b, vm.heap);
    drop_int_operand(vm.heap, a);
    drop_int_operand(vm.heap, b);
    frame.stack.push(result);
    Step::Next
}

/// `GETATTR`: data fields (`attr < ty.nasdaattrs()`) read the instance's own
/// slot; anything past that is a method slot, bound into a partial over the
/// receiver so the caller can `CALLFUNC` it without re-supplying `self`.
fn get_attr(vm: &mut Vm, frame: &mut Frame, ty: &crate::bytecode::code::TypeRef, attr: usize) -> Step {
    let resolved = frame.resolve_type(ty, vm.builtin_types);
    let value = frame.stack.pop().expect("GETATTR: empty operand stack");
    let id = value.as_object_id().expect("GETATTR: receiver is not a heap object");
    let nfields = resolved.nasdaattrs() as usize;
    if attr < nfields {
        let field = match vm.heap.get(id) {
            HeapData::AsdaInstance { attrs, .. } => attrs.get(attr).copied().flatten(),
            other => panic!("GETATTR: not a class instance: {}", other.type_name()),
        };
        vm.heap.dec_ref(id);
        match field {
            Some(v) => {
                frame.stack.push(v.dup_with_heap(vm.heap));
                Step::Next
            }
            None => Step::Fail(ExcType::variable_error(format!("attribute {attr} is not set"))),
        }
    } else {
        let method = resolved.methods.borrow().get(attr - nfields).copied().flatten();
        match method {
            Some(func) => {
                let func = func.dup_with_heap(vm.heap);
                let partial = FunctionObj::make_partial(func, vec![value])
                    .expect("make_partial with a non-empty prefix always returns Some");
                let bound = vm.heap.allocate(HeapData::Function(partial));
                frame.stack.push(Value::Object(bound));
                Step::Next
            }
            None => {
                vm.heap.dec_ref(id);
                Step::Fail(ExcType::variable_error(format!("method {attr} is not set")))
            }
        }
    }
}

fn set_attr(vm: &mut Vm, frame: &mut Frame, ty: &crate::bytecode::code::TypeRef, attr: usize) -> Step {
    let resolved = frame.resolve_type(ty, vm.builtin_types);
    let new_value = frame.stack.pop().expect("SETATTR: empty operand stack (value)");
    let receiver = frame.stack.pop().expect("SETATTR: empty operand stack (receiver)");
    let id = receiver.as_object_id().expect("SETATTR: receiver is not a heap object");
    debug_assert!(attr < resolved.nasdaattrs() as usize, "SETATTR: attr index is not a data field");
    let old = match vm.heap.get_mut(id) {
        HeapData::AsdaInstance { attrs, .. } => attrs[attr].replace(new_value),
        other => panic!("SETATTR: not a class instance: {}", other.type_name()),
    };
    if let Some(old) = old {
        old.drop_with_heap(vm.heap);
    }
    vm.heap.dec_ref(id);
    Step::Next
}

/// Converts a heap `HeapData::Error` value into a catchable `RunError`,
/// consuming the heap object and its message in the process (`THROW` and
/// `FS_APPLY`'s error arm both funnel through here).
fn error_value_to_run_error(heap: &mut Heap, value: Value) -> RunError {
    let id = value
        .as_object_id()
        .unwrap_or_else(|| panic!("thrown value is not a heap object: {value:?}"));
    let (exc_type, message) = match heap.get(id) {
        HeapData::Error { exc_type, message } => (exc_type.clone(), *message),
        other => panic!("thrown value is not an error object: {}", other.type_name()),
    };
    let message_str = match message {
        Value::Object(mid) => match heap.get(mid) {
            HeapData::Str(s) => s.codepoints().iter().collect(),
            other => panic!("error message is not a string: {}", other.type_name()),
        },
        _ => panic!("error message is not a string"),
    };
    message.drop_with_heap(heap);
    heap.dec_ref(id);
    RunError::Exc(ExcValue { exc_type, message: message_str })
}
