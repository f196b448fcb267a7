//! Execution engine: operand stack, locals, calls, closures, error
//! handlers, and `finally` regions.

pub mod dispatch;
pub mod finally;

use std::rc::Rc;

use tracing::{instrument, trace};

use crate::bytecode::code::{Code, TypeRef, VarRef};
use crate::exceptions::{ExcType, RunError, RunResult};
use crate::function::FunctionObj;
use crate::heap::{Heap, HeapData, Value};
use crate::module::ModuleRegistry;
use crate::scope::Scope;
use crate::types::{BuiltinTypes, Type};
use dispatch::Step;
use finally::FinallyState;

/// One alternative on the error-handler stack, pushed by `EH_ADD`.
struct ErrorHandlerEntry {
    jump_idx: usize,
    exc_type: ExcType,
    errvar: VarRef,
}

/// One live call frame.
struct Frame {
    code: Rc<Code>,
    scope: Scope,
    types: Rc<[Rc<Type>]>,
    /// The declaring module's full function list, needed to resolve
    /// `CREATEFUNC`'s `func_index`.
    functions: Rc<[Rc<Code>]>,
    opidx: usize,
    stack: Vec<Value>,
    retval: Option<Value>,
    handlers: Vec<ErrorHandlerEntry>,
    finally_stack: Vec<FinallyState>,
}

impl Frame {
    fn new(code: Rc<Code>, scope: Scope, types: Rc<[Rc<Type>]>, functions: Rc<[Rc<Code>]>) -> Self {
        Self {
            stack: Vec::with_capacity(code.maxstacksz),
            code,
            scope,
            types,
            functions,
            opidx: 0,
            retval: None,
            handlers: Vec::new(),
            finally_stack: Vec::new(),
        }
    }

    fn resolve_type(&self, ty: &TypeRef, builtins: &BuiltinTypes) -> Rc<Type> {
        match *ty {
            TypeRef::Builtin(b) => builtins.get(b),
            TypeRef::Module(idx) => Rc::clone(&self.types[idx]),
        }
    }

    fn resolve_exc_type(&self, ty: &TypeRef, builtins: &BuiltinTypes) -> ExcType {
        match *ty {
            TypeRef::Builtin(crate::types::BuiltinType::Error) => ExcType::Error,
            TypeRef::Builtin(crate::types::BuiltinType::NomemError) => ExcType::NoMem,
            TypeRef::Builtin(crate::types::BuiltinType::VariableError) => ExcType::Variable,
            TypeRef::Builtin(crate::types::BuiltinType::ValueError) => ExcType::Value,
            TypeRef::Builtin(crate::types::BuiltinType::OsError) => ExcType::Os,
            TypeRef::Builtin(other) => {
                panic!("EH_ADD: {} is not an error type", other.name())
            }
            TypeRef::Module(idx) => ExcType::User(self.resolve_type(&TypeRef::Module(idx), builtins)),
        }
    }

    /// Clears the operand stack, decreffing every item — the first step of
    /// error propagation.
    fn clear_stack(&mut self, heap: &mut Heap) {
        for value in self.stack.drain(..) {
            value.drop_with_heap(heap);
        }
    }
}

/// The outcome of a completed asda-function call. A body that falls off its
/// last op without returning is folded into a `value-error` at the call
/// boundary rather than kept as a distinct variant here, since nothing
/// downstream ever needs to tell it apart from any other `value-error`.
pub enum CallOutcome {
    Value(Value),
    Void,
}

/// A native builtin callable, reached via `CALLBUILTIN` or
/// `GETBUILTINVAR`.
pub type BuiltinFn = fn(&mut Heap, Vec<Value>) -> RunResult<Option<Value>>;

/// The fixed tables backing `GETBUILTINVAR`/`CALLBUILTIN`. Kept separate
/// from `Vm` so tests can construct a `Vm` with a minimal or empty table.
#[derive(Default)]
pub struct Builtins {
    pub vars: Vec<Value>,
    pub functions: Vec<BuiltinFn>,
    /// Fixed argument count each entry in `functions` expects. The wire
    /// format's `CALLBUILTIN` carries only a function index, so the VM
    /// needs this table to know how many operands to pop.
    pub arities: Vec<usize>,
}

/// Execution context shared by every frame in a single top-level run: the
/// heap, the module registry (for `GETFROMMODULE`), builtin tables, and the
/// shared builtin-type singletons.
pub struct Vm<'a> {
    pub heap: &'a mut Heap,
    pub modules: &'a ModuleRegistry,
    pub builtins: &'a Builtins,
    pub builtin_types: &'a BuiltinTypes,
}

enum CallPlan {
    Asda(Rc<Code>, Scope, Rc<[Rc<Type>]>, Rc<[Rc<Code>]>),
    Partial(Value, Vec<Value>),
}

impl<'a> Vm<'a> {
    /// Runs a decoded function body against a freshly-built scope.
    ///
    /// # Errors
    /// Propagates any unmatched error raised by the body, or a `value-error`
    /// if the body falls off its last op without executing `RETURN` /
    /// `VALUE_RETURN`.
    #[instrument(level = "debug", skip(self, code, scope, types, functions))]
    pub fn run_call(
        &mut self,
        code: Rc<Code>,
        scope: Scope,
        types: Rc<[Rc<Type>]>,
        functions: Rc<[Rc<Code>]>,
    ) -> RunResult<CallOutcome> {
        let mut frame = Frame::new(code, scope, types, functions);
        loop {
            if frame.opidx >= frame.code.nops() {
                return Err(ExcType::value_error("function body ended without returning"));
            }
            let op = frame.code.ops()[frame.opidx].op.clone();
            match dispatch::step(self, &mut frame, &op) {
                Step::Next => frame.opidx += 1,
                Step::Jump(idx) => frame.opidx = idx,
                Step::Return(outcome) => {
                    debug_assert!(frame.stack.is_empty(), "operand stack not empty at return");
                    return Ok(outcome);
                }
                Step::Fail(err) => match self.handle_error(&mut frame, err)? {
                    Some(idx) => frame.opidx = idx,
                    None => unreachable!("handle_error returns Err on no match, Some on match"),
                },
            }
        }
    }

    /// Error propagation within one frame: clear the stack, clear any
    /// partial return value, then search the handler stack top-to-bottom for
    /// the first assignment-compatible alternative.
    fn handle_error(&mut self, frame: &mut Frame, err: RunError) -> RunResult<Option<usize>> {
        frame.clear_stack(self.heap);
        frame.retval = None;

        let mut match_at = None;
        for (i, entry) in frame.handlers.iter().enumerate().rev() {
            if entry.exc_type.catches(err.exc_type()) {
                match_at = Some(i);
                break;
            }
        }

        let Some(i) = match_at else {
            return Err(err);
        };
        let entry = frame.handlers.split_off(i).into_iter().next().expect("index in range");
        let message_cps: Vec<char> = err.message().chars().collect();
        let message = Value::Object(
            self.heap
                .allocate(HeapData::Str(crate::string_obj::StringObj::from_codepoints(message_cps))),
        );
        let error_value = Value::Object(self.heap.allocate(HeapData::Error {
            exc_type: err.exc_type().clone(),
            message,
        }));
        let target_scope = frame.scope.get_for_level(entry.errvar.level);
        if let Some(old) = target_scope.set_local(entry.errvar.index, error_value) {
            old.drop_with_heap(self.heap);
        }
        trace!(jump_idx = entry.jump_idx, "error handler matched");
        Ok(Some(entry.jump_idx))
    }

    /// `CALLFUNC n`: generic call dispatch, shared by direct calls and by a
    /// partial's forwarding step.
    #[instrument(level = "trace", skip(self, args))]
    pub(crate) fn call_function(&mut self, func_value: Value, args: Vec<Value>) -> RunResult<Option<Value>> {
        let id = func_value
            .as_object_id()
            .expect("CALLFUNC: call target is not a heap object");
        let plan = match self.heap.get(id) {
            HeapData::Function(FunctionObj::Asda { code, def_scope, types, functions }) => {
                CallPlan::Asda(Rc::clone(code), def_scope.clone(), Rc::clone(types), Rc::clone(functions))
            }
            HeapData::Function(FunctionObj::Partial { inner, captured }) => {
                CallPlan::Partial(*inner, captured.clone())
            }
            other => panic!("CALLFUNC: not a function: {}", other.type_name()),
        };
        match plan {
            CallPlan::Asda(code, def_scope, types, functions) => {
                let call_scope = def_scope.child(code.nlocals);
                for (i, arg) in args.into_iter().enumerate() {
                    call_scope.set_local(i, arg);
                }
                match self.run_call(code, call_scope, types, functions)? {
                    CallOutcome::Value(v) => Ok(Some(v)),
                    CallOutcome::Void => Ok(None),
                }
            }
            CallPlan::Partial(inner, captured) => {
                for v in &captured {
                    if let Value::Object(cid) = v {
                        self.heap.inc_ref(*cid);
                    }
                }
                let mut full_args = captured;
                full_args.extend(args);
                self.call_function(inner, full_args)
            }
        }
    }
}
