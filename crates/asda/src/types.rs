//! Compile-time type descriptors.
//!
//! A `Type` never changes identity once built: instances hold an `Rc<Type>`,
//! a pointer whose lifetime is guaranteed by ownership rather than by the
//! caller's discipline. The one thing that *does* mutate after construction
//! is an asda-class's method table (`SETMETHODS2CLASS`), which is why
//! `methods` is a `RefCell`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::exceptions::RunResult;
use crate::heap::{Heap, Value};

/// Index into the built-in type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Str,
    Int,
    Bool,
    Object,
    Error,
    NomemError,
    VariableError,
    ValueError,
    OsError,
    Array,
}

impl BuiltinType {
    /// Builtin type table order, used to decode the `b` type-tag's index byte.
    pub const TABLE: [BuiltinType; 10] = [
        BuiltinType::Str,
        BuiltinType::Int,
        BuiltinType::Bool,
        BuiltinType::Object,
        BuiltinType::Error,
        BuiltinType::NomemError,
        BuiltinType::VariableError,
        BuiltinType::ValueError,
        BuiltinType::OsError,
        BuiltinType::Array,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::Object => "object",
            Self::Error => "error",
            Self::NomemError => "nomem-error",
            Self::VariableError => "variable-error",
            Self::ValueError => "value-error",
            Self::OsError => "os-error",
            Self::Array => "array",
        }
    }

    /// Returns true for types that have a built-in constructor (types like
    /// array/error have one, pure data types do not).
    #[must_use]
    pub fn has_constructor(self) -> bool {
        matches!(
            self,
            Self::Error | Self::NomemError | Self::VariableError | Self::ValueError | Self::OsError | Self::Array
        )
    }
}

/// The three closed type kinds: a built-in, a function signature, or a
/// user-declared asda-class.
#[derive(Debug)]
pub enum TypeKind {
    Basic(BuiltinType),
    Function {
        arg_types: Vec<std::rc::Rc<Type>>,
        return_type: Option<std::rc::Rc<Type>>,
    },
    AsdaClass {
        /// Number of data-field attribute slots preceding the method slots.
        nasdaattrs: u16,
    },
}

/// A compile-time type descriptor.
#[derive(Debug)]
pub struct Type {
    pub kind: TypeKind,
    name: String,
    /// Ordered, index-addressed method table. Unset entries are `None`
    /// until `SETMETHODS2CLASS` installs them — transient during class
    /// construction, never unset again afterward.
    pub methods: RefCell<Vec<Option<Value>>>,
    /// `CALLCONSTRUCTOR`'s target, present for builtin types that have one.
    pub constructor: Option<ConstructorFn>,
}

impl Type {
    #[must_use]
    pub fn new_basic(builtin: BuiltinType, method_count: usize) -> Self {
        Self {
            kind: TypeKind::Basic(builtin),
            name: builtin.name().to_owned(),
            methods: RefCell::new(vec![None; method_count]),
            constructor: default_constructor(builtin),
        }
    }

    #[must_use]
    pub fn new_function(arg_types: Vec<std::rc::Rc<Type>>, return_type: Option<std::rc::Rc<Type>>) -> Self {
        Self {
            kind: TypeKind::Function { arg_types, return_type },
            name: "function".to_owned(),
            methods: RefCell::new(Vec::new()),
            constructor: None,
        }
    }

    #[must_use]
    pub fn new_asda_class(name: String, nasdaattrs: u16, nmethods: u16) -> Self {
        Self {
            kind: TypeKind::AsdaClass { nasdaattrs },
            name,
            methods: RefCell::new(vec![None; nmethods as usize]),
            constructor: Some(asda_class_constructor),
        }
    }

    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn nasdaattrs(&self) -> u16 {
        match self.kind {
            TypeKind::AsdaClass { nasdaattrs } => nasdaattrs,
            _ => 0,
        }
    }

    /// Total attribute count (data fields + methods), used to bounds-check
    /// `GETATTR`/`SETATTR` indices.
    #[must_use]
    pub fn attr_count(&self) -> usize {
        self.nasdaattrs() as usize + self.methods.borrow().len()
    }

    /// Installs `funcs` as this type's trailing method slots, per
    /// `SETMETHODS2CLASS(T, k)`. Any method previously occupying a slot is
    /// returned so the caller can decref it.
    pub fn install_methods(&self, funcs: Vec<Value>) -> Vec<Option<Value>> {
        let mut table = self.methods.borrow_mut();
        let start = table.len() - funcs.len();
        let mut displaced = Vec::with_capacity(funcs.len());
        for (slot, func) in table[start..].iter_mut().zip(funcs) {
            displaced.push(std::mem::replace(slot, Some(func)));
        }
        displaced
    }

    /// Null out every method slot, decrefing each displaced function. Called
    /// during module teardown to break class/method/instance reference
    /// cycles before types are destroyed.
    pub fn clear_methods(&self, heap: &mut Heap) {
        let mut table = self.methods.borrow_mut();
        for slot in table.iter_mut() {
            if let Some(value) = slot.take() {
                value.drop_with_heap(heap);
            }
        }
    }
}

/// Signature for a type's constructor, invoked by `CALLCONSTRUCTOR`. Takes
/// the type itself (by `Rc`) so an asda-class constructor can both read its
/// own `nasdaattrs` and stamp the new instance with its identity.
pub type ConstructorFn = fn(ty: &Rc<Type>, args: Vec<Value>, heap: &mut Heap) -> RunResult<Value>;

fn default_constructor(builtin: BuiltinType) -> Option<ConstructorFn> {
    match builtin {
        BuiltinType::Array => Some(array_constructor),
        BuiltinType::Error => Some(error_constructor),
        BuiltinType::NomemError => Some(nomem_error_constructor),
        BuiltinType::VariableError => Some(variable_error_constructor),
        BuiltinType::ValueError => Some(value_error_constructor),
        BuiltinType::OsError => Some(os_error_constructor),
        BuiltinType::Str | BuiltinType::Int | BuiltinType::Bool | BuiltinType::Object => None,
    }
}

/// Allocates an asda-class instance: `nasdaattrs` slots, the leading
/// `args.len()` of them filled in order, the rest left unset.
fn asda_class_constructor(ty: &Rc<Type>, args: Vec<Value>, heap: &mut Heap) -> RunResult<Value> {
    let nasdaattrs = ty.nasdaattrs() as usize;
    let mut attrs: Vec<Option<Value>> = vec![None; nasdaattrs];
    for (slot, arg) in attrs.iter_mut().zip(args) {
        *slot = Some(arg);
    }
    Ok(Value::Object(heap.allocate(crate::heap::HeapData::AsdaInstance { ty: Rc::clone(ty), attrs })))
}

fn array_constructor(_ty: &Rc<Type>, args: Vec<Value>, heap: &mut Heap) -> RunResult<Value> {
    Ok(Value::Object(heap.allocate(crate::heap::HeapData::Array(args))))
}

fn one_message_arg(args: Vec<Value>) -> RunResult<Value> {
    let mut args = args;
    if args.len() != 1 {
        return Err(crate::exceptions::ExcType::value_error(format!(
            "error constructor expects exactly one message argument, got {}",
            args.len()
        )));
    }
    Ok(args.remove(0))
}

fn error_constructor(_ty: &Rc<Type>, args: Vec<Value>, heap: &mut Heap) -> RunResult<Value> {
    let message = one_message_arg(args)?;
    Ok(Value::Object(heap.allocate(crate::heap::HeapData::Error {
        exc_type: crate::exceptions::ExcType::Error,
        message,
    })))
}

fn nomem_error_constructor(_ty: &Rc<Type>, args: Vec<Value>, heap: &mut Heap) -> RunResult<Value> {
    let message = one_message_arg(args)?;
    Ok(Value::Object(heap.allocate(crate::heap::HeapData::Error {
        exc_type: crate::exceptions::ExcType::NoMem,
        message,
    })))
}

fn variable_error_constructor(_ty: &Rc<Type>, args: Vec<Value>, heap: &mut Heap) -> RunResult<Value> {
    let message = one_message_arg(args)?;
    Ok(Value::Object(heap.allocate(crate::heap::HeapData::Error {
        exc_type: crate::exceptions::ExcType::Variable,
        message,
    })))
}

fn value_error_constructor(_ty: &Rc<Type>, args: Vec<Value>, heap: &mut Heap) -> RunResult<Value> {
    let message = one_message_arg(args)?;
    Ok(Value::Object(heap.allocate(crate::heap::HeapData::Error {
        exc_type: crate::exceptions::ExcType::Value,
        message,
    })))
}

fn os_error_constructor(_ty: &Rc<Type>, args: Vec<Value>, heap: &mut Heap) -> RunResult<Value> {
    let message = one_message_arg(args)?;
    Ok(Value::Object(heap.allocate(crate::heap::HeapData::Error {
        exc_type: crate::exceptions::ExcType::Os,
        message,
    })))
}

/// A single shared `Rc<Type>` per builtin, since type descriptors are
/// compile-time constants — every `TypeRef::Builtin` reference in decoded
/// bytecode resolves to the same identity rather than allocating a fresh
/// descriptor per reference.
pub struct BuiltinTypes {
    table: [Rc<Type>; 10],
}

impl BuiltinTypes {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: BuiltinType::TABLE.map(|bt| Rc::new(Type::new_basic(bt, 0))),
        }
    }

    #[must_use]
    pub fn get(&self, builtin: BuiltinType) -> Rc<Type> {
        Rc::clone(&self.table[BuiltinType::TABLE.iter().position(|&b| b == builtin).unwrap()])
    }
}

impl Default for BuiltinTypes {
    fn default() -> Self {
        Self::new()
    }
}
