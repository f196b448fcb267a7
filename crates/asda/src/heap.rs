//! Reference-counted object heap: a growable arena of allocated objects,
//! each tracked by refcount rather than the garbage collector's ownership
//! graph.
//!
//! Destruction happens in two phases: dropping an object drops its direct
//! references to other objects first, and only then is its own slot freed.
//! This lets reference cycles broken elsewhere (e.g. a type's method table
//! nulled during module teardown, see `types::Type::clear_methods`) avoid a
//! use-after-free when the cycle finally unwinds. The arena already gives a
//! full object inventory for free, so the two-phase split survives here only
//! where it actually matters: recursively decrefing a structure's children.

use std::rc::Rc;

use num_bigint::BigInt;

use crate::function::FunctionObj;
use crate::string_obj::StringObj;
use crate::types::Type;

/// Identifier for an object living in the heap arena.
pub type ObjectId = usize;

/// A value as seen by the execution engine: either inline (no allocation) or
/// a reference into the heap arena.
///
/// Small integers are kept inline as an enum variant rather than a tagged
/// pointer, and booleans never allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    SmallInt(i64),
    Bool(bool),
    Object(ObjectId),
}

impl Value {
    #[must_use]
    pub fn as_object_id(self) -> Option<ObjectId> {
        match self {
            Self::Object(id) => Some(id),
            _ => None,
        }
    }

    /// Drops this value's heap reference, if it has one. No-op for inline values.
    pub fn drop_with_heap(self, heap: &mut Heap) {
        if let Self::Object(id) = self {
            heap.dec_ref(id);
        }
    }

    /// Clones this value, incrementing the heap refcount if it's a reference.
    #[must_use]
    pub fn dup_with_heap(self, heap: &mut Heap) -> Self {
        if let Self::Object(id) = self {
            heap.inc_ref(id);
        }
        self
    }
}

/// Every kind of object that must live in the arena rather than inline.
#[derive(Debug)]
pub enum HeapData {
    /// An integer outside the small-int range.
    Big(BigInt),
    Str(StringObj),
    Array(Vec<Value>),
    /// A first-class error value, constructed via `CALLCONSTRUCTOR` on an
    /// error type and not yet (or no longer) in flight as a thrown exception.
    Error {
        exc_type: crate::exceptions::ExcType,
        message: Value,
    },
    /// An instance of a user-declared `asda-class` type: data-field slots
    /// only, methods are looked up through `ty`'s method table.
    AsdaInstance { ty: Rc<Type>, attrs: Vec<Option<Value>> },
    /// An instance of the plain `object` base type: identity, no payload.
    PlainObject,
    Function(FunctionObj),
    /// A one-slot mutable cell giving a captured local mutable-reference
    /// semantics in a closure (glossary: "box").
    Box(Option<Value>),
}

impl HeapData {
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Big(_) => "int",
            Self::Str(_) => "str",
            Self::Array(_) => "array",
            Self::Error { exc_type, .. } => exc_type.name(),
            Self::AsdaInstance { ty, .. } => ty.class_name(),
            Self::PlainObject => "object",
            Self::Function(_) => "function",
            Self::Box(_) => "box",
        }
    }
}

struct HeapObject {
    refcount: usize,
    data: HeapData,
}

/// Reference-counted arena backing every heap-allocated asda object.
///
/// IDs are never reused within a run; the arena only grows. This sidesteps
/// the ABA hazards a reused-ID scheme would introduce, at the cost of
/// holding freed slots as `None` until the run ends.
#[derive(Default)]
pub struct Heap {
    objects: Vec<Option<HeapObject>>,
}

impl Heap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new object with refcount 1, returning its id.
    pub fn allocate(&mut self, data: HeapData) -> ObjectId {
        let id = self.objects.len();
        self.objects.push(Some(HeapObject { refcount: 1, data }));
        id
    }

    /// # Panics
    /// Panics if `id` is invalid or already freed.
    pub fn inc_ref(&mut self, id: ObjectId) {
        self.slot_mut(id, "inc_ref").refcount += 1;
    }

    /// Decrements `id`'s refcount, recursively freeing it and any objects it
    /// alone was keeping alive once the count reaches zero.
    ///
    /// # Panics
    /// Panics if `id` is invalid or already freed.
    pub fn dec_ref(&mut self, id: ObjectId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let entry = self.slot_mut(current, "dec_ref");
            if entry.refcount > 1 {
                entry.refcount -= 1;
                continue;
            }
            let object = self.objects[current].take().expect("Heap::dec_ref: object already freed");
            enqueue_children(&object.data, &mut stack);
        }
    }

    /// # Panics
    /// Panics if `id` is invalid or already freed.
    #[must_use]
    pub fn get(&self, id: ObjectId) -> &HeapData {
        &self
            .objects
            .get(id)
            .expect("Heap::get: slot missing")
            .as_ref()
            .expect("Heap::get: object already freed")
            .data
    }

    /// # Panics
    /// Panics if `id` is invalid or already freed.
    pub fn get_mut(&mut self, id: ObjectId) -> &mut HeapData {
        &mut self
            .objects
            .get_mut(id)
            .expect("Heap::get_mut: slot missing")
            .as_mut()
            .expect("Heap::get_mut: object already freed")
            .data
    }

    /// Number of still-live objects, used by `driver` diagnostics at shutdown
    /// to detect a reference-counting leak.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.objects.iter().filter(|o| o.is_some()).count()
    }

    fn slot_mut(&mut self, id: ObjectId, op: &'static str) -> &mut HeapObject {
        self.objects
            .get_mut(id)
            .unwrap_or_else(|| panic!("Heap::{op}: slot missing"))
            .as_mut()
            .unwrap_or_else(|| panic!("Heap::{op}: object already freed"))
    }
}

/// Pushes the ids of every object directly reachable from `data` onto `stack`,
/// implementing the "release_refs" half of the two-phase destructor for
/// arena objects: the arena itself reclaims memory, but child references
/// still need an explicit decref.
fn enqueue_children(data: &HeapData, stack: &mut Vec<ObjectId>) {
    match data {
        HeapData::Array(items) => {
            for item in items {
                if let Value::Object(id) = item {
                    stack.push(*id);
                }
            }
        }
        HeapData::Error { message, .. } => {
            if let Value::Object(id) = message {
                stack.push(*id);
            }
        }
        HeapData::AsdaInstance { attrs, .. } => {
            for attr in attrs.iter().flatten() {
                if let Value::Object(id) = attr {
                    stack.push(*id);
                }
            }
        }
        HeapData::Function(func) => func.enqueue_children(stack),
        HeapData::Box(slot) => {
            if let Some(Value::Object(id)) = slot {
                stack.push(*id);
            }
        }
        HeapData::Big(_) | HeapData::Str(_) | HeapData::PlainObject => {}
    }
}
