//! Decoded, execution-ready representation of one function body.
//!
//! A `Code` is the decoder's output and the interpreter's input: an ordered
//! array of already-resolved operations (jump targets are op indices, not
//! byte offsets) plus the metadata `vm::dispatch` needs to set up a call
//! frame — declared local count and the stack depth bound the compiler
//! guaranteed.

use std::path::PathBuf;
use std::rc::Rc;

/// A lexical-scope reference: scope level plus slot index
/// (`Scope::get_for_level` + local-slot indexing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarRef {
    pub level: usize,
    pub index: usize,
}

/// A reference to an exported slot in another module's scope (`GETFROMMODULE`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleVarRef {
    pub module_path: String,
    pub index: usize,
}

/// A type reference resolved to an index into the owning module's type list
/// (builtin types are resolved separately via `types::BuiltinType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRef {
    Builtin(crate::types::BuiltinType),
    Module(usize),
}

/// One decoded operation. Jump targets are op indices within this `Code`
/// (already fixed up from the wire format's relative byte offsets).
#[derive(Debug, Clone)]
pub enum Op {
    PushStr(Rc<[char]>),
    PushInt { magnitude_le: Rc<[u8]>, negative: bool },
    GetBuiltinVar(usize),
    SetLocal(VarRef),
    GetLocal(VarRef),
    GetFromModule(ModuleVarRef),
    CreateBox,
    SetToBox,
    Unbox,
    GetAttr { ty: TypeRef, attr: usize },
    SetAttr { ty: TypeRef, attr: usize },
    /// Builds an asda-function from the currently executing scope plus the
    /// module function at `func_index`.
    CreateFunc { func_index: usize },
    CallBuiltin(usize),
    CallFunc(usize),
    CallConstructor { ty: TypeRef, nargs: usize },
    CreatePartial(usize),
    Jump(usize),
    JumpIf(usize),
    JumpIfEqInt(usize),
    JumpIfEqStr(usize),
    StrJoin(usize),
    StoreRetVal,
    Throw,
    Return,
    ValueReturn,
    Pop,
    Swap,
    Dup,
    IntAdd,
    IntSub,
    IntMul,
    IntNeg,
    EhAdd {
        jump_idx: usize,
        err_type: TypeRef,
        errvar: VarRef,
    },
    EhRm,
    FsOk,
    FsError,
    FsValueReturn,
    FsJump(usize),
    FsApply,
    FsDiscard,
    SetMethods2Class { ty: TypeRef, count: usize },
}

/// One decoded op plus the source line in effect when it was decoded.
#[derive(Debug, Clone)]
pub struct LocatedOp {
    pub op: Op,
    pub line: u32,
}

/// A decoded function body.
#[derive(Debug)]
pub struct Code {
    ops: Vec<LocatedOp>,
    /// Declared local-variable slot count.
    pub nlocals: usize,
    /// Upper bound on simultaneous operand-stack depth, statically
    /// pre-allocated per call frame.
    pub maxstacksz: usize,
    /// Kept alive for diagnostics.
    pub source_path: PathBuf,
}

impl Code {
    #[must_use]
    pub fn new(ops: Vec<LocatedOp>, nlocals: usize, maxstacksz: usize, source_path: PathBuf) -> Self {
        Self {
            ops,
            nlocals,
            maxstacksz,
            source_path,
        }
    }

    #[must_use]
    pub fn ops(&self) -> &[LocatedOp] {
        &self.ops
    }

    #[must_use]
    pub fn nops(&self) -> usize {
        self.ops.len()
    }

    /// Every jump/handler target decoded into this code must satisfy
    /// `idx ∈ [0, nops)`. Checked once, at decode time, rather than on every
    /// jump at run time.
    #[must_use]
    pub fn all_targets_in_range(&self) -> bool {
        let nops = self.nops();
        let in_range = |idx: usize| idx < nops;
        self.ops.iter().all(|located| match &located.op {
            Op::Jump(idx) | Op::JumpIf(idx) | Op::JumpIfEqInt(idx) | Op::JumpIfEqStr(idx) | Op::FsJump(idx) => {
                in_range(*idx)
            }
            Op::EhAdd { jump_idx, .. } => in_range(*jump_idx),
            _ => true,
        })
    }
}
