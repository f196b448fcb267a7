//! Shared bytecode-fixture builder for the integration tests under
//! `crates/asda/tests/`. Mirrors the shape of `bytecode::decoder`'s own
//! in-crate `builder()` test helper, generalized to multiple functions and
//! import lists, since these tests only see the crate's public surface
//! (`decode_file`, `Vm`, `Driver`) and have to assemble wire bytes by hand
//! the same way a real compiler would.

#![allow(dead_code)]

pub const MAGIC: [u8; 6] = [0x61, 0x73, 0x64, 0x61, 0xA5, 0xDA];

/// Builtin-type-table indices (`types::BuiltinType::TABLE` order), needed to
/// encode a `b`-tagged type reference inside `EH_ADD`/`CALLCONSTRUCTOR`.
pub mod builtin_idx {
    pub const STR: u8 = 0;
    pub const INT: u8 = 1;
    pub const BOOL: u8 = 2;
    pub const OBJECT: u8 = 3;
    pub const ERROR: u8 = 4;
    pub const NOMEM_ERROR: u8 = 5;
    pub const VARIABLE_ERROR: u8 = 6;
    pub const VALUE_ERROR: u8 = 7;
    pub const OS_ERROR: u8 = 8;
    pub const ARRAY: u8 = 9;
}

/// One function body under construction: the op byte stream plus an op
/// counter (the wire format's `oplen` is an op *count*, not a byte count).
#[derive(Default)]
pub struct OpBuilder {
    bytes: Vec<u8>,
    nops: u16,
}

impl OpBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn tag(&mut self, t: u8) -> &mut Self {
        self.nops += 1;
        self.bytes.push(t);
        self
    }

    pub fn push_str(&mut self, s: &str) -> &mut Self {
        self.tag(b'"');
        self.bytes.extend_from_slice(&(s.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(s.as_bytes());
        self
    }

    pub fn push_int(&mut self, magnitude_le: &[u8], negative: bool) -> &mut Self {
        self.tag(if negative { b'2' } else { b'1' });
        self.bytes.extend_from_slice(&(magnitude_le.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(magnitude_le);
        self
    }

    pub fn set_local(&mut self, level: u16, index: u16) -> &mut Self {
        self.tag(b'V');
        self.bytes.extend_from_slice(&level.to_le_bytes());
        self.bytes.extend_from_slice(&index.to_le_bytes());
        self
    }

    pub fn get_local(&mut self, level: u16, index: u16) -> &mut Self {
        self.tag(b'v');
        self.bytes.extend_from_slice(&level.to_le_bytes());
        self.bytes.extend_from_slice(&index.to_le_bytes());
        self
    }

    pub fn get_from_module(&mut self, module_path: &str, index: u16) -> &mut Self {
        self.tag(b'M');
        self.bytes.extend_from_slice(&(module_path.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(module_path.as_bytes());
        self.bytes.extend_from_slice(&index.to_le_bytes());
        self
    }

    pub fn create_box(&mut self) -> &mut Self {
        self.tag(b'0')
    }

    pub fn set_to_box(&mut self) -> &mut Self {
        self.tag(b'O')
    }

    pub fn unbox(&mut self) -> &mut Self {
        self.tag(b'o')
    }

    pub fn create_func(&mut self, func_index: u16) -> &mut Self {
        self.tag(b'f');
        self.bytes.extend_from_slice(&func_index.to_le_bytes());
        self
    }

    pub fn call_func(&mut self, nargs: u16) -> &mut Self {
        self.tag(b'(');
        self.bytes.extend_from_slice(&nargs.to_le_bytes());
        self
    }

    pub fn call_constructor_builtin(&mut self, builtin: u8, nargs: u16) -> &mut Self {
        self.tag(b')');
        self.bytes.push(b'b');
        self.bytes.push(builtin);
        self.bytes.extend_from_slice(&nargs.to_le_bytes());
        self
    }

    pub fn jump(&mut self, idx: u16) -> &mut Self {
        self.tag(b'K');
        self.bytes.extend_from_slice(&idx.to_le_bytes());
        self
    }

    pub fn str_join(&mut self, n: u16) -> &mut Self {
        self.tag(b'j');
        self.bytes.extend_from_slice(&n.to_le_bytes());
        self
    }

    pub fn store_retval(&mut self) -> &mut Self {
        self.tag(b'T')
    }

    pub fn throw(&mut self) -> &mut Self {
        self.tag(b't')
    }

    pub fn ret(&mut self) -> &mut Self {
        self.tag(b'r')
    }

    pub fn value_return(&mut self) -> &mut Self {
        self.tag(b'R')
    }

    pub fn pop(&mut self) -> &mut Self {
        self.tag(b'P')
    }

    pub fn int_add(&mut self) -> &mut Self {
        self.tag(b'+')
    }

    pub fn dup(&mut self) -> &mut Self {
        self.tag(b'D')
    }

    /// `EH_ADD`, with a builtin error type and the `errvar` pointing at the
    /// current scope level.
    pub fn eh_add_builtin(&mut self, jump_idx: u16, builtin: u8, errvar_level: u16, errvar_index: u16) -> &mut Self {
        self.tag(b'H');
        self.bytes.extend_from_slice(&jump_idx.to_le_bytes());
        self.bytes.push(b'b');
        self.bytes.push(builtin);
        self.bytes.extend_from_slice(&errvar_level.to_le_bytes());
        self.bytes.extend_from_slice(&errvar_index.to_le_bytes());
        self
    }

    pub fn eh_rm(&mut self) -> &mut Self {
        self.tag(b'h')
    }

    pub fn fs_ok(&mut self) -> &mut Self {
        self.tag(b'Y')
    }

    pub fn fs_error(&mut self) -> &mut Self {
        self.tag(b'y')
    }

    pub fn fs_apply(&mut self) -> &mut Self {
        self.tag(b'A')
    }

    fn finish(&self) -> (Vec<u8>, u16) {
        (self.bytes.clone(), self.nops)
    }
}

/// One function's full header + body, ready to append into a file.
pub struct FunctionSpec {
    pub nlocals: u16,
    pub maxstacksz: u16,
    pub ops: OpBuilder,
}

impl FunctionSpec {
    pub fn new(nlocals: u16, maxstacksz: u16, ops: OpBuilder) -> Self {
        Self { nlocals, maxstacksz, ops }
    }
}

/// Assembles a complete bytecode file: header, empty type list, an import
/// list, and one or more functions (`functions[0]` is always `main`).
pub fn build_file(source_name: &str, imports: &[&str], functions: Vec<FunctionSpec>) -> Vec<u8> {
    let mut out = MAGIC.to_vec();
    out.extend_from_slice(&(source_name.len() as u32).to_le_bytes());
    out.extend_from_slice(source_name.as_bytes());

    out.push(b'y');
    out.extend_from_slice(&0u16.to_le_bytes());

    out.push(b'i');
    out.extend_from_slice(&(imports.len() as u16).to_le_bytes());
    for imp in imports {
        out.extend_from_slice(&(imp.len() as u32).to_le_bytes());
        out.extend_from_slice(imp.as_bytes());
    }

    out.extend_from_slice(&(functions.len() as u16).to_le_bytes());
    for f in &functions {
        out.extend_from_slice(&f.nlocals.to_le_bytes());
        out.extend_from_slice(&f.maxstacksz.to_le_bytes());
        let (body, nops) = f.ops.finish();
        out.extend_from_slice(&nops.to_le_bytes());
        out.extend_from_slice(&body);
        // `oplen` above already covers every real op in `body` with no
        // trailing `SET_LINENO`, so `decode_one_function`'s loop exits by
        // count before it would consume an `E` terminator — appending one
        // here would misalign the next function's header.
    }
    out
}
