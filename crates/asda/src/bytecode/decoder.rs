//! Bytecode decoder: header, type list, imports, and function bodies,
//! consumed as a little-endian byte stream.
//!
//! A couple of wire-format details aren't pinned down by any one canonical
//! byte table (see DESIGN.md for the full reasoning):
//! - The header magic is `61 73 64 61 A5 DA`, i.e. ASCII `asda` followed by
//!   two high-bit-set sentinel bytes.
//! - A handful of opcodes (`GETFROMMODULE`, `SETMETHODS2CLASS`, `EH_ADD/RM`,
//!   the `FS_*` family, `CREATEPARTIAL`, `STORERETVAL`) are assigned unused
//!   single-character ASCII tags in the same style as the rest, since no
//!   compiler producing this format exists here — only internal consistency
//!   between decoder and encoder matters.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::bytecode::code::{Code, LocatedOp, ModuleVarRef, Op, TypeRef, VarRef};
use crate::exceptions::{ExcType, RunResult};
use crate::types::{BuiltinType, Type};
use crate::utf8;

const MAGIC: [u8; 6] = [0x61, 0x73, 0x64, 0x61, 0xA5, 0xDA];

/// Everything the decoder produces from one bytecode file: its declared
/// types, its import list (not yet resolved to modules), its function
/// bodies, and which of them is `main`.
pub struct DecodedFile {
    pub source_path: PathBuf,
    pub types: Vec<Rc<Type>>,
    pub imports: Vec<String>,
    pub functions: Vec<Rc<Code>>,
    /// The first function in the file is always the module's main body.
    pub main_index: usize,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> RunResult<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(ExcType::value_error("unexpected end of bytecode file"));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> RunResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> RunResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> RunResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn tag(&mut self) -> RunResult<char> {
        Ok(self.u8()? as char)
    }

    /// A length-prefixed (`uint32`), interior-NUL-free UTF-8 string.
    fn string(&mut self) -> RunResult<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        if bytes.contains(&0) {
            return Err(ExcType::value_error("string constant contains an interior NUL byte"));
        }
        let codepoints = utf8::decode(bytes)?;
        Ok(codepoints.into_iter().collect())
    }

    /// Like [`string`](Self::string), but translates `/` to the host path
    /// separator.
    fn path_string(&mut self) -> RunResult<PathBuf> {
        let raw = self.string()?;
        let translated: String = raw
            .chars()
            .map(|c| if c == '/' { std::path::MAIN_SEPARATOR } else { c })
            .collect();
        Ok(PathBuf::from(translated))
    }
}

/// Decodes a complete bytecode file.
///
/// # Errors
/// Returns a `value-error` for any structural malformation: bad magic,
/// truncated sections, out-of-range jump targets, or a doubled
/// `SET_LINENO` meta-op.
pub fn decode_file(bytes: &[u8], relative_to: &Path) -> RunResult<DecodedFile> {
    let mut cur = Cursor::new(bytes);

    let magic = cur.take(6)?;
    if magic != MAGIC {
        return Err(ExcType::value_error("bad bytecode magic header"));
    }

    let rel_path = cur.path_string()?;
    let source_path = relative_to.join(&rel_path);

    let types = decode_type_list(&mut cur)?;
    let imports = decode_imports(&mut cur)?;
    let functions = decode_functions(&mut cur, &types, &source_path)?;

    if functions.is_empty() {
        return Err(ExcType::value_error("bytecode file declares no functions"));
    }

    Ok(DecodedFile {
        source_path,
        types,
        imports,
        functions,
        main_index: 0,
    })
}

fn decode_type_list(cur: &mut Cursor<'_>) -> RunResult<Vec<Rc<Type>>> {
    let section_tag = cur.tag()?;
    if section_tag != 'y' {
        return Err(ExcType::value_error(format!(
            "expected type-list section tag 'y', found '{section_tag}'"
        )));
    }
    let count = cur.u16()? as usize;
    let mut types = Vec::with_capacity(count);
    for _ in 0..count {
        types.push(decode_class_type(cur)?);
    }
    Ok(types)
}

/// Decodes one module-declared `asda-class` type descriptor. Only asda-class
/// declarations live in the top-level type list; builtin/void/function-type
/// tags only ever appear nested inside an op's type reference or a
/// function-type's argument list (see [`decode_type_ref`] and
/// [`decode_type_tag`]).
fn decode_class_type(cur: &mut Cursor<'_>) -> RunResult<Rc<Type>> {
    let tag = cur.tag()?;
    if tag != 'a' {
        return Err(ExcType::value_error(format!(
            "expected asda-class type tag 'a' in type list, found '{tag}'"
        )));
    }
    let nasdaattrs = cur.u16()?;
    let nmethods = cur.u16()?;
    let name = cur.string()?;
    Ok(Rc::new(Type::new_asda_class(name, nasdaattrs, nmethods)))
}

/// Decodes a single type tag, per §6's "Type tag bytes" grammar. Used only
/// for function-type argument/return descriptors, which are structural and
/// never need identity (unlike asda-class references, which go through
/// [`decode_type_ref`] instead).
fn decode_type_tag(cur: &mut Cursor<'_>, types: &[Rc<Type>]) -> RunResult<Option<Rc<Type>>> {
    match cur.tag()? {
        'v' => Ok(None),
        'b' => {
            let idx = cur.u8()? as usize;
            let builtin = *BuiltinType::TABLE.get(idx).ok_or_else(|| {
                ExcType::value_error(format!("builtin type index {idx} out of range"))
            })?;
            Ok(Some(Rc::new(Type::new_basic(builtin, 0))))
        }
        'f' => {
            let return_type = decode_type_tag(cur, types)?;
            let nargs = cur.u8()? as usize;
            let mut arg_types = Vec::with_capacity(nargs);
            for _ in 0..nargs {
                if let Some(t) = decode_type_tag(cur, types)? {
                    arg_types.push(t);
                }
            }
            Ok(Some(Rc::new(Type::new_function(arg_types, return_type))))
        }
        'a' => {
            let idx = cur.u16()? as usize;
            let ty = types
                .get(idx)
                .ok_or_else(|| ExcType::value_error(format!("module type index {idx} out of range")))?;
            Ok(Some(Rc::clone(ty)))
        }
        other => Err(ExcType::value_error(format!("unrecognized type tag '{other}'"))),
    }
}

/// Decodes a type reference as it appears inside an op payload
/// (`GETATTR`, `SETATTR`, `CALLCONSTRUCTOR`, `SETMETHODS2CLASS`, an
/// `EH_ADD` handler's declared error type): either a builtin-table index or
/// an index into this module's own declared type list.
fn decode_type_ref(cur: &mut Cursor<'_>, ntypes: usize) -> RunResult<TypeRef> {
    match cur.tag()? {
        'b' => {
            let idx = cur.u8()? as usize;
            let builtin = *BuiltinType::TABLE
                .get(idx)
                .ok_or_else(|| ExcType::value_error(format!("builtin type index {idx} out of range")))?;
            Ok(TypeRef::Builtin(builtin))
        }
        'a' => {
            let idx = cur.u16()? as usize;
            if idx >= ntypes {
                return Err(ExcType::value_error(format!("module type index {idx} out of range")));
            }
            Ok(TypeRef::Module(idx))
        }
        other => Err(ExcType::value_error(format!("unrecognized type reference tag '{other}'"))),
    }
}

fn decode_imports(cur: &mut Cursor<'_>) -> RunResult<Vec<String>> {
    let section_tag = cur.tag()?;
    if section_tag != 'i' {
        return Err(ExcType::value_error(format!(
            "expected import section tag 'i', found '{section_tag}'"
        )));
    }
    let count = cur.u16()? as usize;
    let mut imports = Vec::with_capacity(count);
    for _ in 0..count {
        imports.push(cur.string()?);
    }
    Ok(imports)
}

fn decode_var_ref(cur: &mut Cursor<'_>) -> RunResult<VarRef> {
    Ok(VarRef {
        level: cur.u16()? as usize,
        index: cur.u16()? as usize,
    })
}

fn decode_functions(cur: &mut Cursor<'_>, types: &[Rc<Type>], source_path: &Path) -> RunResult<Vec<Rc<Code>>> {
    let count = cur.u16()? as usize;
    let mut functions = Vec::with_capacity(count);
    for _ in 0..count {
        functions.push(Rc::new(decode_one_function(cur, types, source_path)?));
    }
    for code in &functions {
        if !code.all_targets_in_range() {
            return Err(ExcType::value_error("jump or handler target out of range"));
        }
    }
    Ok(functions)
}

fn decode_one_function(cur: &mut Cursor<'_>, types: &[Rc<Type>], source_path: &Path) -> RunResult<Code> {
    let nlocals = cur.u16()? as usize;
    let maxstacksz = cur.u16()? as usize;
    let oplen = cur.u16()? as usize;

    let mut ops = Vec::with_capacity(oplen);
    let mut line: u32 = 1;
    let mut line_just_set = false;

    while ops.len() < oplen {
        let tag = cur.tag()?;
        if tag == 'L' {
            if line_just_set {
                return Err(ExcType::value_error("two consecutive SET_LINENO meta-ops"));
            }
            line = cur.u32()?;
            line_just_set = true;
            continue;
        }
        line_just_set = false;
        if tag == 'E' {
            break;
        }
        let op = decode_op(tag, cur, types)?;
        ops.push(LocatedOp { op, line });
    }

    Ok(Code::new(ops, nlocals, maxstacksz, source_path.to_path_buf()))
}

#[allow(clippy::too_many_lines)]
fn decode_op(tag: char, cur: &mut Cursor<'_>, types: &[Rc<Type>]) -> RunResult<Op> {
    let ntypes = types.len();
    match tag {
        '"' => {
            let s = cur.string()?;
            Ok(Op::PushStr(s.chars().collect::<Vec<_>>().into()))
        }
        '1' | '2' => {
            let len = cur.u32()? as usize;
            let magnitude = cur.take(len)?.to_vec();
            Ok(Op::PushInt {
                magnitude_le: magnitude.into(),
                negative: tag == '2',
            })
        }
        'U' => Ok(Op::GetBuiltinVar(cur.u16()? as usize)),
        'V' => Ok(Op::SetLocal(decode_var_ref(cur)?)),
        'v' => Ok(Op::GetLocal(decode_var_ref(cur)?)),
        'M' => {
            let module_path = cur.string()?;
            let index = cur.u16()? as usize;
            Ok(Op::GetFromModule(ModuleVarRef { module_path, index }))
        }
        '0' => Ok(Op::CreateBox),
        'O' => Ok(Op::SetToBox),
        'o' => Ok(Op::Unbox),
        '.' => {
            let ty = decode_type_ref(cur, ntypes)?;
            let attr = cur.u16()? as usize;
            Ok(Op::GetAttr { ty, attr })
        }
        ':' => {
            let ty = decode_type_ref(cur, ntypes)?;
            let attr = cur.u16()? as usize;
            Ok(Op::SetAttr { ty, attr })
        }
        'f' => Ok(Op::CreateFunc {
            func_index: cur.u16()? as usize,
        }),
        'b' => Ok(Op::CallBuiltin(cur.u16()? as usize)),
        '(' => Ok(Op::CallFunc(cur.u16()? as usize)),
        ')' => {
            let ty = decode_type_ref(cur, ntypes)?;
            let nargs = cur.u16()? as usize;
            Ok(Op::CallConstructor { ty, nargs })
        }
        'C' => Ok(Op::CreatePartial(cur.u16()? as usize)),
        'K' => Ok(Op::Jump(cur.u16()? as usize)),
        'J' => Ok(Op::JumpIf(cur.u16()? as usize)),
        '=' => Ok(Op::JumpIfEqInt(cur.u16()? as usize)),
        'q' => Ok(Op::JumpIfEqStr(cur.u16()? as usize)),
        'j' => Ok(Op::StrJoin(cur.u16()? as usize)),
        'T' => Ok(Op::StoreRetVal),
        't' => Ok(Op::Throw),
        'r' => Ok(Op::Return),
        'R' => Ok(Op::ValueReturn),
        'P' => Ok(Op::Pop),
        'S' => Ok(Op::Swap),
        'D' => Ok(Op::Dup),
        '+' => Ok(Op::IntAdd),
        '-' => Ok(Op::IntSub),
        '_' => Ok(Op::IntNeg),
        '*' => Ok(Op::IntMul),
        'H' => {
            let jump_idx = cur.u16()? as usize;
            let err_type = decode_type_ref(cur, ntypes)?;
            let errvar = decode_var_ref(cur)?;
            Ok(Op::EhAdd { jump_idx, err_type, errvar })
        }
        'h' => Ok(Op::EhRm),
        'Y' => Ok(Op::FsOk),
        'y' => Ok(Op::FsError),
        'Z' => Ok(Op::FsValueReturn),
        'z' => Ok(Op::FsJump(cur.u16()? as usize)),
        'A' => Ok(Op::FsApply),
        'x' => Ok(Op::FsDiscard),
        'm' => {
            let ty = decode_type_ref(cur, ntypes)?;
            let count = cur.u16()? as usize;
            Ok(Op::SetMethods2Class { ty, count })
        }
        other => Err(ExcType::value_error(format!("unrecognized opcode tag '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        out.extend_from_slice(&3u32.to_le_bytes());
        out.extend_from_slice(b"a.a");
        out.push(b'y');
        out.extend_from_slice(&0u16.to_le_bytes()); // no classes
        out.push(b'i');
        out.extend_from_slice(&0u16.to_le_bytes()); // no imports
        out.extend_from_slice(&1u16.to_le_bytes()); // one function
        out.extend_from_slice(&0u16.to_le_bytes()); // nlocals
        out.extend_from_slice(&4u16.to_le_bytes()); // maxstacksz
        // oplen uint16, then opcodes; body: PUSHINT 1 nonneg, RETURN-VALUE, END
        let mut body = Vec::new();
        body.push(b'1');
        body.extend_from_slice(&1u32.to_le_bytes());
        body.push(1); // magnitude byte
        body.push(b'R');
        body.push(b'E');
        out.extend_from_slice(&2u16.to_le_bytes()); // oplen: 2 real ops (PUSHINT, VALUERETURN); E terminates
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn decodes_minimal_file_with_one_function() {
        let bytes = builder();
        let decoded = decode_file(&bytes, Path::new("/base")).unwrap();
        assert_eq!(decoded.functions.len(), 1);
        assert_eq!(decoded.main_index, 0);
        let code = &decoded.functions[0];
        assert_eq!(code.nops(), 2);
        assert!(matches!(code.ops()[0].op, Op::PushInt { negative: false, .. }));
        assert!(matches!(code.ops()[1].op, Op::ValueReturn));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = builder();
        bytes[0] = 0;
        assert!(decode_file(&bytes, Path::new("/base")).is_err());
    }

    #[test]
    fn rejects_doubled_set_lineno() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(b'a');
        bytes.push(b'y');
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.push(b'i');
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // oplen
        bytes.push(b'L');
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.push(b'L');
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.push(b'E');
        assert!(decode_file(&bytes, Path::new("/base")).is_err());
    }
}
