//! Lua 5.3 binary chunk serialization (dump) and deserialization (undump).
//!
//! The format follows PUC Lua 5.3 for the 64-bit platform profile exactly
//! (little-endian, 4-byte C ints, 8-byte size_t, 8-byte integers and
//! doubles), so chunks produced by the stock `luac` can be loaded.

use crate::error::UndumpError;
use crate::opcode::Instruction;
use crate::proto::{Constant, LocalVar, Proto, UpvalDesc};
use crescent_core::string::{StringId, StringInterner};
use tracing::debug;

// Lua 5.3 binary header constants
const LUA_SIGNATURE: &[u8; 4] = b"\x1bLua";
const LUAC_VERSION: u8 = 0x53;
const LUAC_FORMAT: u8 = 0;
const LUAC_DATA: &[u8; 6] = b"\x19\x93\r\n\x1a\n";
const CINT_SIZE: u8 = 4;
const CSIZET_SIZE: u8 = 8;
const INSTRUCTION_SIZE: u8 = 4;
const LUA_INTEGER_SIZE: u8 = 8;
const LUA_NUMBER_SIZE: u8 = 8;
const LUAC_INT: i64 = 0x5678;
const LUAC_NUM: f64 = 370.5;

// Constant type tags
const TAG_NIL: u8 = 0x00;
const TAG_BOOLEAN: u8 = 0x01;
const TAG_NUMBER: u8 = 0x03;
const TAG_INTEGER: u8 = 0x13;
const TAG_SHORT_STR: u8 = 0x04;
const TAG_LONG_STR: u8 = 0x14;

/// Strings of at most this length get the short-string tag, as in PUC Lua.
const SHORT_STR_MAX: usize = 40;

// ─── Undumper ───────────────────────────────────────────────────────────

/// Byte cursor over an immutable chunk buffer.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn read_byte(&mut self) -> Result<u8, UndumpError> {
        if self.pos >= self.data.len() {
            return Err(UndumpError::Truncated);
        }
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], UndumpError> {
        if self.pos + n > self.data.len() {
            return Err(UndumpError::Truncated);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32, UndumpError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&mut self) -> Result<u64, UndumpError> {
        let bytes = self.read_bytes(8)?;
        Ok(u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    /// A lua_Integer: the u64 reinterpreted as signed two's-complement.
    fn read_lua_integer(&mut self) -> Result<i64, UndumpError> {
        self.read_u64().map(|u| u as i64)
    }

    /// A lua_Number: the u64 reinterpreted as an IEEE-754 double.
    fn read_lua_number(&mut self) -> Result<f64, UndumpError> {
        self.read_u64().map(f64::from_bits)
    }

    /// A string. The size byte stores length + 1; 0 means absent, 0xFF
    /// means an 8-byte length follows.
    fn read_string(
        &mut self,
        strings: &mut StringInterner,
    ) -> Result<Option<StringId>, UndumpError> {
        let mut size = self.read_byte()? as u64;
        if size == 0xFF {
            size = self.read_u64()?;
        }
        if size == 0 {
            return Ok(None);
        }
        let bytes = self.read_bytes((size - 1) as usize)?;
        Ok(Some(strings.intern(bytes)))
    }
}

/// Deserialize a Lua 5.3 binary chunk into its main prototype.
pub fn undump(data: &[u8], strings: &mut StringInterner) -> Result<Proto, UndumpError> {
    let mut reader = Reader::new(data);
    check_header(&mut reader)?;
    // Upvalue count of the main function; redundant with the prototype's
    // own upvalue vector.
    let _num_upvalues = reader.read_byte()?;
    let proto = read_proto(&mut reader, strings, None)?;
    debug!(
        code = proto.code.len(),
        constants = proto.constants.len(),
        protos = proto.protos.len(),
        "chunk loaded"
    );
    Ok(proto)
}

fn check_header(reader: &mut Reader) -> Result<(), UndumpError> {
    if reader.read_bytes(4)? != LUA_SIGNATURE {
        return Err(UndumpError::NotAPrecompiledChunk);
    }
    if reader.read_byte()? != LUAC_VERSION {
        return Err(UndumpError::VersionMismatch);
    }
    if reader.read_byte()? != LUAC_FORMAT {
        return Err(UndumpError::FormatMismatch);
    }
    if reader.read_bytes(6)? != LUAC_DATA {
        return Err(UndumpError::Corrupted);
    }
    if reader.read_byte()? != CINT_SIZE {
        return Err(UndumpError::IntSizeMismatch);
    }
    if reader.read_byte()? != CSIZET_SIZE {
        return Err(UndumpError::SizetSizeMismatch);
    }
    if reader.read_byte()? != INSTRUCTION_SIZE {
        return Err(UndumpError::InstructionSizeMismatch);
    }
    if reader.read_byte()? != LUA_INTEGER_SIZE {
        return Err(UndumpError::LuaIntegerSizeMismatch);
    }
    if reader.read_byte()? != LUA_NUMBER_SIZE {
        return Err(UndumpError::LuaNumberSizeMismatch);
    }
    if reader.read_lua_integer()? != LUAC_INT {
        return Err(UndumpError::EndiannessMismatch);
    }
    if reader.read_lua_number()? != LUAC_NUM {
        return Err(UndumpError::FloatFormatMismatch);
    }
    Ok(())
}

fn read_proto(
    reader: &mut Reader,
    strings: &mut StringInterner,
    parent_source: Option<StringId>,
) -> Result<Proto, UndumpError> {
    let mut proto = Proto::new();

    proto.source = reader.read_string(strings)?.or(parent_source);
    let source = proto.source;

    proto.line_defined = reader.read_u32()?;
    proto.last_line_defined = reader.read_u32()?;

    proto.num_params = reader.read_byte()?;
    proto.is_vararg = reader.read_byte()? != 0;
    proto.max_stack_size = reader.read_byte()?;

    // Code
    let code_size = reader.read_u32()? as usize;
    proto.code = Vec::with_capacity(code_size);
    for _ in 0..code_size {
        proto.code.push(Instruction(reader.read_u32()?));
    }

    // Constants
    let const_size = reader.read_u32()? as usize;
    proto.constants = Vec::with_capacity(const_size);
    for _ in 0..const_size {
        let tag = reader.read_byte()?;
        let k = match tag {
            TAG_NIL => Constant::Nil,
            TAG_BOOLEAN => Constant::Boolean(reader.read_byte()? != 0),
            TAG_INTEGER => Constant::Integer(reader.read_lua_integer()?),
            TAG_NUMBER => Constant::Float(reader.read_lua_number()?),
            TAG_SHORT_STR | TAG_LONG_STR => {
                let sid = reader
                    .read_string(strings)?
                    .ok_or(UndumpError::Corrupted)?;
                Constant::String(sid)
            }
            _ => return Err(UndumpError::Corrupted),
        };
        proto.constants.push(k);
    }

    // Upvalues
    let upval_size = reader.read_u32()? as usize;
    proto.upvalues = Vec::with_capacity(upval_size);
    for _ in 0..upval_size {
        let in_stack = reader.read_byte()? != 0;
        let index = reader.read_byte()?;
        proto.upvalues.push(UpvalDesc {
            name: None, // filled from the debug section below
            in_stack,
            index,
        });
    }

    // Child prototypes
    let proto_size = reader.read_u32()? as usize;
    proto.protos = Vec::with_capacity(proto_size);
    for _ in 0..proto_size {
        proto.protos.push(read_proto(reader, strings, source)?);
    }

    // Debug info: line numbers
    let line_size = reader.read_u32()? as usize;
    proto.line_info = Vec::with_capacity(line_size);
    for _ in 0..line_size {
        proto.line_info.push(reader.read_u32()?);
    }
    if !proto.line_info.is_empty() && proto.line_info.len() != proto.code.len() {
        return Err(UndumpError::Corrupted);
    }

    // Debug info: local variables
    let local_size = reader.read_u32()? as usize;
    proto.local_vars = Vec::with_capacity(local_size);
    for _ in 0..local_size {
        let name = reader
            .read_string(strings)?
            .unwrap_or_else(|| strings.intern(b""));
        let start_pc = reader.read_u32()?;
        let end_pc = reader.read_u32()?;
        proto.local_vars.push(LocalVar {
            name,
            start_pc,
            end_pc,
        });
    }

    // Debug info: upvalue names
    let upval_name_size = reader.read_u32()? as usize;
    for i in 0..upval_name_size {
        let name = reader.read_string(strings)?;
        if i < proto.upvalues.len() {
            proto.upvalues[i].name = name;
        }
    }

    Ok(proto)
}

// ─── Dumper ─────────────────────────────────────────────────────────────

/// Serialize a prototype tree into Lua 5.3 binary format.
///
/// With `strip` set, debug info (line numbers, local and upvalue names,
/// source) is omitted, as `luac -s` would.
pub fn dump(proto: &Proto, strings: &StringInterner, strip: bool) -> Vec<u8> {
    let mut out = Vec::new();
    write_header(&mut out);
    out.push(proto.upvalues.len() as u8);
    write_proto(&mut out, proto, strings, strip, None);
    out
}

fn write_header(out: &mut Vec<u8>) {
    out.extend_from_slice(LUA_SIGNATURE);
    out.push(LUAC_VERSION);
    out.push(LUAC_FORMAT);
    out.extend_from_slice(LUAC_DATA);
    out.push(CINT_SIZE);
    out.push(CSIZET_SIZE);
    out.push(INSTRUCTION_SIZE);
    out.push(LUA_INTEGER_SIZE);
    out.push(LUA_NUMBER_SIZE);
    out.extend_from_slice(&LUAC_INT.to_le_bytes());
    out.extend_from_slice(&LUAC_NUM.to_le_bytes());
}

fn write_u32(out: &mut Vec<u8>, n: u32) {
    out.extend_from_slice(&n.to_le_bytes());
}

fn write_string(out: &mut Vec<u8>, s: Option<&[u8]>) {
    match s {
        None => out.push(0),
        Some(bytes) => {
            // The stored size includes the trailing NUL of the C layout.
            let size = bytes.len() as u64 + 1;
            if size < 0xFF {
                out.push(size as u8);
            } else {
                out.push(0xFF);
                out.extend_from_slice(&size.to_le_bytes());
            }
            out.extend_from_slice(bytes);
        }
    }
}

fn write_proto(
    out: &mut Vec<u8>,
    proto: &Proto,
    strings: &StringInterner,
    strip: bool,
    parent_source: Option<StringId>,
) {
    if strip || proto.source == parent_source {
        // Children with the parent's source store an absent string.
        write_string(out, None);
    } else {
        write_string(out, proto.source.map(|sid| strings.get_bytes(sid)));
    }

    write_u32(out, proto.line_defined);
    write_u32(out, proto.last_line_defined);

    out.push(proto.num_params);
    out.push(proto.is_vararg as u8);
    out.push(proto.max_stack_size);

    write_u32(out, proto.code.len() as u32);
    for inst in &proto.code {
        write_u32(out, inst.0);
    }

    write_u32(out, proto.constants.len() as u32);
    for k in &proto.constants {
        match k {
            Constant::Nil => out.push(TAG_NIL),
            Constant::Boolean(b) => {
                out.push(TAG_BOOLEAN);
                out.push(*b as u8);
            }
            Constant::Integer(i) => {
                out.push(TAG_INTEGER);
                out.extend_from_slice(&i.to_le_bytes());
            }
            Constant::Float(f) => {
                out.push(TAG_NUMBER);
                out.extend_from_slice(&f.to_bits().to_le_bytes());
            }
            Constant::String(sid) => {
                let bytes = strings.get_bytes(*sid);
                if bytes.len() <= SHORT_STR_MAX {
                    out.push(TAG_SHORT_STR);
                } else {
                    out.push(TAG_LONG_STR);
                }
                write_string(out, Some(bytes));
            }
        }
    }

    write_u32(out, proto.upvalues.len() as u32);
    for uv in &proto.upvalues {
        out.push(uv.in_stack as u8);
        out.push(uv.index);
    }

    write_u32(out, proto.protos.len() as u32);
    for child in &proto.protos {
        write_proto(out, child, strings, strip, proto.source);
    }

    if strip {
        write_u32(out, 0); // line info
        write_u32(out, 0); // local vars
        write_u32(out, 0); // upvalue names
    } else {
        write_u32(out, proto.line_info.len() as u32);
        for &line in &proto.line_info {
            write_u32(out, line);
        }

        write_u32(out, proto.local_vars.len() as u32);
        for lv in &proto.local_vars {
            write_string(out, Some(strings.get_bytes(lv.name)));
            write_u32(out, lv.start_pc);
            write_u32(out, lv.end_pc);
        }

        write_u32(out, proto.upvalues.len() as u32);
        for uv in &proto.upvalues {
            write_string(out, uv.name.map(|sid| strings.get_bytes(sid)));
        }
    }
}
