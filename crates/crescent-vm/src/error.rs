//! Error taxonomies for the chunk loader and the VM.

use crescent_core::table::TableError;
use thiserror::Error;

/// Failures while decoding a precompiled chunk.
///
/// Any of these aborts the load; no partial prototype is returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum UndumpError {
    #[error("not a precompiled chunk")]
    NotAPrecompiledChunk,
    #[error("version mismatch")]
    VersionMismatch,
    #[error("format mismatch")]
    FormatMismatch,
    #[error("corrupted chunk")]
    Corrupted,
    #[error("int size mismatch")]
    IntSizeMismatch,
    #[error("size_t size mismatch")]
    SizetSizeMismatch,
    #[error("instruction size mismatch")]
    InstructionSizeMismatch,
    #[error("lua_Integer size mismatch")]
    LuaIntegerSizeMismatch,
    #[error("lua_Number size mismatch")]
    LuaNumberSizeMismatch,
    #[error("endianness mismatch")]
    EndiannessMismatch,
    #[error("float format mismatch")]
    FloatFormatMismatch,
    #[error("truncated chunk")]
    Truncated,
}

/// Runtime failures in the stack, the value model, or the dispatcher.
///
/// A VM error aborts the current step; the stack is left as-is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum LuaError {
    #[error("stack overflow")]
    StackOverflow,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("invalid stack index {0}")]
    InvalidIndex(i32),
    #[error("attempt to perform arithmetic on incompatible operands")]
    ArithmeticError,
    #[error("attempt to get length of a non-string, non-table value")]
    LengthError,
    #[error("attempt to index a non-table value")]
    NotATable,
    #[error("table index is nil")]
    TableIndexIsNil,
    #[error("table index is NaN")]
    TableIndexIsNan,
    #[error("unknown or unimplemented instruction: {0}")]
    UnknownInstruction(&'static str),
    #[error("JMP cannot close upvalues here")]
    UnsupportedJmpClose,
    #[error("out of memory")]
    OutOfMemory,
}

impl From<TableError> for LuaError {
    fn from(e: TableError) -> Self {
        match e {
            TableError::IndexIsNil => LuaError::TableIndexIsNil,
            TableError::IndexIsNan => LuaError::TableIndexIsNan,
        }
    }
}
