//! Crescent virtual machine: Lua 5.3 chunk loader and bytecode
//! interpreter.

pub mod arith;
pub mod binary_chunk;
pub mod coerce;
pub mod compare;
pub mod disasm;
pub mod dispatch;
pub mod error;
pub mod opcode;
pub mod proto;
pub mod stack;
pub mod state;

use crescent_core::string::StringInterner;
use error::{LuaError, UndumpError};
use proto::Proto;
use state::LuaState;

/// Decode a precompiled chunk into its main prototype and the interner
/// holding its strings.
pub fn load(data: &[u8]) -> Result<(Proto, StringInterner), UndumpError> {
    let mut strings = StringInterner::new();
    let proto = binary_chunk::undump(data, &mut strings)?;
    Ok((proto, strings))
}

/// Execute a loaded prototype to completion, returning the final state.
pub fn run(proto: Proto, strings: StringInterner) -> Result<LuaState, LuaError> {
    let stack_size = proto.max_stack_size as usize + 8;
    let mut state = LuaState::new(stack_size, proto, strings);
    dispatch::execute(&mut state)?;
    Ok(state)
}
