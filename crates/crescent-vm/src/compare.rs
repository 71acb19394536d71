//! Comparison with Lua 5.3 semantics.

use crescent_core::string::StringInterner;
use crescent_core::value::Value;

/// The three comparison operators the ISA knows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Lt,
    Le,
}

/// Lua equality: numbers by value across tags, strings by content, tables
/// by identity. `Value`'s `PartialEq` already encodes these rules.
pub fn lua_eq(a: Value, b: Value) -> bool {
    a == b
}

/// Lua less-than. Defined on number pairs and string pairs (bytewise
/// lexicographic); every other pairing is false.
pub fn lua_lt(a: Value, b: Value, strings: &StringInterner) -> bool {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x < y,
        (Value::Float(x), Value::Float(y)) => x < y,
        (Value::Integer(x), Value::Float(y)) => (x as f64) < y,
        (Value::Float(x), Value::Integer(y)) => x < y as f64,
        (Value::String(x), Value::String(y)) => strings.get_bytes(x) < strings.get_bytes(y),
        _ => false,
    }
}

/// Lua less-than-or-equal, with the same domain as [`lua_lt`].
pub fn lua_le(a: Value, b: Value, strings: &StringInterner) -> bool {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x <= y,
        (Value::Float(x), Value::Float(y)) => x <= y,
        (Value::Integer(x), Value::Float(y)) => (x as f64) <= y,
        (Value::Float(x), Value::Integer(y)) => x <= y as f64,
        (Value::String(x), Value::String(y)) => strings.get_bytes(x) <= strings.get_bytes(y),
        _ => false,
    }
}
