//! Tagged Lua value representation.
//!
//! Lua 5.3 distinguishes integer and float numbers at runtime; both are
//! `number` at the language level and compare numerically across the two
//! tags. Strings and tables are handles into the interner / heap, which
//! keeps `Value` a small `Copy` type.

use crate::heap::TableId;
use crate::string::StringId;
use std::fmt;

/// A Lua value.
#[derive(Clone, Copy, Debug)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(StringId),
    Table(TableId),
}

/// The Lua-visible type of a value.
///
/// `None` is the pseudo-type of an out-of-range stack slot, as in the C API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LuaType {
    None,
    Nil,
    Boolean,
    Number,
    String,
    Table,
}

impl Value {
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Returns true if this value is a number (integer or float).
    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    #[inline]
    pub fn is_table(&self) -> bool {
        matches!(self, Value::Table(_))
    }

    #[inline]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[inline]
    pub fn as_string_id(&self) -> Option<StringId> {
        match self {
            Value::String(id) => Some(*id),
            _ => None,
        }
    }

    #[inline]
    pub fn as_table_id(&self) -> Option<TableId> {
        match self {
            Value::Table(id) => Some(*id),
            _ => None,
        }
    }

    /// Lua falsy: only nil and false are falsy.
    #[inline]
    pub fn is_falsy(&self) -> bool {
        matches!(self, Value::Nil | Value::Boolean(false))
    }

    /// Lua truthy: everything except nil and false.
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !self.is_falsy()
    }

    pub fn lua_type(&self) -> LuaType {
        match self {
            Value::Nil => LuaType::Nil,
            Value::Boolean(_) => LuaType::Boolean,
            Value::Integer(_) | Value::Float(_) => LuaType::Number,
            Value::String(_) => LuaType::String,
            Value::Table(_) => LuaType::Table,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.lua_type() {
            LuaType::None => "no value",
            LuaType::Nil => "nil",
            LuaType::Boolean => "boolean",
            LuaType::Number => "number",
            LuaType::String => "string",
            LuaType::Table => "table",
        }
    }
}

/// Lua equality.
///
/// Numbers compare by value across the integer/float tags; strings compare
/// by content (the interner deduplicates, so id equality is content
/// equality); tables compare by identity; NaN is not equal to itself.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(i), Value::Float(f)) | (Value::Float(f), Value::Integer(i)) => {
                // Guard the i64→f64 rounding: 2^63-1 as f64 rounds up.
                *i as f64 == *f && (*i as f64) as i64 == *i
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a == b,
            _ => false,
        }
    }
}

/// Convert a float to integer if it is integral and exactly representable.
pub fn float_to_integer(f: f64) -> Option<i64> {
    if !f.is_finite() || f.floor() != f {
        return None;
    }
    // i64::MIN (-2^63) is exact as f64; i64::MAX is not, so the usable
    // upper bound is 2^63 exclusive.
    const IMIN: f64 = i64::MIN as f64;
    const IMAX_P1: f64 = -(i64::MIN as f64);
    if !(IMIN..IMAX_P1).contains(&f) {
        return None;
    }
    Some(f as i64)
}

impl fmt::Display for LuaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LuaType::None => "no value",
            LuaType::Nil => "nil",
            LuaType::Boolean => "boolean",
            LuaType::Number => "number",
            LuaType::String => "string",
            LuaType::Table => "table",
        };
        write!(f, "{name}")
    }
}
