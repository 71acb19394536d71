//! Arithmetic and bitwise operations with Lua 5.3 semantics.
//!
//! Integer arithmetic wraps; floor division and modulo round toward
//! negative infinity; shifts are logical and degrade into the opposite
//! direction for negative counts.

use crate::coerce;
use crate::error::LuaError;
use crescent_core::string::StringInterner;
use crescent_core::value::Value;

/// An arithmetic operator. `Unm` and `BNot` are unary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Mod,
    Pow,
    Div,
    IDiv,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
    Unm,
    BNot,
}

impl ArithOp {
    pub fn is_unary(self) -> bool {
        matches!(self, ArithOp::Unm | ArithOp::BNot)
    }

    fn is_bitwise(self) -> bool {
        matches!(
            self,
            ArithOp::BAnd | ArithOp::BOr | ArithOp::BXor | ArithOp::Shl | ArithOp::Shr | ArithOp::BNot
        )
    }
}

/// Apply a binary operator to two values (pass the operand twice for a
/// unary operator).
///
/// Bitwise operators are integer-only, pow and true division float-only.
/// The remaining operators take the integer path when both operands are
/// integers and the float path (with string coercion) otherwise.
pub fn arith_op(
    op: ArithOp,
    a: Value,
    b: Value,
    strings: &StringInterner,
) -> Result<Value, LuaError> {
    if op.is_bitwise() {
        let x = coerce::to_integer(a, strings).ok_or(LuaError::ArithmeticError)?;
        let y = coerce::to_integer(b, strings).ok_or(LuaError::ArithmeticError)?;
        return int_arith(op, x, y);
    }

    match op {
        ArithOp::Unm => {
            return match a {
                Value::Integer(i) => Ok(Value::Integer(i.wrapping_neg())),
                _ => {
                    let f = coerce::to_float(a, strings).ok_or(LuaError::ArithmeticError)?;
                    Ok(Value::Float(-f))
                }
            };
        }
        ArithOp::Div | ArithOp::Pow => {
            let x = coerce::to_float(a, strings).ok_or(LuaError::ArithmeticError)?;
            let y = coerce::to_float(b, strings).ok_or(LuaError::ArithmeticError)?;
            return Ok(Value::Float(float_arith(op, x, y)));
        }
        _ => {}
    }

    // add/sub/mul/mod/idiv: integers stay integers, everything else
    // (including numeric strings) goes through floats.
    if let (Value::Integer(x), Value::Integer(y)) = (a, b) {
        return int_arith(op, x, y);
    }
    let x = coerce::to_float(a, strings).ok_or(LuaError::ArithmeticError)?;
    let y = coerce::to_float(b, strings).ok_or(LuaError::ArithmeticError)?;
    Ok(Value::Float(float_arith(op, x, y)))
}

fn int_arith(op: ArithOp, a: i64, b: i64) -> Result<Value, LuaError> {
    let result = match op {
        ArithOp::Add => a.wrapping_add(b),
        ArithOp::Sub => a.wrapping_sub(b),
        ArithOp::Mul => a.wrapping_mul(b),
        ArithOp::IDiv => {
            if b == 0 {
                return Err(LuaError::ArithmeticError);
            }
            lua_idiv(a, b)
        }
        ArithOp::Mod => {
            if b == 0 {
                return Err(LuaError::ArithmeticError);
            }
            lua_imod(a, b)
        }
        ArithOp::BAnd => a & b,
        ArithOp::BOr => a | b,
        ArithOp::BXor => a ^ b,
        ArithOp::Shl => lua_shl(a, b),
        ArithOp::Shr => lua_shr(a, b),
        ArithOp::BNot => !a,
        ArithOp::Unm | ArithOp::Div | ArithOp::Pow => unreachable!("handled by the caller"),
    };
    Ok(Value::Integer(result))
}

fn float_arith(op: ArithOp, a: f64, b: f64) -> f64 {
    match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
        ArithOp::Pow => a.powf(b),
        // Division by zero on the float path follows IEEE 754.
        ArithOp::IDiv => (a / b).floor(),
        ArithOp::Mod => lua_fmod(a, b),
        _ => unreachable!("integer-only operator on the float path"),
    }
}

/// Integer floor division: rounds toward negative infinity.
pub fn lua_idiv(a: i64, b: i64) -> i64 {
    // wrapping_div so i64::MIN / -1 wraps instead of trapping.
    let d = a.wrapping_div(b);
    let r = a.wrapping_rem(b);
    if r != 0 && (r ^ b) < 0 {
        d - 1
    } else {
        d
    }
}

/// Integer modulo: `a - floor(a/b)*b`; the result has the divisor's sign.
pub fn lua_imod(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && (r ^ b) < 0 {
        r.wrapping_add(b)
    } else {
        r
    }
}

/// Float modulo with the same sign convention as the integer one.
pub fn lua_fmod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r > 0.0) != (b > 0.0) {
        r + b
    } else {
        r
    }
}

/// Left shift; negative counts shift right instead.
pub fn lua_shl(a: i64, b: i64) -> i64 {
    if b <= -64 || b >= 64 {
        0
    } else if b < 0 {
        lua_shr(a, -b)
    } else {
        ((a as u64) << b as u32) as i64
    }
}

/// Logical (zero-filling) right shift; negative counts shift left instead.
pub fn lua_shr(a: i64, b: i64) -> i64 {
    if b <= -64 || b >= 64 {
        0
    } else if b < 0 {
        lua_shl(a, -b)
    } else {
        ((a as u64) >> b as u32) as i64
    }
}
