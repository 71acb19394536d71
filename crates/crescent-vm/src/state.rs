//! The Lua state: the API surface the dispatcher (and any embedder)
//! drives.
//!
//! Indices follow the C API convention: 1-based absolute, or negative
//! from the top (`-1` is the top); 0 is never valid. ISA register numbers
//! are 0-based, so opcode handlers add 1 when they cross into this API.

use crate::arith::{self, ArithOp};
use crate::coerce;
use crate::compare::{self, CompareOp};
use crate::error::LuaError;
use crate::opcode::{is_k, rk_index, Instruction};
use crate::proto::{Constant, Proto};
use crate::stack::ValueStack;
use crescent_core::heap::Heap;
use crescent_core::string::{StringId, StringInterner};
use crescent_core::value::{LuaType, Value};

/// Spare slots beyond the register file for operand shuffling.
const EXTRA_STACK: usize = 8;

pub struct LuaState {
    stack: ValueStack,
    heap: Heap,
    strings: StringInterner,
    proto: Proto,
    /// Signed so relative jumps can move through zero.
    pc: isize,
}

impl LuaState {
    /// Build a state around a loaded prototype. The register file
    /// (`proto.max_stack_size` slots) starts live and nil-filled.
    pub fn new(stack_size: usize, proto: Proto, strings: StringInterner) -> Self {
        let registers = proto.max_stack_size as usize;
        LuaState {
            stack: ValueStack::with_registers(stack_size.max(registers + EXTRA_STACK), registers),
            heap: Heap::new(),
            strings,
            proto,
            pc: 0,
        }
    }

    pub fn strings(&self) -> &StringInterner {
        &self.strings
    }

    pub fn proto(&self) -> &Proto {
        &self.proto
    }

    // ---- Stack shape ----

    pub fn get_top(&self) -> i32 {
        self.stack.top() as i32
    }

    pub fn abs_index(&self, idx: i32) -> i32 {
        self.stack.abs_index(idx)
    }

    pub fn check_stack(&mut self, n: usize) {
        self.stack.check(n);
    }

    pub fn pop(&mut self, n: usize) -> Result<(), LuaError> {
        for _ in 0..n {
            self.stack.pop()?;
        }
        Ok(())
    }

    /// Grow (with nils) or shrink the stack to `idx` slots.
    pub fn set_top(&mut self, idx: i32) -> Result<(), LuaError> {
        let new_top = self.stack.abs_index(idx);
        if new_top < 0 {
            return Err(LuaError::InvalidIndex(idx));
        }
        let new_top = new_top as usize;
        while self.stack.top() > new_top {
            self.stack.pop()?;
        }
        while self.stack.top() < new_top {
            self.stack.push(Value::Nil)?;
        }
        Ok(())
    }

    pub fn copy(&mut self, from: i32, to: i32) -> Result<(), LuaError> {
        let val = self.stack.get(from);
        self.stack.set(to, val)
    }

    pub fn push_value(&mut self, idx: i32) -> Result<(), LuaError> {
        let val = self.stack.get(idx);
        self.stack.push(val)
    }

    /// Pop the top and write it into `idx`.
    pub fn replace(&mut self, idx: i32) -> Result<(), LuaError> {
        let val = self.stack.pop()?;
        self.stack.set(idx, val)
    }

    /// Move the top into `idx`, shifting the slots above up.
    pub fn insert(&mut self, idx: i32) -> Result<(), LuaError> {
        self.rotate(idx, 1)
    }

    /// Remove the slot at `idx`, shifting the slots above down.
    pub fn remove(&mut self, idx: i32) -> Result<(), LuaError> {
        self.rotate(idx, -1)?;
        self.pop(1)
    }

    /// Rotate the segment `[idx, top]` by `n` (toward the top for
    /// positive `n`), as three reversals.
    pub fn rotate(&mut self, idx: i32, n: i32) -> Result<(), LuaError> {
        let t = self.stack.top() as i32;
        let p = self.stack.abs_index(idx);
        if p < 1 || p > t {
            return Err(LuaError::InvalidIndex(idx));
        }
        // Split point: the prefix [p, m] ends up on top.
        let m = if n >= 0 { t - n } else { p - n - 1 };
        if m < p - 1 || m > t {
            return Err(LuaError::InvalidIndex(idx));
        }
        self.stack.reverse(p, m);
        self.stack.reverse(m + 1, t);
        self.stack.reverse(p, t);
        Ok(())
    }

    // ---- Pushers ----

    pub fn push_nil(&mut self) -> Result<(), LuaError> {
        self.stack.push(Value::Nil)
    }

    pub fn push_boolean(&mut self, b: bool) -> Result<(), LuaError> {
        self.stack.push(Value::Boolean(b))
    }

    pub fn push_integer(&mut self, i: i64) -> Result<(), LuaError> {
        self.stack.push(Value::Integer(i))
    }

    pub fn push_number(&mut self, f: f64) -> Result<(), LuaError> {
        self.stack.push(Value::Float(f))
    }

    pub fn push_string(&mut self, s: &[u8]) -> Result<(), LuaError> {
        let sid = self.strings.intern(s);
        self.stack.push(Value::String(sid))
    }

    // ---- Readers ----

    pub fn type_of(&self, idx: i32) -> LuaType {
        if self.stack.is_valid(idx) {
            self.stack.get(idx).lua_type()
        } else {
            LuaType::None
        }
    }

    pub fn type_name(&self, idx: i32) -> &'static str {
        self.stack.get(idx).type_name()
    }

    pub fn to_boolean(&self, idx: i32) -> bool {
        self.stack.get(idx).is_truthy()
    }

    pub fn to_integerx(&self, idx: i32) -> Option<i64> {
        coerce::to_integer(self.stack.get(idx), &self.strings)
    }

    pub fn to_integer(&self, idx: i32) -> i64 {
        self.to_integerx(idx).unwrap_or(0)
    }

    pub fn to_numberx(&self, idx: i32) -> Option<f64> {
        coerce::to_float(self.stack.get(idx), &self.strings)
    }

    pub fn to_number(&self, idx: i32) -> f64 {
        self.to_numberx(idx).unwrap_or(0.0)
    }

    /// Convert the slot to a string. Numbers render in their default
    /// decimal form and the slot is updated in place, as in the C API.
    pub fn to_stringx(&mut self, idx: i32) -> Option<StringId> {
        match self.stack.get(idx) {
            Value::String(sid) => Some(sid),
            v @ (Value::Integer(_) | Value::Float(_)) => {
                let bytes = coerce::to_display_bytes(v, &self.strings)?;
                let sid = self.strings.intern(&bytes);
                // The slot was just read, so the write cannot fail.
                self.stack.set(idx, Value::String(sid)).ok()?;
                Some(sid)
            }
            _ => None,
        }
    }

    /// The string bytes of a slot, as a lossy UTF-8 `String`.
    pub fn to_rust_string(&mut self, idx: i32) -> Option<String> {
        let sid = self.to_stringx(idx)?;
        Some(String::from_utf8_lossy(self.strings.get_bytes(sid)).into_owned())
    }

    // ---- Operations ----

    /// Pop the operands (one for unary minus and bitwise-not, two
    /// otherwise), apply the operator, push the result.
    pub fn arith(&mut self, op: ArithOp) -> Result<(), LuaError> {
        let b = self.stack.pop()?;
        let a = if op.is_unary() { b } else { self.stack.pop()? };
        let result = arith::arith_op(op, a, b, &self.strings)?;
        self.stack.push(result)
    }

    /// Compare two slots without touching the stack.
    pub fn compare(&self, idx1: i32, idx2: i32, op: CompareOp) -> bool {
        let a = self.stack.get(idx1);
        let b = self.stack.get(idx2);
        match op {
            CompareOp::Eq => compare::lua_eq(a, b),
            CompareOp::Lt => compare::lua_lt(a, b, &self.strings),
            CompareOp::Le => compare::lua_le(a, b, &self.strings),
        }
    }

    /// Push the length of the slot: byte length for strings, border for
    /// tables.
    pub fn len(&mut self, idx: i32) -> Result<(), LuaError> {
        let len = match self.stack.get(idx) {
            Value::String(sid) => self.strings.get_bytes(sid).len() as i64,
            Value::Table(tid) => self.heap.get_table(tid).len(),
            _ => return Err(LuaError::LengthError),
        };
        self.push_integer(len)
    }

    /// Concatenate the top `n` slots into one string. Numbers coerce to
    /// their decimal form; anything else is an error.
    pub fn concat(&mut self, n: usize) -> Result<(), LuaError> {
        if n == 0 {
            return self.push_string(b"");
        }
        for _ in 1..n {
            let b = self.stack.pop()?;
            let a = self.stack.pop()?;
            let mut bytes =
                coerce::to_display_bytes(a, &self.strings).ok_or(LuaError::ArithmeticError)?;
            let tail =
                coerce::to_display_bytes(b, &self.strings).ok_or(LuaError::ArithmeticError)?;
            bytes.extend_from_slice(&tail);
            let sid = self.strings.intern(&bytes);
            self.stack.push(Value::String(sid))?;
        }
        Ok(())
    }

    // ---- Tables ----

    /// Push a fresh table with the given capacity hints.
    pub fn create_table(&mut self, array_hint: usize, hash_hint: usize) -> Result<(), LuaError> {
        if self.heap.len() >= u32::MAX as usize {
            return Err(LuaError::OutOfMemory);
        }
        let id = self.heap.alloc_table(array_hint, hash_hint);
        self.stack.push(Value::Table(id))
    }

    pub fn new_table(&mut self) -> Result<(), LuaError> {
        self.create_table(0, 0)
    }

    /// Pop a key and push `t[key]`, where `t` is the table at `idx`.
    pub fn get_table(&mut self, idx: i32) -> Result<(), LuaError> {
        let t = self.stack.get(idx);
        let key = self.stack.pop()?;
        let tid = t.as_table_id().ok_or(LuaError::NotATable)?;
        let val = self.heap.get_table(tid).get(key);
        self.stack.push(val)
    }

    pub fn get_field(&mut self, idx: i32, key: &[u8]) -> Result<(), LuaError> {
        let sid = self.strings.intern(key);
        let tid = self.stack.get(idx).as_table_id().ok_or(LuaError::NotATable)?;
        let val = self.heap.get_table(tid).get(Value::String(sid));
        self.stack.push(val)
    }

    pub fn get_i(&mut self, idx: i32, i: i64) -> Result<(), LuaError> {
        let tid = self.stack.get(idx).as_table_id().ok_or(LuaError::NotATable)?;
        let val = self.heap.get_table(tid).get(Value::Integer(i));
        self.stack.push(val)
    }

    /// Pop a value then a key and store `t[key] = value`.
    pub fn set_table(&mut self, idx: i32) -> Result<(), LuaError> {
        let t = self.stack.get(idx);
        let val = self.stack.pop()?;
        let key = self.stack.pop()?;
        let tid = t.as_table_id().ok_or(LuaError::NotATable)?;
        self.heap.get_table_mut(tid).put(key, val)?;
        Ok(())
    }

    pub fn set_field(&mut self, idx: i32, key: &[u8]) -> Result<(), LuaError> {
        let sid = self.strings.intern(key);
        let t = self.stack.get(idx);
        let val = self.stack.pop()?;
        let tid = t.as_table_id().ok_or(LuaError::NotATable)?;
        self.heap.get_table_mut(tid).put(Value::String(sid), val)?;
        Ok(())
    }

    pub fn set_i(&mut self, idx: i32, i: i64) -> Result<(), LuaError> {
        let t = self.stack.get(idx);
        let val = self.stack.pop()?;
        let tid = t.as_table_id().ok_or(LuaError::NotATable)?;
        self.heap.get_table_mut(tid).put(Value::Integer(i), val)?;
        Ok(())
    }

    // ---- Execution support ----

    /// The next instruction, advancing the PC. `None` once the PC runs
    /// off the end of the code.
    pub fn fetch(&mut self) -> Option<Instruction> {
        if self.pc < 0 || self.pc as usize >= self.proto.code.len() {
            return None;
        }
        let inst = self.proto.code[self.pc as usize];
        self.pc += 1;
        Some(inst)
    }

    /// Push constant `i` from the pool.
    pub fn get_const(&mut self, i: usize) -> Result<(), LuaError> {
        let k = self
            .proto
            .constants
            .get(i)
            .ok_or(LuaError::InvalidIndex(i as i32))?;
        let val = constant_value(k);
        self.stack.push(val)
    }

    /// Push an RK operand: a constant when the RK bit is set, otherwise
    /// the register (translated to its 1-based stack slot).
    pub fn get_rk(&mut self, rk: u32) -> Result<(), LuaError> {
        if is_k(rk) {
            self.get_const(rk_index(rk) as usize)
        } else {
            self.push_value(rk as i32 + 1)
        }
    }

    pub fn add_pc(&mut self, delta: i32) {
        self.pc += delta as isize;
    }

    pub fn pc(&self) -> isize {
        self.pc
    }
}

fn constant_value(k: &Constant) -> Value {
    match k {
        Constant::Nil => Value::Nil,
        Constant::Boolean(b) => Value::Boolean(*b),
        Constant::Integer(i) => Value::Integer(*i),
        Constant::Float(f) => Value::Float(*f),
        Constant::String(sid) => Value::String(*sid),
    }
}
