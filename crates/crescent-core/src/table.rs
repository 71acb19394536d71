//! Hybrid array+hash table for Lua.
//!
//! Integer keys in `[1, #arr]` live in the dense array part; everything
//! else lives in the hash part. Appending to key `#arr + 1` migrates any
//! contiguous successors out of the hash part so that `len()` stays the
//! border of the sequence under sequential insertion.

use crate::heap::TableId;
use crate::string::StringId;
use crate::value::{float_to_integer, Value};
use indexmap::IndexMap;
use thiserror::Error;

/// Keys that cannot index a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("table index is nil")]
    IndexIsNil,
    #[error("table index is NaN")]
    IndexIsNan,
}

/// A normalized key in the hash part.
///
/// Floats that represent an exact integer are normalized to `Integer`
/// before lookup, so `t[1.0]` and `t[1]` address the same slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum TableKey {
    Integer(i64),
    /// Non-integral float, stored as raw bits for hashing.
    Float(u64),
    Boolean(bool),
    String(StringId),
    Table(TableId),
}

/// A Lua table: hybrid array + hash map.
#[derive(Debug, Default)]
pub struct Table {
    /// Array part (externally 1-indexed: `arr[0]` is key 1).
    arr: Vec<Value>,
    /// Hash part for everything else (insertion-order preserving).
    map: IndexMap<TableKey, Value>,
}

impl Table {
    /// Create an empty table; the hints are capacity reservations only.
    pub fn new(array_hint: usize, hash_hint: usize) -> Self {
        Table {
            arr: Vec::with_capacity(array_hint),
            map: IndexMap::with_capacity(hash_hint),
        }
    }

    /// Get `t[key]`. Missing keys (and un-normalizable ones) yield nil.
    pub fn get(&self, key: Value) -> Value {
        let key = normalize_key(key);
        if let Value::Integer(i) = key {
            if i >= 1 && (i as usize) <= self.arr.len() {
                return self.arr[(i - 1) as usize];
            }
        }
        match to_table_key(key) {
            Some(tk) => self.map.get(&tk).copied().unwrap_or(Value::Nil),
            None => Value::Nil,
        }
    }

    /// Set `t[key] = val`. Nil and NaN keys are rejected.
    pub fn put(&mut self, key: Value, val: Value) -> Result<(), TableError> {
        if key.is_nil() {
            return Err(TableError::IndexIsNil);
        }
        if matches!(key, Value::Float(f) if f.is_nan()) {
            return Err(TableError::IndexIsNan);
        }
        let key = normalize_key(key);

        if let Value::Integer(i) = key {
            if i >= 1 {
                let arr_len = self.arr.len() as i64;
                if i <= arr_len {
                    self.arr[(i - 1) as usize] = val;
                    // A nil written to the last slot shrinks past any
                    // trailing nils; interior nils stay as holes.
                    if i == arr_len && val.is_nil() {
                        self.shrink_array();
                    }
                    return Ok(());
                }
                if i == arr_len + 1 {
                    self.map.shift_remove(&TableKey::Integer(i));
                    if !val.is_nil() {
                        self.arr.push(val);
                        self.expand_array();
                    }
                    return Ok(());
                }
            }
        }

        let tk = to_table_key(key).expect("normalized key is hashable");
        if val.is_nil() {
            self.map.shift_remove(&tk);
        } else {
            self.map.insert(tk, val);
        }
        Ok(())
    }

    /// The border of the array part: `#t`.
    pub fn len(&self) -> i64 {
        self.arr.len() as i64
    }

    pub fn is_empty(&self) -> bool {
        self.arr.is_empty() && self.map.is_empty()
    }

    /// Drop trailing nils from the array part.
    fn shrink_array(&mut self) {
        while self.arr.last().is_some_and(|v| v.is_nil()) {
            self.arr.pop();
        }
    }

    /// Migrate contiguous successor keys from the hash part into the array.
    fn expand_array(&mut self) {
        loop {
            let next = self.arr.len() as i64 + 1;
            match self.map.shift_remove(&TableKey::Integer(next)) {
                Some(v) => self.arr.push(v),
                None => break,
            }
        }
    }
}

fn normalize_key(key: Value) -> Value {
    if let Value::Float(f) = key {
        if let Some(i) = float_to_integer(f) {
            return Value::Integer(i);
        }
    }
    key
}

fn to_table_key(key: Value) -> Option<TableKey> {
    match key {
        Value::Nil => None,
        Value::Boolean(b) => Some(TableKey::Boolean(b)),
        Value::Integer(i) => Some(TableKey::Integer(i)),
        Value::Float(f) => {
            if f.is_nan() {
                None
            } else {
                Some(TableKey::Float(f.to_bits()))
            }
        }
        Value::String(id) => Some(TableKey::String(id)),
        Value::Table(id) => Some(TableKey::Table(id)),
    }
}
