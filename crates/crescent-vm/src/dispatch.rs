//! The fetch/decode/execute loop.
//!
//! Register numbers in opcode semantics are 0-based; the Lua state API is
//! 1-based, so every register use below adds 1 at the boundary. Opcodes
//! that need upvalues, calls, closures, varargs or the generic for are
//! outside this VM's subset and report `UnknownInstruction`.

use crate::arith::ArithOp;
use crate::compare::CompareOp;
use crate::error::LuaError;
use crate::opcode::{fb2int, Instruction, OpCode, LFIELDS_PER_FLUSH};
use crate::state::LuaState;
use tracing::trace;

/// Outcome of executing one instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// RETURN was executed (or the PC ran off the end of the code).
    Return,
}

/// Run the loaded prototype to completion.
pub fn execute(state: &mut LuaState) -> Result<(), LuaError> {
    while step(state)? == Step::Continue {}
    Ok(())
}

/// Fetch and execute a single instruction.
pub fn step(state: &mut LuaState) -> Result<Step, LuaError> {
    let Some(inst) = state.fetch() else {
        return Ok(Step::Return);
    };
    let Some(op) = inst.opcode() else {
        return Err(LuaError::UnknownInstruction("(bad opcode)"));
    };
    trace!(pc = state.pc() - 1, %inst, "execute");

    match op {
        OpCode::Move => {
            let (a, b, _) = abc(inst);
            state.copy(b + 1, a + 1)?;
        }

        OpCode::LoadK => {
            let a = inst.a() as i32;
            state.get_const(inst.bx() as usize)?;
            state.replace(a + 1)?;
        }

        OpCode::LoadKX => {
            let a = inst.a() as i32;
            let ax = fetch_extra_arg(state)?;
            state.get_const(ax as usize)?;
            state.replace(a + 1)?;
        }

        OpCode::LoadBool => {
            let (a, b, c) = abc(inst);
            state.push_boolean(b != 0)?;
            state.replace(a + 1)?;
            if c != 0 {
                state.add_pc(1);
            }
        }

        OpCode::LoadNil => {
            let (a, b, _) = abc(inst);
            state.push_nil()?;
            for i in a..=a + b {
                state.copy(-1, i + 1)?;
            }
            state.pop(1)?;
        }

        OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Mod | OpCode::Pow | OpCode::Div
        | OpCode::IDiv | OpCode::BAnd | OpCode::BOr | OpCode::BXor | OpCode::Shl
        | OpCode::Shr => {
            let (a, b, c) = abc(inst);
            state.get_rk(b as u32)?;
            state.get_rk(c as u32)?;
            state.arith(binary_op(op))?;
            state.replace(a + 1)?;
        }

        OpCode::Unm | OpCode::BNot => {
            let (a, b, _) = abc(inst);
            state.push_value(b + 1)?;
            state.arith(if op == OpCode::Unm {
                ArithOp::Unm
            } else {
                ArithOp::BNot
            })?;
            state.replace(a + 1)?;
        }

        OpCode::Not => {
            let (a, b, _) = abc(inst);
            let v = state.to_boolean(b + 1);
            state.push_boolean(!v)?;
            state.replace(a + 1)?;
        }

        OpCode::Len => {
            let (a, b, _) = abc(inst);
            state.len(b + 1)?;
            state.replace(a + 1)?;
        }

        OpCode::Concat => {
            let (a, b, c) = abc(inst);
            let n = if c >= b { (c - b + 1) as usize } else { 0 };
            state.check_stack(n);
            for i in b..=c {
                state.push_value(i + 1)?;
            }
            state.concat(n)?;
            state.replace(a + 1)?;
        }

        OpCode::Jmp => {
            let a = inst.a();
            if a != 0 {
                return Err(LuaError::UnsupportedJmpClose);
            }
            state.add_pc(inst.sbx());
        }

        OpCode::Eq | OpCode::Lt | OpCode::Le => {
            let (a, b, c) = abc(inst);
            state.get_rk(b as u32)?;
            state.get_rk(c as u32)?;
            let cmp = match op {
                OpCode::Eq => CompareOp::Eq,
                OpCode::Lt => CompareOp::Lt,
                _ => CompareOp::Le,
            };
            if state.compare(-2, -1, cmp) != (a != 0) {
                state.add_pc(1);
            }
            state.pop(2)?;
        }

        OpCode::Test => {
            let (a, _, c) = abc(inst);
            if state.to_boolean(a + 1) != (c != 0) {
                state.add_pc(1);
            }
        }

        OpCode::TestSet => {
            let (a, b, c) = abc(inst);
            if state.to_boolean(b + 1) == (c != 0) {
                state.copy(b + 1, a + 1)?;
            } else {
                state.add_pc(1);
            }
        }

        OpCode::ForPrep => {
            let a = inst.a() as i32;
            // R(A) -= R(A+2), then jump to the FORLOOP.
            state.push_value(a + 1)?;
            state.push_value(a + 3)?;
            state.arith(ArithOp::Sub)?;
            state.replace(a + 1)?;
            state.add_pc(inst.sbx());
        }

        OpCode::ForLoop => {
            let a = inst.a() as i32;
            // R(A) += R(A+2).
            state.push_value(a + 3)?;
            state.push_value(a + 1)?;
            state.arith(ArithOp::Add)?;
            state.replace(a + 1)?;
            // Continue while the counter has not passed the limit in the
            // step's direction.
            let positive_step = state.to_number(a + 3) >= 0.0;
            let continues = if positive_step {
                state.compare(a + 1, a + 2, CompareOp::Le)
            } else {
                state.compare(a + 2, a + 1, CompareOp::Le)
            };
            if continues {
                state.add_pc(inst.sbx());
                state.copy(a + 1, a + 4)?;
            }
        }

        OpCode::NewTable => {
            let (a, b, c) = abc(inst);
            state.create_table(fb2int(b as u32), fb2int(c as u32))?;
            state.replace(a + 1)?;
        }

        OpCode::GetTable => {
            let (a, b, c) = abc(inst);
            state.get_rk(c as u32)?;
            state.get_table(b + 1)?;
            state.replace(a + 1)?;
        }

        OpCode::SetTable => {
            let (a, b, c) = abc(inst);
            state.get_rk(b as u32)?;
            state.get_rk(c as u32)?;
            state.set_table(a + 1)?;
        }

        OpCode::SetList => {
            let (a, b, c) = abc(inst);
            // C = 0 means the real C is in a trailing EXTRAARG.
            let c = if c > 0 {
                c as i64
            } else {
                fetch_extra_arg(state)? as i64
            };
            let mut idx = (c - 1) * LFIELDS_PER_FLUSH;
            for j in 1..=b {
                idx += 1;
                state.push_value(a + j + 1)?;
                state.set_i(a + 1, idx)?;
            }
        }

        OpCode::Return => return Ok(Step::Return),

        OpCode::GetUpval | OpCode::GetTabUp | OpCode::SetTabUp | OpCode::SetUpval
        | OpCode::Self_ | OpCode::Call | OpCode::TailCall | OpCode::TForCall
        | OpCode::TForLoop | OpCode::Closure | OpCode::VarArg | OpCode::ExtraArg => {
            return Err(LuaError::UnknownInstruction(op.name()));
        }
    }
    Ok(Step::Continue)
}

#[inline]
fn abc(inst: Instruction) -> (i32, i32, i32) {
    let (a, b, c) = inst.abc_fields();
    (a as i32, b as i32, c as i32)
}

fn binary_op(op: OpCode) -> ArithOp {
    match op {
        OpCode::Add => ArithOp::Add,
        OpCode::Sub => ArithOp::Sub,
        OpCode::Mul => ArithOp::Mul,
        OpCode::Mod => ArithOp::Mod,
        OpCode::Pow => ArithOp::Pow,
        OpCode::Div => ArithOp::Div,
        OpCode::IDiv => ArithOp::IDiv,
        OpCode::BAnd => ArithOp::BAnd,
        OpCode::BOr => ArithOp::BOr,
        OpCode::BXor => ArithOp::BXor,
        OpCode::Shl => ArithOp::Shl,
        _ => ArithOp::Shr,
    }
}

/// The Ax payload of a trailing EXTRAARG instruction.
fn fetch_extra_arg(state: &mut LuaState) -> Result<u32, LuaError> {
    match state.fetch() {
        Some(extra) if extra.opcode() == Some(OpCode::ExtraArg) => Ok(extra.ax_field()),
        _ => Err(LuaError::UnknownInstruction("EXTRAARG")),
    }
}
