use super::helpers::*;
use crescent_core::string::StringInterner;
use crescent_core::value::LuaType;
use crescent_vm::dispatch::{self, Step};
use crescent_vm::error::LuaError;
use crescent_vm::opcode::{Instruction, OpCode};
use crescent_vm::proto::Constant;
use crescent_vm::state::LuaState;

const K0: u32 = 0x100;
const K1: u32 = 0x101;

fn ret() -> Instruction {
    Instruction::abc(OpCode::Return, 0, 1, 0)
}

#[test]
fn test_move_and_loadk() {
    let proto = assemble(
        2,
        vec![Constant::Integer(42)],
        vec![
            Instruction::abx(OpCode::LoadK, 0, 0),
            Instruction::abc(OpCode::Move, 1, 0, 0),
            ret(),
        ],
    );
    let state = run(proto);
    assert_reg_int(&state, 0, 42);
    assert_reg_int(&state, 1, 42);
}

#[test]
fn test_loadbool_skip() {
    // LOADBOOL with C != 0 skips the next instruction.
    let proto = assemble(
        2,
        vec![Constant::Integer(9)],
        vec![
            Instruction::abc(OpCode::LoadBool, 0, 1, 1),
            Instruction::abx(OpCode::LoadK, 0, 0), // skipped
            ret(),
        ],
    );
    let state = run(proto);
    assert_reg_bool(&state, 0, true);
    assert_eq!(state.type_of(1), LuaType::Boolean);
}

#[test]
fn test_loadnil_range() {
    let proto = assemble(
        4,
        vec![Constant::Integer(1)],
        vec![
            Instruction::abx(OpCode::LoadK, 0, 0),
            Instruction::abx(OpCode::LoadK, 1, 0),
            Instruction::abx(OpCode::LoadK, 2, 0),
            Instruction::abc(OpCode::LoadNil, 0, 2, 0), // R0..R2 = nil
            ret(),
        ],
    );
    let state = run(proto);
    for reg in 0..3 {
        assert_eq!(state.type_of(reg + 1), LuaType::Nil);
    }
}

#[test]
fn test_loadkx_reads_extra_arg() {
    let proto = assemble(
        1,
        vec![Constant::Integer(111), Constant::Integer(222)],
        vec![
            Instruction::abx(OpCode::LoadKX, 0, 0),
            Instruction::ax(OpCode::ExtraArg, 1),
            ret(),
        ],
    );
    let state = run(proto);
    assert_reg_int(&state, 0, 222);
}

#[test]
fn test_arith_rk_constants() {
    // R0 = K0 + K1; R1 = R0 * R0
    let proto = assemble(
        2,
        vec![Constant::Integer(2), Constant::Integer(3)],
        vec![
            Instruction::abc(OpCode::Add, 0, K0, K1),
            Instruction::abc(OpCode::Mul, 1, 0, 0),
            ret(),
        ],
    );
    let state = run(proto);
    assert_reg_int(&state, 0, 5);
    assert_reg_int(&state, 1, 25);
}

#[test]
fn test_floor_div_and_mod_semantics() {
    let proto = assemble(
        2,
        vec![Constant::Integer(-7), Constant::Integer(2)],
        vec![
            Instruction::abc(OpCode::IDiv, 0, K0, K1),
            Instruction::abc(OpCode::Mod, 1, K0, K1),
            ret(),
        ],
    );
    let state = run(proto);
    assert_reg_int(&state, 0, -4);
    assert_reg_int(&state, 1, 1);
}

#[test]
fn test_div_produces_float() {
    let proto = assemble(
        1,
        vec![Constant::Integer(7), Constant::Integer(2)],
        vec![Instruction::abc(OpCode::Div, 0, K0, K1), ret()],
    );
    let state = run(proto);
    assert_eq!(state.to_numberx(1), Some(3.5));
}

#[test]
fn test_shift_opcodes() {
    let proto = assemble(
        2,
        vec![Constant::Integer(-1), Constant::Integer(1)],
        vec![
            Instruction::abc(OpCode::Shr, 0, K0, K1), // logical: huge positive
            Instruction::abc(OpCode::Shl, 1, K1, K1),
            ret(),
        ],
    );
    let state = run(proto);
    assert_reg_int(&state, 0, i64::MAX);
    assert_reg_int(&state, 1, 2);
}

#[test]
fn test_unm_bnot_not() {
    let proto = assemble(
        4,
        vec![Constant::Integer(7)],
        vec![
            Instruction::abx(OpCode::LoadK, 0, 0),
            Instruction::abc(OpCode::Unm, 1, 0, 0),
            Instruction::abc(OpCode::BNot, 2, 0, 0),
            Instruction::abc(OpCode::Not, 3, 0, 0),
            ret(),
        ],
    );
    let state = run(proto);
    assert_reg_int(&state, 1, -7);
    assert_reg_int(&state, 2, -8);
    assert_reg_bool(&state, 3, false);
}

#[test]
fn test_len_of_string_register() {
    let mut strings = StringInterner::new();
    let hello = strings.intern(b"hello");
    let proto = assemble(
        2,
        vec![Constant::String(hello)],
        vec![
            Instruction::abx(OpCode::LoadK, 0, 0),
            Instruction::abc(OpCode::Len, 1, 0, 0),
            ret(),
        ],
    );
    let state = run_with(proto, strings);
    assert_reg_int(&state, 1, 5);
}

#[test]
fn test_concat_range() {
    let mut strings = StringInterner::new();
    let a = strings.intern(b"a");
    let b = strings.intern(b"b");
    let c = strings.intern(b"c");
    let proto = assemble(
        4,
        vec![
            Constant::String(a),
            Constant::String(b),
            Constant::String(c),
        ],
        vec![
            Instruction::abx(OpCode::LoadK, 1, 0),
            Instruction::abx(OpCode::LoadK, 2, 1),
            Instruction::abx(OpCode::LoadK, 3, 2),
            Instruction::abc(OpCode::Concat, 0, 1, 3),
            ret(),
        ],
    );
    let mut state = run_with(proto, strings);
    assert_eq!(state.to_rust_string(1), Some("abc".to_string()));
}

#[test]
fn test_concat_mixes_numbers() {
    let mut strings = StringInterner::new();
    let eq = strings.intern(b"x=");
    let proto = assemble(
        3,
        vec![Constant::String(eq), Constant::Integer(42)],
        vec![
            Instruction::abx(OpCode::LoadK, 1, 0),
            Instruction::abx(OpCode::LoadK, 2, 1),
            Instruction::abc(OpCode::Concat, 0, 1, 2),
            ret(),
        ],
    );
    let mut state = run_with(proto, strings);
    assert_eq!(state.to_rust_string(1), Some("x=42".to_string()));
}

#[test]
fn test_jmp_forward() {
    let proto = assemble(
        1,
        vec![Constant::Integer(1), Constant::Integer(2)],
        vec![
            Instruction::asbx(OpCode::Jmp, 0, 1),
            Instruction::abx(OpCode::LoadK, 0, 0), // jumped over
            Instruction::abx(OpCode::LoadK, 0, 1),
            ret(),
        ],
    );
    let state = run(proto);
    assert_reg_int(&state, 0, 2);
}

#[test]
fn test_jmp_close_is_unsupported() {
    let proto = assemble(1, vec![], vec![Instruction::asbx(OpCode::Jmp, 1, 0), ret()]);
    assert_eq!(run_err(proto), LuaError::UnsupportedJmpClose);
}

#[test]
fn test_eq_skips_when_outcome_differs_from_a() {
    // EQ with A=0: equal operands skip the next instruction.
    let proto = assemble(
        1,
        vec![Constant::Integer(5), Constant::Integer(1)],
        vec![
            Instruction::abc(OpCode::Eq, 0, K0, K0),
            Instruction::abx(OpCode::LoadK, 0, 1), // skipped
            ret(),
        ],
    );
    let state = run(proto);
    assert_eq!(state.type_of(1), LuaType::Nil);

    // EQ with A=1: equal operands fall through.
    let proto = assemble(
        1,
        vec![Constant::Integer(5), Constant::Integer(1)],
        vec![
            Instruction::abc(OpCode::Eq, 1, K0, K0),
            Instruction::abx(OpCode::LoadK, 0, 1), // executed
            ret(),
        ],
    );
    let state = run(proto);
    assert_reg_int(&state, 0, 1);
}

#[test]
fn test_lt_cross_type_number() {
    // 1 < 1.5 via mixed integer/float constants.
    let proto = assemble(
        1,
        vec![
            Constant::Integer(1),
            Constant::Float(1.5),
            Constant::Integer(7),
        ],
        vec![
            Instruction::abc(OpCode::Lt, 1, K0, K1),
            Instruction::abx(OpCode::LoadK, 0, 2), // executed: comparison matched A
            ret(),
        ],
    );
    let state = run(proto);
    assert_reg_int(&state, 0, 7);
}

#[test]
fn test_test_uses_c_operand() {
    // TEST with C=0: a truthy register skips the next instruction.
    let proto = assemble(
        2,
        vec![Constant::Integer(1), Constant::Integer(9)],
        vec![
            Instruction::abx(OpCode::LoadK, 0, 0),
            Instruction::abc(OpCode::Test, 0, 0, 0),
            Instruction::abx(OpCode::LoadK, 1, 1), // skipped
            ret(),
        ],
    );
    let state = run(proto);
    assert_eq!(state.type_of(2), LuaType::Nil);
}

#[test]
fn test_testset_copies_or_skips() {
    // R1 truthy, C=1: TESTSET copies R1 into R0.
    let proto = assemble(
        2,
        vec![Constant::Integer(33)],
        vec![
            Instruction::abx(OpCode::LoadK, 1, 0),
            Instruction::abc(OpCode::TestSet, 0, 1, 1),
            ret(),
        ],
    );
    let state = run(proto);
    assert_reg_int(&state, 0, 33);

    // R1 truthy, C=0: no copy, skip the next instruction.
    let proto = assemble(
        2,
        vec![Constant::Integer(33), Constant::Integer(1)],
        vec![
            Instruction::abx(OpCode::LoadK, 1, 0),
            Instruction::abc(OpCode::TestSet, 0, 1, 0),
            Instruction::abx(OpCode::LoadK, 0, 1), // skipped
            ret(),
        ],
    );
    let state = run(proto);
    assert_eq!(state.type_of(1), LuaType::Nil);
}

#[test]
fn test_numeric_for_loop() {
    // for R3 = 1, 3, 1 do R4 = R3 end
    let proto = assemble(
        5,
        vec![
            Constant::Integer(1),
            Constant::Integer(3),
            Constant::Integer(1),
        ],
        vec![
            Instruction::abx(OpCode::LoadK, 0, 0),
            Instruction::abx(OpCode::LoadK, 1, 1),
            Instruction::abx(OpCode::LoadK, 2, 2),
            Instruction::asbx(OpCode::ForPrep, 0, 1),
            Instruction::abc(OpCode::Move, 4, 3, 0), // body
            Instruction::asbx(OpCode::ForLoop, 0, -2),
            ret(),
        ],
    );
    let state = run(proto);
    // The counter passed the limit; the loop variable saw 1, 2, 3.
    assert_reg_int(&state, 0, 4);
    assert_reg_int(&state, 1, 3);
    assert_reg_int(&state, 3, 3);
    assert_reg_int(&state, 4, 3);
}

#[test]
fn test_for_loop_negative_step() {
    // for R3 = 3, 1, -1 do R4 = R3 end
    let proto = assemble(
        5,
        vec![
            Constant::Integer(3),
            Constant::Integer(1),
            Constant::Integer(-1),
        ],
        vec![
            Instruction::abx(OpCode::LoadK, 0, 0),
            Instruction::abx(OpCode::LoadK, 1, 1),
            Instruction::abx(OpCode::LoadK, 2, 2),
            Instruction::asbx(OpCode::ForPrep, 0, 1),
            Instruction::abc(OpCode::Move, 4, 3, 0),
            Instruction::asbx(OpCode::ForLoop, 0, -2),
            ret(),
        ],
    );
    let state = run(proto);
    assert_reg_int(&state, 0, 0);
    assert_reg_int(&state, 4, 1);
}

#[test]
fn test_float_for_loop() {
    // for R3 = 1.0, 2.0, 0.5 — four iterations.
    let proto = assemble(
        5,
        vec![
            Constant::Float(1.0),
            Constant::Float(2.0),
            Constant::Float(0.5),
        ],
        vec![
            Instruction::abx(OpCode::LoadK, 0, 0),
            Instruction::abx(OpCode::LoadK, 1, 1),
            Instruction::abx(OpCode::LoadK, 2, 2),
            Instruction::asbx(OpCode::ForPrep, 0, 1),
            Instruction::abc(OpCode::Move, 4, 3, 0),
            Instruction::asbx(OpCode::ForLoop, 0, -2),
            ret(),
        ],
    );
    let state = run(proto);
    assert_reg_float(&state, 0, 2.5);
    assert_reg_float(&state, 4, 2.0);
}

#[test]
fn test_newtable_settable_gettable() {
    let mut strings = StringInterner::new();
    let key = strings.intern(b"k");
    let proto = assemble(
        2,
        vec![Constant::String(key), Constant::Integer(42)],
        vec![
            Instruction::abc(OpCode::NewTable, 0, 0, 0),
            Instruction::abc(OpCode::SetTable, 0, K0, K1),
            Instruction::abc(OpCode::GetTable, 1, 0, K0),
            ret(),
        ],
    );
    let state = run_with(proto, strings);
    assert_reg_int(&state, 1, 42);
}

#[test]
fn test_setlist_and_len() {
    // t = {10, 20, 30}; R4 = #t
    let proto = assemble(
        5,
        vec![
            Constant::Integer(10),
            Constant::Integer(20),
            Constant::Integer(30),
        ],
        vec![
            Instruction::abc(OpCode::NewTable, 0, 0, 0),
            Instruction::abx(OpCode::LoadK, 1, 0),
            Instruction::abx(OpCode::LoadK, 2, 1),
            Instruction::abx(OpCode::LoadK, 3, 2),
            Instruction::abc(OpCode::SetList, 0, 3, 1),
            Instruction::abc(OpCode::Len, 4, 0, 0),
            ret(),
        ],
    );
    let mut state = run(proto);
    assert_reg_int(&state, 4, 3);
    for (i, expected) in [(1, 10), (2, 20), (3, 30)] {
        state.get_i(1, i).unwrap();
        assert_eq!(state.to_integerx(-1), Some(expected));
        state.pop(1).unwrap();
    }
}

#[test]
fn test_setlist_extra_arg_page() {
    // SETLIST with C=0 takes the real page number from EXTRAARG.
    let proto = assemble(
        2,
        vec![Constant::Integer(77)],
        vec![
            Instruction::abc(OpCode::NewTable, 0, 0, 0),
            Instruction::abx(OpCode::LoadK, 1, 0),
            Instruction::abc(OpCode::SetList, 0, 1, 0),
            Instruction::ax(OpCode::ExtraArg, 2),
            ret(),
        ],
    );
    let mut state = run(proto);
    // Page 2 starts at index (2-1)*50 + 1 = 51.
    state.get_i(1, 51).unwrap();
    assert_eq!(state.to_integerx(-1), Some(77));
    state.len(1).unwrap();
    assert_eq!(state.to_integerx(-1), Some(0));
}

#[test]
fn test_unimplemented_opcodes_error() {
    for (op, name) in [
        (OpCode::Call, "CALL"),
        (OpCode::GetTabUp, "GETTABUP"),
        (OpCode::Closure, "CLOSURE"),
        (OpCode::VarArg, "VARARG"),
        (OpCode::GetUpval, "GETUPVAL"),
    ] {
        let proto = assemble(2, vec![], vec![Instruction::abc(op, 0, 1, 1), ret()]);
        assert_eq!(run_err(proto), LuaError::UnknownInstruction(name));
    }
}

#[test]
fn test_bad_opcode_number_errors() {
    let proto = assemble(1, vec![], vec![Instruction(63), ret()]);
    assert_eq!(run_err(proto), LuaError::UnknownInstruction("(bad opcode)"));
}

#[test]
fn test_step_reports_return() {
    let proto = assemble(1, vec![Constant::Integer(1)], vec![
        Instruction::abx(OpCode::LoadK, 0, 0),
        ret(),
    ]);
    let mut state = LuaState::new(8, proto, StringInterner::new());
    assert_eq!(dispatch::step(&mut state).unwrap(), Step::Continue);
    assert_eq!(dispatch::step(&mut state).unwrap(), Step::Return);
}

#[test]
fn test_running_off_the_end_terminates() {
    let proto = assemble(1, vec![Constant::Integer(1)], vec![
        Instruction::abx(OpCode::LoadK, 0, 0),
    ]);
    let mut state = LuaState::new(8, proto, StringInterner::new());
    assert_eq!(dispatch::step(&mut state).unwrap(), Step::Continue);
    assert_eq!(dispatch::step(&mut state).unwrap(), Step::Return);
}
