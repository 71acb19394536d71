use super::helpers::*;
use crescent_core::string::StringInterner;
use crescent_vm::binary_chunk;
use crescent_vm::error::UndumpError;
use crescent_vm::opcode::{Instruction, OpCode};
use crescent_vm::proto::{Constant, Proto, UpvalDesc};

const K0: u32 = 0x100;
const K1: u32 = 0x101;

/// A chunk computing R0 = (2 + 3) * 7 the long way.
fn arithmetic_chunk(strings: &mut StringInterner) -> Vec<u8> {
    let mut proto = assemble(
        2,
        vec![
            Constant::Integer(2),
            Constant::Integer(3),
            Constant::Integer(7),
        ],
        vec![
            Instruction::abc(OpCode::Add, 0, K0, K1),
            Instruction::abc(OpCode::Mul, 0, 0, 0x102),
            Instruction::abc(OpCode::Return, 0, 1, 0),
        ],
    );
    proto.source = Some(strings.intern(b"@arith.lua"));
    proto.line_info = vec![1, 1, 2];
    proto.upvalues.push(UpvalDesc {
        name: Some(strings.intern(b"_ENV")),
        in_stack: true,
        index: 0,
    });
    binary_chunk::dump(&proto, strings, false)
}

#[test]
fn test_dump_load_run_pipeline() {
    let mut strings = StringInterner::new();
    let chunk = arithmetic_chunk(&mut strings);

    let (proto, strings) = crescent_vm::load(&chunk).unwrap();
    assert_eq!(proto.code.len(), 3);
    let state = crescent_vm::run(proto, strings).unwrap();
    assert_reg_int(&state, 0, 35);
}

#[test]
fn test_undump_preserves_structure() {
    let mut strings = StringInterner::new();
    let chunk = arithmetic_chunk(&mut strings);
    let restored = binary_chunk::undump(&chunk, &mut strings).unwrap();

    assert_eq!(restored.max_stack_size, 2);
    assert_eq!(restored.constants.len(), 3);
    assert_eq!(restored.upvalues.len(), 1);
    assert_eq!(restored.line_info, vec![1, 1, 2]);
    assert_eq!(
        restored.source.map(|sid| strings.get_bytes(sid).to_vec()),
        Some(b"@arith.lua".to_vec())
    );

    // A second trip produces identical bytes.
    let again = binary_chunk::dump(&restored, &strings, false);
    assert_eq!(again, chunk);
}

#[test]
fn test_garbage_header_rejected() {
    assert_eq!(
        crescent_vm::load(b"GARBAGE.").unwrap_err(),
        UndumpError::NotAPrecompiledChunk
    );
}

#[test]
fn test_wrong_integer_sanity_is_endianness_mismatch() {
    let mut strings = StringInterner::new();
    let mut chunk = arithmetic_chunk(&mut strings);
    // LUAC_INT occupies bytes 17..25; make it 0x5679.
    chunk[17] = 0x79;
    assert_eq!(
        crescent_vm::load(&chunk).unwrap_err(),
        UndumpError::EndiannessMismatch
    );
}

#[test]
fn test_nested_protos_roundtrip_and_inherit_source() {
    let mut strings = StringInterner::new();
    let source = strings.intern(b"@outer.lua");

    let mut inner = assemble(
        2,
        vec![Constant::Float(0.5)],
        vec![Instruction::abc(OpCode::Return, 0, 1, 0)],
    );
    inner.source = Some(source);
    inner.line_defined = 3;
    inner.last_line_defined = 5;
    inner.num_params = 1;
    inner.line_info = vec![4];

    let mut outer = assemble(
        2,
        vec![Constant::Integer(1)],
        vec![Instruction::abc(OpCode::Return, 0, 1, 0)],
    );
    outer.source = Some(source);
    outer.is_vararg = true;
    outer.line_info = vec![1];
    outer.protos.push(inner);

    let chunk = binary_chunk::dump(&outer, &strings, false);
    let restored = binary_chunk::undump(&chunk, &mut strings).unwrap();

    assert_eq!(restored.protos.len(), 1);
    let child = &restored.protos[0];
    assert_eq!(child.source, Some(source));
    assert_eq!(child.line_defined, 3);
    assert_eq!(child.last_line_defined, 5);
    assert_eq!(child.num_params, 1);
    assert_eq!(child.constants, vec![Constant::Float(0.5)]);
}

#[test]
fn test_stripped_chunk_still_runs() {
    let mut strings = StringInterner::new();
    let proto = assemble(
        1,
        vec![Constant::Integer(5)],
        vec![
            Instruction::abx(OpCode::LoadK, 0, 0),
            Instruction::abc(OpCode::Return, 0, 1, 0),
        ],
    );
    let chunk = binary_chunk::dump(&proto, &strings, true);

    let (restored, strings) = crescent_vm::load(&chunk).unwrap();
    assert!(restored.line_info.is_empty());
    let state = crescent_vm::run(restored, strings).unwrap();
    assert_reg_int(&state, 0, 5);
}

#[test]
fn test_for_loop_chunk_end_to_end() {
    // The scenario from a compiled `for i = 1, 3 do last = i end`.
    let mut strings = StringInterner::new();
    let mut proto = assemble(
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
            Instruction::abc(OpCode::Move, 4, 3, 0),
            Instruction::asbx(OpCode::ForLoop, 0, -2),
            Instruction::abc(OpCode::Return, 0, 1, 0),
        ],
    );
    proto.source = Some(strings.intern(b"@loop.lua"));
    proto.line_info = vec![1, 1, 1, 1, 2, 1, 3];

    let chunk = binary_chunk::dump(&proto, &strings, false);
    let (restored, strings) = crescent_vm::load(&chunk).unwrap();
    let state = crescent_vm::run(restored, strings).unwrap();
    assert_reg_int(&state, 0, 4);
    assert_reg_int(&state, 4, 3);
}

#[test]
fn test_truncated_chunk_rejected() {
    let mut strings = StringInterner::new();
    let chunk = arithmetic_chunk(&mut strings);
    assert_eq!(
        crescent_vm::load(&chunk[..chunk.len() / 2]).unwrap_err(),
        UndumpError::Truncated
    );
}

#[test]
fn test_dump_omits_child_source_when_shared() {
    let mut strings = StringInterner::new();
    let source = strings.intern(b"@s.lua");
    let mut child = Proto::new();
    child.source = Some(source);
    child.max_stack_size = 2;
    child.code.push(Instruction::abc(OpCode::Return, 0, 1, 0));
    child.line_info = vec![1];
    let mut root = Proto::new();
    root.source = Some(source);
    root.max_stack_size = 2;
    root.code.push(Instruction::abc(OpCode::Return, 0, 1, 0));
    root.line_info = vec![1];
    root.protos.push(child);

    let shared = binary_chunk::dump(&root, &strings, false);

    let mut distinct_root = root.clone();
    distinct_root.protos[0].source = Some(strings.intern(b"@other.lua"));
    let distinct = binary_chunk::dump(&distinct_root, &strings, false);

    // Sharing the parent's source saves the repeated string bytes.
    assert!(shared.len() < distinct.len());
}
