//! Bytecode disassembler (luac -l style output).

use crate::coerce::format_float;
use crate::opcode::{is_k, rk_index, Instruction, OpArg, OpCode, OpMode};
use crate::proto::{Constant, Proto};
use crescent_core::string::StringInterner;

/// Disassemble a prototype tree into a human-readable listing.
pub fn disassemble(proto: &Proto, strings: &StringInterner) -> String {
    let mut listing = Listing {
        out: String::new(),
        depth: 0,
    };
    listing.proto(proto, strings);
    listing.out
}

/// Indent-aware line writer the listing is assembled through.
struct Listing {
    out: String,
    depth: usize,
}

impl Listing {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// A titled block of rows numbered from zero. Empty blocks are omitted.
    fn rows(&mut self, title: &str, rows: Vec<String>) {
        if rows.is_empty() {
            return;
        }
        self.line(&format!("{title} ({}):", rows.len()));
        for (i, row) in rows.into_iter().enumerate() {
            self.line(&format!("  {i:<4} {row}"));
        }
    }

    fn proto(&mut self, proto: &Proto, strings: &StringInterner) {
        let source = proto
            .source
            .map(|sid| strings.display(sid).into_owned())
            .unwrap_or_else(|| "?".to_string());
        let vararg = if proto.is_vararg { "+" } else { "" };
        self.line(&format!(
            "function <{source}:{}-{}>  {}{vararg} params  {} slots",
            proto.line_defined, proto.last_line_defined, proto.num_params, proto.max_stack_size,
        ));

        let code = proto
            .code
            .iter()
            .enumerate()
            .map(|(pc, inst)| {
                let line = match proto.get_line(pc) {
                    0 => "[-]".to_string(),
                    n => format!("[{n}]"),
                };
                format!("{line:>6}  {}", render_instruction(inst, proto, strings))
            })
            .collect();
        self.rows("code", code);

        let constants = proto
            .constants
            .iter()
            .map(|k| constant_text(k, strings))
            .collect();
        self.rows("constants", constants);

        let upvalues = proto
            .upvalues
            .iter()
            .map(|up| {
                let name = up
                    .name
                    .map(|sid| strings.display(sid).into_owned())
                    .unwrap_or_else(|| "-".to_string());
                format!("{name}  in_stack={} idx={}", up.in_stack as u8, up.index)
            })
            .collect();
        self.rows("upvalues", upvalues);

        let locals = proto
            .local_vars
            .iter()
            .map(|lv| {
                format!(
                    "{}  pc {}..{}",
                    strings.display(lv.name),
                    lv.start_pc + 1,
                    lv.end_pc + 1
                )
            })
            .collect();
        self.rows("locals", locals);

        for (i, child) in proto.protos.iter().enumerate() {
            self.line(&format!("function [{i}]:"));
            self.depth += 1;
            self.proto(child, strings);
            self.depth -= 1;
        }
    }
}

/// Render one instruction; constant operands get annotated from the pool.
pub fn render_instruction(inst: &Instruction, proto: &Proto, strings: &StringInterner) -> String {
    let Some(op) = inst.opcode() else {
        return format!("<bad opcode {}>", inst.opcode_num());
    };

    let mut fields: Vec<String> = Vec::new();
    let mut notes: Vec<String> = Vec::new();
    match op.mode() {
        OpMode::IABC => {
            fields.push(inst.a().to_string());
            for (operand, kind) in [(inst.b(), op.b_mode()), (inst.c(), op.c_mode())] {
                match kind {
                    OpArg::N => {}
                    // luac prints constant operands as negative indices.
                    OpArg::K if is_k(operand) => {
                        fields.push((-1 - rk_index(operand) as i64).to_string());
                        if let Some(k) = proto.constants.get(rk_index(operand) as usize) {
                            notes.push(constant_text(k, strings));
                        }
                    }
                    _ => fields.push(operand.to_string()),
                }
            }
        }
        OpMode::IABx => {
            fields.push(inst.a().to_string());
            fields.push(inst.bx().to_string());
            if op == OpCode::LoadK {
                if let Some(k) = proto.constants.get(inst.bx() as usize) {
                    notes.push(constant_text(k, strings));
                }
            } else if op == OpCode::Closure {
                notes.push(format!("function [{}]", inst.bx()));
            }
        }
        OpMode::IAsBx => {
            fields.push(inst.a().to_string());
            fields.push(inst.sbx().to_string());
        }
        OpMode::IAx => fields.push(inst.ax_field().to_string()),
    }

    let mut text = format!("{:<10} {}", op.name(), fields.join(" "));
    if !notes.is_empty() {
        text.push_str("\t; ");
        text.push_str(&notes.join(" "));
    }
    text
}

fn constant_text(k: &Constant, strings: &StringInterner) -> String {
    match k {
        Constant::Nil => "nil".to_string(),
        Constant::Boolean(b) => b.to_string(),
        Constant::Integer(i) => i.to_string(),
        Constant::Float(f) => format_float(*f),
        Constant::String(id) => match std::str::from_utf8(strings.get_bytes(*id)) {
            Ok(s) => format!("\"{s}\""),
            Err(_) => "<binary string>".to_string(),
        },
    }
}
