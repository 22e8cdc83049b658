use std::collections::HashMap;
use std::fmt::Write;

use crate::bytecode::op::OperandKind;
use crate::bytecode::{Bytecode, ClassDescriptor, Constant, Instruction, Opcode};

/// Print disassembly of a top-level unit and everything nested in it.
pub fn print_bytecode(code: &Bytecode) {
    println!("=== BYTECODE ===\n");
    print!("{}", disassemble(code));
}

/// Full listing of `code` as a String.
///
/// Nested block bodies are listed inline under the `MAKE_CLOSURE` that
/// creates them; class descriptors are expanded method by method.
pub fn disassemble(code: &Bytecode) -> String {
    let mut out = String::new();
    write_unit(&mut out, "main", code, 0);
    out
}

fn write_unit(out: &mut String, name: &str, code: &Bytecode, indent: usize) {
    let prefix = "  ".repeat(indent);

    let _ = writeln!(out, "{}════════════════════════════════════════", prefix);
    let _ = writeln!(out, "{} {}", prefix, name);
    let _ = writeln!(
        out,
        "{} {} instructions, {} constants",
        prefix,
        code.instructions.len(),
        code.constants.len()
    );
    let _ = writeln!(out, "{}════════════════════════════════════════", prefix);
    write_instructions(out, code, indent);
    out.push('\n');
}

fn write_instructions(out: &mut String, code: &Bytecode, indent: usize) {
    let jump_targets = collect_jump_targets(&code.instructions);
    let prefix = "  ".repeat(indent);

    for (ip, instruction) in code.instructions.iter().enumerate() {
        let is_target = jump_targets.contains(&ip);
        if is_target {
            let _ = writeln!(out, "{}      ┌──────────────────────────────────", prefix);
        }

        let marker = if is_target { "► " } else { "  " };
        let _ = write!(out, "{}{:04} {}", prefix, ip, marker);
        let _ = writeln!(out, "{}", format_instruction(code, instruction, ip));

        match instruction.opcode {
            Opcode::MakeClosure => {
                let (index, params) = Instruction::unpack(instruction.operand);
                if let Some(Constant::Block(body)) = code.constant(index) {
                    write_unit(out, &format!("block/{}", params), body, indent + 2);
                }
            }
            Opcode::DefineClass => {
                if let Some(Constant::Class(descriptor)) = code.constant(instruction.operand as usize) {
                    write_class(out, descriptor, indent + 2);
                }
            }
            _ => {}
        }
    }
}

fn write_class(out: &mut String, descriptor: &ClassDescriptor, indent: usize) {
    let prefix = "  ".repeat(indent);
    let superclass = descriptor.superclass.as_deref().unwrap_or("nil");

    let _ = writeln!(out, "{}class {} < {}", prefix, descriptor.name, superclass);
    if !descriptor.fields.is_empty() {
        let _ = writeln!(out, "{}  fields: {}", prefix, descriptor.fields.join(" "));
    }
    if !descriptor.class_vars.is_empty() {
        let _ = writeln!(out, "{}  class vars: {}", prefix, descriptor.class_vars.join(" "));
    }

    for method in &descriptor.methods {
        let name = format!("{}>>{}", descriptor.name, method.selector);
        write_unit(out, &name, &method.body, indent + 1);
    }
    for method in &descriptor.class_methods {
        let name = format!("{} class>>{}", descriptor.name, method.selector);
        write_unit(out, &name, &method.body, indent + 1);
    }
}

fn collect_jump_targets(instructions: &[Instruction]) -> Vec<usize> {
    let mut targets = Vec::new();

    for instruction in instructions {
        if instruction.opcode.operand_kind() == OperandKind::Target && instruction.operand >= 0 {
            let target = instruction.operand as usize;
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
    }

    targets
}

/// One instruction plus a comment resolving its operand against the pool.
fn format_instruction(code: &Bytecode, instruction: &Instruction, ip: usize) -> String {
    let text = instruction.to_string();
    let operand = instruction.operand;

    let comment = match instruction.opcode.operand_kind() {
        OperandKind::Constant => code.constant(operand as usize).map(format_constant),
        OperandKind::Name => code.name(operand as usize).map(|n| n.to_string()),
        OperandKind::Send => {
            let (selector, _) = Instruction::unpack(operand);
            code.name(selector).map(|s| format!("#{}", s))
        }
        OperandKind::Outer => {
            let (slot, depth) = Instruction::unpack(operand);
            Some(format!("slot {} up {}", slot, depth))
        }
        OperandKind::Target => {
            let direction = if (operand as i64) <= ip as i64 { "↑" } else { "↓" };
            Some(format!("{} (→ {:04})", direction, operand))
        }
        OperandKind::ClassDescriptor => match code.constant(operand as usize) {
            Some(Constant::Class(d)) => Some(d.name.clone()),
            _ => None,
        },
        OperandKind::None | OperandKind::Slot | OperandKind::Field | OperandKind::Closure => None,
        OperandKind::Count => None,
    };

    match comment {
        Some(comment) => format!("{:<22}; {}", text, comment),
        None => text,
    }
}

fn format_constant(constant: &Constant) -> String {
    match constant {
        Constant::Integer(n) => format!("{}", n),
        Constant::Float(f) => format!("{:?}", f),
        Constant::String(s) => format!("{:?}", s),
        Constant::Bool(b) => format!("{}", b),
        Constant::Nil => "nil".to_string(),
        Constant::Block(body) => format!("[ <{} instructions> ]", body.instructions.len()),
        Constant::Class(d) => format!("<class {}>", d.name),
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Print instruction counts per mnemonic, nested units included.
pub fn print_bytecode_stats(code: &Bytecode) {
    println!("=== BYTECODE STATISTICS ===\n");

    let counts = opcode_counts(code);
    let total: usize = counts.values().sum();

    println!("Instructions:     {}", total);
    println!();

    println!("Opcode frequency:");
    let mut sorted: Vec<_> = counts.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));

    for (name, count) in sorted.iter().take(10) {
        let pct = (**count as f64 / total as f64) * 100.0;
        println!("  {:<14} {:>4} ({:>5.1}%)", name, count, pct);
    }
}

/// Instruction count per mnemonic across `code` and every nested unit.
pub fn opcode_counts(code: &Bytecode) -> HashMap<&'static str, usize> {
    let mut counts = HashMap::new();
    count_instructions(code, &mut counts);
    counts
}

fn count_instructions(code: &Bytecode, counts: &mut HashMap<&'static str, usize>) {
    for instruction in &code.instructions {
        *counts.entry(instruction.opcode.mnemonic()).or_insert(0) += 1;
    }

    for constant in &code.constants {
        match constant {
            Constant::Block(body) => count_instructions(body, counts),
            Constant::Class(descriptor) => {
                for method in descriptor.methods.iter().chain(&descriptor.class_methods) {
                    count_instructions(&method.body, counts);
                }
            }
            _ => {}
        }
    }
}
