use crate::bytecode::op::OperandKind;
use crate::bytecode::{Bytecode, ClassDescriptor, Constant, Opcode};

/// Structural problem found in a bytecode unit.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VerifyError {
    #[error("ip={ip}: constant index {index} out of range (pool has {len})")]
    ConstantOutOfRange { ip: usize, index: i64, len: usize },

    #[error("ip={ip}: constant {index} is a {found}, expected {expected}")]
    WrongConstantKind {
        ip: usize,
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("ip={ip}: negative operand {operand} for {opcode:?}")]
    NegativeOperand {
        ip: usize,
        opcode: Opcode,
        operand: i32,
    },

    #[error("ip={ip}: jump target {target} outside 0..={len}")]
    JumpOutOfRange { ip: usize, target: i32, len: usize },

    #[error("ip={ip}: outer access with depth 0")]
    ZeroDepth { ip: usize },

    #[error("in {location}: {source}")]
    Nested {
        location: String,
        #[source]
        source: Box<VerifyError>,
    },
}

/// Check that every operand of `code` (and of every nested unit) refers to
/// something that exists.
///
/// NOTE: this does not simulate stack heights; underflow is detected by the
/// VM when it happens.
pub fn verify(code: &Bytecode) -> Result<(), VerifyError> {
    for (ip, instruction) in code.instructions.iter().enumerate() {
        let operand = instruction.operand;
        let opcode = instruction.opcode;

        match opcode.operand_kind() {
            OperandKind::None => {}
            OperandKind::Constant => {
                constant_at(code, ip, operand)?;
            }
            OperandKind::Name => {
                expect_string(code, ip, operand as i64)?;
            }
            OperandKind::Slot | OperandKind::Field | OperandKind::Count => {
                if operand < 0 {
                    return Err(VerifyError::NegativeOperand {
                        ip,
                        opcode,
                        operand,
                    });
                }
            }
            OperandKind::Outer => {
                if operand < 0 {
                    return Err(VerifyError::NegativeOperand {
                        ip,
                        opcode,
                        operand,
                    });
                }
                let (_, depth) = crate::bytecode::Instruction::unpack(operand);
                if depth == 0 {
                    return Err(VerifyError::ZeroDepth { ip });
                }
            }
            OperandKind::Send => {
                let (selector, _) = unpack_checked(ip, opcode, operand)?;
                expect_string(code, ip, selector as i64)?;
            }
            OperandKind::Target => {
                if operand < 0 || operand as usize > code.instructions.len() {
                    return Err(VerifyError::JumpOutOfRange {
                        ip,
                        target: operand,
                        len: code.instructions.len(),
                    });
                }
            }
            OperandKind::ClassDescriptor => match constant_at(code, ip, operand)? {
                (_, Constant::Class(_)) => {}
                (index, other) => {
                    return Err(VerifyError::WrongConstantKind {
                        ip,
                        index,
                        expected: "class descriptor",
                        found: other.kind_name(),
                    });
                }
            },
            OperandKind::Closure => {
                let (block, _) = unpack_checked(ip, opcode, operand)?;
                match constant_at(code, ip, block as i32)? {
                    (_, Constant::Block(_)) => {}
                    (index, other) => {
                        return Err(VerifyError::WrongConstantKind {
                            ip,
                            index,
                            expected: "bytecode",
                            found: other.kind_name(),
                        });
                    }
                }
            }
        }
    }

    for (index, constant) in code.constants.iter().enumerate() {
        match constant {
            Constant::Block(inner) => verify(inner).map_err(|e| VerifyError::Nested {
                location: format!("block constant {}", index),
                source: Box::new(e),
            })?,
            Constant::Class(descriptor) => verify_class(descriptor)?,
            _ => {}
        }
    }

    Ok(())
}

fn verify_class(descriptor: &ClassDescriptor) -> Result<(), VerifyError> {
    let sides = [("", &descriptor.methods), (" class", &descriptor.class_methods)];

    for (side, methods) in sides {
        for method in methods {
            verify(&method.body).map_err(|e| VerifyError::Nested {
                location: format!("{}{}>>{}", descriptor.name, side, method.selector),
                source: Box::new(e),
            })?;
        }
    }

    Ok(())
}

fn constant_at(code: &Bytecode, ip: usize, operand: i32) -> Result<(usize, &Constant), VerifyError> {
    if operand < 0 {
        return Err(VerifyError::ConstantOutOfRange {
            ip,
            index: operand as i64,
            len: code.constants.len(),
        });
    }

    let index = operand as usize;
    code.constants
        .get(index)
        .map(|c| (index, c))
        .ok_or(VerifyError::ConstantOutOfRange {
            ip,
            index: index as i64,
            len: code.constants.len(),
        })
}

fn expect_string(code: &Bytecode, ip: usize, index: i64) -> Result<(), VerifyError> {
    match constant_at(code, ip, index as i32)? {
        (_, Constant::String(_)) => Ok(()),
        (index, other) => Err(VerifyError::WrongConstantKind {
            ip,
            index,
            expected: "string",
            found: other.kind_name(),
        }),
    }
}

fn unpack_checked(ip: usize, opcode: Opcode, operand: i32) -> Result<(usize, usize), VerifyError> {
    if operand < 0 {
        return Err(VerifyError::NegativeOperand {
            ip,
            opcode,
            operand,
        });
    }
    Ok(crate::bytecode::Instruction::unpack(operand))
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::bytecode::{Instruction, MethodDescriptor};

    fn unit(instructions: Vec<Instruction>, constants: Vec<Constant>) -> Bytecode {
        Bytecode::with_parts(instructions, constants)
    }

    #[test]
    fn test_valid_unit() {
        let code = unit(
            vec![
                Instruction::new(Opcode::PushConstant, 0),
                Instruction::new(Opcode::PushConstant, 0),
                Instruction::send(1, 1),
                Instruction::bare(Opcode::Return),
            ],
            vec![Constant::Integer(3), Constant::String("+".to_string())],
        );
        assert!(verify(&code).is_ok());
    }

    #[test]
    fn test_constant_out_of_range() {
        let code = unit(vec![Instruction::new(Opcode::PushConstant, 4)], vec![]);
        assert!(matches!(
            verify(&code),
            Err(VerifyError::ConstantOutOfRange { ip: 0, index: 4, .. })
        ));
    }

    #[test]
    fn test_selector_must_be_string() {
        let code = unit(vec![Instruction::send(0, 0)], vec![Constant::Integer(1)]);
        assert!(matches!(
            verify(&code),
            Err(VerifyError::WrongConstantKind {
                expected: "string",
                ..
            })
        ));
    }

    #[test]
    fn test_jump_target_bounds() {
        let ok = unit(vec![Instruction::new(Opcode::Jump, 1)], vec![]);
        assert!(verify(&ok).is_ok());

        let bad = unit(vec![Instruction::new(Opcode::Jump, 5)], vec![]);
        assert!(matches!(
            verify(&bad),
            Err(VerifyError::JumpOutOfRange { target: 5, .. })
        ));
    }

    #[test]
    fn test_closure_needs_block_constant() {
        let code = unit(
            vec![Instruction::make_closure(0, 0)],
            vec![Constant::String("nope".to_string())],
        );
        assert!(matches!(
            verify(&code),
            Err(VerifyError::WrongConstantKind {
                expected: "bytecode",
                ..
            })
        ));
    }

    #[test]
    fn test_nested_method_body_checked() {
        let broken = Rc::new(unit(vec![Instruction::new(Opcode::PushConstant, 0)], vec![]));
        let descriptor = ClassDescriptor {
            name: "Foo".to_string(),
            methods: vec![MethodDescriptor {
                selector: "bar".to_string(),
                params: vec![],
                body: broken,
            }],
            ..ClassDescriptor::default()
        };
        let code = unit(
            vec![Instruction::new(Opcode::DefineClass, 0)],
            vec![Constant::Class(Rc::new(descriptor))],
        );

        let err = verify(&code).unwrap_err();
        assert!(err.to_string().contains("Foo>>bar"), "{}", err);
    }

    #[test]
    fn test_outer_depth_zero_rejected() {
        let code = unit(vec![Instruction::outer(Opcode::LoadOuter, 0, 0)], vec![]);
        assert_eq!(verify(&code), Err(VerifyError::ZeroDepth { ip: 0 }));
    }
}
