use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::bytecode::{Instruction, Opcode};

/// A compiled bytecode unit: instruction stream plus constant pool.
///
/// Units are immutable once built. Nested units (block and method bodies)
/// live in the constant pool behind an `Rc` so frames and closures can share
/// them without copying.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bytecode {
    pub instructions: Vec<Instruction>,
    pub constants: Vec<Constant>,
}

impl Bytecode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parts(instructions: Vec<Instruction>, constants: Vec<Constant>) -> Self {
        Self {
            instructions,
            constants,
        }
    }

    pub fn constant(&self, index: usize) -> Option<&Constant> {
        self.constants.get(index)
    }

    /// Constant at `index` if it is a string.
    pub fn name(&self, index: usize) -> Option<&str> {
        match self.constants.get(index) {
            Some(Constant::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Count instructions with the given opcode, nested units excluded.
    pub fn count_opcode(&self, opcode: Opcode) -> usize {
        self.instructions
            .iter()
            .filter(|i| i.opcode == opcode)
            .count()
    }
}

/// Constant pool entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// 64-bit signed integer.
    Integer(i64),

    /// 64-bit floating-point number.
    Float(f64),

    /// UTF-8 string. Also used for selectors and variable names.
    String(String),

    /// Boolean value.
    Bool(bool),

    /// `nil`.
    Nil,

    /// Nested bytecode for a block body.
    Block(Rc<Bytecode>),

    /// Compiled class definition.
    Class(Rc<ClassDescriptor>),
}

impl Constant {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Constant::Integer(_) => "integer",
            Constant::Float(_) => "float",
            Constant::String(_) => "string",
            Constant::Bool(_) => "boolean",
            Constant::Nil => "nil",
            Constant::Block(_) => "bytecode",
            Constant::Class(_) => "class descriptor",
        }
    }

    /// Whether two constants may share one pool slot.
    ///
    /// Floats compare by bit pattern so `0.0` and `-0.0` stay distinct.
    /// Nested units and class descriptors are never shared.
    pub(crate) fn same_literal(&self, other: &Constant) -> bool {
        match (self, other) {
            (Constant::Integer(a), Constant::Integer(b)) => a == b,
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::String(a), Constant::String(b)) => a == b,
            (Constant::Bool(a), Constant::Bool(b)) => a == b,
            (Constant::Nil, Constant::Nil) => true,
            _ => false,
        }
    }
}

/// Compiled, serializable description of a class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    pub name: String,
    /// `None` for a root class.
    pub superclass: Option<String>,
    /// Own instance fields; inherited fields are not repeated.
    pub fields: Vec<String>,
    pub class_vars: Vec<String>,
    pub methods: Vec<MethodDescriptor>,
    pub class_methods: Vec<MethodDescriptor>,
}

/// Compiled, serializable description of a method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub selector: String,
    pub params: Vec<String>,
    pub body: Rc<Bytecode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_lookup() {
        let bc = Bytecode::with_parts(
            vec![Instruction::new(Opcode::LoadGlobal, 0)],
            vec![Constant::String("x".to_string()), Constant::Integer(3)],
        );
        assert_eq!(bc.name(0), Some("x"));
        assert_eq!(bc.name(1), None);
        assert_eq!(bc.name(9), None);
    }

    #[test]
    fn test_same_literal() {
        assert!(Constant::Integer(1).same_literal(&Constant::Integer(1)));
        assert!(!Constant::Integer(1).same_literal(&Constant::Float(1.0)));
        assert!(!Constant::Float(0.0).same_literal(&Constant::Float(-0.0)));

        let block = Constant::Block(Rc::new(Bytecode::new()));
        assert!(!block.same_literal(&block.clone()));
    }
}
