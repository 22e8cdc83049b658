use serde::{Deserialize, Serialize};

// =============================================================================
// OPCODE - Bytecode operations
// =============================================================================

/// Bytecode operation.
///
/// The discriminant is the byte written by the codec, so values must never be
/// renumbered. Every opcode takes exactly one operand whose meaning is fixed
/// by the opcode (see [`Opcode::operand_kind`]).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // ==========================================================================
    // Stack (0x00 - 0x0F)
    // ==========================================================================
    /// Push constant. Operand: constant index | `( -- value )`
    PushConstant = 0x00,
    /// Discard top of stack | `( a -- )`
    Pop = 0x01,
    /// Duplicate top of stack | `( a -- a a )`
    Dup = 0x02,

    // ==========================================================================
    // Variable access (0x10 - 0x1F)
    // ==========================================================================
    /// Operand: local slot | `( -- value )`
    LoadLocal = 0x10,
    /// Operand: local slot | `( value -- value )`
    StoreLocal = 0x11,
    /// Operand: packed (slot, depth) | `( -- value )`
    LoadOuter = 0x12,
    /// Operand: packed (slot, depth) | `( value -- value )`
    StoreOuter = 0x13,
    /// Operand: field index on `self` | `( -- value )`
    LoadField = 0x14,
    /// Operand: field index on `self` | `( value -- value )`
    StoreField = 0x15,
    /// Operand: name constant index | `( -- value )`
    LoadClassVar = 0x16,
    /// Operand: name constant index | `( value -- value )`
    StoreClassVar = 0x17,
    /// Operand: name constant index | `( -- value )`
    LoadGlobal = 0x18,
    /// Operand: name constant index | `( value -- value )`
    StoreGlobal = 0x19,

    // ==========================================================================
    // Message dispatch (0x20 - 0x2F)
    // ==========================================================================
    /// Operand: packed (selector index, arg count) | `( recv args... -- result )`
    Send = 0x20,
    /// Same as `Send`, lookup starts above the method's defining class.
    SuperSend = 0x21,

    // ==========================================================================
    // Control flow (0x30 - 0x3F)
    // ==========================================================================
    /// Operand: absolute instruction index.
    Jump = 0x30,
    /// Operand: absolute instruction index | `( bool -- )`
    JumpIfFalse = 0x31,

    // ==========================================================================
    // Literal push (0x40 - 0x4F)
    // ==========================================================================
    PushSelf = 0x40,
    PushNil = 0x41,
    PushTrue = 0x42,
    PushFalse = 0x43,

    // ==========================================================================
    // Object construction (0x50 - 0x5F)
    // ==========================================================================
    /// `( class -- instance )`
    NewInstance = 0x50,
    /// Operand: class descriptor constant index | `( -- class )`
    DefineClass = 0x51,
    /// Operand: packed (bytecode index, param count) | `( -- block )`
    MakeClosure = 0x52,
    /// Operand: element count | `( e1 .. en -- array )`
    MakeArray = 0x53,
    /// Operand: pair count | `( k1 v1 .. kn vn -- dict )`
    MakeDictionary = 0x54,

    // ==========================================================================
    // Return (0x60 - 0x6F)
    // ==========================================================================
    /// Complete the current frame with the top of stack.
    Return = 0x60,
    /// Complete the home method of the current block with the top of stack.
    NonLocalReturn = 0x61,
}

/// What an opcode's operand refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// Operand is ignored (always written as 0).
    None,
    /// Index of any constant.
    Constant,
    /// Index of a string constant naming something.
    Name,
    /// Local slot index.
    Slot,
    /// Packed slot and scope depth.
    Outer,
    /// Instance field index.
    Field,
    /// Packed selector constant and argument count.
    Send,
    /// Absolute instruction index.
    Target,
    /// Index of a class descriptor constant.
    ClassDescriptor,
    /// Packed nested bytecode constant and parameter count.
    Closure,
    /// Element (or pair) count.
    Count,
}

impl Opcode {
    pub const ALL: [Opcode; 28] = [
        Opcode::PushConstant,
        Opcode::Pop,
        Opcode::Dup,
        Opcode::LoadLocal,
        Opcode::StoreLocal,
        Opcode::LoadOuter,
        Opcode::StoreOuter,
        Opcode::LoadField,
        Opcode::StoreField,
        Opcode::LoadClassVar,
        Opcode::StoreClassVar,
        Opcode::LoadGlobal,
        Opcode::StoreGlobal,
        Opcode::Send,
        Opcode::SuperSend,
        Opcode::Jump,
        Opcode::JumpIfFalse,
        Opcode::PushSelf,
        Opcode::PushNil,
        Opcode::PushTrue,
        Opcode::PushFalse,
        Opcode::NewInstance,
        Opcode::DefineClass,
        Opcode::MakeClosure,
        Opcode::MakeArray,
        Opcode::MakeDictionary,
        Opcode::Return,
        Opcode::NonLocalReturn,
    ];

    pub fn operand_kind(self) -> OperandKind {
        use Opcode::*;
        match self {
            PushConstant => OperandKind::Constant,
            Pop | Dup => OperandKind::None,
            LoadLocal | StoreLocal => OperandKind::Slot,
            LoadOuter | StoreOuter => OperandKind::Outer,
            LoadField | StoreField => OperandKind::Field,
            LoadClassVar | StoreClassVar | LoadGlobal | StoreGlobal => OperandKind::Name,
            Send | SuperSend => OperandKind::Send,
            Jump | JumpIfFalse => OperandKind::Target,
            PushSelf | PushNil | PushTrue | PushFalse => OperandKind::None,
            NewInstance => OperandKind::None,
            DefineClass => OperandKind::ClassDescriptor,
            MakeClosure => OperandKind::Closure,
            MakeArray | MakeDictionary => OperandKind::Count,
            Return | NonLocalReturn => OperandKind::None,
        }
    }

    /// Upper-case mnemonic used by the disassembler.
    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            PushConstant => "PUSH_CONST",
            Pop => "POP",
            Dup => "DUP",
            LoadLocal => "LOAD_LOCAL",
            StoreLocal => "STORE_LOCAL",
            LoadOuter => "LOAD_OUTER",
            StoreOuter => "STORE_OUTER",
            LoadField => "LOAD_FIELD",
            StoreField => "STORE_FIELD",
            LoadClassVar => "LOAD_CVAR",
            StoreClassVar => "STORE_CVAR",
            LoadGlobal => "LOAD_GLOBAL",
            StoreGlobal => "STORE_GLOBAL",
            Send => "SEND",
            SuperSend => "SUPER_SEND",
            Jump => "JUMP",
            JumpIfFalse => "JUMP_FALSE",
            PushSelf => "PUSH_SELF",
            PushNil => "PUSH_NIL",
            PushTrue => "PUSH_TRUE",
            PushFalse => "PUSH_FALSE",
            NewInstance => "NEW",
            DefineClass => "DEFINE_CLASS",
            MakeClosure => "MAKE_CLOSURE",
            MakeArray => "MAKE_ARRAY",
            MakeDictionary => "MAKE_DICT",
            Return => "RETURN",
            NonLocalReturn => "NL_RETURN",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        use Opcode::*;
        Ok(match byte {
            0x00 => PushConstant,
            0x01 => Pop,
            0x02 => Dup,
            0x10 => LoadLocal,
            0x11 => StoreLocal,
            0x12 => LoadOuter,
            0x13 => StoreOuter,
            0x14 => LoadField,
            0x15 => StoreField,
            0x16 => LoadClassVar,
            0x17 => StoreClassVar,
            0x18 => LoadGlobal,
            0x19 => StoreGlobal,
            0x20 => Send,
            0x21 => SuperSend,
            0x30 => Jump,
            0x31 => JumpIfFalse,
            0x40 => PushSelf,
            0x41 => PushNil,
            0x42 => PushTrue,
            0x43 => PushFalse,
            0x50 => NewInstance,
            0x51 => DefineClass,
            0x52 => MakeClosure,
            0x53 => MakeArray,
            0x54 => MakeDictionary,
            0x60 => Return,
            0x61 => NonLocalReturn,
            other => return Err(other),
        })
    }
}

// =============================================================================
// INSTRUCTION
// =============================================================================

/// Largest count that fits in the low byte of a packed operand.
pub const MAX_PACKED_COUNT: usize = 0xFF;

/// Largest index that fits in the high bits of a packed operand.
pub const MAX_PACKED_INDEX: usize = (i32::MAX >> 8) as usize;

/// A single instruction: opcode plus one integer operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: i32,
}

impl Instruction {
    pub fn new(opcode: Opcode, operand: i32) -> Self {
        Self { opcode, operand }
    }

    /// Instruction whose operand is unused.
    pub fn bare(opcode: Opcode) -> Self {
        Self { opcode, operand: 0 }
    }

    /// Pack an index and a small count into one operand.
    ///
    /// The count occupies the low 8 bits, the index the bits above.
    pub fn pack(index: usize, count: usize) -> i32 {
        debug_assert!(count <= MAX_PACKED_COUNT);
        debug_assert!(index <= MAX_PACKED_INDEX);
        ((index << 8) | (count & MAX_PACKED_COUNT)) as i32
    }

    /// Split a packed operand into `(index, count)`.
    pub fn unpack(operand: i32) -> (usize, usize) {
        let raw = operand as u32;
        ((raw >> 8) as usize, (raw & 0xFF) as usize)
    }

    pub fn send(selector: usize, argc: usize) -> Self {
        Self::new(Opcode::Send, Self::pack(selector, argc))
    }

    pub fn super_send(selector: usize, argc: usize) -> Self {
        Self::new(Opcode::SuperSend, Self::pack(selector, argc))
    }

    pub fn make_closure(code: usize, params: usize) -> Self {
        Self::new(Opcode::MakeClosure, Self::pack(code, params))
    }

    /// Outer-variable access: slot in the high bits, scope depth in the low byte.
    pub fn outer(opcode: Opcode, slot: usize, depth: usize) -> Self {
        Self::new(opcode, Self::pack(slot, depth))
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.opcode.operand_kind() {
            OperandKind::None => write!(f, "{}", self.opcode.mnemonic()),
            OperandKind::Send | OperandKind::Closure | OperandKind::Outer => {
                let (index, count) = Self::unpack(self.operand);
                write!(f, "{} {}/{}", self.opcode.mnemonic(), index, count)
            }
            _ => write!(f, "{} {}", self.opcode.mnemonic(), self.operand),
        }
    }
}
