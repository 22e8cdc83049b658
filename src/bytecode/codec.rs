//! Binary `.sg` bytecode format.
//!
//! All integers are little-endian.
//!
//! ```text
//! header   := "SMOG" version:u32 flags:u32 unit
//! unit     := n:u32 (opcode:u8 operand:i32){n} m:u32 constant{m}
//! constant := 1 i64 | 2 f64-bits | 3 string | 4 u8 | 5 | 6 unit | 7 class
//! string   := len:u32 utf8-bytes
//! class    := name has_super:u8 [super] fields class_vars methods methods
//! method   := selector n:u32 string{n} unit
//! ```

use std::path::Path;
use std::rc::Rc;

use tracing::debug;

use crate::bytecode::codec_error::CodecError;
use crate::bytecode::verify::verify;
use crate::bytecode::{Bytecode, ClassDescriptor, Constant, Instruction, MethodDescriptor, Opcode};

pub const MAGIC: [u8; 4] = *b"SMOG";
pub const VERSION: u32 = 1;

/// Deepest nesting of block bodies and class descriptors accepted on decode.
pub const MAX_NESTING: usize = 64;

const TAG_INTEGER: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_BOOL: u8 = 4;
const TAG_NIL: u8 = 5;
const TAG_BLOCK: u8 = 6;
const TAG_CLASS: u8 = 7;

const INSTRUCTION_SIZE: usize = 5;

// =============================================================================
// Writing
// =============================================================================

/// Serialize a unit, header included.
pub fn encode(code: &Bytecode) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    wr_u32le(&mut out, VERSION);
    wr_u32le(&mut out, 0);
    write_unit(&mut out, code)?;
    Ok(out)
}

pub fn write_file(path: impl AsRef<Path>, code: &Bytecode) -> Result<(), CodecError> {
    let bytes = encode(code)?;
    std::fs::write(path.as_ref(), &bytes)?;
    debug!(path = %path.as_ref().display(), bytes = bytes.len(), "wrote bytecode");
    Ok(())
}

fn wr_u8(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}

fn wr_u32le(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn wr_len(out: &mut Vec<u8>, what: &'static str, len: usize) -> Result<(), CodecError> {
    let len32 = u32::try_from(len).map_err(|_| CodecError::TooLarge { what, len })?;
    wr_u32le(out, len32);
    Ok(())
}

fn wr_str(out: &mut Vec<u8>, s: &str) -> Result<(), CodecError> {
    wr_len(out, "string", s.len())?;
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn wr_strs(out: &mut Vec<u8>, what: &'static str, items: &[String]) -> Result<(), CodecError> {
    wr_len(out, what, items.len())?;
    for item in items {
        wr_str(out, item)?;
    }
    Ok(())
}

fn write_unit(out: &mut Vec<u8>, code: &Bytecode) -> Result<(), CodecError> {
    wr_len(out, "instruction list", code.instructions.len())?;
    for instruction in &code.instructions {
        wr_u8(out, instruction.opcode as u8);
        out.extend_from_slice(&instruction.operand.to_le_bytes());
    }

    wr_len(out, "constant pool", code.constants.len())?;
    for constant in &code.constants {
        write_constant(out, constant)?;
    }
    Ok(())
}

fn write_constant(out: &mut Vec<u8>, constant: &Constant) -> Result<(), CodecError> {
    match constant {
        Constant::Integer(n) => {
            wr_u8(out, TAG_INTEGER);
            out.extend_from_slice(&n.to_le_bytes());
        }
        Constant::Float(f) => {
            wr_u8(out, TAG_FLOAT);
            out.extend_from_slice(&f.to_bits().to_le_bytes());
        }
        Constant::String(s) => {
            wr_u8(out, TAG_STRING);
            wr_str(out, s)?;
        }
        Constant::Bool(b) => {
            wr_u8(out, TAG_BOOL);
            wr_u8(out, *b as u8);
        }
        Constant::Nil => wr_u8(out, TAG_NIL),
        Constant::Block(body) => {
            wr_u8(out, TAG_BLOCK);
            write_unit(out, body)?;
        }
        Constant::Class(descriptor) => {
            wr_u8(out, TAG_CLASS);
            write_class(out, descriptor)?;
        }
    }
    Ok(())
}

fn write_class(out: &mut Vec<u8>, descriptor: &ClassDescriptor) -> Result<(), CodecError> {
    wr_str(out, &descriptor.name)?;
    match &descriptor.superclass {
        Some(superclass) => {
            wr_u8(out, 1);
            wr_str(out, superclass)?;
        }
        None => wr_u8(out, 0),
    }
    wr_strs(out, "field list", &descriptor.fields)?;
    wr_strs(out, "class variable list", &descriptor.class_vars)?;

    for methods in [&descriptor.methods, &descriptor.class_methods] {
        wr_len(out, "method table", methods.len())?;
        for method in methods {
            wr_str(out, &method.selector)?;
            wr_strs(out, "parameter list", &method.params)?;
            write_unit(out, &method.body)?;
        }
    }
    Ok(())
}

// =============================================================================
// Reading
// =============================================================================

/// Parse and verify a serialized unit.
///
/// Either the whole input is accepted or an error is returned; the input
/// must contain exactly one unit.
pub fn decode(bytes: &[u8]) -> Result<Bytecode, CodecError> {
    let mut r = Reader::new(bytes);

    let magic = r.take(4, "magic")?;
    if magic != &MAGIC[..] {
        let mut found = [0u8; 4];
        found.copy_from_slice(magic);
        return Err(CodecError::InvalidMagic { found });
    }

    let version = r.u32("version")?;
    if version != VERSION {
        return Err(CodecError::UnsupportedVersion {
            found: version,
            supported: VERSION,
        });
    }

    let flags = r.u32("flags")?;
    if flags != 0 {
        return Err(CodecError::UnsupportedFlags(flags));
    }

    let code = r.unit(0)?;

    if r.remaining() > 0 {
        return Err(CodecError::TrailingBytes {
            offset: r.pos,
            count: r.remaining(),
        });
    }

    verify(&code)?;
    debug!(
        bytes = bytes.len(),
        instructions = code.instructions.len(),
        constants = code.constants.len(),
        "decoded bytecode"
    );
    Ok(code)
}

pub fn read_file(path: impl AsRef<Path>) -> Result<Bytecode, CodecError> {
    let bytes = std::fs::read(path.as_ref())?;
    decode(&bytes)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
                context,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, context: &'static str) -> Result<[u8; N], CodecError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N, context)?);
        Ok(buf)
    }

    fn u8(&mut self, context: &'static str) -> Result<u8, CodecError> {
        Ok(self.array::<1>(context)?[0])
    }

    fn u32(&mut self, context: &'static str) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.array(context)?))
    }

    fn i32(&mut self, context: &'static str) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.array(context)?))
    }

    fn i64(&mut self, context: &'static str) -> Result<i64, CodecError> {
        Ok(i64::from_le_bytes(self.array(context)?))
    }

    /// A count of items that each occupy at least `min_size` bytes.
    ///
    /// Rejected up front when the input cannot possibly hold that many, so
    /// a corrupt length never drives a huge allocation.
    fn count(&mut self, min_size: usize, context: &'static str) -> Result<usize, CodecError> {
        let count = self.u32(context)? as usize;
        let needed = count.saturating_mul(min_size);
        if needed > self.remaining() {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: needed - self.remaining(),
                context,
            });
        }
        Ok(count)
    }

    fn string(&mut self, context: &'static str) -> Result<String, CodecError> {
        let len = self.count(1, context)?;
        let offset = self.pos;
        let bytes = self.take(len, context)?;
        std::str::from_utf8(bytes)
            .map(|s| s.to_string())
            .map_err(|_| CodecError::InvalidUtf8 { offset })
    }

    fn strings(&mut self, context: &'static str) -> Result<Vec<String>, CodecError> {
        let count = self.count(4, context)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.string(context)?);
        }
        Ok(out)
    }

    fn check_depth(&self, depth: usize) -> Result<(), CodecError> {
        if depth > MAX_NESTING {
            return Err(CodecError::NestingTooDeep {
                limit: MAX_NESTING,
                offset: self.pos,
            });
        }
        Ok(())
    }

    fn unit(&mut self, depth: usize) -> Result<Bytecode, CodecError> {
        self.check_depth(depth)?;

        let count = self.count(INSTRUCTION_SIZE, "instruction count")?;
        let mut instructions = Vec::with_capacity(count);
        for _ in 0..count {
            let offset = self.pos;
            let byte = self.u8("opcode")?;
            let opcode =
                Opcode::try_from(byte).map_err(|byte| CodecError::UnknownOpcode { byte, offset })?;
            let operand = self.i32("operand")?;
            instructions.push(Instruction::new(opcode, operand));
        }

        let count = self.count(1, "constant count")?;
        let mut constants = Vec::with_capacity(count);
        for _ in 0..count {
            constants.push(self.constant(depth)?);
        }

        Ok(Bytecode::with_parts(instructions, constants))
    }

    fn constant(&mut self, depth: usize) -> Result<Constant, CodecError> {
        let offset = self.pos;
        let tag = self.u8("constant tag")?;
        Ok(match tag {
            TAG_INTEGER => Constant::Integer(self.i64("integer constant")?),
            TAG_FLOAT => Constant::Float(f64::from_bits(u64::from_le_bytes(
                self.array("float constant")?,
            ))),
            TAG_STRING => Constant::String(self.string("string constant")?),
            TAG_BOOL => Constant::Bool(self.u8("boolean constant")? != 0),
            TAG_NIL => Constant::Nil,
            TAG_BLOCK => Constant::Block(Rc::new(self.unit(depth + 1)?)),
            TAG_CLASS => Constant::Class(Rc::new(self.class(depth + 1)?)),
            tag => return Err(CodecError::UnknownConstantTag { tag, offset }),
        })
    }

    fn class(&mut self, depth: usize) -> Result<ClassDescriptor, CodecError> {
        self.check_depth(depth)?;

        let name = self.string("class name")?;
        let superclass = match self.u8("superclass flag")? {
            0 => None,
            _ => Some(self.string("superclass name")?),
        };
        let fields = self.strings("field list")?;
        let class_vars = self.strings("class variable list")?;
        let methods = self.methods(depth)?;
        let class_methods = self.methods(depth)?;

        Ok(ClassDescriptor {
            name,
            superclass,
            fields,
            class_vars,
            methods,
            class_methods,
        })
    }

    fn methods(&mut self, depth: usize) -> Result<Vec<MethodDescriptor>, CodecError> {
        // selector length + param count + two unit counts
        let count = self.count(16, "method table")?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let selector = self.string("selector")?;
            let params = self.strings("parameter list")?;
            let body = self.unit(depth + 1)?;
            out.push(MethodDescriptor {
                selector,
                params,
                body: Rc::new(body),
            });
        }
        Ok(out)
    }
}
