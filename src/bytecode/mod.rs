//! Bytecode: instruction set, compiler, verifier, disassembler, and the
//! binary file format.

pub mod codec;
pub mod codec_error;
pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod ir;
pub mod op;
pub mod symbols;
pub mod verify;

pub use codec::{decode, encode, read_file, write_file};
pub use codec_error::CodecError;
pub use compile::{Compiler, compile, compile_incremental};
pub use compile_error::CompileError;
pub use ir::{Bytecode, ClassDescriptor, Constant, MethodDescriptor};
pub use op::{Instruction, Opcode};
pub use symbols::{ClassShape, SymbolTable};
pub use verify::{VerifyError, verify};
