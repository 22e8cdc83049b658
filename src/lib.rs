//! Smog: a small object-message language.
//!
//! The crate takes a parsed [`lang::Program`] through the [`bytecode`]
//! compiler to a [`bytecode::Bytecode`] unit, which the [`runtime::Vm`]
//! executes. Units can be persisted with [`bytecode::encode`] and
//! [`bytecode::decode`].

pub mod bytecode;
pub mod lang;
pub mod runtime;
#[cfg(test)]
mod test_utils;

pub use bytecode::{Bytecode, CodecError, CompileError, compile, compile_incremental};
pub use lang::Program;
pub use runtime::{RuntimeError, Value, Vm, VmConfig};

/// Any failure on the way from a program to its value.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
