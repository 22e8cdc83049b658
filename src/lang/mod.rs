//! # Smog Abstract Syntax Tree
//!
//! This module defines the tree the front end hands to the bytecode compiler.
//! The parser itself lives outside this crate; everything here is plain data
//! plus a few constructors that keep hand-built trees (tests, embedders)
//! readable.
//!
//! ## Conventions
//!
//! - Selectors are stored exactly as written: `foo`, `+`, `at:put:`.
//! - Keyword arguments are stored in selector order.
//! - `self`, `super`, `nil`, `true` and `false` may arrive either as their
//!   dedicated variants or as plain [`Expr::Variable`] names; the compiler
//!   treats both the same way.

pub mod literal;
pub mod node;
pub mod program;

pub use literal::Literal;
pub use node::{Block, ClassDef, Expr, Message, MethodDef, Stmt};
pub use program::Program;
