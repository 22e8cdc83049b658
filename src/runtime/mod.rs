//! # Smog Runtime
//!
//! The virtual machine and the object model it operates on.
//!
//! ## Layout
//!
//! - [`vm`]: fetch/execute loop over a flat frame stack, message dispatch.
//! - [`primitives`]: built-in behaviour of numbers, strings, collections,
//!   booleans and blocks, plus the protocol every value understands.
//! - [`iteration`]: resumable state for primitives that run blocks.
//! - [`context`]: arena of local-variable contexts shared with closures.
//! - [`heap`]: cycle collection for instances, collections and blocks.
//! - [`object`], [`value`]: classes, instances, closures and values.
//! - [`inspect`]: serializable views for debuggers.

pub mod context;
pub mod frame;
pub mod globals;
pub mod heap;
pub mod inspect;
pub mod iteration;
pub mod object;
pub mod primitives;
pub mod runtime_error;
pub mod value;
pub mod vm;

pub use frame::{FrameId, FrameKind};
pub use inspect::{FrameInfo, GlobalEntry, LocalEntry, StackEntry};
pub use object::{Class, Closure, Instance, Method};
pub use runtime_error::{RuntimeError, RuntimeErrorKind};
pub use value::{Dictionary, Value};
pub use vm::{StepState, Vm, VmConfig};
