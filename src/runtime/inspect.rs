//! Read-only views of a paused or failed VM, for debuggers and the REPL.
//!
//! Values are rendered with `printString` so the views serialize without
//! exposing the object graph.

use serde::{Serialize, Serializer};

use crate::bytecode::Instruction;
use crate::runtime::frame::FrameKind;
use crate::runtime::value::Value;
use crate::runtime::vm::Vm;

fn printed<S: Serializer>(value: &Value, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.print_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackEntry {
    #[serde(serialize_with = "printed")]
    pub value: Value,
    pub type_name: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalEntry {
    pub slot: usize,
    #[serde(serialize_with = "printed")]
    pub value: Value,
    pub type_name: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalEntry {
    pub name: String,
    #[serde(serialize_with = "printed")]
    pub value: Value,
    pub type_name: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameInfo {
    pub label: String,
    pub ip: usize,
    pub kind: FrameKind,
}

impl Vm {
    /// Operand stack of the current frame, top first.
    pub fn stack(&self) -> Vec<StackEntry> {
        let Some(frame) = self.frames.last() else {
            return Vec::new();
        };
        frame
            .stack
            .iter()
            .rev()
            .map(|value| StackEntry {
                value: value.clone(),
                type_name: value.type_name(),
            })
            .collect()
    }

    /// Local slots of the current frame, or of the session top level when idle.
    pub fn locals(&self) -> Vec<LocalEntry> {
        let context = self
            .frames
            .last()
            .map(|frame| frame.context)
            .unwrap_or(self.session_context);

        match self.contexts.get(context) {
            Ok(context) => context
                .locals
                .iter()
                .enumerate()
                .map(|(slot, value)| LocalEntry {
                    slot,
                    value: value.clone(),
                    type_name: value.type_name(),
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Every global, sorted by name.
    pub fn globals(&self) -> Vec<GlobalEntry> {
        self.globals
            .entries()
            .into_iter()
            .map(|(name, value)| GlobalEntry {
                name: name.to_string(),
                value: value.clone(),
                type_name: value.type_name(),
            })
            .collect()
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    /// Active frames, innermost first.
    pub fn call_stack(&self) -> Vec<FrameInfo> {
        self.frames
            .iter()
            .rev()
            .map(|frame| FrameInfo {
                label: frame.label.clone(),
                ip: frame.ip,
                kind: frame.kind,
            })
            .collect()
    }

    /// The instruction the next [`Vm::step`] will execute.
    pub fn current_instruction(&self) -> Option<(usize, Instruction)> {
        let frame = self.frames.last()?;
        frame
            .code
            .instructions
            .get(frame.ip)
            .map(|instruction| (frame.ip, *instruction))
    }
}
