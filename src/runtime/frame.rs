use std::rc::Rc;

use serde::Serialize;

use crate::bytecode::Bytecode;
use crate::runtime::context::ContextId;
use crate::runtime::iteration::Iteration;
use crate::runtime::object::Class;
use crate::runtime::value::Value;

/// Identity of one activation. Never reused within a VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FrameId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameKind {
    TopLevel,
    Method,
    Block,
}

/// What happens to a frame's result when it completes.
#[derive(Debug)]
pub enum Resume {
    /// Push it onto the caller's operand stack.
    Push,
    /// Feed it to a primitive's pending iteration.
    Iterate(Iteration),
}

/// One activation record on the VM's frame stack.
#[derive(Debug)]
pub struct Frame {
    pub id: FrameId,
    /// Target of `^`: the frame itself for methods and the top level, the
    /// creating method's activation for blocks.
    pub home: FrameId,
    pub kind: FrameKind,
    pub code: Rc<Bytecode>,
    pub ip: usize,
    pub stack: Vec<Value>,
    pub context: ContextId,
    pub receiver: Value,
    /// Class that defines the running method (`None` at the top level).
    pub method_class: Option<Rc<Class>>,
    pub class_side: bool,
    pub label: String,
    pub resume: Resume,
}

impl Frame {
    /// Every value this frame keeps alive, for context collection.
    pub fn roots(&self, out: &mut Vec<Value>) {
        out.extend(self.stack.iter().cloned());
        out.push(self.receiver.clone());
        if let Some(class) = &self.method_class {
            out.push(Value::Class(class.clone()));
        }
        if let Resume::Iterate(iteration) = &self.resume {
            iteration.roots(out);
        }
    }
}
