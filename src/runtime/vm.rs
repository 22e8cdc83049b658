use std::io::{self, Write};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::bytecode::{
    Bytecode, Constant, Instruction, Opcode, SymbolTable, compile_incremental, verify,
};
use crate::lang::Program;
use crate::lang::node::selector_arity;
use crate::runtime::context::{ContextArena, ContextId};
use crate::runtime::frame::{Frame, FrameId, FrameKind, Resume};
use crate::runtime::globals::Globals;
use crate::runtime::heap::ObjectHeap;
use crate::runtime::iteration::Action;
use crate::runtime::object::{Class, Closure, Instance, Method};
use crate::runtime::primitives::{object_primitive, type_primitive};
use crate::runtime::runtime_error::{
    RuntimeError, RuntimeErrorKind, does_not_understand, type_mismatch,
};
use crate::runtime::value::{Dictionary, Value};

// =============================================================================
// CONFIGURATION
// =============================================================================

#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Frames on the frame stack, blocks run by primitives included.
    pub max_frames: usize,
    /// Instructions per run; `None` is unbounded.
    pub max_steps: Option<u64>,
    /// Operand stack depth of a single frame.
    pub max_stack_depth: usize,
    /// Live context count, or tracked object count, that triggers the first
    /// collection.
    pub gc_threshold: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_frames: 10_000,
            max_steps: None,
            max_stack_depth: 10_000,
            gc_threshold: 1024,
        }
    }
}

impl VmConfig {
    pub fn with_max_frames(mut self, limit: usize) -> Self {
        self.max_frames = limit;
        self
    }

    pub fn with_max_steps(mut self, limit: u64) -> Self {
        self.max_steps = Some(limit);
        self
    }

    pub fn with_max_stack_depth(mut self, limit: usize) -> Self {
        self.max_stack_depth = limit;
        self
    }

    pub fn with_gc_threshold(mut self, threshold: usize) -> Self {
        self.gc_threshold = threshold.max(1);
        self
    }
}

/// Outcome of [`Vm::step`].
#[derive(Debug, Clone, PartialEq)]
pub enum StepState {
    /// More instructions remain.
    Running,
    /// The top-level unit returned this value.
    Finished(Value),
}

// =============================================================================
// VM
// =============================================================================

/// Stack-based interpreter for compiled units.
///
/// Globals and classes persist across runs. Top-level variables persist only
/// for units run in the session (see [`Vm::run_in_session`]); any other unit
/// gets fresh top-level locals.
pub struct Vm {
    config: VmConfig,
    pub(crate) frames: Vec<Frame>,
    pub(crate) contexts: ContextArena,
    heap: ObjectHeap,
    pub(crate) globals: Globals,
    /// Top-level locals shared by session units.
    pub(crate) session_context: ContextId,
    symbols: SymbolTable,
    next_frame: u64,
    steps: u64,
    next_collection: usize,
    next_heap_collection: usize,
    result: Option<Value>,
    out: Box<dyn Write>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let mut contexts = ContextArena::new();
        let session_context = contexts.alloc(None, Vec::new());
        let next_collection = config.gc_threshold;

        Self {
            config,
            frames: Vec::new(),
            contexts,
            heap: ObjectHeap::new(),
            globals: Globals::new(),
            session_context,
            symbols: SymbolTable::new(),
            next_frame: 0,
            steps: 0,
            next_collection,
            next_heap_collection: next_collection,
            result: None,
            out: Box::new(io::stdout()),
        }
    }

    /// Send `print`/`println` output somewhere other than stdout.
    pub fn with_output(mut self, out: impl Write + 'static) -> Self {
        self.out = Box::new(out);
        self
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Instructions executed since the last [`Vm::load`].
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Contexts currently allocated.
    pub fn live_contexts(&self) -> usize {
        self.contexts.live()
    }

    /// Objects that can take part in cycles and are still allocated.
    pub fn live_objects(&self) -> usize {
        self.heap.live()
    }

    /// Run a collection now instead of waiting for the threshold. Returns the
    /// number of contexts and objects reclaimed.
    pub fn collect_garbage(&mut self) -> usize {
        self.collect_contexts() + self.collect_objects()
    }

    // ─────────────────────────── Execution ───────────────────────────

    /// Load and run `code` to completion with fresh top-level locals.
    pub fn run(&mut self, code: Bytecode) -> Result<Value, RuntimeError> {
        self.load(code)?;
        self.finish()
    }

    /// Run a unit compiled with [`compile_incremental`], sharing top-level
    /// locals with earlier session units.
    pub fn run_in_session(&mut self, code: Bytecode) -> Result<Value, RuntimeError> {
        self.load_in_session(code)?;
        self.finish()
    }

    /// Compile `program` against this VM's session symbols and run it.
    ///
    /// Top-level variables and classes carry over between calls.
    pub fn eval(&mut self, program: &Program) -> Result<Value, crate::Error> {
        let code = compile_incremental(program, &mut self.symbols)?;
        Ok(self.run_in_session(code)?)
    }

    /// Verify `code` and prepare it for [`Vm::step`]. Discards any run in
    /// progress.
    pub fn load(&mut self, code: Bytecode) -> Result<(), RuntimeError> {
        verify(&code)?;
        let context = self.contexts.alloc(None, Vec::new());
        self.start(code, context);
        Ok(())
    }

    /// [`Vm::load`] for a session unit.
    pub fn load_in_session(&mut self, code: Bytecode) -> Result<(), RuntimeError> {
        verify(&code)?;
        self.start(code, self.session_context);
        Ok(())
    }

    fn finish(&mut self) -> Result<Value, RuntimeError> {
        loop {
            if let StepState::Finished(value) = self.step()? {
                debug!(steps = self.steps, result = %value.print_string(), "run finished");
                return Ok(value);
            }
        }
    }

    fn start(&mut self, code: Bytecode, context: ContextId) {
        debug!(instructions = code.len(), constants = code.constants.len(), "run start");
        self.frames.clear();
        self.result = None;
        self.steps = 0;

        let id = self.fresh_frame_id();
        self.frames.push(Frame {
            id,
            home: id,
            kind: FrameKind::TopLevel,
            code: Rc::new(code),
            ip: 0,
            stack: Vec::new(),
            context,
            receiver: Value::Nil,
            method_class: None,
            class_side: false,
            label: "<top level>".to_string(),
            resume: Resume::Push,
        });
    }

    /// Execute exactly one instruction.
    ///
    /// After a runtime error the frames stay in place for inspection until
    /// the next [`Vm::load`].
    pub fn step(&mut self) -> Result<StepState, RuntimeError> {
        if self.frames.is_empty() {
            return match &self.result {
                Some(value) => Ok(StepState::Finished(value.clone())),
                None => Err(RuntimeErrorKind::NoProgram.into()),
            };
        }

        self.execute_step().map_err(|kind| self.error_with_context(kind))
    }

    fn error_with_context(&self, kind: RuntimeErrorKind) -> RuntimeError {
        self.frames
            .iter()
            .fold(RuntimeError::new(kind), |err, frame| {
                err.with_context(&format!("{} @{}", frame.label, frame.ip.saturating_sub(1)))
            })
    }

    fn fresh_frame_id(&mut self) -> FrameId {
        self.next_frame += 1;
        FrameId(self.next_frame)
    }

    fn execute_step(&mut self) -> Result<StepState, RuntimeErrorKind> {
        self.steps += 1;
        if let Some(limit) = self.config.max_steps {
            if self.steps > limit {
                return Err(RuntimeErrorKind::StepLimitExceeded { limit });
            }
        }

        if self.contexts.live() >= self.next_collection {
            self.collect_contexts();
        }
        if self.heap.len() >= self.next_heap_collection {
            self.collect_contexts();
            self.collect_objects();
        }

        let frame = self.frames.last_mut().ok_or(RuntimeErrorKind::NoProgram)?;
        let Some(instruction) = frame.code.instructions.get(frame.ip).copied() else {
            // running off the end is an implicit return of the top of stack
            let value = frame.stack.pop().unwrap_or(Value::Nil);
            return self.complete_frame(value);
        };
        frame.ip += 1;

        trace!(ip = frame.ip - 1, frame = %frame.label, %instruction, "exec");
        self.execute(instruction)
    }

    // ─────────────────────────── Frame helpers ───────────────────────────

    fn frame(&self) -> Result<&Frame, RuntimeErrorKind> {
        self.frames.last().ok_or(RuntimeErrorKind::NoProgram)
    }

    fn frame_mut(&mut self) -> Result<&mut Frame, RuntimeErrorKind> {
        self.frames.last_mut().ok_or(RuntimeErrorKind::NoProgram)
    }

    fn push(&mut self, value: Value) -> Result<(), RuntimeErrorKind> {
        let limit = self.config.max_stack_depth;
        let frame = self.frame_mut()?;
        if frame.stack.len() >= limit {
            return Err(RuntimeErrorKind::StackOverflow { limit });
        }
        frame.stack.push(value);
        Ok(())
    }

    /// Push a value that may be a new heap object.
    fn push_tracked(&mut self, value: Value) -> Result<(), RuntimeErrorKind> {
        self.heap.track(&value);
        self.push(value)
    }

    fn pop(&mut self) -> Result<Value, RuntimeErrorKind> {
        self.frame_mut()?
            .stack
            .pop()
            .ok_or(RuntimeErrorKind::StackUnderflow)
    }

    fn peek(&self) -> Result<Value, RuntimeErrorKind> {
        self.frame()?
            .stack
            .last()
            .cloned()
            .ok_or(RuntimeErrorKind::StackUnderflow)
    }

    /// Pop the top `count` values, oldest first.
    fn pop_n(&mut self, count: usize) -> Result<Vec<Value>, RuntimeErrorKind> {
        let frame = self.frame_mut()?;
        if frame.stack.len() < count {
            return Err(RuntimeErrorKind::StackUnderflow);
        }
        let at = frame.stack.len() - count;
        Ok(frame.stack.split_off(at))
    }

    fn name_operand(&self, instruction: Instruction) -> Result<String, RuntimeErrorKind> {
        self.frame()?
            .code
            .name(instruction.operand as usize)
            .map(str::to_string)
            .ok_or(RuntimeErrorKind::InvalidOperand {
                opcode: instruction.opcode,
                operand: instruction.operand,
            })
    }

    fn constant_operand(&self, index: usize) -> Result<Constant, RuntimeErrorKind> {
        self.frame()?
            .code
            .constant(index)
            .cloned()
            .ok_or(RuntimeErrorKind::InvalidOperand {
                opcode: Opcode::PushConstant,
                operand: index as i32,
            })
    }

    // ─────────────────────────── Dispatch loop ───────────────────────────

    fn execute(&mut self, instruction: Instruction) -> Result<StepState, RuntimeErrorKind> {
        let operand = instruction.operand;
        let invalid = || RuntimeErrorKind::InvalidOperand {
            opcode: instruction.opcode,
            operand,
        };

        match instruction.opcode {
            // ─────────────────────────── Stack ───────────────────────────
            Opcode::PushConstant => {
                let value = match self.constant_operand(operand as usize)? {
                    Constant::Integer(n) => Value::Integer(n),
                    Constant::Float(f) => Value::Float(f),
                    Constant::String(s) => Value::string(&s),
                    Constant::Bool(b) => Value::Bool(b),
                    Constant::Nil => Value::Nil,
                    Constant::Block(_) | Constant::Class(_) => return Err(invalid()),
                };
                self.push(value)?;
            }
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Dup => {
                let value = self.peek()?;
                self.push(value)?;
            }

            // ─────────────────────────── Variables ───────────────────────────
            Opcode::LoadLocal => {
                let context = self.frame()?.context;
                let value = self.contexts.load(context, operand as usize)?;
                self.push(value)?;
            }
            Opcode::StoreLocal => {
                let value = self.peek()?;
                let context = self.frame()?.context;
                self.contexts.store(context, operand as usize, value)?;
            }
            Opcode::LoadOuter | Opcode::StoreOuter => {
                let (slot, depth) = Instruction::unpack(operand);
                let context = self.frame()?.context;
                let target = self.contexts.resolve(context, depth)?.ok_or_else(invalid)?;

                if instruction.opcode == Opcode::LoadOuter {
                    let value = self.contexts.load(target, slot)?;
                    self.push(value)?;
                } else {
                    let value = self.peek()?;
                    self.contexts.store(target, slot, value)?;
                }
            }
            Opcode::LoadField | Opcode::StoreField => {
                let index = operand as usize;
                let Value::Instance(instance) = self.frame()?.receiver.clone() else {
                    let found = self.frame()?.receiver.class_name();
                    return Err(RuntimeErrorKind::NotAnInstance { found });
                };
                let out_of_range = || RuntimeErrorKind::FieldOutOfRange {
                    class: instance.class.name.clone(),
                    index,
                    count: instance.class.field_count(),
                };

                if instruction.opcode == Opcode::LoadField {
                    let value = instance.field(index).ok_or_else(out_of_range)?;
                    self.push(value)?;
                } else {
                    let value = self.peek()?;
                    if !instance.set_field(index, value) {
                        return Err(out_of_range());
                    }
                }
            }
            Opcode::LoadClassVar | Opcode::StoreClassVar => {
                let name = self.name_operand(instruction)?;
                let class = self.frame()?.method_class.clone().ok_or(
                    RuntimeErrorKind::NoEnclosingClass {
                        opcode: instruction.opcode,
                    },
                )?;

                if instruction.opcode == Opcode::LoadClassVar {
                    let value = class
                        .class_var(&name)
                        .ok_or(RuntimeErrorKind::UndefinedClassVariable(name))?;
                    self.push(value)?;
                } else {
                    let value = self.peek()?;
                    if !class.set_class_var(&name, value) {
                        return Err(RuntimeErrorKind::UndefinedClassVariable(name));
                    }
                }
            }
            Opcode::LoadGlobal => {
                let name = self.name_operand(instruction)?;
                let value = self
                    .globals
                    .get(&name)
                    .cloned()
                    .ok_or(RuntimeErrorKind::UndefinedGlobal(name))?;
                self.push(value)?;
            }
            Opcode::StoreGlobal => {
                let name = self.name_operand(instruction)?;
                let value = self.peek()?;
                self.globals.set(&name, value);
            }

            // ─────────────────────────── Sends ───────────────────────────
            Opcode::Send | Opcode::SuperSend => {
                let (index, argc) = Instruction::unpack(operand);
                let selector = self.frame()?.code.name(index).ok_or_else(invalid)?.to_string();
                let args = self.pop_n(argc)?;
                let receiver = self.pop()?;

                return if instruction.opcode == Opcode::SuperSend {
                    self.super_send(receiver, &selector, args)
                } else {
                    self.send(receiver, &selector, args)
                };
            }

            // ─────────────────────────── Jumps ───────────────────────────
            Opcode::Jump => {
                self.frame_mut()?.ip = operand as usize;
            }
            Opcode::JumpIfFalse => match self.pop()? {
                Value::Bool(false) => self.frame_mut()?.ip = operand as usize,
                Value::Bool(true) => {}
                other => {
                    return Err(type_mismatch("conditional jump", "boolean", &other.class_name()));
                }
            },

            // ─────────────────────────── Literals ───────────────────────────
            Opcode::PushSelf => {
                let receiver = self.frame()?.receiver.clone();
                self.push(receiver)?;
            }
            Opcode::PushNil => self.push(Value::Nil)?,
            Opcode::PushTrue => self.push(Value::Bool(true))?,
            Opcode::PushFalse => self.push(Value::Bool(false))?,

            // ─────────────────────────── Construction ───────────────────────────
            Opcode::NewInstance => match self.pop()? {
                Value::Class(class) => {
                    self.push_tracked(Value::Instance(Rc::new(Instance::new(class))))?
                }
                other => return Err(type_mismatch("new", "class", &other.class_name())),
            },
            Opcode::DefineClass => {
                let Constant::Class(descriptor) = self.constant_operand(operand as usize)? else {
                    return Err(invalid());
                };
                let superclass = match &descriptor.superclass {
                    Some(name) => Some(self.globals.class(name).ok_or_else(|| {
                        RuntimeErrorKind::UnknownSuperclass {
                            class: descriptor.name.clone(),
                            superclass: name.clone(),
                        }
                    })?),
                    None => None,
                };

                let class = Rc::new(Class::from_descriptor(&descriptor, superclass));
                debug!(
                    class = %class.name,
                    superclass = ?descriptor.superclass,
                    fields = class.field_count(),
                    "defined class"
                );
                self.globals.define_class(class.clone());
                self.push_tracked(Value::Class(class))?;
            }
            Opcode::MakeClosure => {
                let (index, num_params) = Instruction::unpack(operand);
                let Some(Constant::Block(body)) = self.frame()?.code.constant(index).cloned() else {
                    return Err(invalid());
                };
                let frame = self.frame()?;
                let origin = match frame.kind {
                    FrameKind::Block => frame
                        .label
                        .strip_prefix("[] in ")
                        .unwrap_or(&frame.label)
                        .to_string(),
                    FrameKind::Method | FrameKind::TopLevel => frame.label.clone(),
                };
                let closure = Closure {
                    body,
                    num_params,
                    outer: frame.context,
                    receiver: frame.receiver.clone(),
                    method_class: frame.method_class.clone(),
                    class_side: frame.class_side,
                    home: frame.home,
                    origin,
                };
                self.push_tracked(Value::Block(Rc::new(closure)))?;
            }
            Opcode::MakeArray => {
                let items = self.pop_n(operand as usize)?;
                self.push_tracked(Value::array(items))?;
            }
            Opcode::MakeDictionary => {
                let flat = self.pop_n(operand as usize * 2)?;
                let mut dict = Dictionary::new();
                let mut iter = flat.into_iter();
                while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
                    dict.insert(key, value);
                }
                self.push_tracked(Value::dictionary(dict))?;
            }

            // ─────────────────────────── Returns ───────────────────────────
            Opcode::Return => {
                let value = self.pop()?;
                return self.complete_frame(value);
            }
            Opcode::NonLocalReturn => {
                let value = self.pop()?;
                let frame = self.frame()?;
                if frame.kind != FrameKind::Block {
                    return self.complete_frame(value);
                }

                let home = frame.home;
                let position = self
                    .frames
                    .iter()
                    .rposition(|f| f.id == home)
                    .ok_or(RuntimeErrorKind::NonLocalReturnExpired)?;

                trace!(
                    home = home.0,
                    unwound = self.frames.len() - position - 1,
                    "non-local return"
                );
                self.frames.truncate(position + 1);
                return self.complete_frame(value);
            }
        }

        Ok(StepState::Running)
    }

    // ─────────────────────────── Messages ───────────────────────────

    fn send(
        &mut self,
        receiver: Value,
        selector: &str,
        args: Vec<Value>,
    ) -> Result<StepState, RuntimeErrorKind> {
        check_send_arity(selector, args.len())?;
        trace!(receiver = %receiver.class_name(), selector, "send");

        if let Some(action) = type_primitive(&receiver, selector, &args)? {
            return self.perform(action);
        }

        let found = match &receiver {
            Value::Instance(instance) => instance
                .class
                .lookup(selector, false)
                .map(|(owner, method)| (owner, method, false)),
            Value::Class(class) => class
                .lookup(selector, true)
                .map(|(owner, method)| (owner, method, true)),
            _ => None,
        };
        if let Some((owner, method, class_side)) = found {
            return self.invoke_method(receiver, owner, method, args, class_side);
        }

        self.fallback(receiver, selector, args)
    }

    /// Lookup starts in the superclass of the class defining the running
    /// method; `self` is unchanged.
    fn super_send(
        &mut self,
        receiver: Value,
        selector: &str,
        args: Vec<Value>,
    ) -> Result<StepState, RuntimeErrorKind> {
        check_send_arity(selector, args.len())?;

        let frame = self.frame()?;
        let class_side = frame.class_side;
        let class = frame
            .method_class
            .clone()
            .ok_or(RuntimeErrorKind::NoEnclosingClass {
                opcode: Opcode::SuperSend,
            })?;
        trace!(class = %class.name, selector, "super send");

        let found = class
            .superclass
            .as_ref()
            .and_then(|parent| parent.lookup(selector, class_side));
        if let Some((owner, method)) = found {
            return self.invoke_method(receiver, owner, method, args, class_side);
        }

        self.fallback(receiver, selector, args)
    }

    /// Universal protocol, then "does not understand".
    fn fallback(
        &mut self,
        receiver: Value,
        selector: &str,
        args: Vec<Value>,
    ) -> Result<StepState, RuntimeErrorKind> {
        match object_primitive(&receiver, selector, &args, &mut *self.out)? {
            Some(action) => self.perform(action),
            None => Err(does_not_understand(
                &receiver.class_name(),
                &receiver.print_string(),
                selector,
            )),
        }
    }

    fn perform(&mut self, action: Action) -> Result<StepState, RuntimeErrorKind> {
        match action {
            Action::Return(value) => {
                self.push_tracked(value)?;
                Ok(StepState::Running)
            }
            Action::Call {
                block,
                args,
                resume,
            } => self.invoke_block(block, args, resume),
        }
    }

    fn check_depth(&self) -> Result<(), RuntimeErrorKind> {
        if self.frames.len() >= self.config.max_frames {
            return Err(RuntimeErrorKind::CallDepthExceeded {
                limit: self.config.max_frames,
            });
        }
        Ok(())
    }

    fn invoke_method(
        &mut self,
        receiver: Value,
        owner: Rc<Class>,
        method: Rc<Method>,
        args: Vec<Value>,
        class_side: bool,
    ) -> Result<StepState, RuntimeErrorKind> {
        self.check_depth()?;

        let label = if class_side {
            format!("{} class>>{}", owner.name, method.selector)
        } else {
            format!("{}>>{}", owner.name, method.selector)
        };
        let context = self.contexts.alloc(None, args);
        let id = self.fresh_frame_id();

        self.frames.push(Frame {
            id,
            home: id,
            kind: FrameKind::Method,
            code: method.body.clone(),
            ip: 0,
            stack: Vec::new(),
            context,
            receiver,
            method_class: Some(owner),
            class_side,
            label,
            resume: Resume::Push,
        });
        Ok(StepState::Running)
    }

    fn invoke_block(
        &mut self,
        block: Rc<Closure>,
        args: Vec<Value>,
        resume: Resume,
    ) -> Result<StepState, RuntimeErrorKind> {
        if args.len() != block.num_params {
            return Err(RuntimeErrorKind::WrongArgumentCount {
                selector: value_selector(args.len()),
                expected: block.num_params,
                got: args.len(),
            });
        }
        self.check_depth()?;

        let context = self.contexts.alloc(Some(block.outer), args);
        let id = self.fresh_frame_id();

        self.frames.push(Frame {
            id,
            home: block.home,
            kind: FrameKind::Block,
            code: block.body.clone(),
            ip: 0,
            stack: Vec::new(),
            context,
            receiver: block.receiver.clone(),
            method_class: block.method_class.clone(),
            class_side: block.class_side,
            label: format!("[] in {}", block.origin),
            resume,
        });
        Ok(StepState::Running)
    }

    /// Pop the current frame and hand `value` to whoever is waiting on it.
    fn complete_frame(&mut self, value: Value) -> Result<StepState, RuntimeErrorKind> {
        let frame = self.frames.pop().ok_or(RuntimeErrorKind::NoProgram)?;

        if self.frames.is_empty() {
            self.result = Some(value.clone());
            return Ok(StepState::Finished(value));
        }

        match frame.resume {
            Resume::Push => {
                self.push(value)?;
                Ok(StepState::Running)
            }
            Resume::Iterate(iteration) => {
                let action = iteration.resume(value)?;
                self.perform(action)
            }
        }
    }

    // ─────────────────────────── Collection ───────────────────────────

    fn collect_contexts(&mut self) -> usize {
        let mut roots = vec![self.session_context];
        let mut values = Vec::new();
        for frame in &self.frames {
            roots.push(frame.context);
            frame.roots(&mut values);
        }
        values.extend(self.globals.values().cloned());
        if let Some(result) = &self.result {
            values.push(result.clone());
        }

        let freed = self.contexts.collect(&roots, values);
        self.next_collection = (self.contexts.live() * 2).max(self.config.gc_threshold);
        freed
    }

    /// Run after [`Vm::collect_contexts`], so values held only by dead
    /// contexts no longer count as references from outside the heap.
    fn collect_objects(&mut self) -> usize {
        let cleared = self.heap.collect();
        self.next_heap_collection = (self.heap.len() * 2).max(self.config.gc_threshold);
        cleared
    }
}

impl Drop for Vm {
    /// Reclaim cycles among objects the VM created. Values the host still
    /// holds keep everything they reach.
    fn drop(&mut self) {
        self.frames.clear();
        self.result = None;
        self.contexts = ContextArena::new();
        self.globals = Globals::new();
        self.heap.collect();
    }
}

fn check_send_arity(selector: &str, got: usize) -> Result<(), RuntimeErrorKind> {
    let expected = selector_arity(selector);
    if expected != got {
        return Err(RuntimeErrorKind::WrongArgumentCount {
            selector: selector.to_string(),
            expected,
            got,
        });
    }
    Ok(())
}

/// `value`, `value:`, `value:value:`, ...
fn value_selector(argc: usize) -> String {
    if argc == 0 {
        "value".to_string()
    } else {
        "value:".repeat(argc)
    }
}
