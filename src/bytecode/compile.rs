use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::bytecode::compile_error::CompileError;
use crate::bytecode::op::{MAX_PACKED_COUNT, MAX_PACKED_INDEX};
use crate::bytecode::symbols::{ClassShape, SymbolTable};
use crate::bytecode::{Bytecode, ClassDescriptor, Constant, Instruction, MethodDescriptor, Opcode};
use crate::lang::node::selector_arity;
use crate::lang::{Block, ClassDef, Expr, Literal, Message, MethodDef, Program, Stmt};

/// Compile a whole program with a fresh session.
pub fn compile(program: &Program) -> Result<Bytecode, CompileError> {
    let mut symbols = SymbolTable::new();
    compile_incremental(program, &mut symbols)
}

/// Compile one fragment against an existing session.
///
/// Top-level slots continue from where `symbols` left off. The session is
/// only updated when compilation succeeds.
pub fn compile_incremental(
    program: &Program,
    symbols: &mut SymbolTable,
) -> Result<Bytecode, CompileError> {
    let mut compiler = Compiler::with_symbols(symbols.clone());
    let code = compiler.compile_program(program)?;
    *symbols = compiler.into_symbols();
    Ok(code)
}

/// Where a name lives once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolved {
    Local(u32),
    Outer { slot: u32, depth: usize },
    Field(usize),
    ClassVar,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    TopLevel,
    Method,
    Block,
}

/// Instruction stream and constant pool under construction.
#[derive(Debug, Default)]
struct CodeBuilder {
    instructions: Vec<Instruction>,
    constants: Vec<Constant>,
}

impl CodeBuilder {
    fn emit(&mut self, opcode: Opcode, operand: i32) {
        self.instructions.push(Instruction::new(opcode, operand));
    }

    fn emit_bare(&mut self, opcode: Opcode) {
        self.instructions.push(Instruction::bare(opcode));
    }

    fn add_constant(&mut self, constant: Constant) -> Result<usize, CompileError> {
        if let Some(index) = self.constants.iter().position(|c| c.same_literal(&constant)) {
            return Ok(index);
        }
        if self.constants.len() > MAX_PACKED_INDEX {
            return Err(CompileError::TooManyConstants);
        }
        self.constants.push(constant);
        Ok(self.constants.len() - 1)
    }

    fn name(&mut self, name: &str) -> Result<usize, CompileError> {
        self.add_constant(Constant::String(name.to_string()))
    }

    fn finish(self) -> Bytecode {
        Bytecode::with_parts(self.instructions, self.constants)
    }
}

/// One lexical body being compiled: the top level, a method, or a block.
#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    /// Unused for the top level, whose slots live in the session table.
    locals: HashMap<String, u32>,
    next_slot: u32,
    code: CodeBuilder,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            locals: HashMap::new(),
            next_slot: 0,
            code: CodeBuilder::default(),
        }
    }

    fn with_params(kind: ScopeKind, params: &[String]) -> Self {
        let mut scope = Self::new(kind);
        for param in params {
            scope.declare(param);
        }
        scope
    }

    fn declare(&mut self, name: &str) -> u32 {
        if let Some(slot) = self.locals.get(name) {
            return *slot;
        }
        let slot = self.next_slot;
        self.locals.insert(name.to_string(), slot);
        self.next_slot += 1;
        slot
    }
}

/// The class whose methods are being compiled.
#[derive(Debug, Clone)]
struct ClassContext {
    name: String,
    /// Flat field layout, inherited fields first.
    fields: Vec<String>,
    class_side: bool,
}

/// AST → bytecode compiler.
pub struct Compiler {
    symbols: SymbolTable,
    scopes: Vec<Scope>,
    class: Option<ClassContext>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_symbols(SymbolTable::new())
    }

    pub fn with_symbols(symbols: SymbolTable) -> Self {
        Self {
            symbols,
            scopes: Vec::new(),
            class: None,
        }
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn into_symbols(self) -> SymbolTable {
        self.symbols
    }

    /// Compile a program into a top-level unit ending in `Return`.
    pub fn compile_program(&mut self, program: &Program) -> Result<Bytecode, CompileError> {
        self.scopes.clear();
        self.class = None;

        self.scopes.push(Scope::new(ScopeKind::TopLevel));
        let result = self.compile_body(&program.statements);
        let scope = self
            .scopes
            .pop()
            .ok_or_else(|| CompileError::internal("scope stack empty after program"))?;
        result?;

        let code = scope.code.finish();
        debug!(
            instructions = code.instructions.len(),
            constants = code.constants.len(),
            slots = self.symbols.slot_count(),
            "compiled program"
        );
        Ok(code)
    }

    // ───────────────────────────── Bodies ─────────────────────────────

    fn scope(&mut self) -> Result<&mut Scope, CompileError> {
        self.scopes
            .last_mut()
            .ok_or_else(|| CompileError::internal("no active scope"))
    }

    fn code(&mut self) -> Result<&mut CodeBuilder, CompileError> {
        Ok(&mut self.scope()?.code)
    }

    fn scope_kind(&self) -> Result<ScopeKind, CompileError> {
        self.scopes
            .last()
            .map(|s| s.kind)
            .ok_or_else(|| CompileError::internal("no active scope"))
    }

    fn declare(&mut self, name: &str) -> Result<(), CompileError> {
        if is_pseudo_variable(name) {
            return Err(CompileError::InvalidAssignment {
                target: name.to_string(),
            });
        }
        match self.scope_kind()? {
            ScopeKind::TopLevel => {
                self.symbols.declare(name);
            }
            _ => {
                self.scope()?.declare(name);
            }
        }
        Ok(())
    }

    /// Compile a statement list into the current scope, ending with a return.
    ///
    /// Leading `Declare` statements allocate slots. Every other statement but
    /// the last is popped; the last one's value is returned.
    fn compile_body(&mut self, body: &[Stmt]) -> Result<(), CompileError> {
        let mut split = 0;
        for stmt in body {
            match stmt {
                Stmt::Declare(names) => {
                    for name in names {
                        self.declare(name)?;
                    }
                    split += 1;
                }
                _ => break,
            }
        }
        let statements = &body[split..];

        let kind = self.scope_kind()?;

        if statements.is_empty() {
            let code = self.code()?;
            match kind {
                ScopeKind::Method => code.emit_bare(Opcode::PushSelf),
                ScopeKind::TopLevel | ScopeKind::Block => code.emit_bare(Opcode::PushNil),
            }
            code.emit_bare(Opcode::Return);
            return Ok(());
        }

        let last = statements.len() - 1;
        for (i, stmt) in statements.iter().enumerate() {
            match stmt {
                Stmt::Declare(names) => {
                    let name = names.first().cloned().unwrap_or_default();
                    return Err(CompileError::LateDeclaration { name });
                }
                Stmt::Class(def) => {
                    if kind != ScopeKind::TopLevel {
                        return Err(CompileError::class_in_body(&def.name));
                    }
                    self.compile_class(def)?;
                }
                Stmt::Expression(expr) => {
                    self.compile_expr(expr)?;
                }
                Stmt::Return(expr) => {
                    self.compile_expr(expr)?;
                    let opcode = match kind {
                        ScopeKind::Block => Opcode::NonLocalReturn,
                        ScopeKind::Method | ScopeKind::TopLevel => Opcode::Return,
                    };
                    self.code()?.emit_bare(opcode);
                    continue;
                }
            }

            let code = self.code()?;
            if i == last {
                code.emit_bare(Opcode::Return);
            } else {
                code.emit_bare(Opcode::Pop);
            }
        }

        Ok(())
    }

    // ─────────────────────────── Expressions ───────────────────────────

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Literal(literal) => self.compile_literal(literal),

            Expr::Variable(name) => self.compile_load(name),

            Expr::SelfRef => {
                self.code()?.emit_bare(Opcode::PushSelf);
                Ok(())
            }

            Expr::Super => Err(CompileError::bare_super()),

            Expr::Assign { target, value } => {
                if is_pseudo_variable(target) {
                    return Err(CompileError::InvalidAssignment {
                        target: target.clone(),
                    });
                }
                self.compile_expr(value)?;
                self.compile_store(target)
            }

            Expr::Send {
                receiver,
                selector,
                args,
            } => self.compile_send(receiver, selector, args),

            Expr::Cascade { receiver, messages } => self.compile_cascade(receiver, messages),

            Expr::Block(block) => self.compile_block(block),

            Expr::Array(elements) => {
                for element in elements {
                    self.compile_expr(element)?;
                }
                self.code()?.emit(Opcode::MakeArray, elements.len() as i32);
                Ok(())
            }

            Expr::Dictionary(pairs) => {
                for (key, value) in pairs {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                self.code()?.emit(Opcode::MakeDictionary, pairs.len() as i32);
                Ok(())
            }
        }
    }

    fn compile_literal(&mut self, literal: &Literal) -> Result<(), CompileError> {
        let code = self.code()?;
        let constant = match literal {
            Literal::Bool(true) => {
                code.emit_bare(Opcode::PushTrue);
                return Ok(());
            }
            Literal::Bool(false) => {
                code.emit_bare(Opcode::PushFalse);
                return Ok(());
            }
            Literal::Nil => {
                code.emit_bare(Opcode::PushNil);
                return Ok(());
            }
            Literal::Integer(n) => Constant::Integer(*n),
            Literal::Float(n) => Constant::Float(*n),
            Literal::String(s) | Literal::Symbol(s) => Constant::String(s.clone()),
        };
        let index = code.add_constant(constant)?;
        code.emit(Opcode::PushConstant, index as i32);
        Ok(())
    }

    fn compile_load(&mut self, name: &str) -> Result<(), CompileError> {
        match name {
            "self" => return self.compile_expr(&Expr::SelfRef),
            "super" => return Err(CompileError::bare_super()),
            "nil" => return self.compile_literal(&Literal::Nil),
            "true" => return self.compile_literal(&Literal::Bool(true)),
            "false" => return self.compile_literal(&Literal::Bool(false)),
            _ => {}
        }

        let resolved = self.resolve(name)?;
        trace!(name, ?resolved, "load");
        let code = self.code()?;
        match resolved {
            Resolved::Local(slot) => code.emit(Opcode::LoadLocal, slot as i32),
            Resolved::Outer { slot, depth } => {
                code.instructions
                    .push(Instruction::outer(Opcode::LoadOuter, slot as usize, depth))
            }
            Resolved::Field(index) => code.emit(Opcode::LoadField, index as i32),
            Resolved::ClassVar => {
                let index = code.name(name)?;
                code.emit(Opcode::LoadClassVar, index as i32);
            }
            Resolved::Global => {
                let index = code.name(name)?;
                code.emit(Opcode::LoadGlobal, index as i32);
            }
        }
        Ok(())
    }

    fn compile_store(&mut self, name: &str) -> Result<(), CompileError> {
        let resolved = self.resolve(name)?;
        trace!(name, ?resolved, "store");
        let code = self.code()?;
        match resolved {
            Resolved::Local(slot) => code.emit(Opcode::StoreLocal, slot as i32),
            Resolved::Outer { slot, depth } => {
                code.instructions
                    .push(Instruction::outer(Opcode::StoreOuter, slot as usize, depth))
            }
            Resolved::Field(index) => code.emit(Opcode::StoreField, index as i32),
            Resolved::ClassVar => {
                let index = code.name(name)?;
                code.emit(Opcode::StoreClassVar, index as i32);
            }
            Resolved::Global => {
                let index = code.name(name)?;
                code.emit(Opcode::StoreGlobal, index as i32);
            }
        }
        Ok(())
    }

    /// Local first (walking out through enclosing blocks), then instance
    /// field, then class variable, else global.
    fn resolve(&self, name: &str) -> Result<Resolved, CompileError> {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            let slot = match scope.kind {
                ScopeKind::TopLevel => self.symbols.lookup(name),
                ScopeKind::Method | ScopeKind::Block => scope.locals.get(name).copied(),
            };

            if let Some(slot) = slot {
                if depth == 0 {
                    return Ok(Resolved::Local(slot));
                }
                if depth > MAX_PACKED_COUNT {
                    return Err(CompileError::internal("blocks nested too deeply"));
                }
                return Ok(Resolved::Outer { slot, depth });
            }

            // a method body cannot see the top level it was defined in
            if scope.kind != ScopeKind::Block {
                break;
            }
        }

        if let Some(class) = &self.class {
            if !class.class_side {
                if let Some(index) = class.fields.iter().position(|f| f == name) {
                    return Ok(Resolved::Field(index));
                }
            }
            if self.symbols.class_var_visible(&class.name, name) {
                return Ok(Resolved::ClassVar);
            }
        }

        Ok(Resolved::Global)
    }

    fn compile_send(
        &mut self,
        receiver: &Expr,
        selector: &str,
        args: &[Expr],
    ) -> Result<(), CompileError> {
        check_arity(selector, args.len())?;

        let is_super = is_super(receiver);
        if is_super {
            if self.class.is_none() {
                return Err(CompileError::InvalidPosition {
                    node_type: "super".to_string(),
                    name: None,
                    reason: "super is only meaningful inside a method".to_string(),
                    hint: None,
                });
            }
            self.code()?.emit_bare(Opcode::PushSelf);
        } else {
            self.compile_expr(receiver)?;
        }

        for arg in args {
            self.compile_expr(arg)?;
        }

        let code = self.code()?;
        let index = code.name(selector)?;
        let instruction = if is_super {
            Instruction::super_send(index, args.len())
        } else {
            Instruction::send(index, args.len())
        };
        code.instructions.push(instruction);
        Ok(())
    }

    /// Receiver once; each message runs against a duplicate and its result is
    /// dropped, so the receiver is what remains.
    fn compile_cascade(&mut self, receiver: &Expr, messages: &[Message]) -> Result<(), CompileError> {
        if messages.is_empty() {
            return Err(CompileError::empty_cascade());
        }
        if is_super(receiver) {
            return Err(CompileError::super_cascade());
        }

        self.compile_expr(receiver)?;

        for message in messages {
            check_arity(&message.selector, message.args.len())?;
            self.code()?.emit_bare(Opcode::Dup);
            for arg in &message.args {
                self.compile_expr(arg)?;
            }
            let code = self.code()?;
            let index = code.name(&message.selector)?;
            code.instructions
                .push(Instruction::send(index, message.args.len()));
            code.emit_bare(Opcode::Pop);
        }

        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> Result<(), CompileError> {
        if block.params.len() > MAX_PACKED_COUNT {
            return Err(CompileError::TooManyArguments {
                selector: "<block>".to_string(),
                count: block.params.len(),
            });
        }

        self.scopes
            .push(Scope::with_params(ScopeKind::Block, &block.params));
        let result = self.compile_body(&block.body);
        let scope = self
            .scopes
            .pop()
            .ok_or_else(|| CompileError::internal("scope stack empty after block"))?;
        result?;

        let body = Rc::new(scope.code.finish());
        let code = self.code()?;
        let index = code.add_constant(Constant::Block(body))?;
        code.instructions
            .push(Instruction::make_closure(index, block.params.len()));
        Ok(())
    }

    // ───────────────────────────── Classes ─────────────────────────────

    fn compile_class(&mut self, def: &ClassDef) -> Result<(), CompileError> {
        let inherited = match &def.superclass {
            Some(superclass) => self
                .symbols
                .class_shape(superclass)
                .map(|shape| shape.fields.clone())
                .ok_or_else(|| CompileError::UnknownSuperclass {
                    class: def.name.clone(),
                    superclass: superclass.clone(),
                })?,
            None => Vec::new(),
        };

        let mut fields = inherited;
        for field in &def.fields {
            if fields.contains(field) {
                return Err(CompileError::DuplicateField {
                    class: def.name.clone(),
                    field: field.clone(),
                });
            }
            fields.push(field.clone());
        }

        // registered before the bodies so methods can see their own class vars
        self.symbols.define_class(
            &def.name,
            ClassShape {
                superclass: def.superclass.clone(),
                fields: fields.clone(),
                class_vars: def.class_vars.clone(),
            },
        );

        let mut methods = Vec::with_capacity(def.methods.len());
        for method in &def.methods {
            methods.push(self.compile_method(&def.name, &fields, method, false)?);
        }

        let mut class_methods = Vec::with_capacity(def.class_methods.len());
        for method in &def.class_methods {
            class_methods.push(self.compile_method(&def.name, &fields, method, true)?);
        }

        let descriptor = ClassDescriptor {
            name: def.name.clone(),
            superclass: def.superclass.clone(),
            fields: def.fields.clone(),
            class_vars: def.class_vars.clone(),
            methods,
            class_methods,
        };

        debug!(
            class = %def.name,
            fields = fields.len(),
            methods = descriptor.methods.len(),
            class_methods = descriptor.class_methods.len(),
            "compiled class"
        );

        let code = self.code()?;
        let index = code.add_constant(Constant::Class(Rc::new(descriptor)))?;
        code.emit(Opcode::DefineClass, index as i32);
        Ok(())
    }

    fn compile_method(
        &mut self,
        class_name: &str,
        fields: &[String],
        method: &MethodDef,
        class_side: bool,
    ) -> Result<MethodDescriptor, CompileError> {
        check_arity(&method.selector, method.params.len())?;

        let previous = self.class.replace(ClassContext {
            name: class_name.to_string(),
            fields: fields.to_vec(),
            class_side,
        });

        self.scopes
            .push(Scope::with_params(ScopeKind::Method, &method.params));
        let result = self.compile_body(&method.body);
        let scope = self.scopes.pop();
        self.class = previous;
        result?;

        let scope = scope.ok_or_else(|| CompileError::internal("scope stack empty after method"))?;
        Ok(MethodDescriptor {
            selector: method.selector.clone(),
            params: method.params.clone(),
            body: Rc::new(scope.code.finish()),
        })
    }
}

fn is_pseudo_variable(name: &str) -> bool {
    matches!(name, "self" | "super" | "nil" | "true" | "false")
}

fn is_super(expr: &Expr) -> bool {
    match expr {
        Expr::Super => true,
        Expr::Variable(name) => name == "super",
        _ => false,
    }
}

fn check_arity(selector: &str, given: usize) -> Result<(), CompileError> {
    if given > MAX_PACKED_COUNT {
        return Err(CompileError::TooManyArguments {
            selector: selector.to_string(),
            count: given,
        });
    }
    let expected = selector_arity(selector);
    if expected != given {
        return Err(CompileError::ArityMismatch {
            selector: selector.to_string(),
            expected,
            got: given,
        });
    }
    Ok(())
}
