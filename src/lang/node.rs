use super::literal::Literal;

/// Expression node.
///
/// Every expression leaves exactly one value on the operand stack once
/// compiled.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // ───────────────────────────── Literals ─────────────────────────────
    /// Literal constant.
    Literal(Literal),

    // ───────────────────────────── Variables ────────────────────────────
    /// Named variable: local, instance field, class variable or global,
    /// resolved in that order.
    Variable(String),

    /// The receiver of the running method.
    SelfRef,

    /// `super`. Only valid as the receiver of a message send.
    Super,

    /// Assignment: `name := value`. Evaluates to the assigned value.
    Assign {
        /// Variable being assigned.
        target: String,
        /// Value expression.
        value: Box<Expr>,
    },

    // ───────────────────────────── Messages ─────────────────────────────
    /// Message send: `receiver selector args...`.
    Send {
        /// Receiver expression (evaluated first).
        receiver: Box<Expr>,
        /// Full selector, e.g. `at:put:`.
        selector: String,
        /// Arguments, left to right.
        args: Vec<Expr>,
    },

    /// Cascade: `receiver m1; m2; m3`. Evaluates to the receiver.
    Cascade {
        /// Receiver shared by every message.
        receiver: Box<Expr>,
        /// Messages sent in order.
        messages: Vec<Message>,
    },

    // ──────────────────────────── Construction ──────────────────────────
    /// Block literal: `[:a :b | | t | ... ]`.
    Block(Block),

    /// Dynamic array: `{ a. b. c }`.
    Array(Vec<Expr>),

    /// Dictionary literal as a list of key/value expression pairs.
    Dictionary(Vec<(Expr, Expr)>),
}

/// One message inside a cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub selector: String,
    pub args: Vec<Expr>,
}

/// Block literal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    /// Parameter names, in order.
    pub params: Vec<String>,
    /// Body statements. Temporaries are leading [`Stmt::Declare`] entries.
    pub body: Vec<Stmt>,
}

/// Statement node.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Expression evaluated for its value (or side effects).
    Expression(Expr),

    /// Return: `^ expr`. Inside a block this returns from the home method.
    Return(Expr),

    /// Temporary declaration: `| a b |`. Must precede other statements.
    Declare(Vec<String>),

    /// Class definition. Only valid at the top level of a program.
    Class(ClassDef),
}

/// Class definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassDef {
    pub name: String,
    /// `None` makes a new root class.
    pub superclass: Option<String>,
    /// Own instance fields, in order.
    pub fields: Vec<String>,
    /// Class variables declared by this class.
    pub class_vars: Vec<String>,
    /// Instance-side methods.
    pub methods: Vec<MethodDef>,
    /// Class-side methods.
    pub class_methods: Vec<MethodDef>,
}

/// Method definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodDef {
    pub selector: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

// ─────────────────────────── Constructors ───────────────────────────

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::Literal(Literal::Integer(value))
    }

    pub fn float(value: f64) -> Self {
        Expr::Literal(Literal::Float(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(value.into()))
    }

    pub fn symbol(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::Symbol(value.into()))
    }

    pub fn bool(value: bool) -> Self {
        Expr::Literal(Literal::Bool(value))
    }

    pub fn nil() -> Self {
        Expr::Literal(Literal::Nil)
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Variable(name.into())
    }

    pub fn assign(target: impl Into<String>, value: Expr) -> Self {
        Expr::Assign {
            target: target.into(),
            value: Box::new(value),
        }
    }

    /// Generic send.
    pub fn send(receiver: Expr, selector: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Send {
            receiver: Box::new(receiver),
            selector: selector.into(),
            args,
        }
    }

    /// Unary send: `receiver selector`.
    pub fn unary(receiver: Expr, selector: impl Into<String>) -> Self {
        Self::send(receiver, selector, Vec::new())
    }

    /// Binary send: `receiver op arg`.
    pub fn binary(receiver: Expr, op: impl Into<String>, arg: Expr) -> Self {
        Self::send(receiver, op, vec![arg])
    }

    pub fn cascade(receiver: Expr, messages: Vec<Message>) -> Self {
        Expr::Cascade {
            receiver: Box::new(receiver),
            messages,
        }
    }

    pub fn block(params: &[&str], body: Vec<Stmt>) -> Self {
        Expr::Block(Block {
            params: params.iter().map(|p| p.to_string()).collect(),
            body,
        })
    }
}

impl Message {
    pub fn new(selector: impl Into<String>, args: Vec<Expr>) -> Self {
        Self {
            selector: selector.into(),
            args,
        }
    }
}

impl Stmt {
    pub fn expr(expr: Expr) -> Self {
        Stmt::Expression(expr)
    }

    pub fn ret(expr: Expr) -> Self {
        Stmt::Return(expr)
    }

    pub fn declare(names: &[&str]) -> Self {
        Stmt::Declare(names.iter().map(|n| n.to_string()).collect())
    }
}

impl MethodDef {
    pub fn new(selector: impl Into<String>, params: &[&str], body: Vec<Stmt>) -> Self {
        Self {
            selector: selector.into(),
            params: params.iter().map(|p| p.to_string()).collect(),
            body,
        }
    }
}

impl ClassDef {
    pub fn new(name: impl Into<String>, superclass: Option<&str>) -> Self {
        Self {
            name: name.into(),
            superclass: superclass.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_class_vars(mut self, vars: &[&str]) -> Self {
        self.class_vars = vars.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn with_method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    pub fn with_class_method(mut self, method: MethodDef) -> Self {
        self.class_methods.push(method);
        self
    }
}

/// Number of arguments a selector takes.
///
/// Keyword selectors take one argument per colon, binary selectors (made of
/// operator characters) take one, everything else is unary.
pub fn selector_arity(selector: &str) -> usize {
    let colons = selector.chars().filter(|c| *c == ':').count();
    if colons > 0 {
        return colons;
    }

    match selector.chars().next() {
        Some(c) if c.is_alphabetic() || c == '_' => 0,
        Some(_) => 1,
        None => 0,
    }
}
