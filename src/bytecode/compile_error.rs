use crate::lang::{Expr, Stmt};

/// Errors reported while lowering an AST to bytecode.
///
/// Compilation stops at the first error and no bytecode is produced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// A node the compiler cannot lower in any position.
    #[error("compile error: cannot compile '{node_type}' node{}", hint_suffix(.hint))]
    UnhandledNode {
        node_type: String,
        hint: Option<String>,
    },

    /// A node that's valid but appeared in an invalid position.
    #[error("compile error: {}{reason}{}", name_prefix(.node_type, .name), hint_suffix(.hint))]
    InvalidPosition {
        node_type: String,
        name: Option<String>,
        reason: String,
        hint: Option<String>,
    },

    /// A `| temps |` declaration after other statements in the same body.
    #[error("compile error: declaration of '{name}' must precede all other statements in its body")]
    LateDeclaration { name: String },

    #[error("compile error: cannot assign to '{target}'")]
    InvalidAssignment { target: String },

    #[error("compile error: #{selector} takes {expected} argument(s), given {got}")]
    ArityMismatch {
        selector: String,
        expected: usize,
        got: usize,
    },

    #[error("compile error: #{selector} has {count} arguments (limit 255)")]
    TooManyArguments { selector: String, count: usize },

    #[error("compile error: class '{class}' extends unknown class '{superclass}'")]
    UnknownSuperclass { class: String, superclass: String },

    #[error("compile error: field '{field}' is declared more than once in '{class}'")]
    DuplicateField { class: String, field: String },

    #[error("compile error: constant pool limit exceeded")]
    TooManyConstants,

    /// Internal compiler error (shouldn't happen in normal use)
    #[error("compile error: internal error: {0}")]
    Internal(String),
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(h) => format!("\n  hint: {}", h),
        None => String::new(),
    }
}

fn name_prefix(node_type: &str, name: &Option<String>) -> String {
    match name {
        Some(n) => format!("{} '{}': ", node_type, n),
        None => format!("{}: ", node_type),
    }
}

impl CompileError {
    /// `super` used anywhere but as the receiver of a send.
    pub fn bare_super() -> Self {
        CompileError::UnhandledNode {
            node_type: node_type_name(&Expr::Super).to_string(),
            hint: Some("super can only be used as the receiver of a message".to_string()),
        }
    }

    /// A cascade whose receiver is `super`.
    pub fn super_cascade() -> Self {
        CompileError::InvalidPosition {
            node_type: "cascade".to_string(),
            name: None,
            reason: "super cannot be the receiver of a cascade".to_string(),
            hint: Some("send each message to super separately".to_string()),
        }
    }

    /// A class definition inside a method or block body.
    pub fn class_in_body(name: &str) -> Self {
        CompileError::InvalidPosition {
            node_type: "class".to_string(),
            name: Some(name.to_string()),
            reason: "class definitions cannot appear inside methods or blocks".to_string(),
            hint: Some("define classes at the top level of a program".to_string()),
        }
    }

    pub fn empty_cascade() -> Self {
        CompileError::InvalidPosition {
            node_type: "cascade".to_string(),
            name: None,
            reason: "a cascade needs at least one message".to_string(),
            hint: None,
        }
    }

    /// Create an internal compiler error
    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }
}

/// Extract a human-readable name for an expression node
pub fn node_type_name(expr: &Expr) -> &'static str {
    match expr {
        Expr::Literal(_) => "literal",
        Expr::Variable(_) => "variable",
        Expr::SelfRef => "self",
        Expr::Super => "super",
        Expr::Assign { .. } => "assignment",
        Expr::Send { .. } => "message send",
        Expr::Cascade { .. } => "cascade",
        Expr::Block(_) => "block",
        Expr::Array(_) => "array",
        Expr::Dictionary(_) => "dictionary",
    }
}

/// Extract a human-readable name for a statement node
pub fn stmt_type_name(stmt: &Stmt) -> &'static str {
    match stmt {
        Stmt::Expression(expr) => node_type_name(expr),
        Stmt::Return(_) => "return",
        Stmt::Declare(_) => "declaration",
        Stmt::Class(_) => "class",
    }
}
