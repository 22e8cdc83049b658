use super::node::Stmt;

/// Parsed Smog program (or one REPL fragment).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    /// Top-level statements, executed in order.
    pub statements: Vec<Stmt>,
}

impl Program {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements }
    }
}
