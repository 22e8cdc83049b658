use crate::bytecode::{Opcode, VerifyError};

/// What went wrong while executing bytecode.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeErrorKind {
    #[error("{receiver} ({class_name}) does not understand #{selector}")]
    DoesNotUnderstand {
        class_name: String,
        receiver: String,
        selector: String,
    },

    #[error("#{selector} expects {expected} argument(s), got {got}")]
    WrongArgumentCount {
        selector: String,
        expected: usize,
        got: usize,
    },

    #[error("#{selector}: expected {expected}, found {found}")]
    TypeMismatch {
        selector: String,
        expected: &'static str,
        found: String,
    },

    #[error("#{selector}: {reason}")]
    InvalidArgument { selector: String, reason: String },

    #[error("non-local return: home method has already returned")]
    NonLocalReturnExpired,

    #[error("stack underflow")]
    StackUnderflow,

    #[error("operand stack overflow (limit {limit})")]
    StackOverflow { limit: usize },

    #[error("undefined global '{0}'")]
    UndefinedGlobal(String),

    #[error("undefined class variable '{0}'")]
    UndefinedClassVariable(String),

    #[error("class '{class}' extends '{superclass}', which is not a defined class")]
    UnknownSuperclass { class: String, superclass: String },

    #[error("{opcode:?} executed outside of any class")]
    NoEnclosingClass { opcode: Opcode },

    #[error("field access on a receiver that is not an instance ({found})")]
    NotAnInstance { found: String },

    #[error("field index {index} out of range for '{class}' ({count} fields)")]
    FieldOutOfRange {
        class: String,
        index: usize,
        count: usize,
    },

    #[error("index {index} out of bounds (size {size})")]
    IndexOutOfBounds { index: i64, size: usize },

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in #{selector}")]
    IntegerOverflow { selector: String },

    #[error("call depth exceeded (limit {limit})")]
    CallDepthExceeded { limit: usize },

    #[error("step limit exceeded (limit {limit})")]
    StepLimitExceeded { limit: u64 },

    #[error("invalid operand {operand} for {opcode:?}")]
    InvalidOperand { opcode: Opcode, operand: i32 },

    #[error("invalid bytecode: {0}")]
    InvalidBytecode(#[from] VerifyError),

    #[error("reference to a reclaimed context")]
    StaleContext,

    #[error("output error: {0}")]
    Output(String),

    #[error("{0}")]
    UserError(String),

    #[error("no program loaded")]
    NoProgram,
}

/// A runtime error plus the call chain active when it was raised.
///
/// `call_stack` is ordered outermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub call_stack: Vec<String>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error: {}", self.kind)?;

        if !self.call_stack.is_empty() {
            write!(f, "\n  call stack:")?;

            for (i, frame) in self.call_stack.iter().rev().enumerate() {
                write!(f, "\n    {}: {}", i, frame)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind) -> Self {
        RuntimeError {
            kind,
            call_stack: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.call_stack.push(context.to_string());
        self
    }
}

impl From<RuntimeErrorKind> for RuntimeError {
    fn from(kind: RuntimeErrorKind) -> Self {
        RuntimeError::new(kind)
    }
}

impl From<VerifyError> for RuntimeError {
    fn from(err: VerifyError) -> Self {
        RuntimeError::new(RuntimeErrorKind::InvalidBytecode(err))
    }
}

// ─────────────────────────── Constructors ───────────────────────────

pub fn type_mismatch(selector: &str, expected: &'static str, found: &str) -> RuntimeErrorKind {
    RuntimeErrorKind::TypeMismatch {
        selector: selector.to_string(),
        expected,
        found: found.to_string(),
    }
}

pub fn does_not_understand(class_name: &str, receiver: &str, selector: &str) -> RuntimeErrorKind {
    RuntimeErrorKind::DoesNotUnderstand {
        class_name: class_name.to_string(),
        receiver: receiver.to_string(),
        selector: selector.to_string(),
    }
}

pub fn overflow(selector: &str) -> RuntimeErrorKind {
    RuntimeErrorKind::IntegerOverflow {
        selector: selector.to_string(),
    }
}

pub fn invalid_argument(selector: &str, reason: impl Into<String>) -> RuntimeErrorKind {
    RuntimeErrorKind::InvalidArgument {
        selector: selector.to_string(),
        reason: reason.into(),
    }
}
