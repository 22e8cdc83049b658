/// Literal value as written in source.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// 64-bit signed integer.
    Integer(i64),

    /// 64-bit floating-point number.
    Float(f64),

    /// UTF-8 string: `'hello'`.
    String(String),

    /// Symbol: `#foo`. Symbols compile to string constants.
    Symbol(String),

    /// Boolean value.
    Bool(bool),

    /// `nil`.
    Nil,
}

impl std::fmt::Display for Literal {
    /// Format a literal using Smog surface syntax.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Integer(n) => write!(f, "{}", n),
            Literal::Float(n) => write!(f, "{:?}", n),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Symbol(s) => write!(f, "#{}", s),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Nil => write!(f, "nil"),
        }
    }
}
