use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::runtime::object::{Class, Closure, Instance};

/// Nesting beyond which printing elides contents, so self-containing
/// collections still print.
const PRINT_DEPTH: usize = 8;

/// A runtime value.
///
/// Immediates and strings are compared by content; every other heap object
/// by identity (see [`Value::identical`]).
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Dictionary(Rc<RefCell<Dictionary>>),
    Block(Rc<Closure>),
    Instance(Rc<Instance>),
    Class(Rc<Class>),
}

impl Value {
    pub fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn dictionary(dict: Dictionary) -> Self {
        Value::Dictionary(Rc::new(RefCell::new(dict)))
    }

    /// Short runtime type tag, as shown by debugger views.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Dictionary(_) => "dictionary",
            Value::Block(_) => "block",
            Value::Instance(_) => "instance",
            Value::Class(_) => "class",
        }
    }

    /// Name of the value's class, as answered by `className`.
    pub fn class_name(&self) -> String {
        match self {
            Value::Nil => "UndefinedObject".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Integer(_) => "Integer".to_string(),
            Value::Float(_) => "Float".to_string(),
            Value::String(_) => "String".to_string(),
            Value::Array(_) => "Array".to_string(),
            Value::Dictionary(_) => "Dictionary".to_string(),
            Value::Block(_) => "Block".to_string(),
            Value::Instance(instance) => instance.class.name.clone(),
            Value::Class(class) => format!("{} class", class.name),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// `==`: same object. Immediates and strings compare by content.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Dictionary(a), Value::Dictionary(b)) => Rc::ptr_eq(a, b),
            (Value::Block(a), Value::Block(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `=`: value equality. Numbers compare across integer and float;
    /// arrays and dictionaries compare element-wise.
    pub fn equals(&self, other: &Value) -> bool {
        self.equals_at(other, 0)
    }

    fn equals_at(&self, other: &Value, depth: usize) -> bool {
        if self.identical(other) {
            return true;
        }
        if depth > PRINT_DEPTH {
            return false;
        }
        match (self, other) {
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                (*a as f64) == *b
            }
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals_at(y, depth + 1))
            }
            (Value::Dictionary(a), Value::Dictionary(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len()
                    && a.iter().all(|(k, v)| match b.get(k) {
                        Some(other) => v.equals_at(other, depth + 1),
                        None => false,
                    })
            }
            _ => false,
        }
    }

    /// Developer-facing rendering: strings are quoted.
    pub fn print_string(&self) -> String {
        let mut out = String::new();
        self.write_printed(&mut out, 0);
        out
    }

    /// User-facing rendering: strings are shown bare.
    pub fn display_string(&self) -> String {
        match self {
            Value::String(s) => s.to_string(),
            other => other.print_string(),
        }
    }

    fn write_printed(&self, out: &mut String, depth: usize) {
        if depth > PRINT_DEPTH {
            out.push_str("...");
            return;
        }
        match self {
            Value::Nil => out.push_str("nil"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Integer(n) => out.push_str(&n.to_string()),
            Value::Float(f) => out.push_str(&format_float(*f)),
            Value::String(s) => {
                out.push('\'');
                out.push_str(&s.replace('\'', "''"));
                out.push('\'');
            }
            Value::Array(items) => {
                out.push_str("#(");
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    item.write_printed(out, depth + 1);
                }
                out.push(')');
            }
            Value::Dictionary(dict) => {
                out.push_str("a Dictionary(");
                for (i, (k, v)) in dict.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    k.write_printed(out, depth + 1);
                    out.push_str("->");
                    v.write_printed(out, depth + 1);
                }
                out.push(')');
            }
            Value::Block(closure) => {
                out.push_str(&format!("a Block/{}", closure.num_params));
            }
            Value::Instance(instance) => {
                out.push_str(article(&instance.class.name));
                out.push(' ');
                out.push_str(&instance.class.name);
            }
            Value::Class(class) => out.push_str(&class.name),
        }
    }
}

fn article(name: &str) -> &'static str {
    match name.chars().next() {
        Some(c) if "AEIOUaeiou".contains(c) => "an",
        _ => "a",
    }
}

/// Floats always show a fractional part so they read back as floats.
fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.identical(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name(), self.print_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

// =============================================================================
// DICTIONARY
// =============================================================================

/// Insertion-ordered map keyed by value equality.
///
/// Lookup is a linear scan; keys can be any value, including ones that have
/// no meaningful hash (floats, arrays).
#[derive(Clone, Default)]
pub struct Dictionary {
    entries: Vec<(Value, Value)>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &Value) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k.equals(key))
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.position(key).map(|i| &self.entries[i].1)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.position(key).is_some()
    }

    /// Insert or replace; an existing key keeps its position.
    pub fn insert(&mut self, key: Value, value: Value) {
        match self.position(&key) {
            Some(i) => self.entries[i].1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        self.position(key).map(|i| self.entries.remove(i).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn pairs(&self) -> Vec<(Value, Value)> {
        self.entries.clone()
    }
}
