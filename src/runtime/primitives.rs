//! Built-in behaviour of the primitive types and the universal object
//! protocol.
//!
//! Every primitive answers `Ok(None)` for a selector it does not implement so
//! dispatch can fall through to the next stage.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use crate::runtime::iteration::{Action, Counter, Iteration, Phase, evaluate};
use crate::runtime::object::{Closure, Instance};
use crate::runtime::runtime_error::{
    RuntimeErrorKind, invalid_argument, overflow, type_mismatch,
};
use crate::runtime::value::{Dictionary, Value};

type PrimResult = Result<Option<Action>, RuntimeErrorKind>;

pub const NUMBER_SELECTORS: &[&str] = &[
    "+", "-", "*", "/", "//", "\\\\", "rem:", "<", ">", "<=", ">=", "max:", "min:",
    "between:and:", "negated", "abs", "sqrt", "squared", "isZero", "even", "odd", "asFloat",
    "asInteger", "floor", "ceiling", "rounded", "truncated", "raisedTo:", "to:", "to:do:",
    "to:by:do:", "timesRepeat:",
];

pub const STRING_SELECTORS: &[&str] = &[
    ",", "size", "at:", "isEmpty", "notEmpty", "reversed", "asUppercase", "asLowercase",
    "asString", "asSymbol", "asInteger", "includesSubstring:", "copyFrom:to:", "do:", "<", ">",
    "<=", ">=",
];

pub const BOOLEAN_SELECTORS: &[&str] = &[
    "not", "&", "|", "and:", "or:", "xor:", "ifTrue:", "ifFalse:", "ifTrue:ifFalse:",
    "ifFalse:ifTrue:",
];

pub const BLOCK_SELECTORS: &[&str] = &[
    "value", "value:", "value:value:", "value:value:value:", "value:value:value:value:",
    "valueWithArguments:", "numArgs", "whileTrue:", "whileFalse:", "whileTrue", "whileFalse",
    "repeat",
];

pub const ARRAY_SELECTORS: &[&str] = &[
    "size", "at:", "at:put:", "first", "last", "isEmpty", "notEmpty", "includes:", "indexOf:",
    "add:", ",", "reversed", "do:", "collect:", "select:", "reject:", "detect:",
    "detect:ifNone:", "inject:into:", "keysAndValuesDo:",
];

pub const DICTIONARY_SELECTORS: &[&str] = &[
    "size", "at:", "at:put:", "at:ifAbsent:", "includesKey:", "removeKey:", "keys", "values",
    "isEmpty", "notEmpty", "do:", "keysDo:", "keysAndValuesDo:",
];

pub const OBJECT_SELECTORS: &[&str] = &[
    "==", "~~", "=", "~=", "isNil", "notNil", "ifNil:", "ifNotNil:", "ifNil:ifNotNil:",
    "ifNotNil:ifNil:", "printString", "displayString", "println", "print", "yourself",
    "className", "class", "respondsTo:", "error:", "isKindOf:", "isMemberOf:", "isString",
    "isNumber", "isBlock", "isClass",
];

pub const CLASS_SELECTORS: &[&str] = &["new", "basicNew", "name", "superclass"];

fn ret(value: Value) -> PrimResult {
    Ok(Some(Action::Return(value)))
}

fn start(iteration: Iteration) -> PrimResult {
    iteration.start().map(Some)
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Primitives of the built-in value types. Instances, classes and nil have
/// none; they go through method lookup and the object protocol instead.
pub fn type_primitive(receiver: &Value, selector: &str, args: &[Value]) -> PrimResult {
    match receiver {
        Value::Integer(_) | Value::Float(_) => number(receiver, selector, args),
        Value::String(s) => string(receiver, s, selector, args),
        Value::Bool(b) => boolean(*b, selector, args),
        Value::Block(block) => block_primitive(block, selector, args),
        Value::Array(items) => array(receiver, items, selector, args),
        Value::Dictionary(dict) => dictionary(receiver, dict, selector, args),
        Value::Nil | Value::Instance(_) | Value::Class(_) => Ok(None),
    }
}

/// Protocol every value understands, plus instantiation for classes.
pub fn object_primitive(
    receiver: &Value,
    selector: &str,
    args: &[Value],
    out: &mut dyn Write,
) -> PrimResult {
    match selector {
        "==" => ret(Value::Bool(receiver.identical(&args[0]))),
        "~~" => ret(Value::Bool(!receiver.identical(&args[0]))),
        "=" => ret(Value::Bool(receiver.equals(&args[0]))),
        "~=" => ret(Value::Bool(!receiver.equals(&args[0]))),

        "isNil" => ret(Value::Bool(receiver.is_nil())),
        "notNil" => ret(Value::Bool(!receiver.is_nil())),
        "ifNil:" => Ok(Some(if receiver.is_nil() {
            evaluate(&args[0])
        } else {
            Action::Return(receiver.clone())
        })),
        "ifNotNil:" => Ok(Some(if receiver.is_nil() {
            Action::Return(Value::Nil)
        } else {
            evaluate_with(&args[0], receiver)
        })),
        "ifNil:ifNotNil:" => Ok(Some(if receiver.is_nil() {
            evaluate(&args[0])
        } else {
            evaluate_with(&args[1], receiver)
        })),
        "ifNotNil:ifNil:" => Ok(Some(if receiver.is_nil() {
            evaluate(&args[1])
        } else {
            evaluate_with(&args[0], receiver)
        })),

        "printString" => ret(Value::string(&receiver.print_string())),
        "displayString" => ret(Value::string(&receiver.display_string())),
        "println" => {
            writeln!(out, "{}", receiver.display_string())
                .map_err(|e| RuntimeErrorKind::Output(e.to_string()))?;
            ret(receiver.clone())
        }
        "print" => {
            write!(out, "{}", receiver.display_string())
                .map_err(|e| RuntimeErrorKind::Output(e.to_string()))?;
            ret(receiver.clone())
        }
        "yourself" => ret(receiver.clone()),
        "className" => ret(Value::string(&receiver.class_name())),
        "class" => ret(match receiver {
            Value::Instance(instance) => Value::Class(instance.class.clone()),
            Value::Class(class) => Value::Class(class.clone()),
            other => Value::string(&other.class_name()),
        }),
        "respondsTo:" => match &args[0] {
            Value::String(s) => ret(Value::Bool(responds_to(receiver, s))),
            other => Err(type_mismatch(selector, "selector string", &other.class_name())),
        },
        "error:" => Err(RuntimeErrorKind::UserError(args[0].display_string())),

        "isKindOf:" | "isMemberOf:" => {
            let Value::Class(class) = &args[0] else {
                return Err(type_mismatch(selector, "class", &args[0].class_name()));
            };
            let answer = match receiver {
                Value::Instance(instance) if selector == "isKindOf:" => {
                    instance.class.inherits_from(class)
                }
                Value::Instance(instance) => Rc::ptr_eq(&instance.class, class),
                _ => false,
            };
            ret(Value::Bool(answer))
        }

        "isString" => ret(Value::Bool(matches!(receiver, Value::String(_)))),
        "isNumber" => ret(Value::Bool(matches!(
            receiver,
            Value::Integer(_) | Value::Float(_)
        ))),
        "isBlock" => ret(Value::Bool(matches!(receiver, Value::Block(_)))),
        "isClass" => ret(Value::Bool(matches!(receiver, Value::Class(_)))),

        _ => match receiver {
            Value::Class(class) => match selector {
                "new" | "basicNew" => ret(Value::Instance(Rc::new(Instance::new(class.clone())))),
                "name" => ret(Value::string(&class.name)),
                "superclass" => ret(match &class.superclass {
                    Some(superclass) => Value::Class(superclass.clone()),
                    None => Value::Nil,
                }),
                _ => Ok(None),
            },
            _ => Ok(None),
        },
    }
}

/// Whether a send of `selector` to `receiver` would be understood.
pub fn responds_to(receiver: &Value, selector: &str) -> bool {
    let by_method = match receiver {
        Value::Instance(instance) => instance.class.lookup(selector, false).is_some(),
        Value::Class(class) => class.lookup(selector, true).is_some(),
        _ => false,
    };
    let by_type: &[&str] = match receiver {
        Value::Integer(_) | Value::Float(_) => NUMBER_SELECTORS,
        Value::String(_) => STRING_SELECTORS,
        Value::Bool(_) => BOOLEAN_SELECTORS,
        Value::Block(_) => BLOCK_SELECTORS,
        Value::Array(_) => ARRAY_SELECTORS,
        Value::Dictionary(_) => DICTIONARY_SELECTORS,
        Value::Class(_) => CLASS_SELECTORS,
        Value::Nil | Value::Instance(_) => &[],
    };
    by_method || by_type.contains(&selector) || OBJECT_SELECTORS.contains(&selector)
}

/// Like [`evaluate`], passing `arg` when the block takes one argument.
fn evaluate_with(value: &Value, arg: &Value) -> Action {
    match value {
        Value::Block(block) if block.num_params == 1 => {
            Action::call(block.clone(), vec![arg.clone()])
        }
        other => evaluate(other),
    }
}

// ─────────────────────────── Argument helpers ───────────────────────────

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        match value {
            Value::Integer(n) => Some(Num::Int(*n)),
            Value::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(f) => f,
        }
    }
}

fn num_arg(selector: &str, value: &Value) -> Result<Num, RuntimeErrorKind> {
    Num::of(value).ok_or_else(|| type_mismatch(selector, "number", &value.class_name()))
}

fn int_arg(selector: &str, value: &Value) -> Result<i64, RuntimeErrorKind> {
    match value {
        Value::Integer(n) => Ok(*n),
        other => Err(type_mismatch(selector, "integer", &other.class_name())),
    }
}

fn str_arg<'a>(selector: &str, value: &'a Value) -> Result<&'a str, RuntimeErrorKind> {
    match value {
        Value::String(s) => Ok(&**s),
        other => Err(type_mismatch(selector, "string", &other.class_name())),
    }
}

fn bool_arg(selector: &str, value: &Value) -> Result<bool, RuntimeErrorKind> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(type_mismatch(selector, "boolean", &other.class_name())),
    }
}

fn block_arg(selector: &str, value: &Value) -> Result<Rc<Closure>, RuntimeErrorKind> {
    match value {
        Value::Block(block) => Ok(block.clone()),
        other => Err(type_mismatch(selector, "block", &other.class_name())),
    }
}

fn array_arg(selector: &str, value: &Value) -> Result<Vec<Value>, RuntimeErrorKind> {
    match value {
        Value::Array(items) => Ok(items.borrow().clone()),
        other => Err(type_mismatch(selector, "array", &other.class_name())),
    }
}

/// 1-based index → 0-based, checked against `size`.
fn index_arg(selector: &str, value: &Value, size: usize) -> Result<usize, RuntimeErrorKind> {
    let index = int_arg(selector, value)?;
    if index < 1 || index as u64 > size as u64 {
        return Err(RuntimeErrorKind::IndexOutOfBounds { index, size });
    }
    Ok((index - 1) as usize)
}

fn float_to_int(selector: &str, f: f64) -> Result<i64, RuntimeErrorKind> {
    // i64::MAX as f64 rounds up to 2^63, hence the strict bound
    if !f.is_finite() || f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return Err(overflow(selector));
    }
    Ok(f as i64)
}

// =============================================================================
// NUMBERS
// =============================================================================

fn number(receiver: &Value, selector: &str, args: &[Value]) -> PrimResult {
    let Some(n) = Num::of(receiver) else {
        return Ok(None);
    };

    match selector {
        "+" | "-" | "*" | "/" | "//" | "\\\\" | "rem:" => {
            ret(arithmetic(selector, n, num_arg(selector, &args[0])?)?)
        }
        "<" | ">" | "<=" | ">=" => {
            let a = n.as_f64();
            let b = num_arg(selector, &args[0])?;
            let answer = match (n, b) {
                (Num::Int(x), Num::Int(y)) => compare(selector, x.cmp(&y)),
                _ => match a.partial_cmp(&b.as_f64()) {
                    Some(ordering) => compare(selector, ordering),
                    None => false,
                },
            };
            ret(Value::Bool(answer))
        }
        "max:" | "min:" => {
            let other = num_arg(selector, &args[0])?;
            let a_less = match (n, other) {
                (Num::Int(x), Num::Int(y)) => x < y,
                _ => n.as_f64() < other.as_f64(),
            };
            let pick_other = if selector == "max:" { a_less } else { !a_less };
            ret(if pick_other {
                args[0].clone()
            } else {
                receiver.clone()
            })
        }
        "between:and:" => {
            let low = num_arg(selector, &args[0])?.as_f64();
            let high = num_arg(selector, &args[1])?.as_f64();
            let x = n.as_f64();
            ret(Value::Bool(low <= x && x <= high))
        }

        "negated" => ret(match n {
            Num::Int(x) => Value::Integer(x.checked_neg().ok_or_else(|| overflow(selector))?),
            Num::Float(f) => Value::Float(-f),
        }),
        "abs" => ret(match n {
            Num::Int(x) => Value::Integer(x.checked_abs().ok_or_else(|| overflow(selector))?),
            Num::Float(f) => Value::Float(f.abs()),
        }),
        "squared" => ret(arithmetic("*", n, n)?),
        "sqrt" => ret(Value::Float(n.as_f64().sqrt())),
        "isZero" => ret(Value::Bool(n.as_f64() == 0.0)),
        "even" | "odd" => {
            let x = int_arg(selector, receiver)?;
            let even = x % 2 == 0;
            ret(Value::Bool(if selector == "even" { even } else { !even }))
        }
        "asFloat" => ret(Value::Float(n.as_f64())),
        "asInteger" | "truncated" | "floor" | "ceiling" | "rounded" => match n {
            Num::Int(_) => ret(receiver.clone()),
            Num::Float(f) => {
                let f = match selector {
                    "floor" => f.floor(),
                    "ceiling" => f.ceil(),
                    "rounded" => f.round(),
                    _ => f.trunc(),
                };
                ret(Value::Integer(float_to_int(selector, f)?))
            }
        },
        "raisedTo:" => {
            let exponent = num_arg(selector, &args[0])?;
            ret(match (n, exponent) {
                (Num::Int(base), Num::Int(exp)) if exp >= 0 => {
                    let exp = u32::try_from(exp).map_err(|_| overflow(selector))?;
                    Value::Integer(base.checked_pow(exp).ok_or_else(|| overflow(selector))?)
                }
                _ => Value::Float(n.as_f64().powf(exponent.as_f64())),
            })
        }

        "to:" => {
            let from = int_arg(selector, receiver)?;
            let to = int_arg(selector, &args[0])?;
            let items: Vec<Value> = if from <= to {
                (from..=to).map(Value::Integer).collect()
            } else {
                Vec::new()
            };
            ret(Value::array(items))
        }
        "to:do:" | "to:by:do:" => {
            let stop = num_arg(selector, &args[0])?;
            let (step, body) = if selector == "to:do:" {
                (Num::Int(1), block_arg(selector, &args[1])?)
            } else {
                (num_arg(selector, &args[1])?, block_arg(selector, &args[2])?)
            };
            if step.as_f64() == 0.0 {
                return Err(invalid_argument(selector, "step must not be zero"));
            }
            let counter = match (n, stop, step) {
                (Num::Int(next), Num::Int(stop), Num::Int(step)) => Counter::Int {
                    next,
                    stop,
                    step,
                    exhausted: false,
                },
                _ => Counter::Float {
                    next: n.as_f64(),
                    stop: stop.as_f64(),
                    step: step.as_f64(),
                },
            };
            start(Iteration::Count {
                body,
                counter,
                receiver: receiver.clone(),
            })
        }
        "timesRepeat:" => start(Iteration::TimesRepeat {
            body: block_arg(selector, &args[0])?,
            remaining: int_arg(selector, receiver)?,
            receiver: receiver.clone(),
        }),

        _ => Ok(None),
    }
}

fn compare(selector: &str, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match selector {
        "<" => ordering == Less,
        ">" => ordering == Greater,
        "<=" => ordering != Greater,
        ">=" => ordering != Less,
        _ => false,
    }
}

/// Integer pairs stay integral and are overflow-checked; anything involving
/// a float is computed in floating point.
fn arithmetic(selector: &str, a: Num, b: Num) -> Result<Value, RuntimeErrorKind> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => {
            if matches!(selector, "/" | "//" | "\\\\" | "rem:") && y == 0 {
                return Err(RuntimeErrorKind::DivisionByZero);
            }
            let result = match selector {
                "+" => x.checked_add(y),
                "-" => x.checked_sub(y),
                "*" => x.checked_mul(y),
                "/" => x.checked_div(y),
                "rem:" => x.checked_rem(y),
                "//" => floor_div(x, y),
                "\\\\" => floor_mod(x, y),
                _ => None,
            };
            result.map(Value::Integer).ok_or_else(|| overflow(selector))
        }
        _ => {
            let (x, y) = (a.as_f64(), b.as_f64());
            if matches!(selector, "/" | "//" | "\\\\" | "rem:") && y == 0.0 {
                return Err(RuntimeErrorKind::DivisionByZero);
            }
            Ok(Value::Float(match selector {
                "+" => x + y,
                "-" => x - y,
                "*" => x * y,
                "/" => x / y,
                "//" => (x / y).floor(),
                "\\\\" => x - (x / y).floor() * y,
                _ => x % y,
            }))
        }
    }
}

fn floor_div(x: i64, y: i64) -> Option<i64> {
    let q = x.checked_div(y)?;
    if x % y != 0 && ((x < 0) != (y < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn floor_mod(x: i64, y: i64) -> Option<i64> {
    let r = x.checked_rem(y)?;
    if r != 0 && ((r < 0) != (y < 0)) {
        r.checked_add(y)
    } else {
        Some(r)
    }
}

// =============================================================================
// STRINGS
// =============================================================================

fn string(receiver: &Value, s: &Rc<str>, selector: &str, args: &[Value]) -> PrimResult {
    match selector {
        "," => {
            let other = str_arg(selector, &args[0])?;
            let mut joined = String::with_capacity(s.len() + other.len());
            joined.push_str(s);
            joined.push_str(other);
            ret(Value::string(&joined))
        }
        "size" => ret(Value::Integer(s.chars().count() as i64)),
        "at:" => {
            let chars: Vec<char> = s.chars().collect();
            let index = index_arg(selector, &args[0], chars.len())?;
            ret(Value::string(&chars[index].to_string()))
        }
        "isEmpty" => ret(Value::Bool(s.is_empty())),
        "notEmpty" => ret(Value::Bool(!s.is_empty())),
        "reversed" => ret(Value::string(&s.chars().rev().collect::<String>())),
        "asUppercase" => ret(Value::string(&s.to_uppercase())),
        "asLowercase" => ret(Value::string(&s.to_lowercase())),
        "asString" | "asSymbol" => ret(receiver.clone()),
        "asInteger" => ret(match s.trim().parse::<i64>() {
            Ok(n) => Value::Integer(n),
            Err(_) => Value::Nil,
        }),
        "includesSubstring:" => ret(Value::Bool(s.contains(str_arg(selector, &args[0])?))),
        "copyFrom:to:" => {
            let chars: Vec<char> = s.chars().collect();
            let from = int_arg(selector, &args[0])?;
            let to = int_arg(selector, &args[1])?;
            if from < 1 || to > chars.len() as i64 || from > to + 1 {
                return Err(RuntimeErrorKind::IndexOutOfBounds {
                    index: if from < 1 { from } else { to },
                    size: chars.len(),
                });
            }
            let slice: String = chars[(from - 1) as usize..to as usize].iter().collect();
            ret(Value::string(&slice))
        }
        "do:" => start(Iteration::Each {
            body: block_arg(selector, &args[0])?,
            items: s.chars().map(|c| Value::string(&c.to_string())).collect(),
            index: 0,
            receiver: receiver.clone(),
        }),
        "<" | ">" | "<=" | ">=" => {
            let other = str_arg(selector, &args[0])?;
            ret(Value::Bool(compare(selector, (**s).cmp(other))))
        }
        _ => Ok(None),
    }
}

// =============================================================================
// BOOLEANS
// =============================================================================

fn boolean(b: bool, selector: &str, args: &[Value]) -> PrimResult {
    match selector {
        "not" => ret(Value::Bool(!b)),
        "&" => ret(Value::Bool(b & bool_arg(selector, &args[0])?)),
        "|" => ret(Value::Bool(b | bool_arg(selector, &args[0])?)),
        "xor:" => ret(Value::Bool(b ^ bool_arg(selector, &args[0])?)),
        "and:" => Ok(Some(if b {
            evaluate(&args[0])
        } else {
            Action::Return(Value::Bool(false))
        })),
        "or:" => Ok(Some(if b {
            Action::Return(Value::Bool(true))
        } else {
            evaluate(&args[0])
        })),
        "ifTrue:" => Ok(Some(if b {
            evaluate(&args[0])
        } else {
            Action::Return(Value::Nil)
        })),
        "ifFalse:" => Ok(Some(if b {
            Action::Return(Value::Nil)
        } else {
            evaluate(&args[0])
        })),
        "ifTrue:ifFalse:" => Ok(Some(evaluate(if b { &args[0] } else { &args[1] }))),
        "ifFalse:ifTrue:" => Ok(Some(evaluate(if b { &args[1] } else { &args[0] }))),
        _ => Ok(None),
    }
}

// =============================================================================
// BLOCKS
// =============================================================================

fn block_primitive(block: &Rc<Closure>, selector: &str, args: &[Value]) -> PrimResult {
    let (continue_on, body, selector) = match selector {
        "value" | "value:" | "value:value:" | "value:value:value:" | "value:value:value:value:" => {
            return Ok(Some(Action::call(block.clone(), args.to_vec())));
        }
        "valueWithArguments:" => {
            return Ok(Some(Action::call(block.clone(), array_arg(selector, &args[0])?)));
        }
        "numArgs" => return ret(Value::Integer(block.num_params as i64)),
        "repeat" => return start(Iteration::Repeat { body: block.clone() }),
        "whileTrue:" => (true, Some(block_arg(selector, &args[0])?), "whileTrue:"),
        "whileFalse:" => (false, Some(block_arg(selector, &args[0])?), "whileFalse:"),
        "whileTrue" => (true, None, "whileTrue"),
        "whileFalse" => (false, None, "whileFalse"),
        _ => return Ok(None),
    };

    start(Iteration::While {
        condition: block.clone(),
        body,
        continue_on,
        selector,
        awaiting: Phase::Condition,
    })
}

// =============================================================================
// ARRAYS
// =============================================================================

fn array(
    receiver: &Value,
    items: &Rc<RefCell<Vec<Value>>>,
    selector: &str,
    args: &[Value],
) -> PrimResult {
    let size = items.borrow().len();

    match selector {
        "size" => ret(Value::Integer(size as i64)),
        "at:" => {
            let index = index_arg(selector, &args[0], size)?;
            ret(items.borrow()[index].clone())
        }
        "at:put:" => {
            let index = index_arg(selector, &args[0], size)?;
            items.borrow_mut()[index] = args[1].clone();
            ret(args[1].clone())
        }
        "first" | "last" => {
            let items = items.borrow();
            let item = if selector == "first" {
                items.first()
            } else {
                items.last()
            };
            item.cloned()
                .map(|v| Some(Action::Return(v)))
                .ok_or(RuntimeErrorKind::IndexOutOfBounds { index: 1, size: 0 })
        }
        "isEmpty" => ret(Value::Bool(size == 0)),
        "notEmpty" => ret(Value::Bool(size != 0)),
        "includes:" => ret(Value::Bool(items.borrow().iter().any(|v| v.equals(&args[0])))),
        "indexOf:" => {
            let position = items.borrow().iter().position(|v| v.equals(&args[0]));
            ret(Value::Integer(position.map(|i| i as i64 + 1).unwrap_or(0)))
        }
        "add:" => {
            items.borrow_mut().push(args[0].clone());
            ret(args[0].clone())
        }
        "," => {
            let mut joined = items.borrow().clone();
            joined.extend(array_arg(selector, &args[0])?);
            ret(Value::array(joined))
        }
        "reversed" => ret(Value::array(items.borrow().iter().rev().cloned().collect())),

        "do:" => start(Iteration::Each {
            body: block_arg(selector, &args[0])?,
            items: items.borrow().clone(),
            index: 0,
            receiver: receiver.clone(),
        }),
        "keysAndValuesDo:" => start(Iteration::EachPair {
            body: block_arg(selector, &args[0])?,
            pairs: items
                .borrow()
                .iter()
                .enumerate()
                .map(|(i, v)| (Value::Integer(i as i64 + 1), v.clone()))
                .collect(),
            index: 0,
            receiver: receiver.clone(),
        }),
        "collect:" => start(Iteration::Collect {
            body: block_arg(selector, &args[0])?,
            items: items.borrow().clone(),
            index: 0,
            results: Vec::with_capacity(size),
        }),
        "select:" | "reject:" => start(Iteration::Filter {
            body: block_arg(selector, &args[0])?,
            items: items.borrow().clone(),
            index: 0,
            keep: selector == "select:",
            results: Vec::new(),
            selector: if selector == "select:" {
                "select:"
            } else {
                "reject:"
            },
        }),
        "detect:" | "detect:ifNone:" => start(Iteration::Detect {
            body: block_arg(selector, &args[0])?,
            items: items.borrow().clone(),
            index: 0,
            if_none: args.get(1).cloned(),
        }),
        "inject:into:" => start(Iteration::Fold {
            body: block_arg(selector, &args[1])?,
            items: items.borrow().clone(),
            index: 0,
            acc: args[0].clone(),
        }),
        _ => Ok(None),
    }
}

// =============================================================================
// DICTIONARIES
// =============================================================================

fn dictionary(
    receiver: &Value,
    dict: &Rc<RefCell<Dictionary>>,
    selector: &str,
    args: &[Value],
) -> PrimResult {
    match selector {
        "size" => ret(Value::Integer(dict.borrow().len() as i64)),
        "at:" => match dict.borrow().get(&args[0]) {
            Some(value) => ret(value.clone()),
            None => Err(RuntimeErrorKind::KeyNotFound(args[0].print_string())),
        },
        "at:put:" => {
            dict.borrow_mut().insert(args[0].clone(), args[1].clone());
            ret(args[1].clone())
        }
        "at:ifAbsent:" => {
            let found = dict.borrow().get(&args[0]).cloned();
            Ok(Some(match found {
                Some(value) => Action::Return(value),
                None => evaluate(&args[1]),
            }))
        }
        "includesKey:" => ret(Value::Bool(dict.borrow().contains_key(&args[0]))),
        "removeKey:" => {
            let removed = dict.borrow_mut().remove(&args[0]);
            match removed {
                Some(value) => ret(value),
                None => Err(RuntimeErrorKind::KeyNotFound(args[0].print_string())),
            }
        }
        "keys" => ret(Value::array(dict.borrow().keys())),
        "values" => ret(Value::array(dict.borrow().values())),
        "isEmpty" => ret(Value::Bool(dict.borrow().is_empty())),
        "notEmpty" => ret(Value::Bool(!dict.borrow().is_empty())),
        "do:" | "keysDo:" => {
            let items = if selector == "do:" {
                dict.borrow().values()
            } else {
                dict.borrow().keys()
            };
            start(Iteration::Each {
                body: block_arg(selector, &args[0])?,
                items,
                index: 0,
                receiver: receiver.clone(),
            })
        }
        "keysAndValuesDo:" => start(Iteration::EachPair {
            body: block_arg(selector, &args[0])?,
            pairs: dict.borrow().pairs(),
            index: 0,
            receiver: receiver.clone(),
        }),
        _ => Ok(None),
    }
}
