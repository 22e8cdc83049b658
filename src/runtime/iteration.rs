//! Resumable state machines for control-flow primitives.
//!
//! A primitive such as `whileTrue:` or `collect:` never calls a block
//! recursively. It returns [`Action::Call`] with the block to run and the
//! iteration state to resume; the VM runs the block as an ordinary frame and
//! hands its result back to [`Iteration::resume`]. Single-stepping, call
//! depth limits and non-local return therefore see primitive-driven blocks
//! exactly like any other frame.

use std::rc::Rc;

use crate::runtime::frame::Resume;
use crate::runtime::object::Closure;
use crate::runtime::runtime_error::{RuntimeErrorKind, type_mismatch};
use crate::runtime::value::Value;

/// Result of a primitive send.
#[derive(Debug)]
pub enum Action {
    /// The send's value is ready.
    Return(Value),
    /// Run `block` with `args`; `resume` decides what its result becomes.
    Call {
        block: Rc<Closure>,
        args: Vec<Value>,
        resume: Resume,
    },
}

impl Action {
    /// Tail-call `block`: its result is the result of the send.
    pub fn call(block: Rc<Closure>, args: Vec<Value>) -> Self {
        Action::Call {
            block,
            args,
            resume: Resume::Push,
        }
    }
}

/// Which block a `while` loop is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Condition,
    Body,
}

/// Numeric progression for `to:do:` and `to:by:do:`.
#[derive(Debug, Clone, Copy)]
pub enum Counter {
    Int {
        next: i64,
        stop: i64,
        step: i64,
        exhausted: bool,
    },
    Float {
        next: f64,
        stop: f64,
        step: f64,
    },
}

impl Counter {
    fn advance(&mut self) -> Option<Value> {
        match self {
            Counter::Int {
                next,
                stop,
                step,
                exhausted,
            } => {
                let in_range = if *step > 0 { *next <= *stop } else { *next >= *stop };
                if *exhausted || !in_range {
                    return None;
                }
                let current = *next;
                match next.checked_add(*step) {
                    Some(n) => *next = n,
                    None => *exhausted = true,
                }
                Some(Value::Integer(current))
            }
            Counter::Float { next, stop, step } => {
                let in_range = if *step > 0.0 { *next <= *stop } else { *next >= *stop };
                if !in_range {
                    return None;
                }
                let current = *next;
                *next += *step;
                Some(Value::Float(current))
            }
        }
    }
}

/// Pending state of a control-flow primitive.
#[derive(Debug)]
pub enum Iteration {
    /// `whileTrue:` / `whileFalse:` and their unary forms.
    While {
        condition: Rc<Closure>,
        body: Option<Rc<Closure>>,
        continue_on: bool,
        selector: &'static str,
        awaiting: Phase,
    },
    /// `repeat`: ends only through `^` or an error.
    Repeat { body: Rc<Closure> },
    TimesRepeat {
        body: Rc<Closure>,
        remaining: i64,
        receiver: Value,
    },
    Count {
        body: Rc<Closure>,
        counter: Counter,
        receiver: Value,
    },
    /// `do:`, `keysDo:`.
    Each {
        body: Rc<Closure>,
        items: Vec<Value>,
        index: usize,
        receiver: Value,
    },
    /// `keysAndValuesDo:`.
    EachPair {
        body: Rc<Closure>,
        pairs: Vec<(Value, Value)>,
        index: usize,
        receiver: Value,
    },
    Collect {
        body: Rc<Closure>,
        items: Vec<Value>,
        index: usize,
        results: Vec<Value>,
    },
    /// `select:` keeps items the block answers true for, `reject:` false.
    Filter {
        body: Rc<Closure>,
        items: Vec<Value>,
        index: usize,
        keep: bool,
        results: Vec<Value>,
        selector: &'static str,
    },
    /// `inject:into:`.
    Fold {
        body: Rc<Closure>,
        items: Vec<Value>,
        index: usize,
        acc: Value,
    },
    /// `detect:` / `detect:ifNone:`.
    Detect {
        body: Rc<Closure>,
        items: Vec<Value>,
        index: usize,
        if_none: Option<Value>,
    },
}

fn call(block: &Rc<Closure>, args: Vec<Value>, state: Iteration) -> Action {
    Action::Call {
        block: block.clone(),
        args,
        resume: Resume::Iterate(state),
    }
}

fn expect_bool(selector: &str, value: &Value) -> Result<bool, RuntimeErrorKind> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(type_mismatch(selector, "boolean", &other.class_name())),
    }
}

/// Evaluate a block argument with no arguments, or answer a non-block as is.
pub fn evaluate(value: &Value) -> Action {
    match value {
        Value::Block(block) => Action::call(block.clone(), vec![]),
        other => Action::Return(other.clone()),
    }
}

impl Iteration {
    /// Run the first step.
    pub fn start(self) -> Result<Action, RuntimeErrorKind> {
        self.advance(None)
    }

    /// Continue after the last block call answered `value`.
    pub fn resume(self, value: Value) -> Result<Action, RuntimeErrorKind> {
        self.advance(Some(value))
    }

    fn advance(self, last: Option<Value>) -> Result<Action, RuntimeErrorKind> {
        match self {
            Iteration::While {
                condition,
                body,
                continue_on,
                selector,
                awaiting,
            } => {
                let go_on = match (awaiting, &last) {
                    (Phase::Condition, Some(value)) => Some(expect_bool(selector, value)? == continue_on),
                    _ => None,
                };

                match (go_on, body.clone()) {
                    (Some(false), _) => Ok(Action::Return(Value::Nil)),
                    (Some(true), Some(next)) => {
                        let state = Iteration::While {
                            condition,
                            body,
                            continue_on,
                            selector,
                            awaiting: Phase::Body,
                        };
                        Ok(call(&next, vec![], state))
                    }
                    // start, after the body, or a unary loop with no body
                    _ => {
                        let next = condition.clone();
                        let state = Iteration::While {
                            condition,
                            body,
                            continue_on,
                            selector,
                            awaiting: Phase::Condition,
                        };
                        Ok(call(&next, vec![], state))
                    }
                }
            }

            Iteration::Repeat { body } => {
                let next = body.clone();
                Ok(call(&next, vec![], Iteration::Repeat { body }))
            }

            Iteration::TimesRepeat {
                body,
                remaining,
                receiver,
            } => {
                if remaining <= 0 {
                    return Ok(Action::Return(receiver));
                }
                let next = body.clone();
                let state = Iteration::TimesRepeat {
                    body,
                    remaining: remaining - 1,
                    receiver,
                };
                Ok(call(&next, vec![], state))
            }

            Iteration::Count {
                body,
                mut counter,
                receiver,
            } => match counter.advance() {
                Some(value) => {
                    let next = body.clone();
                    let state = Iteration::Count {
                        body,
                        counter,
                        receiver,
                    };
                    Ok(call(&next, vec![value], state))
                }
                None => Ok(Action::Return(receiver)),
            },

            Iteration::Each {
                body,
                items,
                index,
                receiver,
            } => match items.get(index).cloned() {
                Some(item) => {
                    let next = body.clone();
                    let state = Iteration::Each {
                        body,
                        items,
                        index: index + 1,
                        receiver,
                    };
                    Ok(call(&next, vec![item], state))
                }
                None => Ok(Action::Return(receiver)),
            },

            Iteration::EachPair {
                body,
                pairs,
                index,
                receiver,
            } => match pairs.get(index).cloned() {
                Some((key, value)) => {
                    let next = body.clone();
                    let state = Iteration::EachPair {
                        body,
                        pairs,
                        index: index + 1,
                        receiver,
                    };
                    Ok(call(&next, vec![key, value], state))
                }
                None => Ok(Action::Return(receiver)),
            },

            Iteration::Collect {
                body,
                items,
                index,
                mut results,
            } => {
                if let Some(value) = last {
                    results.push(value);
                }
                match items.get(index).cloned() {
                    Some(item) => {
                        let next = body.clone();
                        let state = Iteration::Collect {
                            body,
                            items,
                            index: index + 1,
                            results,
                        };
                        Ok(call(&next, vec![item], state))
                    }
                    None => Ok(Action::Return(Value::array(results))),
                }
            }

            Iteration::Filter {
                body,
                items,
                index,
                keep,
                mut results,
                selector,
            } => {
                if let Some(value) = last {
                    if expect_bool(selector, &value)? == keep {
                        if let Some(item) = index.checked_sub(1).and_then(|i| items.get(i)) {
                            results.push(item.clone());
                        }
                    }
                }
                match items.get(index).cloned() {
                    Some(item) => {
                        let next = body.clone();
                        let state = Iteration::Filter {
                            body,
                            items,
                            index: index + 1,
                            keep,
                            results,
                            selector,
                        };
                        Ok(call(&next, vec![item], state))
                    }
                    None => Ok(Action::Return(Value::array(results))),
                }
            }

            Iteration::Fold {
                body,
                items,
                index,
                acc,
            } => {
                let acc = last.unwrap_or(acc);
                match items.get(index).cloned() {
                    Some(item) => {
                        let next = body.clone();
                        let args = vec![acc.clone(), item];
                        let state = Iteration::Fold {
                            body,
                            items,
                            index: index + 1,
                            acc,
                        };
                        Ok(call(&next, args, state))
                    }
                    None => Ok(Action::Return(acc)),
                }
            }

            Iteration::Detect {
                body,
                items,
                index,
                if_none,
            } => {
                if let Some(value) = last {
                    if expect_bool("detect:", &value)? {
                        let found = index
                            .checked_sub(1)
                            .and_then(|i| items.get(i))
                            .cloned()
                            .unwrap_or(Value::Nil);
                        return Ok(Action::Return(found));
                    }
                }
                match items.get(index).cloned() {
                    Some(item) => {
                        let next = body.clone();
                        let state = Iteration::Detect {
                            body,
                            items,
                            index: index + 1,
                            if_none,
                        };
                        Ok(call(&next, vec![item], state))
                    }
                    None => Ok(match if_none {
                        Some(fallback) => evaluate(&fallback),
                        None => Action::Return(Value::Nil),
                    }),
                }
            }
        }
    }

    /// Values held by the pending state, for context collection.
    pub fn roots(&self, out: &mut Vec<Value>) {
        match self {
            Iteration::While {
                condition, body, ..
            } => {
                out.push(Value::Block(condition.clone()));
                if let Some(body) = body {
                    out.push(Value::Block(body.clone()));
                }
            }
            Iteration::Repeat { body } => out.push(Value::Block(body.clone())),
            Iteration::TimesRepeat { body, receiver, .. } | Iteration::Count { body, receiver, .. } => {
                out.push(Value::Block(body.clone()));
                out.push(receiver.clone());
            }
            Iteration::Each {
                body,
                items,
                receiver,
                ..
            } => {
                out.push(Value::Block(body.clone()));
                out.extend(items.iter().cloned());
                out.push(receiver.clone());
            }
            Iteration::EachPair {
                body,
                pairs,
                receiver,
                ..
            } => {
                out.push(Value::Block(body.clone()));
                for (k, v) in pairs {
                    out.push(k.clone());
                    out.push(v.clone());
                }
                out.push(receiver.clone());
            }
            Iteration::Collect {
                body,
                items,
                results,
                ..
            }
            | Iteration::Filter {
                body,
                items,
                results,
                ..
            } => {
                out.push(Value::Block(body.clone()));
                out.extend(items.iter().cloned());
                out.extend(results.iter().cloned());
            }
            Iteration::Fold {
                body, items, acc, ..
            } => {
                out.push(Value::Block(body.clone()));
                out.extend(items.iter().cloned());
                out.push(acc.clone());
            }
            Iteration::Detect {
                body,
                items,
                if_none,
                ..
            } => {
                out.push(Value::Block(body.clone()));
                out.extend(items.iter().cloned());
                if let Some(fallback) = if_none {
                    out.push(fallback.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_counter_inclusive() {
        let mut counter = Counter::Int {
            next: 1,
            stop: 3,
            step: 1,
            exhausted: false,
        };
        let values: Vec<_> = std::iter::from_fn(|| counter.advance()).collect();
        assert_eq!(values, vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
    }

    #[test]
    fn test_int_counter_descending() {
        let mut counter = Counter::Int {
            next: 5,
            stop: 1,
            step: -2,
            exhausted: false,
        };
        let values: Vec<_> = std::iter::from_fn(|| counter.advance()).collect();
        assert_eq!(values, vec![Value::Integer(5), Value::Integer(3), Value::Integer(1)]);
    }

    #[test]
    fn test_int_counter_stops_at_overflow() {
        let mut counter = Counter::Int {
            next: i64::MAX - 1,
            stop: i64::MAX,
            step: 1,
            exhausted: false,
        };
        let values: Vec<_> = std::iter::from_fn(|| counter.advance()).collect();
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_evaluate_non_block() {
        match evaluate(&Value::Integer(3)) {
            Action::Return(value) => assert_eq!(value, Value::Integer(3)),
            other => panic!("expected Return, got {:?}", other),
        }
    }
}
