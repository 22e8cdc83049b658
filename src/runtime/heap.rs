use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::runtime::object::{Class, Closure, Instance};
use crate::runtime::value::{Dictionary, Value};

/// Weak handle to a heap object that can take part in a reference cycle.
enum Tracked {
    Instance(Weak<Instance>),
    Array(Weak<RefCell<Vec<Value>>>),
    Dictionary(Weak<RefCell<Dictionary>>),
    Block(Weak<Closure>),
    Class(Weak<Class>),
}

impl Tracked {
    fn upgrade(&self) -> Option<Value> {
        match self {
            Tracked::Instance(weak) => weak.upgrade().map(Value::Instance),
            Tracked::Array(weak) => weak.upgrade().map(Value::Array),
            Tracked::Dictionary(weak) => weak.upgrade().map(Value::Dictionary),
            Tracked::Block(weak) => weak.upgrade().map(Value::Block),
            Tracked::Class(weak) => weak.upgrade().map(Value::Class),
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            Tracked::Instance(weak) => weak.strong_count() > 0,
            Tracked::Array(weak) => weak.strong_count() > 0,
            Tracked::Dictionary(weak) => weak.strong_count() > 0,
            Tracked::Block(weak) => weak.strong_count() > 0,
            Tracked::Class(weak) => weak.strong_count() > 0,
        }
    }
}

fn address<T: ?Sized>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

/// Address of a heap value, or `None` for immediates and strings.
fn key(value: &Value) -> Option<usize> {
    match value {
        Value::Instance(rc) => Some(address(rc)),
        Value::Array(rc) => Some(address(rc)),
        Value::Dictionary(rc) => Some(address(rc)),
        Value::Block(rc) => Some(address(rc)),
        Value::Class(rc) => Some(address(rc)),
        Value::Nil | Value::Bool(_) | Value::Integer(_) | Value::Float(_) | Value::String(_) => None,
    }
}

fn strong_count(value: &Value) -> usize {
    match value {
        Value::Instance(rc) => Rc::strong_count(rc),
        Value::Array(rc) => Rc::strong_count(rc),
        Value::Dictionary(rc) => Rc::strong_count(rc),
        Value::Block(rc) => Rc::strong_count(rc),
        Value::Class(rc) => Rc::strong_count(rc),
        Value::Nil | Value::Bool(_) | Value::Integer(_) | Value::Float(_) | Value::String(_) => 0,
    }
}

/// Call `visit` with the address of every heap object `value` holds a
/// strong reference to. Borrows only, so counts are not disturbed.
fn for_each_edge(value: &Value, visit: &mut dyn FnMut(usize)) {
    let mut slot = |v: &Value| {
        if let Some(k) = key(v) {
            visit(k);
        }
    };
    match value {
        Value::Instance(instance) => {
            instance.fields().iter().for_each(&mut slot);
            visit(address(&instance.class));
        }
        Value::Array(items) => items.borrow().iter().for_each(&mut slot),
        Value::Dictionary(dict) => {
            for (k, v) in dict.borrow().iter() {
                slot(k);
                slot(v);
            }
        }
        Value::Block(closure) => {
            slot(&closure.receiver);
            if let Some(class) = &closure.method_class {
                visit(address(class));
            }
        }
        Value::Class(class) => {
            class.class_vars().values().for_each(&mut slot);
            if let Some(superclass) = &class.superclass {
                visit(address(superclass));
            }
        }
        Value::Nil | Value::Bool(_) | Value::Integer(_) | Value::Float(_) | Value::String(_) => {}
    }
}

fn children(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Instance(instance) => {
            out.extend(instance.fields().iter().cloned());
            out.push(Value::Class(instance.class.clone()));
        }
        Value::Array(items) => out.extend(items.borrow().iter().cloned()),
        Value::Dictionary(dict) => {
            for (k, v) in dict.borrow().iter() {
                out.push(k.clone());
                out.push(v.clone());
            }
        }
        Value::Block(closure) => {
            out.push(closure.receiver.clone());
            if let Some(class) = &closure.method_class {
                out.push(Value::Class(class.clone()));
            }
        }
        Value::Class(class) => {
            out.extend(class.class_vars().values().cloned());
            if let Some(superclass) = &class.superclass {
                out.push(Value::Class(superclass.clone()));
            }
        }
        Value::Nil | Value::Bool(_) | Value::Integer(_) | Value::Float(_) | Value::String(_) => {}
    }
}

/// Drop every reference `value` holds in a mutable slot.
fn clear(value: &Value) {
    match value {
        Value::Instance(instance) => instance.clear_fields(),
        Value::Array(items) => items.borrow_mut().clear(),
        Value::Dictionary(dict) => *dict.borrow_mut() = Dictionary::new(),
        Value::Class(class) => class.clear_class_vars(),
        Value::Block(_)
        | Value::Nil
        | Value::Bool(_)
        | Value::Integer(_)
        | Value::Float(_)
        | Value::String(_) => {}
    }
}

/// Registry of heap objects created by the VM, for reclaiming cycles.
///
/// Objects are plain `Rc`s, so acyclic garbage is freed as soon as the last
/// reference goes. A cycle (an instance holding a block that captured it as
/// `self`, an array containing itself) is found by counting the references
/// tracked objects hold to each other: an object referenced more often than
/// that is held from outside the graph (a frame, a context, a global, the
/// host) and is a root. Everything not reachable from a root is garbage; its
/// slots are cleared, which breaks the cycle and lets `Rc` free it.
#[derive(Default)]
pub struct ObjectHeap {
    objects: HashMap<usize, Tracked>,
}

impl ObjectHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registrations, including ones not yet found dead.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Tracked objects that are still allocated.
    pub fn live(&self) -> usize {
        self.objects.values().filter(|t| t.is_alive()).count()
    }

    /// Start tracking `value`. Immediates and strings are ignored, and
    /// tracking an object twice is harmless.
    pub fn track(&mut self, value: &Value) {
        let tracked = match value {
            Value::Instance(rc) => Tracked::Instance(Rc::downgrade(rc)),
            Value::Array(rc) => Tracked::Array(Rc::downgrade(rc)),
            Value::Dictionary(rc) => Tracked::Dictionary(Rc::downgrade(rc)),
            Value::Block(rc) => Tracked::Block(Rc::downgrade(rc)),
            Value::Class(rc) => Tracked::Class(Rc::downgrade(rc)),
            Value::Nil | Value::Bool(_) | Value::Integer(_) | Value::Float(_) | Value::String(_) => {
                return;
            }
        };
        if let Some(k) = key(value) {
            self.objects.insert(k, tracked);
        }
    }

    /// Reclaim unreachable cycles. Returns the number of objects cleared.
    pub fn collect(&mut self) -> usize {
        self.objects.retain(|_, tracked| tracked.is_alive());

        // one strong reference each, released at the end of this call
        let live: Vec<Value> = self.objects.values().filter_map(Tracked::upgrade).collect();

        let mut internal: HashMap<usize, usize> = HashMap::new();
        for value in &live {
            for_each_edge(value, &mut |k| *internal.entry(k).or_default() += 1);
        }

        let mut pending: Vec<Value> = live
            .iter()
            .filter(|value| {
                let held = key(value).and_then(|k| internal.get(&k)).copied().unwrap_or(0);
                strong_count(value) > held + 1
            })
            .cloned()
            .collect();

        let mut marked = HashSet::new();
        while let Some(value) = pending.pop() {
            if let Some(k) = key(&value) {
                if marked.insert(k) {
                    children(&value, &mut pending);
                }
            }
        }

        let mut cleared = 0;
        for value in &live {
            if key(value).is_some_and(|k| !marked.contains(&k)) {
                clear(value);
                cleared += 1;
            }
        }

        drop(live);
        self.objects.retain(|_, tracked| tracked.is_alive());
        debug!(cleared, tracked = self.objects.len(), "collected objects");
        cleared
    }
}
