use std::collections::HashSet;
use std::rc::Rc;

use serde::Serialize;
use tracing::debug;

use crate::runtime::object::Class;
use crate::runtime::runtime_error::RuntimeErrorKind;
use crate::runtime::value::Value;

/// Handle to a locals context.
///
/// The generation detects use of a slot that has been reclaimed and reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ContextId {
    index: u32,
    generation: u32,
}

/// Local variable slots of one activation, plus the lexically enclosing
/// context for blocks.
#[derive(Debug, Default)]
pub struct Context {
    pub locals: Vec<Value>,
    pub outer: Option<ContextId>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    context: Option<Context>,
    marked: bool,
}

/// Arena of locals contexts.
///
/// Closures refer to their defining context by id rather than by `Rc`, so a
/// closure stored in its own defining context forms no reference cycle.
/// Unreachable contexts are reclaimed by [`ContextArena::collect`].
#[derive(Debug, Default)]
pub struct ContextArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl ContextArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of contexts currently allocated.
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn alloc(&mut self, outer: Option<ContextId>, locals: Vec<Value>) -> ContextId {
        let context = Context { locals, outer };
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.context = Some(context);
            slot.marked = false;
            return ContextId {
                index,
                generation: slot.generation,
            };
        }

        self.slots.push(Slot {
            generation: 0,
            context: Some(context),
            marked: false,
        });
        ContextId {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    pub fn is_live(&self, id: ContextId) -> bool {
        self.get(id).is_ok()
    }

    pub fn get(&self, id: ContextId) -> Result<&Context, RuntimeErrorKind> {
        match self.slots.get(id.index as usize) {
            Some(slot) if slot.generation == id.generation => {
                slot.context.as_ref().ok_or(RuntimeErrorKind::StaleContext)
            }
            _ => Err(RuntimeErrorKind::StaleContext),
        }
    }

    fn get_mut(&mut self, id: ContextId) -> Result<&mut Context, RuntimeErrorKind> {
        match self.slots.get_mut(id.index as usize) {
            Some(slot) if slot.generation == id.generation => {
                slot.context.as_mut().ok_or(RuntimeErrorKind::StaleContext)
            }
            _ => Err(RuntimeErrorKind::StaleContext),
        }
    }

    /// Read a slot. Slots never written read as nil.
    pub fn load(&self, id: ContextId, slot: usize) -> Result<Value, RuntimeErrorKind> {
        Ok(self.get(id)?.locals.get(slot).cloned().unwrap_or(Value::Nil))
    }

    /// Write a slot, growing the context as needed.
    pub fn store(&mut self, id: ContextId, slot: usize, value: Value) -> Result<(), RuntimeErrorKind> {
        let context = self.get_mut(id)?;
        if slot >= context.locals.len() {
            context.locals.resize(slot + 1, Value::Nil);
        }
        context.locals[slot] = value;
        Ok(())
    }

    /// Follow `depth` outer links from `id`.
    pub fn resolve(&self, id: ContextId, depth: usize) -> Result<Option<ContextId>, RuntimeErrorKind> {
        let mut current = id;
        for _ in 0..depth {
            match self.get(current)?.outer {
                Some(outer) => current = outer,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Mark every context reachable from `roots` and `values`, then free the
    /// rest. Returns the number of contexts freed.
    pub fn collect(&mut self, roots: &[ContextId], values: Vec<Value>) -> usize {
        let mut marker = Marker {
            contexts: roots.to_vec(),
            values,
            seen: HashSet::new(),
        };

        loop {
            if let Some(value) = marker.values.pop() {
                marker.trace_value(&value);
                continue;
            }
            let Some(id) = marker.contexts.pop() else {
                break;
            };
            let Some(slot) = self.slots.get_mut(id.index as usize) else {
                continue;
            };
            if slot.generation != id.generation || slot.marked {
                continue;
            }
            if let Some(context) = &slot.context {
                slot.marked = true;
                marker.values.extend(context.locals.iter().cloned());
                if let Some(outer) = context.outer {
                    marker.contexts.push(outer);
                }
            }
        }

        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.context.is_some() && !slot.marked {
                slot.context = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                freed += 1;
            }
            slot.marked = false;
        }
        self.live -= freed;

        debug!(freed, live = self.live, "collected contexts");
        freed
    }
}

/// Worklist for the mark phase. Heap objects are visited once each so
/// cyclic object graphs terminate.
struct Marker {
    contexts: Vec<ContextId>,
    values: Vec<Value>,
    seen: HashSet<usize>,
}

impl Marker {
    fn first_visit<T: ?Sized>(&mut self, rc: &Rc<T>) -> bool {
        self.seen.insert(Rc::as_ptr(rc) as *const () as usize)
    }

    fn trace_value(&mut self, value: &Value) {
        match value {
            Value::Block(closure) => {
                if self.first_visit(closure) {
                    self.contexts.push(closure.outer);
                    self.values.push(closure.receiver.clone());
                    if let Some(class) = &closure.method_class {
                        self.trace_class(class);
                    }
                }
            }
            Value::Array(items) => {
                if self.first_visit(items) {
                    self.values.extend(items.borrow().iter().cloned());
                }
            }
            Value::Dictionary(dict) => {
                if self.first_visit(dict) {
                    for (k, v) in dict.borrow().iter() {
                        self.values.push(k.clone());
                        self.values.push(v.clone());
                    }
                }
            }
            Value::Instance(instance) => {
                if self.first_visit(instance) {
                    self.values.extend(instance.field_values());
                    self.trace_class(&instance.class);
                }
            }
            Value::Class(class) => self.trace_class(class),
            Value::Nil | Value::Bool(_) | Value::Integer(_) | Value::Float(_) | Value::String(_) => {}
        }
    }

    fn trace_class(&mut self, class: &Rc<Class>) {
        let mut current = Some(class.clone());
        while let Some(class) = current {
            if !self.first_visit(&class) {
                break;
            }
            self.values.extend(class.class_var_values());
            current = class.superclass.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_store_grow() {
        let mut arena = ContextArena::new();
        let id = arena.alloc(None, vec![Value::Integer(1)]);

        assert_eq!(arena.load(id, 0), Ok(Value::Integer(1)));
        assert_eq!(arena.load(id, 5), Ok(Value::Nil));

        arena.store(id, 3, Value::Integer(9)).unwrap();
        assert_eq!(arena.get(id).unwrap().locals.len(), 4);
        assert_eq!(arena.load(id, 3), Ok(Value::Integer(9)));
    }

    #[test]
    fn test_resolve_outer_chain() {
        let mut arena = ContextArena::new();
        let outer = arena.alloc(None, vec![]);
        let middle = arena.alloc(Some(outer), vec![]);
        let inner = arena.alloc(Some(middle), vec![]);

        assert_eq!(arena.resolve(inner, 0), Ok(Some(inner)));
        assert_eq!(arena.resolve(inner, 2), Ok(Some(outer)));
        assert_eq!(arena.resolve(inner, 3), Ok(None));
    }

    #[test]
    fn test_collect_frees_unreachable() {
        let mut arena = ContextArena::new();
        let root = arena.alloc(None, vec![]);
        let kept = arena.alloc(Some(root), vec![]);
        let dropped = arena.alloc(None, vec![Value::Integer(1)]);

        let freed = arena.collect(&[kept], vec![]);

        assert_eq!(freed, 1);
        assert_eq!(arena.live(), 2);
        assert!(arena.is_live(root));
        assert!(!arena.is_live(dropped));
        assert_eq!(arena.load(dropped, 0), Err(RuntimeErrorKind::StaleContext));
    }

    #[test]
    fn test_reused_slot_gets_new_generation() {
        let mut arena = ContextArena::new();
        let old = arena.alloc(None, vec![]);
        arena.collect(&[], vec![]);

        let new = arena.alloc(None, vec![]);
        assert_ne!(old, new);
        assert!(!arena.is_live(old));
        assert!(arena.is_live(new));
    }
}
