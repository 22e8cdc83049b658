use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::bytecode::{Bytecode, ClassDescriptor, MethodDescriptor};
use crate::runtime::context::ContextId;
use crate::runtime::frame::FrameId;
use crate::runtime::value::Value;

/// A compiled method installed in a class.
#[derive(Debug)]
pub struct Method {
    pub selector: String,
    pub params: Vec<String>,
    pub body: Rc<Bytecode>,
}

impl From<&MethodDescriptor> for Method {
    fn from(descriptor: &MethodDescriptor) -> Self {
        Method {
            selector: descriptor.selector.clone(),
            params: descriptor.params.clone(),
            body: descriptor.body.clone(),
        }
    }
}

// =============================================================================
// CLASS
// =============================================================================

/// A runtime class.
///
/// Classes are immutable once defined, except for their class-variable
/// storage. Redefining a class creates a new `Class`; existing instances keep
/// pointing at the old one.
pub struct Class {
    pub name: String,
    pub superclass: Option<Rc<Class>>,
    /// Flat field layout: inherited fields first.
    pub fields: Vec<String>,
    methods: HashMap<String, Rc<Method>>,
    class_methods: HashMap<String, Rc<Method>>,
    class_vars: RefCell<HashMap<String, Value>>,
}

impl Class {
    /// A class with no superclass, fields or methods.
    pub fn root(name: &str) -> Self {
        Class {
            name: name.to_string(),
            superclass: None,
            fields: Vec::new(),
            methods: HashMap::new(),
            class_methods: HashMap::new(),
            class_vars: RefCell::new(HashMap::new()),
        }
    }

    /// Build a class from its descriptor. Field layout is the superclass's
    /// layout followed by the descriptor's own fields.
    pub fn from_descriptor(descriptor: &ClassDescriptor, superclass: Option<Rc<Class>>) -> Self {
        let mut fields = superclass
            .as_ref()
            .map(|s| s.fields.clone())
            .unwrap_or_default();
        fields.extend(descriptor.fields.iter().cloned());

        let table = |methods: &[MethodDescriptor]| {
            methods
                .iter()
                .map(|m| (m.selector.clone(), Rc::new(Method::from(m))))
                .collect::<HashMap<_, _>>()
        };

        let class_vars = descriptor
            .class_vars
            .iter()
            .map(|name| (name.clone(), Value::Nil))
            .collect();

        Class {
            name: descriptor.name.clone(),
            superclass,
            fields,
            methods: table(&descriptor.methods),
            class_methods: table(&descriptor.class_methods),
            class_vars: RefCell::new(class_vars),
        }
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Find `selector` on the instance or class side, starting here and
    /// walking up the superclass chain. Returns the defining class too.
    pub fn lookup(self: &Rc<Self>, selector: &str, class_side: bool) -> Option<(Rc<Class>, Rc<Method>)> {
        let mut current = Some(self.clone());
        while let Some(class) = current {
            let table = if class_side {
                &class.class_methods
            } else {
                &class.methods
            };
            if let Some(method) = table.get(selector) {
                return Some((class.clone(), method.clone()));
            }
            current = class.superclass.clone();
        }
        None
    }

    /// Whether `self` is `other` or inherits from it.
    pub fn inherits_from(&self, other: &Rc<Class>) -> bool {
        let mut current: Option<&Class> = Some(self);
        while let Some(class) = current {
            if std::ptr::eq(class, Rc::as_ptr(other)) {
                return true;
            }
            current = class.superclass.as_deref();
        }
        false
    }

    /// The nearest class in the chain that declares class variable `name`.
    pub fn class_var_owner(self: &Rc<Self>, name: &str) -> Option<Rc<Class>> {
        let mut current = Some(self.clone());
        while let Some(class) = current {
            if class.class_vars.borrow().contains_key(name) {
                return Some(class);
            }
            current = class.superclass.clone();
        }
        None
    }

    /// Read a class variable, searching the superclass chain.
    pub fn class_var(self: &Rc<Self>, name: &str) -> Option<Value> {
        let owner = self.class_var_owner(name)?;
        let vars = owner.class_vars.borrow();
        vars.get(name).cloned()
    }

    /// Write a class variable in the class that declares it. Returns false
    /// when no class in the chain declares `name`.
    pub fn set_class_var(self: &Rc<Self>, name: &str, value: Value) -> bool {
        match self.class_var_owner(name) {
            Some(owner) => {
                owner.class_vars.borrow_mut().insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Snapshot of this class's own class variables.
    pub fn class_var_values(&self) -> Vec<Value> {
        self.class_vars.borrow().values().cloned().collect()
    }

    pub(crate) fn class_vars(&self) -> Ref<'_, HashMap<String, Value>> {
        self.class_vars.borrow()
    }

    /// Reset this class's own class variables to nil.
    pub(crate) fn clear_class_vars(&self) {
        for value in self.class_vars.borrow_mut().values_mut() {
            *value = Value::Nil;
        }
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("superclass", &self.superclass.as_ref().map(|s| &s.name))
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// INSTANCE
// =============================================================================

/// An instance: its class plus one slot per field in the flat layout.
pub struct Instance {
    pub class: Rc<Class>,
    fields: RefCell<Vec<Value>>,
}

impl Instance {
    /// Fresh instance with every field nil.
    pub fn new(class: Rc<Class>) -> Self {
        let fields = vec![Value::Nil; class.field_count()];
        Instance {
            class,
            fields: RefCell::new(fields),
        }
    }

    pub fn field(&self, index: usize) -> Option<Value> {
        self.fields.borrow().get(index).cloned()
    }

    /// Returns false when `index` is outside the layout.
    pub fn set_field(&self, index: usize, value: Value) -> bool {
        match self.fields.borrow_mut().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn field_values(&self) -> Vec<Value> {
        self.fields.borrow().clone()
    }

    pub(crate) fn fields(&self) -> Ref<'_, Vec<Value>> {
        self.fields.borrow()
    }

    /// Reset every field to nil, dropping what they referred to.
    pub(crate) fn clear_fields(&self) {
        self.fields.borrow_mut().fill(Value::Nil);
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instance({})", self.class.name)
    }
}

// =============================================================================
// CLOSURE
// =============================================================================

/// A block value: code plus everything captured when it was created.
pub struct Closure {
    pub body: Rc<Bytecode>,
    pub num_params: usize,
    /// Locals context of the creating frame.
    pub outer: ContextId,
    pub receiver: Value,
    pub method_class: Option<Rc<Class>>,
    pub class_side: bool,
    /// Activation that `^` inside this block returns from.
    pub home: FrameId,
    /// Label of the creating frame, for call-stack views.
    pub origin: String,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Closure/{} in {}", self.num_params, self.origin)
    }
}
