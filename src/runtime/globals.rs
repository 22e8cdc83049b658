use std::collections::HashMap;
use std::rc::Rc;

use tracing::warn;

use crate::bytecode::symbols::ROOT_CLASS;
use crate::runtime::object::Class;
use crate::runtime::value::Value;

/// Global name → value table. Lives as long as the VM, across runs.
#[derive(Debug)]
pub struct Globals {
    table: HashMap<String, Value>,
}

impl Default for Globals {
    fn default() -> Self {
        Self::new()
    }
}

impl Globals {
    /// A table holding only the root class.
    pub fn new() -> Self {
        let mut table = HashMap::new();
        table.insert(
            ROOT_CLASS.to_string(),
            Value::Class(Rc::new(Class::root(ROOT_CLASS))),
        );
        Self { table }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.table.get(name)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.table.insert(name.to_string(), value);
    }

    /// Register a class under its own name.
    pub fn define_class(&mut self, class: Rc<Class>) {
        if let Some(Value::Class(_)) = self.table.get(&class.name) {
            warn!(class = %class.name, "redefining class; existing instances keep the old definition");
        }
        self.table.insert(class.name.clone(), Value::Class(class));
    }

    /// The class bound to `name`, if that global is a class.
    pub fn class(&self, name: &str) -> Option<Rc<Class>> {
        match self.table.get(name) {
            Some(Value::Class(class)) => Some(class.clone()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Entries sorted by name.
    pub fn entries(&self) -> Vec<(&str, &Value)> {
        let mut out: Vec<_> = self.table.iter().map(|(k, v)| (k.as_str(), v)).collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.table.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrapped_with_root() {
        let globals = Globals::new();
        let object = globals.class(ROOT_CLASS).unwrap();
        assert!(object.superclass.is_none());
    }

    #[test]
    fn test_entries_sorted() {
        let mut globals = Globals::new();
        globals.set("zeta", Value::Integer(1));
        globals.set("alpha", Value::Integer(2));

        let names: Vec<_> = globals.entries().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Object", "alpha", "zeta"]);
    }

    #[test]
    fn test_class_only_for_class_values() {
        let mut globals = Globals::new();
        globals.set("x", Value::Integer(1));
        assert!(globals.class("x").is_none());
        assert!(globals.class("missing").is_none());
    }
}
