use std::collections::HashMap;

/// Name of the root class every VM bootstraps.
pub const ROOT_CLASS: &str = "Object";

/// Compile-time view of a class: enough to resolve field indices and class
/// variable names in method bodies compiled later.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassShape {
    pub superclass: Option<String>,
    /// Flat field layout: inherited fields first, then own fields.
    pub fields: Vec<String>,
    /// Class variables declared by this class only.
    pub class_vars: Vec<String>,
}

/// Compilation session state.
///
/// Holds the top-level local slots and the shapes of every class compiled so
/// far. A REPL passes the same table to each successive
/// [`compile_incremental`](crate::bytecode::compile::compile_incremental)
/// call so slots assigned by earlier fragments keep their meaning.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolTable {
    locals: HashMap<String, u32>,
    next_slot: u32,
    classes: HashMap<String, ClassShape>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut classes = HashMap::new();
        classes.insert(ROOT_CLASS.to_string(), ClassShape::default());

        Self {
            locals: HashMap::new(),
            next_slot: 0,
            classes,
        }
    }

    /// Slot of a top-level local, if declared.
    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.locals.get(name).copied()
    }

    /// Declare a top-level local. Redeclaring keeps the existing slot.
    pub fn declare(&mut self, name: &str) -> u32 {
        if let Some(slot) = self.locals.get(name) {
            return *slot;
        }
        let slot = self.next_slot;
        self.locals.insert(name.to_string(), slot);
        self.next_slot += 1;
        slot
    }

    /// Number of top-level slots allocated so far.
    pub fn slot_count(&self) -> u32 {
        self.next_slot
    }

    /// Declared top-level names, ordered by slot.
    pub fn locals(&self) -> Vec<(&str, u32)> {
        let mut out: Vec<_> = self.locals.iter().map(|(n, s)| (n.as_str(), *s)).collect();
        out.sort_by_key(|(_, slot)| *slot);
        out
    }

    pub fn class_shape(&self, name: &str) -> Option<&ClassShape> {
        self.classes.get(name)
    }

    pub fn define_class(&mut self, name: &str, shape: ClassShape) {
        self.classes.insert(name.to_string(), shape);
    }

    /// Whether `name` is a class variable declared by `class` or one of its
    /// known ancestors.
    pub fn class_var_visible(&self, class: &str, name: &str) -> bool {
        let mut current = Some(class);
        // redefinitions can leave a cycle in the recorded names
        let mut budget = self.classes.len();
        while let Some(class_name) = current {
            if budget == 0 {
                return false;
            }
            budget -= 1;
            let Some(shape) = self.classes.get(class_name) else {
                return false;
            };
            if shape.class_vars.iter().any(|v| v == name) {
                return true;
            }
            current = shape.superclass.as_deref();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_assigns_in_order() {
        let mut table = SymbolTable::new();
        assert_eq!(table.declare("a"), 0);
        assert_eq!(table.declare("b"), 1);
        assert_eq!(table.declare("a"), 0);
        assert_eq!(table.slot_count(), 2);
        assert_eq!(table.locals(), vec![("a", 0), ("b", 1)]);
    }

    #[test]
    fn test_root_class_known() {
        let table = SymbolTable::new();
        assert_eq!(table.class_shape(ROOT_CLASS), Some(&ClassShape::default()));
    }

    #[test]
    fn test_class_var_visible_through_chain() {
        let mut table = SymbolTable::new();
        table.define_class(
            "Base",
            ClassShape {
                superclass: Some(ROOT_CLASS.to_string()),
                fields: vec![],
                class_vars: vec!["Count".to_string()],
            },
        );
        table.define_class(
            "Derived",
            ClassShape {
                superclass: Some("Base".to_string()),
                ..ClassShape::default()
            },
        );

        assert!(table.class_var_visible("Derived", "Count"));
        assert!(!table.class_var_visible("Derived", "Other"));
        assert!(!table.class_var_visible("Missing", "Count"));
    }
}
