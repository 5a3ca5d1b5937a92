//! Shared `AttributeResolver` test fixture for the integration suite.
//!
//! Destructuring an event's object/array tree into dotted attribute paths
//! is explicitly an outer concern (spec §1, §4.7); this fixture is the
//! minimal stand-in the integration tests drive `CompiledEngine` through.
//! Quantifier bodies here bind their element directly to the scalar under
//! test (`i` rather than `i.v`), since [`categoria::value::Value`] has no
//! object/record kind — only the caller's real resolver destructures
//! nested records.

use std::cell::RefCell;
use std::collections::HashMap;

use categoria::resolver::{AttributeResolver, FrameGuard};
use categoria::value::Value;

pub struct TestResolver {
    pub fields: HashMap<String, Value>,
    pub arrays: HashMap<String, Vec<Value>>,
    frame: RefCell<Vec<(String, Value)>>,
}

impl TestResolver {
    pub fn new() -> Self {
        TestResolver { fields: HashMap::new(), arrays: HashMap::new(), frame: RefCell::new(Vec::new()) }
    }

    pub fn with_field(mut self, path: &str, value: Value) -> Self {
        self.fields.insert(path.to_string(), value);
        self
    }

    pub fn with_array(mut self, path: &str, values: Vec<Value>) -> Self {
        self.arrays.insert(path.to_string(), values);
        self
    }
}

struct PopOnDrop<'a> {
    frame: &'a RefCell<Vec<(String, Value)>>,
}
impl FrameGuard for PopOnDrop<'_> {}
impl Drop for PopOnDrop<'_> {
    fn drop(&mut self) {
        self.frame.borrow_mut().pop();
    }
}

impl AttributeResolver for TestResolver {
    fn resolve(&self, path: &str) -> Value {
        for (binder, value) in self.frame.borrow().iter().rev() {
            if path == binder.as_str() {
                return value.clone();
            }
        }
        self.fields.get(path).cloned().unwrap_or(Value::Undefined)
    }

    fn array_len(&self, path: &str) -> Option<usize> {
        self.arrays.get(path).map(Vec::len)
    }

    fn iter(&self, path: &str) -> Box<dyn Iterator<Item = (usize, Value)> + '_> {
        match self.arrays.get(path) {
            Some(items) => Box::new(items.clone().into_iter().enumerate()),
            None => Box::new(std::iter::empty()),
        }
    }

    fn frame_scope<'a>(&'a self, binder: &str, element: Value) -> Box<dyn FrameGuard + 'a> {
        self.frame.borrow_mut().push((binder.to_string(), element));
        Box::new(PopOnDrop { frame: &self.frame })
    }
}
