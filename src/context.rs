//! Render contexts and the synthetic `loop` bindings exposed inside
//! expanded structural loops.

use std::collections::BTreeMap;

use minijinja::Value;
use serde::Serialize;

/// A mapping of names to values handed to the expression evaluator.
///
/// The base context is never mutated by rendering; each structural loop
/// iteration extends a clone with its own bindings, so child scopes see
/// parent bindings plus their own, shadowing on name collision.
///
/// # Example
///
/// ```
/// use decktpl::Context;
///
/// let mut context = Context::new();
/// context.insert("title", "Quarterly Report");
/// context.insert("items", vec!["a", "b", "c"]);
/// assert!(context.contains("title"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    data: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value under `name`, replacing any previous binding.
    pub fn insert<N: AsRef<str>, V: Into<Value>>(&mut self, name: N, value: V) -> &mut Self {
        self.data.insert(name.as_ref().to_string(), value.into());
        self
    }

    /// Inserts any serde-serializable value under `name`.
    pub fn insert_serialized<N: AsRef<str>, V: Serialize>(
        &mut self,
        name: N,
        value: &V,
    ) -> &mut Self {
        self.data
            .insert(name.as_ref().to_string(), Value::from_serialize(value));
        self
    }

    pub fn get<N: AsRef<str>>(&self, name: N) -> Option<&Value> {
        self.data.get(name.as_ref())
    }

    pub fn contains<N: AsRef<str>>(&self, name: N) -> bool {
        self.data.contains_key(name.as_ref())
    }

    /// A child scope carrying this scope's bindings plus the loop variable
    /// and the `loop` object for one structural loop iteration.
    pub(crate) fn with_loop_binding(&self, var: &str, item: Value, state: &LoopState) -> Self {
        let mut child = self.clone();
        child.insert(var, item);
        child.insert("loop", Value::from_serialize(state));
        child
    }

    /// The whole context as one evaluator value.
    pub(crate) fn to_value(&self) -> Value {
        Value::from(self.data.clone())
    }
}

/// Per-iteration synthetics bound under `loop` when a structural loop is
/// expanded, mirroring the evaluator's own `loop` object inside `for`
/// bodies.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct LoopState {
    /// 1-based position.
    pub index: usize,
    /// 0-based position.
    pub index0: usize,
    pub first: bool,
    pub last: bool,
    pub length: usize,
}

impl LoopState {
    pub(crate) fn new(index0: usize, length: usize) -> Self {
        Self {
            index: index0 + 1,
            index0,
            first: index0 == 0,
            last: index0 + 1 == length,
            length,
        }
    }
}
