//! Variable bindings, the shared result environment and the function library.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use ahash::AHashMap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{EvalError, EvalResult};
use crate::value::Value;

// ============================================================================
// Local bindings
// ============================================================================

/// Query-local variables. Later bindings shadow earlier ones.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    frames: Vec<(String, Value)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.frames.push((name.into(), value));
    }

    pub fn pop(&mut self) -> Option<(String, Value)> {
        self.frames.pop()
    }

    /// Replace the innermost binding of `name`, or add one.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.frames.iter_mut().rev().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.frames.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.frames
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

// ============================================================================
// Shared environment
// ============================================================================

/// Results of completed queries, keyed by query name. Insert-only.
#[derive(Default)]
pub struct SharedEnvironment {
    values: DashMap<String, Value, ahash::RandomState>,
}

impl SharedEnvironment {
    pub fn new() -> Self {
        Self {
            values: DashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    /// Insert a result; an existing entry is never overwritten.
    pub fn insert_new(&self, name: &str, value: Value) -> EvalResult<()> {
        match self.values.entry(name.to_string()) {
            Entry::Occupied(_) => Err(EvalError::DuplicateResult(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).map(|v| v.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sorted copy of the current contents.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

impl fmt::Debug for SharedEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedEnvironment")
            .field("len", &self.len())
            .finish()
    }
}

// ============================================================================
// Function library
// ============================================================================

/// Functions callable from `Call` nodes.
pub trait FunctionLibrary: Send + Sync {
    fn call(&self, name: &str, args: &[Value]) -> EvalResult<Value>;
}

pub type Builtin = Arc<dyn Fn(&[Value]) -> EvalResult<Value> + Send + Sync>;

/// Name-indexed function registry.
#[derive(Clone, Default)]
pub struct Functions {
    table: AHashMap<String, Builtin>,
}

impl Functions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in set functions.
    pub fn with_builtins() -> Self {
        let mut f = Self::new();
        f.register("count", builtin_count);
        f.register("isEmpty", builtin_is_empty);
        f.register("union", builtin_union);
        f.register("intersection", builtin_intersection);
        f.register("contains", builtin_contains);
        f
    }

    /// Shared instance of [`Functions::with_builtins`].
    pub fn standard() -> &'static Functions {
        static STANDARD: OnceLock<Functions> = OnceLock::new();
        STANDARD.get_or_init(Functions::with_builtins)
    }

    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> EvalResult<Value> + Send + Sync + 'static,
    {
        self.table.insert(name.into(), Arc::new(f));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }
}

impl FunctionLibrary for Functions {
    fn call(&self, name: &str, args: &[Value]) -> EvalResult<Value> {
        let f = self
            .table
            .get(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
        f(args)
    }
}

impl fmt::Debug for Functions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.table.keys().collect();
        names.sort();
        f.debug_struct("Functions").field("names", &names).finish()
    }
}

fn arity<'a, const N: usize>(name: &str, args: &'a [Value]) -> EvalResult<&'a [Value; N]> {
    args.try_into().map_err(|_| {
        EvalError::type_mismatch(
            name,
            format!("{N} argument(s)"),
            format!("{} argument(s)", args.len()),
        )
    })
}

fn builtin_count(args: &[Value]) -> EvalResult<Value> {
    let [x] = arity::<1>("count", args)?;
    match x {
        Value::VertexSet(set) => Ok(Value::Int(set.len() as i64)),
        Value::List(items) => Ok(Value::Int(items.len() as i64)),
        Value::Null => Ok(Value::Int(0)),
        other => Err(EvalError::type_mismatch("count", "collection", other.kind())),
    }
}

fn builtin_is_empty(args: &[Value]) -> EvalResult<Value> {
    let [x] = arity::<1>("isEmpty", args)?;
    match x {
        Value::VertexSet(set) => Ok(Value::Bool(set.is_empty())),
        Value::List(items) => Ok(Value::Bool(items.is_empty())),
        Value::Null => Ok(Value::Bool(true)),
        other => Err(EvalError::type_mismatch("isEmpty", "collection", other.kind())),
    }
}

fn builtin_union(args: &[Value]) -> EvalResult<Value> {
    let [a, b] = arity::<2>("union", args)?;
    Ok(Value::VertexSet(
        a.to_vertex_set("union")? | b.to_vertex_set("union")?,
    ))
}

fn builtin_intersection(args: &[Value]) -> EvalResult<Value> {
    let [a, b] = arity::<2>("intersection", args)?;
    Ok(Value::VertexSet(
        a.to_vertex_set("intersection")? & b.to_vertex_set("intersection")?,
    ))
}

fn builtin_contains(args: &[Value]) -> EvalResult<Value> {
    let [collection, item] = arity::<2>("contains", args)?;
    match (collection, item) {
        (Value::VertexSet(set), Value::Vertex(v)) => Ok(Value::Bool(set.contains(*v))),
        (Value::List(items), item) => Ok(Value::Bool(items.contains(item))),
        (Value::VertexSet(_), other) => {
            Err(EvalError::type_mismatch("contains", "vertex", other.kind()))
        }
        (other, _) => Err(EvalError::type_mismatch("contains", "collection", other.kind())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roaring::RoaringBitmap;

    fn set(ids: &[u32]) -> Value {
        Value::VertexSet(ids.iter().copied().collect::<RoaringBitmap>())
    }

    #[test]
    fn bindings_shadow_and_pop() {
        let mut b = Bindings::new();
        b.push("x", Value::Int(1));
        b.push("x", Value::Int(2));
        assert_eq!(b.get("x"), Some(&Value::Int(2)));
        b.pop();
        assert_eq!(b.get("x"), Some(&Value::Int(1)));
        b.set("x", Value::Int(3));
        assert_eq!(b.get("x"), Some(&Value::Int(3)));
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn shared_environment_is_insert_only() {
        let env = SharedEnvironment::new();
        env.insert_new("q1", Value::Int(1)).unwrap();
        assert!(matches!(
            env.insert_new("q1", Value::Int(2)),
            Err(EvalError::DuplicateResult(name)) if name == "q1"
        ));
        assert_eq!(env.get("q1"), Some(Value::Int(1)));
        assert_eq!(env.snapshot().len(), 1);
    }

    #[test]
    fn builtins() {
        let f = Functions::standard();
        assert_eq!(f.call("count", &[set(&[1, 2, 3])]).unwrap(), Value::Int(3));
        assert_eq!(f.call("isEmpty", &[set(&[])]).unwrap(), Value::Bool(true));
        assert_eq!(
            f.call("union", &[set(&[1]), Value::Vertex(4)]).unwrap(),
            set(&[1, 4])
        );
        assert_eq!(
            f.call("intersection", &[set(&[1, 2]), set(&[2, 3])]).unwrap(),
            set(&[2])
        );
        assert_eq!(
            f.call("contains", &[set(&[1, 2]), Value::Vertex(2)]).unwrap(),
            Value::Bool(true)
        );
        assert!(matches!(
            f.call("count", &[]),
            Err(EvalError::TypeMismatch { .. })
        ));
        assert!(matches!(
            f.call("count", &[Value::Bool(true)]),
            Err(EvalError::TypeMismatch { .. })
        ));
        assert!(matches!(
            f.call("nope", &[]),
            Err(EvalError::UnknownFunction(_))
        ));
    }
}
