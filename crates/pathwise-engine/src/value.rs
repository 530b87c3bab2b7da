//! Runtime values produced by AST nodes.

use std::cmp::Ordering;
use std::sync::Arc;

use pathwise_graph::{AttrValue, EdgeRef, VertexId};
use roaring::RoaringBitmap;

use crate::automaton::Nfa;
use crate::error::{EvalError, EvalResult};
use crate::path::PathSystem;

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Vertex(VertexId),
    Edge(EdgeRef),
    VertexSet(RoaringBitmap),
    List(Vec<Value>),
    Automaton(Arc<Nfa>),
    PathSystem(Arc<PathSystem>),
}

impl Value {
    /// Kind name used in type-mismatch messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Vertex(_) => "vertex",
            Value::Edge(_) => "edge",
            Value::VertexSet(_) => "vertex set",
            Value::List(_) => "list",
            Value::Automaton(_) => "automaton",
            Value::PathSystem(_) => "path system",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// A single vertex or a vertex set, as a set.
    pub fn to_vertex_set(&self, context: &str) -> EvalResult<RoaringBitmap> {
        match self {
            Value::Vertex(v) => {
                let mut set = RoaringBitmap::new();
                set.insert(*v);
                Ok(set)
            }
            Value::VertexSet(set) => Ok(set.clone()),
            other => Err(EvalError::type_mismatch(
                context,
                "vertex or vertex set",
                other.kind(),
            )),
        }
    }

    pub fn to_automaton(&self, context: &str) -> EvalResult<Arc<Nfa>> {
        match self {
            Value::Automaton(nfa) => Ok(Arc::clone(nfa)),
            other => Err(EvalError::type_mismatch(context, "automaton", other.kind())),
        }
    }

    /// Ordering between comparable values; `None` for incomparable kinds.
    pub fn partial_cmp_value(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Vertex(a), Value::Vertex(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Edge(a), Value::Edge(b)) => a.canonical() == b.canonical(),
            (Value::VertexSet(a), Value::VertexSet(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Automaton(a), Value::Automaton(b)) => Arc::ptr_eq(a, b),
            (Value::PathSystem(a), Value::PathSystem(b)) => Arc::ptr_eq(a, b),
            (a, b) => a.partial_cmp_value(b) == Some(Ordering::Equal),
        }
    }
}

impl From<AttrValue> for Value {
    fn from(v: AttrValue) -> Self {
        match v {
            AttrValue::Bool(b) => Value::Bool(b),
            AttrValue::Int(i) => Value::Int(i),
            AttrValue::Float(f) => Value::Float(f),
            AttrValue::Str(s) => Value::Str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<RoaringBitmap> for Value {
    fn from(v: RoaringBitmap) -> Self {
        Value::VertexSet(v)
    }
}
