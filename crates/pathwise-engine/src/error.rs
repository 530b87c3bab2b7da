//! Evaluation errors.

use thiserror::Error;

use crate::ast::NodeId;

pub type EvalResult<T> = std::result::Result<T, EvalError>;

#[derive(Debug, Error)]
pub enum EvalError {
    /// A node requested its own result while it was being evaluated.
    #[error("cyclic evaluation: node {node} depends on its own result")]
    CyclicEvaluation { node: NodeId },

    #[error("cyclic query dependency among {queries:?}")]
    CyclicDependency { queries: Vec<String> },

    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    /// First failure captured by the scheduler.
    #[error("query {query:?} failed: {source}")]
    QueryFailed {
        query: String,
        #[source]
        source: Box<EvalError>,
    },

    #[error("query {query:?} panicked: {message}")]
    QueryPanicked { query: String, message: String },

    #[error("unresolved variable {0:?}")]
    UnresolvedVariable(String),

    #[error("unknown function {0:?}")]
    UnknownFunction(String),

    #[error("node {0} was declared but never defined")]
    UndefinedNode(NodeId),

    #[error("node {0} does not belong to this syntax graph")]
    UnknownNode(NodeId),

    #[error("a result named {0:?} is already in the shared environment")]
    DuplicateResult(String),

    #[error("a query named {0:?} is already scheduled")]
    DuplicateQuery(String),

    #[error("unknown query {0:?}")]
    UnknownQuery(String),

    #[error("traversal visited more than {limit} (vertex, state) pairs")]
    TraversalLimit { limit: usize },

    #[error("invalid automaton: {0}")]
    InvalidAutomaton(String),

    #[error("worker pool: {0}")]
    WorkerPool(String),

    #[error(transparent)]
    Graph(#[from] anyhow::Error),
}

impl EvalError {
    pub fn type_mismatch(
        context: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        EvalError::TypeMismatch {
            context: context.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Cyclic node or query dependencies. These are never retried.
    pub fn is_structural(&self) -> bool {
        match self {
            EvalError::CyclicEvaluation { .. } | EvalError::CyclicDependency { .. } => true,
            EvalError::QueryFailed { source, .. } => source.is_structural(),
            _ => false,
        }
    }

    /// Name of the query a scheduler failure belongs to.
    pub fn failed_query(&self) -> Option<&str> {
        match self {
            EvalError::QueryFailed { query, .. } | EvalError::QueryPanicked { query, .. } => {
                Some(query)
            }
            _ => None,
        }
    }
}
