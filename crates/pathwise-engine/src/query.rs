//! A compiled query: syntax graph, root node and the private evaluator state.

use std::sync::Arc;

use pathwise_graph::GraphAccess;

use crate::ast::{AstGraph, NodeId};
use crate::cache::EvaluatorCache;
use crate::config::TraversalLimits;
use crate::env::{Bindings, FunctionLibrary, Functions, SharedEnvironment};
use crate::error::EvalResult;
use crate::eval::Evaluator;
use crate::value::Value;

pub struct Query {
    ast: Arc<AstGraph>,
    root: NodeId,
    cache: EvaluatorCache,
    bindings: Bindings,
    functions: Arc<dyn FunctionLibrary>,
    limits: TraversalLimits,
    evaluated_at: Option<u64>,
}

impl Query {
    pub fn new(ast: Arc<AstGraph>, root: NodeId) -> Self {
        Self {
            ast,
            root,
            cache: EvaluatorCache::new(),
            bindings: Bindings::new(),
            functions: Arc::new(Functions::with_builtins()),
            limits: TraversalLimits::default(),
            evaluated_at: None,
        }
    }

    pub fn with_functions(mut self, functions: Arc<dyn FunctionLibrary>) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_limits(mut self, limits: TraversalLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn ast(&self) -> &AstGraph {
        &self.ast
    }

    pub fn cache(&self) -> &EvaluatorCache {
        &self.cache
    }

    /// Bind a query-local variable. Memoized results are kept; call
    /// [`Query::reset_to_initial_state`] before re-evaluating.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.set(name, value);
    }

    /// Evaluate the root node. Results memoized by an earlier run are reused.
    pub fn evaluate(
        &mut self,
        graph: &dyn GraphAccess,
        shared: Option<&SharedEnvironment>,
    ) -> EvalResult<Value> {
        let mut ev = Evaluator::new(graph, &self.ast, &mut self.cache, &mut self.bindings)
            .with_functions(self.functions.as_ref())
            .with_limits(self.limits);
        if let Some(env) = shared {
            ev = ev.with_shared(env);
        }
        let value = ev.get_result(self.root)?;
        self.evaluated_at = Some(graph.version());
        Ok(value)
    }

    /// Forget every result memoized below the root. Also recovers a query
    /// whose previous evaluation panicked part way through.
    pub fn reset_to_initial_state(&mut self) {
        self.cache.reset_all_from(&self.ast, self.root);
    }

    /// The graph changed since the last successful evaluation.
    pub fn is_stale(&self, graph: &dyn GraphAccess) -> bool {
        self.evaluated_at
            .map(|v| v != graph.version())
            .unwrap_or(true)
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("root", &self.root)
            .field("nodes", &self.ast.len())
            .field("evaluated_at", &self.evaluated_at)
            .finish()
    }
}
