//! Pathwise engine: path-description automata over attributed graphs.
//!
//! ## Pipeline
//!
//! ```text
//! AstGraph node ──compile──▶ Nfa ──simulate over GraphAccess──▶ Value
//!                                                     │
//!                         EvaluatorCache (per query) ◀┘
//! ```
//!
//! - [`ast`]: arena of syntax nodes (expressions, path descriptions, path
//!   queries).
//! - [`automaton`] / [`transition`]: NFA composition and edge matching.
//! - [`eval`] / [`cache`]: memoized, cycle-checked node evaluation.
//! - [`path`]: breadth-first simulation over `(vertex, state)` pairs.
//! - [`scheduler`]: runs batches of interdependent queries on a worker pool.
//!
//! ## Example
//!
//! ```ignore
//! let mut ast = AstGraph::new();
//! let path = ast.lower_path_expr(&parse_path_expr("-->{Knows}+")?);
//! let nfa = compile_path_description(&graph, &ast, path)?;
//! ```

pub mod ast;
pub mod automaton;
pub mod cache;
pub mod config;
pub mod env;
pub mod error;
pub mod eval;
pub mod path;
pub mod query;
pub mod scheduler;
pub mod transition;
pub mod value;

use std::sync::Arc;

use pathwise_graph::GraphAccess;
use roaring::RoaringBitmap;

pub use ast::{AstGraph, AstNode, CompareOp, Guard, Iteration, NodeId};
pub use automaton::{Nfa, State, StateId, StateRegistry, Transition};
pub use cache::{EntryState, EvaluatorCache};
pub use config::{EngineConfig, SchedulerConfig, TraversalLimits};
pub use env::{Bindings, FunctionLibrary, Functions, SharedEnvironment};
pub use error::{EvalError, EvalResult};
pub use eval::Evaluator;
pub use path::{PathEvaluator, PathSystem};
pub use query::Query;
pub use scheduler::{DependencyGraph, ParallelScheduler, QueryBody, QueryStatus, ScheduleReport};
pub use transition::{EdgeConstraint, RoleEnd, RoleSet, TransitionKind, TypeCollection};
pub use value::Value;

/// Shared, immutable compiled automaton.
pub type AutomatonHandle = Arc<Nfa>;

/// Compile the path description rooted at `node`.
pub fn compile_path_description(
    graph: &dyn GraphAccess,
    ast: &AstGraph,
    node: NodeId,
) -> EvalResult<AutomatonHandle> {
    let mut cache = EvaluatorCache::new();
    let mut bindings = Bindings::new();
    let mut ev = Evaluator::new(graph, ast, &mut cache, &mut bindings);
    let nfa = ev
        .get_result(node)?
        .to_automaton(&format!("path description {node}"))?;
    nfa.validate()?;
    Ok(nfa)
}

/// Vertices reachable from `start` through `automaton`. Guards are evaluated
/// with `ev`, which must belong to the syntax graph the automaton was
/// compiled from.
pub fn evaluate(
    automaton: &AutomatonHandle,
    start: &RoaringBitmap,
    ev: &mut Evaluator<'_>,
) -> EvalResult<RoaringBitmap> {
    let limits = ev.limits();
    PathEvaluator::new(automaton)
        .with_limits(limits)
        .reachable(start, ev)
}

/// Run every query in `dag` with the given scheduler configuration.
pub fn schedule_queries(
    graph: &dyn GraphAccess,
    dag: &mut DependencyGraph,
    env: &SharedEnvironment,
    config: &SchedulerConfig,
) -> EvalResult<()> {
    ParallelScheduler::new(config.clone()).run(graph, dag, env)
}
