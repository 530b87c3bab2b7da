//! AST evaluation.
//!
//! [`Evaluator::get_result`] is the only entry point: it consults the cache,
//! dispatches to the rule for the node's kind and memoizes the result. Path
//! description nodes evaluate to automata; path query nodes run those
//! automata over the graph.

use std::sync::Arc;

use pathwise_dsl::MAX_EXPONENT;
use pathwise_graph::{EdgeRef, GraphAccess};
use roaring::RoaringBitmap;

use crate::ast::{AstGraph, AstNode, CompareOp, Guard, Iteration, NodeId};
use crate::automaton::Nfa;
use crate::cache::EvaluatorCache;
use crate::config::TraversalLimits;
use crate::env::{Bindings, FunctionLibrary, Functions, SharedEnvironment};
use crate::error::{EvalError, EvalResult};
use crate::path::PathEvaluator;
use crate::transition::{EdgeConstraint, TransitionKind, TypeCollection};
use crate::value::Value;

pub struct Evaluator<'a> {
    graph: &'a dyn GraphAccess,
    ast: &'a AstGraph,
    cache: &'a mut EvaluatorCache,
    bindings: &'a mut Bindings,
    shared: Option<&'a SharedEnvironment>,
    functions: &'a dyn FunctionLibrary,
    limits: TraversalLimits,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        graph: &'a dyn GraphAccess,
        ast: &'a AstGraph,
        cache: &'a mut EvaluatorCache,
        bindings: &'a mut Bindings,
    ) -> Self {
        Self {
            graph,
            ast,
            cache,
            bindings,
            shared: None,
            functions: Functions::standard(),
            limits: TraversalLimits::default(),
        }
    }

    pub fn with_shared(mut self, shared: &'a SharedEnvironment) -> Self {
        self.shared = Some(shared);
        self
    }

    pub fn with_functions(mut self, functions: &'a dyn FunctionLibrary) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_limits(mut self, limits: TraversalLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn graph(&self) -> &'a dyn GraphAccess {
        self.graph
    }

    pub fn ast(&self) -> &'a AstGraph {
        self.ast
    }

    pub fn limits(&self) -> TraversalLimits {
        self.limits
    }

    pub fn cache(&self) -> &EvaluatorCache {
        &*self.cache
    }

    /// Memoized result of `node`.
    pub fn get_result(&mut self, node: NodeId) -> EvalResult<Value> {
        let ast = self.ast;
        let rule = ast.get(node)?;
        if let Some(value) = self.cache.begin(node)? {
            return Ok(value);
        }
        match self.evaluate_rule(node, rule) {
            Ok(value) => {
                self.cache.finish(node, value.clone());
                Ok(value)
            }
            Err(err) => {
                self.cache.abort(node);
                Err(err)
            }
        }
    }

    /// Forget memoized results below `root`, including entries left
    /// `InProgress` by an abandoned evaluation.
    pub fn reset_to_initial_state(&mut self, root: NodeId) {
        self.cache.reset_all_from(self.ast, root);
    }

    /// Evaluate a guard for one candidate edge. Only `true` accepts.
    pub fn evaluate_guard(&mut self, guard: &Guard, edge: EdgeRef) -> EvalResult<bool> {
        let Some(var) = &guard.this_edge else {
            // Nothing edge-specific in scope: the memoized value stands.
            return Ok(self.get_result(guard.predicate)?.as_bool() == Some(true));
        };
        self.cache.reset_from(self.ast, guard.predicate);
        self.bindings.push(var.clone(), Value::Edge(edge));
        let result = self.get_result(guard.predicate);
        self.bindings.pop();
        Ok(result?.as_bool() == Some(true))
    }

    fn evaluate_rule(&mut self, node: NodeId, rule: &'a AstNode) -> EvalResult<Value> {
        match rule {
            AstNode::Literal(value) => Ok(value.clone()),
            AstNode::Variable(name) => self.lookup(name),
            AstNode::Attribute { target, name } => {
                let graph = self.graph;
                match self.get_result(*target)? {
                    Value::Vertex(v) => Ok(graph
                        .vertex_attr(v, name)
                        .map(Value::from)
                        .unwrap_or(Value::Null)),
                    Value::Edge(e) => Ok(graph
                        .edge_attr(e.edge, name)
                        .map(Value::from)
                        .unwrap_or(Value::Null)),
                    Value::Null => Ok(Value::Null),
                    other => Err(EvalError::type_mismatch(
                        format!("attribute {name:?}"),
                        "vertex or edge",
                        other.kind(),
                    )),
                }
            }
            AstNode::Compare { op, lhs, rhs } => {
                let l = self.get_result(*lhs)?;
                let r = self.get_result(*rhs)?;
                Ok(compare(*op, &l, &r))
            }
            AstNode::And(items) => self.logical(items, false),
            AstNode::Or(items) => self.logical(items, true),
            AstNode::Not(inner) => Ok(match self.get_result(*inner)? {
                Value::Bool(b) => Value::Bool(!b),
                _ => Value::Null,
            }),
            AstNode::Call { function, args } => {
                let args = args
                    .iter()
                    .map(|a| self.get_result(*a))
                    .collect::<EvalResult<Vec<_>>>()?;
                self.functions.call(function, &args)
            }
            AstNode::Vertices { types } => {
                let graph = self.graph;
                let collection = TypeCollection::resolve(graph, types);
                let set: RoaringBitmap = graph
                    .vertices()
                    .iter()
                    .filter(|v| {
                        graph
                            .vertex_type(*v)
                            .map(|t| collection.accepts(graph, t))
                            .unwrap_or(false)
                    })
                    .collect();
                Ok(Value::VertexSet(set))
            }
            AstNode::ForwardVertexSet { start, path } => {
                let start = self.get_result(*start)?.to_vertex_set("forward vertex set")?;
                let nfa = self.automaton_of(*path)?;
                let limits = self.limits;
                let set = PathEvaluator::new(&nfa)
                    .with_limits(limits)
                    .reachable(&start, self)?;
                Ok(Value::VertexSet(set))
            }
            AstNode::BackwardVertexSet { target, path } => {
                let target = self.get_result(*target)?.to_vertex_set("backward vertex set")?;
                let nfa = self.automaton_of(*path)?;
                let limits = self.limits;
                let set = PathEvaluator::new(&nfa)
                    .with_limits(limits)
                    .reachable_backward(&target, self)?;
                Ok(Value::VertexSet(set))
            }
            AstNode::PathExistence {
                start,
                path,
                target,
            } => {
                let start = self.get_result(*start)?.to_vertex_set("path existence")?;
                let target = self.get_result(*target)?.to_vertex_set("path existence")?;
                let nfa = self.automaton_of(*path)?;
                let limits = self.limits;
                let found = PathEvaluator::new(&nfa)
                    .with_limits(limits)
                    .exists(&start, &target, self)?;
                Ok(Value::Bool(found))
            }
            AstNode::PathSystem { start, path } => {
                let start = self.get_result(*start)?.to_vertex_set("path system")?;
                let nfa = self.automaton_of(*path)?;
                let limits = self.limits;
                let system = PathEvaluator::new(&nfa)
                    .with_limits(limits)
                    .path_system(&start, self)?;
                Ok(Value::PathSystem(Arc::new(system)))
            }
            _ => {
                let nfa = self.compile(node, rule)?;
                tracing::debug!(
                    node = %node,
                    states = nfa.state_count(),
                    transitions = nfa.transition_count(),
                    "compiled path description"
                );
                Ok(Value::Automaton(Arc::new(nfa)))
            }
        }
    }

    fn lookup(&self, name: &str) -> EvalResult<Value> {
        if let Some(v) = self.bindings.get(name) {
            return Ok(v.clone());
        }
        self.shared
            .and_then(|env| env.get(name))
            .ok_or_else(|| EvalError::UnresolvedVariable(name.to_string()))
    }

    /// Three-valued AND/OR: `short` is the value that decides the result.
    fn logical(&mut self, items: &[NodeId], short: bool) -> EvalResult<Value> {
        let mut unknown = false;
        for item in items {
            match self.get_result(*item)? {
                Value::Bool(b) if b == short => return Ok(Value::Bool(short)),
                Value::Bool(_) => {}
                _ => unknown = true,
            }
        }
        Ok(if unknown {
            Value::Null
        } else {
            Value::Bool(!short)
        })
    }

    fn automaton_of(&mut self, path: NodeId) -> EvalResult<Arc<Nfa>> {
        self.get_result(path)?
            .to_automaton(&format!("path description {path}"))
    }

    /// Private copy of a child automaton for splicing.
    fn fragment(&mut self, child: NodeId) -> EvalResult<Nfa> {
        Ok(self.automaton_of(child)?.copy(true))
    }

    fn compile(&mut self, node: NodeId, rule: &'a AstNode) -> EvalResult<Nfa> {
        let graph = self.graph;
        let nfa = match rule {
            AstNode::SimplePath {
                direction,
                types,
                roles,
                guard,
            } => Nfa::single(TransitionKind::simple(EdgeConstraint::resolve(
                graph,
                *direction,
                types,
                roles,
                guard.clone(),
            ))),
            AstNode::EdgePath {
                direction,
                edge,
                types,
                roles,
                guard,
            } => Nfa::single(TransitionKind::Edge {
                constraint: Arc::new(EdgeConstraint::resolve(
                    graph,
                    *direction,
                    types,
                    roles,
                    guard.clone(),
                )),
                edge: *edge,
            }),
            AstNode::Sequence(parts) => {
                let mut out = Nfa::epsilon();
                for (i, part) in parts.iter().enumerate() {
                    let frag = self.fragment(*part)?;
                    out = if i == 0 { frag } else { out.concat(frag) };
                }
                out
            }
            AstNode::Alternative(parts) => {
                let mut out: Option<Nfa> = None;
                for part in parts {
                    let frag = self.fragment(*part)?;
                    out = Some(match out {
                        Some(acc) => acc.union(frag),
                        None => frag,
                    });
                }
                out.ok_or_else(|| {
                    EvalError::InvalidAutomaton(format!("alternative {node} has no branches"))
                })?
            }
            AstNode::Iterated { inner, kind } => {
                let frag = self.fragment(*inner)?;
                match kind {
                    Iteration::Star => frag.star(),
                    Iteration::Plus => frag.plus(),
                }
            }
            AstNode::Optional(inner) => self.fragment(*inner)?.optional(),
            AstNode::Exponentiated { inner, exponent } => {
                if *exponent > MAX_EXPONENT {
                    return Err(EvalError::InvalidAutomaton(format!(
                        "exponent {exponent} at {node} exceeds {MAX_EXPONENT}"
                    )));
                }
                self.automaton_of(*inner)?.exponent(*exponent)
            }
            AstNode::Transposed(inner) => self.automaton_of(*inner)?.reverse(),
            other => {
                return Err(EvalError::type_mismatch(
                    format!("node {node}"),
                    "path description",
                    node_kind(other),
                ))
            }
        };
        Ok(nfa)
    }
}

fn compare(op: CompareOp, l: &Value, r: &Value) -> Value {
    use std::cmp::Ordering;
    match op {
        CompareOp::Eq => Value::Bool(l == r),
        CompareOp::Ne => Value::Bool(l != r),
        _ => match l.partial_cmp_value(r) {
            None => Value::Null,
            Some(ord) => Value::Bool(match op {
                CompareOp::Lt => ord == Ordering::Less,
                CompareOp::Le => ord != Ordering::Greater,
                CompareOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }),
        },
    }
}

fn node_kind(node: &AstNode) -> &'static str {
    match node {
        AstNode::Literal(_) => "literal",
        AstNode::Variable(_) => "variable",
        AstNode::Attribute { .. } => "attribute",
        AstNode::Compare { .. } => "comparison",
        AstNode::And(_) | AstNode::Or(_) | AstNode::Not(_) => "boolean expression",
        AstNode::Call { .. } => "function call",
        AstNode::Vertices { .. } => "vertex set",
        AstNode::ForwardVertexSet { .. }
        | AstNode::BackwardVertexSet { .. }
        | AstNode::PathExistence { .. }
        | AstNode::PathSystem { .. } => "path query",
        _ => "path description",
    }
}
