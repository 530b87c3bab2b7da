//! Abstract syntax graph.
//!
//! Nodes live in an arena and refer to their children by [`NodeId`]. Because
//! ids can be handed out before the node is defined ([`AstGraph::declare`]),
//! the structure is a graph rather than a tree: subexpressions can be shared
//! and a node can even reference itself. Evaluation rejects the latter with
//! `EvalError::CyclicEvaluation`.

use std::fmt;

use pathwise_dsl::{Arrow, PathExpr, TypeTerm};
use pathwise_graph::Direction;

use crate::error::{EvalError, EvalResult};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iteration {
    /// Zero or more repetitions.
    Star,
    /// One or more repetitions.
    Plus,
}

/// Boolean restriction on the edges a path step may traverse.
///
/// While `predicate` is evaluated for a candidate edge, the edge is bound to
/// `this_edge` (when declared).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub predicate: NodeId,
    pub this_edge: Option<String>,
}

impl Guard {
    pub fn new(predicate: NodeId) -> Self {
        Self {
            predicate,
            this_edge: None,
        }
    }

    pub fn binding(predicate: NodeId, this_edge: impl Into<String>) -> Self {
        Self {
            predicate,
            this_edge: Some(this_edge.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AstNode {
    // Expressions
    Literal(Value),
    Variable(String),
    Attribute {
        target: NodeId,
        name: String,
    },
    Compare {
        op: CompareOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    And(Vec<NodeId>),
    Or(Vec<NodeId>),
    Not(NodeId),
    Call {
        function: String,
        args: Vec<NodeId>,
    },
    /// All vertices whose type is accepted by `types`.
    Vertices {
        types: Vec<TypeTerm>,
    },

    // Path descriptions (evaluate to automata)
    SimplePath {
        direction: Direction,
        types: Vec<TypeTerm>,
        roles: Vec<String>,
        guard: Option<Guard>,
    },
    EdgePath {
        direction: Direction,
        edge: NodeId,
        types: Vec<TypeTerm>,
        roles: Vec<String>,
        guard: Option<Guard>,
    },
    Sequence(Vec<NodeId>),
    Alternative(Vec<NodeId>),
    Iterated {
        inner: NodeId,
        kind: Iteration,
    },
    Optional(NodeId),
    Exponentiated {
        inner: NodeId,
        exponent: u32,
    },
    Transposed(NodeId),

    // Path queries
    ForwardVertexSet {
        start: NodeId,
        path: NodeId,
    },
    BackwardVertexSet {
        target: NodeId,
        path: NodeId,
    },
    PathExistence {
        start: NodeId,
        path: NodeId,
        target: NodeId,
    },
    PathSystem {
        start: NodeId,
        path: NodeId,
    },
}

impl AstNode {
    /// Ids this node evaluates (guards included).
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            AstNode::Literal(_) | AstNode::Variable(_) | AstNode::Vertices { .. } => Vec::new(),
            AstNode::Attribute { target, .. } => vec![*target],
            AstNode::Compare { lhs, rhs, .. } => vec![*lhs, *rhs],
            AstNode::And(items)
            | AstNode::Or(items)
            | AstNode::Sequence(items)
            | AstNode::Alternative(items) => items.clone(),
            AstNode::Call { args, .. } => args.clone(),
            AstNode::Not(inner)
            | AstNode::Optional(inner)
            | AstNode::Transposed(inner)
            | AstNode::Iterated { inner, .. }
            | AstNode::Exponentiated { inner, .. } => vec![*inner],
            AstNode::SimplePath { guard, .. } => guard.iter().map(|g| g.predicate).collect(),
            AstNode::EdgePath { edge, guard, .. } => std::iter::once(*edge)
                .chain(guard.iter().map(|g| g.predicate))
                .collect(),
            AstNode::ForwardVertexSet { start, path } | AstNode::PathSystem { start, path } => {
                vec![*start, *path]
            }
            AstNode::BackwardVertexSet { target, path } => vec![*target, *path],
            AstNode::PathExistence {
                start,
                path,
                target,
            } => vec![*start, *path, *target],
        }
    }

    pub fn is_path_description(&self) -> bool {
        matches!(
            self,
            AstNode::SimplePath { .. }
                | AstNode::EdgePath { .. }
                | AstNode::Sequence(_)
                | AstNode::Alternative(_)
                | AstNode::Iterated { .. }
                | AstNode::Optional(_)
                | AstNode::Exponentiated { .. }
                | AstNode::Transposed(_)
        )
    }
}

/// Arena of syntax nodes.
#[derive(Debug, Clone, Default)]
pub struct AstGraph {
    nodes: Vec<Option<AstNode>>,
}

impl AstGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add(&mut self, node: AstNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(node));
        id
    }

    /// Reserve an id to be filled in later with [`AstGraph::define`].
    pub fn declare(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(None);
        id
    }

    pub fn define(&mut self, id: NodeId, node: AstNode) -> EvalResult<()> {
        let slot = self
            .nodes
            .get_mut(id.index())
            .ok_or(EvalError::UnknownNode(id))?;
        *slot = Some(node);
        Ok(())
    }

    pub fn get(&self, id: NodeId) -> EvalResult<&AstNode> {
        match self.nodes.get(id.index()) {
            Some(Some(node)) => Ok(node),
            Some(None) => Err(EvalError::UndefinedNode(id)),
            None => Err(EvalError::UnknownNode(id)),
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    pub fn literal(&mut self, value: impl Into<Value>) -> NodeId {
        self.add(AstNode::Literal(value.into()))
    }

    pub fn variable(&mut self, name: impl Into<String>) -> NodeId {
        self.add(AstNode::Variable(name.into()))
    }

    /// Unguarded edge step restricted to the given (allowed) edge types.
    pub fn edge_step(&mut self, direction: Direction, types: &[&str]) -> NodeId {
        self.add(AstNode::SimplePath {
            direction,
            types: types.iter().map(|t| TypeTerm::allowed(*t)).collect(),
            roles: Vec::new(),
            guard: None,
        })
    }

    /// Lower a parsed path description into path nodes.
    pub fn lower_path_expr(&mut self, expr: &PathExpr) -> NodeId {
        match expr {
            PathExpr::Edge {
                arrow,
                types,
                roles,
            } => self.add(AstNode::SimplePath {
                direction: arrow_direction(*arrow),
                types: types.clone(),
                roles: roles.clone(),
                guard: None,
            }),
            PathExpr::Seq(parts) => {
                let ids = parts.iter().map(|p| self.lower_path_expr(p)).collect();
                self.add(AstNode::Sequence(ids))
            }
            PathExpr::Alt(parts) => {
                let ids = parts.iter().map(|p| self.lower_path_expr(p)).collect();
                self.add(AstNode::Alternative(ids))
            }
            PathExpr::Star(inner) => {
                let inner = self.lower_path_expr(inner);
                self.add(AstNode::Iterated {
                    inner,
                    kind: Iteration::Star,
                })
            }
            PathExpr::Plus(inner) => {
                let inner = self.lower_path_expr(inner);
                self.add(AstNode::Iterated {
                    inner,
                    kind: Iteration::Plus,
                })
            }
            PathExpr::Opt(inner) => {
                let inner = self.lower_path_expr(inner);
                self.add(AstNode::Optional(inner))
            }
            PathExpr::Exp(inner, exponent) => {
                let inner = self.lower_path_expr(inner);
                self.add(AstNode::Exponentiated {
                    inner,
                    exponent: *exponent,
                })
            }
            PathExpr::Transpose(inner) => {
                let inner = self.lower_path_expr(inner);
                self.add(AstNode::Transposed(inner))
            }
        }
    }
}

fn arrow_direction(arrow: Arrow) -> Direction {
    match arrow {
        Arrow::Out => Direction::Out,
        Arrow::In => Direction::In,
        Arrow::Any => Direction::Any,
    }
}
