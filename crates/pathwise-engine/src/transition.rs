//! Transition kinds and edge matching.
//!
//! A consuming transition carries an [`EdgeConstraint`]: a direction, a type
//! collection, an optional role set and an optional guard. Constraints are
//! resolved against the graph's names once, when the path description is
//! compiled, and are shared by reference between automaton copies.
//!
//! Acceptance of a candidate incidence `e` leaving vertex `v`:
//!
//! 1. no candidate: reject;
//! 2. the orientation of `e` must be admitted by the direction;
//! 3. role/type clause: with only roles configured the role at the relevant
//!    end must match; with roles and types configured either may match; with
//!    only types the type collection decides; with neither everything passes;
//! 4. the guard (if any) must evaluate to `true`; any other value rejects;
//! 5. for edge-identity transitions the canonical edge must equal the edge
//!    computed by the nested expression; a non-edge value is an error.

use std::fmt;
use std::sync::Arc;

use pathwise_dsl::TypeTerm;
use pathwise_graph::{Direction, EdgeRef, GraphAccess, StrId, VertexId};

use crate::ast::{Guard, NodeId};
use crate::error::{EvalError, EvalResult};
use crate::eval::Evaluator;
use crate::value::Value;

// ============================================================================
// Type collections
// ============================================================================

/// Allowed/forbidden edge types. Forbidden types (and their subtypes) always
/// win over allowed ones.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeCollection {
    allowed: Vec<StrId>,
    forbidden: Vec<StrId>,
    /// No allowed type was named, so anything not forbidden passes.
    allow_all: bool,
}

impl TypeCollection {
    /// Accepts every type.
    pub fn any() -> Self {
        Self {
            allowed: Vec::new(),
            forbidden: Vec::new(),
            allow_all: true,
        }
    }

    /// Resolve type terms against the graph. Allowed names the graph does not
    /// know accept nothing; unknown forbidden names exclude nothing.
    pub fn resolve(graph: &dyn GraphAccess, terms: &[TypeTerm]) -> Self {
        let mut out = Self {
            allowed: Vec::new(),
            forbidden: Vec::new(),
            allow_all: !terms.iter().any(|t| !t.forbidden),
        };
        for term in terms {
            let Some(id) = graph.type_id(&term.name) else {
                continue;
            };
            if term.forbidden {
                out.forbidden.push(id);
            } else {
                out.allowed.push(id);
            }
        }
        out.allowed.sort();
        out.allowed.dedup();
        out.forbidden.sort();
        out.forbidden.dedup();
        out
    }

    /// True when the collection places no restriction at all.
    pub fn is_empty(&self) -> bool {
        self.allow_all && self.forbidden.is_empty()
    }

    pub fn accepts(&self, graph: &dyn GraphAccess, type_id: StrId) -> bool {
        if self
            .forbidden
            .iter()
            .any(|f| graph.is_subtype_of(type_id, *f))
        {
            return false;
        }
        self.allow_all || self.allowed.iter().any(|a| graph.is_subtype_of(type_id, *a))
    }
}

// ============================================================================
// Role sets
// ============================================================================

/// Which end of the traversed incidence a role set is checked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleEnd {
    /// The end the traversal arrives at.
    To,
    /// The end the traversal leaves from.
    From,
}

impl RoleEnd {
    pub fn opposite(self) -> Self {
        match self {
            RoleEnd::To => RoleEnd::From,
            RoleEnd::From => RoleEnd::To,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSet {
    roles: Vec<StrId>,
    end: RoleEnd,
}

impl RoleSet {
    /// Resolve role names; names unknown to the graph match nothing.
    pub fn resolve(graph: &dyn GraphAccess, names: &[String], end: RoleEnd) -> Self {
        let mut roles: Vec<StrId> = names.iter().filter_map(|n| graph.role_id(n)).collect();
        roles.sort();
        roles.dedup();
        Self { roles, end }
    }

    pub fn end(&self) -> RoleEnd {
        self.end
    }

    pub fn reversed(&self) -> Self {
        Self {
            roles: self.roles.clone(),
            end: self.end.opposite(),
        }
    }

    fn matches(&self, graph: &dyn GraphAccess, edge_type: StrId, edge: EdgeRef) -> bool {
        let end = match self.end {
            RoleEnd::To => edge.that_end(),
            RoleEnd::From => edge.this_end(),
        };
        graph
            .roles_at(edge_type, end)
            .iter()
            .any(|r| self.roles.contains(r))
    }
}

// ============================================================================
// Edge constraints
// ============================================================================

#[derive(Debug, Clone)]
pub struct EdgeConstraint {
    pub direction: Direction,
    pub types: TypeCollection,
    pub roles: Option<RoleSet>,
    pub guard: Option<Guard>,
    label: String,
}

impl EdgeConstraint {
    /// Direction-only constraint.
    pub fn wildcard(direction: Direction) -> Self {
        Self {
            direction,
            types: TypeCollection::any(),
            roles: None,
            guard: None,
            label: direction.arrow().to_string(),
        }
    }

    pub fn resolve(
        graph: &dyn GraphAccess,
        direction: Direction,
        types: &[TypeTerm],
        roles: &[String],
        guard: Option<Guard>,
    ) -> Self {
        let roles_set = if roles.is_empty() {
            None
        } else {
            Some(RoleSet::resolve(graph, roles, RoleEnd::To))
        };
        Self {
            direction,
            types: TypeCollection::resolve(graph, types),
            roles: roles_set,
            label: render_label(direction, types, roles, guard.as_ref()),
            guard,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The same constraint for traversing the path backwards.
    pub fn reversed(&self) -> Self {
        let direction = self.direction.reversed();
        let label = match self.label.strip_prefix(self.direction.arrow()) {
            Some(rest) => format!("{}{}", direction.arrow(), rest),
            None => self.label.clone(),
        };
        Self {
            direction,
            types: self.types.clone(),
            roles: self.roles.as_ref().map(RoleSet::reversed),
            guard: self.guard.clone(),
            label,
        }
    }

    /// Direction and role/type clauses (steps 2 and 3).
    pub fn matches_structure(&self, graph: &dyn GraphAccess, edge: EdgeRef) -> bool {
        if !self.direction.admits(edge.normal) {
            return false;
        }
        if self.types.is_empty() && self.roles.is_none() {
            return true;
        }
        let Some(edge_type) = graph.edge_type(edge.edge) else {
            return false;
        };
        match &self.roles {
            Some(roles) if roles.matches(graph, edge_type, edge) => true,
            // Roles-only: the type collection does not get a say.
            Some(_) if self.types.is_empty() => false,
            _ => self.types.accepts(graph, edge_type),
        }
    }

    fn same_symbol(&self, other: &EdgeConstraint) -> bool {
        self.direction == other.direction
            && self.types == other.types
            && self.roles == other.roles
            && self.guard == other.guard
    }
}

fn render_label(
    direction: Direction,
    types: &[TypeTerm],
    roles: &[String],
    guard: Option<&Guard>,
) -> String {
    let mut label = direction.arrow().to_string();
    let items: Vec<String> = types
        .iter()
        .map(|t| {
            if t.forbidden {
                format!("^{}", t.name)
            } else {
                t.name.clone()
            }
        })
        .chain(roles.iter().map(|r| format!("@{r}")))
        .collect();
    if !items.is_empty() {
        label.push('{');
        label.push_str(&items.join(", "));
        label.push('}');
    }
    if let Some(g) = guard {
        label.push_str(&format!(" [{}]", g.predicate));
    }
    label
}

// ============================================================================
// Transitions
// ============================================================================

#[derive(Debug, Clone)]
pub enum TransitionKind {
    Epsilon,
    Simple(Arc<EdgeConstraint>),
    /// Simple constraint plus a nested expression naming the one edge allowed.
    Edge {
        constraint: Arc<EdgeConstraint>,
        edge: NodeId,
    },
}

impl TransitionKind {
    pub fn simple(constraint: EdgeConstraint) -> Self {
        TransitionKind::Simple(Arc::new(constraint))
    }

    pub fn is_epsilon(&self) -> bool {
        matches!(self, TransitionKind::Epsilon)
    }

    pub fn consumes_edge(&self) -> bool {
        !self.is_epsilon()
    }

    pub fn constraint(&self) -> Option<&EdgeConstraint> {
        match self {
            TransitionKind::Epsilon => None,
            TransitionKind::Simple(c) | TransitionKind::Edge { constraint: c, .. } => Some(c),
        }
    }

    /// Kind for the reversed automaton.
    pub fn reverse(&self) -> Self {
        match self {
            TransitionKind::Epsilon => TransitionKind::Epsilon,
            TransitionKind::Simple(c) => TransitionKind::Simple(Arc::new(c.reversed())),
            TransitionKind::Edge { constraint, edge } => TransitionKind::Edge {
                constraint: Arc::new(constraint.reversed()),
                edge: *edge,
            },
        }
    }

    /// Same matching behavior. Guards compare by node identity.
    pub fn equal_symbol(&self, other: &TransitionKind) -> bool {
        match (self, other) {
            (TransitionKind::Epsilon, TransitionKind::Epsilon) => true,
            (TransitionKind::Simple(a), TransitionKind::Simple(b)) => {
                Arc::ptr_eq(a, b) || a.same_symbol(b)
            }
            (
                TransitionKind::Edge {
                    constraint: a,
                    edge: ea,
                },
                TransitionKind::Edge {
                    constraint: b,
                    edge: eb,
                },
            ) => ea == eb && (Arc::ptr_eq(a, b) || a.same_symbol(b)),
            _ => false,
        }
    }

    /// Whether the transition may consume `edge` when leaving `from`.
    pub fn accepts(
        &self,
        graph: &dyn GraphAccess,
        from: VertexId,
        edge: Option<EdgeRef>,
        ev: &mut Evaluator<'_>,
    ) -> EvalResult<bool> {
        let Some(edge) = edge else {
            return Ok(false);
        };
        let constraint = match self {
            TransitionKind::Epsilon => return Ok(true),
            TransitionKind::Simple(c) | TransitionKind::Edge { constraint: c, .. } => c,
        };
        if graph.this(edge) != Some(from) || !constraint.matches_structure(graph, edge) {
            return Ok(false);
        }
        if let Some(guard) = &constraint.guard {
            if !ev.evaluate_guard(guard, edge)? {
                return Ok(false);
            }
        }
        if let TransitionKind::Edge { edge: node, .. } = self {
            match ev.get_result(*node)? {
                Value::Edge(expected) => return Ok(expected.canonical() == edge.canonical()),
                other => {
                    return Err(EvalError::type_mismatch(
                        format!("edge restriction {node}"),
                        "edge",
                        other.kind(),
                    ))
                }
            }
        }
        Ok(true)
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionKind::Epsilon => f.write_str("ε"),
            TransitionKind::Simple(c) => f.write_str(c.label()),
            TransitionKind::Edge { constraint, edge } => {
                write!(f, "{} ={edge}", constraint.label())
            }
        }
    }
}
