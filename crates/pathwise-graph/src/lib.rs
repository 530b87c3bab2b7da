//! Pathwise graph access layer.
//!
//! The path engine never touches storage directly. Everything it needs from a
//! graph goes through the [`GraphAccess`] capability set:
//!
//! - enumerate vertices and edges,
//! - resolve an edge's endpoints and the orientation it is traversed in,
//! - iterate the incidences of a vertex filtered by [`Direction`],
//! - ask type-hierarchy and role questions about edge types,
//! - read (and, through [`GraphMutation`], write) attributes.
//!
//! [`MemGraph`] is the in-memory implementation used by tests and by callers
//! that build graphs programmatically.
//!
//! ## Identity
//!
//! Vertices and edges are dense `u32` ids so vertex sets can be stored as
//! Roaring bitmaps. An [`EdgeRef`] is an *oriented incidence*: the same edge
//! seen from its alpha vertex is `normal`, seen from its omega vertex it is
//! reversed. `canonical()` drops the orientation.

pub mod mem;
pub mod schema;

use dashmap::DashMap;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

pub use mem::MemGraph;
pub use schema::{EdgeTypeDecl, Schema, TypeDecl};

/// Vertex id (dense, starts at 0).
pub type VertexId = u32;

/// Edge id (dense, starts at 0).
pub type EdgeId = u32;

// ============================================================================
// String Interning
// ============================================================================

/// Interned name id (types, roles, attribute names).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct StrId(u32);

impl StrId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Concurrent string interner: maps names to compact ids.
pub struct StringInterner {
    str_to_id: DashMap<String, StrId, ahash::RandomState>,
    id_to_str: DashMap<StrId, String, ahash::RandomState>,
    next_id: AtomicU32,
}

impl StringInterner {
    pub fn new() -> Self {
        Self {
            str_to_id: DashMap::with_hasher(ahash::RandomState::new()),
            id_to_str: DashMap::with_hasher(ahash::RandomState::new()),
            next_id: AtomicU32::new(0),
        }
    }

    /// Intern a string, returning its id.
    pub fn intern(&self, s: &str) -> StrId {
        if let Some(id) = self.str_to_id.get(s) {
            return *id;
        }
        let entry = self.str_to_id.entry(s.to_string()).or_insert_with(|| {
            let id = StrId(self.next_id.fetch_add(1, Ordering::SeqCst));
            self.id_to_str.insert(id, s.to_string());
            id
        });
        *entry
    }

    /// Look up an existing id without inserting.
    pub fn id_of(&self, s: &str) -> Option<StrId> {
        self.str_to_id.get(s).map(|id| *id)
    }

    /// Look up a string by id.
    pub fn lookup(&self, id: StrId) -> Option<String> {
        self.id_to_str.get(&id).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.next_id.load(Ordering::SeqCst) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StringInterner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StringInterner")
            .field("len", &self.len())
            .finish()
    }
}

// ============================================================================
// Incidence model
// ============================================================================

/// Traversal direction relative to an edge's normal (alpha -> omega) orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Follow edges from alpha to omega.
    Out,
    /// Follow edges from omega to alpha.
    In,
    /// Follow edges either way.
    Any,
}

impl Direction {
    /// Swap `Out` and `In`; `Any` is its own reverse.
    pub fn reversed(self) -> Self {
        match self {
            Direction::Out => Direction::In,
            Direction::In => Direction::Out,
            Direction::Any => Direction::Any,
        }
    }

    /// Whether an incidence with the given orientation may be traversed.
    pub fn admits(self, normal: bool) -> bool {
        match self {
            Direction::Out => normal,
            Direction::In => !normal,
            Direction::Any => true,
        }
    }

    pub fn arrow(self) -> &'static str {
        match self {
            Direction::Out => "-->",
            Direction::In => "<--",
            Direction::Any => "<->",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.arrow())
    }
}

/// One end of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeEnd {
    Alpha,
    Omega,
}

impl EdgeEnd {
    pub fn opposite(self) -> Self {
        match self {
            EdgeEnd::Alpha => EdgeEnd::Omega,
            EdgeEnd::Omega => EdgeEnd::Alpha,
        }
    }
}

/// An oriented incidence of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeRef {
    pub edge: EdgeId,
    /// `true` when traversed alpha -> omega.
    pub normal: bool,
}

impl EdgeRef {
    pub const fn normal(edge: EdgeId) -> Self {
        Self { edge, normal: true }
    }

    pub const fn reversed_of(edge: EdgeId) -> Self {
        Self {
            edge,
            normal: false,
        }
    }

    /// The same edge in its normal orientation.
    pub fn canonical(self) -> Self {
        Self::normal(self.edge)
    }

    pub fn reversed(self) -> Self {
        Self {
            edge: self.edge,
            normal: !self.normal,
        }
    }

    /// The end this incidence leaves from.
    pub fn this_end(self) -> EdgeEnd {
        if self.normal {
            EdgeEnd::Alpha
        } else {
            EdgeEnd::Omega
        }
    }

    /// The end this incidence arrives at.
    pub fn that_end(self) -> EdgeEnd {
        self.this_end().opposite()
    }
}

impl fmt::Display for EdgeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.normal {
            write!(f, "e{}", self.edge)
        } else {
            write!(f, "e{}'", self.edge)
        }
    }
}

// ============================================================================
// Attributes
// ============================================================================

/// Attribute value stored on vertices and edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

// ============================================================================
// Capability traits
// ============================================================================

/// Read access to an attributed, typed graph.
///
/// Implementations must be shareable across scheduler workers.
pub trait GraphAccess: Send + Sync {
    /// All vertex ids.
    fn vertices(&self) -> RoaringBitmap;

    /// All edge ids.
    fn edges(&self) -> RoaringBitmap;

    fn vertex_count(&self) -> usize;

    fn edge_count(&self) -> usize;

    fn contains_vertex(&self, v: VertexId) -> bool;

    /// Start vertex of an edge in its normal orientation.
    fn alpha(&self, e: EdgeId) -> Option<VertexId>;

    /// End vertex of an edge in its normal orientation.
    fn omega(&self, e: EdgeId) -> Option<VertexId>;

    /// Incidences of `v` that may be traversed in `direction`.
    ///
    /// With `Direction::Any` a self-loop is reported twice (once per
    /// orientation).
    fn incidences(&self, v: VertexId, direction: Direction) -> Vec<EdgeRef>;

    fn vertex_type(&self, v: VertexId) -> Option<StrId>;

    fn edge_type(&self, e: EdgeId) -> Option<StrId>;

    /// Resolve a type name.
    fn type_id(&self, name: &str) -> Option<StrId>;

    fn type_name(&self, id: StrId) -> Option<String>;

    /// Resolve a role name.
    fn role_id(&self, name: &str) -> Option<StrId>;

    /// Reflexive, transitive subtype check.
    fn is_subtype_of(&self, sub: StrId, sup: StrId) -> bool;

    /// Role names an edge type exposes at one of its ends (own and inherited).
    fn roles_at(&self, edge_type: StrId, end: EdgeEnd) -> Vec<StrId>;

    fn vertex_attr(&self, v: VertexId, name: &str) -> Option<AttrValue>;

    fn edge_attr(&self, e: EdgeId, name: &str) -> Option<AttrValue>;

    /// Monotonic counter bumped by every mutation.
    fn version(&self) -> u64;

    /// The vertex an incidence leaves from.
    fn this(&self, edge: EdgeRef) -> Option<VertexId> {
        if edge.normal {
            self.alpha(edge.edge)
        } else {
            self.omega(edge.edge)
        }
    }

    /// The vertex an incidence arrives at.
    fn that(&self, edge: EdgeRef) -> Option<VertexId> {
        if edge.normal {
            self.omega(edge.edge)
        } else {
            self.alpha(edge.edge)
        }
    }

    /// Incidences filtered by direction and (sub)type.
    fn incidences_of_type(
        &self,
        v: VertexId,
        direction: Direction,
        edge_type: StrId,
    ) -> Vec<EdgeRef> {
        self.incidences(v, direction)
            .into_iter()
            .filter(|inc| {
                self.edge_type(inc.edge)
                    .map(|t| self.is_subtype_of(t, edge_type))
                    .unwrap_or(false)
            })
            .collect()
    }
}

/// Attribute writes.
pub trait GraphMutation {
    fn set_vertex_attr(
        &mut self,
        v: VertexId,
        name: &str,
        value: AttrValue,
    ) -> anyhow::Result<()>;

    fn set_edge_attr(&mut self, e: EdgeId, name: &str, value: AttrValue) -> anyhow::Result<()>;
}
