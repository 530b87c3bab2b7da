//! In-memory attributed graph.
//!
//! Storage is columnar: one column per vertex/edge property plus per-vertex
//! incidence lists. Type names are interned; the type index maps each concrete
//! type to the bitmap of its instances.

use ahash::AHashMap;

use anyhow::{anyhow, Result};
use roaring::RoaringBitmap;

use crate::schema::Schema;
use crate::{
    AttrValue, Direction, EdgeEnd, EdgeId, EdgeRef, GraphAccess, GraphMutation, StrId,
    StringInterner, VertexId,
};

// ============================================================================
// Vertex Storage (Columnar)
// ============================================================================

#[derive(Debug, Default)]
pub struct VertexStore {
    /// Type column: vertex_id -> type_id
    types: Vec<StrId>,
    /// Attribute columns: attr_name -> (vertex_id -> value)
    attrs: AHashMap<StrId, AHashMap<VertexId, AttrValue>>,
    /// Type index: type_id -> bitmap of vertex ids
    type_index: AHashMap<StrId, RoaringBitmap>,
    /// Incidence lists: vertex_id -> edge ids leaving / entering it
    out_edges: Vec<Vec<EdgeId>>,
    in_edges: Vec<Vec<EdgeId>>,
}

impl VertexStore {
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn add(&mut self, type_id: StrId, attrs: Vec<(StrId, AttrValue)>) -> VertexId {
        let id = self.types.len() as VertexId;
        self.types.push(type_id);
        self.out_edges.push(Vec::new());
        self.in_edges.push(Vec::new());
        self.type_index
            .entry(type_id)
            .or_insert_with(RoaringBitmap::new)
            .insert(id);
        for (name, value) in attrs {
            self.attrs.entry(name).or_default().insert(id, value);
        }
        id
    }

    pub fn get_type(&self, v: VertexId) -> Option<StrId> {
        self.types.get(v as usize).copied()
    }

    pub fn by_type(&self, type_id: StrId) -> Option<&RoaringBitmap> {
        self.type_index.get(&type_id)
    }
}

// ============================================================================
// Edge Storage
// ============================================================================

#[derive(Debug, Default)]
pub struct EdgeStore {
    types: Vec<StrId>,
    alpha: Vec<VertexId>,
    omega: Vec<VertexId>,
    attrs: AHashMap<StrId, AHashMap<EdgeId, AttrValue>>,
    type_index: AHashMap<StrId, RoaringBitmap>,
}

impl EdgeStore {
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn add(
        &mut self,
        type_id: StrId,
        alpha: VertexId,
        omega: VertexId,
        attrs: Vec<(StrId, AttrValue)>,
    ) -> EdgeId {
        let id = self.types.len() as EdgeId;
        self.types.push(type_id);
        self.alpha.push(alpha);
        self.omega.push(omega);
        self.type_index
            .entry(type_id)
            .or_insert_with(RoaringBitmap::new)
            .insert(id);
        for (name, value) in attrs {
            self.attrs.entry(name).or_default().insert(id, value);
        }
        id
    }

    pub fn by_type(&self, type_id: StrId) -> Option<&RoaringBitmap> {
        self.type_index.get(&type_id)
    }
}

// ============================================================================
// MemGraph
// ============================================================================

#[derive(Debug, Default)]
pub struct MemGraph {
    interner: StringInterner,
    schema: Schema,
    vertices: VertexStore,
    edges: EdgeStore,
    version: u64,
}

impl MemGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interner(&self) -> &StringInterner {
        &self.interner
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Declare a vertex type. Supertypes must already be declared.
    pub fn declare_vertex_type(&mut self, name: &str, supertypes: &[&str]) -> Result<StrId> {
        let id = self.interner.intern(name);
        let sups = self.resolve_types(supertypes)?;
        self.schema.declare_vertex_type(id, sups)?;
        Ok(id)
    }

    /// Declare an edge type with optional role names at its alpha/omega ends.
    pub fn declare_edge_type(
        &mut self,
        name: &str,
        supertypes: &[&str],
        alpha_role: Option<&str>,
        omega_role: Option<&str>,
    ) -> Result<StrId> {
        let id = self.interner.intern(name);
        let sups = self.resolve_types(supertypes)?;
        let alpha_role = alpha_role.map(|r| self.interner.intern(r));
        let omega_role = omega_role.map(|r| self.interner.intern(r));
        self.schema
            .declare_edge_type(id, sups, alpha_role, omega_role)?;
        Ok(id)
    }

    fn resolve_types(&self, names: &[&str]) -> Result<Vec<StrId>> {
        names
            .iter()
            .map(|n| {
                self.interner
                    .id_of(n)
                    .filter(|id| self.schema.contains(*id))
                    .ok_or_else(|| anyhow!("unknown type {n:?}"))
            })
            .collect()
    }

    fn intern_attrs(&self, attrs: Vec<(&str, AttrValue)>) -> Vec<(StrId, AttrValue)> {
        attrs
            .into_iter()
            .map(|(k, v)| (self.interner.intern(k), v))
            .collect()
    }

    /// Add a vertex. Undeclared type names are declared as root vertex types.
    pub fn add_vertex(&mut self, type_name: &str, attrs: Vec<(&str, AttrValue)>) -> Result<VertexId> {
        let type_id = self.interner.intern(type_name);
        if !self.schema.contains(type_id) {
            self.schema.declare_vertex_type(type_id, Vec::new())?;
        } else if self.schema.is_edge_type(type_id) {
            return Err(anyhow!("{type_name:?} is an edge type"));
        }
        let attrs = self.intern_attrs(attrs);
        self.version += 1;
        Ok(self.vertices.add(type_id, attrs))
    }

    /// Add an edge `alpha -[type]-> omega`. Undeclared type names are declared
    /// as root edge types without roles.
    pub fn add_edge(
        &mut self,
        type_name: &str,
        alpha: VertexId,
        omega: VertexId,
        attrs: Vec<(&str, AttrValue)>,
    ) -> Result<EdgeId> {
        for v in [alpha, omega] {
            if !self.contains_vertex(v) {
                return Err(anyhow!("unknown vertex id {v}"));
            }
        }
        let type_id = self.interner.intern(type_name);
        if !self.schema.contains(type_id) {
            self.schema
                .declare_edge_type(type_id, Vec::new(), None, None)?;
        } else if !self.schema.is_edge_type(type_id) {
            return Err(anyhow!("{type_name:?} is a vertex type"));
        }
        let attrs = self.intern_attrs(attrs);
        let id = self.edges.add(type_id, alpha, omega, attrs);
        self.vertices.out_edges[alpha as usize].push(id);
        self.vertices.in_edges[omega as usize].push(id);
        self.version += 1;
        Ok(id)
    }

    /// Vertices whose type is `type_name` or one of its subtypes.
    pub fn find_by_type(&self, type_name: &str) -> RoaringBitmap {
        let mut out = RoaringBitmap::new();
        let Some(sup) = self.interner.id_of(type_name) else {
            return out;
        };
        for (t, ids) in &self.vertices.type_index {
            if self.schema.is_subtype_of(*t, sup) {
                out |= ids;
            }
        }
        out
    }

    /// Edges whose type is `type_name` or one of its subtypes.
    pub fn find_edges_by_type(&self, type_name: &str) -> RoaringBitmap {
        let mut out = RoaringBitmap::new();
        let Some(sup) = self.interner.id_of(type_name) else {
            return out;
        };
        for (t, ids) in &self.edges.type_index {
            if self.schema.is_subtype_of(*t, sup) {
                out |= ids;
            }
        }
        out
    }
}

impl GraphAccess for MemGraph {
    fn vertices(&self) -> RoaringBitmap {
        (0..self.vertices.len() as u32).collect()
    }

    fn edges(&self) -> RoaringBitmap {
        (0..self.edges.len() as u32).collect()
    }

    fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn contains_vertex(&self, v: VertexId) -> bool {
        (v as usize) < self.vertices.len()
    }

    fn alpha(&self, e: EdgeId) -> Option<VertexId> {
        self.edges.alpha.get(e as usize).copied()
    }

    fn omega(&self, e: EdgeId) -> Option<VertexId> {
        self.edges.omega.get(e as usize).copied()
    }

    fn incidences(&self, v: VertexId, direction: Direction) -> Vec<EdgeRef> {
        let idx = v as usize;
        let mut out = Vec::new();
        if direction.admits(true) {
            if let Some(ids) = self.vertices.out_edges.get(idx) {
                out.extend(ids.iter().map(|&e| EdgeRef::normal(e)));
            }
        }
        if direction.admits(false) {
            if let Some(ids) = self.vertices.in_edges.get(idx) {
                out.extend(ids.iter().map(|&e| EdgeRef::reversed_of(e)));
            }
        }
        out
    }

    fn vertex_type(&self, v: VertexId) -> Option<StrId> {
        self.vertices.get_type(v)
    }

    fn edge_type(&self, e: EdgeId) -> Option<StrId> {
        self.edges.types.get(e as usize).copied()
    }

    fn type_id(&self, name: &str) -> Option<StrId> {
        self.interner
            .id_of(name)
            .filter(|id| self.schema.contains(*id))
    }

    fn type_name(&self, id: StrId) -> Option<String> {
        self.interner.lookup(id)
    }

    fn role_id(&self, name: &str) -> Option<StrId> {
        self.interner
            .id_of(name)
            .filter(|id| self.schema.is_role(*id))
    }

    fn is_subtype_of(&self, sub: StrId, sup: StrId) -> bool {
        self.schema.is_subtype_of(sub, sup)
    }

    fn roles_at(&self, edge_type: StrId, end: EdgeEnd) -> Vec<StrId> {
        self.schema.roles_at(edge_type, end)
    }

    fn vertex_attr(&self, v: VertexId, name: &str) -> Option<AttrValue> {
        let key = self.interner.id_of(name)?;
        self.vertices.attrs.get(&key)?.get(&v).cloned()
    }

    fn edge_attr(&self, e: EdgeId, name: &str) -> Option<AttrValue> {
        let key = self.interner.id_of(name)?;
        self.edges.attrs.get(&key)?.get(&e).cloned()
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl GraphMutation for MemGraph {
    fn set_vertex_attr(&mut self, v: VertexId, name: &str, value: AttrValue) -> Result<()> {
        if !self.contains_vertex(v) {
            return Err(anyhow!("unknown vertex id {v}"));
        }
        let key = self.interner.intern(name);
        self.vertices.attrs.entry(key).or_default().insert(v, value);
        self.version += 1;
        Ok(())
    }

    fn set_edge_attr(&mut self, e: EdgeId, name: &str, value: AttrValue) -> Result<()> {
        if (e as usize) >= self.edges.len() {
            return Err(anyhow!("unknown edge id {e}"));
        }
        let key = self.interner.intern(name);
        self.edges.attrs.entry(key).or_default().insert(e, value);
        self.version += 1;
        Ok(())
    }
}
