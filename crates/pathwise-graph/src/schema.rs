//! Type hierarchy and edge-end roles.
//!
//! Types must be declared after their supertypes, so the ancestor closure of a
//! type can be computed once at declaration time.

use std::collections::BTreeSet;

use ahash::AHashMap;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::{EdgeEnd, StrId};

/// A declared vertex or edge type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDecl {
    pub id: StrId,
    pub supertypes: Vec<StrId>,
    pub is_edge_type: bool,
}

/// Role names declared by an edge type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeTypeDecl {
    pub alpha_role: Option<StrId>,
    pub omega_role: Option<StrId>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Schema {
    types: AHashMap<StrId, TypeDecl>,
    edge_types: AHashMap<StrId, EdgeTypeDecl>,
    /// type -> {type and all of its supertypes}
    ancestors: AHashMap<StrId, BTreeSet<StrId>>,
    roles: BTreeSet<StrId>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: StrId) -> bool {
        self.types.contains_key(&id)
    }

    pub fn get(&self, id: StrId) -> Option<&TypeDecl> {
        self.types.get(&id)
    }

    pub fn is_edge_type(&self, id: StrId) -> bool {
        self.types.get(&id).map(|t| t.is_edge_type).unwrap_or(false)
    }

    pub fn is_role(&self, id: StrId) -> bool {
        self.roles.contains(&id)
    }

    /// Declare a vertex type.
    pub fn declare_vertex_type(&mut self, id: StrId, supertypes: Vec<StrId>) -> Result<()> {
        self.declare(id, supertypes, false)
    }

    /// Declare an edge type with optional role names at its ends.
    pub fn declare_edge_type(
        &mut self,
        id: StrId,
        supertypes: Vec<StrId>,
        alpha_role: Option<StrId>,
        omega_role: Option<StrId>,
    ) -> Result<()> {
        self.declare(id, supertypes, true)?;
        self.roles.extend(alpha_role);
        self.roles.extend(omega_role);
        self.edge_types.insert(
            id,
            EdgeTypeDecl {
                alpha_role,
                omega_role,
            },
        );
        Ok(())
    }

    fn declare(&mut self, id: StrId, supertypes: Vec<StrId>, is_edge_type: bool) -> Result<()> {
        if self.types.contains_key(&id) {
            return Err(anyhow!("type {} declared twice", id.raw()));
        }
        let mut closure = BTreeSet::new();
        closure.insert(id);
        for sup in &supertypes {
            let Some(decl) = self.types.get(sup) else {
                return Err(anyhow!(
                    "supertype {} must be declared before its subtypes",
                    sup.raw()
                ));
            };
            if decl.is_edge_type != is_edge_type {
                return Err(anyhow!(
                    "type {} mixes vertex and edge supertypes",
                    id.raw()
                ));
            }
            if let Some(up) = self.ancestors.get(sup) {
                closure.extend(up.iter().copied());
            }
        }
        self.ancestors.insert(id, closure);
        self.types.insert(
            id,
            TypeDecl {
                id,
                supertypes,
                is_edge_type,
            },
        );
        Ok(())
    }

    /// Reflexive, transitive subtype check. Unknown types are only subtypes of
    /// themselves.
    pub fn is_subtype_of(&self, sub: StrId, sup: StrId) -> bool {
        if sub == sup {
            return true;
        }
        self.ancestors
            .get(&sub)
            .map(|up| up.contains(&sup))
            .unwrap_or(false)
    }

    /// Roles at one end of an edge type, including roles inherited from
    /// supertypes (own role first).
    pub fn roles_at(&self, edge_type: StrId, end: EdgeEnd) -> Vec<StrId> {
        let pick = |decl: &EdgeTypeDecl| match end {
            EdgeEnd::Alpha => decl.alpha_role,
            EdgeEnd::Omega => decl.omega_role,
        };
        let mut out = Vec::new();
        if let Some(role) = self.edge_types.get(&edge_type).and_then(pick) {
            out.push(role);
        }
        if let Some(up) = self.ancestors.get(&edge_type) {
            for sup in up.iter().filter(|s| **s != edge_type) {
                if let Some(role) = self.edge_types.get(sup).and_then(pick) {
                    if !out.contains(&role) {
                        out.push(role);
                    }
                }
            }
        }
        out
    }
}
