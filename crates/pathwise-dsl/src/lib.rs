//! Pathwise DSL: surface syntax for path descriptions.
//!
//! A path description is a regular expression over edge steps:
//!
//! ```text
//! -->{Knows}                    one outgoing Knows edge
//! <--{@employee}                one incoming edge whose far end plays `employee`
//! <->{Link, ^Manages}           any direction, Link but not Manages
//! -->{A} (-->{B} | <--{C})*     sequence, alternation, iteration
//! (-->{A})^3   (-->{A} -->{B})^T   exponent and transposition
//! ```
//!
//! The parser only produces a [`PathExpr`] tree. Name resolution, automaton
//! construction and guards live in `pathwise-engine`.

mod parser;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use parser::parse_path_expr;

/// Largest `n` accepted in `p^n`; each unit of the exponent is one copy of
/// the inner automaton.
pub const MAX_EXPONENT: u32 = 64;

/// Arrow of a single edge step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arrow {
    /// `-->`
    Out,
    /// `<--`
    In,
    /// `<->`
    Any,
}

impl Arrow {
    pub fn as_str(self) -> &'static str {
        match self {
            Arrow::Out => "-->",
            Arrow::In => "<--",
            Arrow::Any => "<->",
        }
    }
}

/// An edge type named in a restriction; `forbidden` is written `^Name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeTerm {
    pub name: String,
    pub forbidden: bool,
}

impl TypeTerm {
    pub fn allowed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            forbidden: false,
        }
    }

    pub fn forbidden(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            forbidden: true,
        }
    }
}

/// Parsed path description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathExpr {
    Edge {
        arrow: Arrow,
        types: Vec<TypeTerm>,
        roles: Vec<String>,
    },
    Seq(Vec<PathExpr>),
    Alt(Vec<PathExpr>),
    Star(Box<PathExpr>),
    Plus(Box<PathExpr>),
    Opt(Box<PathExpr>),
    Exp(Box<PathExpr>, u32),
    Transpose(Box<PathExpr>),
}

impl PathExpr {
    /// Unrestricted edge step.
    pub fn edge(arrow: Arrow) -> Self {
        PathExpr::Edge {
            arrow,
            types: Vec::new(),
            roles: Vec::new(),
        }
    }

    /// Edge step restricted to one allowed type.
    pub fn typed(arrow: Arrow, type_name: impl Into<String>) -> Self {
        PathExpr::Edge {
            arrow,
            types: vec![TypeTerm::allowed(type_name)],
            roles: Vec::new(),
        }
    }

    /// Number of edge steps in the expression tree.
    pub fn edge_count(&self) -> usize {
        match self {
            PathExpr::Edge { .. } => 1,
            PathExpr::Seq(parts) | PathExpr::Alt(parts) => {
                parts.iter().map(PathExpr::edge_count).sum()
            }
            PathExpr::Star(inner)
            | PathExpr::Plus(inner)
            | PathExpr::Opt(inner)
            | PathExpr::Exp(inner, _)
            | PathExpr::Transpose(inner) => inner.edge_count(),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            PathExpr::Alt(_) => 0,
            PathExpr::Seq(_) => 1,
            _ => 2,
        }
    }

    fn fmt_child(&self, child: &PathExpr, min: u8, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if child.precedence() < min {
            write!(f, "({child})")
        } else {
            write!(f, "{child}")
        }
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathExpr::Edge {
                arrow,
                types,
                roles,
            } => {
                f.write_str(arrow.as_str())?;
                if types.is_empty() && roles.is_empty() {
                    return Ok(());
                }
                let items = types
                    .iter()
                    .map(|t| {
                        if t.forbidden {
                            format!("^{}", t.name)
                        } else {
                            t.name.clone()
                        }
                    })
                    .chain(roles.iter().map(|r| format!("@{r}")))
                    .collect::<Vec<_>>();
                write!(f, "{{{}}}", items.join(", "))
            }
            PathExpr::Seq(parts) => {
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    self.fmt_child(p, 2, f)?;
                }
                Ok(())
            }
            PathExpr::Alt(parts) => {
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    self.fmt_child(p, 1, f)?;
                }
                Ok(())
            }
            PathExpr::Star(inner) => {
                self.fmt_child(inner, 2, f)?;
                f.write_str("*")
            }
            PathExpr::Plus(inner) => {
                self.fmt_child(inner, 2, f)?;
                f.write_str("+")
            }
            PathExpr::Opt(inner) => {
                self.fmt_child(inner, 2, f)?;
                f.write_str("?")
            }
            PathExpr::Exp(inner, n) => {
                self.fmt_child(inner, 2, f)?;
                write!(f, "^{n}")
            }
            PathExpr::Transpose(inner) => {
                self.fmt_child(inner, 2, f)?;
                f.write_str("^T")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathParseError {
    #[error("parse error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("empty path description")]
    Empty,
}
