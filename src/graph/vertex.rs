use std::path::PathBuf;

use crate::ast::Expression;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexKind {
    Local,
    Global,
    Include,
    /// The synthetic root every ownerless vertex hangs off of.
    Root,
}

/// One binding in the variable graph. Owned by a `petgraph::DiGraph` and
/// addressed by `NodeIndex` rather than by shared-mutable reference: when the
/// parent later binds a placeholder global, its existing vertex is updated
/// in place through the graph rather than through a shared pointer.
#[derive(Debug, Clone)]
pub struct VariableVertex {
    pub kind: VertexKind,
    pub name: String,
    pub expr: Option<Expression>,
    pub evaluated: bool,
    pub owner: ConfigId,
}

/// Identifies which parsed file a vertex belongs to, so Phase 2 can
/// distinguish a parent's `local.x` from the child's `local.x` of the same
/// name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigId {
    Child,
    Parent,
}

impl VariableVertex {
    pub fn root() -> Self {
        Self { kind: VertexKind::Root, name: String::new(), expr: None, evaluated: true, owner: ConfigId::Child }
    }

    pub fn new(kind: VertexKind, name: impl Into<String>, expr: Option<Expression>, owner: ConfigId) -> Self {
        Self { kind, name: name.into(), expr, owner, evaluated: false }
    }

    pub fn display_key(&self) -> String {
        match self.kind {
            VertexKind::Local => format!("local.{}", self.name),
            VertexKind::Global => format!("global.{}", self.name),
            VertexKind::Include => "include".to_string(),
            VertexKind::Root => "<root>".to_string(),
        }
    }
}

/// The parsed-file identity a `VariableVertex` and its evaluated value end up
/// attributed to, for provenance (`ResolvedConfig.field_provenance`).
#[derive(Debug, Clone)]
pub struct SourceIdentity {
    pub path: PathBuf,
}
