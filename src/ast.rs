use std::fmt;

use crate::error::{CfgError, Diagnostic};
use crate::eval::EvalContext;
use crate::value::Value;

/// A 1-based source position, used to anchor diagnostics and to locate the
/// block a `BlockExpander` retry should act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSpan {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl SourceSpan {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self { line, column, offset }
    }
}

/// One step of a rooted variable traversal: `local.foo`, `dependency.db.outputs.id`.
#[derive(Debug, Clone, PartialEq)]
pub enum TraversalStep {
    Attr(String),
    Index(Box<Expression>),
}

/// A rooted reference such as `local.x`, `global.region`, `include.root`,
/// `dependency.db.outputs.id`, or `each.value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Traversal {
    pub root: String,
    pub steps: Vec<TraversalStep>,
}

impl Traversal {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into(), steps: Vec::new() }
    }

    pub fn with_attr(mut self, name: impl Into<String>) -> Self {
        self.steps.push(TraversalStep::Attr(name.into()));
        self
    }

    /// First attribute step after the root, e.g. `x` in `local.x`.
    pub fn first_attr(&self) -> Option<&str> {
        self.steps.iter().find_map(|s| match s {
            TraversalStep::Attr(a) => Some(a.as_str()),
            TraversalStep::Index(_) => None,
        })
    }
}

impl fmt::Display for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for step in &self.steps {
            match step {
                TraversalStep::Attr(a) => write!(f, ".{}", a)?,
                TraversalStep::Index(_) => write!(f, "[...]")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Literal(String),
    Interp(Box<Expression>),
}

/// Expression AST node. `variables()` collects every unresolved
/// `Traversal` reachable from this node without evaluating anything;
/// `evaluate` requires a bound `EvalContext`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Reference(Traversal),
    FunctionCall { name: String, args: Vec<Expression> },
    Conditional { cond: Box<Expression>, then_expr: Box<Expression>, else_expr: Box<Expression> },
    ForExpr {
        key_var: Option<String>,
        value_var: String,
        collection: Box<Expression>,
        key_expr: Option<Box<Expression>>,
        value_expr: Box<Expression>,
        cond: Option<Box<Expression>>,
        grouping: bool,
    },
    Template(Vec<TemplatePart>),
    Index { collection: Box<Expression>, index: Box<Expression> },
    GetAttr { object: Box<Expression>, name: String },
    BinaryOp { op: BinOp, lhs: Box<Expression>, rhs: Box<Expression> },
    UnaryOp { op: UnaryOp, expr: Box<Expression> },
    Splat { object: Box<Expression> },
    Tuple(Vec<Expression>),
    ObjectCons(Vec<(String, Expression)>),
}

impl Expression {
    pub fn literal_string(s: impl Into<String>) -> Self {
        Expression::Literal(Value::String(s.into()))
    }

    /// Collects every `Traversal` this expression reads, recursing into
    /// nested expressions. Duplicate roots are not deduplicated here; callers
    /// collapse as needed when building graph edges.
    pub fn variables(&self) -> Vec<&Traversal> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a Traversal>) {
        match self {
            Expression::Literal(_) => {}
            Expression::Reference(t) => out.push(t),
            Expression::FunctionCall { args, .. } => {
                for a in args {
                    a.collect_variables(out);
                }
            }
            Expression::Conditional { cond, then_expr, else_expr } => {
                cond.collect_variables(out);
                then_expr.collect_variables(out);
                else_expr.collect_variables(out);
            }
            Expression::ForExpr { collection, key_expr, value_expr, cond, .. } => {
                collection.collect_variables(out);
                if let Some(k) = key_expr {
                    k.collect_variables(out);
                }
                value_expr.collect_variables(out);
                if let Some(c) = cond {
                    c.collect_variables(out);
                }
            }
            Expression::Template(parts) => {
                for p in parts {
                    if let TemplatePart::Interp(e) = p {
                        e.collect_variables(out);
                    }
                }
            }
            Expression::Index { collection, index } => {
                collection.collect_variables(out);
                index.collect_variables(out);
            }
            Expression::GetAttr { object, .. } => object.collect_variables(out),
            Expression::BinaryOp { lhs, rhs, .. } => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
            Expression::UnaryOp { expr, .. } => expr.collect_variables(out),
            Expression::Splat { object } => object.collect_variables(out),
            Expression::Tuple(items) => {
                for i in items {
                    i.collect_variables(out);
                }
            }
            Expression::ObjectCons(pairs) => {
                for (_, v) in pairs {
                    v.collect_variables(out);
                }
            }
        }
    }

    pub fn evaluate(&self, ctx: &EvalContext) -> Result<Value, CfgError> {
        crate::eval::expr::evaluate(self, ctx)
    }
}

/// A parsed block: its type name, labels, body, and source position.
#[derive(Debug, Clone)]
pub struct Block {
    pub block_type: String,
    pub labels: Vec<String>,
    pub body: Body,
    pub position: SourceSpan,
}

impl Block {
    pub fn label(&self) -> Option<&str> {
        self.labels.first().map(|s| s.as_str())
    }
}

/// The inside of a block: attributes plus nested blocks, with schema-driven
/// partial extraction. Extracting a block kind removes it from
/// the residual so repeated partial decodes don't double-count it.
#[derive(Debug, Clone, Default)]
pub struct Body {
    pub attributes: Vec<(String, Expression, SourceSpan)>,
    pub blocks: Vec<Block>,
}

impl Body {
    pub fn attr(&self, name: &str) -> Option<&Expression> {
        self.attributes.iter().find(|(n, _, _)| n == name).map(|(_, e, _)| e)
    }

    pub fn attr_span(&self, name: &str) -> Option<SourceSpan> {
        self.attributes.iter().find(|(n, _, _)| n == name).map(|(_, _, s)| *s)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.iter().any(|(n, _, _)| n == name)
    }

    pub fn blocks_of_type<'a>(&'a self, block_type: &'a str) -> impl Iterator<Item = &'a Block> {
        self.blocks.iter().filter(move |b| b.block_type == block_type)
    }

    pub fn block_of_type(&self, block_type: &str) -> Option<&Block> {
        self.blocks_of_type(block_type).next()
    }

    /// Partial-content extraction: returns the blocks/attrs matching
    /// `wanted_block_types`, leaving everything else as the residual body.
    pub fn partial_content(&self, wanted_block_types: &[&str]) -> (Vec<&Block>, Body) {
        let matched: Vec<&Block> =
            self.blocks.iter().filter(|b| wanted_block_types.contains(&b.block_type.as_str())).collect();
        let residual_blocks: Vec<Block> = self
            .blocks
            .iter()
            .filter(|b| !wanted_block_types.contains(&b.block_type.as_str()))
            .cloned()
            .collect();
        (matched, Body { attributes: self.attributes.clone(), blocks: residual_blocks })
    }
}

/// A fully parsed source file: the block/attribute tree plus position lookup.
#[derive(Debug, Clone)]
pub struct File {
    pub path: std::path::PathBuf,
    pub root: Body,
}

impl File {
    pub fn top_level_blocks(&self, block_type: &str) -> Vec<&Block> {
        self.root.blocks_of_type(block_type).collect()
    }

    /// Returns the innermost block whose span contains `offset`, used by the
    /// `BlockExpander` to locate the block named in a decode diagnostic.
    pub fn block_at_offset(&self, offset: usize) -> Option<&Block> {
        fn search<'a>(blocks: &'a [Block], offset: usize) -> Option<&'a Block> {
            let mut best: Option<&Block> = None;
            for b in blocks {
                if b.position.offset <= offset {
                    if let Some(found) = search(&b.body.blocks, offset) {
                        return Some(found);
                    }
                    best = Some(b);
                }
            }
            best
        }
        search(&self.root.blocks, offset)
    }
}

pub fn unresolved_local(name: &str, span: SourceSpan, file: &std::path::Path) -> Diagnostic {
    Diagnostic::error(file.to_path_buf(), span.line, span.column, CfgError::UnresolvedLocal { name: name.into() })
}
