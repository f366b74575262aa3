use crate::ast::{BinOp, Block, Body, Expression, SourceSpan, TemplatePart, Traversal, TraversalStep, UnaryOp};
use crate::error::CfgError;
use crate::value::Value;

/// Parses native CL text (an HCL dialect) via `hcl-rs`, the same library the
/// teacher uses for its native parse path (`hcl::parser`), then lowers the
/// resulting `hcl::Body` into our own `ast::Body`.
pub fn parse_hcl(text: &str) -> Result<Body, CfgError> {
    let body: hcl::Body = hcl::from_str(text).map_err(|e| CfgError::SyntaxError(e.to_string()))?;
    Ok(body_to_ast(&body))
}

pub fn body_to_ast(body: &hcl::Body) -> Body {
    let mut attributes = Vec::new();
    let mut blocks = Vec::new();
    for structure in body.iter() {
        match structure {
            hcl::Structure::Attribute(attr) => {
                attributes.push((attr.key.to_string(), expr_to_ast(attr.expr()), SourceSpan::default()));
            }
            hcl::Structure::Block(block) => {
                blocks.push(Block {
                    block_type: block.identifier.to_string(),
                    labels: block.labels.iter().map(|l| l.as_str().to_string()).collect(),
                    body: body_to_ast(block.body()),
                    position: SourceSpan::default(),
                });
            }
        }
    }
    Body { attributes, blocks }
}

/// Parses a single expression by wrapping it in a synthetic attribute and
/// running it back through `hcl::from_str`. `hcl-rs` doesn't expose a public
/// bare-expression parser, so this is the same trick used whenever the CL
/// needs to re-parse a string interpolation's inner expression text.
fn parse_expr_text(src: &str) -> Result<hcl::Expression, CfgError> {
    let wrapped = format!("__interp__ = {}\n", src);
    let body: hcl::Body = hcl::from_str(&wrapped).map_err(|e| CfgError::SyntaxError(e.to_string()))?;
    body.iter()
        .find_map(|s| match s {
            hcl::Structure::Attribute(a) if a.key.as_str() == "__interp__" => Some(a.expr().clone()),
            _ => None,
        })
        .ok_or_else(|| CfgError::SyntaxError(format!("failed to re-parse interpolation: {}", src)))
}

pub fn expr_to_ast(expr: &hcl::Expression) -> Expression {
    match expr {
        hcl::Expression::Null => Expression::Literal(Value::Null),
        hcl::Expression::Bool(b) => Expression::Literal(Value::Bool(*b)),
        hcl::Expression::Number(n) => Expression::Literal(Value::Number(n.clone())),
        hcl::Expression::String(s) => string_to_ast(s),
        hcl::Expression::Array(items) => Expression::Tuple(items.iter().map(expr_to_ast).collect()),
        hcl::Expression::Object(obj) => Expression::ObjectCons(
            obj.iter().map(|(k, v)| (object_key_to_string(k), expr_to_ast(v))).collect(),
        ),
        hcl::Expression::TemplateExpr(t) => string_to_ast(&t.to_string()),
        hcl::Expression::Variable(v) => Expression::Reference(Traversal::new(v.as_str())),
        hcl::Expression::Traversal(t) => traversal_to_ast(t),
        hcl::Expression::FuncCall(f) => {
            Expression::FunctionCall { name: f.name.to_string(), args: f.args.iter().map(expr_to_ast).collect() }
        }
        hcl::Expression::Parenthesis(inner) => expr_to_ast(inner),
        hcl::Expression::Conditional(c) => Expression::Conditional {
            cond: Box::new(expr_to_ast(&c.cond_expr)),
            then_expr: Box::new(expr_to_ast(&c.true_expr)),
            else_expr: Box::new(expr_to_ast(&c.false_expr)),
        },
        hcl::Expression::Operation(op) => operation_to_ast(op),
        hcl::Expression::ForExpr(f) => Expression::ForExpr {
            key_var: f.key_var.as_ref().map(|v| v.to_string()),
            value_var: f.value_var.to_string(),
            collection: Box::new(expr_to_ast(&f.collection_expr)),
            key_expr: f.key_expr.as_ref().map(|e| Box::new(expr_to_ast(e))),
            value_expr: Box::new(expr_to_ast(&f.value_expr)),
            cond: f.cond_expr.as_ref().map(|e| Box::new(expr_to_ast(e))),
            grouping: f.grouping,
        },
        hcl::Expression::Raw(raw) => Expression::literal_string(raw.to_string()),
    }
}

fn operation_to_ast(op: &hcl::Operation) -> Expression {
    match op {
        hcl::Operation::Unary(u) => {
            let unary_op = match u.operator {
                hcl::UnaryOperator::Neg => UnaryOp::Neg,
                hcl::UnaryOperator::Not => UnaryOp::Not,
            };
            Expression::UnaryOp { op: unary_op, expr: Box::new(expr_to_ast(&u.expr)) }
        }
        hcl::Operation::Binary(b) => {
            let bin_op = match b.operator {
                hcl::BinaryOperator::Add => BinOp::Add,
                hcl::BinaryOperator::Sub => BinOp::Sub,
                hcl::BinaryOperator::Mul => BinOp::Mul,
                hcl::BinaryOperator::Div => BinOp::Div,
                hcl::BinaryOperator::Mod => BinOp::Mod,
                hcl::BinaryOperator::Eq => BinOp::Eq,
                hcl::BinaryOperator::NotEq => BinOp::NotEq,
                hcl::BinaryOperator::Less => BinOp::Less,
                hcl::BinaryOperator::LessEq => BinOp::LessEq,
                hcl::BinaryOperator::Greater => BinOp::Greater,
                hcl::BinaryOperator::GreaterEq => BinOp::GreaterEq,
                hcl::BinaryOperator::And => BinOp::And,
                hcl::BinaryOperator::Or => BinOp::Or,
            };
            Expression::BinaryOp { op: bin_op, lhs: Box::new(expr_to_ast(&b.lhs_expr)), rhs: Box::new(expr_to_ast(&b.rhs_expr)) }
        }
    }
}

fn traversal_to_ast(t: &hcl::Traversal) -> Expression {
    let base = expr_to_ast(&t.expr);
    let mut cur = base;
    for op in &t.operators {
        cur = apply_operator(cur, op);
    }
    cur
}

fn apply_operator(cur: Expression, op: &hcl::TraversalOperator) -> Expression {
    match op {
        hcl::TraversalOperator::GetAttr(ident) => {
            if let Expression::Reference(mut trav) = cur {
                trav.steps.push(TraversalStep::Attr(ident.to_string()));
                Expression::Reference(trav)
            } else {
                Expression::GetAttr { object: Box::new(cur), name: ident.to_string() }
            }
        }
        hcl::TraversalOperator::Index(idx) => {
            let idx_expr = expr_to_ast(idx);
            if let Expression::Reference(mut trav) = cur {
                trav.steps.push(TraversalStep::Index(Box::new(idx_expr)));
                Expression::Reference(trav)
            } else {
                Expression::Index { collection: Box::new(cur), index: Box::new(idx_expr) }
            }
        }
        hcl::TraversalOperator::LegacyIndex(n) => {
            let idx_expr = Expression::Literal(Value::int(*n as i64));
            if let Expression::Reference(mut trav) = cur {
                trav.steps.push(TraversalStep::Index(Box::new(idx_expr)));
                Expression::Reference(trav)
            } else {
                Expression::Index { collection: Box::new(cur), index: Box::new(idx_expr) }
            }
        }
        hcl::TraversalOperator::AttrSplat | hcl::TraversalOperator::FullSplat => {
            Expression::Splat { object: Box::new(cur) }
        }
    }
}

fn object_key_to_string(key: &hcl::ObjectKey) -> String {
    match key {
        hcl::ObjectKey::Identifier(ident) => ident.to_string(),
        hcl::ObjectKey::Expression(e) => match e {
            hcl::Expression::String(s) => s.clone(),
            other => other.to_string(),
        },
    }
}

/// Splits a string on `${...}` interpolation markers with brace-depth
/// tracking (markers can nest, e.g. `"${lookup(m, "${k}")}"`), re-parsing
/// each interpolated slice as an expression.
pub fn string_to_ast(s: &str) -> Expression {
    if !s.contains("${") {
        return Expression::Literal(Value::String(s.to_string()));
    }
    let parts = scan_template(s);
    if parts.len() == 1 {
        if let TemplatePart::Interp(e) = &parts[0] {
            return (**e).clone();
        }
    }
    Expression::Template(parts)
}

fn scan_template(s: &str) -> Vec<TemplatePart> {
    let mut parts = Vec::new();
    let bytes = s.as_bytes();
    let mut literal_start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            if i > literal_start {
                parts.push(TemplatePart::Literal(s[literal_start..i].to_string()));
            }
            let expr_start = i + 2;
            let mut depth = 1usize;
            let mut j = expr_start;
            while j < bytes.len() && depth > 0 {
                match bytes[j] {
                    b'{' => depth += 1,
                    b'}' => depth -= 1,
                    _ => {}
                }
                if depth == 0 {
                    break;
                }
                j += 1;
            }
            let inner = &s[expr_start..j];
            let expr = match parse_expr_text(inner) {
                Ok(e) => expr_to_ast(&e),
                Err(_) => Expression::literal_string(inner.to_string()),
            };
            parts.push(TemplatePart::Interp(Box::new(expr)));
            i = j + 1;
            literal_start = i;
        } else {
            i += 1;
        }
    }
    if literal_start < bytes.len() {
        parts.push(TemplatePart::Literal(s[literal_start..].to_string()));
    }
    if parts.is_empty() {
        parts.push(TemplatePart::Literal(String::new()));
    }
    parts
}
