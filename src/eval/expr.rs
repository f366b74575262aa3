use crate::ast::{BinOp, Expression, TemplatePart, UnaryOp};
use crate::error::CfgError;
use crate::eval::context::EvalContext;
use crate::value::Value;

/// Evaluates a single expression node against a bound context. Expressions
/// are pure with respect to the context they're handed; the only impurity
/// lives inside `FunctionLibrary` calls (env reads, subprocess).
pub fn evaluate(expr: &Expression, ctx: &EvalContext) -> Result<Value, CfgError> {
    match expr {
        Expression::Literal(v) => Ok(v.clone()),
        Expression::Reference(traversal) => ctx.resolve(traversal),
        Expression::FunctionCall { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for a in args {
                values.push(evaluate(a, ctx)?);
            }
            ctx.functions.call(name, &values, ctx)
        }
        Expression::Conditional { cond, then_expr, else_expr } => {
            if evaluate(cond, ctx)?.is_truthy() {
                evaluate(then_expr, ctx)
            } else {
                evaluate(else_expr, ctx)
            }
        }
        Expression::ForExpr { key_var, value_var, collection, key_expr, value_expr, cond, grouping } => {
            evaluate_for(key_var, value_var, collection, key_expr, value_expr, cond, *grouping, ctx)
        }
        Expression::Template(parts) => evaluate_template(parts, ctx),
        Expression::Index { collection, index } => {
            let coll = evaluate(collection, ctx)?;
            let idx = evaluate(index, ctx)?;
            index_into(&coll, &idx)
        }
        Expression::GetAttr { object, name } => {
            let obj = evaluate(object, ctx)?;
            Ok(get_attr(&obj, name))
        }
        Expression::BinaryOp { op, lhs, rhs } => {
            let l = evaluate(lhs, ctx)?;
            let r = evaluate(rhs, ctx)?;
            binary_op(*op, l, r)
        }
        Expression::UnaryOp { op, expr } => {
            let v = evaluate(expr, ctx)?;
            unary_op(*op, v)
        }
        Expression::Splat { object } => {
            let obj = evaluate(object, ctx)?;
            match obj {
                Value::List(items) | Value::Set(items) => Ok(Value::List(items)),
                Value::Null => Ok(Value::List(Vec::new())),
                other => Ok(Value::List(vec![other])),
            }
        }
        Expression::Tuple(items) => {
            let mut out = Vec::with_capacity(items.len());
            for i in items {
                out.push(evaluate(i, ctx)?);
            }
            Ok(Value::List(out))
        }
        Expression::ObjectCons(pairs) => {
            let mut out = Vec::with_capacity(pairs.len());
            for (k, v) in pairs {
                out.push((k.clone(), evaluate(v, ctx)?));
            }
            Ok(Value::Object(out))
        }
    }
}

fn evaluate_template(parts: &[TemplatePart], ctx: &EvalContext) -> Result<Value, CfgError> {
    let mut out = String::new();
    for part in parts {
        match part {
            TemplatePart::Literal(s) => out.push_str(s),
            TemplatePart::Interp(e) => out.push_str(&evaluate(e, ctx)?.to_string()),
        }
    }
    Ok(Value::String(out))
}

fn index_into(coll: &Value, idx: &Value) -> Result<Value, CfgError> {
    match (coll, idx) {
        (Value::List(items) | Value::Set(items), Value::Number(n)) => {
            let i = n.as_i64().ok_or_else(|| CfgError::InvalidParameterType {
                function: "index".into(),
                arg_index: 1,
                expected: "integer".into(),
                got: n.to_string(),
            })?;
            if i < 0 {
                return Ok(Value::Null);
            }
            Ok(items.get(i as usize).cloned().unwrap_or(Value::Null))
        }
        (Value::Object(entries) | Value::Map(entries), Value::String(key)) => {
            Ok(entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()).unwrap_or(Value::Null))
        }
        _ => Err(CfgError::InvalidParameterType {
            function: "index".into(),
            arg_index: 0,
            expected: "list/map".into(),
            got: coll.type_name().into(),
        }),
    }
}

fn get_attr(obj: &Value, name: &str) -> Value {
    match obj {
        Value::Object(entries) | Value::Map(entries) => {
            entries.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone()).unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

#[allow(clippy::too_many_arguments)]
fn evaluate_for(
    key_var: &Option<String>,
    value_var: &str,
    collection: &Expression,
    key_expr: &Option<Box<Expression>>,
    value_expr: &Expression,
    cond: &Option<Box<Expression>>,
    grouping: bool,
    ctx: &EvalContext,
) -> Result<Value, CfgError> {
    let coll = evaluate(collection, ctx)?;
    let mut out_pairs: Vec<(Option<Value>, Value)> = Vec::new();

    for (k, v) in coll.iter_pairs() {
        let mut sub = ctx.with_variable(value_var, v.clone());
        if let Some(kv) = key_var {
            sub = sub.with_variable(kv, Value::String(k.clone()));
        }
        if let Some(c) = cond {
            if !evaluate(c, &sub)?.is_truthy() {
                continue;
            }
        }
        let value = evaluate(value_expr, &sub)?;
        let key = match key_expr {
            Some(ke) => Some(evaluate(ke, &sub)?),
            None => None,
        };
        out_pairs.push((key, value));
    }

    if key_expr.is_some() {
        if grouping {
            let mut grouped: Vec<(String, Vec<Value>)> = Vec::new();
            for (k, v) in out_pairs {
                let key = k.map(|kv| kv.to_string()).unwrap_or_default();
                if let Some(slot) = grouped.iter_mut().find(|(gk, _)| *gk == key) {
                    slot.1.push(v);
                } else {
                    grouped.push((key, vec![v]));
                }
            }
            Ok(Value::Object(grouped.into_iter().map(|(k, v)| (k, Value::List(v))).collect()))
        } else {
            Ok(Value::Object(out_pairs.into_iter().map(|(k, v)| (k.map(|kv| kv.to_string()).unwrap_or_default(), v)).collect()))
        }
    } else {
        Ok(Value::List(out_pairs.into_iter().map(|(_, v)| v).collect()))
    }
}

fn binary_op(op: BinOp, l: Value, r: Value) -> Result<Value, CfgError> {
    use BinOp::*;
    match op {
        Add | Sub | Mul | Div | Mod => numeric_op(op, l, r),
        Eq => Ok(Value::Bool(l == r)),
        NotEq => Ok(Value::Bool(l != r)),
        Less | LessEq | Greater | GreaterEq => compare_op(op, l, r),
        And => Ok(Value::Bool(l.is_truthy() && r.is_truthy())),
        Or => Ok(Value::Bool(l.is_truthy() || r.is_truthy())),
    }
}

fn numeric_op(op: BinOp, l: Value, r: Value) -> Result<Value, CfgError> {
    let (a, b) = (expect_number(&l)?, expect_number(&r)?);
    if let (Some(ai), Some(bi)) = (a.as_i64(), b.as_i64()) {
        let result = match op {
            BinOp::Add => ai.checked_add(bi),
            BinOp::Sub => ai.checked_sub(bi),
            BinOp::Mul => ai.checked_mul(bi),
            BinOp::Div => {
                if bi == 0 {
                    return Err(CfgError::FunctionError { name: "/".into(), arg_index: 1, reason: "division by zero".into() });
                }
                ai.checked_div(bi)
            }
            BinOp::Mod => {
                if bi == 0 {
                    return Err(CfgError::FunctionError { name: "%".into(), arg_index: 1, reason: "division by zero".into() });
                }
                ai.checked_rem(bi)
            }
            _ => unreachable!(),
        };
        return Ok(Value::int(result.unwrap_or(0)));
    }
    let (af, bf) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
    let result = match op {
        BinOp::Add => af + bf,
        BinOp::Sub => af - bf,
        BinOp::Mul => af * bf,
        BinOp::Div => af / bf,
        BinOp::Mod => af % bf,
        _ => unreachable!(),
    };
    Ok(Value::float(result))
}

fn compare_op(op: BinOp, l: Value, r: Value) -> Result<Value, CfgError> {
    let ordering = match (&l, &r) {
        (Value::Number(a), Value::Number(b)) => {
            a.as_f64().unwrap_or(0.0).partial_cmp(&b.as_f64().unwrap_or(0.0))
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    let ordering = ordering.ok_or_else(|| CfgError::InvalidParameterType {
        function: "compare".into(),
        arg_index: 0,
        expected: "comparable operands".into(),
        got: format!("{}/{}", l.type_name(), r.type_name()),
    })?;
    let result = match op {
        BinOp::Less => ordering.is_lt(),
        BinOp::LessEq => ordering.is_le(),
        BinOp::Greater => ordering.is_gt(),
        BinOp::GreaterEq => ordering.is_ge(),
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

fn unary_op(op: UnaryOp, v: Value) -> Result<Value, CfgError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
        UnaryOp::Neg => {
            let n = expect_number(&v)?;
            if let Some(i) = n.as_i64() {
                Ok(Value::int(-i))
            } else {
                Ok(Value::float(-n.as_f64().unwrap_or(0.0)))
            }
        }
    }
}

fn expect_number(v: &Value) -> Result<hcl::Number, CfgError> {
    match v {
        Value::Number(n) => Ok(n.clone()),
        other => Err(CfgError::InvalidParameterType {
            function: "arithmetic".into(),
            arg_index: 0,
            expected: "number".into(),
            got: other.type_name().into(),
        }),
    }
}
