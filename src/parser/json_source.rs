use crate::ast::{Block, Body, Expression, SourceSpan};
use crate::error::CfgError;
use crate::parser::hcl_source::string_to_ast;
use crate::value::Value;

/// Block kinds that carry exactly one label in native syntax; in the JSON
/// encoding the label becomes the key of an object-of-objects, mirroring the
/// teacher's `json_parser::BLOCK_SCHEMA` label-peeling strategy.
const LABELED_BLOCKS: &[&str] = &["dependency", "feature", "generate"];

/// Singleton block kinds (no labels); JSON value is the body object itself.
const SINGLETON_BLOCKS: &[&str] =
    &["locals", "globals", "terraform", "remote_state", "exclude", "errors", "engine", "dependencies"];

/// Attribute names inside `terraform` that are themselves nested blocks
/// rather than plain attributes, when decoded from JSON.
const TERRAFORM_NESTED_BLOCKS: &[&str] = &["extra_arguments", "before_hook", "after_hook", "error_hook"];

pub fn parse_json(text: &str) -> Result<Body, CfgError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| CfgError::InvalidJson(e.to_string()))?;
    let obj = value.as_object().ok_or_else(|| CfgError::InvalidJson("root is not an object".into()))?;

    let mut attributes = Vec::new();
    let mut blocks = Vec::new();

    for (key, val) in obj {
        match key.as_str() {
            "inputs" => {
                attributes.push(("inputs".to_string(), json_to_ast(val), SourceSpan::default()));
            }
            "include" => {
                blocks.extend(include_blocks_from_json(val)?);
            }
            k if LABELED_BLOCKS.contains(&k) => {
                let entries = val
                    .as_object()
                    .ok_or_else(|| CfgError::InvalidJson(format!("{} must be an object of labeled entries", k)))?;
                for (label, body_val) in entries {
                    blocks.push(Block {
                        block_type: k.to_string(),
                        labels: vec![label.clone()],
                        body: json_object_to_body(body_val, k)?,
                        position: SourceSpan::default(),
                    });
                }
            }
            k if SINGLETON_BLOCKS.contains(&k) => {
                blocks.push(Block {
                    block_type: k.to_string(),
                    labels: Vec::new(),
                    body: json_object_to_body(val, k)?,
                    position: SourceSpan::default(),
                });
            }
            other => {
                // Unknown top-level key: treat as a singleton block body so
                // forward-compatible/custom blocks still round-trip as data.
                blocks.push(Block {
                    block_type: other.to_string(),
                    labels: Vec::new(),
                    body: json_object_to_body(val, other)?,
                    position: SourceSpan::default(),
                });
            }
        }
    }

    Ok(Body { attributes, blocks })
}

/// Implements the bare-include JSON rewrite rules:
/// `{"path": ...}` and `[{"path": ...}]` (single element) both become one
/// labeled `""` include; a multi-element list is a `MultipleBareIncludeBlocks`
/// error; object-form with explicit labels passes through unchanged.
fn include_blocks_from_json(val: &serde_json::Value) -> Result<Vec<Block>, CfgError> {
    match val {
        serde_json::Value::Object(obj) if obj.contains_key("path") => {
            Ok(vec![Block {
                block_type: "include".to_string(),
                labels: vec![String::new()],
                body: json_object_to_body(val, "include")?,
                position: SourceSpan::default(),
            }])
        }
        serde_json::Value::Array(items) => {
            if items.len() > 1 {
                return Err(CfgError::MultipleBareIncludeBlocks("include".to_string()));
            }
            if let Some(first) = items.first() {
                Ok(vec![Block {
                    block_type: "include".to_string(),
                    labels: vec![String::new()],
                    body: json_object_to_body(first, "include")?,
                    position: SourceSpan::default(),
                }])
            } else {
                Ok(Vec::new())
            }
        }
        serde_json::Value::Object(labeled) => {
            let mut out = Vec::new();
            for (label, body_val) in labeled {
                out.push(Block {
                    block_type: "include".to_string(),
                    labels: vec![label.clone()],
                    body: json_object_to_body(body_val, "include")?,
                    position: SourceSpan::default(),
                });
            }
            Ok(out)
        }
        _ => Err(CfgError::IncludeIsNotABlock),
    }
}

fn json_object_to_body(val: &serde_json::Value, block_type: &str) -> Result<Body, CfgError> {
    let obj = val.as_object().ok_or_else(|| CfgError::InvalidJson(format!("{} body must be an object", block_type)))?;
    let mut attributes = Vec::new();
    let mut blocks = Vec::new();
    for (key, v) in obj {
        if block_type == "terraform" && TERRAFORM_NESTED_BLOCKS.contains(&key.as_str()) && v.is_object() {
            blocks.push(Block {
                block_type: key.clone(),
                labels: Vec::new(),
                body: json_object_to_body(v, key)?,
                position: SourceSpan::default(),
            });
        } else {
            attributes.push((key.clone(), json_to_ast(v), SourceSpan::default()));
        }
    }
    Ok(Body { attributes, blocks })
}

fn json_to_ast(v: &serde_json::Value) -> Expression {
    match v {
        serde_json::Value::Null => Expression::Literal(Value::Null),
        serde_json::Value::Bool(b) => Expression::Literal(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Expression::Literal(Value::int(i))
            } else {
                Expression::Literal(Value::float(n.as_f64().unwrap_or(0.0)))
            }
        }
        serde_json::Value::String(s) => string_to_ast(s),
        serde_json::Value::Array(items) => Expression::Tuple(items.iter().map(json_to_ast).collect()),
        serde_json::Value::Object(obj) => {
            Expression::ObjectCons(obj.iter().map(|(k, v)| (k.clone(), json_to_ast(v))).collect())
        }
    }
}
