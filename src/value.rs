use std::fmt;

use serde::{Deserialize, Serialize};

/// The CL's dynamic value type.
///
/// `Number` is represented with `hcl::Number`, which already preserves the
/// int/float lexical distinction through round-trip and only collapses to a
/// computed value once arithmetic is applied, without a hand-rolled decimal
/// type.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    /// A value whose shape is known but whose content cannot be computed yet
    /// (e.g. an output of a module that has not been applied). Render-only
    /// mode substitutes this rather than failing.
    Unknown,
    Bool(bool),
    Number(hcl::Number),
    String(String),
    List(Vec<Value>),
    Set(Vec<Value>),
    /// A map: every element shares one inferred type. We don't track the
    /// element type statically since the CL is dynamically typed; `Map` and
    /// `Object` are distinguished only at the API surface.
    Map(Vec<(String, Value)>),
    Object(Vec<(String, Value)>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Unknown => "unknown",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Null => false,
            Value::Unknown => false,
            _ => true,
        }
    }

    pub fn int(i: i64) -> Self {
        Value::Number(hcl::Number::from(i))
    }

    pub fn float(f: f64) -> Self {
        hcl::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
    }

    /// Iteration pairs for `for_each`-style consumption: maps/objects yield
    /// their entries; lists/sets yield (stringified index/element, element).
    /// Sets iterate in **stable sorted order by string representation**,
    /// since a set has no inherent order of its own.
    pub fn iter_pairs(&self) -> Vec<(String, Value)> {
        match self {
            Value::Map(entries) | Value::Object(entries) => entries.clone(),
            Value::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.clone()))
                .collect(),
            Value::Set(items) => {
                let mut pairs: Vec<(String, Value)> =
                    items.iter().map(|v| (v.to_string(), v.clone())).collect();
                pairs.sort_by(|a, b| a.0.cmp(&b.0));
                pairs
            }
            _ => Vec::new(),
        }
    }

    /// JSON marshaling: `Unknown` (and anything that needs a type tag a bare
    /// JSON value can't carry) is wrapped as
    /// `{"Value": ..., "Type": ...}`; everything else maps onto plain JSON.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Unknown => serde_json::json!({"Value": null, "Type": "unknown"}),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::to_value(n).unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) | Value::Set(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(entries) | Value::Object(entries) => {
                let map: serde_json::Map<String, serde_json::Value> =
                    entries.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
                serde_json::Value::Object(map)
            }
        }
    }

    pub fn from_json(v: &serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::float(f)
                } else {
                    Value::Null
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Unknown, Value::Unknown) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Unknown => write!(f, "(known after apply)"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::List(_) | Value::Set(_) | Value::Map(_) | Value::Object(_) => {
                write!(f, "{}", serde_json::to_string(&self.to_json()).unwrap_or_default())
            }
        }
    }
}

/// Convenience serde wrapper used only by the cache/CLI JSON output paths.
#[derive(Serialize, Deserialize)]
struct ValueEnvelope {
    #[serde(rename = "Value")]
    value: serde_json::Value,
    #[serde(rename = "Type")]
    type_name: String,
}
