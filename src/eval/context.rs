use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ast::{Traversal, TraversalStep};
use crate::error::CfgError;
use crate::eval::functions::FunctionLibrary;
use crate::value::Value;

/// Cooperative cancellation flag shared across a `ParsingContext`, polled by
/// long-running builtins (`run_cmd`, filesystem reads) before and after each
/// external call.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct IncludeTrack {
    pub name: String,
    pub path: PathBuf,
}

/// `EvalContext` is immutable once built; block expansion and `include`/
/// `dependency` scoping all construct new contexts via copy-on-extend rather
/// than mutating one in place.
#[derive(Clone)]
pub struct EvalContext {
    pub functions: Arc<FunctionLibrary>,
    /// Flat map from traversal root (`local`, `global`, `include`,
    /// `dependency`, `feature`, `each`, `count`) to the scope's value,
    /// itself usually an `Object`/`Map` navigated by further traversal steps.
    pub variables: im_like_map::Map,
    pub current_file: PathBuf,
    pub include_track: Option<IncludeTrack>,
    pub feature_flags: Value,
    pub dependency_outputs: Option<Value>,
    pub cancellation: CancellationToken,
}

/// A tiny `Vec`-backed ordered map; the CL's scopes rarely exceed a few dozen
/// entries, so linear lookup beats pulling in another map crate for this.
pub mod im_like_map {
    use crate::value::Value;

    #[derive(Debug, Clone, Default)]
    pub struct Map(Vec<(String, Value)>);

    impl Map {
        pub fn new() -> Self {
            Self(Vec::new())
        }

        pub fn get(&self, key: &str) -> Option<&Value> {
            self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
        }

        pub fn inserted(&self, key: impl Into<String>, value: Value) -> Self {
            let mut next = self.0.clone();
            let key = key.into();
            if let Some(slot) = next.iter_mut().find(|(k, _)| *k == key) {
                slot.1 = value;
            } else {
                next.push((key, value));
            }
            Map(next)
        }
    }
}

impl EvalContext {
    pub fn new(functions: Arc<FunctionLibrary>, current_file: PathBuf) -> Self {
        Self {
            functions,
            variables: im_like_map::Map::new(),
            current_file,
            include_track: None,
            feature_flags: Value::Object(Vec::new()),
            dependency_outputs: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_variable(&self, root: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        next.variables = self.variables.inserted(root, value);
        next
    }

    /// Extends the context for one `count = N` block-expansion instance.
    pub fn with_count_index(&self, index: i64) -> Self {
        self.with_variable("count", Value::Object(vec![("index".to_string(), Value::int(index))]))
    }

    /// Extends the context for one `for_each` block-expansion instance.
    pub fn with_each(&self, key: Value, value: Value) -> Self {
        self.with_variable("each", Value::Object(vec![("key".to_string(), key), ("value".to_string(), value)]))
    }

    pub fn resolve(&self, traversal: &Traversal) -> Result<Value, CfgError> {
        let root = self
            .variables
            .get(&traversal.root)
            .cloned()
            .ok_or_else(|| CfgError::UnknownVariableRoot { root: traversal.root.clone() })?;
        navigate(root, &traversal.steps, self)
    }
}

fn navigate(mut cur: Value, steps: &[TraversalStep], ctx: &EvalContext) -> Result<Value, CfgError> {
    for step in steps {
        cur = match step {
            TraversalStep::Attr(name) => match &cur {
                Value::Object(entries) | Value::Map(entries) => entries
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.clone())
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            },
            TraversalStep::Index(idx_expr) => {
                let idx = idx_expr.evaluate(ctx)?;
                match (&cur, &idx) {
                    (Value::List(items) | Value::Set(items), Value::Number(n)) => {
                        let i = n.as_i64().unwrap_or(-1);
                        if i >= 0 {
                            items.get(i as usize).cloned().unwrap_or(Value::Null)
                        } else {
                            Value::Null
                        }
                    }
                    (Value::Object(entries) | Value::Map(entries), Value::String(key)) => entries
                        .iter()
                        .find(|(k, _)| k == key)
                        .map(|(_, v)| v.clone())
                        .unwrap_or(Value::Null),
                    _ => Value::Null,
                }
            }
        };
    }
    Ok(cur)
}
