use crate::ast::Block;
use crate::error::CfgError;
use crate::eval::EvalContext;
use crate::value::Value;

/// Metadata recorded on a block produced by expansion, used both to derive
/// its display name and to make re-expansion idempotent.
#[derive(Debug, Clone)]
pub enum ExpansionKey {
    CountIndex(i64),
    EachKey(String),
}

#[derive(Debug, Clone)]
pub struct ExpandedBlock {
    pub block: Block,
    pub key: ExpansionKey,
    pub display_name: String,
}

/// Meta-argument block expansion. Expansion here is attribute-presence-driven:
/// the decoder inspects a block's attributes *before* decoding it, rather
/// than retrying after a failed decode.
pub struct BlockExpander;

impl BlockExpander {
    /// Returns `None` when the block has neither `count` nor `for_each` —
    /// callers decode it as a single ordinary block in that case.
    pub fn expand(block: &Block, ctx: &EvalContext) -> Result<Option<Vec<ExpandedBlock>>, CfgError> {
        let has_count = block.body.has_attr("count");
        let has_for_each = block.body.has_attr("for_each");

        if has_count && has_for_each {
            return Err(CfgError::CountAndForEachMutuallyExclusive(block.label().unwrap_or("").to_string()));
        }
        if !has_count && !has_for_each {
            return Ok(None);
        }

        if has_count {
            let expr = block.body.attr("count").expect("presence checked above");
            let value = expr.evaluate(ctx)?;
            let n = value
                .as_i64()
                .filter(|n| *n >= 0)
                .ok_or_else(|| CfgError::InvalidCountExpression(format!("{:?}", value)))?;
            let mut out = Vec::with_capacity(n as usize);
            for i in 0..n {
                let label = block.label().unwrap_or("");
                out.push(ExpandedBlock {
                    block: strip_meta_args(block),
                    key: ExpansionKey::CountIndex(i),
                    display_name: format!("{}[{}]", label, i),
                });
            }
            Ok(Some(out))
        } else {
            let expr = block.body.attr("for_each").expect("presence checked above");
            let value = expr.evaluate(ctx)?;
            let pairs = match &value {
                Value::Map(_) | Value::Object(_) | Value::Set(_) => value.iter_pairs(),
                _ => return Err(CfgError::InvalidForEachExpression(format!("{:?}", value))),
            };
            let mut out = Vec::with_capacity(pairs.len());
            for (k, _v) in pairs {
                let label = block.label().unwrap_or("");
                out.push(ExpandedBlock {
                    block: strip_meta_args(block),
                    key: ExpansionKey::EachKey(k.clone()),
                    display_name: format!("{}[{}]", label, k),
                });
            }
            Ok(Some(out))
        }
    }

    /// Extends `ctx` with `count.index` or `each.{key,value}` for one
    /// produced instance, given the original `for_each` collection so the
    /// instance's `each.value` can be looked back up by key.
    pub fn context_for(key: &ExpansionKey, for_each_collection: Option<&Value>, ctx: &EvalContext) -> EvalContext {
        match key {
            ExpansionKey::CountIndex(i) => ctx.with_count_index(*i),
            ExpansionKey::EachKey(k) => {
                let value = for_each_collection
                    .map(|c| c.iter_pairs())
                    .and_then(|pairs| pairs.into_iter().find(|(pk, _)| pk == k))
                    .map(|(_, v)| v)
                    .unwrap_or(Value::Null);
                ctx.with_each(Value::String(k.clone()), value)
            }
        }
    }
}

fn strip_meta_args(block: &Block) -> Block {
    let mut cloned = block.clone();
    cloned.body.attributes.retain(|(name, _, _)| name != "count" && name != "for_each");
    cloned
}
