use std::collections::HashSet;
use std::sync::Arc;

use crate::ast::{Block, File};
use crate::config::{MergeStrategy, ResolvedConfig};
use crate::decode::{self, Loader, Subset};
use crate::error::{CfgError, Diagnostic, Diagnostics};
use crate::eval::{EvalContext, FunctionLibrary};
use crate::graph::build::GraphResult;
use crate::value::Value;

/// Multiple include blocks compose bottom-up: the
/// last-declared include is resolved first and treated as the outermost
/// layer; each earlier-declared include is then merged over it as the
/// higher-precedence side, and finally the child's own decoded fields are
/// merged over the combined result of all includes so they always win.
pub struct IncludeMerger;

impl IncludeMerger {
    #[allow(clippy::too_many_arguments)]
    pub fn merge_all(
        resolved: ResolvedConfig,
        include_graph_results: &[(Block, GraphResult)],
        file: &File,
        subset: &HashSet<Subset>,
        functions: Arc<FunctionLibrary>,
        loader: &Loader,
        render_only: bool,
        diags: &mut Diagnostics,
    ) -> ResolvedConfig {
        if include_graph_results.is_empty() {
            return resolved;
        }

        let mut acc: Option<(ResolvedConfig, MergeStrategy)> = None;

        for (inc_block, graph_result) in include_graph_results.iter().rev() {
            let ctx = context_for(file, graph_result, &functions);
            let strategy = read_merge_strategy(inc_block, &ctx);
            let path = inc_block.body.attr("path").and_then(|e| e.evaluate(&ctx).ok()).and_then(|v| v.as_str().map(String::from));

            let Some(path) = path else {
                diags.push(Diagnostic::error(
                    file.path.clone(),
                    inc_block.position.line,
                    inc_block.position.column,
                    CfgError::InvalidIncludeKey { name: inc_block.label().unwrap_or("").to_string() },
                ));
                continue;
            };
            let parent_path = graph_result.parent_path.clone().unwrap_or_else(|| std::path::PathBuf::from(&path));

            let parent_file = match loader(&parent_path) {
                Ok(f) => f,
                Err(d) => {
                    diags.extend(d);
                    continue;
                }
            };

            if !parent_file.top_level_blocks("include").is_empty() {
                diags.push(Diagnostic::error(
                    file.path.clone(),
                    inc_block.position.line,
                    inc_block.position.column,
                    CfgError::TooManyLevelsOfInheritance {
                        config: file.path.display().to_string(),
                        first: parent_path.display().to_string(),
                        second: "a further include".to_string(),
                    },
                ));
                continue;
            }

            let parent_resolved = match decode::partial_parse(&parent_file, subset, functions.clone(), loader, render_only) {
                Ok(r) => r,
                Err(d) => {
                    diags.extend(d);
                    continue;
                }
            };

            acc = Some(match acc {
                None => (parent_resolved, strategy),
                Some((outer, _outer_strategy)) => (merge_pair(&parent_resolved, &outer, strategy), strategy),
            });
        }

        match acc {
            Some((merged_parents, strategy)) => merge_pair(&resolved, &merged_parents, strategy),
            None => resolved,
        }
    }
}

fn context_for(file: &File, graph_result: &GraphResult, functions: &Arc<FunctionLibrary>) -> EvalContext {
    let mut ctx = EvalContext::new(functions.clone(), file.path.clone());
    ctx = ctx.with_variable("local", Value::Object(graph_result.child_locals.clone()));
    ctx = ctx.with_variable("global", Value::Object(graph_result.globals.clone()));
    if let Some(inc_val) = graph_result.include_value.clone() {
        ctx = ctx.with_variable("include", inc_val);
    }
    ctx
}

fn read_merge_strategy(inc_block: &Block, ctx: &EvalContext) -> MergeStrategy {
    inc_block
        .body
        .attr("merge_strategy")
        .and_then(|e| e.evaluate(ctx).ok())
        .and_then(|v| v.as_str().map(String::from))
        .and_then(|s| MergeStrategy::parse(&s))
        .unwrap_or(MergeStrategy::ShallowMerge)
}

/// Merges `child` (higher precedence) over `parent` (lower precedence) per
/// `strategy`. `NoMerge` discards `parent` entirely.
fn merge_pair(child: &ResolvedConfig, parent: &ResolvedConfig, strategy: MergeStrategy) -> ResolvedConfig {
    if strategy == MergeStrategy::NoMerge {
        return child.clone();
    }

    let deep = matches!(strategy, MergeStrategy::DeepMerge | MergeStrategy::DeepMergeMapOnly);
    let concat_lists = strategy == MergeStrategy::DeepMerge;

    let mut out = ResolvedConfig::default();

    out.terraform_source = child.terraform_source.clone().or_else(|| parent.terraform_source.clone());
    out.prevent_destroy = child.prevent_destroy.or(parent.prevent_destroy);
    out.skip = child.skip.or(parent.skip);
    out.iam_role = child.iam_role.clone().or_else(|| parent.iam_role.clone());

    out.inputs = merge_object_fields(&child.inputs, &parent.inputs, deep, concat_lists);
    out.locals = child.locals.clone();
    out.include_info = merge_keep_child(&child.include_info, &parent.include_info, |(n, _)| n.clone());
    out.feature_flags = merge_keep_child(&child.feature_flags, &parent.feature_flags, |(n, _)| n.clone());

    out.dependencies = merge_dependencies(&child.dependencies, &parent.dependencies);
    out.typed_dependencies = merge_typed_dependencies(&child.typed_dependencies, &parent.typed_dependencies, deep);

    out.version_constraints = merge_keep_child(&child.version_constraints, &parent.version_constraints, |(n, _)| n.clone());

    // Remote-state and generate-config blocks are replaced wholesale under
    // every merge strategy, not just NoMerge: they lack optional-field
    // markers to distinguish a defaulted
    // value from one the author actually set.
    out.remote_state = child.remote_state.clone().or_else(|| parent.remote_state.clone());
    out.generate_configs = if child.generate_configs.is_empty() { parent.generate_configs.clone() } else { child.generate_configs.clone() };

    out.exclude = child.exclude.clone().or_else(|| parent.exclude.clone());
    out.errors = child.errors.clone().or_else(|| parent.errors.clone());

    out.field_provenance = parent.field_provenance.clone();
    out.field_provenance.extend(child.field_provenance.clone());

    out.is_partial = child.is_partial || parent.is_partial;

    out
}

fn merge_keep_child<T: Clone>(child: &[T], parent: &[T], key: impl Fn(&T) -> String) -> Vec<T> {
    let mut out: Vec<T> = child.to_vec();
    let child_keys: HashSet<String> = child.iter().map(&key).collect();
    for item in parent {
        if !child_keys.contains(&key(item)) {
            out.push(item.clone());
        }
    }
    out
}

fn merge_dependencies(child: &[crate::config::ModuleDep], parent: &[crate::config::ModuleDep]) -> Vec<crate::config::ModuleDep> {
    let mut out: Vec<crate::config::ModuleDep> = child.to_vec();
    for dep in parent {
        if !out.iter().any(|d| d.config_path == dep.config_path) {
            out.push(dep.clone());
        }
    }
    out
}

fn merge_typed_dependencies(child: &[crate::config::DepBlock], parent: &[crate::config::DepBlock], deep: bool) -> Vec<crate::config::DepBlock> {
    let mut out: Vec<crate::config::DepBlock> = Vec::new();
    for c in child {
        match parent.iter().find(|p| p.name == c.name) {
            Some(p) if deep => out.push(crate::config::DepBlock {
                name: c.name.clone(),
                config_path: c.config_path.clone(),
                enabled: c.enabled.or(p.enabled),
                mock_outputs: c.mock_outputs.clone().or_else(|| p.mock_outputs.clone()),
                mock_outputs_allowed_commands: if c.mock_outputs_allowed_commands.is_empty() {
                    p.mock_outputs_allowed_commands.clone()
                } else {
                    c.mock_outputs_allowed_commands.clone()
                },
            }),
            _ => out.push(c.clone()),
        }
    }
    for p in parent {
        if !out.iter().any(|d| d.name == p.name) {
            out.push(p.clone());
        }
    }
    out
}

fn merge_object_fields(child: &[(String, Value)], parent: &[(String, Value)], deep: bool, concat_lists: bool) -> Vec<(String, Value)> {
    let mut out: Vec<(String, Value)> = parent.to_vec();
    for (k, cv) in child {
        match out.iter_mut().find(|(pk, _)| pk == k) {
            Some((_, pv)) => *pv = merge_value(cv, pv, deep, concat_lists),
            None => out.push((k.clone(), cv.clone())),
        }
    }
    out
}

fn merge_value(child: &Value, parent: &Value, deep: bool, concat_lists: bool) -> Value {
    match (child, parent) {
        (Value::Object(c), Value::Object(p)) if deep => Value::Object(merge_object_fields(c, p, deep, concat_lists)),
        (Value::Map(c), Value::Map(p)) if deep => Value::Map(merge_object_fields(c, p, deep, concat_lists)),
        (Value::List(c), Value::List(p)) if concat_lists => {
            let mut out = p.clone();
            out.extend(c.clone());
            Value::List(out)
        }
        _ => child.clone(),
    }
}
