pub mod blocks;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::ast::{Block, File};
use crate::config::{IncludeInfo, MergeStrategy, ResolvedConfig};
use crate::error::{CfgError, Diagnostic, Diagnostics};
use crate::eval::{EvalContext, FunctionLibrary};
use crate::graph::build::{self, GraphResult};
use crate::merge::IncludeMerger;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subset {
    Dependencies,
    Dependency,
    Terraform,
    TerraformSource,
    Flags,
    Inputs,
    VersionConstraints,
    RemoteState,
    FeatureFlags,
    Engine,
    Exclude,
    Errors,
}

pub type Loader<'a> = dyn Fn(&Path) -> Result<File, Diagnostics> + 'a;

/// `partial_parse` is the pipeline core: base blocks always
/// decode first, then each requested subset item, then `IncludeMerger`, then
/// `exclude`. `render_only` controls whether a failed cross-module `inputs`
/// lookup becomes a warning (best-effort unknown value) or a hard error.
pub fn partial_parse(
    file: &File,
    subset: &HashSet<Subset>,
    functions: Arc<FunctionLibrary>,
    loader: &Loader,
    render_only: bool,
) -> Result<ResolvedConfig, Diagnostics> {
    let mut diags = Diagnostics::new();
    let mut resolved = ResolvedConfig::default();

    // ─── Base blocks: feature, include, locals ──────────────────────
    let (feature_flags, feature_diags) = blocks::decode_feature_flags(file);
    diags.extend(feature_diags);
    resolved.feature_flags = feature_flags.clone();

    let include_blocks = file.top_level_blocks("include");

    // Evaluate each include's locals/include-path, oldest declared first for
    // gathering, but the merge composition itself runs bottom-up (reverse).
    let mut include_graph_results: Vec<(Block, GraphResult)> = Vec::new();
    for inc in &include_blocks {
        let phase1 = build::evaluate(file, Some(inc), None, functions.clone());
        let phase1 = match phase1 {
            Ok(r) => r,
            Err(d) => {
                diags.extend(d);
                continue;
            }
        };
        let result = if let Some(parent_path) = phase1.parent_path.clone() {
            match loader(&parent_path) {
                Ok(parent_file) => match build::evaluate(file, Some(inc), Some(&parent_file), functions.clone()) {
                    Ok(r) => r,
                    Err(d) => {
                        diags.extend(d);
                        phase1
                    }
                },
                Err(_) => {
                    diags.push(Diagnostic::error(
                        file.path.clone(),
                        0,
                        0,
                        CfgError::ParentFileNotFound {
                            path: parent_path.display().to_string(),
                            file: file.path.display().to_string(),
                            cause: "could not be loaded".into(),
                        },
                    ));
                    phase1
                }
            }
        } else {
            phase1
        };
        include_graph_results.push(((*inc).clone(), result));
    }

    if diags.has_errors() {
        return Err(diags);
    }

    // No include (or all failed): fall back to a plain locals-only graph.
    let base_graph = if include_graph_results.is_empty() {
        match build::evaluate(file, None, None, functions.clone()) {
            Ok(r) => r,
            Err(d) => {
                diags.extend(d);
                GraphResult::default()
            }
        }
    } else {
        include_graph_results[0].1.clone()
    };

    resolved.locals = base_graph.child_locals.clone();

    let mut ctx = EvalContext::new(functions.clone(), file.path.clone());
    ctx = ctx.with_variable("local", Value::Object(base_graph.child_locals.clone()));
    ctx = ctx.with_variable("global", Value::Object(base_graph.globals.clone()));
    ctx = ctx.with_variable("feature", Value::Object(feature_flags));
    if let Some(inc_val) = base_graph.include_value.clone() {
        ctx = ctx.with_variable("include", inc_val);
    }

    for (name, info) in decode_include_info(&include_blocks, &ctx) {
        resolved.include_info.push((name, info));
    }

    // ─── Subset items ────────────────────────────────────────────────
    if subset.contains(&Subset::Terraform) || subset.contains(&Subset::TerraformSource) {
        blocks::decode_terraform(file, &ctx, &mut resolved, &mut diags);
    }
    if subset.contains(&Subset::Dependency) || subset.contains(&Subset::Dependencies) {
        blocks::decode_dependencies(file, &ctx, &mut resolved, &mut diags);
    }
    if subset.contains(&Subset::Inputs) {
        blocks::decode_inputs(file, &ctx, &mut resolved, render_only, &mut diags);
    }
    if subset.contains(&Subset::RemoteState) {
        blocks::decode_remote_state(file, &ctx, &mut resolved, &mut diags);
    }
    if subset.contains(&Subset::FeatureFlags) {
        // already populated above from base blocks; nothing further to do.
    }
    if subset.contains(&Subset::VersionConstraints) {
        blocks::decode_version_constraints(file, &mut resolved);
    }
    if subset.contains(&Subset::Engine) {
        blocks::decode_engine(file, &ctx, &mut resolved, &mut diags);
    }
    if subset.contains(&Subset::Errors) {
        blocks::decode_errors(file, &ctx, &mut resolved, &mut diags);
    }
    if subset.contains(&Subset::Flags) {
        blocks::decode_flags(file, &ctx, &mut resolved, &mut diags);
    }

    // `generate` has no dedicated subset entry; it decodes unconditionally,
    // like the other base blocks.
    blocks::decode_generate(file, &ctx, &mut resolved, &mut diags);

    // ─── Include merge (bottom-up, reverse declaration order) ────────
    if !include_graph_results.is_empty() {
        resolved = IncludeMerger::merge_all(resolved, &include_graph_results, file, subset, functions.clone(), loader, render_only, &mut diags);
    }

    // ─── Exclude, applied last ────────────────────────────────────────
    if subset.contains(&Subset::Exclude) {
        blocks::decode_exclude(file, &ctx, &mut resolved, &mut diags);
    }

    resolved.is_partial = !is_full_subset(subset);

    if diags.has_errors() {
        Err(diags)
    } else {
        Ok(resolved)
    }
}

fn is_full_subset(subset: &HashSet<Subset>) -> bool {
    use Subset::*;
    let all = [Dependencies, Dependency, Terraform, TerraformSource, Flags, Inputs, VersionConstraints, RemoteState, FeatureFlags, Engine, Exclude, Errors];
    all.iter().all(|s| subset.contains(s))
}

fn decode_include_info(include_blocks: &[&Block], ctx: &EvalContext) -> Vec<(String, IncludeInfo)> {
    let mut out = Vec::new();
    for inc in include_blocks {
        let label = inc.label().unwrap_or("").to_string();
        let path = inc.body.attr("path").and_then(|e| e.evaluate(ctx).ok()).and_then(|v| v.as_str().map(String::from)).unwrap_or_default();
        let strategy = inc
            .body
            .attr("merge_strategy")
            .and_then(|e| e.evaluate(ctx).ok())
            .and_then(|v| v.as_str().map(String::from))
            .and_then(|s| MergeStrategy::parse(&s))
            .unwrap_or(MergeStrategy::ShallowMerge);
        let expose = inc.body.attr("expose").and_then(|e| e.evaluate(ctx).ok()).and_then(|v| v.as_bool()).unwrap_or(false);
        out.push((label, IncludeInfo { path, merge_strategy: strategy, expose }));
    }
    out
}
