use crate::ast::File;
use crate::config::{DepBlock, ModuleDep, ResolvedConfig};
use crate::error::{CfgError, Diagnostic, Diagnostics};
use crate::eval::EvalContext;
use crate::expand::BlockExpander;
use crate::value::Value;

/// `feature` blocks: every flag must declare a default literal. Decoded
/// unconditionally as a base block.
pub fn decode_feature_flags(file: &File) -> (Vec<(String, Value)>, Diagnostics) {
    let mut diags = Diagnostics::new();
    let mut out = Vec::new();
    for block in file.top_level_blocks("feature") {
        let Some(name) = block.label() else { continue };
        match block.body.attr("default") {
            Some(expr) => match expr {
                crate::ast::Expression::Literal(v) => out.push((name.to_string(), v.clone())),
                other => {
                    // Non-literal default still evaluates fine without
                    // feature-scope variables; only literals are required
                    // by the invariant, but we accept any constant-folded
                    // expression for forward compatibility.
                    let ctx = EvalContext::new(std::sync::Arc::new(crate::eval::FunctionLibrary::new()), file.path.clone());
                    match other.evaluate(&ctx) {
                        Ok(v) => out.push((name.to_string(), v)),
                        Err(e) => diags.push(Diagnostic::error(file.path.clone(), block.position.line, block.position.column, e)),
                    }
                }
            },
            None => diags.push(Diagnostic::error(
                file.path.clone(),
                block.position.line,
                block.position.column,
                CfgError::EmptyStringNotAllowed { context: format!("feature \"{}\" has no default", name) },
            )),
        }
    }
    (out, diags)
}

pub fn decode_terraform(file: &File, ctx: &EvalContext, resolved: &mut ResolvedConfig, diags: &mut Diagnostics) {
    let Some(block) = file.top_level_blocks("terraform").into_iter().next() else { return };
    if let Some(expr) = block.body.attr("source") {
        match expr.evaluate(ctx) {
            Ok(v) => resolved.terraform_source = v.as_str().map(String::from),
            Err(e) => diags.push(Diagnostic::error(file.path.clone(), block.position.line, block.position.column, e)),
        }
    }
}

pub fn decode_version_constraints(file: &File, resolved: &mut ResolvedConfig) {
    for name in ["terraform_version_constraint", "terragrunt_version_constraint"] {
        if let Some(crate::ast::Expression::Literal(Value::String(s))) = file.root.attr(name) {
            resolved.version_constraints.push((name.to_string(), s.clone()));
        }
    }
}

pub fn decode_dependencies(file: &File, ctx: &EvalContext, resolved: &mut ResolvedConfig, diags: &mut Diagnostics) {
    // Block form: `dependency "name" { config_path = ...; for_each/count? }`
    for block in file.top_level_blocks("dependency") {
        match BlockExpander::expand(block, ctx) {
            Ok(Some(instances)) => {
                let for_each_value = block.body.attr("for_each").and_then(|e| e.evaluate(ctx).ok());
                for inst in instances {
                    let sub_ctx = BlockExpander::context_for(&inst.key, for_each_value.as_ref(), ctx);
                    decode_one_dependency(&inst.block, &sub_ctx, resolved, diags, file, Some(&inst.display_name));
                }
            }
            Ok(None) => decode_one_dependency(block, ctx, resolved, diags, file, None),
            Err(e) => diags.push(Diagnostic::error(file.path.clone(), block.position.line, block.position.column, e)),
        }
    }

    // `dependencies { paths = [...] }`: converted to the same underlying
    // list and merged by path, earlier entries first.
    if let Some(block) = file.top_level_blocks("dependencies").into_iter().next() {
        if let Some(expr) = block.body.attr("paths") {
            match expr.evaluate(ctx) {
                Ok(Value::List(items)) | Ok(Value::Set(items)) => {
                    for item in items {
                        if let Some(path) = item.as_str() {
                            if !resolved.dependencies.iter().any(|d| d.config_path == path) {
                                resolved.dependencies.push(ModuleDep { name: path.to_string(), config_path: path.to_string() });
                            }
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => diags.push(Diagnostic::error(file.path.clone(), block.position.line, block.position.column, e)),
            }
        }
    }
}

fn decode_one_dependency(
    block: &crate::ast::Block,
    ctx: &EvalContext,
    resolved: &mut ResolvedConfig,
    diags: &mut Diagnostics,
    file: &File,
    name_override: Option<&str>,
) {
    let Some(label) = block.label() else { return };
    let name = name_override.unwrap_or(label);
    if resolved.typed_dependencies.iter().any(|d| d.name == name) {
        diags.push(Diagnostic::error(
            file.path.clone(),
            block.position.line,
            block.position.column,
            CfgError::DuplicateDependencyBlock { label: name.to_string() },
        ));
        return;
    }
    let config_path = match block.body.attr("config_path").map(|e| e.evaluate(ctx)) {
        Some(Ok(v)) => v.as_str().unwrap_or_default().to_string(),
        Some(Err(e)) => {
            diags.push(Diagnostic::error(file.path.clone(), block.position.line, block.position.column, e));
            return;
        }
        None => String::new(),
    };
    let enabled = block.body.attr("enabled").and_then(|e| e.evaluate(ctx).ok()).and_then(|v| v.as_bool());
    let mock_outputs = block.body.attr("mock_outputs").and_then(|e| e.evaluate(ctx).ok());
    let mock_outputs_allowed_commands = block
        .body
        .attr("mock_outputs_allowed_terraform_commands")
        .and_then(|e| e.evaluate(ctx).ok())
        .map(|v| v.iter_pairs().into_iter().filter_map(|(_, v)| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    if let Some(existing) = resolved.dependencies.iter().find(|d| d.config_path == config_path) {
        diags.push(Diagnostic::error(
            file.path.clone(),
            block.position.line,
            block.position.column,
            CfgError::DuplicateConfigPath { path: config_path.clone(), dep_a: existing.name.clone(), dep_b: name.to_string() },
        ));
        return;
    }

    resolved.dependencies.push(ModuleDep { name: name.to_string(), config_path: config_path.clone() });
    resolved.typed_dependencies.push(DepBlock {
        name: name.to_string(),
        config_path,
        enabled,
        mock_outputs,
        mock_outputs_allowed_commands,
    });
}

pub fn decode_inputs(file: &File, ctx: &EvalContext, resolved: &mut ResolvedConfig, render_only: bool, diags: &mut Diagnostics) {
    let Some(expr) = file.root.attr("inputs") else { return };
    match expr.evaluate(ctx) {
        Ok(Value::Object(entries)) | Ok(Value::Map(entries)) => resolved.inputs = entries,
        Ok(_) => {}
        Err(e) if render_only => {
            diags.push(Diagnostic::warning(
                file.path.clone(),
                0,
                0,
                CfgError::FunctionError { name: "inputs".into(), arg_index: 0, reason: e.to_string() },
            ));
            resolved.inputs = vec![("*".to_string(), Value::Unknown)];
        }
        Err(e) => diags.push(Diagnostic::error(file.path.clone(), 0, 0, e)),
    }
}

pub fn decode_remote_state(file: &File, ctx: &EvalContext, resolved: &mut ResolvedConfig, diags: &mut Diagnostics) {
    let Some(block) = file.top_level_blocks("remote_state").into_iter().next() else { return };
    let mut entries = Vec::new();
    for (name, expr, _) in &block.body.attributes {
        match expr.evaluate(ctx) {
            Ok(v) => entries.push((name.clone(), v)),
            Err(e) => diags.push(Diagnostic::error(file.path.clone(), block.position.line, block.position.column, e)),
        }
    }
    resolved.remote_state = Some(Value::Object(entries));
}

pub fn decode_engine(file: &File, ctx: &EvalContext, resolved: &mut ResolvedConfig, diags: &mut Diagnostics) {
    let Some(block) = file.top_level_blocks("engine").into_iter().next() else { return };
    let mut entries = Vec::new();
    for (name, expr, _) in &block.body.attributes {
        match expr.evaluate(ctx) {
            Ok(v) => entries.push((name.clone(), v)),
            Err(e) => diags.push(Diagnostic::error(file.path.clone(), block.position.line, block.position.column, e)),
        }
    }
    resolved.generate_configs.push(("__engine".to_string(), Value::Object(entries)));
}

pub fn decode_errors(file: &File, ctx: &EvalContext, resolved: &mut ResolvedConfig, diags: &mut Diagnostics) {
    let Some(block) = file.top_level_blocks("errors").into_iter().next() else { return };
    let mut entries = Vec::new();
    for (name, expr, _) in &block.body.attributes {
        match expr.evaluate(ctx) {
            Ok(v) => entries.push((name.clone(), v)),
            Err(e) => diags.push(Diagnostic::error(file.path.clone(), block.position.line, block.position.column, e)),
        }
    }
    resolved.errors = Some(Value::Object(entries));
}

pub fn decode_exclude(file: &File, ctx: &EvalContext, resolved: &mut ResolvedConfig, diags: &mut Diagnostics) {
    let Some(block) = file.top_level_blocks("exclude").into_iter().next() else { return };
    let mut entries = Vec::new();
    for (name, expr, _) in &block.body.attributes {
        match expr.evaluate(ctx) {
            Ok(v) => entries.push((name.clone(), v)),
            Err(e) => diags.push(Diagnostic::error(file.path.clone(), block.position.line, block.position.column, e)),
        }
    }
    resolved.exclude = Some(Value::Object(entries));
}

/// `Flags` subset: the scalar top-level attributes `skip`, `prevent_destroy`,
/// and `iam_role`. `skip` is canonicalized as `Option<Bool>` regardless of
/// how the config spells it: absent means "not skipped," present means the
/// author set it explicitly either way.
pub fn decode_flags(file: &File, ctx: &EvalContext, resolved: &mut ResolvedConfig, diags: &mut Diagnostics) {
    if let Some(expr) = file.root.attr("skip") {
        match expr.evaluate(ctx) {
            Ok(v) => resolved.skip = v.as_bool(),
            Err(e) => diags.push(Diagnostic::error(file.path.clone(), 0, 0, e)),
        }
    }
    if let Some(expr) = file.root.attr("prevent_destroy") {
        match expr.evaluate(ctx) {
            Ok(v) => resolved.prevent_destroy = v.as_bool(),
            Err(e) => diags.push(Diagnostic::error(file.path.clone(), 0, 0, e)),
        }
    }
    if let Some(expr) = file.root.attr("iam_role") {
        match expr.evaluate(ctx) {
            Ok(v) => resolved.iam_role = v.as_str().map(String::from),
            Err(e) => diags.push(Diagnostic::error(file.path.clone(), 0, 0, e)),
        }
    }
}

/// `generate` blocks have no dedicated subset entry and decode
/// unconditionally alongside the other base
/// blocks, like `locals`/`include`.
pub fn decode_generate(file: &File, ctx: &EvalContext, resolved: &mut ResolvedConfig, diags: &mut Diagnostics) {
    for block in file.top_level_blocks("generate") {
        let Some(name) = block.label() else { continue };
        let mut entries = Vec::new();
        for (attr_name, expr, _) in &block.body.attributes {
            match expr.evaluate(ctx) {
                Ok(v) => entries.push((attr_name.clone(), v)),
                Err(e) => diags.push(Diagnostic::error(file.path.clone(), block.position.line, block.position.column, e)),
            }
        }
        resolved.generate_configs.push((name.to_string(), Value::Object(entries)));
    }
}
