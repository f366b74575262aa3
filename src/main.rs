use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Reset SIGPIPE to default behavior so piping (e.g. `oxid-cfg graph | dot`)
/// exits cleanly instead of panicking on broken pipe.
#[cfg(unix)]
fn reset_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use oxid_cfg::decode::{partial_parse, Subset};
use oxid_cfg::error::{render, should_color, Diagnostics};
use oxid_cfg::eval::FunctionLibrary;
use oxid_cfg::graph::build;
use oxid_cfg::loader;

/// oxid-cfg - parser and evaluator for infrastructure-module configuration files
#[derive(Parser)]
#[command(name = "oxid-cfg", version, about, long_about = None)]
struct Cli {
    /// Disable colored diagnostic output
    #[arg(long, global = true)]
    no_color: bool,

    /// Enable verbose (debug-level) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Partially or fully decode a configuration file
    Decode {
        /// Path to a CL/JSON configuration file
        path: String,

        /// Subset of block kinds to decode (default: all)
        #[arg(long, value_delimiter = ',')]
        subset: Vec<String>,

        /// Print the resolved config as JSON instead of a human summary
        #[arg(long)]
        json: bool,
    },

    /// Parse and fully decode a file, reporting any diagnostics
    Validate {
        /// Path to a CL/JSON configuration file
        path: String,
    },

    /// Print the variable dependency graph
    Graph {
        /// Path to a CL/JSON configuration file
        path: String,

        /// Emit Graphviz DOT instead of a plain vertex list
        #[arg(long)]
        dot: bool,
    },
}

fn main() -> ExitCode {
    #[cfg(unix)]
    reset_sigpipe();

    let cli = Cli::parse();

    let filter = if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("warn") };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let color = should_color(cli.no_color);

    let result = match &cli.command {
        Commands::Decode { path, subset, json } => cmd_decode(path, subset, *json, color),
        Commands::Validate { path } => cmd_validate(path, color),
        Commands::Graph { path, dot } => cmd_graph(path, *dot, color),
    };

    match result {
        Ok(had_errors) => {
            if had_errors {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn parse_subset(names: &[String]) -> HashSet<Subset> {
    if names.is_empty() {
        return all_subsets();
    }
    names
        .iter()
        .filter_map(|n| match n.to_lowercase().as_str() {
            "dependencies" => Some(Subset::Dependencies),
            "dependency" => Some(Subset::Dependency),
            "terraform" => Some(Subset::Terraform),
            "terraformsource" => Some(Subset::TerraformSource),
            "flags" => Some(Subset::Flags),
            "inputs" => Some(Subset::Inputs),
            "versionconstraints" => Some(Subset::VersionConstraints),
            "remotestate" => Some(Subset::RemoteState),
            "featureflags" => Some(Subset::FeatureFlags),
            "engine" => Some(Subset::Engine),
            "exclude" => Some(Subset::Exclude),
            "errors" => Some(Subset::Errors),
            _ => None,
        })
        .collect()
}

fn all_subsets() -> HashSet<Subset> {
    use Subset::*;
    [Dependencies, Dependency, Terraform, TerraformSource, Flags, Inputs, VersionConstraints, RemoteState, FeatureFlags, Engine, Exclude, Errors]
        .into_iter()
        .collect()
}

fn load_loader() -> impl Fn(&Path) -> Result<oxid_cfg::ast::File, Diagnostics> {
    |p: &Path| loader::load(p, None)
}

/// Returns `Ok(true)` when diagnostics contained at least one error (for the
/// exit-code mapping: 0 iff no `Severity::Error` was raised).
fn cmd_decode(path: &str, subset_names: &[String], json: bool, color: bool) -> anyhow::Result<bool> {
    let path = PathBuf::from(path);
    let bytes = std::fs::read(&path)?;
    let file = oxid_cfg::parser::parse(&bytes, &path).map_err(|d| print_and_wrap(&d, color))?;

    let subset = parse_subset(subset_names);
    let functions = Arc::new(FunctionLibrary::new());
    let loader_fn = load_loader();

    match partial_parse(&file, &subset, functions, &loader_fn, false) {
        Ok(resolved) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&resolved_to_json(&resolved))?);
            } else {
                print_resolved_summary(&resolved);
            }
            Ok(false)
        }
        Err(diags) => {
            let mut stderr = std::io::stderr();
            render(&mut stderr, &diags, color)?;
            Ok(diags.iter().any(|d| d.severity == oxid_cfg::error::Severity::Error))
        }
    }
}

fn cmd_validate(path: &str, color: bool) -> anyhow::Result<bool> {
    let path = PathBuf::from(path);
    let bytes = std::fs::read(&path)?;
    let file = match oxid_cfg::parser::parse(&bytes, &path) {
        Ok(f) => f,
        Err(diags) => {
            let mut stderr = std::io::stderr();
            render(&mut stderr, &diags, color)?;
            return Ok(true);
        }
    };

    let functions = Arc::new(FunctionLibrary::new());
    let loader_fn = load_loader();
    let subset = all_subsets();

    match partial_parse(&file, &subset, functions, &loader_fn, false) {
        Ok(_) => {
            println!("{} {} is valid", "✓".green().bold(), path.display());
            Ok(false)
        }
        Err(diags) => {
            let mut stderr = std::io::stderr();
            render(&mut stderr, &diags, color)?;
            Ok(diags.iter().any(|d| d.severity == oxid_cfg::error::Severity::Error))
        }
    }
}

fn cmd_graph(path: &str, dot: bool, color: bool) -> anyhow::Result<bool> {
    let path = PathBuf::from(path);
    let bytes = std::fs::read(&path)?;
    let file = oxid_cfg::parser::parse(&bytes, &path).map_err(|d| print_and_wrap(&d, color))?;

    let functions = Arc::new(FunctionLibrary::new());
    let include = file.top_level_blocks("include").into_iter().next();

    match build::evaluate(&file, include, None, functions) {
        Ok(result) => {
            if dot {
                println!("digraph variables {{");
                for (name, _) in &result.child_locals {
                    println!("  \"local.{}\";", name);
                }
                for (name, _) in &result.globals {
                    println!("  \"global.{}\";", name);
                }
                println!("}}");
            } else {
                for (name, value) in &result.child_locals {
                    println!("local.{} = {}", name, value);
                }
                for (name, value) in &result.globals {
                    println!("global.{} = {}", name, value);
                }
            }
            Ok(false)
        }
        Err(diags) => {
            let mut stderr = std::io::stderr();
            render(&mut stderr, &diags, color)?;
            Ok(diags.iter().any(|d| d.severity == oxid_cfg::error::Severity::Error))
        }
    }
}

fn print_and_wrap(diags: &Diagnostics, color: bool) -> anyhow::Error {
    let mut stderr = std::io::stderr();
    let _ = render(&mut stderr, diags, color);
    anyhow::anyhow!("parse failed")
}

fn print_resolved_summary(resolved: &oxid_cfg::config::ResolvedConfig) {
    println!("{}", "Resolved configuration".bold().cyan());
    println!("{}", "─".repeat(40));
    if let Some(src) = &resolved.terraform_source {
        println!("  {} {}", "terraform.source:".bold(), src);
    }
    println!("  {} {}", "locals:".bold(), resolved.locals.len());
    println!("  {} {}", "inputs:".bold(), resolved.inputs.len());
    println!("  {} {}", "dependencies:".bold(), resolved.dependencies.len());
    println!("  {} {}", "feature flags:".bold(), resolved.feature_flags.len());
    println!("  {} {}", "generate blocks:".bold(), resolved.generate_configs.len());
    if let Some(skip) = resolved.skip {
        println!("  {} {}", "skip:".bold(), skip);
    }
    println!("  {} {}", "partial:".bold(), resolved.is_partial);
}

fn resolved_to_json(resolved: &oxid_cfg::config::ResolvedConfig) -> serde_json::Value {
    use oxid_cfg::value::Value;
    let obj = |entries: &[(String, Value)]| -> serde_json::Value {
        serde_json::Value::Object(entries.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
    };
    serde_json::json!({
        "terraform_source": resolved.terraform_source,
        "inputs": obj(&resolved.inputs),
        "locals": obj(&resolved.locals),
        "dependencies": resolved.dependencies.iter().map(|d| serde_json::json!({"name": d.name, "config_path": d.config_path})).collect::<Vec<_>>(),
        "feature_flags": obj(&resolved.feature_flags),
        "skip": resolved.skip,
        "prevent_destroy": resolved.prevent_destroy,
        "iam_role": resolved.iam_role,
        "is_partial": resolved.is_partial,
    })
}
