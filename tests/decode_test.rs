use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use oxid_cfg::decode::{partial_parse, Subset};
use oxid_cfg::error::Diagnostics;
use oxid_cfg::eval::FunctionLibrary;
use oxid_cfg::parser;

fn parse(src: &str, path: &str) -> oxid_cfg::ast::File {
    parser::parse(src.as_bytes(), Path::new(path)).expect("should parse")
}

fn no_loader(p: &Path) -> Result<oxid_cfg::ast::File, Diagnostics> {
    panic!("no includes expected, but loader was asked for {}", p.display());
}

fn all_subsets() -> HashSet<Subset> {
    use Subset::*;
    [Dependencies, Dependency, Terraform, TerraformSource, Flags, Inputs, VersionConstraints, RemoteState, FeatureFlags, Engine, Exclude, Errors]
        .into_iter()
        .collect()
}

#[test]
fn block_expansion_with_for_each_over_a_map() {
    let file = parse(
        r#"
dependency "x" {
  for_each = { a = "u", b = "v" }
  config_path = "../${each.value}"
}
"#,
        "child.hcl",
    );

    let functions = Arc::new(FunctionLibrary::new());
    let resolved = partial_parse(&file, &all_subsets(), functions, &no_loader, false).expect("should decode");

    assert_eq!(resolved.typed_dependencies.len(), 2, "for_each over a 2-entry map must produce exactly 2 instances");
    let names: Vec<&str> = resolved.typed_dependencies.iter().map(|d| d.name.as_str()).collect();
    assert!(names.contains(&"x[a]"));
    assert!(names.contains(&"x[b]"));

    let path_for = |n: &str| resolved.typed_dependencies.iter().find(|d| d.name == n).map(|d| d.config_path.clone());
    assert_eq!(path_for("x[a]"), Some("../u".to_string()));
    assert_eq!(path_for("x[b]"), Some("../v".to_string()));
}

#[test]
fn count_expansion_produces_exactly_n_instances() {
    let file = parse(
        r#"
dependency "db" {
  count = 3
  config_path = "../db-${count.index}"
}
"#,
        "child.hcl",
    );

    let functions = Arc::new(FunctionLibrary::new());
    let resolved = partial_parse(&file, &all_subsets(), functions, &no_loader, false).expect("should decode");
    assert_eq!(resolved.typed_dependencies.len(), 3);
}

#[test]
fn flags_subset_decodes_skip_prevent_destroy_iam_role() {
    let file = parse(
        r#"
skip = true
prevent_destroy = true
iam_role = "arn:aws:iam::123:role/deploy"
"#,
        "child.hcl",
    );

    let functions = Arc::new(FunctionLibrary::new());
    let subset: HashSet<Subset> = [Subset::Flags].into_iter().collect();
    let resolved = partial_parse(&file, &subset, functions, &no_loader, false).expect("should decode");

    assert_eq!(resolved.skip, Some(true));
    assert_eq!(resolved.prevent_destroy, Some(true));
    assert_eq!(resolved.iam_role.as_deref(), Some("arn:aws:iam::123:role/deploy"));
}

#[test]
fn partial_parse_monotonicity_smaller_subset_is_pointwise_consistent() {
    let file = parse(
        r#"
terraform { source = "git::https://example.com/module.git" }
inputs = { region = "us-east-1" }
"#,
        "child.hcl",
    );

    let functions = Arc::new(FunctionLibrary::new());
    let small: HashSet<Subset> = [Subset::Terraform].into_iter().collect();
    let big: HashSet<Subset> = [Subset::Terraform, Subset::Inputs].into_iter().collect();

    let resolved_small = partial_parse(&file, &small, functions.clone(), &no_loader, false).expect("should decode");
    let resolved_big = partial_parse(&file, &big, functions, &no_loader, false).expect("should decode");

    assert_eq!(resolved_small.terraform_source, resolved_big.terraform_source);
    assert!(resolved_small.inputs.is_empty(), "inputs were not requested in the smaller subset");
    assert!(!resolved_big.inputs.is_empty());
    assert!(resolved_small.is_partial);
}

#[test]
fn duplicate_dependency_names_are_rejected() {
    let file = parse(
        r#"
dependency "db" { config_path = "../db" }
dependency "db" { config_path = "../db2" }
"#,
        "child.hcl",
    );

    let functions = Arc::new(FunctionLibrary::new());
    let result = partial_parse(&file, &all_subsets(), functions, &no_loader, false);
    assert!(result.is_err(), "a duplicate dependency label must be a decode error");
}
