use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use oxid_cfg::decode::{partial_parse, Subset};
use oxid_cfg::eval::FunctionLibrary;
use oxid_cfg::loader;
use oxid_cfg::parser;

fn all_subsets() -> HashSet<Subset> {
    use Subset::*;
    [Dependencies, Dependency, Terraform, TerraformSource, Flags, Inputs, VersionConstraints, RemoteState, FeatureFlags, Engine, Exclude, Errors]
        .into_iter()
        .collect()
}

#[test]
fn deep_merge_of_inputs_concatenates_lists_and_unions_scalars() {
    let dir = tempfile::tempdir().unwrap();
    let parent_path = dir.path().join("root.hcl");
    std::fs::write(&parent_path, r#"inputs = { a = 1, lst = ["p"] }"#).unwrap();

    let modules_dir = dir.path().join("modules");
    std::fs::create_dir(&modules_dir).unwrap();
    let child_path = modules_dir.join("child.hcl");
    std::fs::write(
        &child_path,
        r#"
include "root" {
  path = "../root.hcl"
  merge_strategy = "deep"
}
inputs = { b = 2, lst = ["c"] }
"#,
    )
    .unwrap();

    let child = parser::parse(&std::fs::read(&child_path).unwrap(), &child_path).unwrap();
    let functions = Arc::new(FunctionLibrary::new());
    let loader_fn = |p: &Path| loader::load(p, None);

    let resolved = partial_parse(&child, &all_subsets(), functions, &loader_fn, false).expect("should decode");

    let get = |k: &str| resolved.inputs.iter().find(|(n, _)| n == k).map(|(_, v)| v.clone());
    assert_eq!(get("a").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(get("b").and_then(|v| v.as_i64()), Some(2));
    match get("lst") {
        Some(oxid_cfg::value::Value::List(items)) => {
            let strs: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
            assert_eq!(strs, vec!["p", "c"], "deep merge must concatenate parent-then-child");
        }
        other => panic!("expected a list, got {:?}", other),
    }
}

#[test]
fn shallow_merge_replaces_lists_instead_of_concatenating() {
    let dir = tempfile::tempdir().unwrap();
    let parent_path = dir.path().join("root.hcl");
    std::fs::write(&parent_path, r#"inputs = { lst = ["p"] }"#).unwrap();

    let modules_dir = dir.path().join("modules");
    std::fs::create_dir(&modules_dir).unwrap();
    let child_path = modules_dir.join("child.hcl");
    std::fs::write(
        &child_path,
        r#"
include "root" {
  path = "../root.hcl"
  merge_strategy = "shallow"
}
inputs = { lst = ["c"] }
"#,
    )
    .unwrap();

    let child = parser::parse(&std::fs::read(&child_path).unwrap(), &child_path).unwrap();
    let functions = Arc::new(FunctionLibrary::new());
    let loader_fn = |p: &Path| loader::load(p, None);

    let resolved = partial_parse(&child, &all_subsets(), functions, &loader_fn, false).expect("should decode");

    let get = |k: &str| resolved.inputs.iter().find(|(n, _)| n == k).map(|(_, v)| v.clone());
    match get("lst") {
        Some(oxid_cfg::value::Value::List(items)) => {
            let strs: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
            assert_eq!(strs, vec!["c"], "shallow merge replaces the list wholesale");
        }
        other => panic!("expected a list, got {:?}", other),
    }
}

#[test]
fn no_merge_discards_parent_entirely() {
    let dir = tempfile::tempdir().unwrap();
    let parent_path = dir.path().join("root.hcl");
    std::fs::write(&parent_path, r#"inputs = { a = 1 }"#).unwrap();

    let modules_dir = dir.path().join("modules");
    std::fs::create_dir(&modules_dir).unwrap();
    let child_path = modules_dir.join("child.hcl");
    std::fs::write(
        &child_path,
        r#"
include "root" {
  path = "../root.hcl"
  merge_strategy = "no_merge"
}
inputs = { b = 2 }
"#,
    )
    .unwrap();

    let child = parser::parse(&std::fs::read(&child_path).unwrap(), &child_path).unwrap();
    let functions = Arc::new(FunctionLibrary::new());
    let loader_fn = |p: &Path| loader::load(p, None);

    let resolved = partial_parse(&child, &all_subsets(), functions, &loader_fn, false).expect("should decode");

    assert!(resolved.inputs.iter().any(|(k, _)| k == "b"));
    assert!(!resolved.inputs.iter().any(|(k, _)| k == "a"), "no_merge must discard the parent's inputs entirely");
}

#[test]
fn nested_include_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let grandparent_path = dir.path().join("grandparent.hcl");
    std::fs::write(&grandparent_path, r#"locals { x = 1 }"#).unwrap();

    let level1_dir = dir.path().join("level1");
    std::fs::create_dir(&level1_dir).unwrap();
    let parent_path = level1_dir.join("root.hcl");
    std::fs::write(&parent_path, r#"include "gp" { path = "../grandparent.hcl" }"#).unwrap();

    let level2_dir = level1_dir.join("level2");
    std::fs::create_dir(&level2_dir).unwrap();
    let child_path = level2_dir.join("child.hcl");
    std::fs::write(&child_path, r#"include "root" { path = "../root.hcl" }"#).unwrap();

    let child = parser::parse(&std::fs::read(&child_path).unwrap(), &child_path).unwrap();
    let functions = Arc::new(FunctionLibrary::new());
    let loader_fn = |p: &Path| loader::load(p, None);

    let result = partial_parse(&child, &all_subsets(), functions, &loader_fn, false);
    assert!(result.is_err(), "a parent config that itself has an include block must be rejected");
}
