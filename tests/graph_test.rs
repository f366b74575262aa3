use std::path::Path;
use std::sync::Arc;

use oxid_cfg::eval::FunctionLibrary;
use oxid_cfg::graph::build;
use oxid_cfg::parser;

fn parse(src: &str, path: &str) -> oxid_cfg::ast::File {
    parser::parse(src.as_bytes(), Path::new(path)).expect("should parse")
}

#[test]
fn simple_locals_cross_reference() {
    let file = parse(
        r#"
locals {
  full = "${local.a}-${local.b}"
  a = "x"
  b = "y"
}
"#,
        "child.hcl",
    );

    let functions = Arc::new(FunctionLibrary::new());
    let result = build::evaluate(&file, None, None, functions).expect("should evaluate");

    let get = |name: &str| result.child_locals.iter().find(|(n, _)| n == name).map(|(_, v)| v.to_string());
    assert_eq!(get("a").as_deref(), Some("x"));
    assert_eq!(get("b").as_deref(), Some("y"));
    assert_eq!(get("full").as_deref(), Some("x-y"));
}

#[test]
fn child_references_parent_globals() {
    let dir = tempfile::tempdir().unwrap();
    let parent_path = dir.path().join("root.hcl");
    std::fs::write(&parent_path, r#"globals { region = "us-east-1" }"#).unwrap();

    let modules_dir = dir.path().join("modules");
    std::fs::create_dir(&modules_dir).unwrap();
    let child_path = modules_dir.join("child.hcl");
    std::fs::write(
        &child_path,
        r#"
locals { r = global.region }
include "root" { path = "../root.hcl" }
"#,
    )
    .unwrap();

    let child = parser::parse(&std::fs::read(&child_path).unwrap(), &child_path).unwrap();
    let parent = parser::parse(&std::fs::read(&parent_path).unwrap(), &parent_path).unwrap();

    let functions = Arc::new(FunctionLibrary::new());
    let include = child.top_level_blocks("include").into_iter().next();
    let result = build::evaluate(&child, include, Some(&parent), functions).expect("should evaluate");

    let r = result.child_locals.iter().find(|(n, _)| n == "r").map(|(_, v)| v.to_string());
    assert_eq!(r.as_deref(), Some("us-east-1"));
}

#[test]
fn dependency_cycle_is_rejected() {
    let file = parse(
        r#"
locals {
  a = local.b
  b = local.a
}
"#,
        "cycle.hcl",
    );

    let functions = Arc::new(FunctionLibrary::new());
    let result = build::evaluate(&file, None, None, functions);
    assert!(result.is_err(), "a self-referential local cycle must be rejected");
}

#[test]
fn no_include_falls_back_to_plain_locals() {
    let file = parse(r#"locals { x = 1 }"#, "standalone.hcl");
    let functions = Arc::new(FunctionLibrary::new());
    let result = build::evaluate(&file, None, None, functions).expect("should evaluate");
    assert!(result.parent_path.is_none());
    assert_eq!(result.child_locals.iter().find(|(n, _)| n == "x").map(|(_, v)| v.as_i64()), Some(Some(1)));
}
