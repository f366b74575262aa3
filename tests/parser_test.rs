use std::path::Path;

use oxid_cfg::parser;

#[test]
fn bare_include_normalizes_to_single_empty_label() {
    let file = parser::parse(br#"include { path = "../root.hcl" }"#, Path::new("child.hcl")).expect("should parse");
    let includes = file.top_level_blocks("include");
    assert_eq!(includes.len(), 1);
    assert_eq!(includes[0].label(), Some(""));
}

#[test]
fn labeled_include_keeps_its_label() {
    let file = parser::parse(br#"include "root" { path = "../root.hcl" }"#, Path::new("child.hcl")).expect("should parse");
    let includes = file.top_level_blocks("include");
    assert_eq!(includes.len(), 1);
    assert_eq!(includes[0].label(), Some("root"));
}

#[test]
fn multiple_bare_includes_are_rejected() {
    let src = br#"
include { path = "../a.hcl" }
include { path = "../b.hcl" }
"#;
    let result = parser::parse(src, Path::new("child.hcl"));
    assert!(result.is_err(), "two bare include blocks in the same file is ambiguous and must error");
}

#[test]
fn json_bare_include_object_form_normalizes_like_hcl() {
    let src = br#"{"include": {"path": "../root.hcl"}}"#;
    let file = parser::parse(src, Path::new("child.hcl.json")).expect("should parse");
    let includes = file.top_level_blocks("include");
    assert_eq!(includes.len(), 1);
    assert_eq!(includes[0].label(), Some(""));
}

#[test]
fn json_multi_element_bare_include_array_is_rejected() {
    let src = br#"{"include": [{"path": "../a.hcl"}, {"path": "../b.hcl"}]}"#;
    let result = parser::parse(src, Path::new("child.hcl.json"));
    assert!(result.is_err());
}

#[test]
fn json_labeled_include_object_passes_through() {
    let src = br#"{"include": {"root": {"path": "../root.hcl"}}}"#;
    let file = parser::parse(src, Path::new("child.hcl.json")).expect("should parse");
    let includes = file.top_level_blocks("include");
    assert_eq!(includes.len(), 1);
    assert_eq!(includes[0].label(), Some("root"));
}

#[test]
fn invalid_utf8_is_rejected_not_panicked() {
    let bytes: &[u8] = &[0xff, 0xfe, 0x00, 0x01];
    let result = parser::parse(bytes, Path::new("bad.hcl"));
    assert!(result.is_err());
}
