use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write_fixture(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn validate_accepts_a_well_formed_file() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, "terragrunt.hcl", r#"locals { x = 1 }"#);

    let mut cmd = assert_cmd::cargo_bin_cmd!("oxid-cfg");
    cmd.arg("validate").arg(&path).env("NO_COLOR", "1");
    cmd.assert().success().stdout(predicate::str::contains("is valid"));
}

#[test]
fn validate_rejects_a_dependency_cycle() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, "terragrunt.hcl", r#"locals { a = local.b; b = local.a }"#);

    let mut cmd = assert_cmd::cargo_bin_cmd!("oxid-cfg");
    cmd.arg("validate").arg(&path).env("NO_COLOR", "1");
    cmd.assert().failure();
}

#[test]
fn decode_json_emits_parseable_json() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(
        &dir,
        "terragrunt.hcl",
        r#"
terraform { source = "git::https://example.com/module.git" }
inputs = { region = "us-east-1" }
"#,
    );

    let mut cmd = assert_cmd::cargo_bin_cmd!("oxid-cfg");
    cmd.arg("decode").arg(&path).arg("--json").env("NO_COLOR", "1");
    let output = cmd.assert().success().get_output().stdout.clone();
    let parsed: serde_json::Value = serde_json::from_slice(&output).expect("stdout must be valid JSON");
    assert_eq!(parsed["terraform_source"], "git::https://example.com/module.git");
    assert_eq!(parsed["inputs"]["region"], "us-east-1");
}

#[test]
fn decode_with_subset_filter_omits_unrequested_fields() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(
        &dir,
        "terragrunt.hcl",
        r#"
terraform { source = "git::https://example.com/module.git" }
inputs = { region = "us-east-1" }
"#,
    );

    let mut cmd = assert_cmd::cargo_bin_cmd!("oxid-cfg");
    cmd.arg("decode").arg(&path).arg("--subset").arg("terraform").arg("--json").env("NO_COLOR", "1");
    let output = cmd.assert().success().get_output().stdout.clone();
    let parsed: serde_json::Value = serde_json::from_slice(&output).expect("stdout must be valid JSON");
    assert_eq!(parsed["terraform_source"], "git::https://example.com/module.git");
    assert_eq!(parsed["is_partial"], true);
}
