use std::path::PathBuf;
use std::sync::Arc;

use oxid_cfg::eval::{EvalContext, FunctionLibrary};
use oxid_cfg::value::Value;

fn ctx_at(path: &str) -> EvalContext {
    EvalContext::new(Arc::new(FunctionLibrary::new()), PathBuf::from(path))
}

#[test]
fn find_in_parent_folders_falls_back_when_not_found() {
    let ctx = ctx_at("/fake/path/terragrunt.hcl");
    let functions = ctx.functions.clone();
    let result = functions
        .call("find_in_parent_folders", &[Value::String("foo.txt".into()), Value::String("fallback.txt".into())], &ctx)
        .expect("should fall back instead of erroring");
    assert_eq!(result, Value::String("fallback.txt".into()));
}

#[test]
fn find_in_parent_folders_without_fallback_errors() {
    let ctx = ctx_at("/fake/path/terragrunt.hcl");
    let functions = ctx.functions.clone();
    let result = functions.call("find_in_parent_folders", &[Value::String("foo.txt".into())], &ctx);
    assert!(result.is_err(), "with no match and no fallback this must error");
}

#[test]
fn get_env_returns_default_when_unset() {
    let key = "TEST_ENV_TERRAGRUNT_HIT";
    std::env::remove_var(key);
    let ctx = ctx_at("/tmp/terragrunt.hcl");
    let functions = ctx.functions.clone();
    let result = functions
        .call("get_env", &[Value::String(key.into()), Value::String("DEFAULT".into())], &ctx)
        .expect("should return the default");
    assert_eq!(result, Value::String("DEFAULT".into()));
}

#[test]
fn get_env_without_default_errors_when_unset() {
    let key = "TEST_ENV_TERRAGRUNT_MISS_NO_DEFAULT";
    std::env::remove_var(key);
    let ctx = ctx_at("/tmp/terragrunt.hcl");
    let functions = ctx.functions.clone();
    let result = functions.call("get_env", &[Value::String(key.into())], &ctx);
    assert!(result.is_err());
}

#[test]
fn join_and_split_round_trip() {
    let ctx = ctx_at("/tmp/a.hcl");
    let functions = ctx.functions.clone();
    let list = Value::List(vec![Value::String("a".into()), Value::String("b".into()), Value::String("c".into())]);
    let joined = functions.call("join", &[Value::String(",".into()), list], &ctx).unwrap();
    assert_eq!(joined, Value::String("a,b,c".into()));

    let split = functions.call("split", &[Value::String(",".into()), Value::String("a,b,c".into())], &ctx).unwrap();
    assert_eq!(split, Value::List(vec![Value::String("a".into()), Value::String("b".into()), Value::String("c".into())]));
}

#[test]
fn merge_prefers_later_arguments() {
    let ctx = ctx_at("/tmp/a.hcl");
    let functions = ctx.functions.clone();
    let a = Value::Object(vec![("x".to_string(), Value::int(1)), ("y".to_string(), Value::int(2))]);
    let b = Value::Object(vec![("y".to_string(), Value::int(99))]);
    let merged = functions.call("merge", &[a, b], &ctx).unwrap();
    match merged {
        Value::Object(entries) => {
            assert_eq!(entries.iter().find(|(k, _)| k == "x").map(|(_, v)| v.as_i64()), Some(Some(1)));
            assert_eq!(entries.iter().find(|(k, _)| k == "y").map(|(_, v)| v.as_i64()), Some(Some(99)));
        }
        other => panic!("expected an object, got {:?}", other),
    }
}

#[test]
fn sha256_digest_matches_known_vector() {
    let ctx = ctx_at("/tmp/a.hcl");
    let functions = ctx.functions.clone();
    let result = functions.call("sha256", &[Value::String("abc".into())], &ctx).unwrap();
    assert_eq!(result, Value::String("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad".into()));
}

#[test]
fn md5_digest_matches_known_vector() {
    let ctx = ctx_at("/tmp/a.hcl");
    let functions = ctx.functions.clone();
    let result = functions.call("md5", &[Value::String("abc".into())], &ctx).unwrap();
    assert_eq!(result, Value::String("900150983cd24fb0d6963f7d28e17f72".into()));
}

#[test]
fn base64_round_trips() {
    let ctx = ctx_at("/tmp/a.hcl");
    let functions = ctx.functions.clone();
    let encoded = functions.call("base64encode", &[Value::String("hello world".into())], &ctx).unwrap();
    let decoded = functions.call("base64decode", &[encoded], &ctx).unwrap();
    assert_eq!(decoded, Value::String("hello world".into()));
}

#[test]
fn length_covers_lists_objects_and_strings() {
    let ctx = ctx_at("/tmp/a.hcl");
    let functions = ctx.functions.clone();
    assert_eq!(functions.call("length", &[Value::List(vec![Value::int(1), Value::int(2)])], &ctx).unwrap().as_i64(), Some(2));
    assert_eq!(functions.call("length", &[Value::String("hello".into())], &ctx).unwrap().as_i64(), Some(5));
}

#[test]
fn unknown_function_errors() {
    let ctx = ctx_at("/tmp/a.hcl");
    let functions = ctx.functions.clone();
    assert!(functions.call("not_a_real_function", &[], &ctx).is_err());
}
