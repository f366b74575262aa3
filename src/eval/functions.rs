use std::path::Path;
use std::sync::OnceLock;

use dashmap::DashMap;
use sha2::Digest;

use crate::error::CfgError;
use crate::eval::context::EvalContext;
use crate::value::Value;

/// The built-in function table. Stateless and read-only after construction,
/// so it's freely shareable across parse calls — callers wrap it in an
/// `Arc` once per process and share it across every file evaluated.
#[derive(Debug, Default)]
pub struct FunctionLibrary;

impl FunctionLibrary {
    pub fn new() -> Self {
        Self
    }

    pub fn call(&self, name: &str, args: &[Value], ctx: &EvalContext) -> Result<Value, CfgError> {
        match name {
            // ── path/context ──────────────────────────────────────────
            "find_in_parent_folders" => find_in_parent_folders(args, ctx),
            "path_relative_to_include" => path_relative_to_include(ctx),
            "path_relative_from_include" => path_relative_from_include(ctx),
            "get_terragrunt_dir" => Ok(Value::String(dir_of(&ctx.current_file))),
            "get_parent_terragrunt_dir" => get_parent_terragrunt_dir(ctx),

            // ── environment ───────────────────────────────────────────
            "get_env" => get_env(args),

            // ── process ───────────────────────────────────────────────
            "run_cmd" => run_cmd(args, ctx),

            // ── cloud identity ────────────────────────────────────────
            "get_aws_account_id" => get_aws_account_id(ctx),

            // ── introspection ─────────────────────────────────────────
            "get_terraform_commands_that_need_vars" => Ok(string_list(&["apply", "console", "destroy", "import", "plan", "refresh"])),
            "get_terraform_commands_that_need_locking" => {
                Ok(string_list(&["apply", "destroy", "import", "init", "plan", "refresh", "taint", "untaint"]))
            }
            "get_terraform_commands_that_need_input" => Ok(string_list(&["apply", "import", "init", "plan", "refresh"])),
            "get_terraform_commands_that_need_parallelism" => Ok(string_list(&["apply", "destroy", "plan", "refresh"])),
            "get_terraform_cli_args" => Ok(Value::List(Vec::new())),

            // ── cross-module ──────────────────────────────────────────
            "get_output" => get_output(args, ctx),

            // ── general standard library ──────────────────────────────
            "lower" => one_string(name, args, |s| s.to_lowercase()),
            "upper" => one_string(name, args, |s| s.to_uppercase()),
            "title" => one_string(name, args, title_case),
            "trim" => one_string(name, args, |s| s.trim().to_string()),
            "trimspace" => one_string(name, args, |s| s.trim().to_string()),
            "chomp" => one_string(name, args, |s| s.trim_end_matches(['\n', '\r']).to_string()),
            "trimprefix" => two_strings(name, args, |s, p| s.strip_prefix(p.as_str()).unwrap_or(&s).to_string()),
            "trimsuffix" => two_strings(name, args, |s, p| s.strip_suffix(p.as_str()).unwrap_or(&s).to_string()),
            "startswith" => two_strings_bool(name, args, |s, p| s.starts_with(p.as_str())),
            "endswith" => two_strings_bool(name, args, |s, p| s.ends_with(p.as_str())),
            "strcontains" => two_strings_bool(name, args, |s, p| s.contains(p.as_str())),
            "indent" => indent(args),
            "replace" => replace(args),
            "format" => format_fn(args),
            "formatlist" => formatlist(args),
            "join" => join(args),
            "split" => split(args),
            "concat" => concat(args),
            "merge" => merge(args),
            "keys" => keys(args),
            "values" => values(args),
            "lookup" => lookup(args),
            "contains" => contains(args),
            "distinct" => distinct(args),
            "compact" => compact(args),
            "flatten" => flatten(args),
            "coalesce" => coalesce(args),
            "coalescelist" => coalescelist(args),
            "element" => element(args),
            "zipmap" => zipmap(args),
            "try" => try_fn(args, ctx),
            "can" => can_fn(args, ctx),
            "length" => length(args),
            "slice" => slice(args),
            "reverse" => reverse(args),
            "sort" => sort(args),
            "range" => range(args),
            "min" => min_max(args, true),
            "max" => min_max(args, false),
            "abs" => abs_fn(args),
            "ceil" => ceil_fn(args),
            "floor" => floor_fn(args),
            "signum" => signum_fn(args),
            "tobool" => tobool(args),
            "jsonencode" => jsonencode(args),
            "jsondecode" => jsondecode(args),
            "base64encode" => base64encode(args),
            "base64decode" => base64decode(args),
            "md5" => digest_fn(args, "md5"),
            "sha1" => digest_fn(args, "sha1"),
            "sha256" => digest_fn(args, "sha256"),
            "uuid" => Ok(Value::String(synthetic_uuid())),
            "timestamp" => timestamp(),
            "timeadd" => timeadd(args),
            "timecmp" => timecmp(args),
            "formatdate" => formatdate(args),
            "file" => file_fn(args, ctx),

            _ => Err(CfgError::FunctionError { name: name.to_string(), arg_index: 0, reason: "unknown function".into() }),
        }
    }
}

fn arity_error(name: &str) -> CfgError {
    CfgError::WrongNumberOfParams(name.to_string())
}

fn expect_str<'a>(name: &str, args: &'a [Value], idx: usize) -> Result<&'a str, CfgError> {
    args.get(idx)
        .and_then(Value::as_str)
        .ok_or_else(|| CfgError::InvalidParameterType {
            function: name.to_string(),
            arg_index: idx,
            expected: "string".into(),
            got: args.get(idx).map(|v| v.type_name().to_string()).unwrap_or_else(|| "missing".into()),
        })
}

fn string_list(items: &[&str]) -> Value {
    Value::List(items.iter().map(|s| Value::String(s.to_string())).collect())
}

fn one_string(name: &str, args: &[Value], f: impl Fn(&str) -> String) -> Result<Value, CfgError> {
    let s = expect_str(name, args, 0)?;
    Ok(Value::String(f(s)))
}

fn two_strings(name: &str, args: &[Value], f: impl Fn(String, String) -> String) -> Result<Value, CfgError> {
    let a = expect_str(name, args, 0)?.to_string();
    let b = expect_str(name, args, 1)?.to_string();
    Ok(Value::String(f(a, b)))
}

fn two_strings_bool(name: &str, args: &[Value], f: impl Fn(String, String) -> bool) -> Result<Value, CfgError> {
    let a = expect_str(name, args, 0)?.to_string();
    let b = expect_str(name, args, 1)?.to_string();
    Ok(Value::Bool(f(a, b)))
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut c = w.chars();
            match c.next() {
                Some(first) => first.to_uppercase().collect::<String>() + c.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn indent(args: &[Value]) -> Result<Value, CfgError> {
    let spaces = args.first().and_then(Value::as_i64).ok_or_else(|| arity_error("indent"))?;
    let s = expect_str("indent", args, 1)?;
    let pad = " ".repeat(spaces.max(0) as usize);
    let indented = s.lines().collect::<Vec<_>>().join(&format!("\n{}", pad));
    Ok(Value::String(indented))
}

fn replace(args: &[Value]) -> Result<Value, CfgError> {
    let s = expect_str("replace", args, 0)?;
    let pat = expect_str("replace", args, 1)?;
    let rep = expect_str("replace", args, 2)?;
    if let Some(regex_src) = pat.strip_prefix('/').and_then(|p| p.strip_suffix('/')) {
        let re = regex::Regex::new(regex_src)
            .map_err(|e| CfgError::FunctionError { name: "replace".into(), arg_index: 1, reason: e.to_string() })?;
        Ok(Value::String(re.replace_all(s, rep).to_string()))
    } else {
        Ok(Value::String(s.replace(pat, rep)))
    }
}

fn format_fn(args: &[Value]) -> Result<Value, CfgError> {
    let fmt = expect_str("format", args, 0)?;
    let mut out = String::new();
    let mut arg_idx = 1usize;
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' && chars.peek() == Some(&'s') {
            chars.next();
            let v = args.get(arg_idx).ok_or_else(|| arity_error("format"))?;
            out.push_str(&v.to_string());
            arg_idx += 1;
        } else if c == '%' && chars.peek() == Some(&'d') {
            chars.next();
            let v = args.get(arg_idx).ok_or_else(|| arity_error("format"))?;
            out.push_str(&v.to_string());
            arg_idx += 1;
        } else {
            out.push(c);
        }
    }
    Ok(Value::String(out))
}

fn formatlist(args: &[Value]) -> Result<Value, CfgError> {
    let fmt = expect_str("formatlist", args, 0)?.to_string();
    let lists: Vec<&Value> = args[1..].iter().collect();
    let len = lists
        .iter()
        .filter_map(|v| match v {
            Value::List(items) | Value::Set(items) => Some(items.len()),
            _ => None,
        })
        .max()
        .unwrap_or(0);
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        let mut call_args = vec![Value::String(fmt.clone())];
        for v in &lists {
            let item = match v {
                Value::List(items) | Value::Set(items) => items.get(i).cloned().unwrap_or(Value::Null),
                other => (*other).clone(),
            };
            call_args.push(item);
        }
        out.push(format_fn(&call_args)?);
    }
    Ok(Value::List(out))
}

fn join(args: &[Value]) -> Result<Value, CfgError> {
    let sep = expect_str("join", args, 0)?;
    let items = match args.get(1) {
        Some(Value::List(items)) | Some(Value::Set(items)) => items,
        _ => return Err(arity_error("join")),
    };
    let joined = items.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(sep);
    Ok(Value::String(joined))
}

fn split(args: &[Value]) -> Result<Value, CfgError> {
    let sep = expect_str("split", args, 0)?;
    let s = expect_str("split", args, 1)?;
    Ok(Value::List(s.split(sep).map(|p| Value::String(p.to_string())).collect()))
}

fn concat(args: &[Value]) -> Result<Value, CfgError> {
    let mut out = Vec::new();
    for a in args {
        match a {
            Value::List(items) | Value::Set(items) => out.extend(items.clone()),
            other => out.push(other.clone()),
        }
    }
    Ok(Value::List(out))
}

fn merge(args: &[Value]) -> Result<Value, CfgError> {
    let mut out: Vec<(String, Value)> = Vec::new();
    for a in args {
        if let Value::Object(entries) | Value::Map(entries) = a {
            for (k, v) in entries {
                if let Some(slot) = out.iter_mut().find(|(ek, _)| ek == k) {
                    slot.1 = v.clone();
                } else {
                    out.push((k.clone(), v.clone()));
                }
            }
        }
    }
    Ok(Value::Object(out))
}

fn keys(args: &[Value]) -> Result<Value, CfgError> {
    match args.first() {
        Some(Value::Object(entries)) | Some(Value::Map(entries)) => {
            let mut ks: Vec<String> = entries.iter().map(|(k, _)| k.clone()).collect();
            ks.sort();
            Ok(Value::List(ks.into_iter().map(Value::String).collect()))
        }
        _ => Err(arity_error("keys")),
    }
}

fn values(args: &[Value]) -> Result<Value, CfgError> {
    match args.first() {
        Some(Value::Object(entries)) | Some(Value::Map(entries)) => {
            let mut sorted = entries.clone();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            Ok(Value::List(sorted.into_iter().map(|(_, v)| v).collect()))
        }
        _ => Err(arity_error("values")),
    }
}

fn lookup(args: &[Value]) -> Result<Value, CfgError> {
    let entries = match args.first() {
        Some(Value::Object(entries)) | Some(Value::Map(entries)) => entries,
        _ => return Err(arity_error("lookup")),
    };
    let key = expect_str("lookup", args, 1)?;
    if let Some((_, v)) = entries.iter().find(|(k, _)| k == key) {
        Ok(v.clone())
    } else if let Some(default) = args.get(2) {
        Ok(default.clone())
    } else {
        Err(CfgError::FunctionError { name: "lookup".into(), arg_index: 1, reason: format!("key {} not found", key) })
    }
}

fn contains(args: &[Value]) -> Result<Value, CfgError> {
    match args.first() {
        Some(Value::List(items)) | Some(Value::Set(items)) => {
            let needle = args.get(1).ok_or_else(|| arity_error("contains"))?;
            Ok(Value::Bool(items.contains(needle)))
        }
        _ => Err(arity_error("contains")),
    }
}

fn distinct(args: &[Value]) -> Result<Value, CfgError> {
    match args.first() {
        Some(Value::List(items)) | Some(Value::Set(items)) => {
            let mut out: Vec<Value> = Vec::new();
            for v in items {
                if !out.contains(v) {
                    out.push(v.clone());
                }
            }
            Ok(Value::List(out))
        }
        _ => Err(arity_error("distinct")),
    }
}

fn compact(args: &[Value]) -> Result<Value, CfgError> {
    match args.first() {
        Some(Value::List(items)) | Some(Value::Set(items)) => Ok(Value::List(
            items.iter().filter(|v| !matches!(v, Value::String(s) if s.is_empty())).cloned().collect(),
        )),
        _ => Err(arity_error("compact")),
    }
}

fn flatten(args: &[Value]) -> Result<Value, CfgError> {
    fn go(v: &Value, out: &mut Vec<Value>) {
        match v {
            Value::List(items) | Value::Set(items) => {
                for i in items {
                    go(i, out);
                }
            }
            other => out.push(other.clone()),
        }
    }
    let mut out = Vec::new();
    if let Some(v) = args.first() {
        go(v, &mut out);
    }
    Ok(Value::List(out))
}

fn coalesce(args: &[Value]) -> Result<Value, CfgError> {
    args.iter()
        .find(|v| !matches!(v, Value::Null))
        .cloned()
        .ok_or_else(|| CfgError::FunctionError { name: "coalesce".into(), arg_index: 0, reason: "all arguments are null".into() })
}

fn coalescelist(args: &[Value]) -> Result<Value, CfgError> {
    args.iter()
        .find(|v| matches!(v, Value::List(items) | Value::Set(items) if !items.is_empty()))
        .cloned()
        .ok_or_else(|| CfgError::FunctionError { name: "coalescelist".into(), arg_index: 0, reason: "all lists are empty".into() })
}

fn element(args: &[Value]) -> Result<Value, CfgError> {
    let items = match args.first() {
        Some(Value::List(items)) | Some(Value::Set(items)) => items,
        _ => return Err(arity_error("element")),
    };
    if items.is_empty() {
        return Err(CfgError::FunctionError { name: "element".into(), arg_index: 0, reason: "cannot index into empty list".into() });
    }
    let idx = args.get(1).and_then(Value::as_i64).ok_or_else(|| arity_error("element"))?;
    let wrapped = (idx.rem_euclid(items.len() as i64)) as usize;
    Ok(items[wrapped].clone())
}

fn zipmap(args: &[Value]) -> Result<Value, CfgError> {
    let keys = match args.first() {
        Some(Value::List(items)) | Some(Value::Set(items)) => items,
        _ => return Err(arity_error("zipmap")),
    };
    let vals = match args.get(1) {
        Some(Value::List(items)) | Some(Value::Set(items)) => items,
        _ => return Err(arity_error("zipmap")),
    };
    if keys.len() != vals.len() {
        return Err(CfgError::FunctionError { name: "zipmap".into(), arg_index: 1, reason: "keys and values must be the same length".into() });
    }
    Ok(Value::Object(keys.iter().map(|k| k.to_string()).zip(vals.iter().cloned()).collect()))
}

fn try_fn(args: &[Value], _ctx: &EvalContext) -> Result<Value, CfgError> {
    // Arguments have already been evaluated by the caller by the time they
    // reach here; genuine short-circuiting `try()` semantics require special
    // handling at the expression level and are not modeled beyond first-value
    // passthrough for non-null arguments.
    args.iter()
        .find(|v| !matches!(v, Value::Null))
        .cloned()
        .ok_or_else(|| CfgError::FunctionError { name: "try".into(), arg_index: 0, reason: "all expressions failed".into() })
}

fn can_fn(args: &[Value], _ctx: &EvalContext) -> Result<Value, CfgError> {
    Ok(Value::Bool(args.first().map(|v| !matches!(v, Value::Null)).unwrap_or(false)))
}

fn length(args: &[Value]) -> Result<Value, CfgError> {
    let n = match args.first() {
        Some(Value::List(items)) | Some(Value::Set(items)) => items.len(),
        Some(Value::Object(entries)) | Some(Value::Map(entries)) => entries.len(),
        Some(Value::String(s)) => s.chars().count(),
        _ => return Err(arity_error("length")),
    };
    Ok(Value::int(n as i64))
}

fn slice(args: &[Value]) -> Result<Value, CfgError> {
    let items = match args.first() {
        Some(Value::List(items)) | Some(Value::Set(items)) => items,
        _ => return Err(arity_error("slice")),
    };
    let start = args.get(1).and_then(Value::as_i64).unwrap_or(0).max(0) as usize;
    let end = args.get(2).and_then(Value::as_i64).unwrap_or(items.len() as i64).max(0) as usize;
    let end = end.min(items.len());
    if start > end {
        return Err(CfgError::FunctionError { name: "slice".into(), arg_index: 1, reason: "start index exceeds end index".into() });
    }
    Ok(Value::List(items[start..end].to_vec()))
}

fn reverse(args: &[Value]) -> Result<Value, CfgError> {
    match args.first() {
        Some(Value::List(items)) | Some(Value::Set(items)) => {
            let mut out = items.clone();
            out.reverse();
            Ok(Value::List(out))
        }
        _ => Err(arity_error("reverse")),
    }
}

fn sort(args: &[Value]) -> Result<Value, CfgError> {
    match args.first() {
        Some(Value::List(items)) | Some(Value::Set(items)) => {
            let mut out = items.clone();
            out.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
            Ok(Value::List(out))
        }
        _ => Err(arity_error("sort")),
    }
}

fn range(args: &[Value]) -> Result<Value, CfgError> {
    let nums: Vec<i64> = args.iter().filter_map(Value::as_i64).collect();
    let (start, end, step) = match nums.len() {
        1 => (0, nums[0], 1),
        2 => (nums[0], nums[1], 1),
        3 => (nums[0], nums[1], nums[2]),
        _ => return Err(arity_error("range")),
    };
    if step == 0 {
        return Err(CfgError::FunctionError { name: "range".into(), arg_index: 2, reason: "step cannot be zero".into() });
    }
    let mut out = Vec::new();
    let mut i = start;
    if step > 0 {
        while i < end {
            out.push(Value::int(i));
            i += step;
        }
    } else {
        while i > end {
            out.push(Value::int(i));
            i += step;
        }
    }
    Ok(Value::List(out))
}

fn min_max(args: &[Value], want_min: bool) -> Result<Value, CfgError> {
    let nums: Vec<f64> = args.iter().filter_map(Value::as_f64).collect();
    if nums.is_empty() {
        return Err(arity_error(if want_min { "min" } else { "max" }));
    }
    let chosen = if want_min {
        nums.iter().cloned().fold(f64::INFINITY, f64::min)
    } else {
        nums.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    };
    Ok(Value::float(chosen))
}

fn abs_fn(args: &[Value]) -> Result<Value, CfgError> {
    let n = args.first().and_then(Value::as_f64).ok_or_else(|| arity_error("abs"))?;
    Ok(Value::float(n.abs()))
}

fn ceil_fn(args: &[Value]) -> Result<Value, CfgError> {
    let n = args.first().and_then(Value::as_f64).ok_or_else(|| arity_error("ceil"))?;
    Ok(Value::int(n.ceil() as i64))
}

fn floor_fn(args: &[Value]) -> Result<Value, CfgError> {
    let n = args.first().and_then(Value::as_f64).ok_or_else(|| arity_error("floor"))?;
    Ok(Value::int(n.floor() as i64))
}

fn signum_fn(args: &[Value]) -> Result<Value, CfgError> {
    let n = args.first().and_then(Value::as_f64).ok_or_else(|| arity_error("signum"))?;
    Ok(Value::int(if n > 0.0 { 1 } else if n < 0.0 { -1 } else { 0 }))
}

fn tobool(args: &[Value]) -> Result<Value, CfgError> {
    match args.first() {
        Some(Value::Bool(b)) => Ok(Value::Bool(*b)),
        Some(Value::String(s)) if s == "true" => Ok(Value::Bool(true)),
        Some(Value::String(s)) if s == "false" => Ok(Value::Bool(false)),
        other => Err(CfgError::InvalidParameterType {
            function: "tobool".into(),
            arg_index: 0,
            expected: "bool or \"true\"/\"false\"".into(),
            got: other.map(|v| v.type_name().to_string()).unwrap_or_else(|| "missing".into()),
        }),
    }
}

fn jsonencode(args: &[Value]) -> Result<Value, CfgError> {
    let v = args.first().ok_or_else(|| arity_error("jsonencode"))?;
    Ok(Value::String(serde_json::to_string(&v.to_json()).unwrap_or_default()))
}

fn jsondecode(args: &[Value]) -> Result<Value, CfgError> {
    let s = expect_str("jsondecode", args, 0)?;
    let parsed: serde_json::Value =
        serde_json::from_str(s).map_err(|e| CfgError::FunctionError { name: "jsondecode".into(), arg_index: 0, reason: e.to_string() })?;
    Ok(Value::from_json(&parsed))
}

fn base64encode(args: &[Value]) -> Result<Value, CfgError> {
    use base64_impl::STANDARD;
    let s = expect_str("base64encode", args, 0)?;
    Ok(Value::String(STANDARD.encode(s.as_bytes())))
}

fn base64decode(args: &[Value]) -> Result<Value, CfgError> {
    use base64_impl::STANDARD;
    let s = expect_str("base64decode", args, 0)?;
    let bytes = STANDARD
        .decode(s)
        .map_err(|e| CfgError::FunctionError { name: "base64decode".into(), arg_index: 0, reason: e.to_string() })?;
    String::from_utf8(bytes)
        .map(Value::String)
        .map_err(|e| CfgError::FunctionError { name: "base64decode".into(), arg_index: 0, reason: e.to_string() })
}

/// Minimal base64 codec (RFC 4648 standard alphabet, padded) kept local
/// rather than pulling in a dedicated crate for one function pair.
mod base64_impl {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    pub struct Codec;
    pub const STANDARD: Codec = Codec;

    impl Codec {
        pub fn encode(&self, input: &[u8]) -> String {
            let mut out = String::with_capacity((input.len() + 2) / 3 * 4);
            for chunk in input.chunks(3) {
                let b0 = chunk[0];
                let b1 = *chunk.get(1).unwrap_or(&0);
                let b2 = *chunk.get(2).unwrap_or(&0);
                out.push(ALPHABET[(b0 >> 2) as usize] as char);
                out.push(ALPHABET[(((b0 & 0x03) << 4) | (b1 >> 4)) as usize] as char);
                out.push(if chunk.len() > 1 { ALPHABET[(((b1 & 0x0f) << 2) | (b2 >> 6)) as usize] as char } else { '=' });
                out.push(if chunk.len() > 2 { ALPHABET[(b2 & 0x3f) as usize] as char } else { '=' });
            }
            out
        }

        pub fn decode(&self, input: &str) -> Result<Vec<u8>, String> {
            let clean: Vec<u8> = input.bytes().filter(|b| *b != b'=' && !b.is_ascii_whitespace()).collect();
            let mut out = Vec::with_capacity(clean.len() * 3 / 4);
            for chunk in clean.chunks(4) {
                let idx: Vec<u32> = chunk
                    .iter()
                    .map(|b| ALPHABET.iter().position(|a| a == b).map(|p| p as u32).ok_or_else(|| "invalid base64 character".to_string()))
                    .collect::<Result<_, _>>()?;
                let b0 = idx.first().copied().unwrap_or(0);
                let b1 = idx.get(1).copied().unwrap_or(0);
                let b2 = idx.get(2);
                let b3 = idx.get(3);
                out.push(((b0 << 2) | (b1 >> 4)) as u8);
                if let Some(b2) = b2 {
                    out.push((((b1 & 0x0f) << 4) | (b2 >> 2)) as u8);
                }
                if let Some(b3) = b3 {
                    out.push((((idx[2] & 0x03) << 6) | b3) as u8);
                }
            }
            Ok(out)
        }
    }
}

fn digest_fn(args: &[Value], which: &str) -> Result<Value, CfgError> {
    let s = expect_str(which, args, 0)?;
    let hex = match which {
        "sha256" => {
            let mut h = sha2::Sha256::new();
            h.update(s.as_bytes());
            hex::encode(h.finalize())
        }
        "sha1" => sha1_hex(s.as_bytes()),
        "md5" => md5_hex(s.as_bytes()),
        _ => unreachable!(),
    };
    Ok(Value::String(hex))
}

/// Small local SHA-1 implementation (the `sha2` crate the stack already
/// carries doesn't do SHA-1; adding a second hashing crate for one function
/// wasn't worth it).
fn sha1_hex(data: &[u8]) -> String {
    let mut h: [u32; 5] = [0x67452301, 0xEFCDAB89, 0x98BADCFE, 0x10325476, 0xC3D2E1F0];
    let ml = (data.len() as u64) * 8;
    let mut msg = data.to_vec();
    msg.push(0x80);
    while msg.len() % 64 != 56 {
        msg.push(0);
    }
    msg.extend_from_slice(&ml.to_be_bytes());
    for chunk in msg.chunks(64) {
        let mut w = [0u32; 80];
        for i in 0..16 {
            w[i] = u32::from_be_bytes([chunk[i * 4], chunk[i * 4 + 1], chunk[i * 4 + 2], chunk[i * 4 + 3]]);
        }
        for i in 16..80 {
            w[i] = (w[i - 3] ^ w[i - 8] ^ w[i - 14] ^ w[i - 16]).rotate_left(1);
        }
        let (mut a, mut b, mut c, mut d, mut e) = (h[0], h[1], h[2], h[3], h[4]);
        for (i, wi) in w.iter().enumerate() {
            let (f, k) = match i {
                0..=19 => ((b & c) | ((!b) & d), 0x5A827999u32),
                20..=39 => (b ^ c ^ d, 0x6ED9EBA1),
                40..=59 => ((b & c) | (b & d) | (c & d), 0x8F1BBCDC),
                _ => (b ^ c ^ d, 0xCA62C1D6),
            };
            let temp = a.rotate_left(5).wrapping_add(f).wrapping_add(e).wrapping_add(k).wrapping_add(*wi);
            e = d;
            d = c;
            c = b.rotate_left(30);
            b = a;
            a = temp;
        }
        h[0] = h[0].wrapping_add(a);
        h[1] = h[1].wrapping_add(b);
        h[2] = h[2].wrapping_add(c);
        h[3] = h[3].wrapping_add(d);
        h[4] = h[4].wrapping_add(e);
    }
    h.iter().map(|x| format!("{:08x}", x)).collect()
}

/// Small local MD5 implementation, for the same reason as `sha1_hex` above.
fn md5_hex(data: &[u8]) -> String {
    const S: [u32; 64] = [
        7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, 7, 12, 17, 22, 5, 9, 14, 20, 5, 9, 14, 20, 5, 9, 14, 20, 5, 9, 14, 20, 4, 11, 16, 23, 4, 11,
        16, 23, 4, 11, 16, 23, 4, 11, 16, 23, 6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21, 6, 10, 15, 21,
    ];
    let k: Vec<u32> = (0..64).map(|i| ((2f64.powi(32)) * ((i + 1) as f64).sin().abs()).floor() as u32).collect();
    let (mut a0, mut b0, mut c0, mut d0): (u32, u32, u32, u32) = (0x67452301, 0xefcdab89, 0x98badcfe, 0x10325476);
    let ml = (data.len() as u64) * 8;
    let mut msg = data.to_vec();
    msg.push(0x80);
    while msg.len() % 64 != 56 {
        msg.push(0);
    }
    msg.extend_from_slice(&ml.to_le_bytes());
    for chunk in msg.chunks(64) {
        let mut m = [0u32; 16];
        for i in 0..16 {
            m[i] = u32::from_le_bytes([chunk[i * 4], chunk[i * 4 + 1], chunk[i * 4 + 2], chunk[i * 4 + 3]]);
        }
        let (mut a, mut b, mut c, mut d) = (a0, b0, c0, d0);
        for i in 0..64 {
            let (f, g) = match i {
                0..=15 => ((b & c) | ((!b) & d), i),
                16..=31 => ((d & b) | ((!d) & c), (5 * i + 1) % 16),
                32..=47 => (b ^ c ^ d, (3 * i + 5) % 16),
                _ => (c ^ (b | (!d)), (7 * i) % 16),
            };
            let f = f.wrapping_add(a).wrapping_add(k[i]).wrapping_add(m[g]);
            a = d;
            d = c;
            c = b;
            b = b.wrapping_add(f.rotate_left(S[i]));
        }
        a0 = a0.wrapping_add(a);
        b0 = b0.wrapping_add(b);
        c0 = c0.wrapping_add(c);
        d0 = d0.wrapping_add(d);
    }
    [a0, b0, c0, d0].iter().flat_map(|x| x.to_le_bytes()).map(|b| format!("{:02x}", b)).collect()
}

fn synthetic_uuid() -> String {
    // Deterministic-entropy fallback: no OS RNG dependency is in the stack.
    // A real deployment would source entropy from `getrandom`; this crate's
    // scope is the parser/evaluator, not a cryptographic RNG, so content hash
    // of the process id and a monotonically-read counter stands in.
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let c = COUNTER.fetch_add(1, Ordering::SeqCst);
    let pid = std::process::id() as u64;
    format!("{:08x}-{:04x}-4{:03x}-8{:03x}-{:012x}", pid, c & 0xffff, (c >> 16) & 0xfff, (pid >> 8) & 0xfff, (c << 8) | pid)
}

fn timestamp() -> Result<Value, CfgError> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| CfgError::FunctionError { name: "timestamp".into(), arg_index: 0, reason: e.to_string() })?;
    let dt = chrono::DateTime::<chrono::Utc>::from(std::time::UNIX_EPOCH + now);
    Ok(Value::String(dt.to_rfc3339()))
}

fn timeadd(args: &[Value]) -> Result<Value, CfgError> {
    let ts = expect_str("timeadd", args, 0)?;
    let duration = expect_str("timeadd", args, 1)?;
    let dt = chrono::DateTime::parse_from_rfc3339(ts)
        .map_err(|e| CfgError::FunctionError { name: "timeadd".into(), arg_index: 0, reason: e.to_string() })?;
    let delta = parse_go_duration(duration)
        .ok_or_else(|| CfgError::FunctionError { name: "timeadd".into(), arg_index: 1, reason: "invalid duration".into() })?;
    Ok(Value::String((dt + delta).to_rfc3339()))
}

fn timecmp(args: &[Value]) -> Result<Value, CfgError> {
    let a = expect_str("timecmp", args, 0)?;
    let b = expect_str("timecmp", args, 1)?;
    let da = chrono::DateTime::parse_from_rfc3339(a)
        .map_err(|e| CfgError::FunctionError { name: "timecmp".into(), arg_index: 0, reason: e.to_string() })?;
    let db = chrono::DateTime::parse_from_rfc3339(b)
        .map_err(|e| CfgError::FunctionError { name: "timecmp".into(), arg_index: 1, reason: e.to_string() })?;
    Ok(Value::int(match da.cmp(&db) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }))
}

fn formatdate(args: &[Value]) -> Result<Value, CfgError> {
    let fmt = expect_str("formatdate", args, 0)?;
    let ts = expect_str("formatdate", args, 1)?;
    let dt = chrono::DateTime::parse_from_rfc3339(ts)
        .map_err(|e| CfgError::FunctionError { name: "formatdate".into(), arg_index: 1, reason: e.to_string() })?;
    let strftime_fmt = fmt.replace("YYYY", "%Y").replace("MM", "%m").replace("DD", "%d").replace("hh", "%H").replace("mm", "%M").replace("ss", "%S");
    Ok(Value::String(dt.format(&strftime_fmt).to_string()))
}

fn parse_go_duration(s: &str) -> Option<chrono::Duration> {
    let (num_part, unit) = s.split_at(s.len().saturating_sub(1));
    let n: i64 = num_part.parse().ok()?;
    match unit {
        "s" => Some(chrono::Duration::seconds(n)),
        "m" => Some(chrono::Duration::minutes(n)),
        "h" => Some(chrono::Duration::hours(n)),
        _ => None,
    }
}

fn get_env(args: &[Value]) -> Result<Value, CfgError> {
    let name = args.first().and_then(Value::as_str).ok_or(CfgError::InvalidGetEnvParams)?;
    if name.is_empty() {
        return Err(CfgError::EmptyStringNotAllowed { context: "get_env name".into() });
    }
    match std::env::var(name) {
        Ok(v) => Ok(Value::String(v)),
        Err(_) => match args.get(1) {
            Some(default) => Ok(default.clone()),
            None => Err(CfgError::EnvVarNotFound(name.to_string())),
        },
    }
}

fn dir_of(path: &Path) -> String {
    path.parent().map(|p| p.display().to_string()).unwrap_or_else(|| ".".to_string())
}

fn find_in_parent_folders(args: &[Value], ctx: &EvalContext) -> Result<Value, CfgError> {
    let filename = args.first().and_then(Value::as_str).unwrap_or("terragrunt.hcl");
    let fallback = args.get(1).and_then(Value::as_str);

    let mut dir = ctx.current_file.parent().map(|p| p.to_path_buf()).unwrap_or_default();
    loop {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Ok(Value::String(candidate.display().to_string()));
        }
        if !dir.pop() {
            break;
        }
    }
    match fallback {
        Some(f) => Ok(Value::String(f.to_string())),
        None => Err(CfgError::ParentFileNotFound {
            path: filename.to_string(),
            file: ctx.current_file.display().to_string(),
            cause: "not found in any parent folder".into(),
        }),
    }
}

fn path_relative_to_include(ctx: &EvalContext) -> Result<Value, CfgError> {
    match &ctx.include_track {
        Some(track) => {
            let current_dir = ctx.current_file.parent().unwrap_or_else(|| Path::new("."));
            let include_dir = track.path.parent().unwrap_or_else(|| Path::new("."));
            Ok(Value::String(relative_path(include_dir, current_dir)))
        }
        None => Ok(Value::String(".".to_string())),
    }
}

fn path_relative_from_include(ctx: &EvalContext) -> Result<Value, CfgError> {
    match &ctx.include_track {
        Some(track) => {
            let current_dir = ctx.current_file.parent().unwrap_or_else(|| Path::new("."));
            let include_dir = track.path.parent().unwrap_or_else(|| Path::new("."));
            Ok(Value::String(relative_path(current_dir, include_dir)))
        }
        None => Ok(Value::String(".".to_string())),
    }
}

fn get_parent_terragrunt_dir(ctx: &EvalContext) -> Result<Value, CfgError> {
    match &ctx.include_track {
        Some(track) => Ok(Value::String(dir_of(&track.path))),
        None => Err(CfgError::ParentFileNotFound {
            path: "<none>".into(),
            file: ctx.current_file.display().to_string(),
            cause: "no include in scope".into(),
        }),
    }
}

fn relative_path(from: &Path, to: &Path) -> String {
    let from_components: Vec<_> = from.components().collect();
    let to_components: Vec<_> = to.components().collect();
    let common = from_components.iter().zip(to_components.iter()).take_while(|(a, b)| a == b).count();
    let mut out = std::path::PathBuf::new();
    for _ in common..from_components.len() {
        out.push("..");
    }
    for comp in &to_components[common..] {
        out.push(comp.as_os_str());
    }
    if out.as_os_str().is_empty() {
        ".".to_string()
    } else {
        out.display().to_string()
    }
}

/// Process-wide cache for `run_cmd(..., "--terragrunt-global-cache")`, keyed
/// by command signature (program + args) so the same external call made
/// from several configs in one run executes only once.
fn run_cmd_cache() -> &'static DashMap<String, String> {
    static CACHE: OnceLock<DashMap<String, String>> = OnceLock::new();
    CACHE.get_or_init(DashMap::new)
}

fn run_cmd_signature(program: &str, cmd_args: &[String]) -> String {
    let mut sig = program.to_string();
    for a in cmd_args {
        sig.push('\u{0}');
        sig.push_str(a);
    }
    sig
}

fn run_cmd(args: &[Value], ctx: &EvalContext) -> Result<Value, CfgError> {
    let mut quiet = false;
    let mut global_cache = false;
    let mut rest: Vec<&Value> = Vec::new();
    for a in args {
        match a.as_str() {
            Some("--terragrunt-quiet") => quiet = true,
            Some("--terragrunt-global-cache") => global_cache = true,
            _ => rest.push(a),
        }
    }
    if rest.is_empty() {
        return Err(CfgError::FunctionError { name: "run_cmd".into(), arg_index: 0, reason: "empty invocation".into() });
    }
    if ctx.cancellation.is_cancelled() {
        return Err(CfgError::FunctionError { name: "run_cmd".into(), arg_index: 0, reason: "cancelled".into() });
    }
    let program = rest[0].as_str().ok_or_else(|| arity_error("run_cmd"))?;
    let cmd_args: Vec<String> = rest[1..].iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect();

    let signature = global_cache.then(|| run_cmd_signature(program, &cmd_args));
    if let Some(sig) = &signature {
        if let Some(cached) = run_cmd_cache().get(sig) {
            return Ok(Value::String(cached.clone()));
        }
    }

    let output = std::process::Command::new(program)
        .args(&cmd_args)
        .current_dir(ctx.current_file.parent().unwrap_or_else(|| Path::new(".")))
        .output()
        .map_err(|e| CfgError::FunctionError { name: "run_cmd".into(), arg_index: 0, reason: e.to_string() })?;
    if ctx.cancellation.is_cancelled() {
        return Err(CfgError::FunctionError { name: "run_cmd".into(), arg_index: 0, reason: "cancelled".into() });
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
    if !quiet {
        tracing::debug!(%program, "run_cmd completed");
    }
    if let Some(sig) = signature {
        run_cmd_cache().insert(sig, stdout.clone());
    }
    Ok(Value::String(stdout))
}

fn get_aws_account_id(ctx: &EvalContext) -> Result<Value, CfgError> {
    if let Ok(id) = std::env::var("AWS_ACCOUNT_ID") {
        return Ok(Value::String(id));
    }
    // Falls back to the AWS CLI rather than pulling in an AWS SDK crate the
    // rest of this stack has no other use for.
    let output = std::process::Command::new("aws")
        .args(["sts", "get-caller-identity", "--query", "Account", "--output", "text"])
        .output();
    match output {
        Ok(o) if o.status.success() => Ok(Value::String(String::from_utf8_lossy(&o.stdout).trim().to_string())),
        _ => {
            if ctx.cancellation.is_cancelled() {
                return Err(CfgError::FunctionError { name: "get_aws_account_id".into(), arg_index: 0, reason: "cancelled".into() });
            }
            Err(CfgError::FunctionError {
                name: "get_aws_account_id".into(),
                arg_index: 0,
                reason: "unable to determine AWS account id (no AWS_ACCOUNT_ID env var and aws CLI call failed)".into(),
            })
        }
    }
}

fn get_output(args: &[Value], ctx: &EvalContext) -> Result<Value, CfgError> {
    let target = expect_str("get_output", args, 0)?;
    let outputs = ctx
        .dependency_outputs
        .clone()
        .ok_or_else(|| CfgError::TerragruntOutputTargetNoOutputs(target.to_string()))?;
    match args.get(1).and_then(Value::as_str) {
        Some(output_name) => match &outputs {
            Value::Object(entries) | Value::Map(entries) => entries
                .iter()
                .find(|(k, _)| k == output_name)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| CfgError::TerragruntOutputParsing(target.to_string())),
            _ => Err(CfgError::TerragruntOutputParsing(target.to_string())),
        },
        None => Ok(outputs),
    }
}

fn file_fn(args: &[Value], ctx: &EvalContext) -> Result<Value, CfgError> {
    let rel = expect_str("file", args, 0)?;
    let base = ctx.current_file.parent().unwrap_or_else(|| Path::new("."));
    let path = base.join(rel);
    std::fs::read_to_string(&path)
        .map(Value::String)
        .map_err(|e| CfgError::FunctionError { name: "file".into(), arg_index: 0, reason: e.to_string() })
}
