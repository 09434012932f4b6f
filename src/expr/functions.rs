//! Custom and standard-library functions (spec.md §4.1). Modeled directly
//! on the teacher's `executor::engine::eval_expression` function-dispatch
//! `match name.as_str()`, generalized to operate on [`Value`] instead of
//! `serde_json::Value` and extended with the spec's mandatory `omit`,
//! `merge`, `generateName`, and `hash`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use regex::Regex;
use std::sync::OnceLock;

use crate::error::RenderError;
use crate::value::Value;

const DEFAULT_NAME_LIMIT: usize = 253;

/// 8-character hex digest of a 32-bit FNV-1a hash. Deterministic: spec.md
/// §8's law `hash(s1) == hash(s1)` falls out of this being a pure function.
pub fn fnv1a32_hex(input: &str) -> String {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET_BASIS;
    for byte in input.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(PRIME);
    }
    format!("{hash:08x}")
}

fn sanitize_ident() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9.-]+").unwrap())
}

/// Sanitizes `raw` to DNS-subdomain form (lowercase alphanumerics, `-`, `.`),
/// then appends an 8-character deterministic hash of the *original*
/// (un-sanitized) input, truncating the sanitized prefix so the whole name
/// fits within `max_len`.
pub fn generate_name(parts: &[String], max_len: usize) -> String {
    let raw = parts.join("-");
    let hash = fnv1a32_hex(&raw);
    let lowered = raw.to_lowercase();
    let collapsed = sanitize_ident().replace_all(&lowered, "-").to_string();
    let trimmed = collapsed.trim_matches('-').trim_matches('.');
    let suffix = format!("-{hash}");
    let budget = max_len.saturating_sub(suffix.len());
    let base: String = trimmed.chars().take(budget).collect();
    let base = base.trim_end_matches('-').trim_end_matches('.');
    format!("{base}{suffix}")
}

/// Collects the arguments to `generateName(...)` into its parts and an
/// optional trailing max-length override (spec.md §4.1 names 253/63 as the
/// two limits in play; callers select 63 by passing it explicitly as the
/// final argument, e.g. for namespace-like outputs).
pub fn generate_name_args(args: &[Value]) -> Result<(Vec<String>, usize), RenderError> {
    let mut args = args.to_vec();
    let max_len = if let Some(Value::Int(n)) = args.last() {
        let n = *n as usize;
        args.pop();
        n
    } else {
        DEFAULT_NAME_LIMIT
    };

    let parts: Vec<String> = match args.as_slice() {
        [Value::List(items)] => items.iter().map(|v| v.coerce_to_text()).collect(),
        other => other.iter().map(|v| v.coerce_to_text()).collect(),
    };
    Ok((parts, max_len))
}

/// Shallow overlay, left to right: later maps' keys replace earlier ones.
/// Requires at least two map arguments (spec.md §4.1).
pub fn merge(args: &[Value]) -> Result<Value, RenderError> {
    if args.len() < 2 {
        return Err(RenderError::runtime("merge() requires at least two arguments"));
    }
    let mut result: Vec<(String, Value)> = Vec::new();
    for arg in args {
        let Value::Map(entries) = arg else {
            return Err(RenderError::runtime("merge() arguments must all be maps"));
        };
        for (k, v) in entries {
            if let Some(existing) = result.iter_mut().find(|(ek, _)| ek == k) {
                existing.1 = v.clone();
            } else {
                result.push((k.clone(), v.clone()));
            }
        }
    }
    Ok(Value::Map(result))
}

/// Dispatches a free function call or a method-call-as-function (`x.f(a)`
/// desugars to `f(x, a)` for every function below except the three
/// context-aware container-config overloads, which `eval.rs` handles
/// before falling through here).
pub fn call(name: &str, args: Vec<Value>) -> Result<Value, RenderError> {
    match name {
        "omit" => Ok(Value::Omit),
        "merge" => merge(&args),
        "hash" => {
            let s = expect_string(&args, 0, "hash")?;
            Ok(Value::String(fnv1a32_hex(&s)))
        }
        "generateName" => {
            let (parts, max_len) = generate_name_args(&args)?;
            Ok(Value::String(generate_name(&parts, max_len)))
        }
        "size" | "length" => Ok(Value::Int(size_of(&args, name)? as i64)),
        "lower" => Ok(Value::String(expect_string(&args, 0, name)?.to_lowercase())),
        "upper" => Ok(Value::String(expect_string(&args, 0, name)?.to_uppercase())),
        "trim" | "trimSpace" => Ok(Value::String(expect_string(&args, 0, name)?.trim().to_string())),
        "replace" => {
            let s = expect_string(&args, 0, name)?;
            let old = expect_string(&args, 1, name)?;
            let new = expect_string(&args, 2, name)?;
            Ok(Value::String(s.replace(&old, &new)))
        }
        "split" => {
            let s = expect_string(&args, 0, name)?;
            let sep = expect_string(&args, 1, name)?;
            Ok(Value::List(s.split(sep.as_str()).map(|p| Value::String(p.to_string())).collect()))
        }
        "join" => {
            let list = expect_list(&args, 0, name)?;
            let sep = expect_string(&args, 1, name)?;
            let parts: Vec<String> = list.iter().map(|v| v.coerce_to_text()).collect();
            Ok(Value::String(parts.join(&sep)))
        }
        "startsWith" => {
            let s = expect_string(&args, 0, name)?;
            let prefix = expect_string(&args, 1, name)?;
            Ok(Value::Bool(s.starts_with(prefix.as_str())))
        }
        "endsWith" => {
            let s = expect_string(&args, 0, name)?;
            let suffix = expect_string(&args, 1, name)?;
            Ok(Value::Bool(s.ends_with(suffix.as_str())))
        }
        "contains" => Ok(Value::Bool(contains(&args)?)),
        "concat" => {
            let mut out = Vec::new();
            for arg in &args {
                match arg {
                    Value::List(items) => out.extend(items.clone()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::List(out))
        }
        "distinct" => {
            let list = expect_list(&args, 0, name)?;
            let mut seen = Vec::new();
            let mut out = Vec::new();
            for item in list {
                let key = item.coerce_to_text();
                if !seen.contains(&key) {
                    seen.push(key);
                    out.push(item.clone());
                }
            }
            Ok(Value::List(out))
        }
        "flatten" => {
            let list = expect_list(&args, 0, name)?;
            let mut out = Vec::new();
            for item in list {
                match item {
                    Value::List(inner) => out.extend(inner.clone()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::List(out))
        }
        "keys" => {
            let map = expect_map(&args, 0, name)?;
            Ok(Value::List(map.iter().map(|(k, _)| Value::String(k.clone())).collect()))
        }
        "values" => {
            let map = expect_map(&args, 0, name)?;
            Ok(Value::List(map.iter().map(|(_, v)| v.clone()).collect()))
        }
        "string" => Ok(Value::String(args.first().map(|v| v.coerce_to_text()).unwrap_or_default())),
        "int" => match args.first() {
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| RenderError::runtime(format!("int(): cannot parse '{s}'"))),
            Some(v) => v
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| RenderError::runtime("int(): argument is not numeric")),
            None => Err(RenderError::runtime("int() requires one argument")),
        },
        "double" => match args.first() {
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| RenderError::runtime(format!("double(): cannot parse '{s}'"))),
            Some(v) => v
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| RenderError::runtime("double(): argument is not numeric")),
            None => Err(RenderError::runtime("double() requires one argument")),
        },
        "bool" => match args.first() {
            Some(Value::Bool(b)) => Ok(Value::Bool(*b)),
            Some(Value::String(s)) if s == "true" => Ok(Value::Bool(true)),
            Some(Value::String(s)) if s == "false" => Ok(Value::Bool(false)),
            _ => Err(RenderError::runtime("bool(): argument is not a recognizable boolean")),
        },
        "base64encode" => Ok(Value::String(BASE64.encode(expect_string(&args, 0, name)?.as_bytes()))),
        "base64decode" => {
            let s = expect_string(&args, 0, name)?;
            let bytes = BASE64
                .decode(s.as_bytes())
                .map_err(|e| RenderError::runtime(format!("base64decode(): {e}")))?;
            String::from_utf8(bytes)
                .map(Value::String)
                .map_err(|e| RenderError::runtime(format!("base64decode(): {e}")))
        }
        "jsonEncode" => {
            let json = args.first().map(Value::to_json_lossy).unwrap_or(serde_json::Value::Null);
            Ok(Value::String(serde_json::to_string(&json).unwrap_or_default()))
        }
        "jsonDecode" => {
            let s = expect_string(&args, 0, name)?;
            let json: serde_json::Value = serde_json::from_str(&s)
                .map_err(|e| RenderError::runtime(format!("jsonDecode(): {e}")))?;
            Ok(Value::from_json(&json))
        }
        other => Err(RenderError::runtime(format!("unknown function `{other}`"))),
    }
}

fn size_of(args: &[Value], name: &str) -> Result<usize, RenderError> {
    match args.first() {
        Some(Value::String(s)) => Ok(s.chars().count()),
        Some(Value::List(items)) => Ok(items.len()),
        Some(Value::Map(entries)) => Ok(entries.len()),
        _ => Err(RenderError::runtime(format!("{name}() requires a string, list, or map"))),
    }
}

fn contains(args: &[Value]) -> Result<bool, RenderError> {
    match (args.first(), args.get(1)) {
        (Some(Value::String(haystack)), Some(Value::String(needle))) => {
            Ok(haystack.contains(needle.as_str()))
        }
        (Some(Value::List(items)), Some(needle)) => Ok(items.contains(needle)),
        (Some(Value::Map(entries)), Some(Value::String(key))) => {
            Ok(entries.iter().any(|(k, _)| k == key))
        }
        _ => Err(RenderError::runtime("contains() requires a (string|list|map, item) pair")),
    }
}

fn expect_string(args: &[Value], idx: usize, name: &str) -> Result<String, RenderError> {
    match args.get(idx) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.coerce_to_text()),
        None => Err(RenderError::runtime(format!("{name}() missing argument {idx}"))),
    }
}

fn expect_list(args: &[Value], idx: usize, name: &str) -> Result<Vec<Value>, RenderError> {
    match args.get(idx) {
        Some(Value::List(items)) => Ok(items.clone()),
        _ => Err(RenderError::runtime(format!("{name}() requires a list at argument {idx}"))),
    }
}

fn expect_map(args: &[Value], idx: usize, name: &str) -> Result<Vec<(String, Value)>, RenderError> {
    match args.get(idx) {
        Some(Value::Map(entries)) => Ok(entries.clone()),
        _ => Err(RenderError::runtime(format!("{name}() requires a map at argument {idx}"))),
    }
}
