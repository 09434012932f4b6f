//! The Template Engine: structural `${…}` interpolation over a `Value`
//! tree, plus the dedicated prune pass that erases `omit()`'s sentinel.
//!
//! Two interpolation shapes (spec.md §4.1):
//!   - a string that is *exactly* one `${…}` body (ignoring surrounding
//!     whitespace) evaluates to the native `Value` the expression produces
//!     — a map stays a map, a bool stays a bool, `omit()` stays `Omit`;
//!   - a string with `${…}` embedded in a larger literal evaluates each
//!     occurrence, coerces it to text, and concatenates it back into the
//!     surrounding string.
//!
//! Interpolation never prunes as it goes: `Value::Omit` must be able to
//! flow upward through a partially-built map or list (e.g. returned from a
//! nested `${…}`) before the single whole-tree prune pass at the end
//! removes it. Pruning mid-walk would let an `Omit` that should have
//! deleted its parent key silently vanish into a `null` instead.

use crate::expr::{self, EvalContext, ExprCache};
use crate::error::RenderError;
use crate::value::Value;

/// Interpolates every `${…}` occurrence in `template`, walking maps and
/// lists structurally and leaving non-string scalars untouched.
pub fn interpolate(template: &Value, ctx: &EvalContext, cache: &ExprCache) -> Result<Value, RenderError> {
    match template {
        Value::String(s) => interpolate_string(s, ctx, cache),
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(interpolate(item, ctx, cache)?);
            }
            Ok(Value::List(out))
        }
        Value::Map(entries) => {
            let mut out = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                out.push((k.clone(), interpolate(v, ctx, cache)?));
            }
            Ok(Value::Map(out))
        }
        other => Ok(other.clone()),
    }
}

fn interpolate_string(s: &str, ctx: &EvalContext, cache: &ExprCache) -> Result<Value, RenderError> {
    let Some(whole) = as_whole_expression(s) else {
        return interpolate_partial(s, ctx, cache);
    };
    let compiled = cache.compile(whole)?;
    expr::eval(&compiled, ctx)
}

/// If `s`, trimmed, is exactly one `${…}` body, returns the inner source.
fn as_whole_expression(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    let inner = trimmed.strip_prefix("${")?.strip_suffix('}')?;
    if has_unmatched_interpolation(inner) {
        return None;
    }
    Some(inner)
}

/// `${…}` bodies can themselves contain `{`/`}` (map literals). A whole-
/// string match is only valid if the outer `${` / final `}` actually pair
/// up, i.e. brace depth never goes negative and ends at zero.
fn has_unmatched_interpolation(inner: &str) -> bool {
    let mut depth = 0i32;
    for c in inner.chars() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return true;
                }
            }
            _ => {}
        }
    }
    depth != 0
}

fn interpolate_partial(s: &str, ctx: &EvalContext, cache: &ExprCache) -> Result<Value, RenderError> {
    let mut out = String::new();
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            let Some(end) = find_matching_brace(s, i + 2) else {
                return Err(RenderError::compile(s, "unterminated `${` interpolation"));
            };
            let body = &s[i + 2..end];
            let compiled = cache.compile(body)?;
            let value = expr::eval(&compiled, ctx)?;
            out.push_str(&value.coerce_to_text());
            i = end + 1;
        } else {
            let ch = s[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
    }
    Ok(Value::String(out))
}

fn find_matching_brace(s: &str, start: usize) -> Option<usize> {
    let mut depth = 1i32;
    for (offset, c) in s[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Whether evaluating `template` would fail solely because of absent data
/// (`RenderError::is_missing_data`), without materializing the result.
/// Used by `includeWhen`/`forEach` to implement graceful-skip without
/// duplicating evaluation logic.
pub fn is_missing_data(template: &Value, ctx: &EvalContext, cache: &ExprCache) -> bool {
    matches!(interpolate(template, ctx, cache), Err(e) if e.is_missing_data())
}

/// Removes every `Value::Omit` from `tree`, recursively: an omitted map
/// entry disappears, an omitted list element disappears. A container left
/// empty by omission is kept as an empty map/list — pruning never deletes
/// a *container*, only the sentinel values within it.
pub fn prune(tree: Value) -> Value {
    match tree {
        Value::Map(entries) => Value::Map(
            entries
                .into_iter()
                .filter(|(_, v)| !v.is_omit())
                .map(|(k, v)| (k, prune(v)))
                .collect(),
        ),
        Value::List(items) => {
            Value::List(items.into_iter().filter(|v| !v.is_omit()).map(prune).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with(bindings: Vec<(&str, Value)>) -> EvalContext {
        EvalContext::new(bindings.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn whole_string_preserves_native_type() {
        let cache = ExprCache::new();
        let ctx = ctx_with(vec![("parameters", Value::Map(vec![("replicas".into(), Value::Int(3))]))]);
        let out = interpolate(&Value::String("${parameters.replicas}".into()), &ctx, &cache).unwrap();
        assert_eq!(out, Value::Int(3));
    }

    #[test]
    fn partial_string_coerces_to_text() {
        let cache = ExprCache::new();
        let ctx = ctx_with(vec![("parameters", Value::Map(vec![("name".into(), Value::String("web".into()))]))]);
        let out = interpolate(&Value::String("svc-${parameters.name}-0".into()), &ctx, &cache).unwrap();
        assert_eq!(out, Value::String("svc-web-0".into()));
    }

    #[test]
    fn prune_removes_omitted_entries_but_keeps_empty_container() {
        let tree = Value::Map(vec![
            ("keep".into(), Value::Int(1)),
            ("drop".into(), Value::Omit),
            ("nested".into(), Value::Map(vec![("also_drop".into(), Value::Omit)])),
        ]);
        let pruned = prune(tree);
        assert_eq!(
            pruned,
            Value::Map(vec![
                ("keep".into(), Value::Int(1)),
                ("nested".into(), Value::Map(vec![])),
            ])
        );
    }

    #[test]
    fn missing_field_is_reported_as_missing_data() {
        let cache = ExprCache::new();
        let ctx = ctx_with(vec![("parameters", Value::Map(vec![]))]);
        assert!(is_missing_data(&Value::String("${parameters.cpu}".into()), &ctx, &cache));
    }
}
