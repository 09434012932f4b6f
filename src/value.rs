//! The plain-tree value type that flows through the rendering core.
//!
//! Mirrors the shape of a JSON value, plus one extra variant: [`Value::Omit`],
//! the distinguished sentinel the template engine produces for `omit()`. The
//! sentinel only ever exists on a `Value` tree during template evaluation; it
//! is erased by [`crate::template::prune`] before a tree crosses into
//! `serde_json::Value` territory (rendered resources, patch targets).

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Number};

/// A plain tree: scalars, ordered sequences, string-keyed mappings, plus the
/// omit sentinel.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    /// Insertion-ordered mapping. A `Vec` of pairs rather than a `HashMap`
    /// because rendered output must be deterministic (spec I7) and mapping
    /// key order in the source template should survive interpolation.
    Map(Vec<(String, Value)>),
    /// `omit()`'s return value. Never appears in a fully pruned tree.
    Omit,
}

impl Value {
    pub fn map() -> Self {
        Value::Map(Vec::new())
    }

    pub fn is_omit(&self) -> bool {
        matches!(self, Value::Omit)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Looks up a key in a `Map` variant; `None` for non-maps or absent keys.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null | Value::Omit => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
        }
    }

    /// Renders a value to the text it contributes inside a partially
    /// interpolated string (spec.md §4.1: "`${…}` occurs inside a larger
    /// string, all occurrences are evaluated and coerced to textual form").
    pub fn coerce_to_text(&self) -> String {
        match self {
            Value::Null | Value::Omit => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::String(s) => s.clone(),
            Value::List(_) | Value::Map(_) => {
                serde_json::to_string(&Value::to_json_lossy(self)).unwrap_or_default()
            }
        }
    }

    /// Best-effort equality used by the patch filter language
    /// (`[?(@.field=='value')]`), which compares a stringified field value
    /// against a quoted literal.
    pub fn equals_str(&self, literal: &str) -> bool {
        match self {
            Value::String(s) => s == literal,
            Value::Bool(b) => b.to_string() == literal,
            Value::Int(i) => i.to_string() == literal,
            Value::Float(f) => format_float(*f) == literal,
            Value::Null => literal == "null",
            Value::Omit => false,
            Value::List(_) | Value::Map(_) => false,
        }
    }

    /// Converts to `serde_json::Value`, dropping any `Omit` sentinel as
    /// `null`. Callers that must observe the sentinel should prune first;
    /// this is a fallback for display/debugging contexts only.
    pub fn to_json_lossy(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Omit => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json_lossy).collect())
            }
            Value::Map(entries) => {
                let mut map = Map::new();
                for (k, v) in entries {
                    map.insert(k.clone(), v.to_json_lossy());
                }
                serde_json::Value::Object(map)
            }
        }
    }

    /// Converts a fully-pruned `Value` to `serde_json::Value`. Returns
    /// `None` if an `Omit` sentinel is still present anywhere in the tree
    /// (a bug: the caller forgot to prune).
    pub fn to_json(&self) -> Option<serde_json::Value> {
        Some(match self {
            Value::Omit => return None,
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.to_json()?);
                }
                serde_json::Value::Array(out)
            }
            Value::Map(entries) => {
                let mut map = Map::new();
                for (k, v) in entries {
                    map.insert(k.clone(), v.to_json()?);
                }
                serde_json::Value::Object(map)
            }
        })
    }

    /// Builds a `Value` tree from `serde_json::Value`. Never produces
    /// `Omit` — that variant only comes from evaluating `omit()`.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect())
            }
        }
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() {
        format!("{f:.0}")
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.coerce_to_text())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Ordering used only to keep `merge`/comparisons deterministic for
/// equality-ish operators (`<`, `<=`, `>`, `>=`) on like-typed scalars.
pub fn partial_compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => a.partial_cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.partial_cmp(b),
        _ => None,
    }
}

/// Deep-copies a value, ensuring no shared subtrees — used everywhere a
/// default or patch payload is spliced into an owned tree (spec I8: no
/// aliasing).
pub fn deep_clone(value: &Value) -> Value {
    value.clone()
}

/// A `BTreeMap` snapshot of a `Value::Map`, useful for internal dedup and
/// property-union logic that doesn't care about source order.
pub fn as_btree(entries: &[(String, Value)]) -> BTreeMap<&str, &Value> {
    entries.iter().map(|(k, v)| (k.as_str(), v)).collect()
}
