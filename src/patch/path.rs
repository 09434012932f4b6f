//! The patch path language: a superset of RFC 6901 JSON Pointer adding the
//! append marker (`-`), numeric array indices, and `[?(@.field.path=='value')]`
//! filter segments that fan a path out to every matching array element.
//!
//! Parsing (`parse`) never touches a document; resolution (`resolve`)
//! walks a concrete `serde_json::Value` tree and expands filters into one
//! RFC 6901 pointer per match. `ensure_path_for_add` is the auto-create
//! counterpart used by `add`-style operations: it creates missing
//! intermediate containers as it walks, inferring object-vs-array from the
//! next segment, and refuses to fabricate a specific numeric index (spec.md
//! §9's patch engine design note — there is no sane default for "create
//! element 4 of an array that has none").

use serde_json::Value as Json;

use crate::error::RenderError;

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Key(String),
    Index(i64),
    Append,
    Filter { field: Vec<String>, literal: String },
}

/// Parses a path like `/spec/containers[?(@.name=='app')]/image` or
/// `/spec/tags/-` into its segments. Does not require a leading `/`.
pub fn parse(path: &str) -> Result<Vec<Segment>, RenderError> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let mut segments = Vec::new();
    for raw in trimmed.split('/') {
        parse_raw_segment(raw, &mut segments)?;
    }
    Ok(segments)
}

fn parse_raw_segment(raw: &str, out: &mut Vec<Segment>) -> Result<(), RenderError> {
    let bracket_start = raw.find('[');
    let key_part = match bracket_start {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    if bracket_start.is_none() && key_part == "-" {
        out.push(Segment::Append);
        return Ok(());
    }
    if !key_part.is_empty() {
        out.push(Segment::Key(unescape(key_part)));
    }
    let Some(mut idx) = bracket_start else { return Ok(()) };
    while idx < raw.len() {
        if raw.as_bytes()[idx] != b'[' {
            return Err(RenderError::patch("", format!("malformed path segment `{raw}`")));
        }
        let close = raw[idx..]
            .find(']')
            .map(|offset| idx + offset)
            .ok_or_else(|| RenderError::patch("", format!("unterminated `[` in path `{raw}`")))?;
        let body = &raw[idx + 1..close];
        out.push(parse_bracket(body, raw)?);
        idx = close + 1;
    }
    Ok(())
}

fn parse_bracket(body: &str, raw: &str) -> Result<Segment, RenderError> {
    if body == "-" {
        return Ok(Segment::Append);
    }
    if let Ok(n) = body.parse::<i64>() {
        return Ok(Segment::Index(n));
    }
    if let Some(filter) = body.strip_prefix("?(").and_then(|s| s.strip_suffix(')')) {
        return parse_filter(filter, raw);
    }
    Err(RenderError::patch("", format!("unrecognized path bracket `[{body}]` in `{raw}`")))
}

fn parse_filter(filter: &str, raw: &str) -> Result<Segment, RenderError> {
    let filter = filter.trim();
    let eq_pos = filter
        .find("==")
        .ok_or_else(|| RenderError::patch("", format!("filter `[{filter}]` in `{raw}` must use `==`")))?;
    let lhs = filter[..eq_pos].trim();
    let rhs = filter[eq_pos + 2..].trim();
    let field_path = lhs
        .strip_prefix("@.")
        .ok_or_else(|| RenderError::patch("", format!("filter left side `{lhs}` must start with `@.`")))?;
    let field: Vec<String> = field_path.split('.').map(str::to_string).collect();
    let literal = strip_quotes(rhs)
        .ok_or_else(|| RenderError::patch("", format!("filter literal `{rhs}` must be quoted")))?;
    Ok(Segment::Filter { field, literal })
}

fn strip_quotes(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 && matches!(bytes[0], b'\'' | b'"') && bytes[bytes.len() - 1] == bytes[0] {
        Some(s[1..s.len() - 1].to_string())
    } else {
        None
    }
}

fn unescape(s: &str) -> String {
    s.replace("~1", "/").replace("~0", "~")
}

fn escape(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

/// Walks `segments` against `root`, expanding any `Filter` segment into one
/// branch per matching array element, and returns the concrete RFC 6901
/// pointer(s) reached. A missing key or out-of-range index is reported as
/// missing data (recoverable by callers that treat patch targets leniently);
/// a type mismatch (indexing a non-array, keying a non-object) is a runtime
/// error, since it indicates the path doesn't describe this document's
/// shape at all.
pub fn resolve(root: &Json, segments: &[Segment]) -> Result<Vec<String>, RenderError> {
    resolve_from(root, "", segments)
}

fn resolve_from(node: &Json, prefix: &str, segments: &[Segment]) -> Result<Vec<String>, RenderError> {
    let Some((seg, rest)) = segments.split_first() else {
        return Ok(vec![prefix.to_string()]);
    };
    match seg {
        Segment::Key(k) => {
            let obj = node
                .as_object()
                .ok_or_else(|| RenderError::runtime(format!("`{prefix}` is not an object")))?;
            let child = obj
                .get(k)
                .ok_or_else(|| RenderError::missing(format!("`{prefix}/{}` does not exist", escape(k))))?;
            resolve_from(child, &format!("{prefix}/{}", escape(k)), rest)
        }
        Segment::Index(i) => {
            let arr = node
                .as_array()
                .ok_or_else(|| RenderError::runtime(format!("`{prefix}` is not an array")))?;
            let idx = resolve_index(*i, arr.len())
                .map_err(|_| RenderError::missing(format!("`{prefix}` has no index {i}")))?;
            resolve_from(&arr[idx], &format!("{prefix}/{idx}"), rest)
        }
        Segment::Append => {
            if !rest.is_empty() {
                return Err(RenderError::patch("", "`-` append marker must be the last path segment"));
            }
            if !node.is_array() {
                return Err(RenderError::runtime(format!("`{prefix}` is not an array")));
            }
            Ok(vec![format!("{prefix}/-")])
        }
        Segment::Filter { field, literal } => {
            let arr = node
                .as_array()
                .ok_or_else(|| RenderError::runtime(format!("`{prefix}` is not an array")))?;
            let mut out = Vec::new();
            for (idx, item) in arr.iter().enumerate() {
                if filter_matches(item, field, literal) {
                    out.extend(resolve_from(item, &format!("{prefix}/{idx}"), rest)?);
                }
            }
            Ok(out)
        }
    }
}

fn resolve_index(i: i64, len: usize) -> Result<usize, ()> {
    let resolved = if i < 0 { len as i64 + i } else { i };
    if resolved < 0 || resolved as usize >= len {
        Err(())
    } else {
        Ok(resolved as usize)
    }
}

fn filter_matches(item: &Json, field: &[String], literal: &str) -> bool {
    let mut cur = item;
    for part in field {
        match cur.get(part) {
            Some(v) => cur = v,
            None => return false,
        }
    }
    json_equals_literal(cur, literal)
}

fn json_equals_literal(v: &Json, literal: &str) -> bool {
    match v {
        Json::String(s) => s == literal,
        Json::Bool(b) => b.to_string() == literal,
        Json::Number(n) => n.to_string() == literal,
        Json::Null => literal == "null",
        _ => false,
    }
}

/// Auto-create variant of resolution for `add`-style operations: creates
/// missing intermediate objects/arrays as it walks, inferring the
/// container type from the next segment. Filter segments cannot be
/// auto-created (there is no element to filter over yet), and a missing
/// specific numeric index is refused rather than guessed at.
pub fn ensure_path_for_add(root: &mut Json, segments: &[Segment]) -> Result<String, RenderError> {
    ensure_from(root, "", segments)
}

fn ensure_from(node: &mut Json, prefix: &str, segments: &[Segment]) -> Result<String, RenderError> {
    let Some((seg, rest)) = segments.split_first() else {
        return Ok(prefix.to_string());
    };
    match seg {
        Segment::Key(k) => {
            if node.is_null() {
                *node = Json::Object(serde_json::Map::new());
            }
            let obj = node
                .as_object_mut()
                .ok_or_else(|| RenderError::runtime(format!("`{prefix}` is not an object")))?;
            if !obj.contains_key(k) {
                obj.insert(k.clone(), placeholder_for(rest));
            }
            let child = obj.get_mut(k).unwrap();
            ensure_from(child, &format!("{prefix}/{}", escape(k)), rest)
        }
        Segment::Index(i) => {
            let arr = node
                .as_array()
                .ok_or_else(|| RenderError::runtime(format!("`{prefix}` is not an array")))?;
            let idx = resolve_index(*i, arr.len()).map_err(|_| {
                RenderError::patch("", format!("refusing to auto-create array index {i} at `{prefix}`"))
            })?;
            let child = node.as_array_mut().unwrap().get_mut(idx).unwrap();
            ensure_from(child, &format!("{prefix}/{idx}"), rest)
        }
        Segment::Append => {
            if !rest.is_empty() {
                return Err(RenderError::patch("", "`-` append marker must be the last path segment"));
            }
            if node.is_null() {
                *node = Json::Array(Vec::new());
            }
            if !node.is_array() {
                return Err(RenderError::runtime(format!("`{prefix}` is not an array")));
            }
            Ok(format!("{prefix}/-"))
        }
        Segment::Filter { .. } => {
            Err(RenderError::patch("", format!("cannot auto-create through a filter segment at `{prefix}`")))
        }
    }
}

fn placeholder_for(rest: &[Segment]) -> Json {
    match rest.first() {
        Some(Segment::Append) | Some(Segment::Index(_)) | Some(Segment::Filter { .. }) => {
            Json::Array(Vec::new())
        }
        Some(Segment::Key(_)) => Json::Object(serde_json::Map::new()),
        None => Json::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_filter_and_trailing_field() {
        let segments = parse("/spec/containers[?(@.name=='app')]/image").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Key("spec".into()),
                Segment::Key("containers".into()),
                Segment::Filter { field: vec!["name".into()], literal: "app".into() },
                Segment::Key("image".into()),
            ]
        );
    }

    #[test]
    fn bare_trailing_dash_parses_as_append_not_a_literal_key() {
        let segments = parse("/spec/tags/-").unwrap();
        assert_eq!(segments, vec![Segment::Key("spec".into()), Segment::Key("tags".into()), Segment::Append]);
    }

    #[test]
    fn resolve_fans_out_over_matching_elements() {
        let doc = json!({
            "spec": { "containers": [
                {"name": "app", "image": "old"},
                {"name": "sidecar", "image": "old"},
                {"name": "app", "image": "old"},
            ]}
        });
        let segments = parse("/spec/containers[?(@.name=='app')]/image").unwrap();
        let pointers = resolve(&doc, &segments).unwrap();
        assert_eq!(pointers, vec!["/spec/containers/0/image", "/spec/containers/2/image"]);
    }

    #[test]
    fn ensure_path_creates_missing_object_chain() {
        let mut doc = json!({});
        let segments = parse("/metadata/labels/tier").unwrap();
        let pointer = ensure_path_for_add(&mut doc, &segments).unwrap();
        assert_eq!(pointer, "/metadata/labels/tier");
        assert_eq!(doc, json!({"metadata": {"labels": {}}}));
    }

    #[test]
    fn ensure_path_refuses_specific_index_fabrication() {
        let mut doc = json!({"items": []});
        let segments = parse("/items/3").unwrap();
        assert!(ensure_path_for_add(&mut doc, &segments).is_err());
    }
}
