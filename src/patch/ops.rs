//! Operation execution. Standard RFC 6902 ops are delegated to the
//! `json-patch` crate — spec.md's own design note on the Patch Engine
//! recommends exactly this: serialize the target, apply a well-known
//! JSON-Patch library, rather than hand-rolling `add`/`replace`/`move`
//! semantics. `mergeShallow` and auto-create are non-standard extensions
//! the crate has no concept of, so those stay hand-written against
//! `serde_json::Value::pointer_mut`.

use serde_json::Value as Json;

use super::path;
use crate::error::RenderError;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Replace,
    Remove,
    Test,
    Move,
    Copy,
    MergeShallow,
}

impl Op {
    pub fn parse(name: &str) -> Result<Self, RenderError> {
        match name {
            "add" => Ok(Op::Add),
            "replace" => Ok(Op::Replace),
            "remove" => Ok(Op::Remove),
            "test" => Ok(Op::Test),
            "move" => Ok(Op::Move),
            "copy" => Ok(Op::Copy),
            "mergeShallow" => Ok(Op::MergeShallow),
            other => Err(RenderError::patch("", format!("unknown patch op `{other}`"))),
        }
    }

    fn rfc6902_name(self) -> &'static str {
        match self {
            Op::Add => "add",
            Op::Replace => "replace",
            Op::Remove => "remove",
            Op::Test => "test",
            Op::Move => "move",
            Op::Copy => "copy",
            Op::MergeShallow => unreachable!("mergeShallow has no RFC 6902 counterpart"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub op: Op,
    pub path: String,
    pub from: Option<String>,
    pub value: Option<Value>,
}

/// Applies one operation to `root`, resolving its path (with filter
/// fan-out) first. `add` and `mergeShallow` auto-create missing
/// intermediate containers when the plain resolution hits missing data;
/// every other op propagates a missing target as an error.
pub fn apply(root: &mut Json, operation: &Operation, addon: &str) -> Result<(), RenderError> {
    match operation.op {
        Op::MergeShallow => apply_merge_shallow(root, operation, addon),
        Op::Add => apply_add(root, operation, addon),
        _ => apply_standard(root, operation, addon),
    }
}

fn apply_standard(root: &mut Json, operation: &Operation, addon: &str) -> Result<(), RenderError> {
    let segments = path::parse(&operation.path).map_err(|e| wrap(e, addon))?;
    let pointers = path::resolve(root, &segments).map_err(|e| wrap(e, addon))?;

    let from_pointer = match (&operation.op, &operation.from) {
        (Op::Move | Op::Copy, Some(from)) => {
            let from_segments = path::parse(from).map_err(|e| wrap(e, addon))?;
            let mut matches = path::resolve(root, &from_segments).map_err(|e| wrap(e, addon))?;
            if matches.is_empty() {
                return Err(RenderError::patch(addon, format!("`from` path `{from}` matched nothing")));
            }
            Some(matches.remove(0))
        }
        (Op::Move | Op::Copy, None) => {
            return Err(RenderError::patch(addon, format!("{:?} requires `from`", operation.op)))
        }
        _ => None,
    };

    let value_json = match &operation.value {
        Some(v) => Some(
            v.to_json()
                .ok_or_else(|| RenderError::patch(addon, "operation value still contains an unpruned omit() sentinel"))?,
        ),
        None => None,
    };

    for pointer in pointers {
        apply_single(root, operation.op, &pointer, from_pointer.as_deref(), value_json.clone(), addon)?;
    }
    Ok(())
}

fn apply_add(root: &mut Json, operation: &Operation, addon: &str) -> Result<(), RenderError> {
    let segments = path::parse(&operation.path).map_err(|e| wrap(e, addon))?;
    let value = operation
        .value
        .clone()
        .ok_or_else(|| RenderError::patch(addon, "add requires a value"))?;
    let value_json = value
        .to_json()
        .ok_or_else(|| RenderError::patch(addon, "add value still contains an unpruned omit() sentinel"))?;

    match path::resolve(root, &segments) {
        Ok(pointers) => {
            for pointer in pointers {
                apply_single(root, Op::Add, &pointer, None, Some(value_json.clone()), addon)?;
            }
            Ok(())
        }
        Err(e) if e.is_missing_data() => {
            let pointer = path::ensure_path_for_add(root, &segments).map_err(|e| wrap(e, addon))?;
            apply_single(root, Op::Add, &pointer, None, Some(value_json), addon)
        }
        Err(e) => Err(wrap(e, addon)),
    }
}

fn apply_merge_shallow(root: &mut Json, operation: &Operation, addon: &str) -> Result<(), RenderError> {
    let segments = path::parse(&operation.path).map_err(|e| wrap(e, addon))?;
    let value = operation
        .value
        .clone()
        .ok_or_else(|| RenderError::patch(addon, "mergeShallow requires a value"))?;
    let incoming = value
        .to_json()
        .ok_or_else(|| RenderError::patch(addon, "mergeShallow value still contains an unpruned omit() sentinel"))?;

    let pointers = match path::resolve(root, &segments) {
        Ok(p) => p,
        Err(e) if e.is_missing_data() => vec![path::ensure_path_for_add(root, &segments).map_err(|e| wrap(e, addon))?],
        Err(e) => return Err(wrap(e, addon)),
    };

    for pointer in pointers {
        merge_shallow_at(root, &pointer, &incoming, addon)?;
    }
    Ok(())
}

fn merge_shallow_at(root: &mut Json, pointer: &str, incoming: &Json, addon: &str) -> Result<(), RenderError> {
    if let Some(parent_pointer) = pointer.strip_suffix("/-") {
        let parent = if parent_pointer.is_empty() {
            root
        } else {
            root.pointer_mut(parent_pointer)
                .ok_or_else(|| RenderError::patch(addon, "append target does not exist"))?
        };
        let arr = parent
            .as_array_mut()
            .ok_or_else(|| RenderError::patch(addon, "append target is not an array"))?;
        arr.push(incoming.clone());
        return Ok(());
    }

    match root.pointer_mut(pointer) {
        Some(existing) if existing.is_object() && incoming.is_object() => {
            let existing_obj = existing.as_object_mut().unwrap();
            for (k, v) in incoming.as_object().unwrap() {
                existing_obj.insert(k.clone(), v.clone());
            }
            Ok(())
        }
        Some(slot) => {
            *slot = incoming.clone();
            Ok(())
        }
        None => set_at_pointer(root, pointer, incoming.clone(), addon),
    }
}

fn apply_single(
    root: &mut Json,
    op: Op,
    pointer: &str,
    from: Option<&str>,
    value: Option<Json>,
    addon: &str,
) -> Result<(), RenderError> {
    let entry = match op {
        Op::Remove => serde_json::json!({"op": op.rfc6902_name(), "path": pointer}),
        Op::Move | Op::Copy => serde_json::json!({
            "op": op.rfc6902_name(),
            "from": from.ok_or_else(|| RenderError::patch(addon, "move/copy requires `from`"))?,
            "path": pointer,
        }),
        Op::Add | Op::Replace | Op::Test => serde_json::json!({
            "op": op.rfc6902_name(),
            "path": pointer,
            "value": value.ok_or_else(|| RenderError::patch(addon, format!("{:?} requires a value", op)))?,
        }),
        Op::MergeShallow => unreachable!("handled separately"),
    };
    set_patch(root, serde_json::Value::Array(vec![entry]), addon)
}

fn set_at_pointer(root: &mut Json, pointer: &str, value: Json, addon: &str) -> Result<(), RenderError> {
    let patch_json = serde_json::json!([{"op": "add", "path": pointer, "value": value}]);
    set_patch(root, patch_json, addon)
}

fn set_patch(root: &mut Json, patch_json: Json, addon: &str) -> Result<(), RenderError> {
    let patch: json_patch::Patch =
        serde_json::from_value(patch_json).map_err(|e| RenderError::patch(addon, e.to_string()))?;
    json_patch::patch(root, &patch).map_err(|e| RenderError::patch(addon, e.to_string()))
}

fn wrap(e: RenderError, addon: &str) -> RenderError {
    match e {
        RenderError::MissingData(m) => RenderError::MissingData(m),
        RenderError::TemplateRuntime(m) => RenderError::Patch { addon: addon.to_string(), message: m },
        RenderError::Patch { message, .. } => RenderError::Patch { addon: addon.to_string(), message },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn replace_applies_to_existing_target() {
        let mut doc = json!({"spec": {"replicas": 1}});
        let op = Operation {
            op: Op::Replace,
            path: "/spec/replicas".into(),
            from: None,
            value: Some(Value::Int(3)),
        };
        apply(&mut doc, &op, "scale").unwrap();
        assert_eq!(doc, json!({"spec": {"replicas": 3}}));
    }

    #[test]
    fn add_auto_creates_missing_intermediates() {
        let mut doc = json!({});
        let op = Operation {
            op: Op::Add,
            path: "/metadata/labels/tier".into(),
            from: None,
            value: Some(Value::String("web".into())),
        };
        apply(&mut doc, &op, "labeler").unwrap();
        assert_eq!(doc, json!({"metadata": {"labels": {"tier": "web"}}}));
    }

    #[test]
    fn merge_shallow_overlays_existing_map_without_clobbering_siblings() {
        let mut doc = json!({"metadata": {"labels": {"tier": "web", "team": "core"}}});
        let op = Operation {
            op: Op::MergeShallow,
            path: "/metadata/labels".into(),
            from: None,
            value: Some(Value::Map(vec![("env".into(), Value::String("prod".into()))])),
        };
        apply(&mut doc, &op, "labeler").unwrap();
        assert_eq!(
            doc,
            json!({"metadata": {"labels": {"tier": "web", "team": "core", "env": "prod"}}})
        );
    }

    #[test]
    fn add_appends_to_end_of_array_via_trailing_dash() {
        let mut doc = json!({"spec": {"tags": ["a", "b"]}});
        let op = Operation {
            op: Op::Add,
            path: "/spec/tags/-".into(),
            from: None,
            value: Some(Value::String("c".into())),
        };
        apply(&mut doc, &op, "tagger").unwrap();
        assert_eq!(doc, json!({"spec": {"tags": ["a", "b", "c"]}}));
    }

    #[test]
    fn filter_path_fans_out_replace_to_every_match() {
        let mut doc = json!({
            "spec": {"containers": [
                {"name": "app", "image": "old"},
                {"name": "sidecar", "image": "old"},
            ]}
        });
        let op = Operation {
            op: Op::Replace,
            path: "/spec/containers[?(@.name=='app')]/image".into(),
            from: None,
            value: Some(Value::String("new".into())),
        };
        apply(&mut doc, &op, "image-bump").unwrap();
        assert_eq!(doc["spec"]["containers"][0]["image"], json!("new"));
        assert_eq!(doc["spec"]["containers"][1]["image"], json!("old"));
    }
}
