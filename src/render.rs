//! The Resource Renderer (spec.md §3): turns one resource template into
//! zero or more materialized resources, honoring `includeWhen` (a boolean
//! gate, skipped — not failed — when its expression hits missing data) and
//! `forEach` (list iteration with a cloned, scoped context per iteration;
//! the outer context is never mutated, mirroring `ComponentContext`'s own
//! immutable merge semantics).

use crate::context::ComponentContext;
use crate::error::RenderError;
use crate::expr::{EvalContext, ExprCache};
use crate::template;
use crate::value::Value;

const INCLUDE_WHEN_KEY: &str = "includeWhen";
const FOR_EACH_KEY: &str = "forEach";

/// One fully rendered resource, carrying the identity fields the final
/// pipeline sort and duplicate-name check need without re-parsing the
/// rendered JSON.
#[derive(Debug, Clone)]
pub struct RenderedResource {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
    pub value: serde_json::Value,
}

/// Renders `template` against `ctx`, producing zero resources (gated out
/// by `includeWhen`/`forEach` evaluating to nothing), one resource, or one
/// per `forEach` iteration.
pub fn render_template(
    template: &Value,
    ctx: &ComponentContext,
    cache: &ExprCache,
    enable_validation: bool,
) -> Result<Vec<RenderedResource>, RenderError> {
    render_template_ctx(template, ctx.to_eval_context(), cache, enable_validation)
}

/// Same as [`render_template`], but against an already-assembled
/// [`EvalContext`] rather than a [`ComponentContext`]. Used directly by the
/// Patch Engine to materialize an addon's *create* templates, which need
/// the `addon` binding a bare `ComponentContext` doesn't carry.
pub fn render_template_ctx(
    template: &Value,
    base_ctx: EvalContext,
    cache: &ExprCache,
    enable_validation: bool,
) -> Result<Vec<RenderedResource>, RenderError> {
    let body = strip_control_keys(template);

    let Some(for_each) = template.get(FOR_EACH_KEY) else {
        return render_single(template, &body, &base_ctx, cache, enable_validation);
    };

    let (iterable_expr, loop_var) = parse_for_each(for_each)?;
    let list = match template::interpolate(&iterable_expr, &base_ctx, cache) {
        Ok(v) => v,
        Err(e) if e.is_missing_data() => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let Value::List(items) = list else {
        return Err(RenderError::runtime("forEach.in must evaluate to a list"));
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let scoped_eval = base_ctx.with_binding(loop_var.clone(), item);
        if !include_when_passes(template, &scoped_eval, cache)? {
            continue;
        }
        if let Some(resource) = render_body(&body, &scoped_eval, cache, enable_validation)? {
            out.push(resource);
        }
    }
    Ok(out)
}

fn render_single(
    template: &Value,
    body: &Value,
    ctx: &EvalContext,
    cache: &ExprCache,
    enable_validation: bool,
) -> Result<Vec<RenderedResource>, RenderError> {
    if !include_when_passes(template, ctx, cache)? {
        return Ok(Vec::new());
    }
    Ok(render_body(body, ctx, cache, enable_validation)?.into_iter().collect())
}

fn include_when_passes(template: &Value, ctx: &EvalContext, cache: &ExprCache) -> Result<bool, RenderError> {
    let Some(gate) = template.get(INCLUDE_WHEN_KEY) else {
        return Ok(true);
    };
    match template::interpolate(gate, ctx, cache) {
        Ok(v) => Ok(v.is_truthy()),
        Err(e) if e.is_missing_data() => Ok(false),
        Err(e) => Err(e),
    }
}

fn render_body(
    body: &Value,
    ctx: &EvalContext,
    cache: &ExprCache,
    enable_validation: bool,
) -> Result<Option<RenderedResource>, RenderError> {
    let interpolated = template::interpolate(body, ctx, cache)?;
    let pruned = template::prune(interpolated);

    if enable_validation {
        validate_floor(&pruned)?;
    }

    let api_version = pruned.get("apiVersion").and_then(Value::as_str).unwrap_or_default().to_string();
    let kind = pruned.get("kind").and_then(Value::as_str).unwrap_or_default().to_string();
    let name = pruned
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let namespace = pruned
        .get("metadata")
        .and_then(|m| m.get("namespace"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let json = pruned
        .to_json()
        .ok_or_else(|| RenderError::runtime("rendered resource still contains an unpruned omit() sentinel"))?;

    Ok(Some(RenderedResource { api_version, kind, namespace, name, value: json }))
}

/// Floor validation: `apiVersion`, `kind`, and `metadata.name` must be
/// present non-empty strings. Deeper schema conformance (e.g. a specific
/// Kubernetes resource's spec shape) is out of scope for the renderer.
fn validate_floor(resource: &Value) -> Result<(), RenderError> {
    let api_version = resource.get("apiVersion").and_then(Value::as_str).filter(|s| !s.is_empty());
    let kind = resource.get("kind").and_then(Value::as_str).filter(|s| !s.is_empty());
    let name = resource
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());

    if api_version.is_none() {
        return Err(RenderError::validation("rendered resource is missing `apiVersion`"));
    }
    if kind.is_none() {
        return Err(RenderError::validation("rendered resource is missing `kind`"));
    }
    if name.is_none() {
        return Err(RenderError::validation("rendered resource is missing `metadata.name`"));
    }
    Ok(())
}

fn strip_control_keys(template: &Value) -> Value {
    match template {
        Value::Map(entries) => Value::Map(
            entries
                .iter()
                .filter(|(k, _)| k != INCLUDE_WHEN_KEY && k != FOR_EACH_KEY)
                .cloned()
                .collect(),
        ),
        other => other.clone(),
    }
}

/// `forEach: { in: "${…}", as: "item" }` — returns the raw (uninterpolated)
/// `in` value and the loop variable name.
fn parse_for_each(for_each: &Value) -> Result<(Value, String), RenderError> {
    let iterable = for_each
        .get("in")
        .cloned()
        .ok_or_else(|| RenderError::input_invalid("forEach requires an `in` expression"))?;
    let var = for_each
        .get("as")
        .and_then(Value::as_str)
        .ok_or_else(|| RenderError::input_invalid("forEach requires an `as` loop-variable name"))?
        .to_string();
    Ok((iterable, var))
}

/// Post-processing label/annotation overlay (spec.md §2/§6): merges
/// caller-supplied `resourceLabels`/`resourceAnnotations` onto every
/// resource's `metadata.labels`/`metadata.annotations`, creating either map
/// if absent. Caller-supplied keys win over whatever the template already
/// set, matching the overlay's role as an outer, render-option-driven
/// layer applied after everything else.
pub fn apply_label_overlay(
    resource: &mut RenderedResource,
    labels: &[(String, String)],
    annotations: &[(String, String)],
) {
    if labels.is_empty() && annotations.is_empty() {
        return;
    }
    let metadata = resource
        .value
        .as_object_mut()
        .and_then(|obj| obj.get_mut("metadata"))
        .and_then(|m| m.as_object_mut());
    let Some(metadata) = metadata else { return };

    overlay_string_map(metadata, "labels", labels);
    overlay_string_map(metadata, "annotations", annotations);
}

fn overlay_string_map(metadata: &mut serde_json::Map<String, serde_json::Value>, key: &str, overlay: &[(String, String)]) {
    if overlay.is_empty() {
        return;
    }
    let entry = metadata
        .entry(key.to_string())
        .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
    if let Some(map) = entry.as_object_mut() {
        for (k, v) in overlay {
            map.insert(k.clone(), serde_json::Value::String(v.clone()));
        }
    }
}

/// Scans a batch of rendered resources for duplicate `(apiVersion, kind,
/// namespace, name)` identities, returning a human-readable warning per
/// duplicate found — typically produced by a `forEach` whose loop values
/// collide on the resource name.
pub fn duplicate_name_warnings(resources: &[RenderedResource]) -> Vec<String> {
    let mut seen: Vec<(String, String, Option<String>, String)> = Vec::new();
    let mut warnings = Vec::new();
    for r in resources {
        let identity = (r.api_version.clone(), r.kind.clone(), r.namespace.clone(), r.name.clone());
        if seen.contains(&identity) {
            warnings.push(format!(
                "duplicate resource identity: {} {} {}/{}",
                identity.0,
                identity.1,
                identity.2.as_deref().unwrap_or("-"),
                identity.3
            ));
        } else {
            seen.push(identity);
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ComponentContext {
        ComponentContext::new(
            Value::map(),
            Value::map(),
            Value::map(),
            Value::map(),
            Value::map(),
            Value::map(),
            Value::Map(vec![("name".into(), Value::String("demo".into()))]),
        )
    }

    fn basic_template() -> Value {
        Value::Map(vec![
            ("apiVersion".into(), Value::String("v1".into())),
            ("kind".into(), Value::String("ConfigMap".into())),
            (
                "metadata".into(),
                Value::Map(vec![("name".into(), Value::String("${metadata.name}".into()))]),
            ),
        ])
    }

    #[test]
    fn renders_one_resource_with_no_gates() {
        let cache = ExprCache::new();
        let out = render_template(&basic_template(), &ctx(), &cache, true).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "demo");
    }

    #[test]
    fn include_when_false_skips_resource() {
        let cache = ExprCache::new();
        let mut template = basic_template();
        if let Value::Map(entries) = &mut template {
            entries.push((INCLUDE_WHEN_KEY.to_string(), Value::String("${false}".into())));
        }
        let out = render_template(&template, &ctx(), &cache, true).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn include_when_missing_data_skips_rather_than_errors() {
        let cache = ExprCache::new();
        let mut template = basic_template();
        if let Value::Map(entries) = &mut template {
            entries.push((
                INCLUDE_WHEN_KEY.to_string(),
                Value::String("${parameters.flag}".into()),
            ));
        }
        let out = render_template(&template, &ctx(), &cache, true).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn for_each_produces_one_resource_per_item() {
        let cache = ExprCache::new();
        let mut context = ctx();
        context.parameters = Value::Map(vec![(
            "replicas".into(),
            Value::List(vec![Value::String("a".into()), Value::String("b".into())]),
        )]);
        let mut template = basic_template();
        if let (Value::Map(entries), Value::Map(meta_entries)) = (&mut template, ()) {
            let _ = meta_entries;
            entries.push((
                FOR_EACH_KEY.to_string(),
                Value::Map(vec![
                    ("in".into(), Value::String("${parameters.replicas}".into())),
                    ("as".into(), Value::String("item".into())),
                ]),
            ));
            for (k, v) in entries.iter_mut() {
                if k == "metadata" {
                    *v = Value::Map(vec![("name".into(), Value::String("svc-${item}".into()))]);
                }
            }
        }
        let out = render_template(&template, &context, &cache, true).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "svc-a");
        assert_eq!(out[1].name, "svc-b");
    }

    #[test]
    fn missing_name_fails_validation_when_enabled() {
        let cache = ExprCache::new();
        let template = Value::Map(vec![
            ("apiVersion".into(), Value::String("v1".into())),
            ("kind".into(), Value::String("ConfigMap".into())),
        ]);
        let err = render_template(&template, &ctx(), &cache, true).unwrap_err();
        assert!(matches!(err, RenderError::Validation(_)));
    }
}
