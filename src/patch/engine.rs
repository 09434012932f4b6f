//! The Patch Engine (spec.md §4): resolves an addon's target selector
//! against the rendered resource batch, applies its `where` predicate
//! (missing data skips the candidate rather than failing the whole
//! render), expands `forEach`, and runs the addon's operations in
//! declared order.
//!
//! "Context-variable restoration on every exit path" (spec.md §4's
//! invariant on `forEach`/`where` scoping) is structural here rather than
//! something this code has to remember to do: `EvalContext::with_binding`
//! always returns a new, independent context, so a `forEach` iteration's
//! loop binding can never leak into a sibling iteration or back into the
//! addon's outer scope, on any exit path — there is no shared mutable
//! scope to restore.

use super::ops::{self, Op, Operation};
use crate::context::AddonContext;
use crate::error::RenderError;
use crate::expr::{EvalContext, ExprCache};
use crate::render::RenderedResource;
use crate::template;
use crate::value::Value;

/// One operation as written in an addon's patch list, with every operand
/// still an uninterpolated template (path, value, `from` may all contain
/// `${…}`).
#[derive(Debug, Clone)]
pub struct RawOperation {
    pub op: String,
    pub path: Value,
    pub from: Option<Value>,
    pub value: Option<Value>,
}

/// An addon's full patch declaration: which resources it targets, the
/// optional `forEach` that multiplies its operations across a list, and
/// the operations themselves.
///
/// `target_group`/`target_version` filter independently — a patch naming
/// only `target_version` matches that version under any group, and vice
/// versa (spec.md §4.5's `apiVersion` split: `"apps/v1" → ("apps","v1")`,
/// `"v1" → ("","v1")`).
#[derive(Debug, Clone)]
pub struct AddonPatch {
    pub name: String,
    pub target_group: Option<Value>,
    pub target_version: Option<Value>,
    pub target_kind: Option<Value>,
    pub target_name: Option<Value>,
    pub where_expr: Option<Value>,
    pub for_each: Option<(Value, String)>,
    pub operations: Vec<RawOperation>,
}

/// Splits a resource's `apiVersion` into `(group, version)`: `"apps/v1"` →
/// `("apps", "v1")`, `"v1"` → `("", "v1")`.
fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Applies `patch` to every matching resource in `resources`, mutating
/// them in place.
pub fn apply_patch(
    patch: &AddonPatch,
    resources: &mut [RenderedResource],
    ctx: &AddonContext,
    cache: &ExprCache,
) -> Result<(), RenderError> {
    let selector_ctx = ctx.addon_eval_context();

    for resource in resources.iter_mut() {
        if !target_matches(patch, resource, &selector_ctx, cache)? {
            continue;
        }

        let resource_value = Value::from_json(&resource.value);
        let eval_ctx = selector_ctx.with_binding("resource", resource_value);

        if !where_passes(patch, &eval_ctx, cache)? {
            continue;
        }

        match &patch.for_each {
            None => run_operations(patch, resource, &eval_ctx, cache)?,
            Some((iterable, var)) => {
                let list = match template::interpolate(iterable, &eval_ctx, cache) {
                    Ok(v) => v,
                    Err(e) if e.is_missing_data() => continue,
                    Err(e) => return Err(e.with_context(format!("addon `{}`", patch.name))),
                };
                let Value::List(items) = list else {
                    return Err(RenderError::patch(&patch.name, "forEach.in must evaluate to a list"));
                };
                for item in items {
                    let scoped = eval_ctx.with_binding(var.clone(), item);
                    run_operations(patch, resource, &scoped, cache)?;
                }
            }
        }
    }
    Ok(())
}

fn target_matches(
    patch: &AddonPatch,
    resource: &RenderedResource,
    ctx: &EvalContext,
    cache: &ExprCache,
) -> Result<bool, RenderError> {
    let (resource_group, resource_version) = split_api_version(&resource.api_version);
    if let Some(expr) = &patch.target_group {
        let want = interpolate_text(expr, ctx, cache, patch)?;
        if want != resource_group {
            return Ok(false);
        }
    }
    if let Some(expr) = &patch.target_version {
        let want = interpolate_text(expr, ctx, cache, patch)?;
        if want != resource_version {
            return Ok(false);
        }
    }
    if let Some(expr) = &patch.target_kind {
        let want = interpolate_text(expr, ctx, cache, patch)?;
        if want != resource.kind {
            return Ok(false);
        }
    }
    if let Some(expr) = &patch.target_name {
        let want = interpolate_text(expr, ctx, cache, patch)?;
        if want != resource.name {
            return Ok(false);
        }
    }
    Ok(true)
}

fn interpolate_text(
    template_value: &Value,
    ctx: &EvalContext,
    cache: &ExprCache,
    patch: &AddonPatch,
) -> Result<String, RenderError> {
    let value = template::interpolate(template_value, ctx, cache)
        .map_err(|e| e.with_context(format!("addon `{}` target selector", patch.name)))?;
    Ok(value.coerce_to_text())
}

fn where_passes(patch: &AddonPatch, ctx: &EvalContext, cache: &ExprCache) -> Result<bool, RenderError> {
    let Some(expr) = &patch.where_expr else {
        return Ok(true);
    };
    match template::interpolate(expr, ctx, cache) {
        Ok(v) => Ok(v.is_truthy()),
        Err(e) if e.is_missing_data() => Ok(false),
        Err(e) => Err(e.with_context(format!("addon `{}` where clause", patch.name))),
    }
}

fn run_operations(
    patch: &AddonPatch,
    resource: &mut RenderedResource,
    ctx: &EvalContext,
    cache: &ExprCache,
) -> Result<(), RenderError> {
    for raw in &patch.operations {
        let path = template::interpolate(&raw.path, ctx, cache)
            .map_err(|e| e.with_context(format!("addon `{}`", patch.name)))?
            .coerce_to_text();
        let from = match &raw.from {
            Some(f) => Some(
                template::interpolate(f, ctx, cache)
                    .map_err(|e| e.with_context(format!("addon `{}`", patch.name)))?
                    .coerce_to_text(),
            ),
            None => None,
        };
        let value = match &raw.value {
            Some(v) => Some(template::prune(
                template::interpolate(v, ctx, cache).map_err(|e| e.with_context(format!("addon `{}`", patch.name)))?,
            )),
            None => None,
        };
        let op = Op::parse(&raw.op)?;
        let operation = Operation { op, path, from, value };
        ops::apply(&mut resource.value, &operation, &patch.name)?;
    }
    Ok(())
}
