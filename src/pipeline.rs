//! The top-level orchestration entry point (spec.md §5): Context Builder
//! for the base component, Resource Renderer over its templates, then for
//! each addon a fresh Context Builder pass and a Patch Engine application
//! against the accumulated resource batch — in declared addon order, each
//! addon seeing the previous addon's patches already applied. Finishes
//! with the deterministic `(apiVersion, kind, namespace, name)` sort spec
//! I7 requires and a warnings report (duplicate resource identities,
//! optionally escalated to a hard error by `strictMode`).

use crate::context::{AddonContext, ComponentContext};
use crate::error::RenderError;
use crate::expr::ExprCache;
use crate::patch::{self, AddonPatch};
use crate::render::{self, RenderedResource};
use crate::schema::{self, Schema};
use crate::value::Value;

/// One addon's full contribution: its own parameter schema/instance
/// values (merged the same way a component's are), the resource templates
/// it *creates* (rendered via the same Resource Renderer as base
/// templates, against this addon's own context), and the *patches* it
/// applies to the resources rendered so far — base resources and, per
/// spec.md §5's ordering guarantee, this same addon's own creates (creates
/// run before patches within one addon).
pub struct AddonInput {
    pub name: String,
    /// Identifies which declared instance of this addon this is, when a
    /// component attaches the same addon more than once. Exposed to
    /// expressions as `addon.instanceId` (spec.md §4.3); also the key the
    /// caller uses to select this instance's slice out of
    /// `addonOverrides: {addonName: {instanceId: overrides}}` before
    /// populating `environment_overrides` below.
    pub instance_id: String,
    pub schema: Schema,
    /// A schema declared alongside this instance's environment overrides,
    /// when the environment itself declares one (spec.md §4.2's "Merged
    /// schemas": unioned with `schema` before defaulting runs; a
    /// conflicting property declaration between the two is a schema
    /// error, not a silent pick).
    pub environment_schema: Option<Schema>,
    pub instance_parameters: Value,
    /// This instance's resolved slice of the environment's per-addon-per-
    /// instance override bundle — the caller looks up
    /// `addonOverrides[name][instanceId]` (spec.md §6) and passes just that
    /// slice here, rather than this type re-deriving it from the full
    /// nested bundle.
    pub environment_overrides: Value,
    pub templates: Vec<Value>,
    pub patches: Vec<AddonPatch>,
}

/// Everything the pipeline needs to render one component instance and
/// apply its addons.
pub struct RenderInput {
    pub workload: Value,
    pub component: Value,
    pub environment: Value,
    pub environment_overrides: Value,
    pub metadata: Value,
    pub component_schema: Schema,
    /// A schema declared alongside the render's environment overrides,
    /// when the environment itself declares one (spec.md §4.2's "Merged
    /// schemas": base parameters and env-overrides' top-level property
    /// sets are unioned before defaulting; a conflicting property
    /// declaration between the two is a schema error).
    pub environment_schema: Option<Schema>,
    pub instance_parameters: Value,
    pub templates: Vec<Value>,
    pub addons: Vec<AddonInput>,
}

/// Render-time switches. Unlike the teacher's binary, which reads
/// environment variables and config files for its own CLI flags, this
/// crate is a library: every knob the renderer honors is an explicit
/// field here, set by the embedding application (spec.md's Non-goals
/// exclude a config-file/env-var surface for the renderer itself).
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Require `apiVersion`/`kind`/`metadata.name` on every rendered
    /// resource (spec.md §3's floor validation).
    pub enable_validation: bool,
    /// Upgrade warnings (currently: duplicate resource identities) into a
    /// hard `RenderError::Validation` instead of reporting them.
    pub strict_mode: bool,
    /// Labels overlaid onto every rendered resource's `metadata.labels`
    /// as a post-processing step (spec.md §6), after base rendering and
    /// every addon's creates/patches.
    pub resource_labels: Vec<(String, String)>,
    /// Same overlay, for `metadata.annotations`.
    pub resource_annotations: Vec<(String, String)>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            enable_validation: true,
            strict_mode: false,
            resource_labels: Vec::new(),
            resource_annotations: Vec::new(),
        }
    }
}

/// Mirrors spec.md §6's output shape: `{resources, metadata: {resourceCount,
/// baseResourceCount, addonCount, addonResourceCount, warnings}}`, flattened
/// into one struct since this is a library return value, not wire JSON.
pub struct RenderOutput {
    pub resources: Vec<serde_json::Value>,
    pub resource_count: usize,
    pub base_resource_count: usize,
    pub addon_count: usize,
    pub addon_resource_count: usize,
    pub warnings: Vec<String>,
}

#[tracing::instrument(skip_all, fields(component = %input.metadata.get("name").and_then(Value::as_str).unwrap_or("?")))]
pub fn render(input: &RenderInput, options: &RenderOptions) -> Result<RenderOutput, RenderError> {
    let cache = ExprCache::new();

    let effective_schema = match &input.environment_schema {
        Some(env_schema) => schema::union_schemas(&input.component_schema, env_schema)?,
        None => input.component_schema.clone(),
    };
    let defaulted_parameters = schema::apply_defaults(&effective_schema, Some(input.instance_parameters.clone()))?;
    let component_ctx = ComponentContext::new(
        defaulted_parameters,
        Value::map(),
        input.environment_overrides.clone(),
        input.workload.clone(),
        input.component.clone(),
        input.environment.clone(),
        input.metadata.clone(),
    );

    let mut resources: Vec<RenderedResource> = Vec::new();
    for template in &input.templates {
        let rendered = render::render_template(template, &component_ctx, &cache, options.enable_validation)
            .map_err(|e| e.with_context(resource_hint(template)))?;
        resources.extend(rendered);
    }
    let base_resource_count = resources.len();

    let mut warnings = render::duplicate_name_warnings(&resources);
    let mut addon_resource_count = 0usize;

    for addon in &input.addons {
        tracing::debug!(addon = %addon.name, "applying addon");
        let addon_effective_schema = match &addon.environment_schema {
            Some(env_schema) => schema::union_schemas(&addon.schema, env_schema)?,
            None => addon.schema.clone(),
        };
        let addon_defaulted = schema::apply_defaults(&addon_effective_schema, Some(addon.instance_parameters.clone()))?;
        let addon_parameters = crate::context::merge_chain(&[addon_defaulted, addon.environment_overrides.clone()]);
        let addon_ctx = AddonContext::new(component_ctx.clone(), addon.name.clone(), addon.instance_id.clone(), addon_parameters);

        // Creates run before patches within one addon (spec.md §5).
        let mut created: Vec<RenderedResource> = Vec::new();
        for template in &addon.templates {
            let rendered =
                render::render_template_ctx(template, addon_ctx.addon_eval_context(), &cache, options.enable_validation)
                    .map_err(|e| e.with_context(format!("addon `{}`", addon.name)))?;
            created.extend(rendered);
        }
        addon_resource_count += created.len();
        warnings.extend(render::duplicate_name_warnings(&created));
        resources.extend(created);

        for patch in &addon.patches {
            patch::apply_patch(patch, &mut resources, &addon_ctx, &cache)
                .map_err(|e| e.with_context(format!("addon `{}`", addon.name)))?;
        }
    }

    if options.strict_mode && !warnings.is_empty() {
        return Err(RenderError::validation(warnings.join("; ")));
    }

    for resource in &mut resources {
        render::apply_label_overlay(resource, &options.resource_labels, &options.resource_annotations);
    }

    resources.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));

    let resources_json = resources
        .iter()
        .map(|r| r.value.clone())
        .collect::<Vec<_>>();

    warnings.sort();
    Ok(RenderOutput {
        resource_count: resources_json.len(),
        base_resource_count,
        addon_count: input.addons.len(),
        addon_resource_count,
        resources: resources_json,
        warnings: std::mem::take(&mut warnings),
    })
}

fn sort_key(r: &RenderedResource) -> (String, String, String, String) {
    (r.api_version.clone(), r.kind.clone(), r.namespace.clone().unwrap_or_default(), r.name.clone())
}

fn resource_hint(template: &Value) -> String {
    let kind = template.get("kind").and_then(Value::as_str).unwrap_or("resource");
    let name = template
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("?");
    format!("{kind}/{name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Schema, SchemaType};
    use std::collections::BTreeMap;

    fn deployment_template() -> Value {
        Value::Map(vec![
            ("apiVersion".into(), Value::String("apps/v1".into())),
            ("kind".into(), Value::String("Deployment".into())),
            (
                "metadata".into(),
                Value::Map(vec![("name".into(), Value::String("${metadata.name}".into()))]),
            ),
            (
                "spec".into(),
                Value::Map(vec![("replicas".into(), Value::String("${parameters.replicas}".into()))]),
            ),
        ])
    }

    fn any_schema() -> Schema {
        Schema { schema_type: SchemaType::Object { properties: BTreeMap::new(), required: vec![], additional_properties: true }, default: None, enum_values: None }
    }

    #[test]
    fn renders_and_sorts_deterministically() {
        let input = RenderInput {
            workload: Value::map(),
            component: Value::map(),
            environment: Value::map(),
            environment_overrides: Value::map(),
            metadata: Value::Map(vec![("name".into(), Value::String("web".into()))]),
            component_schema: any_schema(),
            environment_schema: None,
            instance_parameters: Value::Map(vec![("replicas".into(), Value::Int(2))]),
            templates: vec![deployment_template()],
            addons: vec![],
        };
        let output = render(&input, &RenderOptions::default()).unwrap();
        assert_eq!(output.resources.len(), 1);
        assert_eq!(output.resources[0]["spec"]["replicas"], serde_json::json!(2));
        assert_eq!(output.resource_count, 1);
        assert_eq!(output.base_resource_count, 1);
        assert_eq!(output.addon_count, 0);
        assert_eq!(output.addon_resource_count, 0);
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn environment_schema_defaults_union_with_component_schema() {
        let mut component_props = BTreeMap::new();
        component_props.insert(
            "replicas".to_string(),
            Schema { schema_type: SchemaType::Int, default: None, enum_values: None }.with_default(Value::Int(1)),
        );
        let component_schema = Schema::object(component_props, vec![]);

        let mut env_props = BTreeMap::new();
        env_props.insert(
            "environment".to_string(),
            Schema { schema_type: SchemaType::String, default: None, enum_values: None }
                .with_default(Value::String("staging".into())),
        );
        let environment_schema = Schema::object(env_props, vec![]);

        let template = Value::Map(vec![
            ("apiVersion".into(), Value::String("v1".into())),
            ("kind".into(), Value::String("ConfigMap".into())),
            (
                "metadata".into(),
                Value::Map(vec![("name".into(), Value::String("${metadata.name}".into()))]),
            ),
            (
                "data".into(),
                Value::Map(vec![
                    ("replicas".into(), Value::String("${parameters.replicas}".into())),
                    ("env".into(), Value::String("${parameters.environment}".into())),
                ]),
            ),
        ]);

        let input = RenderInput {
            workload: Value::map(),
            component: Value::map(),
            environment: Value::map(),
            environment_overrides: Value::map(),
            metadata: Value::Map(vec![("name".into(), Value::String("web".into()))]),
            component_schema,
            environment_schema: Some(environment_schema),
            instance_parameters: Value::map(),
            templates: vec![template],
            addons: vec![],
        };
        let output = render(&input, &RenderOptions::default()).unwrap();
        assert_eq!(output.resources[0]["data"]["replicas"], serde_json::json!(1));
        assert_eq!(output.resources[0]["data"]["env"], serde_json::json!("staging"));
    }

    #[test]
    fn applies_addon_patches_after_base_render() {
        use crate::patch::{AddonPatch, RawOperation};

        let input = RenderInput {
            workload: Value::map(),
            component: Value::map(),
            environment: Value::map(),
            environment_overrides: Value::map(),
            metadata: Value::Map(vec![("name".into(), Value::String("web".into()))]),
            component_schema: any_schema(),
            environment_schema: None,
            instance_parameters: Value::Map(vec![("replicas".into(), Value::Int(1))]),
            templates: vec![deployment_template()],
            addons: vec![AddonInput {
                name: "scaler".into(),
                instance_id: "default".into(),
                schema: any_schema(),
                environment_schema: None,
                instance_parameters: Value::map(),
                environment_overrides: Value::map(),
                templates: vec![],
                patches: vec![AddonPatch {
                    name: "scaler".into(),
                    target_group: None,
                    target_version: None,
                    target_kind: Some(Value::String("Deployment".into())),
                    target_name: None,
                    where_expr: None,
                    for_each: None,
                    operations: vec![RawOperation {
                        op: "replace".into(),
                        path: Value::String("/spec/replicas".into()),
                        from: None,
                        value: Some(Value::Int(5)),
                    }],
                }],
            }],
        };
        let output = render(&input, &RenderOptions::default()).unwrap();
        assert_eq!(output.resources[0]["spec"]["replicas"], serde_json::json!(5));
        assert_eq!(output.addon_count, 1);
        assert_eq!(output.addon_resource_count, 0);
    }

    #[test]
    fn addon_create_template_adds_a_new_resource_before_its_own_patches_run() {
        use crate::patch::{AddonPatch, RawOperation};

        let sidecar_config_map = Value::Map(vec![
            ("apiVersion".into(), Value::String("v1".into())),
            ("kind".into(), Value::String("ConfigMap".into())),
            (
                "metadata".into(),
                Value::Map(vec![("name".into(), Value::String("${addon.name}-config".into()))]),
            ),
        ]);

        let input = RenderInput {
            workload: Value::map(),
            component: Value::map(),
            environment: Value::map(),
            environment_overrides: Value::map(),
            metadata: Value::Map(vec![("name".into(), Value::String("web".into()))]),
            component_schema: any_schema(),
            environment_schema: None,
            instance_parameters: Value::Map(vec![("replicas".into(), Value::Int(1))]),
            templates: vec![deployment_template()],
            addons: vec![AddonInput {
                name: "logging".into(),
                instance_id: "default".into(),
                schema: any_schema(),
                environment_schema: None,
                instance_parameters: Value::Map(vec![("name".into(), Value::String("logging".into()))]),
                environment_overrides: Value::map(),
                templates: vec![sidecar_config_map],
                patches: vec![AddonPatch {
                    name: "logging".into(),
                    target_group: None,
                    target_version: None,
                    target_kind: Some(Value::String("ConfigMap".into())),
                    target_name: None,
                    where_expr: None,
                    for_each: None,
                    operations: vec![RawOperation {
                        op: "add".into(),
                        path: Value::String("/data".into()),
                        from: None,
                        value: Some(Value::Map(vec![("level".into(), Value::String("info".into()))])),
                    }],
                }],
            }],
        };
        let output = render(&input, &RenderOptions::default()).unwrap();
        assert_eq!(output.resource_count, 2);
        assert_eq!(output.base_resource_count, 1);
        assert_eq!(output.addon_resource_count, 1);
        let config_map = output
            .resources
            .iter()
            .find(|r| r["kind"] == "ConfigMap")
            .expect("addon create should have produced a ConfigMap");
        assert_eq!(config_map["metadata"]["name"], serde_json::json!("logging-config"));
        assert_eq!(config_map["data"]["level"], serde_json::json!("info"));
    }

    #[test]
    fn resource_label_and_annotation_overlay_applies_to_every_resource() {
        let input = RenderInput {
            workload: Value::map(),
            component: Value::map(),
            environment: Value::map(),
            environment_overrides: Value::map(),
            metadata: Value::Map(vec![("name".into(), Value::String("web".into()))]),
            component_schema: any_schema(),
            environment_schema: None,
            instance_parameters: Value::Map(vec![("replicas".into(), Value::Int(1))]),
            templates: vec![deployment_template()],
            addons: vec![],
        };
        let options = RenderOptions {
            resource_labels: vec![("managed-by".to_string(), "platform".to_string())],
            resource_annotations: vec![("team".to_string(), "core".to_string())],
            ..RenderOptions::default()
        };
        let output = render(&input, &options).unwrap();
        assert_eq!(output.resources[0]["metadata"]["labels"]["managed-by"], serde_json::json!("platform"));
        assert_eq!(output.resources[0]["metadata"]["annotations"]["team"], serde_json::json!("core"));
    }
}
