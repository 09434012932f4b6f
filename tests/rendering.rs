//! Integration tests exercising the full pipeline end to end: Context
//! Builder -> Resource Renderer -> Patch Engine, through the public
//! `manifest_forge::render` entry point only.

use std::collections::BTreeMap;

use manifest_forge::context::merge_chain;
use manifest_forge::patch::{AddonPatch, RawOperation};
use manifest_forge::pipeline::AddonInput;
use manifest_forge::schema::{Schema, SchemaType};
use manifest_forge::value::Value;
use manifest_forge::{render, RenderInput, RenderOptions};

fn open_schema() -> Schema {
    Schema {
        schema_type: SchemaType::Object {
            properties: BTreeMap::new(),
            required: vec![],
            additional_properties: true,
        },
        default: None,
        enum_values: None,
    }
}

fn base_input(templates: Vec<Value>, addons: Vec<AddonInput>) -> RenderInput {
    RenderInput {
        workload: Value::map(),
        component: Value::map(),
        environment: Value::Map(vec![("name".into(), Value::String("prod".into()))]),
        environment_overrides: Value::map(),
        metadata: Value::Map(vec![("name".into(), Value::String("checkout".into()))]),
        component_schema: open_schema(),
        environment_schema: None,
        instance_parameters: Value::map(),
        templates,
        addons,
    }
}

#[test]
fn whole_string_interpolation_preserves_native_type() {
    let template = Value::Map(vec![
        ("apiVersion".into(), Value::String("v1".into())),
        ("kind".into(), Value::String("ConfigMap".into())),
        (
            "metadata".into(),
            Value::Map(vec![("name".into(), Value::String("${metadata.name}".into()))]),
        ),
        (
            "data".into(),
            Value::Map(vec![("replicas".into(), Value::String("${parameters.replicas}".into()))]),
        ),
    ]);
    let mut input = base_input(vec![template], vec![]);
    input.instance_parameters = Value::Map(vec![("replicas".into(), Value::Int(4))]);

    let output = render(&input, &RenderOptions::default()).unwrap();
    assert_eq!(output.resources[0]["data"]["replicas"], serde_json::json!(4));
}

#[test]
fn omit_removes_only_the_omitted_key() {
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
                ("keep".into(), Value::String("value".into())),
                ("drop".into(), Value::String("${omit()}".into())),
            ]),
        ),
    ]);
    let output = render(&base_input(vec![template], vec![]), &RenderOptions::default()).unwrap();
    let data = &output.resources[0]["data"];
    assert_eq!(data["keep"], serde_json::json!("value"));
    assert!(data.get("drop").is_none());
}

#[test]
fn filter_patch_fans_out_to_every_matching_container() {
    let template = Value::Map(vec![
        ("apiVersion".into(), Value::String("apps/v1".into())),
        ("kind".into(), Value::String("Deployment".into())),
        (
            "metadata".into(),
            Value::Map(vec![("name".into(), Value::String("${metadata.name}".into()))]),
        ),
        (
            "spec".into(),
            Value::Map(vec![(
                "containers".into(),
                Value::List(vec![
                    Value::Map(vec![
                        ("name".into(), Value::String("app".into())),
                        ("image".into(), Value::String("old".into())),
                    ]),
                    Value::Map(vec![
                        ("name".into(), Value::String("sidecar".into())),
                        ("image".into(), Value::String("old".into())),
                    ]),
                    Value::Map(vec![
                        ("name".into(), Value::String("app".into())),
                        ("image".into(), Value::String("old".into())),
                    ]),
                ]),
            )]),
        ),
    ]);

    let addon = AddonInput {
        name: "image-bump".into(),
        instance_id: "default".into(),
        schema: open_schema(),
        environment_schema: None,
        instance_parameters: Value::map(),
        environment_overrides: Value::map(),
        templates: vec![],
        patches: vec![AddonPatch {
            name: "image-bump".into(),
            target_group: None,
            target_version: None,
            target_kind: Some(Value::String("Deployment".into())),
            target_name: None,
            where_expr: None,
            for_each: None,
            operations: vec![RawOperation {
                op: "replace".into(),
                path: Value::String("/spec/containers[?(@.name=='app')]/image".into()),
                from: None,
                value: Some(Value::String("new".into())),
            }],
        }],
    };

    let output = render(&base_input(vec![template], vec![addon]), &RenderOptions::default()).unwrap();
    let containers = output.resources[0]["spec"]["containers"].as_array().unwrap();
    assert_eq!(containers[0]["image"], serde_json::json!("new"));
    assert_eq!(containers[1]["image"], serde_json::json!("old"));
    assert_eq!(containers[2]["image"], serde_json::json!("new"));
}

#[test]
fn merge_shallow_replaces_nested_map_key_without_touching_siblings() {
    let template = Value::Map(vec![
        ("apiVersion".into(), Value::String("v1".into())),
        ("kind".into(), Value::String("ConfigMap".into())),
        (
            "metadata".into(),
            Value::Map(vec![
                ("name".into(), Value::String("${metadata.name}".into())),
                (
                    "labels".into(),
                    Value::Map(vec![
                        ("tier".into(), Value::String("web".into())),
                        ("team".into(), Value::String("core".into())),
                    ]),
                ),
            ]),
        ),
    ]);

    let addon = AddonInput {
        name: "labeler".into(),
        instance_id: "default".into(),
        schema: open_schema(),
        environment_schema: None,
        instance_parameters: Value::map(),
        environment_overrides: Value::map(),
        templates: vec![],
        patches: vec![AddonPatch {
            name: "labeler".into(),
            target_group: None,
            target_version: None,
            target_kind: None,
            target_name: None,
            where_expr: None,
            for_each: None,
            operations: vec![RawOperation {
                op: "mergeShallow".into(),
                path: Value::String("/metadata/labels".into()),
                from: None,
                value: Some(Value::Map(vec![("env".into(), Value::String("prod".into()))])),
            }],
        }],
    };

    let output = render(&base_input(vec![template], vec![addon]), &RenderOptions::default()).unwrap();
    let labels = &output.resources[0]["metadata"]["labels"];
    assert_eq!(labels["tier"], serde_json::json!("web"));
    assert_eq!(labels["team"], serde_json::json!("core"));
    assert_eq!(labels["env"], serde_json::json!("prod"));
}

#[test]
fn for_each_addon_patch_annotates_each_target_distinctly() {
    let make_deployment = |name: &str| {
        Value::Map(vec![
            ("apiVersion".into(), Value::String("apps/v1".into())),
            ("kind".into(), Value::String("Deployment".into())),
            (
                "metadata".into(),
                Value::Map(vec![("name".into(), Value::String(name.to_string()))]),
            ),
        ])
    };

    let addon = AddonInput {
        name: "annotator".into(),
        instance_id: "default".into(),
        schema: open_schema(),
        environment_schema: None,
        instance_parameters: Value::Map(vec![(
            "targets".into(),
            Value::List(vec![Value::String("api".into()), Value::String("worker".into())]),
        )]),
        environment_overrides: Value::map(),
        templates: vec![],
        patches: vec![AddonPatch {
            name: "annotator".into(),
            target_group: None,
            target_version: None,
            target_kind: Some(Value::String("Deployment".into())),
            target_name: None,
            where_expr: None,
            for_each: Some((Value::String("${parameters.targets}".into()), "target".to_string())),
            operations: vec![RawOperation {
                op: "add".into(),
                path: Value::String("/metadata/annotations/owner".into()),
                from: None,
                value: Some(Value::String("${target}".into())),
            }],
        }],
    };

    let input = base_input(vec![make_deployment("api"), make_deployment("worker")], vec![addon]);
    let output = render(&input, &RenderOptions::default()).unwrap();

    let api = output.resources.iter().find(|r| r["metadata"]["name"] == "api").unwrap();
    let worker = output.resources.iter().find(|r| r["metadata"]["name"] == "worker").unwrap();
    assert_eq!(api["metadata"]["annotations"]["owner"], serde_json::json!("api"));
    assert_eq!(worker["metadata"]["annotations"]["owner"], serde_json::json!("worker"));
}

#[test]
fn schema_defaults_apply_before_interpolation_runs() {
    use manifest_forge::schema::Schema as S;

    let mut props = BTreeMap::new();
    props.insert(
        "environment".to_string(),
        S { schema_type: SchemaType::String, default: None, enum_values: None }
            .with_default(Value::String("staging".into())),
    );
    let schema = Schema::object(props, vec![]);

    let template = Value::Map(vec![
        ("apiVersion".into(), Value::String("v1".into())),
        ("kind".into(), Value::String("ConfigMap".into())),
        (
            "metadata".into(),
            Value::Map(vec![("name".into(), Value::String("${metadata.name}".into()))]),
        ),
        (
            "data".into(),
            Value::Map(vec![("env".into(), Value::String("${parameters.environment}".into()))]),
        ),
    ]);

    let mut input = base_input(vec![template], vec![]);
    input.component_schema = schema;

    let output = render(&input, &RenderOptions::default()).unwrap();
    assert_eq!(output.resources[0]["data"]["env"], serde_json::json!("staging"));
}

#[test]
fn duplicate_resource_identity_is_reported_as_a_warning_not_an_error() {
    let template = Value::Map(vec![
        ("apiVersion".into(), Value::String("v1".into())),
        ("kind".into(), Value::String("ConfigMap".into())),
        (
            "metadata".into(),
            Value::Map(vec![("name".into(), Value::String("${metadata.name}".into()))]),
        ),
        (
            "forEach".into(),
            Value::Map(vec![
                ("in".into(), Value::String("${parameters.names}".into())),
                ("as".into(), Value::String("n".into())),
            ]),
        ),
    ]);
    let mut input = base_input(vec![template], vec![]);
    input.instance_parameters = Value::Map(vec![(
        "names".into(),
        Value::List(vec![Value::String("a".into()), Value::String("b".into())]),
    )]);
    // metadata.name ignores the loop variable on purpose, so every
    // iteration collides on the same identity.
    let output = render(&input, &RenderOptions::default()).unwrap();
    assert_eq!(output.resources.len(), 2);
    assert_eq!(output.warnings.len(), 1);
}

#[test]
fn strict_mode_upgrades_duplicate_warning_to_an_error() {
    let template = Value::Map(vec![
        ("apiVersion".into(), Value::String("v1".into())),
        ("kind".into(), Value::String("ConfigMap".into())),
        (
            "metadata".into(),
            Value::Map(vec![("name".into(), Value::String("${metadata.name}".into()))]),
        ),
        (
            "forEach".into(),
            Value::Map(vec![
                ("in".into(), Value::String("${parameters.names}".into())),
                ("as".into(), Value::String("n".into())),
            ]),
        ),
    ]);
    let mut input = base_input(vec![template], vec![]);
    input.instance_parameters = Value::Map(vec![(
        "names".into(),
        Value::List(vec![Value::String("a".into()), Value::String("b".into())]),
    )]);
    let options = RenderOptions { enable_validation: true, strict_mode: true, ..RenderOptions::default() };
    let err = render(&input, &options).unwrap_err();
    assert!(matches!(err, manifest_forge::RenderError::Validation(_)));
}

#[test]
fn merge_chain_precedence_matches_environment_overrides_winning() {
    let schema_defaults = Value::Map(vec![("cpu".into(), Value::String("100m".into()))]);
    let instance = Value::Map(vec![("cpu".into(), Value::String("200m".into()))]);
    let env = Value::Map(vec![("cpu".into(), Value::String("300m".into()))]);
    let merged = merge_chain(&[schema_defaults, instance, env]);
    assert_eq!(merged.get("cpu"), Some(&Value::String("300m".into())));
}
