//! Context Builder (spec.md §2). Merges parameter sources in precedence
//! order — environment overrides beat instance/component parameters beat
//! schema defaults — then assembles the named top-level bindings an
//! expression sees. `deep_merge` generalizes the teacher's
//! `config::parser::merge_yaml_files`, which already layers multiple YAML
//! documents with later files winning on scalar/sequence conflicts and
//! recursing into nested mappings.

use crate::expr::EvalContext;
use crate::value::Value;

/// Recursively merges `overlay` onto `base`: mapping keys merge key by
/// key, everything else (sequences, scalars, mismatched types) is fully
/// replaced by the overlay's value. Neither input is mutated; the result
/// owns freshly cloned subtrees throughout (spec I8: no aliasing).
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Map(base_entries), Value::Map(overlay_entries)) => {
            let mut merged = base_entries.clone();
            for (key, overlay_val) in overlay_entries {
                match merged.iter().position(|(k, _)| k == key) {
                    Some(idx) => {
                        let combined = deep_merge(&merged[idx].1, overlay_val);
                        merged[idx].1 = combined;
                    }
                    None => merged.push((key.clone(), overlay_val.clone())),
                }
            }
            Value::Map(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}

/// Merges a chain of parameter sources, lowest precedence first. An empty
/// chain yields an empty map, not `Value::Null`, so callers can always
/// treat the result as a map.
pub fn merge_chain(layers: &[Value]) -> Value {
    layers.iter().fold(Value::map(), |acc, layer| deep_merge(&acc, layer))
}

/// The full named-binding set for rendering one component instance:
/// `parameters` (merged per precedence), plus the ambient `workload`,
/// `component`, `environment`, and `metadata` bindings carried through
/// unchanged from the render input.
#[derive(Clone)]
pub struct ComponentContext {
    pub parameters: Value,
    pub workload: Value,
    pub component: Value,
    pub environment: Value,
    pub metadata: Value,
}

impl ComponentContext {
    /// Builds the merged `parameters` value from, in increasing
    /// precedence: the component schema's own defaults (already applied
    /// by the caller via `schema::apply_defaults`), the instance's
    /// declared parameters, and environment overrides.
    pub fn new(
        schema_defaulted_parameters: Value,
        instance_parameters: Value,
        environment_overrides: Value,
        workload: Value,
        component: Value,
        environment: Value,
        metadata: Value,
    ) -> Self {
        let parameters = merge_chain(&[schema_defaulted_parameters, instance_parameters, environment_overrides]);
        ComponentContext { parameters, workload, component, environment, metadata }
    }

    pub fn to_eval_context(&self) -> EvalContext {
        EvalContext::new(vec![
            ("parameters".to_string(), self.parameters.clone()),
            ("workload".to_string(), self.workload.clone()),
            ("component".to_string(), self.component.clone()),
            ("environment".to_string(), self.environment.clone()),
            ("metadata".to_string(), self.metadata.clone()),
        ])
    }
}

/// The binding set for an addon's own Context Builder pass: the same base
/// bindings a component sees, but with `parameters` replaced by the
/// addon's own merged instance config, plus a new `addon` binding carrying
/// just `{name, instanceId}` — not the addon's parameters — per spec.md
/// §4.3's addon-context contract.
#[derive(Clone)]
pub struct AddonContext {
    pub base: ComponentContext,
    pub parameters: Value,
    pub addon: Value,
}

impl AddonContext {
    pub fn new(base: ComponentContext, name: impl Into<String>, instance_id: impl Into<String>, parameters: Value) -> Self {
        let addon = Value::Map(vec![
            ("name".to_string(), Value::String(name.into())),
            ("instanceId".to_string(), Value::String(instance_id.into())),
        ]);
        AddonContext { base, parameters, addon }
    }

    /// The binding set available before a specific resource has been
    /// matched — used to resolve a target selector's own `${…}`
    /// expressions (e.g. `name: "${addon.name}-sidecar"`).
    pub fn addon_eval_context(&self) -> EvalContext {
        self.base
            .to_eval_context()
            .with_binding("parameters", self.parameters.clone())
            .with_binding("addon", self.addon.clone())
    }

    /// An evaluation context scoped to one candidate resource, used while
    /// the Patch Engine evaluates `where`/operation expressions against
    /// that specific target.
    pub fn to_eval_context(&self, resource: Value) -> EvalContext {
        self.addon_eval_context().with_binding("resource", resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_replaces_scalar_and_merges_nested_map() {
        let base = Value::Map(vec![
            ("cpu".into(), Value::String("100m".into())),
            ("labels".into(), Value::Map(vec![("tier".into(), Value::String("web".into()))])),
        ]);
        let overlay = Value::Map(vec![
            ("cpu".into(), Value::String("200m".into())),
            ("labels".into(), Value::Map(vec![("env".into(), Value::String("prod".into()))])),
        ]);
        let merged = deep_merge(&base, &overlay);
        assert_eq!(merged.get("cpu"), Some(&Value::String("200m".into())));
        let labels = merged.get("labels").unwrap();
        assert_eq!(labels.get("tier"), Some(&Value::String("web".into())));
        assert_eq!(labels.get("env"), Some(&Value::String("prod".into())));
    }

    #[test]
    fn overlay_sequence_fully_replaces_base_sequence() {
        let base = Value::Map(vec![("ports".into(), Value::List(vec![Value::Int(80), Value::Int(443)]))]);
        let overlay = Value::Map(vec![("ports".into(), Value::List(vec![Value::Int(8080)]))]);
        let merged = deep_merge(&base, &overlay);
        assert_eq!(merged.get("ports"), Some(&Value::List(vec![Value::Int(8080)])));
    }

    #[test]
    fn precedence_chain_favors_later_layers() {
        let schema_defaults = Value::Map(vec![("cpu".into(), Value::String("100m".into()))]);
        let instance = Value::Map(vec![("cpu".into(), Value::String("200m".into()))]);
        let env_override = Value::Map(vec![("cpu".into(), Value::String("300m".into()))]);
        let merged = merge_chain(&[schema_defaults, instance, env_override]);
        assert_eq!(merged.get("cpu"), Some(&Value::String("300m".into())));
    }
}
