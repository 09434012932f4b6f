//! Structural-schema-driven defaulting (spec.md §2's Defaulter). Modeled
//! on the teacher's `config::types` structural shape plus
//! `config::validator`'s walk over nested property declarations, adapted
//! from HCL block schemas to a JSON-Schema-flavored `Schema` describing
//! parameter shapes.

use std::collections::BTreeMap;

use crate::error::RenderError;
use crate::value::Value;

/// The narrow slice of JSON Schema the Defaulter understands: enough to
/// describe component parameter shapes, not a general validator.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaType {
    Object {
        properties: BTreeMap<String, Schema>,
        required: Vec<String>,
        additional_properties: bool,
    },
    Array(Box<Schema>),
    String,
    Int,
    Float,
    Bool,
    /// Accepts any shape; used when a property's type is left unspecified.
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub schema_type: SchemaType,
    pub default: Option<Value>,
    pub enum_values: Option<Vec<Value>>,
}

impl Schema {
    pub fn any() -> Self {
        Schema { schema_type: SchemaType::Any, default: None, enum_values: None }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn object(properties: BTreeMap<String, Schema>, required: Vec<String>) -> Self {
        Schema {
            schema_type: SchemaType::Object { properties, required, additional_properties: true },
            default: None,
            enum_values: None,
        }
    }

    /// Validates `value` against `enum_values` when present. Spec.md
    /// defers required-field enforcement to a later validation step, so
    /// this only checks the constraints the Defaulter itself owns.
    fn check_enum(&self, value: &Value, path: &str) -> Result<(), RenderError> {
        if let Some(allowed) = &self.enum_values {
            if !allowed.contains(value) {
                return Err(RenderError::schema(format!(
                    "`{path}` is not one of the schema's allowed values"
                )));
            }
        }
        Ok(())
    }
}

/// Applies `schema`'s defaults onto `value`, deep-copying every default
/// literal so no two applications can share a mutable subtree (spec I8).
/// Required-field presence is *not* enforced here — a missing required
/// field with no default simply stays absent, to be caught by whatever
/// validation step runs after defaulting (spec.md's explicit split between
/// Defaulter and validator).
pub fn apply_defaults(schema: &Schema, value: Option<Value>) -> Result<Value, RenderError> {
    apply_at(schema, value, "$")
}

fn apply_at(schema: &Schema, value: Option<Value>, path: &str) -> Result<Value, RenderError> {
    match &schema.schema_type {
        SchemaType::Object { properties, additional_properties, .. } => {
            let mut entries: Vec<(String, Value)> = match value {
                Some(Value::Map(entries)) => entries,
                Some(Value::Null) | None => Vec::new(),
                Some(_) => {
                    return Err(RenderError::schema(format!("`{path}` must be an object")));
                }
            };

            for (key, prop_schema) in properties {
                let existing = entries.iter().position(|(k, _)| k == key);
                let child_path = format!("{path}.{key}");
                match existing {
                    Some(idx) => {
                        let (_, v) = entries.remove(idx);
                        let defaulted = apply_at(prop_schema, Some(v), &child_path)?;
                        entries.push((key.clone(), defaulted));
                    }
                    None => {
                        if let Some(default) = &prop_schema.default {
                            entries.push((key.clone(), crate::value::deep_clone(default)));
                        } else if matches!(prop_schema.schema_type, SchemaType::Object { .. }) {
                            // A nested object with no default of its own still
                            // gets a chance to contribute its own property
                            // defaults against an empty object.
                            let defaulted = apply_at(prop_schema, None, &child_path)?;
                            if let Value::Map(nested) = &defaulted {
                                if !nested.is_empty() {
                                    entries.push((key.clone(), defaulted));
                                }
                            }
                        }
                    }
                }
            }

            if !*additional_properties {
                let declared: Vec<&str> = properties.keys().map(String::as_str).collect();
                for (key, _) in &entries {
                    if !declared.contains(&key.as_str()) {
                        return Err(RenderError::schema(format!(
                            "`{path}.{key}` is not declared by the schema"
                        )));
                    }
                }
            }

            Ok(Value::Map(entries))
        }
        SchemaType::Array(item_schema) => match value {
            Some(Value::List(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    out.push(apply_at(item_schema, Some(item), &format!("{path}[{i}]"))?);
                }
                Ok(Value::List(out))
            }
            Some(Value::Null) | None => Ok(schema
                .default
                .as_ref()
                .map(crate::value::deep_clone)
                .unwrap_or(Value::List(Vec::new()))),
            Some(_) => Err(RenderError::schema(format!("`{path}` must be an array"))),
        },
        SchemaType::String | SchemaType::Int | SchemaType::Float | SchemaType::Bool | SchemaType::Any => {
            let resolved = match value {
                Some(Value::Null) | None => schema.default.as_ref().map(crate::value::deep_clone),
                Some(v) => Some(v),
            };
            let resolved = resolved.unwrap_or(Value::Null);
            if !resolved.is_omit() && !matches!(resolved, Value::Null) {
                check_scalar_type(&schema.schema_type, &resolved, path)?;
            }
            schema.check_enum(&resolved, path)?;
            Ok(resolved)
        }
    }
}

fn check_scalar_type(ty: &SchemaType, value: &Value, path: &str) -> Result<(), RenderError> {
    let ok = match ty {
        SchemaType::String => matches!(value, Value::String(_)),
        SchemaType::Int => matches!(value, Value::Int(_)),
        SchemaType::Float => matches!(value, Value::Int(_) | Value::Float(_)),
        SchemaType::Bool => matches!(value, Value::Bool(_)),
        SchemaType::Any => true,
        SchemaType::Object { .. } | SchemaType::Array(_) => unreachable!("handled by caller"),
    };
    if ok {
        Ok(())
    } else {
        Err(RenderError::schema(format!("`{path}` does not match the schema's declared type")))
    }
}

/// Merges two schemas describing the same property set (e.g. a component
/// schema and an addon's own parameter schema layered on top). A
/// conflicting declaration — the same key with incompatible types or two
/// different defaults — is a schema error rather than a silent pick.
pub fn union_schemas(base: &Schema, overlay: &Schema) -> Result<Schema, RenderError> {
    match (&base.schema_type, &overlay.schema_type) {
        (
            SchemaType::Object { properties: base_props, required: base_req, additional_properties: base_ap },
            SchemaType::Object { properties: overlay_props, required: overlay_req, additional_properties: overlay_ap },
        ) => {
            let mut merged = base_props.clone();
            for (key, overlay_schema) in overlay_props {
                match merged.get(key) {
                    Some(base_schema) => {
                        let unified = union_schemas(base_schema, overlay_schema)
                            .map_err(|_| RenderError::schema(format!("conflicting schema declarations for `{key}`")))?;
                        merged.insert(key.clone(), unified);
                    }
                    None => {
                        merged.insert(key.clone(), overlay_schema.clone());
                    }
                }
            }
            let mut required = base_req.clone();
            for r in overlay_req {
                if !required.contains(r) {
                    required.push(r.clone());
                }
            }
            Ok(Schema {
                schema_type: SchemaType::Object {
                    properties: merged,
                    required,
                    additional_properties: *base_ap && *overlay_ap,
                },
                default: overlay.default.clone().or_else(|| base.default.clone()),
                enum_values: overlay.enum_values.clone().or_else(|| base.enum_values.clone()),
            })
        }
        (a, b) if a == b => Ok(overlay.clone()),
        _ => Err(RenderError::schema("cannot union schemas of incompatible shape")),
    }
}
