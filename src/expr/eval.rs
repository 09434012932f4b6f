//! Tree-walking evaluator. Generalizes the teacher's
//! `executor::engine::eval_expression`, which walks its own `Expression`
//! AST against a `serde_json::Value` context, to walk [`Expr`] against an
//! [`EvalContext`] of named bindings (`parameters`, `workload`, `component`,
//! `environment`, `metadata`, `addon`, `resource`, plus loop variables bound
//! by `forEach`/comprehensions).
//!
//! spec.md §4.1 classifies both an `Ident` naming a binding never declared
//! in this context, and a `Field`/`Index` step that fails against a
//! *declared* value, as missing data — recoverable by `includeWhen`/`where`
//! rather than a hard failure. `TemplateCompile` is reserved for expressions
//! that fail to parse, not for names absent from the binding set.

use super::ast::{BinaryOp, ComprehensionKind, Expr, UnaryOp};
use super::functions;
use crate::error::RenderError;
use crate::value::{partial_compare, Value};

/// The named bindings visible to an expression at one evaluation site.
/// Cloning and pushing a new binding (`with_binding`) never touches the
/// original — callers (forEach, comprehensions) rely on this to keep an
/// outer scope untouched by an inner one.
#[derive(Debug, Clone)]
pub struct EvalContext {
    bindings: Vec<(String, Value)>,
}

impl EvalContext {
    pub fn new(bindings: Vec<(String, Value)>) -> Self {
        EvalContext { bindings }
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.bindings.iter().rev().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Returns a new context with `name` bound to `value`, shadowing any
    /// existing binding of the same name. Does not mutate `self`.
    pub fn with_binding(&self, name: impl Into<String>, value: Value) -> EvalContext {
        let mut bindings = self.bindings.clone();
        bindings.push((name.into(), value));
        EvalContext { bindings }
    }

    /// The `metadata.name` of the resource under render, when one is bound.
    /// Backs the container-config method overloads' generated names.
    pub fn metadata_name(&self) -> Option<String> {
        self.lookup("metadata")
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

pub fn eval(expr: &Expr, ctx: &EvalContext) -> Result<Value, RenderError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),

        Expr::Ident(name) => ctx
            .lookup(name)
            .cloned()
            .ok_or_else(|| RenderError::missing(format!("undeclared variable `{name}`"))),

        Expr::Field { base, field } => {
            let base_val = eval(base, ctx)?;
            match &base_val {
                Value::Map(_) => base_val
                    .get(field)
                    .cloned()
                    .ok_or_else(|| RenderError::missing(format!("field `{field}` is not set"))),
                Value::Null => Err(RenderError::missing(format!("field `{field}` is not set"))),
                _ => Err(RenderError::runtime(format!(
                    "cannot access field `{field}` on a non-map value"
                ))),
            }
        }

        Expr::Index { base, index } => {
            let base_val = eval(base, ctx)?;
            let index_val = eval(index, ctx)?;
            match (&base_val, &index_val) {
                (Value::List(items), Value::Int(n)) => {
                    let len = items.len() as i64;
                    let resolved = if *n < 0 { len + n } else { *n };
                    if resolved < 0 || resolved >= len {
                        return Err(RenderError::missing(format!("index {n} out of range")));
                    }
                    Ok(items[resolved as usize].clone())
                }
                (Value::Map(_), Value::String(key)) => base_val
                    .get(key)
                    .cloned()
                    .ok_or_else(|| RenderError::missing(format!("key `{key}` is not set"))),
                (Value::List(_), _) => Err(RenderError::runtime("list index must be an integer")),
                (Value::Map(_), _) => Err(RenderError::runtime("map index must be a string")),
                _ => Err(RenderError::runtime("cannot index a scalar value")),
            }
        }

        Expr::Has(inner) => Ok(Value::Bool(eval_has(inner, ctx)?)),

        Expr::Ternary { cond, then, otherwise } => {
            if eval(cond, ctx)?.is_truthy() {
                eval(then, ctx)
            } else {
                eval(otherwise, ctx)
            }
        }

        Expr::Unary { op, expr } => {
            let v = eval(expr, ctx)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
                UnaryOp::Neg => match v {
                    Value::Int(i) => Ok(Value::Int(-i)),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    _ => Err(RenderError::runtime("unary `-` requires a number")),
                },
            }
        }

        Expr::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, ctx),

        Expr::Call { name, args } => {
            let values = args.iter().map(|a| eval(a, ctx)).collect::<Result<Vec<_>, _>>()?;
            functions::call(name, values)
        }

        Expr::Method { receiver, method, args } => eval_method(receiver, method, args, ctx),

        Expr::Comprehension { kind, var, iterable, body } => {
            eval_comprehension(*kind, var, iterable, body, ctx)
        }

        Expr::ListLiteral(items) => {
            let values = items.iter().map(|e| eval(e, ctx)).collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List(values))
        }

        Expr::MapLiteral(pairs) => {
            let mut entries = Vec::with_capacity(pairs.len());
            for (key_expr, value_expr) in pairs {
                let key = eval(key_expr, ctx)?.coerce_to_text();
                let value = eval(value_expr, ctx)?;
                entries.push((key, value));
            }
            Ok(Value::Map(entries))
        }
    }
}

/// `has(x)` never propagates missing-data as an error; every other error
/// (an undeclared variable, a type mismatch in the path) still does, since
/// those indicate a broken expression rather than absent data.
fn eval_has(inner: &Expr, ctx: &EvalContext) -> Result<bool, RenderError> {
    match eval(inner, ctx) {
        Ok(v) => Ok(!v.is_omit()),
        Err(e) if e.is_missing_data() => Ok(false),
        Err(e) => Err(e),
    }
}

fn eval_binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, ctx: &EvalContext) -> Result<Value, RenderError> {
    match op {
        BinaryOp::And => {
            if !eval(lhs, ctx)?.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval(rhs, ctx)?.is_truthy()))
        }
        BinaryOp::Or => {
            if eval(lhs, ctx)?.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval(rhs, ctx)?.is_truthy()))
        }
        _ => {
            let l = eval(lhs, ctx)?;
            let r = eval(rhs, ctx)?;
            eval_binary_values(op, l, r)
        }
    }
}

fn eval_binary_values(op: BinaryOp, l: Value, r: Value) -> Result<Value, RenderError> {
    use BinaryOp::*;
    match op {
        Eq => Ok(Value::Bool(values_equal(&l, &r))),
        Ne => Ok(Value::Bool(!values_equal(&l, &r))),
        Lt | Le | Gt | Ge => {
            let ord = partial_compare(&l, &r)
                .ok_or_else(|| RenderError::runtime("cannot compare these two values"))?;
            let result = match op {
                Lt => ord.is_lt(),
                Le => ord.is_le(),
                Gt => ord.is_gt(),
                Ge => ord.is_ge(),
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
        Add => match (&l, &r) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (Value::List(a), Value::List(b)) => {
                let mut items = a.clone();
                items.extend(b.clone());
                Ok(Value::List(items))
            }
            _ => numeric_binary(op, &l, &r),
        },
        Sub | Mul | Div | Mod => numeric_binary(op, &l, &r),
        And | Or => unreachable!("short-circuit operators handled in eval_binary"),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => a.as_f64() == b.as_f64(),
        _ => a == b,
    }
}

fn numeric_binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, RenderError> {
    use BinaryOp::*;
    if matches!(l, Value::Int(_)) && matches!(r, Value::Int(_)) {
        let a = l.as_i64().unwrap();
        let b = r.as_i64().unwrap();
        return match op {
            Add => Ok(Value::Int(a.wrapping_add(b))),
            Sub => Ok(Value::Int(a.wrapping_sub(b))),
            Mul => Ok(Value::Int(a.wrapping_mul(b))),
            Div if b == 0 => Err(RenderError::runtime("division by zero")),
            Div => Ok(Value::Int(a / b)),
            Mod if b == 0 => Err(RenderError::runtime("modulo by zero")),
            Mod => Ok(Value::Int(a % b)),
            _ => unreachable!(),
        };
    }
    let a = l.as_f64().ok_or_else(|| RenderError::runtime("arithmetic on a non-numeric value"))?;
    let b = r.as_f64().ok_or_else(|| RenderError::runtime("arithmetic on a non-numeric value"))?;
    match op {
        Add => Ok(Value::Float(a + b)),
        Sub => Ok(Value::Float(a - b)),
        Mul => Ok(Value::Float(a * b)),
        Div => Ok(Value::Float(a / b)),
        Mod => Ok(Value::Float(a % b)),
        _ => unreachable!(),
    }
}

fn eval_comprehension(
    kind: ComprehensionKind,
    var: &str,
    iterable: &Expr,
    body: &Expr,
    ctx: &EvalContext,
) -> Result<Value, RenderError> {
    let iterable_val = eval(iterable, ctx)?;
    let Value::List(items) = iterable_val else {
        return Err(RenderError::runtime("comprehension receiver must be a list"));
    };

    match kind {
        ComprehensionKind::Map => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let scoped = ctx.with_binding(var, item);
                out.push(eval(body, &scoped)?);
            }
            Ok(Value::List(out))
        }
        ComprehensionKind::Filter => {
            let mut out = Vec::new();
            for item in items {
                let scoped = ctx.with_binding(var, item.clone());
                if eval(body, &scoped)?.is_truthy() {
                    out.push(item);
                }
            }
            Ok(Value::List(out))
        }
        ComprehensionKind::Exists => {
            for item in items {
                let scoped = ctx.with_binding(var, item);
                if eval(body, &scoped)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        ComprehensionKind::All => {
            for item in items {
                let scoped = ctx.with_binding(var, item);
                if !eval(body, &scoped)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
    }
}

fn eval_method(receiver: &Expr, method: &str, args: &[Expr], ctx: &EvalContext) -> Result<Value, RenderError> {
    let receiver_val = eval(receiver, ctx)?;
    match method {
        "envFrom" => container_env_from(&receiver_val),
        "volumeMounts" => container_volume_mounts(&receiver_val, ctx),
        "volumes" => container_volumes(&receiver_val, ctx),
        _ => {
            let mut call_args = Vec::with_capacity(args.len() + 1);
            call_args.push(receiver_val);
            for arg in args {
                call_args.push(eval(arg, ctx)?);
            }
            functions::call(method, call_args)
        }
    }
}

/// `envFrom` member overload: turns a list of `{configMap?, secret?,
/// prefix?}` descriptors into Kubernetes-shaped `envFrom` entries.
fn container_env_from(receiver: &Value) -> Result<Value, RenderError> {
    let Value::List(entries) = receiver else {
        return Err(RenderError::runtime(
            "envFrom() requires a list of {configMap|secret, prefix?} entries",
        ));
    };
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let mut fields = Vec::new();
        if let Some(name) = entry.get("configMap").and_then(Value::as_str) {
            fields.push(("configMapRef".to_string(), name_ref(name)));
        }
        if let Some(name) = entry.get("secret").and_then(Value::as_str) {
            fields.push(("secretRef".to_string(), name_ref(name)));
        }
        if let Some(prefix) = entry.get("prefix").and_then(Value::as_str) {
            fields.push(("prefix".to_string(), Value::String(prefix.to_string())));
        }
        out.push(Value::Map(fields));
    }
    Ok(Value::List(out))
}

/// `volumeMounts` member overload: `{path, mode?, configMap?, secret?}` to
/// a mount entry named after the resource and a hash of the mount path, so
/// repeated renders of the same component produce stable names.
fn container_volume_mounts(receiver: &Value, ctx: &EvalContext) -> Result<Value, RenderError> {
    let Value::List(entries) = receiver else {
        return Err(RenderError::runtime(
            "volumeMounts() requires a list of {path, mode?} entries",
        ));
    };
    let base = ctx.metadata_name().unwrap_or_else(|| "resource".to_string());
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let path = entry
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| RenderError::runtime("volumeMounts() entry is missing `path`"))?;
        let mut fields = vec![
            ("name".to_string(), Value::String(mount_name(&base, path))),
            ("mountPath".to_string(), Value::String(path.to_string())),
        ];
        if let Some(mode) = entry.get("mode").and_then(Value::as_str) {
            fields.push(("readOnly".to_string(), Value::Bool(mode == "ro")));
        }
        out.push(Value::Map(fields));
    }
    Ok(Value::List(out))
}

/// `volumes` member overload: the volume-source half of the same
/// `{path, configMap?, secret?}` descriptors `volumeMounts` consumes.
fn container_volumes(receiver: &Value, ctx: &EvalContext) -> Result<Value, RenderError> {
    let Value::List(entries) = receiver else {
        return Err(RenderError::runtime(
            "volumes() requires a list of {path, configMap|secret} entries",
        ));
    };
    let base = ctx.metadata_name().unwrap_or_else(|| "resource".to_string());
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let path = entry
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| RenderError::runtime("volumes() entry is missing `path`"))?;
        let mut fields = vec![("name".to_string(), Value::String(mount_name(&base, path)))];
        if let Some(name) = entry.get("configMap").and_then(Value::as_str) {
            fields.push(("configMap".to_string(), name_ref(name)));
        }
        if let Some(name) = entry.get("secret").and_then(Value::as_str) {
            fields.push(("secret".to_string(), Value::Map(vec![(
                "secretName".to_string(),
                Value::String(name.to_string()),
            )])));
        }
        out.push(Value::Map(fields));
    }
    Ok(Value::List(out))
}

fn name_ref(name: &str) -> Value {
    Value::Map(vec![("name".to_string(), Value::String(name.to_string()))])
}

fn mount_name(base: &str, path: &str) -> String {
    format!("{base}-file-mount-{}", functions::fnv1a32_hex(path))
}
