//! The error taxonomy of spec.md §7, by kind rather than by language
//! construct. `RenderError::is_missing_data` is the `isMissingData`
//! predicate spec.md §4.1 requires callers (Renderer, Patch Engine) to have.

use thiserror::Error;

/// A single typed error surfaced anywhere in the rendering pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderError {
    /// Required input missing or a structural pre-condition unmet.
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// Conflicting property declarations or a malformed default literal.
    #[error("schema error: {0}")]
    Schema(String),

    /// An expression failed to parse or compile. An undeclared top-level
    /// variable is `MissingData`, not this — see spec.md §4.1.
    #[error("template compile error in `{expr}`: {message}")]
    TemplateCompile { expr: String, message: String },

    /// A type mismatch, arithmetic failure, or other non-missing-data
    /// evaluation failure.
    #[error("template runtime error: {0}")]
    TemplateRuntime(String),

    /// Compile-time unknown variable, or runtime absent field/index.
    /// Recovered locally by `includeWhen`, `where`, and (optionally)
    /// operation evaluation; otherwise propagates like any other error.
    #[error("missing data: {0}")]
    MissingData(String),

    /// A rendered resource lacks `apiVersion`/`kind`/`metadata.name` while
    /// `enableValidation` is on, or a warning was upgraded under
    /// `strictMode`.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown op, malformed path, out-of-bounds index, failed `test`,
    /// refused auto-create, or type mismatch at the patch target.
    #[error("patch error in addon `{addon}`: {message}")]
    Patch { addon: String, message: String },
}

impl RenderError {
    /// The `isMissingData(err)` predicate of spec.md §4.1.
    pub fn is_missing_data(&self) -> bool {
        matches!(self, RenderError::MissingData(_))
    }

    pub fn input_invalid(message: impl Into<String>) -> Self {
        RenderError::InputInvalid(message.into())
    }

    pub fn schema(message: impl Into<String>) -> Self {
        RenderError::Schema(message.into())
    }

    pub fn compile(expr: impl Into<String>, message: impl Into<String>) -> Self {
        RenderError::TemplateCompile { expr: expr.into(), message: message.into() }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        RenderError::TemplateRuntime(message.into())
    }

    pub fn missing(message: impl Into<String>) -> Self {
        RenderError::MissingData(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        RenderError::Validation(message.into())
    }

    pub fn patch(addon: impl Into<String>, message: impl Into<String>) -> Self {
        RenderError::Patch { addon: addon.into(), message: message.into() }
    }

    /// Wraps an error with a resource or patch identifier for diagnosis,
    /// per spec.md §7 ("wrapped with the resource or patch identifier").
    pub fn with_context(self, context: impl Into<String>) -> Self {
        let context = context.into();
        match self {
            RenderError::InputInvalid(m) => RenderError::InputInvalid(format!("{context}: {m}")),
            RenderError::Schema(m) => RenderError::Schema(format!("{context}: {m}")),
            RenderError::TemplateCompile { expr, message } => {
                RenderError::TemplateCompile { expr, message: format!("{context}: {message}") }
            }
            RenderError::TemplateRuntime(m) => {
                RenderError::TemplateRuntime(format!("{context}: {m}"))
            }
            RenderError::MissingData(m) => RenderError::MissingData(format!("{context}: {m}")),
            RenderError::Validation(m) => RenderError::Validation(format!("{context}: {m}")),
            RenderError::Patch { addon, message } => {
                RenderError::Patch { addon, message: format!("{context}: {message}") }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

/// Convenience for the graceful-skip policy: turns a missing-data error
/// into `Ok(default)`, propagates anything else.
pub fn recover_missing<T>(result: Result<T>, default: T) -> Result<T> {
    match result {
        Err(e) if e.is_missing_data() => Ok(default),
        other => other,
    }
}
