//! Renders a declarative component description — a workload, a component
//! definition, environment parameters, and a set of addons — into fully
//! materialized cluster resource manifests.
//!
//! The pipeline: Context Builder merges parameter sources, the Resource
//! Renderer expands each component's templates (`includeWhen`/`forEach`,
//! `${…}` interpolation, `omit()` pruning), then each addon gets its own
//! Context Builder pass and Patch Engine application against the
//! accumulated batch. [`pipeline::render`] is the sole entry point.

pub mod context;
pub mod error;
pub mod expr;
pub mod patch;
pub mod pipeline;
pub mod render;
pub mod schema;
pub mod template;
pub mod value;

pub use error::{RenderError, Result};
pub use pipeline::{render, AddonInput, RenderInput, RenderOptions, RenderOutput};
pub use value::Value;
