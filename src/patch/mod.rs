//! The Patch Engine: an extended JSON-Patch executor (spec.md §4) layered
//! over RFC 6902 semantics via the `json-patch` crate.

pub mod engine;
pub mod ops;
pub mod path;

pub use engine::{apply_patch, AddonPatch, RawOperation};
pub use ops::{Op, Operation};
