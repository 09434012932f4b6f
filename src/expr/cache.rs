//! Concurrent compiled-expression cache. Spec.md §5 calls out the compiled
//! form as the one piece of state a renderer may share safely across
//! parallel reads; the teacher already reaches for `DashMap` in
//! `dag::walker` and `executor::engine::EvalContext` for exactly this kind
//! of shared, read-heavy cache.

use std::sync::Arc;

use dashmap::DashMap;

use super::ast::Expr;
use super::parser;
use crate::error::RenderError;

/// Caches parsed `${…}` bodies keyed by their source text. Parsing an
/// expression is pure and the AST is immutable once built, so concurrent
/// renders can safely share compiled forms through `Arc`.
#[derive(Default)]
pub struct ExprCache {
    compiled: DashMap<String, Arc<Expr>>,
}

impl ExprCache {
    pub fn new() -> Self {
        ExprCache { compiled: DashMap::new() }
    }

    /// Returns the cached AST for `src`, parsing and inserting it on a
    /// miss. A `TemplateCompile` error from a malformed expression is
    /// never cached, so a caller fixing the template and retrying doesn't
    /// need to work around a poisoned cache entry.
    pub fn compile(&self, src: &str) -> Result<Arc<Expr>, RenderError> {
        if let Some(existing) = self.compiled.get(src) {
            return Ok(Arc::clone(&existing));
        }
        let expr = Arc::new(parser::parse(src)?);
        self.compiled.insert(src.to_string(), Arc::clone(&expr));
        Ok(expr)
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_once_and_reuses() {
        let cache = ExprCache::new();
        let first = cache.compile("parameters.cpu").unwrap();
        let second = cache.compile("parameters.cpu").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn does_not_cache_compile_errors() {
        let cache = ExprCache::new();
        assert!(cache.compile("..").is_err());
        assert!(cache.is_empty());
    }
}
