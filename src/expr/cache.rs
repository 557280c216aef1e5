use moka::future::Cache;
use std::sync::Arc;

use super::{Expr, ExprError, parse};

/// Parsed expressions keyed by their raw text.
///
/// Editing a rule changes its text, so the next lookup misses and re-parses;
/// the superseded entry ages out under the capacity bound. Parse failures
/// are not cached.
#[derive(Clone)]
pub struct ExpressionCache {
    parsed: Cache<String, Arc<Expr>>,
}

impl ExpressionCache {
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            parsed: Cache::builder().max_capacity(capacity).build(),
        }
    }

    /// Return the cached parse of `text`, parsing it on a miss.
    ///
    /// # Errors
    ///
    /// Returns `ExprError::Parse` if `text` is malformed.
    pub async fn get_or_parse(&self, text: &str) -> Result<Arc<Expr>, ExprError> {
        if let Some(expr) = self.parsed.get(text).await {
            tracing::trace!(expression = %text, "expression_cache_hit");
            return Ok(expr);
        }

        let expr = Arc::new(parse(text)?);
        self.parsed.insert(text.to_string(), expr.clone()).await;
        tracing::debug!(expression = %text, "expression_cache_stored");
        Ok(expr)
    }

    /// Drop the cached parse of `text`.
    pub async fn invalidate(&self, text: &str) {
        self.parsed.invalidate(text).await;
    }

    #[must_use]
    pub fn contains(&self, text: &str) -> bool {
        self.parsed.contains_key(text)
    }
}
