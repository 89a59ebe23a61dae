//! Catalog access: the structured product graph, semantic indexes, and the
//! rerank surface.
//!
//! Every surface is a trait with an explicitly constructed, injected
//! implementation — no global client singletons — so pipelines are testable
//! against in-memory fakes.

pub mod neo4j;
pub mod rerank;
pub mod semantic;

pub use neo4j::Neo4jCatalog;
pub use rerank::{JinaReranker, RerankHit, Reranker};
pub use semantic::{QdrantIndex, SemanticHit, SemanticIndex};

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ExternalCallConfig;
use crate::error::Result;
use crate::types::{
    PriceFilter, ProductDetails, ProductOverview, ProductSummary, ReviewEntry, ScoredCandidate,
};

/// Typed query surface over the product property graph.
///
/// Implementations must bind every value as a query parameter — never
/// interpolate list or scalar contents into query text.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Ids of all products belonging to any of the given subcategories,
    /// optionally narrowed by a price constraint. An empty result is a valid
    /// zero-candidate outcome, not an error.
    async fn products_in_subcategories(
        &self,
        subcategories: &[String],
        price: Option<&PriceFilter>,
    ) -> Result<Vec<String>>;

    /// Recommendation scoring join: expand subcategories through use-case
    /// relationships, count keyword/subcategory matches per product, and
    /// return candidates ordered by `3*keyword + 2*subcategory` descending.
    async fn score_candidates(
        &self,
        subcategories: &[String],
        usecases: &[String],
        keywords: &[String],
        price: Option<&PriceFilter>,
    ) -> Result<Vec<ScoredCandidate>>;

    /// Attributes and keywords for presentation, one record per id found.
    async fn product_details(&self, product_ids: &[String]) -> Result<Vec<ProductDetails>>;

    async fn product_summaries(&self, product_ids: &[String]) -> Result<Vec<ProductSummary>>;

    async fn product_titles(&self, product_ids: &[String]) -> Result<HashMap<String, String>>;

    async fn product_overview(&self, product_id: &str) -> Result<ProductOverview>;

    async fn product_reviews(&self, product_id: &str) -> Result<Vec<ReviewEntry>>;
}

/// Bounded retry with linear backoff, applied at the client boundary for
/// transient transport failures only. Format errors and query failures pass
/// straight through.
pub(crate) async fn with_retries<T, F, Fut>(
    operation: &'static str,
    policy: &ExternalCallConfig,
    call: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                tracing::warn!(
                    operation,
                    attempt,
                    error = %err,
                    "transient failure, retrying with backoff"
                );
                tokio::time::sleep(Duration::from_millis(
                    policy.retry_backoff_ms * attempt as u64,
                ))
                .await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssistantError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> ExternalCallConfig {
        ExternalCallConfig {
            request_timeout_ms: 1_000,
            max_retries: 2,
            retry_backoff_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retries("test op", &policy(), || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(AssistantError::Unavailable {
                        service: "test",
                        reason: "down".into(),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retries("test op", &policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(AssistantError::Timeout {
                    operation: "test",
                    timeout_ms: 1,
                })
            }
        })
        .await;
        assert!(result.is_err());
        // initial call + max_retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retries("test op", &policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AssistantError::StoreQuery("bad label".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
