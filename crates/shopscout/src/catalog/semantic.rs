//! Semantic search surface and its Qdrant implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{Condition, Document, Filter, Query, QueryPointsBuilder};
use qdrant_client::Qdrant;

use super::with_retries;
use crate::config::ExternalCallConfig;
use crate::error::{AssistantError, Result};

/// One semantic hit: the stored document text, its similarity score, and the
/// product id carried in the payload (absent for collections that index
/// non-product documents such as subcategory names or use cases).
#[derive(Debug, Clone)]
pub struct SemanticHit {
    pub document: String,
    pub score: f32,
    pub product_id: Option<String>,
}

#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Search the index. `restrict`, when present, limits hits to points
    /// whose `product_id` payload is in the given set.
    async fn search(
        &self,
        text: &str,
        restrict: Option<&[String]>,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SemanticHit>>;
}

/// Qdrant-backed index over one collection. The query text is embedded
/// server-side via the collection's configured inference model.
pub struct QdrantIndex {
    client: Arc<Qdrant>,
    collection: String,
    model: String,
    external: ExternalCallConfig,
}

impl QdrantIndex {
    pub fn new(
        client: Arc<Qdrant>,
        collection: impl Into<String>,
        model: impl Into<String>,
        external: ExternalCallConfig,
    ) -> Self {
        Self {
            client,
            collection: collection.into(),
            model: model.into(),
            external,
        }
    }

    async fn query_once(
        &self,
        text: &str,
        restrict: Option<&[String]>,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SemanticHit>> {
        let mut request = QueryPointsBuilder::new(&self.collection)
            .query(Query::new_nearest(Document::new(text, &self.model)))
            .limit(limit as u64)
            .score_threshold(threshold)
            .with_payload(true);

        if let Some(ids) = restrict {
            request = request.filter(Filter::must([Condition::matches(
                "product_id",
                ids.to_vec(),
            )]));
        }

        let timeout = Duration::from_millis(self.external.request_timeout_ms);
        let response = tokio::time::timeout(timeout, self.client.query(request))
            .await
            .map_err(|_| AssistantError::Timeout {
                operation: "semantic search",
                timeout_ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| AssistantError::Unavailable {
                service: "semantic index",
                reason: e.to_string(),
            })?;

        let hits = response
            .result
            .into_iter()
            .filter_map(|point| {
                let document = payload_str(&point.payload, "document")?;
                let product_id = payload_str(&point.payload, "product_id");
                Some(SemanticHit {
                    document,
                    score: point.score,
                    product_id,
                })
            })
            .collect();
        Ok(hits)
    }
}

fn payload_str(
    payload: &std::collections::HashMap<String, qdrant_client::qdrant::Value>,
    key: &str,
) -> Option<String> {
    match payload.get(key).and_then(|value| value.kind.as_ref()) {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

#[async_trait]
impl SemanticIndex for QdrantIndex {
    async fn search(
        &self,
        text: &str,
        restrict: Option<&[String]>,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SemanticHit>> {
        let hits = with_retries("semantic search", &self.external, || {
            self.query_once(text, restrict, limit, threshold)
        })
        .await?;
        tracing::debug!(
            collection = %self.collection,
            hits = hits.len(),
            threshold,
            "semantic search complete"
        );
        Ok(hits)
    }
}
