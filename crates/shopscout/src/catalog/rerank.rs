//! Cross-encoder-style reranking over an HTTP rerank endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::with_retries;
use crate::config::ExternalCallConfig;
use crate::error::{AssistantError, Result};

const DEFAULT_ENDPOINT: &str = "https://api.jina.ai/v1/rerank";
const DEFAULT_MODEL: &str = "jina-reranker-v2-base-multilingual";

/// One reranked entry: the position of the document in the input slice and
/// its relevance score, ordered most relevant first.
#[derive(Debug, Clone)]
pub struct RerankHit {
    pub index: usize,
    pub score: f32,
}

#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, documents: &[String], limit: usize)
        -> Result<Vec<RerankHit>>;
}

pub struct JinaReranker {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    external: ExternalCallConfig,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

impl JinaReranker {
    pub fn new(api_key: String, external: ExternalCallConfig) -> Result<Self> {
        Self::with_endpoint(
            DEFAULT_ENDPOINT.to_string(),
            api_key,
            DEFAULT_MODEL.to_string(),
            external,
        )
    }

    pub fn with_endpoint(
        endpoint: String,
        api_key: String,
        model: String,
        external: ExternalCallConfig,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_millis(external.request_timeout_ms))
            .build()
            .map_err(|e| AssistantError::Unavailable {
                service: "reranker",
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            model,
            external,
        })
    }

    async fn rerank_once(
        &self,
        query: &str,
        documents: &[String],
        limit: usize,
    ) -> Result<Vec<RerankHit>> {
        let body = json!({
            "model": self.model,
            "query": query,
            "top_n": limit,
            "documents": documents,
        });

        let timeout = Duration::from_millis(self.external.request_timeout_ms);
        let send = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();

        let response = tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| AssistantError::Timeout {
                operation: "rerank",
                timeout_ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| AssistantError::Unavailable {
                service: "reranker",
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(300).collect();
            return Err(AssistantError::Unavailable {
                service: "reranker",
                reason: format!("HTTP {}: {}", status, preview),
            });
        }

        let parsed: RerankResponse =
            response
                .json()
                .await
                .map_err(|e| AssistantError::Unavailable {
                    service: "reranker",
                    reason: format!("unparseable rerank response: {}", e),
                })?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| RerankHit {
                index: r.index,
                score: r.relevance_score,
            })
            .collect())
    }
}

#[async_trait]
impl Reranker for JinaReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        limit: usize,
    ) -> Result<Vec<RerankHit>> {
        // Reranking nothing is trivially nothing — skip the round trip.
        if documents.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        with_retries("rerank", &self.external, || {
            self.rerank_once(query, documents, limit)
        })
        .await
    }
}
