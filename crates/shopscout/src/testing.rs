//! In-memory fakes injected through the capability trait seams.
//!
//! Compiled for tests only. Each fake is deliberately small: scripted
//! responses for the chat model, fixed hit lists for the semantic indexes,
//! and a catalog that applies the same price policy the real store queries
//! encode.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::catalog::{CatalogStore, RerankHit, Reranker, SemanticHit, SemanticIndex};
use crate::error::{AssistantError, Result};
use crate::llm::ChatModel;
use crate::types::{
    PriceFilter, ProductDetails, ProductOverview, ProductSummary, ReviewEntry, ScoredCandidate,
};

// ============================================================================
// Chat model
// ============================================================================

/// Returns queued responses in order; exhaustion and the `failing` variant
/// surface as transient unavailability.
pub(crate) struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    delay: Option<Duration>,
    fail: bool,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            delay: None,
            fail: false,
        }
    }

    pub fn single(response: impl Into<String>) -> Self {
        Self::new([response.into()])
    }

    /// Repeatedly returns the same response, pausing first — used to prove
    /// per-session turn serialization.
    pub fn slow(response: impl Into<String>, delay: Duration) -> Self {
        let text: String = response.into();
        Self {
            responses: Mutex::new(std::iter::repeat(text).take(16).collect()),
            delay: Some(delay),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            delay: None,
            fail: true,
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(AssistantError::Unavailable {
                service: "chat model",
                reason: "scripted failure".into(),
            });
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(AssistantError::Unavailable {
                service: "chat model",
                reason: "script exhausted".into(),
            })
    }
}

// ============================================================================
// Semantic index
// ============================================================================

pub(crate) struct FakeIndex {
    hits: Vec<(String, Option<String>)>,
}

impl FakeIndex {
    pub fn empty() -> Self {
        Self { hits: Vec::new() }
    }

    /// Hits without product ids (subcategory/usecase/keyword collections).
    pub fn with_documents(documents: Vec<&str>) -> Self {
        Self {
            hits: documents.into_iter().map(|d| (d.to_string(), None)).collect(),
        }
    }

    /// Hits carrying product ids (summary collection).
    pub fn with_products(pairs: Vec<(&str, &str)>) -> Self {
        Self {
            hits: pairs
                .into_iter()
                .map(|(doc, id)| (doc.to_string(), Some(id.to_string())))
                .collect(),
        }
    }

    pub fn with_hits(pairs: Vec<(&str, Option<&str>)>) -> Self {
        Self {
            hits: pairs
                .into_iter()
                .map(|(doc, id)| (doc.to_string(), id.map(str::to_string)))
                .collect(),
        }
    }
}

#[async_trait]
impl SemanticIndex for FakeIndex {
    async fn search(
        &self,
        _text: &str,
        restrict: Option<&[String]>,
        limit: usize,
        _threshold: f32,
    ) -> Result<Vec<SemanticHit>> {
        let hits = self
            .hits
            .iter()
            .filter(|(_, id)| match (restrict, id) {
                (Some(allowed), Some(id)) => allowed.contains(id),
                (Some(_), None) => true,
                (None, _) => true,
            })
            .take(limit)
            .map(|(document, product_id)| SemanticHit {
                document: document.clone(),
                score: 0.95,
                product_id: product_id.clone(),
            })
            .collect();
        Ok(hits)
    }
}

// ============================================================================
// Reranker
// ============================================================================

pub(crate) struct FakeReranker {
    reversed: bool,
}

impl FakeReranker {
    /// Keeps the retrieval order.
    pub fn identity() -> Self {
        Self { reversed: false }
    }

    /// Reverses the retrieval order, so tests can prove the reranker's
    /// ordering wins over the retriever's.
    pub fn reversed() -> Self {
        Self { reversed: true }
    }
}

#[async_trait]
impl Reranker for FakeReranker {
    async fn rerank(
        &self,
        _query: &str,
        documents: &[String],
        limit: usize,
    ) -> Result<Vec<RerankHit>> {
        let mut order: Vec<usize> = (0..documents.len()).collect();
        if self.reversed {
            order.reverse();
        }
        Ok(order
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(rank, index)| RerankHit {
                index,
                score: 1.0 - rank as f32 * 0.01,
            })
            .collect())
    }
}

// ============================================================================
// Catalog store
// ============================================================================

#[derive(Clone)]
struct FakeProduct {
    id: String,
    subcategory: String,
    price: f64,
    bucket: (f64, f64),
    title: String,
    summary: String,
    reviews: Vec<ReviewEntry>,
}

/// Applies the same price policy as the real store's bound queries.
#[derive(Clone, Default)]
pub(crate) struct InMemoryCatalog {
    products: Vec<FakeProduct>,
    scored: Vec<ScoredCandidate>,
}

impl InMemoryCatalog {
    pub fn add_product(&mut self, id: &str, subcategory: &str, price: f64, bucket: (f64, f64)) {
        self.products.push(FakeProduct {
            id: id.to_string(),
            subcategory: subcategory.to_string(),
            price,
            bucket,
            title: format!("Title of {}", id),
            summary: format!("Summary of {}", id),
            reviews: Vec::new(),
        });
    }

    pub fn set_scored(&mut self, scored: Vec<ScoredCandidate>) {
        self.scored = scored;
    }

    pub fn add_review(&mut self, product_id: &str, title: &str, rating: f64, text: &str) {
        if let Some(product) = self.products.iter_mut().find(|p| p.id == product_id) {
            product.reviews.push(ReviewEntry {
                title: title.to_string(),
                rating,
                text: text.to_string(),
            });
        }
    }

    fn find(&self, product_id: &str) -> Result<&FakeProduct> {
        self.products
            .iter()
            .find(|p| p.id == product_id)
            .ok_or_else(|| AssistantError::StoreQuery(format!("no product with id {}", product_id)))
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn products_in_subcategories(
        &self,
        subcategories: &[String],
        price: Option<&PriceFilter>,
    ) -> Result<Vec<String>> {
        Ok(self
            .products
            .iter()
            .filter(|p| subcategories.contains(&p.subcategory))
            .filter(|p| price.map_or(true, |filter| filter.admits(p.price, p.bucket)))
            .map(|p| p.id.clone())
            .collect())
    }

    async fn score_candidates(
        &self,
        _subcategories: &[String],
        _usecases: &[String],
        _keywords: &[String],
        _price: Option<&PriceFilter>,
    ) -> Result<Vec<ScoredCandidate>> {
        Ok(self.scored.clone())
    }

    async fn product_details(&self, product_ids: &[String]) -> Result<Vec<ProductDetails>> {
        Ok(product_ids
            .iter()
            .filter_map(|id| self.find(id).ok())
            .map(|p| ProductDetails {
                product_id: p.id.clone(),
                attributes: Vec::new(),
                keywords: Vec::new(),
            })
            .collect())
    }

    async fn product_summaries(&self, product_ids: &[String]) -> Result<Vec<ProductSummary>> {
        Ok(product_ids
            .iter()
            .filter_map(|id| self.find(id).ok())
            .map(|p| ProductSummary {
                product_id: p.id.clone(),
                summary: p.summary.clone(),
            })
            .collect())
    }

    async fn product_titles(&self, product_ids: &[String]) -> Result<HashMap<String, String>> {
        Ok(product_ids
            .iter()
            .filter_map(|id| self.find(id).ok())
            .map(|p| (p.id.clone(), p.title.clone()))
            .collect())
    }

    async fn product_overview(&self, product_id: &str) -> Result<ProductOverview> {
        let product = self.find(product_id)?;
        Ok(ProductOverview {
            product_id: product.id.clone(),
            title: product.title.clone(),
            average_rating: 4.5,
            rating_number: 100,
            features: "features".into(),
            description: "description".into(),
            attributes: Vec::new(),
        })
    }

    async fn product_reviews(&self, product_id: &str) -> Result<Vec<ReviewEntry>> {
        Ok(self.find(product_id)?.reviews.clone())
    }
}
