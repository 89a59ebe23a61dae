//! Product search pipeline: resolve the category to catalog subcategories,
//! filter the structured store, retrieve-then-rerank, and join details back
//! for presentation.
//!
//! Two stages because the first-stage retriever is tuned for recall and the
//! reranker for precision; rerank input stays bounded at the retrieve limit.

use std::sync::Arc;

use crate::catalog::{CatalogStore, Reranker, SemanticIndex};
use crate::config::SearchConfig;
use crate::error::Result;
use crate::types::{EntityFilter, PriceRange, ProductDetails};

pub struct CandidateRetriever {
    subcategories: Arc<dyn SemanticIndex>,
    summaries: Arc<dyn SemanticIndex>,
    store: Arc<dyn CatalogStore>,
    reranker: Arc<dyn Reranker>,
    config: SearchConfig,
}

impl CandidateRetriever {
    pub fn new(
        subcategories: Arc<dyn SemanticIndex>,
        summaries: Arc<dyn SemanticIndex>,
        store: Arc<dyn CatalogStore>,
        reranker: Arc<dyn Reranker>,
        config: SearchConfig,
    ) -> Self {
        Self {
            subcategories,
            summaries,
            store,
            reranker,
            config,
        }
    }

    /// Resolve the extracted category to matching catalog subcategories. The
    /// similarity threshold keeps unrelated subcategories out when the head
    /// term is ambiguous or misspelled.
    pub async fn matching_subcategories(
        &self,
        category: &str,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<String>> {
        let hits = self
            .subcategories
            .search(category, None, limit, threshold)
            .await?;
        Ok(hits.into_iter().map(|h| h.document).collect())
    }

    /// Stage 1 retrieve (recall) restricted to the candidate ids, stage 2
    /// rerank (precision) down to `rerank_limit`. Returns ids in reranked
    /// order. An empty candidate set short-circuits to an empty result.
    pub async fn retrieve_and_rerank(
        &self,
        query: &str,
        candidate_ids: &[String],
        rerank_limit: usize,
    ) -> Result<Vec<String>> {
        if candidate_ids.is_empty() {
            return Ok(Vec::new());
        }

        let hits = self
            .summaries
            .search(
                query,
                Some(candidate_ids),
                self.config.retrieve_limit,
                self.config.retrieve_threshold,
            )
            .await?;

        // Keep documents and ids aligned: a hit without a product id in its
        // payload cannot be mapped back and is dropped before reranking.
        let mut documents = Vec::with_capacity(hits.len());
        let mut ordered_ids = Vec::with_capacity(hits.len());
        for hit in hits {
            if let Some(id) = hit.product_id {
                documents.push(hit.document);
                ordered_ids.push(id);
            }
        }
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let reranked = self
            .reranker
            .rerank(query, &documents, rerank_limit)
            .await?;

        Ok(reranked
            .into_iter()
            .filter_map(|hit| ordered_ids.get(hit.index).cloned())
            .collect())
    }

    /// The full product-search candidate pipeline: subcategory match, then
    /// the price-filtered store query, then retrieve-then-rerank. An empty
    /// result at any stage propagates as an empty final list, a valid
    /// zero-result outcome rather than a fault.
    pub async fn search_candidates(
        &self,
        query: &str,
        entities: &EntityFilter,
    ) -> Result<Vec<String>> {
        let matched = self
            .matching_subcategories(
                &entities.category,
                self.config.subcategory_limit,
                self.config.subcategory_threshold,
            )
            .await?;
        if matched.is_empty() {
            tracing::debug!(category = %entities.category, "no subcategories matched");
            return Ok(Vec::new());
        }

        let price = entities.price_range.as_ref().and_then(PriceRange::effective);
        let candidates = self
            .store
            .products_in_subcategories(&matched, price.as_ref())
            .await?;
        tracing::debug!(
            subcategories = matched.len(),
            candidates = candidates.len(),
            "structured store filter complete"
        );

        self.retrieve_and_rerank(query, &candidates, self.config.rerank_limit)
            .await
    }
}

/// Build the ranking query from the extracted entities rather than the raw
/// utterance: "I'm looking for a {category} with {a=b} that is {k1, k2}".
pub fn build_search_query(entities: &EntityFilter) -> String {
    let mut query = format!("I'm looking for a {}", entities.category);
    if !entities.attributes.is_empty() {
        let attributes: Vec<String> = entities
            .attributes
            .iter()
            .map(|(name, value)| format!("{}={}", name, display_value(value)))
            .collect();
        query.push_str(&format!(" with {}", attributes.join(";")));
    }
    if !entities.keywords.is_empty() {
        query.push_str(&format!(" that is {}", entities.keywords.join(", ")));
    }
    query
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Format the per-product detail blocks handed to the ranking capability.
pub fn format_product_details(details: &[ProductDetails]) -> String {
    details
        .iter()
        .map(|product| {
            let attributes: Vec<String> = product
                .attributes
                .iter()
                .map(|a| format!("{}={}", a.name, a.value))
                .collect();
            format!(
                "product_id: {}\nattributes: {}\nkeywords: {}",
                product.product_id,
                attributes.join(";"),
                product.keywords.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::testing::{FakeIndex, FakeReranker, InMemoryCatalog};
    use crate::types::AttributeValue;

    fn retriever(
        subcategories: FakeIndex,
        summaries: FakeIndex,
        store: InMemoryCatalog,
    ) -> CandidateRetriever {
        CandidateRetriever::new(
            Arc::new(subcategories),
            Arc::new(summaries),
            Arc::new(store),
            Arc::new(FakeReranker::identity()),
            SearchConfig::default(),
        )
    }

    fn entities(category: &str) -> EntityFilter {
        EntityFilter {
            category: category.into(),
            attributes: Default::default(),
            price_range: None,
            keywords: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_no_matched_subcategories_yields_empty_candidates() {
        let retriever = retriever(
            FakeIndex::empty(),
            FakeIndex::empty(),
            InMemoryCatalog::default(),
        );
        let ids = retriever
            .search_candidates("anything", &entities("flux capacitor"))
            .await
            .unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_search_pipeline_orders_by_rerank() {
        let mut store = InMemoryCatalog::default();
        store.add_product("p1", "Shampoos", 12.0, (10.0, 15.0));
        store.add_product("p2", "Shampoos", 18.0, (15.0, 20.0));

        let subcategories = FakeIndex::with_documents(vec!["Shampoos"]);
        let summaries = FakeIndex::with_products(vec![
            ("a gentle shampoo", "p1"),
            ("a strong shampoo", "p2"),
        ]);

        let retriever = CandidateRetriever::new(
            Arc::new(subcategories),
            Arc::new(summaries),
            Arc::new(store),
            // Reversed order proves the reranker decides the final ordering.
            Arc::new(FakeReranker::reversed()),
            SearchConfig::default(),
        );

        let ids = retriever
            .search_candidates("shampoo", &entities("shampoo"))
            .await
            .unwrap();
        assert_eq!(ids, vec!["p2", "p1"]);
    }

    #[tokio::test]
    async fn test_price_lt_filter_is_strict() {
        let mut store = InMemoryCatalog::default();
        store.add_product("cheap", "Shampoos", 19.99, (15.0, 20.0));
        store.add_product("exact", "Shampoos", 20.0, (15.0, 25.0));

        let retriever = retriever(
            FakeIndex::with_documents(vec!["Shampoos"]),
            FakeIndex::with_products(vec![("cheap one", "cheap"), ("exact one", "exact")]),
            store,
        );

        let mut filter = entities("shampoo");
        filter.price_range = Some(crate::types::PriceRange {
            lt: Some(20.0),
            around: None,
        });
        let ids = retriever
            .search_candidates("shampoo", &filter)
            .await
            .unwrap();
        assert_eq!(ids, vec!["cheap"]);
    }

    #[tokio::test]
    async fn test_price_around_uses_buckets() {
        let mut store = InMemoryCatalog::default();
        store.add_product("near", "Creams", 27.0, (25.0, 35.0));
        store.add_product("far", "Creams", 45.0, (40.0, 50.0));

        let retriever = retriever(
            FakeIndex::with_documents(vec!["Creams"]),
            FakeIndex::with_products(vec![("near cream", "near"), ("far cream", "far")]),
            store,
        );

        let mut filter = entities("cream");
        filter.price_range = Some(crate::types::PriceRange {
            lt: None,
            around: Some(30.0),
        });
        let ids = retriever.search_candidates("cream", &filter).await.unwrap();
        assert_eq!(ids, vec!["near"]);
    }

    #[tokio::test]
    async fn test_retrieve_and_rerank_drops_hits_without_product_id() {
        let summaries = FakeIndex::with_hits(vec![
            ("labeled doc", Some("p1")),
            ("unlabeled doc", None),
        ]);
        let retriever = retriever(FakeIndex::empty(), summaries, InMemoryCatalog::default());
        let ids = retriever
            .retrieve_and_rerank("query", &["p1".to_string(), "p2".to_string()], 10)
            .await
            .unwrap();
        assert_eq!(ids, vec!["p1"]);
    }

    #[test]
    fn test_build_search_query_composition() {
        let mut filter = entities("moisturizer");
        filter
            .attributes
            .insert("SPF".into(), serde_json::json!(30));
        filter.keywords = vec!["hydrating".into(), "fragrance-free".into()];
        assert_eq!(
            build_search_query(&filter),
            "I'm looking for a moisturizer with SPF=30 that is hydrating, fragrance-free"
        );
    }

    #[test]
    fn test_build_search_query_category_only() {
        assert_eq!(
            build_search_query(&entities("toner")),
            "I'm looking for a toner"
        );
    }

    #[test]
    fn test_format_product_details_blocks() {
        let details = vec![ProductDetails {
            product_id: "p1".into(),
            attributes: vec![AttributeValue {
                name: "vegan".into(),
                value: "true".into(),
            }],
            keywords: vec!["gentle".into(), "daily".into()],
        }];
        let block = format_product_details(&details);
        assert!(block.contains("product_id: p1"));
        assert!(block.contains("attributes: vegan=true"));
        assert!(block.contains("keywords: gentle, daily"));
    }
}
