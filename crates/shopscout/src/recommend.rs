//! Recommendation pipeline: three-way semantic expansion, weighted scoring
//! against the product graph, and tiered selection with backfill.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::catalog::{CatalogStore, Reranker, SemanticIndex};
use crate::config::RecommendConfig;
use crate::error::Result;
use crate::retrieval::CandidateRetriever;
use crate::types::{EntityFilter, PriceRange, ProductSummary, ScoredCandidate};

pub struct Recommender {
    usecases: Arc<dyn SemanticIndex>,
    keywords: Arc<dyn SemanticIndex>,
    store: Arc<dyn CatalogStore>,
    reranker: Arc<dyn Reranker>,
    retriever: Arc<CandidateRetriever>,
    config: RecommendConfig,
}

impl Recommender {
    pub fn new(
        usecases: Arc<dyn SemanticIndex>,
        keywords: Arc<dyn SemanticIndex>,
        store: Arc<dyn CatalogStore>,
        reranker: Arc<dyn Reranker>,
        retriever: Arc<CandidateRetriever>,
        config: RecommendConfig,
    ) -> Self {
        Self {
            usecases,
            keywords,
            store,
            reranker,
            retriever,
            config,
        }
    }

    /// Produce up to `max_products` candidate ids for the query. Higher
    /// score tiers are always preferred; the minimum-score tier only enters
    /// through retrieve-and-rerank backfill.
    pub async fn recommend_candidates(
        &self,
        query: &str,
        entities: &EntityFilter,
    ) -> Result<Vec<String>> {
        let seed_keywords = fold_attributes_into_keywords(entities);
        let price = entities.price_range.as_ref().and_then(PriceRange::effective);

        // The three expansion lookups are read-only and data-independent,
        // so they run concurrently.
        let (subcategories, usecases, keywords) = futures::try_join!(
            self.retriever.matching_subcategories(
                &entities.category,
                self.config.subcategory_limit,
                self.config.subcategory_threshold,
            ),
            self.expanded_usecases(query),
            self.expanded_keywords(&seed_keywords),
        )?;
        tracing::debug!(
            subcategories = subcategories.len(),
            usecases = usecases.len(),
            keywords = keywords.len(),
            "semantic expansion complete"
        );

        let scored = self
            .store
            .score_candidates(&subcategories, &usecases, &keywords, price.as_ref())
            .await?;
        if scored.is_empty() {
            return Ok(Vec::new());
        }

        let (mut picked, floor) = select_by_tier(&scored, self.config.max_products);
        if picked.len() < self.config.max_products && !floor.is_empty() {
            let need = self.config.max_products - picked.len();
            let backfill = self.retriever.retrieve_and_rerank(query, &floor, need).await?;
            tracing::debug!(
                qualified = picked.len(),
                backfilled = backfill.len(),
                "floor-tier backfill complete"
            );
            picked.extend(backfill);
        }
        Ok(picked)
    }

    /// Use-case expansion: broad semantic lookup, then reranked down so the
    /// store join stays precise.
    async fn expanded_usecases(&self, query: &str) -> Result<Vec<String>> {
        let hits = self
            .usecases
            .search(
                query,
                None,
                self.config.usecase_limit,
                self.config.usecase_threshold,
            )
            .await?;
        let documents: Vec<String> = hits.into_iter().map(|h| h.document).collect();
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let reranked = self
            .reranker
            .rerank(query, &documents, self.config.usecase_rerank_limit)
            .await?;
        Ok(reranked
            .into_iter()
            .filter_map(|hit| documents.get(hit.index).cloned())
            .collect())
    }

    /// Per-keyword expansion with a deduplicated, deterministic union.
    async fn expanded_keywords(&self, seed_keywords: &[String]) -> Result<Vec<String>> {
        let mut expanded = BTreeSet::new();
        for keyword in seed_keywords {
            let hits = self
                .keywords
                .search(
                    keyword,
                    None,
                    self.config.keyword_limit,
                    self.config.keyword_threshold,
                )
                .await?;
            expanded.extend(hits.into_iter().map(|h| h.document));
        }
        Ok(expanded.into_iter().collect())
    }
}

/// Recommendation queries fold entity attributes into the keyword list as
/// "name:value" terms before expansion.
pub(crate) fn fold_attributes_into_keywords(entities: &EntityFilter) -> Vec<String> {
    let mut keywords = entities.keywords.clone();
    for (name, value) in &entities.attributes {
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        keywords.push(format!("{}:{}", name, rendered));
    }
    keywords
}

/// Tier selection: every candidate scoring strictly above the minimum
/// observed score qualifies (capped); the minimum-score tier is returned
/// separately as the backfill pool. Candidates arrive ordered by score
/// descending, so truncation keeps the highest tiers.
pub(crate) fn select_by_tier(
    scored: &[ScoredCandidate],
    cap: usize,
) -> (Vec<String>, Vec<String>) {
    let min_score = match scored.iter().map(|c| c.score).min() {
        Some(min) => min,
        None => return (Vec::new(), Vec::new()),
    };
    let mut picked: Vec<String> = scored
        .iter()
        .filter(|c| c.score > min_score)
        .map(|c| c.product_id.clone())
        .collect();
    picked.truncate(cap);
    let floor: Vec<String> = scored
        .iter()
        .filter(|c| c.score == min_score)
        .map(|c| c.product_id.clone())
        .collect();
    (picked, floor)
}

/// Format the per-product summary blocks handed to the ranking capability.
pub fn format_product_summaries(summaries: &[ProductSummary]) -> String {
    summaries
        .iter()
        .map(|product| format!("{}\n{}", product.product_id, product.summary))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::testing::{FakeIndex, FakeReranker, InMemoryCatalog};

    fn candidate(id: &str, score: i64) -> ScoredCandidate {
        ScoredCandidate {
            product_id: id.into(),
            keyword_matches: 0,
            subcategory_matches: 0,
            score,
        }
    }

    #[test]
    fn test_tier_selection_excludes_floor_and_returns_it_for_backfill() {
        // Scores [9,9,6,6,6,3,3]: every 9 and 6 qualifies, the score-3 floor
        // is the backfill pool.
        let scored = vec![
            candidate("a", 9),
            candidate("b", 9),
            candidate("c", 6),
            candidate("d", 6),
            candidate("e", 6),
            candidate("f", 3),
            candidate("g", 3),
        ];
        let (picked, floor) = select_by_tier(&scored, 10);
        assert_eq!(picked, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(floor, vec!["f", "g"]);
    }

    #[test]
    fn test_tier_selection_caps_qualifying_candidates() {
        let scored: Vec<ScoredCandidate> = (0..15)
            .map(|i| candidate(&format!("p{}", i), if i < 12 { 10 } else { 1 }))
            .collect();
        let (picked, floor) = select_by_tier(&scored, 10);
        assert_eq!(picked.len(), 10);
        assert_eq!(floor.len(), 3);
    }

    #[test]
    fn test_tier_selection_all_tied_means_everything_is_floor() {
        let scored = vec![candidate("a", 5), candidate("b", 5)];
        let (picked, floor) = select_by_tier(&scored, 10);
        assert!(picked.is_empty());
        assert_eq!(floor, vec!["a", "b"]);
    }

    #[test]
    fn test_format_product_summaries_blocks() {
        let summaries = vec![
            ProductSummary {
                product_id: "p1".into(),
                summary: "A hydrating serum.".into(),
            },
            ProductSummary {
                product_id: "p2".into(),
                summary: "A rich night cream.".into(),
            },
        ];
        assert_eq!(
            format_product_summaries(&summaries),
            "p1\nA hydrating serum.\n\np2\nA rich night cream."
        );
        assert_eq!(format_product_summaries(&[]), "");
    }

    #[test]
    fn test_fold_attributes_into_keywords() {
        let mut entities = EntityFilter {
            category: "serum".into(),
            attributes: Default::default(),
            price_range: None,
            keywords: vec!["brightening".into()],
        };
        entities
            .attributes
            .insert("SPF".into(), serde_json::json!(30));
        entities
            .attributes
            .insert("vegan".into(), serde_json::json!(true));
        assert_eq!(
            fold_attributes_into_keywords(&entities),
            vec!["brightening", "SPF:30", "vegan:true"]
        );
    }

    #[tokio::test]
    async fn test_recommendation_backfills_from_floor_tier() {
        let mut store = InMemoryCatalog::default();
        // Two qualifying tiers (9 and 6) plus a floor tier of two items.
        store.set_scored(vec![
            candidate("a", 9),
            candidate("b", 9),
            candidate("c", 6),
            candidate("d", 6),
            candidate("e", 6),
            candidate("f", 3),
            candidate("g", 3),
        ]);

        let retriever = Arc::new(CandidateRetriever::new(
            Arc::new(FakeIndex::with_documents(vec!["Serums"])),
            Arc::new(FakeIndex::with_products(vec![
                ("floor item f", "f"),
                ("floor item g", "g"),
            ])),
            Arc::new(store.clone()),
            Arc::new(FakeReranker::identity()),
            SearchConfig::default(),
        ));
        let recommender = Recommender::new(
            Arc::new(FakeIndex::with_documents(vec!["gifting"])),
            Arc::new(FakeIndex::with_documents(vec!["brightening"])),
            Arc::new(store),
            Arc::new(FakeReranker::identity()),
            retriever,
            RecommendConfig::default(),
        );

        let entities = EntityFilter {
            category: "serum".into(),
            attributes: Default::default(),
            price_range: None,
            keywords: vec!["brightening".into()],
        };
        let ids = recommender
            .recommend_candidates("a brightening serum gift", &entities)
            .await
            .unwrap();
        // Five qualifying items, then exactly the two floor items backfilled.
        assert_eq!(ids, vec!["a", "b", "c", "d", "e", "f", "g"]);
    }

    #[tokio::test]
    async fn test_recommendation_with_no_scored_candidates_is_empty() {
        let store = InMemoryCatalog::default();
        let retriever = Arc::new(CandidateRetriever::new(
            Arc::new(FakeIndex::empty()),
            Arc::new(FakeIndex::empty()),
            Arc::new(store.clone()),
            Arc::new(FakeReranker::identity()),
            SearchConfig::default(),
        ));
        let recommender = Recommender::new(
            Arc::new(FakeIndex::empty()),
            Arc::new(FakeIndex::empty()),
            Arc::new(store),
            Arc::new(FakeReranker::identity()),
            retriever,
            RecommendConfig::default(),
        );
        let entities = EntityFilter {
            category: "widget".into(),
            attributes: Default::default(),
            price_range: None,
            keywords: Vec::new(),
        };
        let ids = recommender
            .recommend_candidates("anything", &entities)
            .await
            .unwrap();
        assert!(ids.is_empty());
    }
}
