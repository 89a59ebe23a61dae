//! Parameter-bound Cypher implementation of the catalog store.
//!
//! Every value reaches the server through `Query::param` binding; query text
//! only ever varies between static clause variants (price constraint shape).

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use neo4rs::{query, Graph};
use serde::Deserialize;

use super::{with_retries, CatalogStore};
use crate::config::ExternalCallConfig;
use crate::error::{AssistantError, Result};
use crate::types::{
    AttributeValue, PriceFilter, ProductDetails, ProductOverview, ProductSummary, ReviewEntry,
    ScoredCandidate,
};

pub struct Neo4jCatalog {
    graph: Graph,
    external: ExternalCallConfig,
}

#[derive(Deserialize)]
struct RawAttribute {
    name: Option<String>,
    value: Option<String>,
}

impl Neo4jCatalog {
    pub async fn connect(
        uri: &str,
        user: &str,
        password: &str,
        external: ExternalCallConfig,
    ) -> Result<Self> {
        let graph =
            Graph::new(uri, user, password)
                .await
                .map_err(|e| AssistantError::Unavailable {
                    service: "catalog store",
                    reason: e.to_string(),
                })?;
        Ok(Self { graph, external })
    }

    /// Apply the per-call deadline to one query execution.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let timeout = Duration::from_millis(self.external.request_timeout_ms);
        tokio::time::timeout(timeout, work)
            .await
            .map_err(|_| AssistantError::Timeout {
                operation,
                timeout_ms: timeout.as_millis() as u64,
            })?
    }

    fn store_err(e: neo4rs::Error) -> AssistantError {
        AssistantError::StoreQuery(e.to_string())
    }

    fn de_err(e: neo4rs::DeError) -> AssistantError {
        AssistantError::StoreQuery(format!("row deserialization: {}", e))
    }

    fn collect_attributes(raw: Vec<RawAttribute>) -> Vec<AttributeValue> {
        raw.into_iter()
            .filter_map(|a| match (a.name, a.value) {
                (Some(name), Some(value)) => Some(AttributeValue { name, value }),
                _ => None,
            })
            .collect()
    }

    /// Attach the price constraint to a query: the clause text is one of two
    /// static variants, the values are always bound parameters.
    fn bind_price(q: neo4rs::Query, price: Option<&PriceFilter>) -> neo4rs::Query {
        match price {
            Some(PriceFilter::LessThan(limit)) => q.param("price_limit", *limit),
            Some(PriceFilter::Around(target)) => q.param("price_target", *target),
            None => q,
        }
    }
}

const PRODUCTS_NO_PRICE: &str = "MATCH (p:Product)-[:BELONGS_TO]->(sc:Subcategory) \
     WHERE sc.name IN $subcategories \
     RETURN p.product_id AS product_id";

const PRODUCTS_PRICE_LT: &str = "MATCH (p:Product)-[:BELONGS_TO]->(sc:Subcategory) \
     WHERE p.price < $price_limit AND sc.name IN $subcategories \
     RETURN p.product_id AS product_id";

const PRODUCTS_PRICE_AROUND: &str =
    "MATCH (p:Product)-[:BELONGS_TO]->(sc:Subcategory), (p)-[:AROUND_PRICE]->(pr:PriceRange) \
     WHERE $price_target >= pr.lower_limit AND $price_target <= pr.upper_limit \
       AND sc.name IN $subcategories \
     RETURN p.product_id AS product_id";

const SCORE_HEAD: &str = "MATCH (u:UseCase)-[:USED_FOR]->(s:Subcategory) \
     WHERE u.title IN $usecases \
     WITH collect(DISTINCT s.name) + $subcategories AS expanded_subcategories \
     MATCH (p:Product)-[:BELONGS_TO]->(s:Subcategory) \
     WHERE s.name IN expanded_subcategories \
     OPTIONAL MATCH (p)-[:HAS_KEYWORD]->(k:Keyword) \
     WHERE k.name IN $keywords \
     WITH p, count(DISTINCT k) AS keyword_matches, count(DISTINCT s) AS subcategory_matches ";

const SCORE_TAIL: &str = "RETURN p.product_id AS product_id, \
            keyword_matches, \
            subcategory_matches, \
            keyword_matches * 3 + subcategory_matches * 2 AS score \
     ORDER BY score DESC, keyword_matches DESC, subcategory_matches DESC";

#[async_trait]
impl CatalogStore for Neo4jCatalog {
    async fn products_in_subcategories(
        &self,
        subcategories: &[String],
        price: Option<&PriceFilter>,
    ) -> Result<Vec<String>> {
        if subcategories.is_empty() {
            return Ok(Vec::new());
        }
        let text = match price {
            None => PRODUCTS_NO_PRICE,
            Some(PriceFilter::LessThan(_)) => PRODUCTS_PRICE_LT,
            Some(PriceFilter::Around(_)) => PRODUCTS_PRICE_AROUND,
        };
        with_retries("products_in_subcategories", &self.external, || {
            self.bounded("products_in_subcategories", async {
                let q = Self::bind_price(
                    query(text).param("subcategories", subcategories.to_vec()),
                    price,
                );
                let mut stream = self.graph.execute(q).await.map_err(Self::store_err)?;
                let mut ids = Vec::new();
                while let Some(row) = stream.next().await.map_err(Self::store_err)? {
                    ids.push(row.get::<String>("product_id").map_err(Self::de_err)?);
                }
                Ok(ids)
            })
        })
        .await
    }

    async fn score_candidates(
        &self,
        subcategories: &[String],
        usecases: &[String],
        keywords: &[String],
        price: Option<&PriceFilter>,
    ) -> Result<Vec<ScoredCandidate>> {
        let price_clause = match price {
            None => "",
            Some(PriceFilter::LessThan(_)) => "WHERE p.price < $price_limit ",
            Some(PriceFilter::Around(_)) => {
                "MATCH (p)-[:AROUND_PRICE]->(pr:PriceRange) \
                 WHERE $price_target >= pr.lower_limit AND $price_target <= pr.upper_limit "
            }
        };
        let text = format!("{}{}{}", SCORE_HEAD, price_clause, SCORE_TAIL);

        with_retries("score_candidates", &self.external, || {
            self.bounded("score_candidates", async {
                let q = Self::bind_price(
                    query(&text)
                        .param("subcategories", subcategories.to_vec())
                        .param("usecases", usecases.to_vec())
                        .param("keywords", keywords.to_vec()),
                    price,
                );
                let mut stream = self.graph.execute(q).await.map_err(Self::store_err)?;
                let mut candidates = Vec::new();
                while let Some(row) = stream.next().await.map_err(Self::store_err)? {
                    candidates.push(ScoredCandidate {
                        product_id: row.get("product_id").map_err(Self::de_err)?,
                        keyword_matches: row.get("keyword_matches").map_err(Self::de_err)?,
                        subcategory_matches: row
                            .get("subcategory_matches")
                            .map_err(Self::de_err)?,
                        score: row.get("score").map_err(Self::de_err)?,
                    });
                }
                Ok(candidates)
            })
        })
        .await
    }

    async fn product_details(&self, product_ids: &[String]) -> Result<Vec<ProductDetails>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }
        const TEXT: &str = "MATCH (p:Product) \
             WHERE p.product_id IN $product_ids \
             OPTIONAL MATCH (p)-[:HAS_ATTRIBUTE]->(a:Attribute) \
             OPTIONAL MATCH (p)-[:HAS_KEYWORD]->(k:Keyword) \
             RETURN p.product_id AS product_id, \
                    collect(DISTINCT {name: a.name, value: a.value}) AS attributes, \
                    collect(DISTINCT k.name) AS keywords";
        with_retries("product_details", &self.external, || {
            self.bounded("product_details", async {
                let q = query(TEXT).param("product_ids", product_ids.to_vec());
                let mut stream = self.graph.execute(q).await.map_err(Self::store_err)?;
                let mut details = Vec::new();
                while let Some(row) = stream.next().await.map_err(Self::store_err)? {
                    let raw_attributes: Vec<RawAttribute> =
                        row.get("attributes").map_err(Self::de_err)?;
                    let keywords: Vec<Option<String>> =
                        row.get("keywords").map_err(Self::de_err)?;
                    details.push(ProductDetails {
                        product_id: row.get("product_id").map_err(Self::de_err)?,
                        attributes: Self::collect_attributes(raw_attributes),
                        keywords: keywords.into_iter().flatten().collect(),
                    });
                }
                Ok(details)
            })
        })
        .await
    }

    async fn product_summaries(&self, product_ids: &[String]) -> Result<Vec<ProductSummary>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }
        const TEXT: &str = "MATCH (p:Product) WHERE p.product_id IN $product_ids \
             RETURN p.product_id AS product_id, p.summary AS summary";
        with_retries("product_summaries", &self.external, || {
            self.bounded("product_summaries", async {
                let q = query(TEXT).param("product_ids", product_ids.to_vec());
                let mut stream = self.graph.execute(q).await.map_err(Self::store_err)?;
                let mut summaries = Vec::new();
                while let Some(row) = stream.next().await.map_err(Self::store_err)? {
                    summaries.push(ProductSummary {
                        product_id: row.get("product_id").map_err(Self::de_err)?,
                        summary: row.get("summary").map_err(Self::de_err)?,
                    });
                }
                Ok(summaries)
            })
        })
        .await
    }

    async fn product_titles(&self, product_ids: &[String]) -> Result<HashMap<String, String>> {
        if product_ids.is_empty() {
            return Ok(HashMap::new());
        }
        const TEXT: &str = "MATCH (p:Product) WHERE p.product_id IN $product_ids \
             RETURN p.product_id AS product_id, p.title AS title";
        with_retries("product_titles", &self.external, || {
            self.bounded("product_titles", async {
                let q = query(TEXT).param("product_ids", product_ids.to_vec());
                let mut stream = self.graph.execute(q).await.map_err(Self::store_err)?;
                let mut titles = HashMap::new();
                while let Some(row) = stream.next().await.map_err(Self::store_err)? {
                    titles.insert(
                        row.get::<String>("product_id").map_err(Self::de_err)?,
                        row.get::<String>("title").map_err(Self::de_err)?,
                    );
                }
                Ok(titles)
            })
        })
        .await
    }

    async fn product_overview(&self, product_id: &str) -> Result<ProductOverview> {
        const TEXT: &str = "MATCH (p:Product {product_id: $product_id}) \
             OPTIONAL MATCH (p)-[:HAS_ATTRIBUTE]->(a:Attribute) \
             RETURN p.product_id AS product_id, p.title AS title, \
                    p.average_rating AS average_rating, p.rating_number AS rating_number, \
                    p.features AS features, p.description AS description, \
                    collect(DISTINCT {name: a.name, value: a.value}) AS attributes";
        with_retries("product_overview", &self.external, || {
            self.bounded("product_overview", async {
                let q = query(TEXT).param("product_id", product_id);
                let mut stream = self.graph.execute(q).await.map_err(Self::store_err)?;
                let row = stream
                    .next()
                    .await
                    .map_err(Self::store_err)?
                    .ok_or_else(|| {
                        AssistantError::StoreQuery(format!("no product with id {}", product_id))
                    })?;
                let raw_attributes: Vec<RawAttribute> =
                    row.get("attributes").map_err(Self::de_err)?;
                Ok(ProductOverview {
                    product_id: row.get("product_id").map_err(Self::de_err)?,
                    title: row.get("title").map_err(Self::de_err)?,
                    average_rating: row.get("average_rating").map_err(Self::de_err)?,
                    rating_number: row.get("rating_number").map_err(Self::de_err)?,
                    features: row.get("features").map_err(Self::de_err)?,
                    description: row.get("description").map_err(Self::de_err)?,
                    attributes: Self::collect_attributes(raw_attributes),
                })
            })
        })
        .await
    }

    async fn product_reviews(&self, product_id: &str) -> Result<Vec<ReviewEntry>> {
        const TEXT: &str = "MATCH (p:Product {product_id: $product_id})<-[:REVIEWS]-(r:Review) \
             RETURN r.title AS title, r.rating AS rating, r.text AS text";
        with_retries("product_reviews", &self.external, || {
            self.bounded("product_reviews", async {
                let q = query(TEXT).param("product_id", product_id);
                let mut stream = self.graph.execute(q).await.map_err(Self::store_err)?;
                let mut reviews = Vec::new();
                while let Some(row) = stream.next().await.map_err(Self::store_err)? {
                    reviews.push(ReviewEntry {
                        title: row.get("title").map_err(Self::de_err)?,
                        rating: row.get("rating").map_err(Self::de_err)?,
                        text: row.get("text").map_err(Self::de_err)?,
                    });
                }
                Ok(reviews)
            })
        })
        .await
    }
}
