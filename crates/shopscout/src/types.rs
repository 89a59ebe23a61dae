//! Core domain types shared across the assistant pipelines.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Conversation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Closed set of user intents. Classifier output outside this set is an
/// error, never silently coerced into a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greetings,
    ProductSearch,
    InformationRetrieval,
    Reviews,
    Comparison,
    Recommendation,
    Bye,
    Noclass,
}

impl Intent {
    pub const ALL: [Intent; 8] = [
        Intent::Greetings,
        Intent::ProductSearch,
        Intent::InformationRetrieval,
        Intent::Reviews,
        Intent::Comparison,
        Intent::Recommendation,
        Intent::Bye,
        Intent::Noclass,
    ];

    /// Parse a classifier label. Returns `None` for anything outside the
    /// taxonomy — the caller decides whether that is a rejection error.
    pub fn from_label(label: &str) -> Option<Intent> {
        match label {
            "greetings" => Some(Intent::Greetings),
            "product_search" => Some(Intent::ProductSearch),
            "information_retrieval" => Some(Intent::InformationRetrieval),
            "reviews" => Some(Intent::Reviews),
            "comparison" => Some(Intent::Comparison),
            "recommendation" => Some(Intent::Recommendation),
            "bye" => Some(Intent::Bye),
            "noclass" => Some(Intent::Noclass),
            _ => None,
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            Intent::Greetings => "greetings",
            Intent::ProductSearch => "product_search",
            Intent::InformationRetrieval => "information_retrieval",
            Intent::Reviews => "reviews",
            Intent::Comparison => "comparison",
            Intent::Recommendation => "recommendation",
            Intent::Bye => "bye",
            Intent::Noclass => "noclass",
        }
    }
}

// ============================================================================
// Entity filter
// ============================================================================

/// Structured product filter extracted from a search/recommendation query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityFilter {
    /// Head term, e.g. "moisturizer", "shampoo". Always present.
    pub category: String,
    /// Named attributes such as SPF=30 or vegan=true.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub price_range: Option<PriceRange>,
    /// Keywords associated with the product, excluding the head term.
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Raw price constraint as extracted. Both keys present is a permitted
/// shape; `effective()` applies the precedence policy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PriceRange {
    pub lt: Option<f64>,
    pub around: Option<f64>,
}

impl PriceRange {
    /// Resolve to the single honored constraint: `lt` wins when both are set.
    pub fn effective(&self) -> Option<PriceFilter> {
        if let Some(limit) = self.lt {
            Some(PriceFilter::LessThan(limit))
        } else {
            self.around.map(PriceFilter::Around)
        }
    }
}

/// The single price constraint a pipeline honors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceFilter {
    /// Exclusive upper bound on the raw product price.
    LessThan(f64),
    /// Approximate target, tested against the product's precomputed
    /// price-bucket bounds rather than the raw price.
    Around(f64),
}

impl PriceFilter {
    /// Membership test used by in-memory stores and tests. `bucket` is the
    /// product's `(lower_limit, upper_limit)` price bucket.
    pub fn admits(&self, price: f64, bucket: (f64, f64)) -> bool {
        match self {
            PriceFilter::LessThan(limit) => price < *limit,
            PriceFilter::Around(target) => bucket.0 <= *target && *target <= bucket.1,
        }
    }
}

// ============================================================================
// Rankings
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRanking {
    pub product_id: String,
    /// Whether the product survives the relevance judgment.
    pub keep: bool,
    /// Conversational explanation, 2-3 sentences by convention.
    pub explanation: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductRankingList {
    pub rankings: Vec<ProductRanking>,
}

impl ProductRankingList {
    pub fn len(&self) -> usize {
        self.rankings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rankings.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProductRanking> {
        self.rankings.iter()
    }

    /// Only keep=true entries are surfaced downstream.
    pub fn kept(&self) -> impl Iterator<Item = &ProductRanking> {
        self.rankings.iter().filter(|r| r.keep)
    }
}

// ============================================================================
// Catalog records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub name: String,
    pub value: String,
}

/// Per-product attributes and keywords, joined back from the store for
/// presentation to the ranking capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDetails {
    pub product_id: String,
    pub attributes: Vec<AttributeValue>,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSummary {
    pub product_id: String,
    pub summary: String,
}

/// Full descriptive record for single-product explanation flows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductOverview {
    pub product_id: String,
    pub title: String,
    pub average_rating: f64,
    pub rating_number: i64,
    pub features: String,
    pub description: String,
    pub attributes: Vec<AttributeValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub title: String,
    pub rating: f64,
    pub text: String,
}

/// A recommendation candidate with its weighted match score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub product_id: String,
    pub keyword_matches: i64,
    pub subcategory_matches: i64,
    pub score: i64,
}
