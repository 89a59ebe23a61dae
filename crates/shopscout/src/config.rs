//! Assistant configuration: pipeline limits, thresholds, and external-call
//! policy.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub search: SearchConfig,
    pub recommend: RecommendConfig,
    pub reference: ReferenceConfig,
    pub external: ExternalCallConfig,
}

/// Product-search pipeline knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Similarity floor when resolving the extracted category to catalog
    /// subcategories. Keeps unrelated subcategories out when the head term
    /// is ambiguous or misspelled.
    pub subcategory_threshold: f32,
    pub subcategory_limit: usize,
    /// First-stage (recall-oriented) retrieval size over summaries.
    pub retrieve_limit: usize,
    pub retrieve_threshold: f32,
    /// Second-stage (precision-oriented) rerank output size. Must not exceed
    /// `retrieve_limit`.
    pub rerank_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            subcategory_threshold: 0.9,
            subcategory_limit: 3,
            retrieve_limit: 20,
            retrieve_threshold: 0.9,
            rerank_limit: 10,
        }
    }
}

/// Recommendation pipeline knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendConfig {
    pub subcategory_limit: usize,
    pub subcategory_threshold: f32,
    pub usecase_limit: usize,
    pub usecase_threshold: f32,
    /// Use-case expansion is reranked down to this many entries before the
    /// store join.
    pub usecase_rerank_limit: usize,
    /// Per-keyword expansion fan-out.
    pub keyword_limit: usize,
    pub keyword_threshold: f32,
    /// The user always sees up to this many recommended items.
    pub max_products: usize,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            subcategory_limit: 2,
            subcategory_threshold: 0.9,
            usecase_limit: 20,
            usecase_threshold: 0.9,
            usecase_rerank_limit: 5,
            keyword_limit: 5,
            keyword_threshold: 0.9,
            max_products: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// How many messages before the current one are shown to the reference
    /// resolver — enough to include the most recent product listing.
    pub history_window: usize,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self { history_window: 4 }
    }
}

/// Timeout and retry policy applied at each external client's boundary.
/// Format errors from generative capabilities are never retried; only
/// transport failures (timeout, unreachable service) are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalCallConfig {
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ExternalCallConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            max_retries: 2,
            retry_backoff_ms: 250,
        }
    }
}

impl AssistantConfig {
    /// Validate config values, returning errors for clearly broken
    /// configurations.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.search.subcategory_threshold) {
            return Err("search.subcategory_threshold must be in [0.0, 1.0]".into());
        }
        if !(0.0..=1.0).contains(&self.search.retrieve_threshold) {
            return Err("search.retrieve_threshold must be in [0.0, 1.0]".into());
        }
        if self.search.retrieve_limit == 0 || self.search.rerank_limit == 0 {
            return Err("search retrieval limits must be > 0".into());
        }
        if self.search.rerank_limit > self.search.retrieve_limit {
            return Err("search.rerank_limit must be <= retrieve_limit".into());
        }
        if self.recommend.max_products == 0 {
            return Err("recommend.max_products must be > 0".into());
        }
        if self.recommend.usecase_rerank_limit > self.recommend.usecase_limit {
            return Err("recommend.usecase_rerank_limit must be <= usecase_limit".into());
        }
        if self.reference.history_window == 0 {
            return Err("reference.history_window must be > 0".into());
        }
        if self.external.request_timeout_ms == 0 {
            return Err("external.request_timeout_ms must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing
    /// fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self =
            serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AssistantConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rerank_limit_cannot_exceed_retrieve_limit() {
        let mut config = AssistantConfig::default();
        config.search.rerank_limit = config.search.retrieve_limit + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let mut config = AssistantConfig::default();
        config.search.subcategory_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
