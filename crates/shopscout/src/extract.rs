//! Entity extraction: utterance -> structured product filter.

use std::sync::Arc;

use crate::error::{AssistantError, Result};
use crate::llm::{extract_json, ChatModel};
use crate::types::EntityFilter;

const EXTRACTION_PROMPT: &str = r#"Parse the user query into a product filter.

Return ONLY a JSON object with exactly these fields:
{"category": "...", "attributes": {...}, "price_range": {...}, "keywords": [...]}

- category: the product head term, e.g. "moisturizer", "shampoo", "sunscreen". Always required.
- attributes: named product attributes mentioned in the query, e.g. {"SPF": 30, "vegan": true}. Omit or use {} when none.
- price_range: {"lt": N} for "under/less than N dollars", {"around": N} for "about/around N dollars". Omit or use null when no price is mentioned.
- keywords: descriptive terms associated with the product, excluding the head term, e.g. ["hydrating", "waterproof"]. Use [] when none.

Output ONLY the JSON object, nothing else."#;

pub struct EntityExtractor {
    model: Arc<dyn ChatModel>,
}

impl EntityExtractor {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Extract a filter from the utterance. Malformed model output is an
    /// `ExtractionFormat` error, propagated to the caller — never retried
    /// here.
    pub async fn extract(&self, utterance: &str) -> Result<EntityFilter> {
        let prompt = format!("{}\n\n<query>{}</query>", EXTRACTION_PROMPT, utterance);
        let raw = self.model.complete(&prompt).await?;
        let filter = parse_entity_filter(&raw)?;
        tracing::debug!(
            category = %filter.category,
            keywords = ?filter.keywords,
            "extracted entities"
        );
        Ok(filter)
    }
}

pub(crate) fn parse_entity_filter(raw: &str) -> Result<EntityFilter> {
    let payload = extract_json(raw);
    let filter: EntityFilter =
        serde_json::from_str(payload).map_err(|e| AssistantError::ExtractionFormat {
            reason: e.to_string(),
        })?;
    if filter.category.trim().is_empty() {
        return Err(AssistantError::ExtractionFormat {
            reason: "category is required".into(),
        });
    }
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PriceFilter;

    #[test]
    fn test_parse_full_filter() {
        let raw = r#"{"category": "shampoo", "attributes": {"sulfate_free": true}, "price_range": {"around": 20}, "keywords": ["hair loss"]}"#;
        let filter = parse_entity_filter(raw).unwrap();
        assert_eq!(filter.category, "shampoo");
        assert_eq!(filter.keywords, vec!["hair loss"]);
        assert_eq!(
            filter.price_range.unwrap().effective(),
            Some(PriceFilter::Around(20.0))
        );
    }

    #[test]
    fn test_parse_fenced_output() {
        let raw = "```json\n{\"category\": \"serum\", \"keywords\": []}\n```";
        let filter = parse_entity_filter(raw).unwrap();
        assert_eq!(filter.category, "serum");
        assert!(filter.price_range.is_none());
    }

    #[test]
    fn test_null_price_range_is_accepted() {
        let raw = r#"{"category": "toner", "attributes": null, "price_range": null, "keywords": ["gentle"]}"#;
        // attributes: null would fail the map type — the extractor's schema
        // allows omission, so null maps are a format error while a null
        // price_range is fine.
        let filter = parse_entity_filter(r#"{"category": "toner", "price_range": null, "keywords": ["gentle"]}"#).unwrap();
        assert!(filter.price_range.is_none());
        assert!(parse_entity_filter(raw).is_err());
    }

    #[test]
    fn test_missing_category_is_format_error() {
        let err = parse_entity_filter(r#"{"keywords": ["vegan"]}"#).unwrap_err();
        assert!(matches!(err, AssistantError::ExtractionFormat { .. }));
    }

    #[test]
    fn test_blank_category_is_format_error() {
        let err = parse_entity_filter(r#"{"category": "  ", "keywords": []}"#).unwrap_err();
        assert!(matches!(err, AssistantError::ExtractionFormat { .. }));
    }

    #[test]
    fn test_garbage_output_is_format_error() {
        let err = parse_entity_filter("I couldn't parse that query.").unwrap_err();
        assert!(matches!(err, AssistantError::ExtractionFormat { .. }));
    }
}
