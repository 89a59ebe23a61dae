//! Resolution of "the first one"-style references into positions within the
//! product list last shown to the user.
//!
//! The model signals "no referent found" with -1 (single) or an empty list
//! (multiple). Fallback to the prior turn's stored value is pure policy and
//! lives in helpers the orchestrator-facing methods share with the tests.

use std::sync::Arc;

use serde::Deserialize;

use crate::error::{AssistantError, Result};
use crate::llm::{extract_json, ChatModel};
use crate::types::Message;

const SINGLE_PROMPT: &str = r#"You are a product assistant helping users find information about products you have previously shown them.
The conversation history contains the details of your interaction with the user, including a list of products you presented.

The user may refer to a product either by its title or by its position in the list (e.g., "the first product", "second item").
Determine which product the user is referring to and return its 0-based integer index in the list of products you provided earlier.

Return ONLY a JSON object: {"product_index": N}. If no referent is found, return {"product_index": -1}."#;

const MULTIPLE_PROMPT: &str = r#"You are a product assistant. The conversation history contains details about multiple products shown to the user.
The user can refer to a product by mentioning the product title directly or by referring to the position of the product.
Based on the user's query, return the 0-based integer indices of the products they are referring to.
A comparison needs at least two products, so return two or more indices when any are found.

Return ONLY a JSON object: {"product_references": [..]}. If none are found, return {"product_references": []}."#;

#[derive(Deserialize)]
struct SingleReference {
    product_index: i64,
}

#[derive(Deserialize)]
struct MultipleReferences {
    product_references: Vec<i64>,
}

pub struct ReferenceResolver {
    model: Arc<dyn ChatModel>,
}

impl ReferenceResolver {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Resolve a singular reference against the recent history. When the
    /// model finds nothing, the prior turn's index is substituted; with no
    /// prior either, this is `ReferenceNotFound`.
    pub async fn resolve_single(
        &self,
        history: &[Message],
        query: &str,
        prior: Option<usize>,
    ) -> Result<usize> {
        let prompt = build_prompt(SINGLE_PROMPT, history, query);
        let raw = self.model.complete(&prompt).await?;
        let resolved = parse_single(&raw)?;
        if resolved.is_none() {
            tracing::debug!(prior = ?prior, "no referent in query, falling back to prior index");
        }
        apply_single_fallback(resolved, prior)
    }

    /// Resolve a plural reference (comparison). Fewer than two resolved
    /// indices counts as not-found and triggers the same prior-value
    /// fallback.
    pub async fn resolve_multiple(
        &self,
        history: &[Message],
        query: &str,
        prior: Option<&[usize]>,
    ) -> Result<Vec<usize>> {
        let prompt = build_prompt(MULTIPLE_PROMPT, history, query);
        let raw = self.model.complete(&prompt).await?;
        let resolved = parse_multiple(&raw)?;
        if resolved.len() < 2 {
            tracing::debug!(
                resolved = ?resolved,
                prior = ?prior,
                "fewer than two referents, falling back to prior indices"
            );
        }
        apply_multiple_fallback(resolved, prior)
    }
}

fn build_prompt(instructions: &str, history: &[Message], query: &str) -> String {
    let history_block: String = history
        .iter()
        .map(|m| {
            let role = match m.role {
                crate::types::Role::User => "user",
                crate::types::Role::Assistant => "assistant",
            };
            format!("{}: {}", role, m.text)
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{}\n\n<history>\n{}\n</history>\n<query>{}</query>",
        instructions, history_block, query
    )
}

/// Parse the single-reference payload. -1 means "not found"; anything below
/// -1 is malformed.
pub(crate) fn parse_single(raw: &str) -> Result<Option<usize>> {
    let payload = extract_json(raw);
    let reference: SingleReference =
        serde_json::from_str(payload).map_err(|e| AssistantError::ExtractionFormat {
            reason: format!("reference output: {}", e),
        })?;
    match reference.product_index {
        -1 => Ok(None),
        index if index >= 0 => Ok(Some(index as usize)),
        other => Err(AssistantError::ExtractionFormat {
            reason: format!("product index must be >= -1, got {}", other),
        }),
    }
}

pub(crate) fn parse_multiple(raw: &str) -> Result<Vec<usize>> {
    let payload = extract_json(raw);
    let references: MultipleReferences =
        serde_json::from_str(payload).map_err(|e| AssistantError::ExtractionFormat {
            reason: format!("reference list output: {}", e),
        })?;
    references
        .product_references
        .into_iter()
        .map(|index| {
            if index >= 0 {
                Ok(index as usize)
            } else {
                Err(AssistantError::ExtractionFormat {
                    reason: format!("product indices must be >= 0, got {}", index),
                })
            }
        })
        .collect()
}

pub(crate) fn apply_single_fallback(
    resolved: Option<usize>,
    prior: Option<usize>,
) -> Result<usize> {
    resolved.or(prior).ok_or(AssistantError::ReferenceNotFound)
}

pub(crate) fn apply_multiple_fallback(
    resolved: Vec<usize>,
    prior: Option<&[usize]>,
) -> Result<Vec<usize>> {
    if resolved.len() >= 2 {
        return Ok(resolved);
    }
    match prior {
        Some(indices) if indices.len() >= 2 => Ok(indices.to_vec()),
        _ => Err(AssistantError::ReferenceNotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_found() {
        assert_eq!(parse_single(r#"{"product_index": 2}"#).unwrap(), Some(2));
    }

    #[test]
    fn test_parse_single_not_found() {
        assert_eq!(parse_single(r#"{"product_index": -1}"#).unwrap(), None);
    }

    #[test]
    fn test_parse_single_below_minus_one_is_malformed() {
        assert!(parse_single(r#"{"product_index": -3}"#).is_err());
    }

    #[test]
    fn test_parse_multiple() {
        assert_eq!(
            parse_multiple(r#"{"product_references": [0, 2]}"#).unwrap(),
            vec![0, 2]
        );
        assert!(parse_multiple(r#"{"product_references": []}"#)
            .unwrap()
            .is_empty());
        assert!(parse_multiple(r#"{"product_references": [1, -2]}"#).is_err());
    }

    #[test]
    fn test_single_fallback_prefers_fresh_resolution() {
        assert_eq!(apply_single_fallback(Some(1), Some(0)).unwrap(), 1);
    }

    #[test]
    fn test_single_fallback_uses_prior_when_unresolved() {
        assert_eq!(apply_single_fallback(None, Some(3)).unwrap(), 3);
    }

    #[test]
    fn test_single_fallback_without_prior_is_not_found() {
        assert!(matches!(
            apply_single_fallback(None, None),
            Err(AssistantError::ReferenceNotFound)
        ));
    }

    #[test]
    fn test_multiple_fallback_requires_at_least_two() {
        // A lone index is not enough for a comparison — prior wins.
        let prior = [0usize, 1];
        assert_eq!(
            apply_multiple_fallback(vec![2], Some(&prior)).unwrap(),
            vec![0, 1]
        );
        // A prior with one entry is equally unusable.
        let short_prior = [4usize];
        assert!(matches!(
            apply_multiple_fallback(vec![], Some(&short_prior)),
            Err(AssistantError::ReferenceNotFound)
        ));
    }

    #[test]
    fn test_multiple_fallback_keeps_fresh_pair() {
        assert_eq!(
            apply_multiple_fallback(vec![1, 3], Some(&[0, 2])).unwrap(),
            vec![1, 3]
        );
    }

    #[test]
    fn test_prompt_includes_history_roles() {
        let history = vec![
            Message::user("show me sunscreens"),
            Message::assistant("1. Alpha SPF 50\n2. Beta SPF 30"),
        ];
        let prompt = build_prompt(SINGLE_PROMPT, &history, "tell me about the first one");
        assert!(prompt.contains("user: show me sunscreens"));
        assert!(prompt.contains("assistant: 1. Alpha SPF 50"));
        assert!(prompt.contains("<query>tell me about the first one</query>"));
    }
}
