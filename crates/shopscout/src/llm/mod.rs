//! Chat model capability boundary.
//!
//! Every generative step (classification, extraction, reference resolution,
//! ranking, explanation) goes through the [`ChatModel`] trait so tests can
//! substitute scripted fakes and the orchestrator never touches a concrete
//! client.

pub mod openai;

pub use openai::OpenAiChat;

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a completion for a single prompt. Callers must tolerate
    /// differing outputs for identical input across calls.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Locate the JSON value inside a model response.
///
/// Handles common model quirks: markdown fences, prose before/after the
/// payload. Returns the slice between the outermost `{...}` or `[...]`
/// (whichever opens first), or the cleaned input when no boundaries are
/// found — the caller's serde parse decides whether that is an error.
pub fn extract_json(raw: &str) -> &str {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let object = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => Some((start, end)),
        _ => None,
    };
    let array = match (cleaned.find('['), cleaned.rfind(']')) {
        (Some(start), Some(end)) if end > start => Some((start, end)),
        _ => None,
    };

    match (object, array) {
        (Some((os, oe)), Some((as_, ae))) => {
            if as_ < os {
                &cleaned[as_..=ae]
            } else {
                &cleaned[os..=oe]
            }
        }
        (Some((start, end)), None) | (None, Some((start, end))) => &cleaned[start..=end],
        (None, None) => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain_object() {
        assert_eq!(extract_json(r#"{"a": 1}"#), r#"{"a": 1}"#);
    }

    #[test]
    fn test_extract_json_with_fences() {
        let raw = "```json\n{\"category\": \"shampoo\"}\n```";
        assert_eq!(extract_json(raw), r#"{"category": "shampoo"}"#);
    }

    #[test]
    fn test_extract_json_with_surrounding_prose() {
        let raw = r#"Here you go: {"keep": true} Hope that helps!"#;
        assert_eq!(extract_json(raw), r#"{"keep": true}"#);
    }

    #[test]
    fn test_extract_json_array() {
        let raw = "The indices are [0, 2].";
        assert_eq!(extract_json(raw), "[0, 2]");
    }

    #[test]
    fn test_extract_json_array_nested_in_object_prefers_object() {
        let raw = r#"{"product_references": [1, 2]}"#;
        assert_eq!(extract_json(raw), raw);
    }

    #[test]
    fn test_extract_json_no_payload_returns_cleaned_input() {
        assert_eq!(extract_json("  no json here  "), "no json here");
    }
}
