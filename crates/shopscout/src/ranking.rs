//! Rank-and-explain: judge candidate products against the user query and
//! format the kept entries for display.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AssistantError, Result};
use crate::llm::{extract_json, ChatModel};
use crate::types::ProductRankingList;

const RANKING_PROMPT: &str = r#"I want to find some products for my query: "{query}".
I have shortlisted some products from my initial search.
<products>{products}</products>
Please tell me whether each product is a good match for my query and a short explanation for your answer based on my query.
Ensure the explanation is concise (2-3 sentences max).
Good Explanation: This product is a facial serum that is a good option for sensitive skin and cruelty-free. It addresses common skincare concerns like redness and blemishes.
Bad Explanation: This product is a facial serum that is under $50, making it a good match for the query. It is designed to calm breakouts, heal blemishes, and reduce redness, which are common concerns for facial skin. The product is also fragrance-free and cruelty-free, which may be a plus for some users. It is suitable for all skin types, including oily and sensitive skin, which makes it a versatile option.
**Important**: A concise explanation improves response efficiency and clarity.

Return ONLY a JSON object:
{"rankings": [{"product_id": "...", "keep": true, "explanation": "..."}, ...]}"#;

pub struct RelevanceRanker {
    model: Arc<dyn ChatModel>,
}

impl RelevanceRanker {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Rank the candidate block against the query. An empty block is a valid
    /// zero-candidate input and yields an empty ranking without a model
    /// call.
    pub async fn rank(&self, query: &str, product_block: &str) -> Result<ProductRankingList> {
        if product_block.trim().is_empty() {
            return Ok(ProductRankingList::default());
        }
        let prompt = RANKING_PROMPT
            .replace("{query}", query)
            .replace("{products}", product_block);
        let raw = self.model.complete(&prompt).await?;
        let rankings = parse_ranking_list(&raw)?;
        tracing::debug!(
            total = rankings.len(),
            kept = rankings.kept().count(),
            "ranking complete"
        );
        Ok(rankings)
    }
}

/// Parse the ranking payload. Accepts the wrapped `{"rankings": [...]}` form
/// and a bare array.
pub(crate) fn parse_ranking_list(raw: &str) -> Result<ProductRankingList> {
    let payload = extract_json(raw);
    if let Ok(list) = serde_json::from_str::<ProductRankingList>(payload) {
        return Ok(list);
    }
    serde_json::from_str(payload)
        .map(|rankings| ProductRankingList { rankings })
        .map_err(|e| AssistantError::RankingFormat {
            reason: e.to_string(),
        })
}

pub fn product_link(product_id: &str) -> String {
    format!("https://www.amazon.com/dp/{}", product_id)
}

/// One display line per kept product: `[title](link): explanation`. Zero
/// kept entries yields an empty body. A missing title falls back to the
/// product id rather than inventing a placeholder line.
pub fn format_ranked(rankings: &ProductRankingList, titles: &HashMap<String, String>) -> String {
    rankings
        .kept()
        .map(|ranking| {
            let title = titles
                .get(&ranking.product_id)
                .map(String::as_str)
                .unwrap_or(&ranking.product_id);
            format!(
                "[{}]({}): {}",
                title,
                product_link(&ranking.product_id),
                ranking.explanation
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProductRanking;

    #[test]
    fn test_parse_wrapped_rankings() {
        let raw = r#"{"rankings": [{"product_id": "p1", "keep": true, "explanation": "fits"}]}"#;
        let list = parse_ranking_list(raw).unwrap();
        assert_eq!(list.len(), 1);
        assert!(list.rankings[0].keep);
    }

    #[test]
    fn test_parse_bare_array() {
        let raw = r#"[{"product_id": "p1", "keep": false, "explanation": "too pricey"}]"#;
        let list = parse_ranking_list(raw).unwrap();
        assert_eq!(list.len(), 1);
        assert!(!list.rankings[0].keep);
    }

    #[test]
    fn test_parse_fenced_rankings() {
        let raw = "```json\n{\"rankings\": []}\n```";
        assert!(parse_ranking_list(raw).unwrap().is_empty());
    }

    #[test]
    fn test_parse_garbage_is_ranking_format_error() {
        let err = parse_ranking_list("these all look great!").unwrap_err();
        assert!(matches!(err, AssistantError::RankingFormat { .. }));
    }

    #[test]
    fn test_format_zero_kept_is_empty_body() {
        let list = ProductRankingList {
            rankings: vec![ProductRanking {
                product_id: "p1".into(),
                keep: false,
                explanation: "not a match".into(),
            }],
        };
        assert_eq!(format_ranked(&list, &HashMap::new()), "");
    }

    #[test]
    fn test_format_kept_lines() {
        let list = ProductRankingList {
            rankings: vec![
                ProductRanking {
                    product_id: "B07H8QMZWV".into(),
                    keep: true,
                    explanation: "Contains epsom salt for muscle relaxation.".into(),
                },
                ProductRanking {
                    product_id: "B000000000".into(),
                    keep: false,
                    explanation: "Wrong category.".into(),
                },
            ],
        };
        let mut titles = HashMap::new();
        titles.insert("B07H8QMZWV".to_string(), "Epsom Bath Salts".to_string());
        let body = format_ranked(&list, &titles);
        assert_eq!(
            body,
            "[Epsom Bath Salts](https://www.amazon.com/dp/B07H8QMZWV): Contains epsom salt for muscle relaxation."
        );
    }

    #[test]
    fn test_format_falls_back_to_id_when_title_missing() {
        let list = ProductRankingList {
            rankings: vec![ProductRanking {
                product_id: "p9".into(),
                keep: true,
                explanation: "ok".into(),
            }],
        };
        let body = format_ranked(&list, &HashMap::new());
        assert!(body.starts_with("[p9]("));
    }
}
