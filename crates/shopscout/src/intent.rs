//! Intent classification over a few-shot prompted chat model.
//!
//! The classifier is pure given its inputs (utterance + exemplar library),
//! modulo the external model's nondeterminism. Output parsing is strict:
//! a missing `<output>` tag is a format error, a tag outside the closed
//! taxonomy is a rejection — both surface to the orchestrator, which routes
//! the turn to the help path.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AssistantError, Result};
use crate::llm::ChatModel;
use crate::types::Intent;

static OUTPUT_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<output>(.*?)</output>").expect("output tag regex is valid"));

/// A labeled few-shot exemplar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledExample {
    pub input: String,
    pub output: String,
}

impl LabeledExample {
    /// Load an exemplar library from a JSON file of `{input, output}` pairs.
    pub fn library_from_file(path: &Path) -> std::result::Result<Vec<LabeledExample>, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read intent examples: {}", e))?;
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse intent examples: {}", e))
    }
}

const PROMPT_PREFIX: &str = r#"<context>
You are an AI assistant designed to classify user messages into one of six categories based on their content.
</context>
<classes>
Greetings: The user initiates the conversation with a greeting or seeks general assistance.
    Indicators:
        General salutations or questions about how you can help.
        Unrelated to any product and no specific information requested.
Product Search: The user wants to find specific products based on detailed criteria or filters.
    Indicators:
        Mentions of specific attributes of the product.
        Direct requests to see products that meet certain specifications.
Information Retrieval: The user seeks detailed information about a particular product.
    Indicators:
        Questions about ingredients, features, or specifics of a product.
        Inquiries that require factual data or descriptions.
Reviews and Ratings: The user asks about customer feedback, reviews, or ratings of a product.
    Indicators:
        Requests for opinions, ratings, or what others think about a product.
        Interest in the product's reputation or user satisfaction.
Comparison: The user wants to compare multiple products or find alternatives.
    Indicators:
        Questions that involve comparing features, prices, or effectiveness.
        Seeking substitutes or similar products.
Recommendation: The user seeks personalized suggestions or explores broad product categories.
    Indicators:
        Open-ended requests for advice or suggestions.
        Attributes are not mentioned.
        Interest in popular, new, or suitable products without specific filters.
        Queries about gifts or products for special occasions.
</classes>
<examples>"#;

const PROMPT_SUFFIX: &str = r#"</examples>
<instructions>
Task: Classify the user's message into one of the six categories.
How to Classify:
    Read the user's message carefully.
    Identify intent based on the descriptions and indicators.
    Match the message to the most appropriate category.
Output Format: <output>category_name</output>
If No Match: return <output>noclass</output>.
If the user is ending the conversation: return <output>bye</output>.
</instructions>"#;

pub struct IntentClassifier {
    model: Arc<dyn ChatModel>,
    examples: Vec<LabeledExample>,
}

impl IntentClassifier {
    pub fn new(model: Arc<dyn ChatModel>, examples: Vec<LabeledExample>) -> Self {
        Self { model, examples }
    }

    /// Default exemplar library covering every taxonomy member, used when no
    /// external library is supplied.
    pub fn builtin_examples() -> Vec<LabeledExample> {
        let pairs: &[(&str, &str)] = &[
            ("Hi there, what can you do?", "greetings"),
            ("Hello!", "greetings"),
            (
                "I'm looking for a sulfate-free shampoo under $20",
                "product_search",
            ),
            (
                "Show me a vitamin C serum with SPF 30 that is vegan",
                "product_search",
            ),
            ("What are the ingredients of this moisturizer?", "information_retrieval"),
            ("How do I apply the second product?", "information_retrieval"),
            ("What do customers say about this one?", "reviews"),
            ("Is the first product highly rated?", "reviews"),
            ("How does the first shampoo compare to the second?", "comparison"),
            ("Which of these two is better for oily skin?", "comparison"),
            (
                "I have dry skin, what products do you recommend?",
                "recommendation",
            ),
            (
                "I need a gift for my mom who loves skincare",
                "recommendation",
            ),
            ("Thanks, goodbye!", "bye"),
            ("That's all, bye", "bye"),
            ("What's the weather like today?", "noclass"),
            ("Tell me a joke", "noclass"),
        ];
        pairs
            .iter()
            .map(|(input, output)| LabeledExample {
                input: (*input).to_string(),
                output: (*output).to_string(),
            })
            .collect()
    }

    fn build_prompt(&self, utterance: &str) -> String {
        let mut prompt = String::with_capacity(4096);
        prompt.push_str(PROMPT_PREFIX);
        for example in &self.examples {
            prompt.push_str(&format!(
                "\n<input>{}</input>\n<output>{}</output>",
                example.input, example.output
            ));
        }
        prompt.push('\n');
        prompt.push_str(PROMPT_SUFFIX);
        prompt.push_str(&format!("\n\n<input>{}</input>\n", utterance));
        prompt
    }

    pub async fn classify(&self, utterance: &str) -> Result<Intent> {
        let prompt = self.build_prompt(utterance);
        let output = self.model.complete(&prompt).await?;
        let intent = parse_intent(&output)?;
        tracing::debug!(intent = intent.as_label(), "classified utterance");
        Ok(intent)
    }
}

/// Extract and validate the `<output>` tag from the classifier's response.
pub(crate) fn parse_intent(output: &str) -> Result<Intent> {
    let captures =
        OUTPUT_TAG_RE
            .captures(output)
            .ok_or_else(|| AssistantError::ClassificationFormat {
                output: output.chars().take(200).collect(),
            })?;
    let label = captures[1].trim().to_string();
    Intent::from_label(&label).ok_or(AssistantError::ClassificationRejected { label })
}
