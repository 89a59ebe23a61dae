//! OpenAI-compatible chat completion client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::ChatModel;
use crate::config::ExternalCallConfig;
use crate::error::{AssistantError, Result};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiChat {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl OpenAiChat {
    pub fn new(api_key: String, model: String, external: &ExternalCallConfig) -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT.to_string(), api_key, model, external)
    }

    /// Point the client at any OpenAI-compatible endpoint (self-hosted
    /// gateways, compatible providers).
    pub fn with_endpoint(
        endpoint: String,
        api_key: String,
        model: String,
        external: &ExternalCallConfig,
    ) -> Result<Self> {
        let timeout = Duration::from_millis(external.request_timeout_ms);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(timeout)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| AssistantError::Unavailable {
                service: "chat model",
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            model,
            temperature: 0.2,
            max_tokens: 2048,
            timeout,
        })
    }

    /// Parse a response body as JSON, returning a clear error if the server
    /// returned HTML (proxy error pages, gateway timeouts).
    fn parse_body(&self, status: reqwest::StatusCode, body: &str) -> Result<String> {
        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(AssistantError::Unavailable {
                service: "chat model",
                reason: format!(
                    "endpoint returned HTML instead of JSON (HTTP {}): {}",
                    status, preview
                ),
            });
        }
        if !status.is_success() {
            let preview: String = trimmed.chars().take(300).collect();
            return Err(AssistantError::Unavailable {
                service: "chat model",
                reason: format!("HTTP {}: {}", status, preview),
            });
        }
        let completion: ChatCompletion =
            serde_json::from_str(body).map_err(|e| AssistantError::Unavailable {
                service: "chat model",
                reason: format!("unparseable completion response: {}", e),
            })?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AssistantError::Unavailable {
                service: "chat model",
                reason: "completion contained no choices".into(),
            })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let send = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();

        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| AssistantError::Timeout {
                operation: "chat completion",
                timeout_ms: self.timeout.as_millis() as u64,
            })?
            .map_err(|e| {
                if e.is_timeout() {
                    AssistantError::Timeout {
                        operation: "chat completion",
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    AssistantError::Unavailable {
                        service: "chat model",
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AssistantError::Unavailable {
                service: "chat model",
                reason: format!("failed to read response body: {}", e),
            })?;

        self.parse_body(status, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiChat {
        OpenAiChat::new(
            "test-key".into(),
            "gpt-4o".into(),
            &ExternalCallConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_body_extracts_first_choice() {
        let body = r#"{"choices":[{"message":{"content":"hello"}}]}"#;
        let content = client()
            .parse_body(reqwest::StatusCode::OK, body)
            .unwrap();
        assert_eq!(content, "hello");
    }

    #[test]
    fn test_parse_body_rejects_html_error_page() {
        let err = client()
            .parse_body(reqwest::StatusCode::BAD_GATEWAY, "<html>502</html>")
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_parse_body_rejects_empty_choices() {
        let err = client()
            .parse_body(reqwest::StatusCode::OK, r#"{"choices":[]}"#)
            .unwrap_err();
        assert!(matches!(err, AssistantError::Unavailable { .. }));
    }
}
