//! Chat completion seam and the OpenRouter client behind it.
//!
//! Every LLM stage goes through [`CompletionModel`], so stage logic can be
//! exercised without the network.

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::error::{PipelineError, Result};

/// A single-turn completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            prompt: prompt.into(),
            temperature: 0.7,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// The model's text plus the full response envelope.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub raw: Value,
}

#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
}

/// OpenAI-compatible client pointed at OpenRouter.
pub struct OpenRouterClient {
    api_key: Option<String>,
    client: Client<OpenAIConfig>,
}

impl OpenRouterClient {
    /// The key is only checked when a request is made.
    pub fn new(
        api_key: Option<String>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                PipelineError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        let config = OpenAIConfig::new()
            .with_api_key(api_key.clone().unwrap_or_default())
            .with_api_base(api_base.into());

        let client = Client::with_config(config).with_http_client(http_client);

        Ok(Self { api_key, client })
    }
}

impl std::fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl CompletionModel for OpenRouterClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        if self.api_key.is_none() {
            return Err(PipelineError::MissingConfig(
                crate::config::OPENROUTER_API_KEY_VAR,
            ));
        }

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system {
            messages.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage {
                    content: system.into(),
                    name: None,
                },
            ));
        }
        messages.push(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: request.prompt.into(),
                name: None,
            },
        ));

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&request.model)
            .temperature(request.temperature)
            .messages(messages)
            .build()?;

        tracing::debug!(model = %request.model, "sending chat completion");
        let response = self.client.chat().create(chat_request).await?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        let raw = serde_json::to_value(&response)?;

        Ok(Completion { content, raw })
    }
}

/// Strip reasoning blocks such as `<think>...</think>` that some models emit
/// ahead of their answer.
pub fn strip_reasoning(response: &str) -> String {
    let tags_to_strip = ["thinking", "think", "reasoning", "reflection", "scratchpad"];

    let mut result = response.to_string();
    for tag in &tags_to_strip {
        let pattern = format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag);
        if let Ok(re) = Regex::new(&pattern) {
            result = re.replace_all(&result, "").to_string();
        }
    }

    result.trim().to_string()
}

/// Reduce a model reply to the JSON it is supposed to contain.
///
/// Removes reasoning blocks and a surrounding Markdown code fence (with or
/// without a `json` language tag).
pub fn clean_json_reply(response: &str) -> String {
    let text = strip_reasoning(response);

    let Some(start) = text.find("```") else {
        return text;
    };
    let after = &text[start + 3..];
    let body = match after.find("```") {
        Some(end) => &after[..end],
        None => after,
    };
    let body = body
        .strip_prefix("json")
        .or_else(|| body.strip_prefix("JSON"))
        .unwrap_or(body);

    body.trim().to_string()
}

/// Parse a model reply as JSON, falling back to the outermost span
/// delimited by `open`/`close` when the reply has prose around it.
pub fn parse_json_reply<T: serde::de::DeserializeOwned>(
    response: &str,
    open: char,
    close: char,
) -> std::result::Result<T, serde_json::Error> {
    let cleaned = clean_json_reply(response);
    match serde_json::from_str(&cleaned) {
        Ok(value) => Ok(value),
        Err(first_err) => match (cleaned.find(open), cleaned.rfind(close)) {
            (Some(start), Some(end)) if start < end => {
                serde_json::from_str(&cleaned[start..=end]).map_err(|_| first_err)
            }
            _ => Err(first_err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion_body(content: &str) -> Value {
        serde_json::json!({
            "id": "gen-1",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "openai/gpt-4o",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop",
                "logprobs": null
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        })
    }

    #[test]
    fn test_strip_reasoning_tags() {
        let input = "<think>\nweighing options\n</think>[\"A\", \"B\"]";
        assert_eq!(strip_reasoning(input), "[\"A\", \"B\"]");
    }

    #[test]
    fn test_clean_json_reply_removes_fence() {
        let input = "```json\n[\"Tariffs\", \"SNAP\"]\n```";
        assert_eq!(clean_json_reply(input), "[\"Tariffs\", \"SNAP\"]");

        let bare = "```\n{\"a\": 1}\n```";
        assert_eq!(clean_json_reply(bare), "{\"a\": 1}");
    }

    #[test]
    fn test_clean_json_reply_plain_passthrough() {
        assert_eq!(clean_json_reply("  [1, 2]  "), "[1, 2]");
    }

    #[test]
    fn test_parse_json_reply_with_surrounding_prose() {
        let input = "Sure! Here are the categories: [\"Tariffs\", \"Housing\"] Hope this helps.";
        let labels: Vec<String> = parse_json_reply(input, '[', ']').unwrap();
        assert_eq!(labels, vec!["Tariffs", "Housing"]);
    }

    #[test]
    fn test_parse_json_reply_rejects_garbage() {
        let result: std::result::Result<Vec<String>, _> =
            parse_json_reply("no json here", '[', ']');
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_request() {
        let server = MockServer::start().await;
        let client = OpenRouterClient::new(None, server.uri(), Duration::from_secs(5)).unwrap();

        let err = client
            .complete(CompletionRequest::new("openai/gpt-4o", "hello"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::MissingConfig(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_complete_returns_content_and_raw_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Hello there")))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(
            Some("sk-test".to_string()),
            format!("{}/api/v1", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();

        let completion = client
            .complete(
                CompletionRequest::new("openai/gpt-4o", "hi")
                    .with_system("be brief")
                    .with_temperature(0.0),
            )
            .await
            .unwrap();

        assert_eq!(completion.content, "Hello there");
        assert_eq!(completion.raw["id"], "gen-1");

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["model"], "openai/gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[tokio::test]
    async fn test_client_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "message": "No auth credentials found", "type": null, "param": null, "code": 401 }
            })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(
            Some("sk-bad".to_string()),
            server.uri(),
            Duration::from_secs(5),
        )
        .unwrap();

        let result = client.complete(CompletionRequest::new("m", "hi")).await;
        assert!(result.is_err());
    }
}
