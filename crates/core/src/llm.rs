use crate::http::{ensure_success, join_endpoint};
use crate::traits::ChatModel;
use crate::AssistantError;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_CHAT_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_CHAT_MODEL: &str = "llama-3.3-70b-versatile";

#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl ChatClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_CHAT_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: None,
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions client. Defaults to Groq.
pub struct ChatClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl ChatClient {
    pub fn new(config: ChatClientConfig) -> Result<Self, AssistantError> {
        if config.api_key.trim().is_empty() {
            return Err(AssistantError::Request(
                "chat api key is missing".to_string(),
            ));
        }

        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            endpoint: join_endpoint(&config.base_url, "chat/completions")?,
            api_key: config.api_key,
            model: config.model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn complete(&self, prompt: &str) -> Result<String, AssistantError> {
        let request = CompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(model = %self.model, prompt_chars = prompt.chars().count(), "chat completion");
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let payload: CompletionResponse = ensure_success(response, "chat").await?.json().await?;
        first_choice_content(payload)
    }
}

fn first_choice_content(payload: CompletionResponse) -> Result<String, AssistantError> {
    payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| AssistantError::EmptyResponse("completion had no message content".to_string()))
}

fn delimiter_regex() -> &'static Regex {
    static DELIMITERS: OnceLock<Regex> = OnceLock::new();
    DELIMITERS.get_or_init(|| {
        Regex::new(r"(?s)<\|im_start\|>.*?<\|im_end\|>").expect("delimiter pattern is valid")
    })
}

/// Removes `<|im_start|> ... <|im_end|>` spans the model leaked into its answer.
pub fn strip_delimiters(text: &str) -> String {
    delimiter_regex().replace_all(text, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn strips_single_and_multiline_spans() {
        let raw = "<|im_start|>thought\nlet me think\n<|im_end|>The seal lasts 500 hours.";
        assert_eq!(strip_delimiters(raw), "The seal lasts 500 hours.");

        let raw = "A<|im_start|>x<|im_end|>B<|im_start|>y<|im_end|>C";
        assert_eq!(strip_delimiters(raw), "ABC");
    }

    #[test]
    fn unmatched_delimiters_are_left_alone() {
        let raw = "Answer <|im_start|> without end";
        assert_eq!(strip_delimiters(raw), raw);
    }

    #[test]
    fn completion_content_is_extracted() {
        let payload: CompletionResponse = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"40 Nm"},"finish_reason":"stop"}]}"#,
        )
        .expect("valid payload");
        assert_eq!(first_choice_content(payload).expect("content"), "40 Nm");
    }

    #[test]
    fn completion_without_choices_is_empty_response() {
        let payload: CompletionResponse =
            serde_json::from_str(r#"{"choices":[]}"#).expect("valid payload");
        assert!(matches!(
            first_choice_content(payload),
            Err(AssistantError::EmptyResponse(_))
        ));
    }

    #[test]
    fn request_serializes_as_single_user_message() {
        let request = CompletionRequest {
            model: DEFAULT_CHAT_MODEL,
            messages: vec![ChatMessage {
                role: "user",
                content: "prompt",
            }],
            temperature: 0.0,
            max_tokens: None,
        };
        let value = serde_json::to_value(&request).expect("serializes");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "prompt");
        assert!(value.get("max_tokens").is_none());
    }

    #[test]
    fn missing_api_key_is_rejected() {
        assert!(ChatClient::new(ChatClientConfig::new("  ")).is_err());
    }

    fn client_for(server: &MockServer) -> ChatClient {
        ChatClient::new(ChatClientConfig {
            base_url: format!("{}/openai/v1", server.uri()),
            ..ChatClientConfig::new("test-key")
        })
        .expect("client should build")
    }

    #[tokio::test]
    async fn completion_posts_to_chat_endpoint_with_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": DEFAULT_CHAT_MODEL,
                "temperature": 0.0,
                "messages": [{"role": "user", "content": "How tight is the drain plug?"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "40 Nm"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answer = client_for(&server)
            .complete("How tight is the drain plug?")
            .await
            .expect("completion should succeed");
        assert_eq!(answer, "40 Nm");
    }

    #[tokio::test]
    async fn error_status_becomes_backend_response_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string(r#"{"error":"rate limited"}"#))
            .mount(&server)
            .await;

        let error = client_for(&server)
            .complete("anything")
            .await
            .expect_err("429 should fail");

        match &error {
            AssistantError::BackendResponse { backend, details } => {
                assert_eq!(backend, "chat");
                assert!(details.starts_with("429 Too Many Requests"));
                assert!(details.contains("rate limited"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            error.to_string(),
            r#"invalid response from chat: 429 Too Many Requests: {"error":"rate limited"}"#
        );
    }

    #[tokio::test]
    async fn server_error_without_body_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = client_for(&server).complete("anything").await;
        assert!(matches!(
            result,
            Err(AssistantError::BackendResponse { ref details, .. }) if details == "503 Service Unavailable"
        ));
    }
}
