use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::services::reply_normalizer::preview;

pub const DEFAULT_MAX_TOKENS: u32 = 8192;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Sends one prompt to a model and returns the raw reply text.
///
/// Implementations apply their own request timeout and report non-2xx
/// responses as [`AppError::Http`]. Retrying is the caller's job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn invoke(&self, prompt: &str, model: &str) -> Result<String, AppError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// OpenAI-compatible `/chat/completions` client. Every supported provider
/// speaks this dialect; they differ only in endpoint, key and model name.
#[derive(Debug, Clone)]
pub struct ChatCompletionsTransport {
    client: Client,
    api_url: String,
    api_key: String,
    max_tokens: u32,
}

impl ChatCompletionsTransport {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            max_tokens,
        })
    }
}

#[async_trait]
impl Transport for ChatCompletionsTransport {
    async fn invoke(&self, prompt: &str, model: &str) -> Result<String, AppError> {
        let request = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("request to {} failed: {e}", self.api_url)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Transport(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(AppError::Http {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!("[llm] Response ({} chars): {}", body.len(), preview(&body));

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            AppError::MalformedResponse(format!("invalid JSON in API response: {e}"))
        })?;

        if let Some(error) = parsed.error {
            return Err(AppError::Transport(format!("API returned error: {error}")));
        }

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AppError::MalformedResponse("API response contained no message content".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport_for(server: &MockServer) -> ChatCompletionsTransport {
        ChatCompletionsTransport::new(
            format!("{}/v1/chat/completions", server.uri()),
            "test-key",
            DEFAULT_MAX_TOKENS,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "test-model",
                "max_tokens": DEFAULT_MAX_TOKENS,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"docs\":[\"a.txt\"]}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = transport_for(&server)
            .invoke("classify", "test-model")
            .await
            .unwrap();

        assert_eq!(reply, "{\"docs\":[\"a.txt\"]}");
    }

    #[tokio::test]
    async fn non_success_status_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = transport_for(&server)
            .invoke("classify", "test-model")
            .await
            .unwrap_err();

        match &err {
            AppError::Http { status, body } => {
                assert_eq!(*status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn undecodable_body_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let err = transport_for(&server)
            .invoke("classify", "test-model")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::MalformedResponse(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn error_object_in_body_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": {"message": "rate limited"}
            })))
            .mount(&server)
            .await;

        let err = transport_for(&server)
            .invoke("classify", "test-model")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Transport(_)));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn empty_choices_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let err = transport_for(&server)
            .invoke("classify", "test-model")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::MalformedResponse(_)));
    }
}
