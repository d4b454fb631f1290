//! OpenAI API provider.
//!
//! Uses the Chat Completions API with a single user message.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use super::{get_api_key, CompletionParams, CompletionProvider, ProviderError, StreamCallback};

/// Default OpenAI API base URL
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Environment variable holding the OpenAI API key
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const PROVIDER: &str = "OpenAI";

/// OpenAI provider
pub struct OpenAIProvider {
    /// HTTP client
    client: Client,
    /// API key
    api_key: String,
    /// Base URL, without the `/chat/completions` suffix
    base_url: String,
    params: CompletionParams,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider
    pub fn new(api_key: String, base_url: impl Into<String>, params: CompletionParams) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            params,
        }
    }

    /// Create from `OPENAI_API_KEY`
    pub fn from_env(
        base_url: impl Into<String>,
        params: CompletionParams,
    ) -> Result<Self, ProviderError> {
        let api_key =
            get_api_key(OPENAI_API_KEY_ENV).ok_or_else(|| ProviderError::MissingApiKey {
                provider: PROVIDER.to_string(),
                env_var: OPENAI_API_KEY_ENV.to_string(),
            })?;

        Ok(Self::new(api_key, base_url, params))
    }

    /// Build the request body
    fn build_request(&self, prompt: &str, stream: bool) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.params.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.params.temperature,
            max_tokens: Some(self.params.max_tokens),
            stream: Some(stream),
        }
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<Response, ProviderError> {
        let request = self.build_request(prompt, stream);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited {
                    provider: PROVIDER.to_string(),
                });
            }
            return Err(ProviderError::ApiError {
                provider: PROVIDER.to_string(),
                message: format!("HTTP {}: {}", status, error_body),
            });
        }

        Ok(response)
    }
}

fn invalid(message: impl Into<String>) -> ProviderError {
    ProviderError::InvalidResponse {
        provider: PROVIDER.to_string(),
        message: message.into(),
    }
}

#[async_trait]
impl CompletionProvider for OpenAIProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn model_name(&self) -> &str {
        &self.params.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let response = self.send(prompt, false).await?;

        let response_body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| invalid(format!("Failed to parse response: {e}")))?;

        response_body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .map(|m| m.content)
            .ok_or_else(|| invalid("response contained no choices"))
    }

    async fn complete_streaming(
        &self,
        prompt: &str,
        mut callback: StreamCallback<'_>,
    ) -> Result<String, ProviderError> {
        let response = self.send(prompt, true).await?;

        let mut full_response = String::new();
        let mut stream = response.bytes_stream();
        let mut buffer = SseBuffer::default();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ProviderError::NetworkError(e.to_string()))?;
            buffer.push(&chunk);

            while let Some(event) = buffer.next_event() {
                for data in event.lines().filter_map(|l| l.strip_prefix("data: ")) {
                    if data == "[DONE]" {
                        return Ok(full_response);
                    }

                    let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else {
                        tracing::debug!("ignoring unparseable stream chunk: {data}");
                        continue;
                    };
                    for content in chunk
                        .choices
                        .into_iter()
                        .filter_map(|c| c.delta.and_then(|d| d.content))
                    {
                        full_response.push_str(&content);
                        if !callback(&content)? {
                            return Ok(full_response);
                        }
                    }
                }
            }
        }

        Ok(full_response)
    }
}

/// Accumulates raw SSE bytes and yields complete `\n\n`-terminated events.
/// Decoding waits for the terminator so characters split across network
/// chunks stay intact.
#[derive(Debug, Default)]
struct SseBuffer {
    bytes: Vec<u8>,
}

impl SseBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    fn next_event(&mut self) -> Option<String> {
        let pos = self.bytes.windows(2).position(|w| w == b"\n\n")?;
        let event: Vec<u8> = self.bytes.drain(..pos + 2).take(pos).collect();
        Some(String::from_utf8_lossy(&event).into_owned())
    }
}

// API types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OpenAIProvider {
        OpenAIProvider::new(
            "test-key".to_string(),
            server.uri(),
            CompletionParams::default(),
        )
    }

    #[test]
    fn test_openai_provider_creation() {
        let provider = OpenAIProvider::new(
            "test-key".to_string(),
            OPENAI_API_BASE,
            CompletionParams::default(),
        );
        assert_eq!(provider.name(), "OpenAI");
        assert_eq!(provider.model_name(), "gpt-3.5-turbo");
    }

    #[test]
    fn test_build_request_carries_sampling_params() {
        let provider = OpenAIProvider::new(
            "test-key".to_string(),
            OPENAI_API_BASE,
            CompletionParams::default(),
        );
        let body = serde_json::to_value(provider.build_request("why?", false)).unwrap();
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["max_tokens"], 2000);
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "why?");
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(json!({ "stream": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "root cause is X" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = provider(&server).complete("explain").await.unwrap();
        assert_eq!(text, "root cause is X");
    }

    #[tokio::test]
    async fn test_complete_without_choices_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let err = provider(&server).complete("explain").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_rate_limit_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = provider(&server).complete("explain").await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_complete_streaming_collects_deltas() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"root \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"cause\"}}]}\n\n",
            "data: [DONE]\n\n"
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({ "stream": true })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let text = provider(&server)
            .complete_streaming(
                "explain",
                Box::new(move |token| {
                    sink.lock().unwrap().push(token.to_string());
                    Ok(true)
                }),
            )
            .await
            .unwrap();

        assert_eq!(text, "root cause");
        assert_eq!(*seen.lock().unwrap(), vec!["root ", "cause"]);
    }

    #[test]
    fn test_sse_buffer_keeps_characters_split_across_chunks() {
        let event = "data: {\"choices\":[{\"delta\":{\"content\":\"a\u{2014}b\"}}]}\n\n";
        let bytes = event.as_bytes();
        let split = event.find('\u{2014}').unwrap() + 2;

        let mut buffer = SseBuffer::default();
        buffer.push(&bytes[..split]);
        assert!(buffer.next_event().is_none());
        buffer.push(&bytes[split..]);

        let decoded = buffer.next_event().unwrap();
        assert!(decoded.contains("a\u{2014}b"));
        assert!(!decoded.contains('\u{FFFD}'));
        assert!(buffer.next_event().is_none());
    }

    #[test]
    fn test_sse_buffer_yields_events_in_order() {
        let mut buffer = SseBuffer::default();
        buffer.push(b"data: one\n\ndata: two\n\ndata: thr");
        assert_eq!(buffer.next_event().as_deref(), Some("data: one"));
        assert_eq!(buffer.next_event().as_deref(), Some("data: two"));
        assert!(buffer.next_event().is_none());
        buffer.push(b"ee\n\n");
        assert_eq!(buffer.next_event().as_deref(), Some("data: three"));
    }

    #[tokio::test]
    async fn test_complete_streaming_preserves_non_ascii_content() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"IAM r\u{f4}le \u{2014} \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"\u{65e5}\u{672c}\"}}]}\n\n",
            "data: [DONE]\n\n"
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let text = provider(&server)
            .complete_streaming("explain", Box::new(|_| Ok(true)))
            .await
            .unwrap();

        assert_eq!(text, "IAM r\u{f4}le \u{2014} \u{65e5}\u{672c}");
    }
}
