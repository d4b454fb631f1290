//! Chat completion provider abstraction.
//!
//! The explainer only needs a single-turn completion. Providers may also
//! offer true incremental delivery through [`CompletionProvider::complete_streaming`].

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use openai::OpenAIProvider;

/// Callback for streamed tokens, returns false to stop streaming
pub type StreamCallback<'a> = Box<dyn FnMut(&str) -> Result<bool, ProviderError> + Send + 'a>;

/// Sampling settings for a completion request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionParams {
    /// Model identifier
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 2000,
            temperature: 0.5,
        }
    }
}

/// A chat completion service
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Get the provider name for display
    fn name(&self) -> &'static str;

    /// Get the current model name/identifier
    fn model_name(&self) -> &str;

    /// Send one user message and return the full response text
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Send one user message, handing each delta to `callback` as it arrives
    ///
    /// # Returns
    /// The complete response after streaming finishes
    async fn complete_streaming(
        &self,
        prompt: &str,
        callback: StreamCallback<'_>,
    ) -> Result<String, ProviderError>;
}

/// Error types for provider operations
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API key not configured for {provider}. Set {env_var} environment variable.")]
    MissingApiKey { provider: String, env_var: String },

    #[error("API error from {provider}: {message}")]
    ApiError { provider: String, message: String },

    #[error("Rate limited by {provider}. Please wait and try again.")]
    RateLimited { provider: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },
}

/// Read an API key from the environment, ignoring empty values
pub fn get_api_key(env_var: &str) -> Option<String> {
    std::env::var(env_var).ok().filter(|s| !s.is_empty())
}
