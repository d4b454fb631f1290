//! Explaining a selected error with a chat completion.
//!
//! The completion is requested in one shot and then written out word by word
//! with a short pause, so the terminal shows it as if it were being typed.
//! [`OutputMode::Live`] instead forwards the provider's own token stream.

use std::io::{self, Write};
use std::time::Duration;

use crate::providers::{CompletionProvider, ProviderError};

/// Instruction placed in front of the error text
pub const PROMPT_PREFIX: &str =
    "You are an engineer experienced in Amazon Web Services. Please explain the following error:";

/// How the response reaches the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Fetch the full response, then replay it word by word
    #[default]
    Simulated,
    /// Write provider deltas as they arrive
    Live,
}

#[derive(Debug, thiserror::Error)]
pub enum ExplanationError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("No explanation received within {0:?}")]
    Timeout(Duration),

    #[error("The completion service returned an empty explanation")]
    EmptyResponse,

    #[error("Failed to write explanation: {0}")]
    Output(#[from] io::Error),
}

/// Build the single-turn prompt for an error
pub fn build_prompt(error: &str) -> String {
    format!("{PROMPT_PREFIX}{error}")
}

/// Sends errors to a [`CompletionProvider`] and writes the answer out
pub struct ExplanationStreamer<'a, P: CompletionProvider + ?Sized> {
    provider: &'a P,
    word_delay: Duration,
    timeout: Duration,
    mode: OutputMode,
}

impl<'a, P: CompletionProvider + ?Sized> ExplanationStreamer<'a, P> {
    pub fn new(provider: &'a P, word_delay: Duration, timeout: Duration) -> Self {
        Self {
            provider,
            word_delay,
            timeout,
            mode: OutputMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    /// Explain `error`, writing the response to `out`. Returns the full text.
    pub async fn explain<W: Write + Send>(
        &self,
        error: &str,
        out: &mut W,
    ) -> Result<String, ExplanationError> {
        match self.mode {
            OutputMode::Simulated => {
                let text = self.request(error).await?;
                self.replay(&text, out).await?;
                Ok(text)
            }
            OutputMode::Live => self.explain_live(error, out).await,
        }
    }

    /// Fetch the complete explanation without writing anything
    pub async fn request(&self, error: &str) -> Result<String, ExplanationError> {
        let prompt = self.prompt_for(error);
        let text = self.with_timeout(self.provider.complete(&prompt)).await?;
        if text.trim().is_empty() {
            return Err(ExplanationError::EmptyResponse);
        }
        Ok(text)
    }

    /// One write per word, flushed, with the word delay after each
    pub async fn replay<W: Write>(&self, text: &str, out: &mut W) -> io::Result<()> {
        out.write_all(b"\n")?;
        out.flush()?;
        for word in text.split(' ').filter(|w| !w.is_empty()) {
            out.write_all(format!("{word} ").as_bytes())?;
            out.flush()?;
            tokio::time::sleep(self.word_delay).await;
        }
        out.write_all(b"\n")?;
        out.flush()
    }

    async fn explain_live<W: Write + Send>(
        &self,
        error: &str,
        out: &mut W,
    ) -> Result<String, ExplanationError> {
        let prompt = self.prompt_for(error);
        out.write_all(b"\n")?;
        let text = {
            let sink: &mut (dyn Write + Send) = out;
            let callback = Box::new(move |token: &str| {
                sink.write_all(token.as_bytes())
                    .and_then(|_| sink.flush())
                    .map(|_| true)
                    .map_err(|e| ProviderError::NetworkError(format!("output: {e}")))
            });
            self.with_timeout(self.provider.complete_streaming(&prompt, callback))
                .await?
        };
        out.write_all(b"\n")?;
        out.flush()?;
        if text.trim().is_empty() {
            return Err(ExplanationError::EmptyResponse);
        }
        Ok(text)
    }

    fn prompt_for(&self, error: &str) -> String {
        let prompt = build_prompt(error);
        tracing::debug!(
            provider = self.provider.name(),
            model = self.provider.model_name(),
            prompt_chars = prompt.len(),
            "requesting explanation"
        );
        prompt
    }

    async fn with_timeout<F>(&self, call: F) -> Result<String, ExplanationError>
    where
        F: std::future::Future<Output = Result<String, ProviderError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ExplanationError::Timeout(self.timeout)),
        }
    }
}
