//! Text-generation client abstraction.
//!
//! Label synthesis is the only consumer: providers turn a short prompt of
//! representative summaries into a candidate label. Any failure here is
//! recoverable; the synthesizer falls back to a deterministic label.

mod ollama;

pub use ollama::OllamaClient;

use crate::Result;
use std::time::Duration;

/// Trait for text-generation providers.
pub trait LlmProvider: Send + Sync {
    /// The provider name.
    fn name(&self) -> &'static str;

    /// Generates a completion for the given prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the completion fails.
    fn complete(&self, prompt: &str) -> Result<String>;
}

/// HTTP client configuration for text-generation providers.
#[derive(Debug, Clone, Copy)]
pub struct LlmHttpConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for LlmHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            connect_timeout_ms: 3_000,
        }
    }
}

impl LlmHttpConfig {
    /// Loads HTTP configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Uses the labeling timeout as the request timeout.
    #[must_use]
    pub fn from_labeling(config: &crate::config::LabelingConfig) -> Self {
        Self {
            timeout_ms: config.timeout_ms,
            ..Self::default()
        }
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("TOPICGRAPH_LLM_TIMEOUT_MS") {
            if let Ok(timeout_ms) = v.parse::<u64>() {
                self.timeout_ms = timeout_ms;
            }
        }
        if let Ok(v) = std::env::var("TOPICGRAPH_LLM_CONNECT_TIMEOUT_MS") {
            if let Ok(connect_timeout_ms) = v.parse::<u64>() {
                self.connect_timeout_ms = connect_timeout_ms;
            }
        }
        self
    }
}

/// Builds a blocking HTTP client for text-generation requests with
/// configured timeouts.
#[must_use]
pub fn build_http_client(config: LlmHttpConfig) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder();
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }

    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build LLM HTTP client: {err}");
        reqwest::blocking::Client::new()
    })
}
