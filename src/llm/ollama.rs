//! Ollama (local) client.

use super::{LlmHttpConfig, LlmProvider, build_http_client};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Ollama local text-generation client.
pub struct OllamaClient {
    /// API endpoint.
    endpoint: String,
    /// Model to use.
    model: String,
    /// HTTP client.
    client: reqwest::blocking::Client,
}

impl OllamaClient {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "http://localhost:11434";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "llama3.2";

    /// Creates a new Ollama client.
    #[must_use]
    pub fn new() -> Self {
        let endpoint =
            std::env::var("OLLAMA_HOST").unwrap_or_else(|_| Self::DEFAULT_ENDPOINT.to_string());
        let model =
            std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| Self::DEFAULT_MODEL.to_string());

        Self {
            endpoint,
            model,
            client: build_http_client(LlmHttpConfig::from_env()),
        }
    }

    /// Sets the API endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets HTTP client timeouts for text-generation requests.
    #[must_use]
    pub fn with_http_config(mut self, config: LlmHttpConfig) -> Self {
        self.client = build_http_client(config);
        self
    }

    /// Checks if Ollama is available.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.endpoint))
            .send()
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Makes a request to the Ollama generate API.
    fn request(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&request)
            .send()
            .map_err(|e| {
                let error_kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connect"
                } else if e.is_request() {
                    "request"
                } else {
                    "unknown"
                };
                tracing::error!(
                    provider = "ollama",
                    model = %self.model,
                    error = %e,
                    error_kind = error_kind,
                    "text-generation request failed"
                );
                Error::LabelGeneration {
                    cluster_id: String::new(),
                    cause: format!("{error_kind} error: {e}"),
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            tracing::error!(
                provider = "ollama",
                model = %self.model,
                status = %status,
                body = %body,
                "text-generation API returned error status"
            );
            return Err(Error::LabelGeneration {
                cluster_id: String::new(),
                cause: format!("API returned status: {status} - {body}"),
            });
        }

        let response: GenerateResponse = response.json().map_err(|e| {
            tracing::error!(
                provider = "ollama",
                model = %self.model,
                error = %e,
                "failed to parse text-generation response"
            );
            Error::LabelGeneration {
                cluster_id: String::new(),
                cause: e.to_string(),
            }
        })?;

        Ok(response.response)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmProvider for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        self.request(prompt)
    }
}

/// Request to the Generate API.
#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

/// Response from the Generate API.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}
