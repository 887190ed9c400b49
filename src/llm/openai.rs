//! OpenAI chat-completions provider.
//!
//! Implements [`ChatProvider`] against the OpenAI API (or any compatible
//! endpoint via `base_url`). The API key is read from `OPENAI_API_KEY`;
//! a missing key fails at construction time, never mid-pipeline.

use super::ChatProvider;
use crate::error::{CleaningError, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default API endpoint.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default model for analysis and code generation.
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default timeout for API requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default temperature (low, generated code should be deterministic).
const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<Choice>>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<Message>,
}

/// Configuration for the OpenAI provider.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// The model to use (e.g. "gpt-4o-mini").
    pub model: String,
    /// Temperature for response generation (0.0 - 2.0).
    pub temperature: f32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Base URL for the API (useful for proxies or compatible endpoints).
    pub base_url: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl OpenAiConfig {
    /// Create a new configuration builder.
    pub fn builder() -> OpenAiConfigBuilder {
        OpenAiConfigBuilder::default()
    }
}

/// Builder for [`OpenAiConfig`].
#[derive(Default)]
pub struct OpenAiConfigBuilder {
    model: Option<String>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
    base_url: Option<String>,
}

impl OpenAiConfigBuilder {
    /// Set the model to use.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the temperature (0.0 - 2.0).
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the request timeout in seconds.
    pub fn timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// Set a custom base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> OpenAiConfig {
        OpenAiConfig {
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            timeout_secs: self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            base_url: self.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

/// OpenAI chat-completions provider.
pub struct OpenAiProvider {
    api_key: String,
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiProvider {
    /// Create a provider with default configuration.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(api_key, OpenAiConfig::default())
    }

    /// Create a provider reading the API key from `OPENAI_API_KEY`.
    ///
    /// Fails fast with [`CleaningError::MissingApiKey`] when the variable is
    /// absent or empty.
    pub fn from_env(config: OpenAiConfig) -> Result<Self> {
        let key = std::env::var(API_KEY_VAR).unwrap_or_default();
        if key.trim().is_empty() {
            return Err(CleaningError::MissingApiKey(API_KEY_VAR.to_string()));
        }
        Self::with_config(key, config)
    }

    /// Create a provider with custom configuration.
    pub fn with_config(api_key: impl Into<String>, config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            api_key: api_key.into(),
            config,
            client,
        })
    }
}

impl ChatProvider for OpenAiProvider {
    fn complete(&self, system: &str, user: &str, json_mode: bool) -> Result<String> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: self.config.temperature,
            response_format: json_mode.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        let response = self
            .client
            .post(&self.config.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()?;

        if !response.status().is_success() {
            return Err(CleaningError::Service(format!(
                "API error {}: {}",
                response.status(),
                response.text()?
            )));
        }

        let result: ChatResponse = response.json()?;

        result
            .choices
            .as_ref()
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.message.as_ref())
            .map(|msg| msg.content.clone())
            .ok_or_else(|| CleaningError::Service("no response content".to_string()))
    }

    fn name(&self) -> &str {
        "OpenAI"
    }

    fn model(&self) -> Option<&str> {
        Some(&self.config.model)
    }
}

// ============================================================================
// Tests
// ============================================================================
