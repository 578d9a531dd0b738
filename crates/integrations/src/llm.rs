//! Text generation over the OpenAI, Anthropic and Ollama HTTP APIs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use stockpulse_core::config::{LlmConfig, LlmProvider};
use stockpulse_core::errors::ApplicationError;
use stockpulse_core::suggestions::ports::TextGenerator;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 1024;
const RETRY_BASE_DELAY_MS: u64 = 250;

pub struct HttpTextGenerator {
    client: reqwest::Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
}

impl HttpTextGenerator {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ApplicationError> {
        if config.provider != LlmProvider::Ollama && config.api_key.is_none() {
            return Err(ApplicationError::Configuration(format!(
                "llm provider `{}` needs an api key",
                provider_name(config.provider)
            )));
        }

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_string());

        Ok(Self {
            client: crate::http_client(config.timeout_secs)?,
            provider: config.provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn endpoint(&self) -> String {
        let path = match self.provider {
            LlmProvider::OpenAi => "/v1/chat/completions",
            LlmProvider::Anthropic => "/v1/messages",
            LlmProvider::Ollama => "/api/chat",
        };
        format!("{}{path}", self.base_url)
    }

    pub fn request_body(&self, system_instruction: &str, prompt: &str) -> Value {
        match self.provider {
            LlmProvider::OpenAi => json!({
                "model": self.model,
                "messages": [
                    {"role": "system", "content": system_instruction},
                    {"role": "user", "content": prompt},
                ],
                "temperature": 0.7,
            }),
            LlmProvider::Anthropic => json!({
                "model": self.model,
                "max_tokens": MAX_OUTPUT_TOKENS,
                "system": system_instruction,
                "messages": [{"role": "user", "content": prompt}],
            }),
            LlmProvider::Ollama => json!({
                "model": self.model,
                "stream": false,
                "messages": [
                    {"role": "system", "content": system_instruction},
                    {"role": "user", "content": prompt},
                ],
            }),
        }
    }

    fn request(&self, body: &Value) -> reqwest::RequestBuilder {
        let builder = self.client.post(self.endpoint()).json(body);
        match (self.provider, &self.api_key) {
            (LlmProvider::OpenAi, Some(key)) => builder.bearer_auth(key.expose_secret()),
            (LlmProvider::Anthropic, Some(key)) => builder
                .header("x-api-key", key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION),
            _ => builder,
        }
    }

    async fn attempt(&self, body: &Value) -> Result<String, AttemptError> {
        let response = self
            .request(body)
            .send()
            .await
            .map_err(|error| AttemptError::Retryable(format!("request failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let message = format!("status {status}: {}", truncate(&detail, 200));
            return Err(if is_retryable_status(status) {
                AttemptError::Retryable(message)
            } else {
                AttemptError::Fatal(message)
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|error| AttemptError::Fatal(format!("invalid response body: {error}")))?;

        extract_completion(self.provider, &payload)
            .ok_or_else(|| AttemptError::Fatal("response carries no completion text".to_string()))
    }
}

enum AttemptError {
    Retryable(String),
    Fatal(String),
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(
        &self,
        system_instruction: &str,
        prompt: &str,
    ) -> Result<String, ApplicationError> {
        let body = self.request_body(system_instruction, prompt);
        let attempts = self.max_retries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.attempt(&body).await {
                Ok(text) => return Ok(text),
                Err(AttemptError::Fatal(message)) => {
                    last_error = message;
                    break;
                }
                Err(AttemptError::Retryable(message)) => {
                    tracing::warn!(
                        event_name = "integrations.llm.retry",
                        provider = provider_name(self.provider),
                        attempt,
                        error = %message,
                        "language model call failed"
                    );
                    last_error = message;
                    if attempt < attempts {
                        let delay = RETRY_BASE_DELAY_MS * u64::from(attempt);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
            }
        }

        Err(ApplicationError::Integration(format!(
            "{} completion failed: {last_error}",
            provider_name(self.provider)
        )))
    }
}

/// Pulls the completion text out of a provider response.
pub fn extract_completion(provider: LlmProvider, payload: &Value) -> Option<String> {
    let text = match provider {
        LlmProvider::OpenAi => payload.pointer("/choices/0/message/content")?.as_str()?,
        LlmProvider::Anthropic => payload
            .get("content")?
            .as_array()?
            .iter()
            .find(|block| block.get("type").and_then(Value::as_str) == Some("text"))?
            .get("text")?
            .as_str()?,
        LlmProvider::Ollama => payload.pointer("/message/content")?.as_str()?,
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => OPENAI_BASE_URL,
        LlmProvider::Anthropic => ANTHROPIC_BASE_URL,
        LlmProvider::Ollama => OLLAMA_BASE_URL,
    }
}

fn provider_name(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "openai",
        LlmProvider::Anthropic => "anthropic",
        LlmProvider::Ollama => "ollama",
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
