//! Minimal client for an OpenAI-compatible `chat/completions` endpoint.

use consilience_core::config::LlmConfig;
use serde::de::DeserializeOwned;

use crate::error::AgentError;
use crate::types::{ChatRequest, ChatResponse};
use crate::Result;

#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl ChatClient {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        }
    }

    /// Build from config, reading the key from the configured variable.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let key = std::env::var(&config.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AgentError::MissingApiKey(config.api_key_env.clone()))?;
        Ok(Self::new(&config.base_url, key))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one request and return the first choice's text.
    pub async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let raw = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&raw).map_err(|source| AgentError::Parse {
            reply: raw.clone(),
            source,
        })?;
        let text = parsed.first_text().ok_or(AgentError::EmptyReply)?;
        tracing::debug!(model = %request.model, chars = text.len(), "chat completion");
        Ok(text.to_string())
    }

    /// Like [`complete`](Self::complete), decoding the reply text as JSON.
    pub async fn complete_json<T: DeserializeOwned>(&self, request: &ChatRequest) -> Result<T> {
        let text = self.complete(request).await?;
        serde_json::from_str(&text).map_err(|source| AgentError::Parse {
            reply: text,
            source,
        })
    }
}
