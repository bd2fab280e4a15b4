use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::LlmError;
use crate::types::{ChatRequest, ChatResponse};
use crate::Result;

/// Thin driver for one chat-completions endpoint.
#[derive(Clone)]
pub struct ChatClient {
    endpoint: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ChatClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let key = self.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;
        tracing::debug!(endpoint = %self.endpoint, model = %request.model, "chat completion");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<ChatResponse>().await?)
    }

    /// Complete and decode the first choice as JSON.
    pub async fn complete_json<T: DeserializeOwned>(&self, request: &ChatRequest) -> Result<T> {
        let response = self.complete(request).await?;
        let text = response.first_text().ok_or(LlmError::EmptyResponse)?;
        parse_json_reply(text)
    }
}

/// Decode a model reply that should be JSON. Tolerates a surrounding
/// ```json fence and prose before or after the object.
pub fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> Result<T> {
    let trimmed = strip_fence(reply.trim());
    let candidate = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    };
    serde_json::from_str(candidate).map_err(|source| LlmError::Parse {
        reply: reply.to_string(),
        source,
    })
}

fn strip_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
