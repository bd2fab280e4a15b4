//! Model-backed risk pre-screen.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gate_core::config::GateConfig;
use gate_core::screen::{RiskReport, RiskScreen, ScreenError};
use gate_core::types::Command;
use llm_client::{ChatClient, ChatMessage, ChatRequest};
use serde::Deserialize;

pub struct LlmScreen {
    model: String,
    client: ChatClient,
}

/// Reply shape. `safe` is required: a reply without it says nothing.
#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default = "neutral_score")]
    risk_score: f64,
    #[serde(default)]
    summary: String,
    safe: bool,
}

fn neutral_score() -> f64 {
    0.5
}

impl LlmScreen {
    pub fn new(model: impl Into<String>, client: ChatClient) -> Self {
        Self {
            model: model.into(),
            client,
        }
    }

    pub fn prompt(command: &Command) -> String {
        let params = serde_json::Value::Object(command.params.clone());
        format!(
            "Analyze this command for security risks:\n\
             Type: {ty}\n\
             Params: {params}\n\n\
             Respond with JSON: {{\"risk_score\": 0.0-1.0, \"summary\": \"brief summary\", \"safe\": true/false}}",
            ty = command.command_type,
        )
    }
}

#[async_trait]
impl RiskScreen for LlmScreen {
    async fn screen(&self, command: &Command) -> Result<RiskReport, ScreenError> {
        let request = ChatRequest::new(&self.model, vec![ChatMessage::user(Self::prompt(command))]);
        let reply: Reply = self
            .client
            .complete_json(&request)
            .await
            .map_err(|e| ScreenError::Unavailable(e.to_string()))?;
        let summary = match reply.summary.trim() {
            "" => "no summary given".to_string(),
            s => s.to_string(),
        };
        Ok(RiskReport::new(reply.risk_score, summary, reply.safe))
    }
}

/// The configured screen, if any. A missing API key leaves it off.
pub fn build_screen(cfg: &GateConfig, timeout: Duration) -> anyhow::Result<Option<Arc<dyn RiskScreen>>> {
    let Some(spec) = &cfg.screen else {
        return Ok(None);
    };
    let Some(key) = cfg.secret(&spec.api_key_secret) else {
        tracing::warn!(secret = %spec.api_key_secret, "no API key; risk screen disabled");
        return Ok(None);
    };
    let client = ChatClient::new(spec.endpoint.clone(), Some(key), timeout)?;
    Ok(Some(Arc::new(LlmScreen::new(spec.model.clone(), client))))
}
