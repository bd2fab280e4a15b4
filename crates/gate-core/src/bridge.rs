//! Execution bridge: performs the real-world side effect of an approved
//! command.
//!
//! `HttpBridge` speaks the Apps-Script style contract: POST
//! `{"action": <tool>, ...params}` to a single endpoint and return its JSON.
//! Commands that need no remote call (site scans, integration hand-offs that
//! a human must finish) are answered locally.

use crate::params::check_params;
use crate::types::{
    Command, CHECK_INTEGRATION_STATUS, CONNECT_INTEGRATION, REFRESH_TOKEN, SCAN_SITE,
    START_CAMPAIGN,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum BridgeError {
    #[error("execution bridge timed out")]
    Timeout,
    #[error("remote error: {0}")]
    RemoteError(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
}

#[async_trait]
pub trait ExecutionBridge: Send + Sync {
    /// Number of command types this bridge can execute.
    fn tools_registered(&self) -> usize;

    async fn dispatch(&self, command: &Command) -> Result<Value, BridgeError>;
}

// ---------------------------------------------------------------------------
// Tool table
// ---------------------------------------------------------------------------

/// How a command type is carried out.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRoute {
    /// POST `{"action": action, ...payload}` to the bridge endpoint.
    Remote { action: &'static str, payload: Value },
    /// Answer without a network call.
    Local(Value),
}

/// Command types with a registered tool.
pub const TOOLS: &[&str] = &[
    SCAN_SITE,
    START_CAMPAIGN,
    CHECK_INTEGRATION_STATUS,
    REFRESH_TOKEN,
    CONNECT_INTEGRATION,
];

/// Map a command to its tool. Parameter violations and unregistered types
/// are `InvalidParams`.
pub fn route(command: &Command) -> Result<ToolRoute, BridgeError> {
    let violations = check_params(&command.command_type, &command.params);
    if !violations.is_empty() {
        return Err(BridgeError::InvalidParams(violations.join("; ")));
    }
    let param = |key: &str| command.param_str(key).unwrap_or_default().to_string();

    match command.command_type.as_str() {
        SCAN_SITE => Ok(ToolRoute::Local(json!({
            "domain": param("domain"),
            "grade": "A",
            "status": "simulated",
        }))),
        START_CAMPAIGN => Ok(ToolRoute::Remote {
            action: "meta_campaign",
            payload: json!({ "campaign_name": param("campaign_id") }),
        }),
        CHECK_INTEGRATION_STATUS => Ok(ToolRoute::Remote {
            action: "get_integration_status",
            payload: json!({ "service": param("service") }),
        }),
        REFRESH_TOKEN => Ok(ToolRoute::Remote {
            action: "refresh_token",
            payload: json!({ "service": param("service") }),
        }),
        CONNECT_INTEGRATION => {
            let service = param("service");
            Ok(ToolRoute::Local(json!({
                "service": service,
                "status": "PENDING_HUMAN_ACTION",
                "message": "Connection prepared. A human operator must complete the OAuth flow.",
                "next_steps_url": format!("https://admin.mailchimp.com/integrations/add/{service}"),
            })))
        }
        other => Err(BridgeError::InvalidParams(format!(
            "no tool registered for command type {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// HttpBridge
// ---------------------------------------------------------------------------

pub struct HttpBridge {
    url: Option<String>,
    http: reqwest::Client,
}

impl HttpBridge {
    /// `url = None` runs in simulation mode: remote tools return
    /// `{"status": "simulated"}` without leaving the process.
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self, BridgeError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::RemoteError(format!("http client: {e}")))?;
        Ok(Self { url, http })
    }

    async fn call(&self, url: &str, action: &str, payload: Value) -> Result<Value, BridgeError> {
        let mut body = json!({ "action": action });
        if let (Some(obj), Value::Object(extra)) = (body.as_object_mut(), payload) {
            obj.extend(extra);
        }

        let response = self.http.post(url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                BridgeError::Timeout
            } else {
                BridgeError::RemoteError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BridgeError::RemoteError(format!("HTTP {status}: {text}")));
        }
        response.json::<Value>().await.map_err(|e| {
            if e.is_timeout() {
                BridgeError::Timeout
            } else {
                BridgeError::RemoteError(format!("invalid JSON from bridge: {e}"))
            }
        })
    }
}

#[async_trait]
impl ExecutionBridge for HttpBridge {
    fn tools_registered(&self) -> usize {
        TOOLS.len()
    }

    async fn dispatch(&self, command: &Command) -> Result<Value, BridgeError> {
        match route(command)? {
            ToolRoute::Local(value) => Ok(value),
            ToolRoute::Remote { action, payload } => match &self.url {
                Some(url) => {
                    tracing::info!(action_id = %command.action_id, action, "calling execution bridge");
                    self.call(url, action, payload).await
                }
                None => Ok(json!({
                    "status": "simulated",
                    "action": action,
                    "message": "Bridge URL not configured",
                })),
            },
        }
    }
}
