//! Operator alerts for actions a human has to look at.

use crate::ledger::ActionStatus;
use crate::types::{CommandType, Severity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorAlert {
    pub action_id: String,
    pub command_type: CommandType,
    pub severity: Severity,
    pub status: ActionStatus,
    pub rationale: String,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn alert(&self, alert: &OperatorAlert) -> Result<(), AlertError>;
}

/// Writes alerts to the log at WARN.
#[derive(Debug, Default, Clone)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn alert(&self, alert: &OperatorAlert) -> Result<(), AlertError> {
        tracing::warn!(
            action_id = %alert.action_id,
            command_type = %alert.command_type,
            severity = %alert.severity,
            status = %alert.status,
            "operator attention required: {}",
            alert.rationale
        );
        Ok(())
    }
}

/// POSTs each alert as JSON to a webhook, and logs it too.
pub struct WebhookAlertSink {
    url: String,
    http: reqwest::Client,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AlertError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AlertError::Delivery(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn alert(&self, alert: &OperatorAlert) -> Result<(), AlertError> {
        LogAlertSink.alert(alert).await?;
        let response = self
            .http
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .map_err(|e| AlertError::Delivery(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AlertError::Delivery(format!(
                "webhook returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}
