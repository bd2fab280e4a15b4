//! Risk pre-screen: a fast reviewer that scores a command before the panel
//! sees it. Advisory only; the report is context for judges and for the
//! validation endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Command;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    /// 0.0 (harmless) to 1.0 (dangerous).
    pub risk_score: f64,
    pub summary: String,
    pub safe: bool,
}

impl RiskReport {
    pub fn new(risk_score: f64, summary: impl Into<String>, safe: bool) -> Self {
        Self {
            risk_score: risk_score.clamp(0.0, 1.0),
            summary: summary.into(),
            safe,
        }
    }
}

#[derive(Debug, Error)]
pub enum ScreenError {
    #[error("risk screen unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RiskScreen: Send + Sync {
    async fn screen(&self, command: &Command) -> Result<RiskReport, ScreenError>;
}
