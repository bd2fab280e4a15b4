//! Builds the judge panel from config, including model-backed judges.

use std::sync::Arc;

use async_trait::async_trait;
use gate_core::config::{GateConfig, JudgeSpec};
use gate_core::judge::{Case, Judge, JudgeError, JudgePanel, Opinion, StaticJudge};
use llm_client::{ChatClient, ChatMessage, ChatRequest};
use serde::Deserialize;

/// A reviewer backed by a chat-completions model.
pub struct LlmJudge {
    id: String,
    role: String,
    model: String,
    client: ChatClient,
}

/// Shape the model is asked to reply with. `approved` is required: a reply
/// without it is not a vote.
#[derive(Debug, Deserialize)]
struct Review {
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    rationale: String,
    approved: bool,
}

impl LlmJudge {
    pub fn new(id: impl Into<String>, role: impl Into<String>, model: impl Into<String>, client: ChatClient) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            model: model.into(),
            client,
        }
    }

    /// Severity is the one the validator resolved, not the declared one.
    pub fn prompt(&self, case: &Case) -> String {
        let command = &case.command;
        let params = serde_json::Value::Object(command.params.clone());
        let risk = match &case.screen {
            Some(r) => format!("\nRisk Assessment: {} (score: {:.2})", r.summary, r.risk_score),
            None => String::new(),
        };
        format!(
            "You are a {role} expert. Evaluate this action:\n\
             Command: {ty}\n\
             Params: {params}\n\
             Severity: {severity}{risk}\n\n\
             Respond with JSON: {{\"score\": 0.0-1.0, \"rationale\": \"reasoning\", \"approved\": true/false}}",
            role = self.role,
            ty = command.command_type,
            severity = case.severity,
        )
    }
}

#[async_trait]
impl Judge for LlmJudge {
    fn id(&self) -> &str {
        &self.id
    }

    async fn evaluate(&self, case: &Case) -> Result<Opinion, JudgeError> {
        let request = ChatRequest::new(&self.model, vec![ChatMessage::user(self.prompt(case))]);
        let review: Review = self
            .client
            .complete_json(&request)
            .await
            .map_err(|e| JudgeError::Unavailable(e.to_string()))?;

        let rationale = match (review.rationale.trim(), review.score) {
            ("", Some(score)) => format!("score {score:.2}"),
            ("", None) => "no rationale given".to_string(),
            (text, Some(score)) => format!("{text} (score {score:.2})"),
            (text, None) => text.to_string(),
        };
        Ok(if review.approved {
            Opinion::approve(rationale)
        } else {
            Opinion::reject(rationale)
        })
    }
}

/// Turn the configured panel into live judges. LLM judges whose API key is
/// missing are still seated; they vote as unavailable.
pub fn build_panel(cfg: &GateConfig) -> anyhow::Result<JudgePanel> {
    let mut judges: Vec<Arc<dyn Judge>> = Vec::new();
    for spec in cfg.judges.effective_panel() {
        let judge: Arc<dyn Judge> = match spec {
            JudgeSpec::Static {
                id,
                approve,
                rationale,
            } => {
                let rationale = if rationale.is_empty() {
                    "static verdict".to_string()
                } else {
                    rationale
                };
                let opinion = if approve {
                    Opinion::approve(rationale)
                } else {
                    Opinion::reject(rationale)
                };
                Arc::new(StaticJudge::new(id, opinion))
            }
            JudgeSpec::Llm {
                id,
                role,
                model,
                endpoint,
                api_key_secret,
            } => {
                let key = cfg.secret(&api_key_secret);
                if key.is_none() {
                    tracing::warn!(judge = %id, secret = %api_key_secret, "no API key; judge will vote unavailable");
                }
                let client = ChatClient::new(endpoint, key, cfg.judges.timeout())?;
                let role = role.unwrap_or_else(|| id.clone());
                Arc::new(LlmJudge::new(id, role, model, client))
            }
        };
        judges.push(judge);
    }
    Ok(JudgePanel::new(judges, cfg.judges.timeout())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate_core::screen::RiskReport;
    use gate_core::types::{Command, CommandType, Params, Severity};
    use std::time::Duration;

    fn case() -> Case {
        let mut params = Params::new();
        params.insert("service".into(), serde_json::json!("linkedin"));
        let command = Command::new(
            "token-refresh-google-456",
            CommandType::new("REFRESH_TOKEN").unwrap(),
            params,
            Some(Severity::Medium),
        );
        Case::new(command, Severity::Medium)
    }

    fn reply(content: &str) -> String {
        serde_json::json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
        })
        .to_string()
    }

    async fn judge_against(server: &mockito::ServerGuard, key: Option<&str>) -> LlmJudge {
        let client = ChatClient::new(
            format!("{}/v1/chat/completions", server.url()),
            key.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap();
        LlmJudge::new("security", "security", "mistral-small-latest", client)
    }

    #[test]
    fn prompt_names_role_command_and_params() {
        let client = ChatClient::new("http://127.0.0.1:9", None, Duration::from_secs(1)).unwrap();
        let judge = LlmJudge::new("sec", "security", "m", client);
        let p = judge.prompt(&case());
        assert!(p.starts_with("You are a security expert."));
        assert!(p.contains("Command: REFRESH_TOKEN"));
        assert!(p.contains("\"service\":\"linkedin\""));
        assert!(p.contains("Severity: MEDIUM"));
        assert!(!p.contains("Risk Assessment"));
    }

    #[test]
    fn prompt_uses_resolved_severity_and_screen() {
        let client = ChatClient::new("http://127.0.0.1:9", None, Duration::from_secs(1)).unwrap();
        let judge = LlmJudge::new("sec", "security", "m", client);
        let undeclared = Command::new(
            "rk-1",
            CommandType::new("ROTATE_KEYS").unwrap(),
            Params::new(),
            None,
        );
        let case = Case::new(undeclared, Severity::High)
            .with_screen(Some(RiskReport::new(0.42, "touches credentials", true)));
        let p = judge.prompt(&case);
        assert!(p.contains("Severity: HIGH"), "{p}");
        assert!(!p.contains("UNSPECIFIED"));
        assert!(p.contains("Risk Assessment: touches credentials (score: 0.42)"));
    }

    #[tokio::test]
    async fn approval_reply_becomes_approve() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(reply(r#"{"score": 0.9, "rationale": "scoped refresh", "approved": true}"#))
            .create_async()
            .await;
        let opinion = judge_against(&server, Some("k")).await.evaluate(&case()).await.unwrap();
        assert_eq!(opinion.verdict, gate_core::judge::Verdict::Approve);
        assert_eq!(opinion.rationale, "scoped refresh (score 0.90)");
    }

    #[tokio::test]
    async fn reply_without_verdict_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(reply("Looks fine to me."))
            .create_async()
            .await;
        let err = judge_against(&server, Some("k")).await.evaluate(&case()).await.unwrap_err();
        assert!(matches!(err, JudgeError::Unavailable(_)));
    }

    #[tokio::test]
    async fn missing_key_is_unavailable() {
        let server = mockito::Server::new_async().await;
        let err = judge_against(&server, None).await.evaluate(&case()).await.unwrap_err();
        assert!(matches!(err, JudgeError::Unavailable(_)));
    }

    #[test]
    fn default_config_seats_three_llm_judges() {
        let mut cfg = GateConfig::default();
        cfg.secrets_dir = std::path::PathBuf::from("/nonexistent/actiongate-secrets");
        let panel = build_panel(&cfg).unwrap();
        assert_eq!(panel.judge_ids(), vec!["security", "compliance", "business"]);
    }

    #[test]
    fn empty_panel_is_rejected() {
        let mut cfg = GateConfig::default();
        cfg.judges.panel = Some(Vec::new());
        assert!(build_panel(&cfg).is_err());
    }
}
