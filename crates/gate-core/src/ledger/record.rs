//! `ActionRecord`: the lifecycle entity for one submitted command.
//!
//! Transitions:
//! ```text
//! RECEIVED ─┬─► BLOCKED
//!           ├─► DISPATCHING ─┬─► SUCCESS
//!           │                └─► FAILED
//!           └─► AWAITING_JUDGMENT ─┬─► DISPATCHING
//!                                  └─► NEEDS_APPROVAL
//! ```
//! Any non-terminal state may also move to FAILED when the submission is
//! cancelled. BLOCKED, NEEDS_APPROVAL, SUCCESS and FAILED are terminal.

use crate::error::{GateError, Result};
use crate::judge::JudgeVote;
use crate::screen::RiskReport;
use crate::types::{Command, Severity};
use crate::validator::Decision;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

// ---------------------------------------------------------------------------
// ActionStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Received,
    AwaitingJudgment,
    Dispatching,
    Blocked,
    NeedsApproval,
    Success,
    Failed,
}

impl ActionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Received => "RECEIVED",
            ActionStatus::AwaitingJudgment => "AWAITING_JUDGMENT",
            ActionStatus::Dispatching => "DISPATCHING",
            ActionStatus::Blocked => "BLOCKED",
            ActionStatus::NeedsApproval => "NEEDS_APPROVAL",
            ActionStatus::Success => "SUCCESS",
            ActionStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActionStatus::Blocked
                | ActionStatus::NeedsApproval
                | ActionStatus::Success
                | ActionStatus::Failed
        )
    }

    pub fn can_transition_to(self, to: ActionStatus) -> bool {
        use ActionStatus::*;
        match (self, to) {
            (Received, Blocked | Dispatching | AwaitingJudgment) => true,
            (AwaitingJudgment, NeedsApproval | Dispatching) => true,
            (Dispatching, Success) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// All terminal statuses, in display order.
    pub fn terminal() -> [ActionStatus; 4] {
        [
            ActionStatus::Success,
            ActionStatus::Blocked,
            ActionStatus::NeedsApproval,
            ActionStatus::Failed,
        ]
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FailureKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    Timeout,
    RemoteError,
    InvalidParams,
    Cancelled,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Timeout => "TIMEOUT",
            FailureKind::RemoteError => "REMOTE_ERROR",
            FailureKind::InvalidParams => "INVALID_PARAMS",
            FailureKind::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActionRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action_id: String,
    pub command: Command,
    /// Severity the command was evaluated at.
    pub severity: Severity,
    pub status: ActionStatus,
    /// Every state visited, starting with RECEIVED.
    pub path: Vec<ActionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub votes: Vec<JudgeVote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Risk pre-screen shown to the judges, when one ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen: Option<RiskReport>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}

impl ActionRecord {
    pub fn received(command: Command, severity: Severity) -> Self {
        Self {
            action_id: command.action_id.clone(),
            command,
            severity,
            status: ActionStatus::Received,
            path: vec![ActionStatus::Received],
            decision: None,
            rationale: String::new(),
            votes: Vec::new(),
            result: None,
            failure: None,
            screen: None,
            created_at: Utc::now(),
            decided_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `to`, rejecting transitions the state machine does not allow.
    pub fn advance(&mut self, to: ActionStatus) -> Result<()> {
        self.ensure(to)?;
        self.status = to;
        self.path.push(to);
        if to.is_terminal() {
            self.stamp_decided();
        }
        Ok(())
    }

    fn ensure(&self, to: ActionStatus) -> Result<()> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(GateError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            })
        }
    }

    pub fn block(&mut self, rationale: impl Into<String>) -> Result<()> {
        self.ensure(ActionStatus::Blocked)?;
        self.decision = Some(Decision::Block);
        self.rationale = rationale.into();
        self.advance(ActionStatus::Blocked)
    }

    pub fn needs_approval(&mut self, votes: Vec<JudgeVote>, rationale: impl Into<String>) -> Result<()> {
        self.ensure(ActionStatus::NeedsApproval)?;
        self.votes = votes;
        self.rationale = rationale.into();
        self.advance(ActionStatus::NeedsApproval)
    }

    pub fn succeed(&mut self, result: Value) -> Result<()> {
        self.ensure(ActionStatus::Success)?;
        self.result = Some(result);
        if self.rationale.is_empty() {
            self.rationale = "Action completed successfully".into();
        }
        self.advance(ActionStatus::Success)
    }

    /// Terminal failure. The result carries the error so `FAILED` always has
    /// a non-null result.
    pub fn fail(&mut self, kind: FailureKind, message: impl Into<String>) -> Result<()> {
        self.ensure(ActionStatus::Failed)?;
        let message = message.into();
        self.failure = Some(kind);
        self.result = Some(json!({ "error": kind.as_str(), "message": message }));
        self.rationale = match kind {
            FailureKind::Cancelled => "Submission cancelled before completion".to_string(),
            _ => format!("Execution error: {message}"),
        };
        self.advance(ActionStatus::Failed)
    }

    /// `decided_at` is strictly after `created_at`, even when the clock has
    /// not moved since the record was created.
    fn stamp_decided(&mut self) {
        let now = Utc::now();
        let decided = if now > self.created_at {
            now
        } else {
            self.created_at + chrono::Duration::microseconds(1)
        };
        self.decided_at = Some(decided);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::Verdict;
    use crate::types::{CommandType, Params};

    fn record() -> ActionRecord {
        let cmd = Command::new(
            "a-1",
            CommandType::new("REFRESH_TOKEN").unwrap(),
            Params::new(),
            Some(Severity::Medium),
        );
        ActionRecord::received(cmd, Severity::Medium)
    }

    #[test]
    fn happy_path_through_judgment() {
        let mut r = record();
        r.advance(ActionStatus::AwaitingJudgment).unwrap();
        r.advance(ActionStatus::Dispatching).unwrap();
        r.succeed(json!({"ok": true})).unwrap();
        assert_eq!(
            r.path,
            vec![
                ActionStatus::Received,
                ActionStatus::AwaitingJudgment,
                ActionStatus::Dispatching,
                ActionStatus::Success
            ]
        );
        assert!(r.decided_at.unwrap() > r.created_at);
        assert!(r.result.is_some());
    }

    #[test]
    fn cannot_dispatch_after_block() {
        let mut r = record();
        r.block("no").unwrap();
        assert!(r.votes.is_empty() && r.result.is_none());
        let err = r.advance(ActionStatus::Dispatching).unwrap_err();
        assert!(matches!(err, GateError::InvalidTransition { .. }));
    }

    #[test]
    fn cannot_skip_to_success() {
        let mut r = record();
        assert!(r.succeed(json!({})).is_err());
        assert_eq!(r.status, ActionStatus::Received);
    }

    #[test]
    fn failure_carries_error_result() {
        let mut r = record();
        r.advance(ActionStatus::Dispatching).unwrap();
        r.fail(FailureKind::RemoteError, "HTTP 500").unwrap();
        let result = r.result.as_ref().unwrap();
        assert_eq!(result["error"], "REMOTE_ERROR");
        assert_eq!(result["message"], "HTTP 500");
        assert!(r.rationale.contains("HTTP 500"));
    }

    #[test]
    fn cancel_from_awaiting_judgment() {
        let mut r = record();
        r.advance(ActionStatus::AwaitingJudgment).unwrap();
        r.fail(FailureKind::Cancelled, "caller went away").unwrap();
        assert_eq!(r.status, ActionStatus::Failed);
        assert_eq!(r.failure, Some(FailureKind::Cancelled));
    }

    #[test]
    fn terminal_states_cannot_fail_again() {
        let mut r = record();
        r.advance(ActionStatus::AwaitingJudgment).unwrap();
        r.needs_approval(
            vec![JudgeVote {
                judge_id: "security".into(),
                verdict: Verdict::Reject,
                rationale: "too risky".into(),
                failure: None,
            }],
            "Majority judge approval required",
        )
        .unwrap();
        assert!(r.fail(FailureKind::Cancelled, "late").is_err());
        assert_eq!(r.status, ActionStatus::NeedsApproval);
        assert!(r.result.is_none() && r.failure.is_none());
    }

    #[test]
    fn status_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_value(ActionStatus::NeedsApproval).unwrap(),
            json!("NEEDS_APPROVAL")
        );
        assert_eq!(
            serde_json::to_value(FailureKind::Cancelled).unwrap(),
            json!("CANCELLED")
        );
    }
}
