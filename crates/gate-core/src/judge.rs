//! Judge panel: independent reviewers voting on a pending command.
//!
//! Judges run concurrently, each under its own timeout. A judge that times
//! out or errors casts an implicit REJECT, recorded with its failure kind so
//! the audit trail can tell it apart from an explicit rejection.
//!
//! Majority rule: APPROVED iff approvals * 2 > panel size. An even split
//! rejects.

use crate::error::{GateError, Result};
use crate::screen::RiskReport;
use crate::types::{Command, Severity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Votes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Approve,
    Reject,
}

/// Why a judge did not produce an explicit verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeFailure {
    Timeout,
    Unavailable,
}

impl fmt::Display for JudgeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JudgeFailure::Timeout => "timeout",
            JudgeFailure::Unavailable => "unavailable",
        })
    }
}

/// A judge's explicit answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opinion {
    pub verdict: Verdict,
    pub rationale: String,
}

impl Opinion {
    pub fn approve(rationale: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Approve,
            rationale: rationale.into(),
        }
    }

    pub fn reject(rationale: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Reject,
            rationale: rationale.into(),
        }
    }
}

/// One recorded vote. `failure` is set when the verdict is an implicit
/// REJECT caused by a timeout or an unavailable judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVote {
    pub judge_id: String,
    pub verdict: Verdict,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<JudgeFailure>,
}

impl JudgeVote {
    pub fn approves(&self) -> bool {
        self.verdict == Verdict::Approve
    }

    fn failed(judge_id: &str, failure: JudgeFailure, rationale: String) -> Self {
        Self {
            judge_id: judge_id.to_string(),
            verdict: Verdict::Reject,
            rationale,
            failure: Some(failure),
        }
    }
}

// ---------------------------------------------------------------------------
// Judge trait
// ---------------------------------------------------------------------------

/// What a judge reviews: the command with the severity the validator
/// resolved and, when one ran, the risk pre-screen.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub command: Command,
    pub severity: Severity,
    pub screen: Option<RiskReport>,
}

impl Case {
    pub fn new(command: Command, severity: Severity) -> Self {
        Self {
            command,
            severity,
            screen: None,
        }
    }

    pub fn with_screen(mut self, screen: Option<RiskReport>) -> Self {
        self.screen = screen;
        self
    }
}

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("judge unavailable: {0}")]
    Unavailable(String),
}

/// A reviewer capability: given a case, approve or reject it.
#[async_trait]
pub trait Judge: Send + Sync {
    fn id(&self) -> &str;

    async fn evaluate(&self, case: &Case) -> std::result::Result<Opinion, JudgeError>;
}

/// A judge with a fixed answer. Useful for deterministic deployments where a
/// reviewer slot is filled by standing policy rather than a model.
#[derive(Debug, Clone)]
pub struct StaticJudge {
    id: String,
    opinion: Opinion,
}

impl StaticJudge {
    pub fn new(id: impl Into<String>, opinion: Opinion) -> Self {
        Self {
            id: id.into(),
            opinion,
        }
    }

    pub fn approving(id: impl Into<String>) -> Self {
        Self::new(id, Opinion::approve("standing approval"))
    }

    pub fn rejecting(id: impl Into<String>) -> Self {
        Self::new(id, Opinion::reject("standing rejection"))
    }
}

#[async_trait]
impl Judge for StaticJudge {
    fn id(&self) -> &str {
        &self.id
    }

    async fn evaluate(&self, _case: &Case) -> std::result::Result<Opinion, JudgeError> {
        Ok(self.opinion.clone())
    }
}

// ---------------------------------------------------------------------------
// Panel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PanelOutcome {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelVerdict {
    pub outcome: PanelOutcome,
    /// In panel order, one per configured judge.
    pub votes: Vec<JudgeVote>,
}

impl PanelVerdict {
    pub fn approvals(&self) -> usize {
        self.votes.iter().filter(|v| v.approves()).count()
    }

    /// Every judge failed to answer; the rejection says nothing about the
    /// command itself.
    pub fn is_systemic_failure(&self) -> bool {
        !self.votes.is_empty() && self.votes.iter().all(|v| v.failure.is_some())
    }

    /// Human-readable explanation of the outcome.
    pub fn rationale(&self) -> String {
        let total = self.votes.len();
        let approvals = self.approvals();
        match self.outcome {
            PanelOutcome::Approved => {
                format!("Approved by {approvals} of {total} judges")
            }
            PanelOutcome::Rejected if self.is_systemic_failure() => format!(
                "No judge could evaluate the action ({total} of {total} failed); manual approval required"
            ),
            PanelOutcome::Rejected => {
                format!("Majority judge approval required: {approvals} of {total} approved")
            }
        }
    }
}

pub fn majority(approvals: usize, total: usize) -> PanelOutcome {
    if approvals * 2 > total {
        PanelOutcome::Approved
    } else {
        PanelOutcome::Rejected
    }
}

/// A fixed set of at least one judge plus the per-judge timeout.
#[derive(Clone)]
pub struct JudgePanel {
    judges: Vec<Arc<dyn Judge>>,
    timeout: Duration,
}

impl fmt::Debug for JudgePanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JudgePanel")
            .field("judges", &self.judge_ids())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl JudgePanel {
    pub fn new(judges: Vec<Arc<dyn Judge>>, timeout: Duration) -> Result<Self> {
        if judges.is_empty() {
            return Err(GateError::EmptyPanel);
        }
        Ok(Self { judges, timeout })
    }

    pub fn len(&self) -> usize {
        self.judges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.judges.is_empty()
    }

    pub fn judge_ids(&self) -> Vec<&str> {
        self.judges.iter().map(|j| j.id()).collect()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask every judge once, concurrently, and apply the majority rule.
    ///
    /// Never retries and never caches: each call yields fresh votes.
    pub async fn evaluate(&self, case: &Case) -> PanelVerdict {
        let action_id = case.command.action_id.as_str();
        let calls = self.judges.iter().map(|judge| {
            let judge = Arc::clone(judge);
            async move {
                let id = judge.id().to_string();
                match tokio::time::timeout(self.timeout, judge.evaluate(case)).await {
                    Ok(Ok(opinion)) => JudgeVote {
                        judge_id: id,
                        verdict: opinion.verdict,
                        rationale: opinion.rationale,
                        failure: None,
                    },
                    Ok(Err(e)) => {
                        tracing::warn!(judge = %id, action_id, "judge failed: {e}");
                        JudgeVote::failed(&id, JudgeFailure::Unavailable, e.to_string())
                    }
                    Err(_) => {
                        tracing::warn!(judge = %id, action_id, "judge timed out");
                        JudgeVote::failed(
                            &id,
                            JudgeFailure::Timeout,
                            format!("no answer within {}ms", self.timeout.as_millis()),
                        )
                    }
                }
            }
        });
        let votes = futures::future::join_all(calls).await;
        let approvals = votes.iter().filter(|v| v.approves()).count();
        PanelVerdict {
            outcome: majority(approvals, self.judges.len()),
            votes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CommandType, Params};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowJudge;

    #[async_trait]
    impl Judge for SlowJudge {
        fn id(&self) -> &str {
            "slow"
        }
        async fn evaluate(&self, _c: &Case) -> std::result::Result<Opinion, JudgeError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Opinion::approve("too late"))
        }
    }

    struct BrokenJudge;

    #[async_trait]
    impl Judge for BrokenJudge {
        fn id(&self) -> &str {
            "broken"
        }
        async fn evaluate(&self, _c: &Case) -> std::result::Result<Opinion, JudgeError> {
            Err(JudgeError::Unavailable("connection refused".into()))
        }
    }

    struct CountingJudge(AtomicUsize);

    #[async_trait]
    impl Judge for CountingJudge {
        fn id(&self) -> &str {
            "counting"
        }
        async fn evaluate(&self, _c: &Case) -> std::result::Result<Opinion, JudgeError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Opinion::approve("ok"))
        }
    }

    fn case() -> Case {
        let command = Command::new(
            "token-refresh-google-456",
            CommandType::new("REFRESH_TOKEN").unwrap(),
            Params::new(),
            Some(Severity::Medium),
        );
        Case::new(command, Severity::Medium)
    }

    fn j(judge: impl Judge + 'static) -> Arc<dyn Judge> {
        Arc::new(judge)
    }

    fn panel(judges: Vec<Arc<dyn Judge>>) -> JudgePanel {
        JudgePanel::new(judges, Duration::from_millis(50)).unwrap()
    }

    #[test]
    fn majority_is_strict() {
        assert_eq!(majority(1, 2), PanelOutcome::Rejected);
        assert_eq!(majority(2, 3), PanelOutcome::Approved);
        assert_eq!(majority(2, 4), PanelOutcome::Rejected);
        assert_eq!(majority(1, 1), PanelOutcome::Approved);
        assert_eq!(majority(0, 1), PanelOutcome::Rejected);
    }

    #[test]
    fn empty_panel_is_an_error() {
        assert!(matches!(
            JudgePanel::new(Vec::new(), Duration::from_secs(1)),
            Err(GateError::EmptyPanel)
        ));
    }

    #[tokio::test]
    async fn unanimous_approval() {
        let p = panel(vec![
            j(StaticJudge::approving("security")),
            j(StaticJudge::approving("compliance")),
            j(StaticJudge::approving("business")),
        ]);
        let v = p.evaluate(&case()).await;
        assert_eq!(v.outcome, PanelOutcome::Approved);
        assert_eq!(v.votes.len(), 3);
        assert_eq!(v.votes[0].judge_id, "security");
        assert_eq!(v.votes[2].judge_id, "business");
    }

    #[tokio::test]
    async fn even_split_rejects() {
        let p = panel(vec![
            j(StaticJudge::approving("a")),
            j(StaticJudge::rejecting("b")),
        ]);
        let v = p.evaluate(&case()).await;
        assert_eq!(v.outcome, PanelOutcome::Rejected);
        assert!(!v.is_systemic_failure());
        assert!(v.rationale().contains("1 of 2"));
    }

    #[tokio::test]
    async fn timeout_counts_as_reject_but_majority_can_still_approve() {
        let p = panel(vec![
            j(StaticJudge::approving("a")),
            j(StaticJudge::approving("b")),
            j(SlowJudge),
        ]);
        let v = p.evaluate(&case()).await;
        assert_eq!(v.outcome, PanelOutcome::Approved);
        let slow = &v.votes[2];
        assert_eq!(slow.verdict, Verdict::Reject);
        assert_eq!(slow.failure, Some(JudgeFailure::Timeout));
    }

    #[tokio::test]
    async fn one_approve_one_timeout_rejects() {
        let p = panel(vec![
            j(StaticJudge::approving("a")),
            j(SlowJudge),
        ]);
        let v = p.evaluate(&case()).await;
        assert_eq!(v.outcome, PanelOutcome::Rejected);
    }

    #[tokio::test]
    async fn error_is_recorded_as_unavailable() {
        let p = panel(vec![j(BrokenJudge), j(StaticJudge::approving("a"))]);
        let v = p.evaluate(&case()).await;
        assert_eq!(v.votes[0].failure, Some(JudgeFailure::Unavailable));
        assert!(v.votes[0].rationale.contains("connection refused"));
        assert!(v.votes[1].failure.is_none());
    }

    #[tokio::test]
    async fn all_failures_is_systemic() {
        let p = panel(vec![j(BrokenJudge), j(SlowJudge)]);
        let v = p.evaluate(&case()).await;
        assert_eq!(v.outcome, PanelOutcome::Rejected);
        assert!(v.is_systemic_failure());
        assert!(v.rationale().contains("manual approval"));
    }

    #[tokio::test]
    async fn every_evaluation_calls_judges_afresh() {
        let judge = Arc::new(CountingJudge(AtomicUsize::new(0)));
        let shared: Arc<dyn Judge> = judge.clone();
        let p = panel(vec![shared]);
        p.evaluate(&case()).await;
        p.evaluate(&case()).await;
        assert_eq!(judge.0.load(Ordering::SeqCst), 2);
    }
}
