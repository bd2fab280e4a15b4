//! Orchestrator: drives one submitted command from RECEIVED to a terminal
//! state and writes exactly one audit record for it.
//!
//! Each submission is independent. The only shared inputs are the policy
//! snapshot (read once per action), the panel, the bridge and the ledger.
//! Stages hand their results back to `submit_with_cancel`, which is the only
//! place the `ActionRecord` is mutated.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::alert::{AlertSink, LogAlertSink, OperatorAlert};
use crate::breaker::CircuitBreaker;
use crate::bridge::{BridgeError, ExecutionBridge};
use crate::error::{GateError, Result};
use crate::judge::{Case, JudgePanel, JudgeVote, PanelOutcome, PanelVerdict};
use crate::ledger::{ActionRecord, ActionStatus, AuditLedger, FailureKind};
use crate::metrics::{DecisionEntry, Metrics};
use crate::policy::PolicyStore;
use crate::screen::{RiskReport, RiskScreen};
use crate::types::{Command, Severity};
use crate::validator::{validate, Decision};

pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What the caller is told once the action has been recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub action_id: String,
    pub status: ActionStatus,
    pub severity: Severity,
    pub rationale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub votes: Vec<JudgeVote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl From<&ActionRecord> for Outcome {
    fn from(r: &ActionRecord) -> Self {
        Self {
            action_id: r.action_id.clone(),
            status: r.status,
            severity: r.severity,
            rationale: r.rationale.clone(),
            tool_result: r.result.clone(),
            votes: r.votes.clone(),
            failure: r.failure,
        }
    }
}

// ---------------------------------------------------------------------------
// In-flight reservations
// ---------------------------------------------------------------------------

/// Holds an action_id for the duration of one submission so a concurrent
/// duplicate is turned away before it reaches the validator.
struct Reservation<'a> {
    held: &'a Mutex<HashSet<String>>,
    action_id: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.action_id);
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    policies: Arc<dyn PolicyStore>,
    panel: JudgePanel,
    bridge: Arc<dyn ExecutionBridge>,
    ledger: Arc<dyn AuditLedger>,
    alerts: Arc<dyn AlertSink>,
    metrics: Arc<Metrics>,
    screen: Option<Arc<dyn RiskScreen>>,
    breaker: Option<Arc<CircuitBreaker>>,
    dispatch_limit: Option<Arc<Semaphore>>,
    dispatch_timeout: Duration,
    in_flight: Mutex<HashSet<String>>,
}

impl Orchestrator {
    pub fn new(
        policies: Arc<dyn PolicyStore>,
        panel: JudgePanel,
        bridge: Arc<dyn ExecutionBridge>,
        ledger: Arc<dyn AuditLedger>,
    ) -> Self {
        Self {
            policies,
            panel,
            bridge,
            ledger,
            alerts: Arc::new(LogAlertSink),
            metrics: Arc::new(Metrics::new()),
            screen: None,
            breaker: None,
            dispatch_limit: None,
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Run `screen` once per action on the JUDGE path and show its report
    /// to the panel.
    pub fn with_screen(mut self, screen: Arc<dyn RiskScreen>) -> Self {
        self.screen = Some(screen);
        self
    }

    /// Fail dispatches fast while `breaker` is open.
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Cap the number of bridge calls in flight across all actions.
    pub fn with_dispatch_limit(mut self, max_concurrent: usize) -> Self {
        self.dispatch_limit = Some(Arc::new(Semaphore::new(max_concurrent.max(1))));
        self
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    pub fn policies(&self) -> &Arc<dyn PolicyStore> {
        &self.policies
    }

    pub fn panel(&self) -> &JudgePanel {
        &self.panel
    }

    pub fn bridge(&self) -> &Arc<dyn ExecutionBridge> {
        &self.bridge
    }

    pub fn ledger(&self) -> &Arc<dyn AuditLedger> {
        &self.ledger
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn screen(&self) -> Option<&Arc<dyn RiskScreen>> {
        self.screen.as_ref()
    }

    pub fn breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    pub async fn submit(&self, command: Command) -> Result<Outcome> {
        self.submit_with_cancel(command, CancellationToken::new())
            .await
    }

    /// Run the submission on its own task. Cancelling the returned token
    /// stops in-flight judge and bridge calls; the task still records the
    /// action as FAILED/CANCELLED before it finishes.
    pub fn spawn_submission(
        self: &Arc<Self>,
        command: Command,
    ) -> (JoinHandle<Result<Outcome>>, CancellationToken) {
        let token = CancellationToken::new();
        let child = token.clone();
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.submit_with_cancel(command, child).await });
        (handle, token)
    }

    pub async fn submit_with_cancel(
        &self,
        command: Command,
        cancel: CancellationToken,
    ) -> Result<Outcome> {
        self.metrics.record_submission();
        if let Err(e) = command.check() {
            self.metrics.record_validation_error();
            return Err(e.into());
        }

        let _reservation = self.reserve(&command.action_id)?;
        if self.ledger.contains(&command.action_id).await? {
            self.metrics.record_duplicate();
            tracing::warn!(action_id = %command.action_id, "duplicate action rejected");
            return Err(GateError::DuplicateAction(command.action_id));
        }

        let snapshot = self.policies.snapshot();
        let ruling = match validate(&command, &snapshot) {
            Ok(r) => r,
            Err(e) => {
                self.metrics.record_validation_error();
                tracing::warn!(action_id = %command.action_id, "rejected malformed command: {e}");
                return Err(e.into());
            }
        };
        tracing::info!(
            action_id = %command.action_id,
            command_type = %command.command_type,
            severity = %ruling.severity,
            decision = %ruling.decision,
            policy_version = snapshot.version(),
            "action received"
        );

        let mut record = ActionRecord::received(command, ruling.severity);
        let mut judge_calls = 0;

        match ruling.decision {
            Decision::Block => {
                record.block(ruling.rationale)?;
            }
            Decision::Allow => {
                record.decision = Some(Decision::Allow);
                record.rationale = ruling.rationale;
                record.advance(ActionStatus::Dispatching)?;
            }
            Decision::Judge => {
                record.decision = Some(Decision::Judge);
                record.advance(ActionStatus::AwaitingJudgment)?;
                judge_calls = self.panel.len();
                self.metrics.record_judge_calls(judge_calls);

                let case = Case::new(record.command.clone(), record.severity);
                let judged = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    j = self.judge(case) => Some(j),
                };
                match judged {
                    None => record.fail(FailureKind::Cancelled, "cancelled during judgment")?,
                    Some((v, screen)) => {
                        record.screen = screen;
                        if v.outcome == PanelOutcome::Approved {
                            record.rationale = v.rationale();
                            record.votes = v.votes;
                            record.advance(ActionStatus::Dispatching)?;
                        } else {
                            let rationale = v.rationale();
                            record.needs_approval(v.votes, rationale)?;
                        }
                    }
                }
            }
        }

        if record.status == ActionStatus::Dispatching {
            let dispatched = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                r = self.dispatch(&record.command) => Some(r),
            };
            match dispatched {
                None => record.fail(FailureKind::Cancelled, "cancelled during dispatch")?,
                Some(Ok(value)) => record.succeed(value)?,
                Some(Err(e)) => {
                    tracing::error!(action_id = %record.action_id, "execution bridge failed: {e}");
                    let (kind, message) = match e {
                        BridgeError::Timeout => {
                            (FailureKind::Timeout, "execution bridge timed out".to_string())
                        }
                        BridgeError::RemoteError(m) => (FailureKind::RemoteError, m),
                        BridgeError::InvalidParams(m) => (FailureKind::InvalidParams, m),
                    };
                    record.fail(kind, message)?;
                }
            }
        }

        self.finish(record, judge_calls).await
    }

    fn reserve(&self, action_id: &str) -> Result<Reservation<'_>> {
        let mut held = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(action_id.to_string()) {
            self.metrics.record_duplicate();
            tracing::warn!(action_id, "duplicate action rejected while first is in flight");
            return Err(GateError::DuplicateAction(action_id.to_string()));
        }
        Ok(Reservation {
            held: &self.in_flight,
            action_id: action_id.to_string(),
        })
    }

    /// Pre-screen (when configured) then ask the panel.
    async fn judge(&self, case: Case) -> (PanelVerdict, Option<RiskReport>) {
        let screen = self.prescreen(&case.command).await;
        let case = case.with_screen(screen);
        let verdict = self.panel.evaluate(&case).await;
        (verdict, case.screen)
    }

    /// Run the risk screen, bounded by the panel timeout. `None` when no
    /// screen is configured; a failed or slow screen only omits the report.
    pub async fn prescreen(&self, command: &Command) -> Option<RiskReport> {
        let screen = self.screen.as_ref()?;
        match tokio::time::timeout(self.panel.timeout(), screen.screen(command)).await {
            Ok(Ok(report)) => {
                tracing::info!(
                    action_id = %command.action_id,
                    risk_score = report.risk_score,
                    safe = report.safe,
                    "risk screen"
                );
                Some(report)
            }
            Ok(Err(e)) => {
                tracing::warn!(action_id = %command.action_id, "{e}");
                None
            }
            Err(_) => {
                tracing::warn!(action_id = %command.action_id, "risk screen timed out");
                None
            }
        }
    }

    async fn dispatch(&self, command: &Command) -> std::result::Result<Value, BridgeError> {
        if let Some(breaker) = &self.breaker {
            if !breaker.allow() {
                tracing::warn!(action_id = %command.action_id, breaker = breaker.name(), "dispatch refused: circuit open");
                return Err(BridgeError::RemoteError("circuit open".into()));
            }
        }
        let _permit = match &self.dispatch_limit {
            Some(sem) => Some(
                Arc::clone(sem)
                    .acquire_owned()
                    .await
                    .map_err(|e| BridgeError::RemoteError(e.to_string()))?,
            ),
            None => None,
        };
        let result = tokio::time::timeout(self.dispatch_timeout, self.bridge.dispatch(command))
            .await
            .unwrap_or(Err(BridgeError::Timeout));
        if let Some(breaker) = &self.breaker {
            breaker.record(&result);
        }
        result
    }

    /// Append to the ledger, alert if needed, then report. A storage failure
    /// is returned to the caller before any alert: nothing unrecorded is
    /// reported or paged.
    async fn finish(&self, record: ActionRecord, judge_calls: usize) -> Result<Outcome> {
        let alert_worthy = match record.status {
            ActionStatus::NeedsApproval => true,
            ActionStatus::Blocked => record.severity == Severity::High,
            _ => false,
        };
        let alert = alert_worthy.then(|| OperatorAlert {
            action_id: record.action_id.clone(),
            command_type: record.command.command_type.clone(),
            severity: record.severity,
            status: record.status,
            rationale: record.rationale.clone(),
            raised_at: Utc::now(),
        });

        let outcome = Outcome::from(&record);
        let entry = DecisionEntry {
            action_id: record.action_id.clone(),
            command_type: record.command.command_type.clone(),
            severity: record.severity,
            status: record.status,
            judge_calls,
            at: record.decided_at.unwrap_or_else(Utc::now),
        };

        if let Err(e) = self.ledger.append(record).await {
            tracing::error!(action_id = %outcome.action_id, "audit ledger append failed: {e}");
            return Err(e.into());
        }

        if let Some(alert) = alert {
            if let Err(e) = self.alerts.alert(&alert).await {
                self.metrics.record_alert_failure();
                tracing::error!(action_id = %outcome.action_id, "operator alert not delivered: {e}");
            }
        }
        self.metrics.record_outcome(entry);

        match outcome.status {
            ActionStatus::Success => {
                tracing::info!(action_id = %outcome.action_id, status = %outcome.status, "action finished")
            }
            _ => {
                tracing::warn!(action_id = %outcome.action_id, status = %outcome.status, "{}", outcome.rationale)
            }
        }
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
