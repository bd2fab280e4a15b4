//! Process-scoped decision metrics.
//!
//! Created once at startup and handed to the orchestrator; nothing here is a
//! global. Counters are atomics; the recent-decision history is a ring capped
//! at [`RECENT_CAPACITY`] entries.

use crate::ledger::ActionStatus;
use crate::types::{CommandType, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

pub const RECENT_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionEntry {
    pub action_id: String,
    pub command_type: CommandType,
    pub severity: Severity,
    pub status: ActionStatus,
    pub judge_calls: usize,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub success: u64,
    pub blocked: u64,
    pub needs_approval: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub started_at: DateTime<Utc>,
    pub submissions: u64,
    pub duplicates: u64,
    pub validation_errors: u64,
    pub judge_invocations: u64,
    pub alerts_failed: u64,
    pub outcomes: StatusCounts,
    /// Newest last.
    pub recent: Vec<DecisionEntry>,
}

#[derive(Debug)]
pub struct Metrics {
    started_at: DateTime<Utc>,
    submissions: AtomicU64,
    duplicates: AtomicU64,
    validation_errors: AtomicU64,
    judge_invocations: AtomicU64,
    alerts_failed: AtomicU64,
    success: AtomicU64,
    blocked: AtomicU64,
    needs_approval: AtomicU64,
    failed: AtomicU64,
    recent: Mutex<VecDeque<DecisionEntry>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            submissions: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            validation_errors: AtomicU64::new(0),
            judge_invocations: AtomicU64::new(0),
            alerts_failed: AtomicU64::new(0),
            success: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            needs_approval: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_CAPACITY)),
        }
    }

    pub fn record_submission(&self) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation_error(&self) {
        self.validation_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_judge_calls(&self, n: usize) {
        self.judge_invocations.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_alert_failure(&self) {
        self.alerts_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn judge_invocations(&self) -> u64 {
        self.judge_invocations.load(Ordering::Relaxed)
    }

    /// Count a terminal outcome and push it onto the recent ring.
    pub fn record_outcome(&self, entry: DecisionEntry) {
        let counter = match entry.status {
            ActionStatus::Success => &self.success,
            ActionStatus::Blocked => &self.blocked,
            ActionStatus::NeedsApproval => &self.needs_approval,
            ActionStatus::Failed => &self.failed,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        if recent.len() >= RECENT_CAPACITY {
            recent.pop_front();
        }
        recent.push_back(entry);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let recent = self
            .recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        MetricsSnapshot {
            started_at: self.started_at,
            submissions: self.submissions.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            validation_errors: self.validation_errors.load(Ordering::Relaxed),
            judge_invocations: self.judge_invocations.load(Ordering::Relaxed),
            alerts_failed: self.alerts_failed.load(Ordering::Relaxed),
            outcomes: StatusCounts {
                success: self.success.load(Ordering::Relaxed),
                blocked: self.blocked.load(Ordering::Relaxed),
                needs_approval: self.needs_approval.load(Ordering::Relaxed),
                failed: self.failed.load(Ordering::Relaxed),
            },
            recent,
        }
    }
}
