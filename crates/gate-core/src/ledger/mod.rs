//! Audit ledger: append-only record of every action's inputs, decision path
//! and outcome.
//!
//! `action_id` is unique for the lifetime of a ledger. Appending a record
//! whose id is already present fails with `LedgerError::Duplicate` and leaves
//! the stored record untouched.

pub mod db;
pub mod record;

pub use db::RedbLedger;
pub use record::{ActionRecord, ActionStatus, FailureKind};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("duplicate action: {0}")]
    Duplicate(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<LedgerError> for crate::error::GateError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Duplicate(id) => crate::error::GateError::DuplicateAction(id),
            LedgerError::Storage(msg) => crate::error::GateError::Storage(msg),
        }
    }
}

#[async_trait]
pub trait AuditLedger: Send + Sync {
    async fn append(&self, record: ActionRecord) -> Result<(), LedgerError>;

    async fn contains(&self, action_id: &str) -> Result<bool, LedgerError>;

    async fn get(&self, action_id: &str) -> Result<Option<ActionRecord>, LedgerError>;

    /// Records newest first, at most `limit` of them.
    async fn list(&self, limit: usize) -> Result<Vec<ActionRecord>, LedgerError>;
}

/// Ledger held in process memory. Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<HashMap<String, ActionRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditLedger for MemoryLedger {
    async fn append(&self, record: ActionRecord) -> Result<(), LedgerError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(&record.action_id) {
            return Err(LedgerError::Duplicate(record.action_id));
        }
        records.insert(record.action_id.clone(), record);
        Ok(())
    }

    async fn contains(&self, action_id: &str) -> Result<bool, LedgerError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(action_id))
    }

    async fn get(&self, action_id: &str) -> Result<Option<ActionRecord>, LedgerError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(action_id)
            .cloned())
    }

    async fn list(&self, limit: usize) -> Result<Vec<ActionRecord>, LedgerError> {
        let mut all: Vec<ActionRecord> = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        Ok(all)
    }
}
