//! Persistent audit ledger using redb.
//!
//! # Table design
//!
//! `RECORDS` is keyed by `action_id` (UTF-8 string), value is the
//! JSON-encoded `ActionRecord`. The existence check and the insert happen in
//! one write transaction, so two appends racing on the same id cannot both
//! succeed.
//!
//! `BY_CREATED` indexes the same records by a composite key:
//! ```text
//! [ created_at_ns: u64 big-endian (8 bytes) | action_id bytes ]
//! ```
//! Byte order equals creation order, so "newest N" is a reverse scan that
//! stops after N entries. Both tables are written in the same transaction.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

use super::record::ActionRecord;
use super::{AuditLedger, LedgerError};

// ---------------------------------------------------------------------------
// Table definition
// ---------------------------------------------------------------------------

/// Key: action_id
/// Value: JSON-encoded ActionRecord
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("action_records");

/// Key: created_at nanoseconds big-endian ++ action_id
/// Value: action_id
const BY_CREATED: TableDefinition<&[u8], &str> = TableDefinition::new("action_records_by_created");

fn created_key(created_at: DateTime<Utc>, action_id: &str) -> Vec<u8> {
    let ns = created_at.timestamp_nanos_opt().unwrap_or(0).max(0) as u64;
    let mut key = Vec::with_capacity(8 + action_id.len());
    key.extend_from_slice(&ns.to_be_bytes());
    key.extend_from_slice(action_id.as_bytes());
    key
}

fn storage<E: std::fmt::Display>(e: E) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

// ---------------------------------------------------------------------------
// RedbLedger
// ---------------------------------------------------------------------------

/// Durable ledger. Clones share the same database handle.
#[derive(Clone)]
pub struct RedbLedger {
    db: Arc<Database>,
}

impl RedbLedger {
    /// Open or create the redb database at `path`.
    ///
    /// Creates both tables if they don't already exist, and rebuilds the
    /// creation index for a file written before it existed.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(storage)?;
            }
        }
        let db = Database::create(path).map_err(storage)?;
        let wt = db.begin_write().map_err(storage)?;
        {
            let records = wt.open_table(RECORDS).map_err(storage)?;
            let mut index = wt.open_table(BY_CREATED).map_err(storage)?;
            if index.is_empty().map_err(storage)? && !records.is_empty().map_err(storage)? {
                let mut rebuilt = 0usize;
                for entry in records.iter().map_err(storage)? {
                    let (k, v) = entry.map_err(storage)?;
                    let record: ActionRecord = serde_json::from_slice(v.value()).map_err(storage)?;
                    index
                        .insert(created_key(record.created_at, k.value()).as_slice(), k.value())
                        .map_err(storage)?;
                    rebuilt += 1;
                }
                tracing::info!(records = rebuilt, "rebuilt audit ledger creation index");
            }
        }
        wt.commit().map_err(storage)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn append_blocking(&self, record: &ActionRecord) -> Result<(), LedgerError> {
        let value = serde_json::to_vec(record).map_err(storage)?;
        let wt = self.db.begin_write().map_err(storage)?;
        {
            let mut table = wt.open_table(RECORDS).map_err(storage)?;
            if table
                .get(record.action_id.as_str())
                .map_err(storage)?
                .is_some()
            {
                return Err(LedgerError::Duplicate(record.action_id.clone()));
            }
            table
                .insert(record.action_id.as_str(), value.as_slice())
                .map_err(storage)?;
            let mut index = wt.open_table(BY_CREATED).map_err(storage)?;
            index
                .insert(
                    created_key(record.created_at, &record.action_id).as_slice(),
                    record.action_id.as_str(),
                )
                .map_err(storage)?;
        }
        wt.commit().map_err(storage)?;
        Ok(())
    }

    pub fn get_blocking(&self, action_id: &str) -> Result<Option<ActionRecord>, LedgerError> {
        let rt = self.db.begin_read().map_err(storage)?;
        let table = rt.open_table(RECORDS).map_err(storage)?;
        match table.get(action_id).map_err(storage)? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value()).map_err(storage)?)),
            None => Ok(None),
        }
    }

    /// The newest `limit` records, newest first. Reads only the entries it
    /// returns.
    pub fn list_blocking(&self, limit: usize) -> Result<Vec<ActionRecord>, LedgerError> {
        let rt = self.db.begin_read().map_err(storage)?;
        let index = rt.open_table(BY_CREATED).map_err(storage)?;
        let records = rt.open_table(RECORDS).map_err(storage)?;

        let mut result = Vec::with_capacity(limit.min(1024));
        for entry in index.iter().map_err(storage)?.rev().take(limit) {
            let (_, id) = entry.map_err(storage)?;
            if let Some(v) = records.get(id.value()).map_err(storage)? {
                result.push(serde_json::from_slice(v.value()).map_err(storage)?);
            }
        }
        Ok(result)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(RedbLedger) -> Result<T, LedgerError> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || f(this))
            .await
            .map_err(|e| LedgerError::Storage(format!("task join error: {e}")))?
    }
}

#[async_trait]
impl AuditLedger for RedbLedger {
    async fn append(&self, record: ActionRecord) -> Result<(), LedgerError> {
        self.blocking(move |l| l.append_blocking(&record)).await
    }

    async fn contains(&self, action_id: &str) -> Result<bool, LedgerError> {
        let id = action_id.to_string();
        self.blocking(move |l| Ok(l.get_blocking(&id)?.is_some()))
            .await
    }

    async fn get(&self, action_id: &str) -> Result<Option<ActionRecord>, LedgerError> {
        let id = action_id.to_string();
        self.blocking(move |l| l.get_blocking(&id)).await
    }

    async fn list(&self, limit: usize) -> Result<Vec<ActionRecord>, LedgerError> {
        self.blocking(move |l| l.list_blocking(limit)).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::record::{ActionStatus, FailureKind};
    use crate::types::{Command, CommandType, Params, Severity};
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, RedbLedger) {
        let dir = TempDir::new().unwrap();
        let ledger = RedbLedger::open(&dir.path().join("audit.redb")).unwrap();
        (dir, ledger)
    }

    fn failed_record(id: &str) -> ActionRecord {
        let cmd = Command::new(
            id,
            CommandType::new("REFRESH_TOKEN").unwrap(),
            Params::new(),
            Some(Severity::Medium),
        );
        let mut r = ActionRecord::received(cmd, Severity::Medium);
        r.advance(ActionStatus::Dispatching).unwrap();
        r.fail(FailureKind::Timeout, "no answer").unwrap();
        r
    }

    #[test]
    fn append_then_get_returns_same_record() {
        let (_dir, ledger) = open_tmp();
        let r = failed_record("token-refresh-1");
        ledger.append_blocking(&r).unwrap();
        let got = ledger.get_blocking("token-refresh-1").unwrap().unwrap();
        assert_eq!(got, r);
    }

    #[test]
    fn duplicate_append_is_rejected() {
        let (_dir, ledger) = open_tmp();
        ledger.append_blocking(&failed_record("dup")).unwrap();
        let err = ledger.append_blocking(&failed_record("dup")).unwrap_err();
        assert!(matches!(err, LedgerError::Duplicate(_)));
        assert_eq!(ledger.list_blocking(10).unwrap().len(), 1);
    }

    #[test]
    fn missing_record_is_none() {
        let (_dir, ledger) = open_tmp();
        assert!(ledger.get_blocking("nope").unwrap().is_none());
    }

    #[test]
    fn records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.redb");
        {
            let ledger = RedbLedger::open(&path).unwrap();
            ledger.append_blocking(&failed_record("persisted")).unwrap();
        }
        let ledger = RedbLedger::open(&path).unwrap();
        let r = ledger.get_blocking("persisted").unwrap().unwrap();
        assert_eq!(r.failure, Some(FailureKind::Timeout));
    }

    #[tokio::test]
    async fn async_trait_methods_round_through_blocking_pool() {
        let (_dir, ledger) = open_tmp();
        ledger.append(failed_record("async-1")).await.unwrap();
        assert!(ledger.contains("async-1").await.unwrap());
        assert!(!ledger.contains("async-2").await.unwrap());
        assert_eq!(ledger.list(5).await.unwrap().len(), 1);
    }

    #[test]
    fn list_is_newest_first_and_limited() {
        let (_dir, ledger) = open_tmp();
        let base = Utc::now();
        // appended out of creation order
        for (id, offset) in [("b", 2), ("a", 1), ("d", 4), ("c", 3)] {
            let mut r = failed_record(id);
            r.created_at = base + chrono::Duration::seconds(offset);
            ledger.append_blocking(&r).unwrap();
        }
        let ids: Vec<String> = ledger
            .list_blocking(2)
            .unwrap()
            .into_iter()
            .map(|r| r.action_id)
            .collect();
        assert_eq!(ids, vec!["d", "c"]);
        assert_eq!(ledger.list_blocking(10).unwrap().len(), 4);
        assert!(ledger.list_blocking(0).unwrap().is_empty());
    }

    #[test]
    fn creation_key_orders_by_time_then_id() {
        let t = Utc::now();
        let later = t + chrono::Duration::nanoseconds(1);
        assert!(created_key(t, "zzz") < created_key(later, "aaa"));
        assert!(created_key(t, "a") < created_key(t, "b"));
    }

    #[test]
    fn index_is_rebuilt_for_older_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.redb");
        {
            // records table only, as written before the index existed
            let db = Database::create(&path).unwrap();
            let wt = db.begin_write().unwrap();
            {
                let mut table = wt.open_table(RECORDS).unwrap();
                for id in ["old-1", "old-2"] {
                    let value = serde_json::to_vec(&failed_record(id)).unwrap();
                    table.insert(id, value.as_slice()).unwrap();
                }
            }
            wt.commit().unwrap();
        }
        let ledger = RedbLedger::open(&path).unwrap();
        assert_eq!(ledger.list_blocking(10).unwrap().len(), 2);
    }

    #[test]
    fn empty_ledger_lists_nothing() {
        let (_dir, ledger) = open_tmp();
        assert!(ledger.list_blocking(100).unwrap().is_empty());
    }
}
