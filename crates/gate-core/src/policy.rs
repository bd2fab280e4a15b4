//! Policy store: command-type policies read as immutable snapshots.
//!
//! Every update publishes a fresh `Arc<PolicySnapshot>`. An action takes one
//! snapshot when it enters validation and never looks at the store again, so
//! a concurrent update can never be half-visible to it.

use crate::types::{
    CommandType, Policy, PolicyMode, CHECK_INTEGRATION_STATUS, CONNECT_INTEGRATION, REFRESH_TOKEN,
    SCAN_SITE, START_CAMPAIGN,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

// ---------------------------------------------------------------------------
// PolicySnapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct PolicySnapshot {
    version: u64,
    policies: BTreeMap<CommandType, Policy>,
}

impl PolicySnapshot {
    /// Build a snapshot from a list; later entries for the same type win.
    pub fn from_policies(policies: impl IntoIterator<Item = Policy>) -> Self {
        let policies = policies
            .into_iter()
            .map(|p| (p.command_type.clone(), p))
            .collect();
        Self {
            version: 0,
            policies,
        }
    }

    pub fn get_policy(&self, command_type: &CommandType) -> Option<&Policy> {
        self.policies.get(command_type)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Policies ordered by command type.
    pub fn policies(&self) -> impl Iterator<Item = &Policy> {
        self.policies.values()
    }
}

// ---------------------------------------------------------------------------
// PolicyStore
// ---------------------------------------------------------------------------

/// Read side of the policy store, as consumed by the orchestrator.
pub trait PolicyStore: Send + Sync {
    /// Point-in-time view of all policies.
    fn snapshot(&self) -> Arc<PolicySnapshot>;

    fn get_policy(&self, command_type: &CommandType) -> Option<Policy> {
        self.snapshot().get_policy(command_type).cloned()
    }
}

/// In-process copy-on-write policy store, administered over HTTP.
#[derive(Debug, Default)]
pub struct SharedPolicyStore {
    current: RwLock<Arc<PolicySnapshot>>,
}

impl SharedPolicyStore {
    pub fn new(snapshot: PolicySnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(PolicySnapshot::from_policies(default_policies()))
    }

    /// Insert or replace the policy for its command type. Returns the
    /// version of the published snapshot.
    pub fn upsert(&self, policy: Policy) -> u64 {
        self.publish(|policies| {
            policies.insert(policy.command_type.clone(), policy);
        })
    }

    /// Remove the policy for `command_type`. Returns `None` if there was none.
    pub fn remove(&self, command_type: &CommandType) -> Option<Policy> {
        let mut removed = None;
        self.publish(|policies| {
            removed = policies.remove(command_type);
        });
        removed
    }

    /// Swap in a whole new policy set.
    pub fn replace_all(&self, policies: impl IntoIterator<Item = Policy>) -> u64 {
        let fresh = PolicySnapshot::from_policies(policies).policies;
        self.publish(|policies| *policies = fresh)
    }

    fn publish(&self, edit: impl FnOnce(&mut BTreeMap<CommandType, Policy>)) -> u64 {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = PolicySnapshot::clone(&guard);
        edit(&mut next.policies);
        next.version = guard.version + 1;
        let version = next.version;
        *guard = Arc::new(next);
        version
    }
}

impl PolicyStore for SharedPolicyStore {
    fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Policies applied when the config file lists none.
pub fn default_policies() -> Vec<Policy> {
    vec![
        Policy::new(
            CommandType::from_known(CHECK_INTEGRATION_STATUS),
            PolicyMode::Allow,
            "Low-risk read-only operation. Always allowed.",
        ),
        Policy::new(
            CommandType::from_known(SCAN_SITE),
            PolicyMode::Allow,
            "Read-only site scan.",
        ),
        Policy::new(
            CommandType::from_known(REFRESH_TOKEN),
            PolicyMode::Judge,
            "Medium-risk state-changing operation. Requires judge approval.",
        ),
        Policy::new(
            CommandType::from_known(START_CAMPAIGN),
            PolicyMode::Judge,
            "Campaign spend requires judge approval.",
        ),
        Policy::new(
            CommandType::from_known(CONNECT_INTEGRATION),
            PolicyMode::Block,
            "New integrations require manual security and permissions review.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ct(name: &str) -> CommandType {
        CommandType::new(name).unwrap()
    }

    #[test]
    fn defaults_block_connect_integration() {
        let store = SharedPolicyStore::with_defaults();
        let p = store.get_policy(&ct(CONNECT_INTEGRATION)).unwrap();
        assert_eq!(p.mode, PolicyMode::Block);
        assert!(p.rationale.contains("manual security"));
    }

    #[test]
    fn snapshot_is_unaffected_by_later_updates() {
        let store = SharedPolicyStore::with_defaults();
        let before = store.snapshot();
        store.upsert(Policy::new(ct(REFRESH_TOKEN), PolicyMode::Block, "frozen"));

        assert_eq!(
            before.get_policy(&ct(REFRESH_TOKEN)).unwrap().mode,
            PolicyMode::Judge
        );
        let after = store.snapshot();
        assert_eq!(
            after.get_policy(&ct(REFRESH_TOKEN)).unwrap().mode,
            PolicyMode::Block
        );
        assert_eq!(after.version(), before.version() + 1);
    }

    #[test]
    fn remove_returns_previous_policy() {
        let store = SharedPolicyStore::with_defaults();
        let removed = store.remove(&ct(SCAN_SITE)).unwrap();
        assert_eq!(removed.mode, PolicyMode::Allow);
        assert!(store.get_policy(&ct(SCAN_SITE)).is_none());
        assert!(store.remove(&ct(SCAN_SITE)).is_none());
    }

    #[test]
    fn later_entry_wins_in_from_policies() {
        let snap = PolicySnapshot::from_policies(vec![
            Policy::new(ct("ROTATE_KEYS"), PolicyMode::Allow, "first"),
            Policy::new(ct("ROTATE_KEYS"), PolicyMode::Block, "second"),
        ]);
        assert_eq!(snap.len(), 1);
        assert_eq!(
            snap.get_policy(&ct("ROTATE_KEYS")).unwrap().rationale,
            "second"
        );
    }

    #[test]
    fn replace_all_drops_old_entries() {
        let store = SharedPolicyStore::with_defaults();
        store.replace_all(vec![Policy::new(ct("ROTATE_KEYS"), PolicyMode::Judge, "")]);
        let snap = store.snapshot();
        assert_eq!(snap.len(), 1);
        assert!(snap.get_policy(&ct(CONNECT_INTEGRATION)).is_none());
    }
}
