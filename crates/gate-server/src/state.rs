use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use gate_core::alert::{AlertSink, LogAlertSink, WebhookAlertSink};
use gate_core::breaker::CircuitBreaker;
use gate_core::bridge::HttpBridge;
use gate_core::config::{GateConfig, WarnLevel};
use gate_core::ledger::{AuditLedger, MemoryLedger, RedbLedger};
use gate_core::policy::{PolicySnapshot, SharedPolicyStore};
use gate_core::Orchestrator;

use crate::signature::SigningKey;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Same store the orchestrator reads; kept concrete for the admin routes.
    pub policies: Arc<SharedPolicyStore>,
    pub signing: SigningKey,
    pub ledger_kind: &'static str,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, policies: Arc<SharedPolicyStore>) -> Self {
        Self {
            orchestrator,
            policies,
            signing: SigningKey::none(),
            ledger_kind: "memory",
            started_at: Utc::now(),
        }
    }

    pub fn with_signing(mut self, signing: SigningKey) -> Self {
        self.signing = signing;
        self
    }

    /// Wire every collaborator from config.
    pub fn from_config(cfg: &GateConfig) -> anyhow::Result<Self> {
        let warnings = cfg.validate();
        for w in &warnings {
            tracing::warn!(level = ?w.level, "config: {}", w.message);
        }
        let errors: Vec<&str> = warnings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message.as_str())
            .collect();
        if !errors.is_empty() {
            anyhow::bail!("config has errors: {}", errors.join("; "));
        }

        let policies = Arc::new(SharedPolicyStore::new(PolicySnapshot::from_policies(
            cfg.effective_policies()?,
        )));
        let panel = crate::judges::build_panel(cfg)?;
        let bridge = HttpBridge::new(cfg.bridge.url.clone(), cfg.bridge.timeout())?;
        if cfg.bridge.url.is_none() {
            tracing::warn!("bridge.url not set; remote tools run in simulation");
        }

        let (ledger, ledger_kind) = match &cfg.ledger.path {
            Some(path) => {
                let db = RedbLedger::open(path)
                    .with_context(|| format!("opening audit ledger at {}", path.display()))?;
                (Arc::new(db) as Arc<dyn AuditLedger>, "redb")
            }
            None => {
                tracing::warn!("ledger.path not set; audit records are kept in memory");
                (Arc::new(MemoryLedger::new()) as Arc<dyn AuditLedger>, "memory")
            }
        };

        let alerts: Arc<dyn AlertSink> = match &cfg.alerts.webhook_url {
            Some(url) => Arc::new(WebhookAlertSink::new(url.clone(), cfg.bridge.timeout())?),
            None => Arc::new(LogAlertSink),
        };

        let signing = match &cfg.signing.key_secret {
            Some(name) => {
                let key = cfg
                    .secret(name)
                    .with_context(|| format!("signing.key_secret '{name}' not found"))?;
                SigningKey::new(key)
            }
            None => SigningKey::none(),
        };

        let mut orchestrator = Orchestrator::new(policies.clone(), panel, Arc::new(bridge), ledger)
            .with_alerts(alerts)
            .with_dispatch_timeout(cfg.bridge.timeout())
            .with_circuit_breaker(Arc::new(CircuitBreaker::new(
                "bridge",
                cfg.bridge.breaker_threshold,
                cfg.bridge.breaker_open_for(),
            )));
        if let Some(n) = cfg.bridge.max_concurrent {
            orchestrator = orchestrator.with_dispatch_limit(n);
        }
        if let Some(screen) = crate::screen::build_screen(cfg, cfg.judges.timeout())? {
            orchestrator = orchestrator.with_screen(screen);
        }

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            policies,
            signing,
            ledger_kind,
            started_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate_core::config::{JudgeSpec, RawPolicy, ScreenConfig};
    use gate_core::policy::PolicyStore;
    use gate_core::types::PolicyMode;
    use tempfile::TempDir;

    fn static_cfg(dir: &TempDir) -> GateConfig {
        let mut cfg = GateConfig::default();
        cfg.secrets_dir = dir.path().to_path_buf();
        cfg.judges.panel = Some(vec![JudgeSpec::Static {
            id: "always".into(),
            approve: true,
            rationale: String::new(),
        }]);
        cfg
    }

    #[test]
    fn from_config_uses_redb_when_path_set() {
        let dir = TempDir::new().unwrap();
        let mut cfg = static_cfg(&dir);
        cfg.ledger.path = Some(dir.path().join("audit.redb"));
        let state = AppState::from_config(&cfg).unwrap();
        assert_eq!(state.ledger_kind, "redb");
        assert!(!state.signing.is_enabled());
        assert_eq!(state.policies.snapshot().len(), 5);
    }

    #[test]
    fn misspelled_block_policy_fails_startup() {
        let dir = TempDir::new().unwrap();
        let mut cfg = static_cfg(&dir);
        cfg.policies = Some(vec![RawPolicy {
            command_type: "connect_integration".into(),
            mode: PolicyMode::Block,
            rationale: String::new(),
        }]);
        let err = AppState::from_config(&cfg).err().expect("startup must fail");
        assert!(format!("{err:#}").contains("connect_integration"));
    }

    #[test]
    fn duplicate_judge_ids_fail_startup() {
        let dir = TempDir::new().unwrap();
        let mut cfg = static_cfg(&dir);
        let judge = JudgeSpec::Static {
            id: "twin".into(),
            approve: true,
            rationale: String::new(),
        };
        cfg.judges.panel = Some(vec![judge.clone(), judge]);
        let err = AppState::from_config(&cfg).err().expect("startup must fail");
        assert!(format!("{err:#}").contains("duplicate judge id 'twin'"));
    }

    #[test]
    fn empty_panel_fails_startup() {
        let dir = TempDir::new().unwrap();
        let mut cfg = static_cfg(&dir);
        cfg.judges.panel = Some(Vec::new());
        assert!(AppState::from_config(&cfg).is_err());
    }

    #[test]
    fn even_panel_is_only_a_warning() {
        let dir = TempDir::new().unwrap();
        let mut cfg = static_cfg(&dir);
        let judge = |id: &str| JudgeSpec::Static {
            id: id.into(),
            approve: true,
            rationale: String::new(),
        };
        cfg.judges.panel = Some(vec![judge("a"), judge("b")]);
        assert!(AppState::from_config(&cfg).is_ok());
    }

    #[test]
    fn bridge_breaker_follows_config() {
        let dir = TempDir::new().unwrap();
        let mut cfg = static_cfg(&dir);
        cfg.bridge.breaker_threshold = 2;
        let state = AppState::from_config(&cfg).unwrap();
        let breaker = state.orchestrator.breaker().expect("breaker wired");
        assert_eq!(breaker.name(), "bridge");
        assert!(breaker.allow());
        assert!(state.orchestrator.screen().is_none());
    }

    #[test]
    fn screen_is_wired_when_key_present() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("groq-key"), "gsk").unwrap();
        let mut cfg = static_cfg(&dir);
        cfg.screen = Some(ScreenConfig {
            api_key_secret: "groq-key".into(),
            ..ScreenConfig::default()
        });
        let state = AppState::from_config(&cfg).unwrap();
        assert!(state.orchestrator.screen().is_some());
    }

    #[test]
    fn missing_signing_secret_fails_startup() {
        let dir = TempDir::new().unwrap();
        let mut cfg = static_cfg(&dir);
        cfg.signing.key_secret = Some("actiongate-test-missing-signing-key".into());
        assert!(AppState::from_config(&cfg).is_err());
    }

    #[test]
    fn signing_secret_from_file_enables_check() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("signing-key"), "k").unwrap();
        let mut cfg = static_cfg(&dir);
        cfg.signing.key_secret = Some("signing-key".into());
        assert!(AppState::from_config(&cfg).unwrap().signing.is_enabled());
    }
}
