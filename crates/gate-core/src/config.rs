use crate::error::Result;
use crate::policy::default_policies;
use crate::types::{CommandType, Policy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "actiongate.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Judges
// ---------------------------------------------------------------------------

/// One panel member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JudgeSpec {
    /// Always returns the same verdict.
    Static {
        id: String,
        #[serde(default = "default_true")]
        approve: bool,
        #[serde(default)]
        rationale: String,
    },
    /// Chat-completions model asked to review the command as `role`.
    Llm {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        #[serde(default = "default_llm_model")]
        model: String,
        #[serde(default = "default_llm_endpoint")]
        endpoint: String,
        #[serde(default = "default_llm_key_secret")]
        api_key_secret: String,
    },
}

fn default_true() -> bool {
    true
}

fn default_llm_model() -> String {
    "mistral-small-latest".to_string()
}

fn default_llm_endpoint() -> String {
    "https://api.mistral.ai/v1/chat/completions".to_string()
}

fn default_llm_key_secret() -> String {
    "MISTRAL_API_KEY".to_string()
}

impl JudgeSpec {
    pub fn id(&self) -> &str {
        match self {
            JudgeSpec::Static { id, .. } | JudgeSpec::Llm { id, .. } => id,
        }
    }

    fn llm(id: &str) -> Self {
        JudgeSpec::Llm {
            id: id.to_string(),
            role: None,
            model: default_llm_model(),
            endpoint: default_llm_endpoint(),
            api_key_secret: default_llm_key_secret(),
        }
    }
}

/// Security, compliance and business reviewers on Mistral.
pub fn default_panel() -> Vec<JudgeSpec> {
    ["security", "compliance", "business"]
        .into_iter()
        .map(JudgeSpec::llm)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgesConfig {
    #[serde(default = "default_judge_timeout_ms")]
    pub timeout_ms: u64,
    /// `None` uses [`default_panel`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panel: Option<Vec<JudgeSpec>>,
}

fn default_judge_timeout_ms() -> u64 {
    10_000
}

impl Default for JudgesConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_judge_timeout_ms(),
            panel: None,
        }
    }
}

impl JudgesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn effective_panel(&self) -> Vec<JudgeSpec> {
        self.panel.clone().unwrap_or_else(default_panel)
    }
}

// ---------------------------------------------------------------------------
// Bridge / alerts / ledger / signing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Apps-Script style endpoint. Absent runs remote tools in simulation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_bridge_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<usize>,
    /// Consecutive remote failures before the circuit opens.
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,
    #[serde(default = "default_breaker_open_secs")]
    pub breaker_open_secs: u64,
}

fn default_bridge_timeout_ms() -> u64 {
    10_000
}

fn default_breaker_threshold() -> u32 {
    crate::breaker::DEFAULT_FAILURE_THRESHOLD
}

fn default_breaker_open_secs() -> u64 {
    crate::breaker::DEFAULT_OPEN_FOR.as_secs()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: default_bridge_timeout_ms(),
            max_concurrent: None,
            breaker_threshold: default_breaker_threshold(),
            breaker_open_secs: default_breaker_open_secs(),
        }
    }
}

impl BridgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn breaker_open_for(&self) -> Duration {
        Duration::from_secs(self.breaker_open_secs)
    }
}

/// Model-backed risk pre-screen. Absent disables it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenConfig {
    #[serde(default = "default_screen_model")]
    pub model: String,
    #[serde(default = "default_screen_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_screen_key_secret")]
    pub api_key_secret: String,
}

fn default_screen_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_screen_endpoint() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}

fn default_screen_key_secret() -> String {
    "GROQ_API_KEY".to_string()
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            model: default_screen_model(),
            endpoint: default_screen_endpoint(),
            api_key_secret: default_screen_key_secret(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// redb file. Absent keeps the ledger in memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Secret holding the HMAC key for `X-Signature`. Absent disables signing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_secret: Option<String>,
}

// ---------------------------------------------------------------------------
// GateConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_secrets_dir")]
    pub secrets_dir: PathBuf,
    #[serde(default)]
    pub judges: JudgesConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub signing: SigningConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen: Option<ScreenConfig>,
    /// `None` uses the built-in defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policies: Option<Vec<RawPolicy>>,
}

/// Policy as written in YAML. The command type is checked by `validate`
/// and again when the snapshot is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPolicy {
    pub command_type: String,
    pub mode: crate::types::PolicyMode,
    #[serde(default)]
    pub rationale: String,
}

impl From<Policy> for RawPolicy {
    fn from(p: Policy) -> Self {
        Self {
            command_type: p.command_type.to_string(),
            mode: p.mode,
            rationale: p.rationale,
        }
    }
}

fn default_secrets_dir() -> PathBuf {
    PathBuf::from("/mnt/secrets")
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            secrets_dir: default_secrets_dir(),
            judges: JudgesConfig::default(),
            bridge: BridgeConfig::default(),
            alerts: AlertsConfig::default(),
            ledger: LedgerConfig::default(),
            signing: SigningConfig::default(),
            screen: None,
            policies: None,
        }
    }
}

impl GateConfig {
    /// Read the config at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: GateConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// The policy set the server starts with. An entry with an invalid
    /// command type is an error: dropping it would leave that type unguarded.
    pub fn effective_policies(&self) -> Result<Vec<Policy>> {
        match &self.policies {
            None => Ok(default_policies()),
            Some(raw) => raw
                .iter()
                .map(|p| -> Result<Policy> {
                    let ct = CommandType::new(p.command_type.as_str())?;
                    Ok(Policy::new(ct, p.mode, p.rationale.clone()))
                })
                .collect(),
        }
    }

    /// Messages of every `WarnLevel::Error` entry from [`validate`](Self::validate).
    pub fn errors(&self) -> Vec<String> {
        self.validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect()
    }

    pub fn secret(&self, name: &str) -> Option<String> {
        crate::secrets::read_secret(&self.secrets_dir, name)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        // 1. Panel must be non-empty with unique ids
        let panel = self.judges.effective_panel();
        if panel.is_empty() {
            warnings.push(ConfigWarning::error(
                "judges.panel is empty: every JUDGE decision would be unroutable",
            ));
        } else if panel.len() % 2 == 0 {
            warnings.push(ConfigWarning::warning(format!(
                "judges.panel has {} judges: an even split rejects",
                panel.len()
            )));
        }
        let mut seen = HashSet::new();
        for spec in &panel {
            if !seen.insert(spec.id()) {
                warnings.push(ConfigWarning::error(format!(
                    "duplicate judge id '{}'",
                    spec.id()
                )));
            }
        }

        // 2. Policies: valid names, no duplicates
        let mut types = HashSet::new();
        for p in self.policies.iter().flatten() {
            if let Err(e) = CommandType::new(p.command_type.as_str()) {
                warnings.push(ConfigWarning::error(e.to_string()));
                continue;
            }
            if !types.insert(p.command_type.as_str()) {
                warnings.push(ConfigWarning::error(format!(
                    "duplicate policy for '{}': the later entry wins",
                    p.command_type
                )));
            }
        }

        // 3. Timeouts
        if self.judges.timeout_ms == 0 {
            warnings.push(ConfigWarning::error(
                "judges.timeout_ms is 0: every judge would time out",
            ));
        }
        if self.bridge.timeout_ms == 0 {
            warnings.push(ConfigWarning::error(
                "bridge.timeout_ms is 0: every dispatch would time out",
            ));
        }
        if self.bridge.max_concurrent == Some(0) {
            warnings.push(ConfigWarning::warning(
                "bridge.max_concurrent is 0: treated as 1",
            ));
        }
        if self.bridge.breaker_threshold == 0 {
            warnings.push(ConfigWarning::warning(
                "bridge.breaker_threshold is 0: treated as 1",
            ));
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::types::PolicyMode;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = GateConfig::load(&dir.path().join("actiongate.yaml")).unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.secrets_dir, PathBuf::from("/mnt/secrets"));
        assert_eq!(cfg.judges.effective_panel().len(), 3);
        assert_eq!(cfg.effective_policies().unwrap().len(), 5);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = r#"
server:
  port: 9090
judges:
  timeout_ms: 500
  panel:
    - kind: static
      id: always-yes
    - kind: llm
      id: security
policies:
  - command_type: SCAN_SITE
    mode: BLOCK
    rationale: scans paused
"#;
        let cfg: GateConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.bridge.timeout_ms, 10_000);
        let panel = cfg.judges.effective_panel();
        assert_eq!(
            panel[0],
            JudgeSpec::Static {
                id: "always-yes".into(),
                approve: true,
                rationale: String::new()
            }
        );
        match &panel[1] {
            JudgeSpec::Llm { model, api_key_secret, .. } => {
                assert_eq!(model, "mistral-small-latest");
                assert_eq!(api_key_secret, "MISTRAL_API_KEY");
            }
            other => panic!("expected llm judge, got {other:?}"),
        }
        let policies = cfg.effective_policies().unwrap();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].mode, PolicyMode::Block);
    }

    #[test]
    fn validate_flags_problems() {
        let yaml = r#"
judges:
  panel:
    - kind: static
      id: a
    - kind: static
      id: a
policies:
  - command_type: scan_site
    mode: ALLOW
  - command_type: REFRESH_TOKEN
    mode: JUDGE
  - command_type: REFRESH_TOKEN
    mode: BLOCK
"#;
        let cfg: GateConfig = serde_yaml::from_str(yaml).unwrap();
        let warnings = cfg.validate();
        let errors: Vec<_> = warnings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message.as_str())
            .collect();
        assert!(errors.iter().any(|m| m.contains("duplicate judge id 'a'")));
        assert!(errors.iter().any(|m| m.contains("scan_site")));
        assert!(errors.iter().any(|m| m.contains("duplicate policy for 'REFRESH_TOKEN'")));
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("even split")));
        assert_eq!(cfg.errors().len(), 3);
        assert!(matches!(
            cfg.effective_policies(),
            Err(crate::GateError::Validation(ValidationError::InvalidCommandType(ref s))) if s == "scan_site"
        ));
    }

    #[test]
    fn lowercase_block_policy_is_rejected_not_dropped() {
        let yaml = "policies:\n  - command_type: connect_integration\n    mode: BLOCK\n";
        let cfg: GateConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.effective_policies().is_err());
        assert!(cfg.errors()[0].contains("connect_integration"));
    }

    #[test]
    fn explicitly_empty_panel_is_an_error() {
        let cfg: GateConfig = serde_yaml::from_str("judges:\n  panel: []\n").unwrap();
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("empty")));
    }

    #[test]
    fn screen_section_fills_groq_defaults() {
        let cfg: GateConfig = serde_yaml::from_str("screen: {}\nbridge:\n  breaker_threshold: 3\n").unwrap();
        assert_eq!(cfg.screen, Some(ScreenConfig::default()));
        assert_eq!(cfg.screen.unwrap().api_key_secret, "GROQ_API_KEY");
        assert_eq!(cfg.bridge.breaker_threshold, 3);
        assert_eq!(cfg.bridge.breaker_open_for(), Duration::from_secs(60));
        assert!(GateConfig::default().screen.is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("actiongate.yaml");
        let mut cfg = GateConfig::default();
        cfg.bridge.url = Some("https://script.example.com/exec".into());
        cfg.ledger.path = Some(PathBuf::from("/var/lib/actiongate/audit.redb"));
        cfg.save(&path).unwrap();

        let loaded = GateConfig::load(&path).unwrap();
        assert_eq!(loaded.bridge.url.as_deref(), Some("https://script.example.com/exec"));
        assert_eq!(
            loaded.ledger.path,
            Some(PathBuf::from("/var/lib/actiongate/audit.redb"))
        );
    }
}
