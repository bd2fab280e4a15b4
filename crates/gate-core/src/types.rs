use crate::error::ValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Caller-declared risk tier. Ordered so `severity >= Severity::Medium` reads
/// naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            _ => Err(ValidationError::InvalidSeverity(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// CommandType
// ---------------------------------------------------------------------------

pub const SCAN_SITE: &str = "SCAN_SITE";
pub const PUBLISH_REPORT: &str = "PUBLISH_REPORT";
pub const START_CAMPAIGN: &str = "START_CAMPAIGN";
pub const CHECK_INTEGRATION_STATUS: &str = "CHECK_INTEGRATION_STATUS";
pub const REFRESH_TOKEN: &str = "REFRESH_TOKEN";
pub const CONNECT_INTEGRATION: &str = "CONNECT_INTEGRATION";

/// Command types the pipeline knows about, with their intrinsic severity.
const KNOWN_TYPES: &[(&str, Severity)] = &[
    (SCAN_SITE, Severity::Low),
    (PUBLISH_REPORT, Severity::Low),
    (CHECK_INTEGRATION_STATUS, Severity::Low),
    (START_CAMPAIGN, Severity::Medium),
    (REFRESH_TOKEN, Severity::Medium),
    (CONNECT_INTEGRATION, Severity::High),
];

fn command_type_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").unwrap())
}

/// Name of a command, e.g. `REFRESH_TOKEN`.
///
/// The set is open: policies may be written for types the pipeline has no
/// intrinsic knowledge of. Construction validates the name shape only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommandType(String);

impl CommandType {
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if command_type_re().is_match(&name) {
            Ok(Self(name))
        } else {
            Err(ValidationError::InvalidCommandType(name))
        }
    }

    /// Constants above are valid names by construction.
    pub(crate) fn from_known(name: &'static str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_known(&self) -> bool {
        self.intrinsic_severity().is_some()
    }

    /// Severity implied by the command type when the caller declares none.
    pub fn intrinsic_severity(&self) -> Option<Severity> {
        KNOWN_TYPES
            .iter()
            .find(|(name, _)| *name == self.0)
            .map(|(_, sev)| *sev)
    }

    pub fn known() -> impl Iterator<Item = CommandType> {
        KNOWN_TYPES.iter().map(|(name, _)| CommandType(name.to_string()))
    }
}

impl TryFrom<String> for CommandType {
    type Error = ValidationError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        CommandType::new(value)
    }
}

impl From<CommandType> for String {
    fn from(value: CommandType) -> Self {
        value.0
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for CommandType {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandType::new(s)
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

pub type Params = serde_json::Map<String, serde_json::Value>;

/// A submitted command. Immutable once handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub action_id: String,
    pub command_type: CommandType,
    #[serde(default)]
    pub params: Params,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

impl Command {
    pub fn new(
        action_id: impl Into<String>,
        command_type: CommandType,
        params: Params,
        severity: Option<Severity>,
    ) -> Self {
        Self {
            action_id: action_id.into(),
            command_type,
            params,
            severity,
        }
    }

    /// Structural checks that do not need a policy snapshot.
    pub fn check(&self) -> Result<(), ValidationError> {
        if self.action_id.trim().is_empty() {
            return Err(ValidationError::EmptyActionId);
        }
        Ok(())
    }

    /// String parameter lookup; non-string values are treated as absent.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyMode {
    /// Never allowed, regardless of severity or judge approval.
    Block,
    /// Requires judge panel approval.
    Judge,
    /// May bypass judging when severity is LOW.
    Allow,
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PolicyMode::Block => "BLOCK",
            PolicyMode::Judge => "JUDGE",
            PolicyMode::Allow => "ALLOW",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub command_type: CommandType,
    pub mode: PolicyMode,
    #[serde(default)]
    pub rationale: String,
}

impl Policy {
    pub fn new(command_type: CommandType, mode: PolicyMode, rationale: impl Into<String>) -> Self {
        Self {
            command_type,
            mode,
            rationale: rationale.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_type_rejects_lowercase_and_spaces() {
        assert!(CommandType::new("refresh_token").is_err());
        assert!(CommandType::new("REFRESH TOKEN").is_err());
        assert!(CommandType::new("").is_err());
        assert!(CommandType::new("REFRESH_TOKEN").is_ok());
    }

    #[test]
    fn intrinsic_severity_for_known_types() {
        let t = CommandType::new(CONNECT_INTEGRATION).unwrap();
        assert_eq!(t.intrinsic_severity(), Some(Severity::High));
        let t = CommandType::new("ROTATE_KEYS").unwrap();
        assert_eq!(t.intrinsic_severity(), None);
        assert!(!t.is_known());
    }

    #[test]
    fn severity_orders_low_to_high() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("medium".parse::<Severity>().unwrap(), Severity::Medium);
        assert!("CRITICAL".parse::<Severity>().is_err());
    }

    #[test]
    fn command_deserializes_from_wire_json() {
        let json = r#"{
            "action_id": "status-check-mailchimp-123",
            "command_type": "CHECK_INTEGRATION_STATUS",
            "params": {"service": "mailchimp"},
            "severity": "LOW"
        }"#;
        let cmd: Command = serde_json::from_str(json).unwrap();
        assert_eq!(cmd.command_type.as_str(), CHECK_INTEGRATION_STATUS);
        assert_eq!(cmd.severity, Some(Severity::Low));
        assert_eq!(cmd.param_str("service"), Some("mailchimp"));
    }

    #[test]
    fn command_with_bad_type_fails_to_deserialize() {
        let json = r#"{"action_id": "a", "command_type": "not valid", "params": {}}"#;
        assert!(serde_json::from_str::<Command>(json).is_err());
    }

    #[test]
    fn empty_action_id_fails_check() {
        let cmd = Command::new(
            "  ",
            CommandType::new(SCAN_SITE).unwrap(),
            Params::new(),
            None,
        );
        assert_eq!(cmd.check(), Err(ValidationError::EmptyActionId));
    }
}
