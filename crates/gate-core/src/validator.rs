//! Command validator: a pure function from (command, policy snapshot) to a
//! routing decision.
//!
//! Rules, evaluated in order:
//! 1. Policy mode BLOCK → `Block`, whatever the severity.
//! 2. No policy → `Judge` at MEDIUM and above, `Allow` at LOW.
//! 3. Policy mode ALLOW at LOW → `Allow` (judging is skipped entirely).
//! 4. Policy mode ALLOW at MEDIUM+ or mode JUDGE → `Judge`.

use crate::error::ValidationError;
use crate::params::check_params;
use crate::policy::PolicySnapshot;
use crate::screen::RiskReport;
use crate::types::{Command, Policy, PolicyMode, Severity};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Block,
    Allow,
    Judge,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Decision::Block => "BLOCK",
            Decision::Allow => "ALLOW",
            Decision::Judge => "JUDGE",
        })
    }
}

/// The validator's output: a decision plus what it was based on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ruling {
    pub decision: Decision,
    /// Severity after defaulting (see [`effective_severity`]).
    pub severity: Severity,
    pub rationale: String,
    /// The policy that matched, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<Policy>,
}

/// Resolve the severity a command is evaluated at.
///
/// Declared severity wins; otherwise known command types use their intrinsic
/// severity; otherwise a type with a policy is treated as HIGH. A type with
/// neither a policy nor a severity cannot be routed.
pub fn effective_severity(
    command: &Command,
    snapshot: &PolicySnapshot,
) -> Result<Severity, ValidationError> {
    if let Some(sev) = command.severity {
        return Ok(sev);
    }
    if let Some(sev) = command.command_type.intrinsic_severity() {
        return Ok(sev);
    }
    if snapshot.get_policy(&command.command_type).is_some() {
        return Ok(Severity::High);
    }
    Err(ValidationError::MissingSeverity(
        command.command_type.to_string(),
    ))
}

pub fn validate(command: &Command, snapshot: &PolicySnapshot) -> Result<Ruling, ValidationError> {
    command.check()?;
    let severity = effective_severity(command, snapshot)?;
    let policy = snapshot.get_policy(&command.command_type).cloned();

    let (decision, rationale) = match &policy {
        Some(p) if p.mode == PolicyMode::Block => (
            Decision::Block,
            format!("Action blocked by policy: {}", or_default(&p.rationale, "no reason given")),
        ),
        None if severity >= Severity::Medium => (
            Decision::Judge,
            format!(
                "No policy for {}; {severity} severity requires judge approval",
                command.command_type
            ),
        ),
        None => (
            Decision::Allow,
            format!(
                "No policy for {}; low-severity command allowed by default",
                command.command_type
            ),
        ),
        Some(p) if p.mode == PolicyMode::Allow && severity == Severity::Low => (
            Decision::Allow,
            or_default(&p.rationale, "Allowed by policy").to_string(),
        ),
        Some(p) if p.mode == PolicyMode::Allow => (
            Decision::Judge,
            format!("{severity} severity requires judge approval despite ALLOW policy"),
        ),
        Some(p) => (
            Decision::Judge,
            format!(
                "Policy requires judge approval: {}",
                or_default(&p.rationale, "no reason given")
            ),
        ),
    };

    Ok(Ruling {
        decision,
        severity,
        rationale,
        policy,
    })
}

fn or_default<'a>(s: &'a str, fallback: &'a str) -> &'a str {
    if s.trim().is_empty() {
        fallback
    } else {
        s
    }
}

// ---------------------------------------------------------------------------
// Assessment (read-only validation endpoint)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub valid: bool,
    pub confidence: f64,
    pub violations: Vec<String>,
    pub approved_actions: Vec<String>,
    pub decision: Decision,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen: Option<RiskReport>,
}

impl Assessment {
    /// Fold a risk pre-screen into the assessment: confidence is capped at
    /// `1 - risk_score` and an unsafe report is a violation.
    pub fn with_screen(mut self, report: RiskReport) -> Self {
        self.confidence = self.confidence.min(1.0 - report.risk_score);
        if !report.safe {
            self.violations
                .push(format!("risk screen flagged the command: {}", report.summary));
            self.valid = false;
        }
        self.screen = Some(report);
        self
    }
}

/// Dry-run a command against the snapshot without side effects.
///
/// Confidence is 1.0 when an explicit policy matched and 0.5 when the
/// no-policy default applied.
pub fn assess(command: &Command, snapshot: &PolicySnapshot) -> Result<Assessment, ValidationError> {
    let ruling = validate(command, snapshot)?;
    let mut violations = check_params(&command.command_type, &command.params);
    if ruling.decision == Decision::Block {
        violations.push(ruling.rationale.clone());
    }
    let approved_actions = match ruling.decision {
        Decision::Allow => vec!["DISPATCH".to_string()],
        Decision::Judge => vec!["JUDGE".to_string()],
        Decision::Block => Vec::new(),
    };
    Ok(Assessment {
        valid: violations.is_empty(),
        confidence: if ruling.policy.is_some() { 1.0 } else { 0.5 },
        violations,
        approved_actions,
        decision: ruling.decision,
        severity: ruling.severity,
        screen: None,
    })
}
