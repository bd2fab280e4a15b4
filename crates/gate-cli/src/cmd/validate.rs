use gate_core::policy::PolicySnapshot;
use gate_core::types::Command;
use gate_core::validator::assess;
use std::path::Path;

use super::{load_config, parse_line, parse_severity};
use crate::output::print_json;

/// Offline dry run against the policies in the config file.
pub fn run(config: &Path, line: &str, severity: Option<&str>, json: bool) -> anyhow::Result<()> {
    let cfg = load_config(config)?;
    let parsed = parse_line(line)?;
    let severity = parse_severity(severity)?;

    let snapshot = PolicySnapshot::from_policies(cfg.effective_policies()?);
    let command = Command::new("cli-validate", parsed.command_type, parsed.params, severity);
    let assessment = assess(&command, &snapshot)?;

    if json {
        print_json(&assessment)?;
    } else {
        println!("command:    {}", command.command_type);
        println!("decision:   {}", assessment.decision);
        println!("severity:   {}", assessment.severity);
        println!("confidence: {:.1}", assessment.confidence);
        if !assessment.approved_actions.is_empty() {
            println!("cleared:    {}", assessment.approved_actions.join(", "));
        }
        for v in &assessment.violations {
            println!("[violation] {v}");
        }
    }

    if !assessment.valid {
        anyhow::bail!("command is not valid");
    }
    Ok(())
}
