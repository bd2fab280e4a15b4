use clap::Subcommand;
use gate_core::ledger::ActionRecord;

use super::get_json;
use crate::output::{print_json, print_table, truncate};

#[derive(Subcommand)]
pub enum LedgerSubcommand {
    /// List recorded actions, newest first
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Show one recorded action
    Show { action_id: String },
}

/// Reads go through the running server, which owns the ledger file.
pub fn run(server: &str, subcmd: LedgerSubcommand, json: bool) -> anyhow::Result<()> {
    let base = format!("{}/v1/actions", server.trim_end_matches('/'));
    match subcmd {
        LedgerSubcommand::List { limit } => list(&base, limit, json),
        LedgerSubcommand::Show { action_id } => show(&base, &action_id, json),
    }
}

fn list(base: &str, limit: usize, json: bool) -> anyhow::Result<()> {
    let records: Vec<ActionRecord> = get_json(&format!("{base}?limit={limit}"))?;
    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No actions recorded.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            vec![
                r.action_id.clone(),
                r.command.command_type.to_string(),
                r.severity.to_string(),
                r.status.as_str().to_string(),
                r.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                truncate(&r.rationale, 48),
            ]
        })
        .collect();
    print_table(
        &["ACTION", "COMMAND TYPE", "SEVERITY", "STATUS", "CREATED", "RATIONALE"],
        &rows,
    );
    Ok(())
}

fn show(base: &str, action_id: &str, json: bool) -> anyhow::Result<()> {
    let record: ActionRecord = get_json(&format!("{base}/{action_id}"))?;
    if json {
        return print_json(&record);
    }

    println!("Action:    {}", record.action_id);
    println!("Command:   {}", record.command.command_type);
    println!("Severity:  {}", record.severity);
    println!("Status:    {}", record.status.as_str());
    let path: Vec<&str> = record.path.iter().map(|s| s.as_str()).collect();
    println!("Path:      {}", path.join(" -> "));
    if let Some(kind) = record.failure {
        println!("Failure:   {}", kind.as_str());
    }
    println!("Created:   {}", record.created_at.to_rfc3339());
    if let Some(at) = record.decided_at {
        println!("Decided:   {}", at.to_rfc3339());
    }
    if !record.rationale.is_empty() {
        println!("Rationale: {}", record.rationale);
    }
    if !record.votes.is_empty() {
        println!("\nVotes:");
        for v in &record.votes {
            println!("  {}", serde_json::to_string(v)?);
        }
    }
    if let Some(result) = &record.result {
        println!("\nResult:\n{}", serde_json::to_string_pretty(result)?);
    }
    Ok(())
}
