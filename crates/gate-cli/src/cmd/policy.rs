use clap::Subcommand;
use std::path::Path;

use super::load_config;
use crate::output::{print_json, print_table, truncate};

#[derive(Subcommand)]
pub enum PolicySubcommand {
    /// List the policies the server would start with
    List,
}

pub fn run(config: &Path, subcmd: PolicySubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        PolicySubcommand::List => list(config, json),
    }
}

fn list(config: &Path, json: bool) -> anyhow::Result<()> {
    let cfg = load_config(config)?;
    let mut policies = cfg.effective_policies()?;
    policies.sort_by(|a, b| a.command_type.cmp(&b.command_type));

    if json {
        return print_json(&policies);
    }
    if policies.is_empty() {
        println!("No policies configured.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = policies
        .iter()
        .map(|p| {
            vec![
                p.command_type.to_string(),
                p.mode.to_string(),
                truncate(&p.rationale, 60),
            ]
        })
        .collect();
    print_table(&["COMMAND TYPE", "MODE", "RATIONALE"], &rows);
    Ok(())
}
