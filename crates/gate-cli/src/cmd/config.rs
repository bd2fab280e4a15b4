use anyhow::Context;
use clap::Subcommand;
use gate_core::config::{GateConfig, WarnLevel};
use std::path::Path;

use super::load_config;
use crate::output::print_json;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Validate the config for common mistakes
    Validate,

    /// Write a config file with every default spelled out
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn run(config: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Validate => validate(config, json),
        ConfigSubcommand::Init { force } => init(config, force),
    }
}

fn validate(config: &Path, json: bool) -> anyhow::Result<()> {
    let cfg = load_config(config)?;
    let warnings = cfg.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

fn init(config: &Path, force: bool) -> anyhow::Result<()> {
    if config.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", config.display());
    }
    let mut cfg = GateConfig::default();
    cfg.judges.panel = Some(cfg.judges.effective_panel());
    cfg.policies = Some(
        cfg.effective_policies()?
            .into_iter()
            .map(Into::into)
            .collect(),
    );
    cfg.save(config)
        .with_context(|| format!("failed to write {}", config.display()))?;
    println!("Wrote {}", config.display());
    Ok(())
}
