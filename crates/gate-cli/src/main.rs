mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, ledger::LedgerSubcommand, policy::PolicySubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "actiongate",
    about = "Policy, judge panel and audit gate for agent-issued commands",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file
    #[arg(
        long,
        global = true,
        env = "ACTIONGATE_CONFIG",
        default_value = gate_core::config::DEFAULT_CONFIG_FILE
    )]
    config: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Port to listen on (overrides server.port; 0 = OS-assigned)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Check a command line against the configured policies without running it
    Validate {
        /// e.g. "SCAN_SITE domain=example.com"
        line: String,
        /// LOW, MEDIUM or HIGH
        #[arg(long)]
        severity: Option<String>,
    },

    /// Submit a command line to a running server
    Submit {
        /// e.g. "REFRESH_TOKEN service=linkedin"
        line: String,
        /// Server base URL
        #[arg(long, env = "ACTIONGATE_SERVER", default_value = "http://localhost:8080")]
        server: String,
        /// Action id (default: random UUID)
        #[arg(long)]
        action_id: Option<String>,
        /// LOW, MEDIUM or HIGH
        #[arg(long)]
        severity: Option<String>,
    },

    /// Inspect configured policies
    Policy {
        #[command(subcommand)]
        subcommand: PolicySubcommand,
    },

    /// Read the audit ledger of a running server
    Ledger {
        /// Server base URL
        #[arg(
            long,
            global = true,
            env = "ACTIONGATE_SERVER",
            default_value = "http://localhost:8080"
        )]
        server: String,
        #[command(subcommand)]
        subcommand: LedgerSubcommand,
    },

    /// Validate or scaffold the config file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let config = cli.config.as_path();
    let result = match cli.command {
        Commands::Serve { port } => cmd::serve::run(config, port),
        Commands::Validate { line, severity } => {
            cmd::validate::run(config, &line, severity.as_deref(), cli.json)
        }
        Commands::Submit {
            line,
            server,
            action_id,
            severity,
        } => cmd::submit::run(
            config,
            &line,
            &server,
            action_id,
            severity.as_deref(),
            cli.json,
        ),
        Commands::Policy { subcommand } => cmd::policy::run(config, subcommand, cli.json),
        Commands::Ledger { server, subcommand } => cmd::ledger::run(&server, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(config, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
