//! vigil: keeps a fleet of accounts active on a remote service.
//!
//! Main binary with subcommands:
//! - `run`: Launch every account's workflow and idle until interrupted
//! - `check`: Validate the accounts file without contacting the service

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod check;
mod daemon;

/// Parse boolean from environment variable, accepting common truthy values.
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Accepts "0", "false", "no", "off", "" (case-insensitive) as false.
fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!(
            "invalid boolean value '{}', expected 1/true/yes/on or 0/false/no/off",
            s
        )),
    }
}

fn parse_secs(s: &str) -> Result<Duration, String> {
    s.parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| format!("invalid number of seconds '{}': {}", s, e))
}

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Keep a fleet of accounts active on a remote service", long_about = None)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(
        long,
        global = true,
        env = "VIGIL_DEBUG",
        action = clap::ArgAction::Set,
        value_parser = parse_bool_env,
        default_value = "false",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch every account and run until interrupted
    Run(RunArgs),

    /// Load and validate the accounts file, then exit
    Check {
        /// JSON file with account records
        #[arg(long, env = "VIGIL_ACCOUNTS", default_value = "new-accounts.json")]
        accounts: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// JSON file with account records
    #[arg(long, env = "VIGIL_ACCOUNTS", default_value = "new-accounts.json")]
    accounts: PathBuf,

    /// Reference (invite link) of the resource every account joins
    #[arg(long, env = "VIGIL_RESOURCE")]
    resource: String,

    /// Base URL of the remote service API
    #[arg(long, env = "VIGIL_API_URL")]
    api_url: String,

    /// Seconds between successive account starts
    #[arg(long, default_value = "5", value_parser = parse_secs)]
    start_init_cooldown: Duration,

    /// Seconds to pause after each workflow gate
    #[arg(long, default_value = "10", value_parser = parse_secs)]
    process_cooldown: Duration,

    /// Seconds to pause after a service error
    #[arg(long, default_value = "10", value_parser = parse_secs)]
    error_cooldown: Duration,

    /// Seconds to pause after the service rate-limits a call
    #[arg(long, default_value = "30", value_parser = parse_secs)]
    rate_limit_cooldown: Duration,

    /// Heartbeats sent per burst
    #[arg(long, default_value = "24")]
    activity_burst_count: u32,

    /// Seconds to pause between heartbeats
    #[arg(long, default_value = "16", value_parser = parse_secs)]
    activity_sleep: Duration,
}

fn init_tracing(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let default_filter = ["vigil", "vigil_fleet", "vigil_scheduler", "vigil_client"]
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",");

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or(default_filter),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Commands::Run(args) => daemon::run(args.into()).await,
        Commands::Check { accounts } => check::run(&accounts).await,
    }
}

impl From<RunArgs> for daemon::DaemonConfig {
    fn from(args: RunArgs) -> Self {
        Self {
            accounts_path: args.accounts,
            resource: args.resource,
            api_url: args.api_url,
            start_init_cooldown: args.start_init_cooldown,
            process_cooldown: args.process_cooldown,
            error_cooldown: args.error_cooldown,
            rate_limit_cooldown: args.rate_limit_cooldown,
            activity_burst_count: args.activity_burst_count,
            activity_sleep: args.activity_sleep,
        }
    }
}
