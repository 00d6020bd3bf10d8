//! Fleet daemon: load accounts, launch them, idle until interrupted.

use std::path::PathBuf;
use std::time::Duration;

use miette::Result;
use tracing::{error, info};

use vigil_fleet::{
    Fleet, FleetConfig, HttpClientFactory, RetryPolicy, dedupe_accounts, load_records,
};

/// Settings for one `vigil run`.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub accounts_path: PathBuf,
    pub resource: String,
    pub api_url: String,
    pub start_init_cooldown: Duration,
    pub process_cooldown: Duration,
    pub error_cooldown: Duration,
    pub rate_limit_cooldown: Duration,
    pub activity_burst_count: u32,
    pub activity_sleep: Duration,
}

impl DaemonConfig {
    pub fn fleet_config(&self) -> FleetConfig {
        let mut config = FleetConfig::new(self.resource.clone());
        config.start_init_cooldown = self.start_init_cooldown;
        config.retry = RetryPolicy::new(self.rate_limit_cooldown, self.error_cooldown);
        config.workflow.process_cooldown = self.process_cooldown;
        config.workflow.activity_burst_count = self.activity_burst_count;
        config.workflow.activity_sleep = self.activity_sleep;
        config
    }
}

pub async fn run(config: DaemonConfig) -> Result<()> {
    let records = load_records(&config.accounts_path)
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    let loaded = records.len();

    let fleet = Fleet::new(
        config.fleet_config(),
        dedupe_accounts(records),
        HttpClientFactory::new(config.api_url.clone()),
    );
    info!(
        path = %config.accounts_path.display(),
        loaded,
        unique = fleet.accounts().len(),
        "accounts loaded"
    );

    fleet
        .run_until(interrupted())
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    info!("shutting down");
    Ok(())
}

/// Resolves on Ctrl-C. If the signal handler can't be installed, never
/// resolves and the fleet runs until the process is killed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for interrupt");
        std::future::pending::<()>().await;
    }
}
