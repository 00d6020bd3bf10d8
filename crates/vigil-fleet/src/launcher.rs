//! Fleet launcher: one detached task per account, staggered.
//!
//! Account tasks are fire-and-forget. The launcher never joins or cancels
//! them; when it returns, they end with the process and the OS reclaims
//! their open connections.

use std::future::Future;
use std::sync::Arc;

use tokio::time::sleep;
use tracing::{Instrument, debug, info};

use vigil_client::{HttpServiceClient, ServiceClient, ServiceError};
use vigil_scheduler::{Clock, SystemClock};

use crate::account::unique_by_email;
use crate::{Account, AccountMachine, FleetConfig, FleetError, LoggerRegistry};

/// Builds the remote client for one account.
pub trait ClientFactory: Send + Sync {
    type Client: ServiceClient + 'static;

    fn build(&self, account: &Account) -> Result<Self::Client, ServiceError>;
}

/// Builds [`HttpServiceClient`]s against one API base URL.
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    api_url: String,
}

impl HttpClientFactory {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
        }
    }
}

impl ClientFactory for HttpClientFactory {
    type Client = HttpServiceClient;

    fn build(&self, account: &Account) -> Result<Self::Client, ServiceError> {
        HttpServiceClient::new(&self.api_url, &account.device_id, account.proxy.as_ref())
    }
}

/// The set of accounts run by this process.
pub struct Fleet<F> {
    config: FleetConfig,
    accounts: Vec<Account>,
    factory: F,
    loggers: Arc<LoggerRegistry>,
    clock: Arc<dyn Clock>,
}

impl<F: ClientFactory> Fleet<F> {
    /// Create a fleet. Accounts repeating an earlier email are dropped, so
    /// each email runs at most one state machine.
    pub fn new(config: FleetConfig, accounts: Vec<Account>, factory: F) -> Self {
        Self {
            config,
            accounts: unique_by_email(accounts),
            factory,
            loggers: Arc::new(LoggerRegistry::new()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a different wall clock for every account.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// Spawn every account's state machine, in order, sleeping the start
    /// cooldown between spawns. Returns the number of tasks started.
    ///
    /// All clients are built before the first spawn, so a bad proxy fails
    /// the whole start rather than leaving a partial fleet.
    pub async fn start(&self) -> Result<usize, FleetError> {
        self.config.validate()?;
        if self.accounts.is_empty() {
            return Err(FleetError::EmptyFleet);
        }

        let mut machines = Vec::with_capacity(self.accounts.len());
        for account in &self.accounts {
            let client = self
                .factory
                .build(account)
                .map_err(|source| FleetError::Client {
                    email: account.email().to_string(),
                    source,
                })?;
            let logger = self.loggers.get(account.email());
            machines.push(AccountMachine::new(
                account.clone(),
                client,
                logger,
                &self.config,
                Arc::clone(&self.clock),
            ));
        }

        let total = machines.len();
        for (index, machine) in machines.into_iter().enumerate() {
            if index > 0 {
                sleep(self.config.start_init_cooldown).await;
            }

            let logger = self.loggers.get(machine.account().email());
            info!(
                email = logger.email(),
                n = index + 1,
                total,
                "starting account"
            );
            tokio::spawn(machine.run().instrument(logger.span().clone()));
        }

        Ok(total)
    }

    /// Start the fleet, then idle until `shutdown` resolves.
    ///
    /// Returns as soon as `shutdown` fires, even mid-start. Account tasks are
    /// left running.
    pub async fn run_until<S>(&self, shutdown: S) -> Result<(), FleetError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        tokio::select! {
            started = self.start() => {
                info!(accounts = started?, "fleet started");
            }
            _ = &mut shutdown => {
                info!("interrupted during start");
                return Ok(());
            }
        }

        let mut keepalive = tokio::time::interval(self.config.keepalive_interval);
        keepalive.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("interrupted, leaving account tasks to end with the process");
                    return Ok(());
                }
                _ = keepalive.tick() => {
                    debug!(accounts = self.loggers.len(), "fleet alive");
                }
            }
        }
    }
}
