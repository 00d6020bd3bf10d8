//! Account workflows for vigil.
//!
//! This crate provides:
//! - Account records, loading and deduplication by email
//! - A per-account logger registry
//! - The account state machine (setup, login, join, heartbeats, reward wait)
//! - The fleet launcher that staggers account starts

mod account;
mod config;
mod error;
mod launcher;
mod logger;
mod machine;

pub use account::{Account, AccountRecord, dedupe_accounts, load_records};
pub use config::{
    DEFAULT_ACTIVITY_BURST_COUNT, DEFAULT_ACTIVITY_SLEEP, DEFAULT_PROCESS_COOLDOWN,
    DEFAULT_START_INIT_COOLDOWN, FleetConfig, HEARTBEAT_DURATION, KEEPALIVE_INTERVAL,
    LOGIN_INTERVAL, WorkflowTiming,
};
pub use error::FleetError;
pub use launcher::{ClientFactory, Fleet, HttpClientFactory};
pub use logger::{AccountLogger, LoggerRegistry};
pub use machine::AccountMachine;

pub use vigil_scheduler::RetryPolicy;
