//! Fleet configuration.

use std::time::Duration;

use vigil_scheduler::RetryPolicy;

use crate::FleetError;

/// Default delay between successive account starts.
pub const DEFAULT_START_INIT_COOLDOWN: Duration = Duration::from_secs(5);

/// Default pause after each gate check.
pub const DEFAULT_PROCESS_COOLDOWN: Duration = Duration::from_secs(10);

/// Default number of heartbeats per burst.
pub const DEFAULT_ACTIVITY_BURST_COUNT: u32 = 24;

/// Default pause between heartbeats in a burst.
pub const DEFAULT_ACTIVITY_SLEEP: Duration = Duration::from_secs(16);

/// Activity reported by each heartbeat.
pub const HEARTBEAT_DURATION: Duration = Duration::from_secs(4 * 60 * 60);

/// Sessions older than this are re-established.
pub const LOGIN_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

/// How often the launcher wakes while waiting for an interrupt.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// Timing of one account's workflow loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowTiming {
    /// Pause after the login gate, the join gate, and the heartbeat burst.
    pub process_cooldown: Duration,
    /// Heartbeats sent per burst.
    pub activity_burst_count: u32,
    /// Pause after each heartbeat.
    pub activity_sleep: Duration,
    /// Activity duration claimed by each heartbeat.
    pub heartbeat_duration: Duration,
    /// Maximum session age before the login gate fires.
    pub login_interval: Duration,
}

impl Default for WorkflowTiming {
    fn default() -> Self {
        Self {
            process_cooldown: DEFAULT_PROCESS_COOLDOWN,
            activity_burst_count: DEFAULT_ACTIVITY_BURST_COUNT,
            activity_sleep: DEFAULT_ACTIVITY_SLEEP,
            heartbeat_duration: HEARTBEAT_DURATION,
            login_interval: LOGIN_INTERVAL,
        }
    }
}

/// Configuration for a fleet run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetConfig {
    /// Reference (invite link) of the resource every account joins.
    pub resource_reference: String,
    /// Delay between successive account starts.
    pub start_init_cooldown: Duration,
    /// Wake-up period of the launcher while idle.
    pub keepalive_interval: Duration,
    /// Cooldowns applied to failed remote calls.
    pub retry: RetryPolicy,
    /// Per-account workflow timing.
    pub workflow: WorkflowTiming,
}

impl FleetConfig {
    /// Configuration with default timings for the given resource.
    pub fn new(resource_reference: impl Into<String>) -> Self {
        Self {
            resource_reference: resource_reference.into(),
            start_init_cooldown: DEFAULT_START_INIT_COOLDOWN,
            keepalive_interval: KEEPALIVE_INTERVAL,
            retry: RetryPolicy::default(),
            workflow: WorkflowTiming::default(),
        }
    }

    /// Reject configurations the workflow cannot run with.
    pub fn validate(&self) -> Result<(), FleetError> {
        if self.resource_reference.trim().is_empty() {
            return Err(FleetError::Config(
                "resource reference must not be empty".to_string(),
            ));
        }
        if self.keepalive_interval.is_zero() {
            return Err(FleetError::Config(
                "keepalive interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
