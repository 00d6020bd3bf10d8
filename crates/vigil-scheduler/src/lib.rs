//! Scheduling primitives for vigil account workflows.
//!
//! This crate provides:
//! - A pluggable wall clock and the timezone-offset picker used by heartbeats
//! - The reward-epoch wait calculation
//! - The retry policy every remote call passes through

mod clock;
mod retry;

pub use clock::{
    Clock, HEARTBEAT_TARGET_HOUR, ManualClock, OFFSET_HOURS, REWARD_MINUTE, SystemClock,
    pick_active_offset_minutes, reward_boundary, reward_wait,
};
pub use retry::{DEFAULT_ERROR_COOLDOWN, DEFAULT_RATE_LIMIT_COOLDOWN, RetryPolicy};
