//! Wall-clock helpers: timezone selection for heartbeats and reward waits.

use std::ops::RangeInclusive;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveTime, Timelike, Utc};

/// Local hour a heartbeat claims to be sent at.
pub const HEARTBEAT_TARGET_HOUR: u32 = 23;

/// Whole-hour UTC offsets considered when picking a heartbeat timezone.
pub const OFFSET_HOURS: RangeInclusive<i32> = -12..=11;

/// Minute past the hour at which the reward epoch opens.
pub const REWARD_MINUTE: u32 = 15;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Find the UTC offset whose local hour is currently `target_hour`.
///
/// Returns the offset in minutes, sign preserved (`+5` is `300`). The 24
/// offsets are one hour apart, so exactly one matches any instant when
/// `target_hour < 24`; `None` means the heartbeat should be skipped.
pub fn pick_active_offset_minutes(now: DateTime<Utc>, target_hour: u32) -> Option<i32> {
    OFFSET_HOURS.into_iter().find_map(|hours| {
        let zone = FixedOffset::east_opt(hours * 3600)?;
        (now.with_timezone(&zone).hour() == target_hour).then_some(hours * 60)
    })
}

/// Time to sleep from `local_now` until `(hour + 1):15`.
///
/// Seconds within the current minute are ignored. The target is always the
/// next hour, even when `:15` of the current hour is still ahead.
pub fn reward_wait(local_now: NaiveTime) -> Duration {
    let current = local_now.hour() * 3600 + local_now.minute() * 60;
    let target = (local_now.hour() + 1) * 3600 + REWARD_MINUTE * 60;
    Duration::from_secs(u64::from(target - current))
}

/// The `(hour, minute)` wall-clock boundary [`reward_wait`] sleeps until.
pub fn reward_boundary(local_now: NaiveTime) -> (u32, u32) {
    ((local_now.hour() + 1) % 24, REWARD_MINUTE)
}
