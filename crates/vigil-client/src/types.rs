//! Wire types shared between the client and the fleet.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Length of one activity chunk reported in a heartbeat.
pub const ACTIVITY_CHUNK: Duration = Duration::from_secs(5 * 60);

/// Result of resolving a resource reference (an invite link, a slug).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    pub resource_id: u64,
    #[serde(default)]
    pub invitation_id: Option<String>,
}

/// Outbound proxy configuration for one account.
///
/// Account files carry either a single address, applied to both transport
/// schemes, or a mapping keyed by scheme.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Proxy {
    /// One address for both `http` and `https`.
    Single(String),
    /// Separate addresses per scheme. A missing scheme is not proxied.
    PerScheme {
        #[serde(default, alias = "http://")]
        http: Option<String>,
        #[serde(default, alias = "https://")]
        https: Option<String>,
    },
}

impl Proxy {
    /// Normalize a raw value: blank addresses are dropped, and a proxy with
    /// no address left is `None`.
    pub fn normalize(self) -> Option<Self> {
        fn clean(addr: Option<String>) -> Option<String> {
            addr.map(|a| a.trim().to_string()).filter(|a| !a.is_empty())
        }

        match self {
            Proxy::Single(addr) => clean(Some(addr)).map(Proxy::Single),
            Proxy::PerScheme { http, https } => match (clean(http), clean(https)) {
                (None, None) => None,
                (http, https) => Some(Proxy::PerScheme { http, https }),
            },
        }
    }

    /// Address used for plain `http` traffic.
    pub fn http(&self) -> Option<&str> {
        match self {
            Proxy::Single(addr) => Some(addr),
            Proxy::PerScheme { http, .. } => http.as_deref(),
        }
    }

    /// Address used for `https` traffic.
    pub fn https(&self) -> Option<&str> {
        match self {
            Proxy::Single(addr) => Some(addr),
            Proxy::PerScheme { https, .. } => https.as_deref(),
        }
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Proxy::Single(addr) => write!(f, "{}", addr),
            Proxy::PerScheme { http, https } => write!(
                f,
                "http={} https={}",
                http.as_deref().unwrap_or("-"),
                https.as_deref().unwrap_or("-")
            ),
        }
    }
}

/// One contiguous span of reported activity, in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActivityChunk {
    pub start: i64,
    pub end: i64,
}

/// Split `duration` into [`ACTIVITY_CHUNK`]-sized spans ending at `end`,
/// oldest first. A trailing remainder shorter than one chunk is dropped.
pub fn activity_chunks(end: DateTime<Utc>, duration: Duration) -> Vec<ActivityChunk> {
    let step = ACTIVITY_CHUNK.as_secs() as i64;
    let count = (duration.as_secs() / ACTIVITY_CHUNK.as_secs()) as i64;
    let end = end.timestamp();

    (0..count)
        .rev()
        .map(|i| ActivityChunk {
            start: end - (i + 1) * step,
            end: end - i * step,
        })
        .collect()
}
