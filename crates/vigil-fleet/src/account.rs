//! Account records and per-account run state.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use vigil_client::Proxy;

use crate::FleetError;

/// One entry of the accounts file.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct AccountRecord {
    pub email: String,
    pub password: String,
    pub device: String,
    #[serde(default)]
    pub proxy: Option<Proxy>,
}

impl fmt::Debug for AccountRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountRecord")
            .field("email", &self.email)
            .field("device", &self.device)
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

/// A fleet member: credentials plus the state its workflow accumulates.
///
/// Equality and hashing use the email only.
#[derive(Clone)]
pub struct Account {
    email: String,
    pub password: String,
    pub device_id: String,
    pub proxy: Option<Proxy>,
    /// Informational; never drives the workflow.
    pub reward_balance: u64,
    last_authenticated_at: Option<DateTime<Utc>>,
    resource_id: u64,
    invitation_token: Option<String>,
    has_joined_resource: bool,
}

impl Account {
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        device_id: impl Into<String>,
        proxy: Option<Proxy>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            device_id: device_id.into(),
            proxy: proxy.and_then(Proxy::normalize),
            reward_balance: 0,
            last_authenticated_at: None,
            resource_id: 0,
            invitation_token: None,
            has_joined_resource: false,
        }
    }

    /// Identity key of the account; fixed at construction.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// When the last successful login happened, if ever.
    pub fn last_authenticated_at(&self) -> Option<DateTime<Utc>> {
        self.last_authenticated_at
    }

    /// Resolved resource id; `0` until setup completes.
    pub fn resource_id(&self) -> u64 {
        self.resource_id
    }

    pub fn invitation_token(&self) -> Option<&str> {
        self.invitation_token.as_deref()
    }

    pub fn has_joined_resource(&self) -> bool {
        self.has_joined_resource
    }

    /// Whether the session is missing or older than `max_age` at `now`.
    pub fn login_due(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        match self.last_authenticated_at {
            None => true,
            Some(at) => now - at > max_age,
        }
    }

    /// Record a successful login.
    pub fn record_login(&mut self, at: DateTime<Utc>) {
        self.last_authenticated_at = Some(at);
    }

    /// Store the resolved resource. Only the first call has any effect;
    /// returns whether this call set it.
    pub fn set_resource(&mut self, resource_id: u64, invitation_token: Option<String>) -> bool {
        if self.resource_id != 0 {
            return false;
        }
        self.resource_id = resource_id;
        self.invitation_token = invitation_token;
        true
    }

    /// Record that the account joined its resource. Irreversible.
    pub fn mark_joined(&mut self) {
        self.has_joined_resource = true;
    }
}

impl From<AccountRecord> for Account {
    fn from(record: AccountRecord) -> Self {
        Account::new(record.email, record.password, record.device, record.proxy)
    }
}

impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.email == other.email
    }
}

impl Eq for Account {}

impl Hash for Account {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.email.hash(state);
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("email", &self.email)
            .field("device_id", &self.device_id)
            .field("proxy", &self.proxy)
            .field("last_authenticated_at", &self.last_authenticated_at)
            .field("resource_id", &self.resource_id)
            .field("has_joined_resource", &self.has_joined_resource)
            .finish_non_exhaustive()
    }
}

/// Load account records from a JSON array file.
pub async fn load_records(path: &Path) -> Result<Vec<AccountRecord>, FleetError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| FleetError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let records: Vec<AccountRecord> =
        serde_json::from_str(&text).map_err(|source| FleetError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    info!(path = %path.display(), count = records.len(), "loaded account records");
    Ok(records)
}

/// Build one account per distinct email, keeping the first occurrence and
/// the input order.
pub fn dedupe_accounts(records: impl IntoIterator<Item = AccountRecord>) -> Vec<Account> {
    unique_by_email(records.into_iter().map(Account::from))
}

/// Drop every account whose email was already seen, preserving order.
pub(crate) fn unique_by_email(accounts: impl IntoIterator<Item = Account>) -> Vec<Account> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();

    for account in accounts {
        if !seen.insert(account.email.clone()) {
            debug!(email = %account.email, "skipping duplicate account");
            continue;
        }
        unique.push(account);
    }

    unique
}
