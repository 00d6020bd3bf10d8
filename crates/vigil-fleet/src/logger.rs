//! Per-account logger handles.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{Span, info_span};

/// Logging handle for one account.
///
/// Events emitted with this span as parent carry the account's email.
#[derive(Debug, Clone)]
pub struct AccountLogger {
    email: Arc<str>,
    span: Span,
}

impl AccountLogger {
    fn new(email: &str) -> Self {
        Self {
            email: Arc::from(email),
            span: info_span!("account", email = %email),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Whether two handles came from the same registry entry.
    #[cfg(test)]
    fn same_as(&self, other: &AccountLogger) -> bool {
        Arc::ptr_eq(&self.email, &other.email)
    }
}

/// Keyed cache of account loggers, shared by every account task.
#[derive(Debug, Default)]
pub struct LoggerRegistry {
    loggers: DashMap<String, AccountLogger>,
}

impl LoggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the logger for `email`, creating it on first use.
    pub fn get(&self, email: &str) -> AccountLogger {
        if let Some(logger) = self.loggers.get(email) {
            return logger.clone();
        }

        self.loggers
            .entry(email.to_string())
            .or_insert_with(|| AccountLogger::new(email))
            .clone()
    }

    /// Number of accounts with a logger.
    pub(crate) fn len(&self) -> usize {
        self.loggers.len()
    }
}
