//! Error types for the fleet.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can stop the fleet from starting.
///
/// Remote failures during a workflow never surface here; the retry policy
/// absorbs them.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Accounts file could not be read.
    #[error("failed to read accounts file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Accounts file is not a valid JSON array of records.
    #[error("failed to parse accounts file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A per-account client could not be constructed (bad proxy address).
    #[error("failed to build client for {email}: {source}")]
    Client {
        email: String,
        #[source]
        source: vigil_client::ServiceError,
    },

    /// No accounts left after loading.
    #[error("no accounts to run")]
    EmptyFleet,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}
