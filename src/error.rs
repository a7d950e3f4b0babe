//! Error types for localnet.

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a localnet cluster or load bot.
///
/// None of these are retried. The first one raised inside a task group
/// cancels the group and is what the caller sees.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Node bootstrap failed.
    #[error("node initialization failed: {0}")]
    Initialization(String),

    /// Pushing the static peer list to a node failed.
    #[error("topology error: {0}")]
    Topology(String),

    /// A node process exited abnormally.
    #[error("node process error: {0}")]
    ProcessRun(String),

    /// A transaction could not be submitted.
    #[error("error sending transaction: {0}")]
    Submission(String),

    /// Waiting for a transaction to be mined failed.
    #[error("error waiting for transaction: {0}")]
    Confirmation(String),

    /// JSON-RPC transport or protocol error.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// Key parsing or signing error.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A task in a group panicked or was aborted.
    #[error("task failed: {0}")]
    Task(String),

    /// The shared cancellation signal fired.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error is the cooperative cancellation signal rather than a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
