//! Error types for armada operations
//!
//! Only [`Error::Config`] is fatal: it aborts a command before any provider
//! call is made. Provider and bootstrap failures are recorded per operation
//! and folded into the boolean aggregate a batch returns, so a partial batch
//! still persists whatever succeeded.

use thiserror::Error;

/// Main error type for armada operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed or incomplete cluster document, or invalid operator input
    #[error("config error: {0}")]
    Config(String),

    /// Non-success response from the cloud provider for a single operation
    #[error("provider error: {0}")]
    Provider(String),

    /// A node's address was never assigned within the polling bound
    #[error("address convergence timed out for group [{group}] after {attempts} attempts")]
    ConvergenceTimeout {
        /// Group tag that failed to converge
        group: String,
        /// Number of polling cycles performed before giving up
        attempts: u32,
    },

    /// A swarm init/join command failed or returned an unexpected response
    #[error("bootstrap error: {0}")]
    Bootstrap(String),

    /// A local command (ssh-keygen) could not be executed
    #[error("command failed: {0}")]
    Command(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a config error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a provider error with the given message
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a bootstrap error with the given message
    pub fn bootstrap(msg: impl Into<String>) -> Self {
        Self::Bootstrap(msg.into())
    }

    /// Create a command error with the given message
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_accept_str_and_string() {
        let err = Error::config("missing [label]");
        assert!(err.to_string().contains("config error"));

        let group = "worker";
        let err = Error::provider(format!("create failed for {group}"));
        assert!(err.to_string().contains("create failed for worker"));
    }

    #[test]
    fn convergence_timeout_names_group_and_attempts() {
        let err = Error::ConvergenceTimeout {
            group: "manager".to_string(),
            attempts: 60,
        };
        let msg = err.to_string();
        assert!(msg.contains("[manager]"));
        assert!(msg.contains("60 attempts"));
    }
}
