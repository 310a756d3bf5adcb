//! Error types for container lifecycle operations

use conduit_common::Role;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for runtime and engine operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Failures of a single lifecycle operation
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Daemon unreachable or handshake failed
    #[error("failed to connect to container daemon at {endpoint}: {message}")]
    ConnectionFailed { endpoint: String, message: String },

    #[error("failed to pull image {image}: {message}")]
    PullFailed { image: String, message: String },

    /// Malformed job or component data
    #[error("invalid container specification: {0}")]
    InvalidSpec(String),

    /// Daemon rejected the create request
    #[error("daemon rejected container {name}: {message}")]
    CreateFailed { name: String, message: String },

    /// Stream setup failed; start was never issued
    #[error("failed to attach to container {id}: {message}")]
    AttachFailed { id: String, message: String },

    #[error("failed to start container {id}: {message}")]
    StartFailed { id: String, message: String },

    /// Exit status unknown
    #[error("failed waiting on container {id}: {message}")]
    WaitFailed { id: String, message: String },

    #[error("failed to look up container {name}: {message}")]
    LookupFailed { name: String, message: String },

    #[error("failed to remove container {name}: {message}")]
    RemoveFailed { name: String, message: String },

    #[error("failed to open log file {}: {source}", .path.display())]
    LogSetupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write container output: {0}")]
    LogWriteFailed(#[source] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl RuntimeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Lifecycle failure with enough context to correlate with logs
#[derive(Debug, Error)]
#[error("{role} container {container} (invocation {invocation_id}): {kind}")]
pub struct LifecycleError {
    pub role: Role,
    pub container: String,
    pub invocation_id: String,
    #[source]
    pub kind: RuntimeError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_error_carries_context() {
        let err = LifecycleError {
            role: Role::Download,
            container: "input-0-abc".to_string(),
            invocation_id: "abc".to_string(),
            kind: RuntimeError::PullFailed {
                image: "discoenv/porklock:latest".to_string(),
                message: "manifest unknown".to_string(),
            },
        };

        let msg = err.to_string();
        assert!(msg.contains("input container input-0-abc"));
        assert!(msg.contains("invocation abc"));
        assert!(msg.contains("manifest unknown"));
    }

    #[test]
    fn test_is_cancelled() {
        assert!(RuntimeError::Cancelled.is_cancelled());
        assert!(!RuntimeError::InvalidSpec("x".to_string()).is_cancelled());
    }
}
