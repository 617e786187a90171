//! Error types for sandbox sessions.
//!
//! Two layers:
//! - [`ValidationError`] for configuration that cannot be constructed
//! - [`SandboxError`] for everything a session operation can propagate
//!
//! Transport failures while a command is being dispatched are *not* errors:
//! they are folded into an [`ExecutionResult`](crate::ExecutionResult) with
//! exit code `-1`. Only connection and discovery failures escape as
//! `SandboxError`.

use thiserror::Error;

/// Errors raised while building a [`SandboxConfig`](crate::SandboxConfig).
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Container name or ID must not be empty")]
    EmptyContainer,

    #[error("Timeout {0}s is out of range: must be between 1 and 3600 seconds")]
    TimeoutOutOfRange(u64),

    #[error("Invalid timeout value '{0}': expected an integer number of seconds")]
    InvalidTimeout(String),

    #[error("Missing required environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can escape a sandbox session.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The runtime is unreachable, or an API call unrelated to container
    /// discovery failed.
    #[error("Connection to container runtime failed: {0}")]
    Connection(String),

    #[error("Container '{container}' not found")]
    ContainerNotFound { container: String },

    /// Reserved for strict timeout enforcement. No operation returns it;
    /// timeouts are reported through `ExecutionResult::timeout_occurred`.
    #[error("Execution timed out after {seconds} seconds")]
    ExecutionTimeout { seconds: u64 },

    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Returns true for runtime connectivity failures.
    pub fn is_connection(&self) -> bool {
        matches!(self, SandboxError::Connection(_))
    }

    /// Returns true when the configured container does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SandboxError::ContainerNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SandboxError::ContainerNotFound {
            container: "sandbox".to_string(),
        };
        assert_eq!(err.to_string(), "Container 'sandbox' not found");

        let err = SandboxError::Connection("socket refused".to_string());
        assert!(err.to_string().contains("socket refused"));

        let err = ValidationError::TimeoutOutOfRange(0);
        assert_eq!(
            err.to_string(),
            "Timeout 0s is out of range: must be between 1 and 3600 seconds"
        );
    }

    #[test]
    fn test_validation_converts_into_sandbox_error() {
        let err: SandboxError = ValidationError::EmptyContainer.into();
        assert!(matches!(err, SandboxError::Validation(ValidationError::EmptyContainer)));
    }

    #[test]
    fn test_predicates() {
        let not_found = SandboxError::ContainerNotFound {
            container: "x".to_string(),
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_connection());

        let conn = SandboxError::Connection("down".to_string());
        assert!(conn.is_connection());
        assert!(!conn.is_not_found());

        let timeout = SandboxError::ExecutionTimeout { seconds: 5 };
        assert!(!timeout.is_connection() && !timeout.is_not_found());
    }
}
