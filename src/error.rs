use thiserror::Error;

/// Unified error type for the gateway.
///
/// This aggregates every failure mode into the categories callers act on:
/// policy rejection, deadline expiry, runtime faults, analysis problems and
/// the usual transport/serialization plumbing. A cache miss is deliberately
/// NOT an error; lookups return `Option`.
#[derive(Debug, Error)]
pub enum Error {
    /// The policy collaborator refused the request before it reached the runtime.
    #[error("request rejected by policy: {reason}")]
    PolicyRejected { reason: String },

    /// A deadline expired. Distinct from `Runtime` so callers can retry
    /// timeouts without retrying hard faults.
    #[error("deadline exceeded after {elapsed_ms}ms during {operation}")]
    Timeout { operation: String, elapsed_ms: u64 },

    /// The inference runtime answered with a non-2xx status or a malformed body.
    #[error("runtime error{}: {message}", fmt_status(.status))]
    Runtime {
        status: Option<u16>,
        message: String,
    },

    /// A telemetry analysis step could not run (bad window, missing event, ...).
    #[error("analysis error: {0}")]
    Analysis(String),

    /// Invalid gateway configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A caller-supplied argument was rejected before any work happened
    /// (empty prompt, malformed invalidation pattern, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {})", code),
        None => String::new(),
    }
}

impl Error {
    /// Create a runtime error without an HTTP status (connection-level faults,
    /// malformed bodies, unhealthy runtime).
    pub fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime {
            status: None,
            message: message.into(),
        }
    }

    /// Create a runtime error carrying the upstream HTTP status.
    pub fn runtime_status(status: u16, message: impl Into<String>) -> Self {
        Error::Runtime {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>, elapsed: std::time::Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout { .. } => true,
            Error::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }

    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, Error::PolicyRejected { .. })
    }

    /// Whether retrying the same call can plausibly succeed. Policy rejections
    /// and configuration problems will fail identically on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout { .. } | Error::Transport(_) => true,
            Error::Runtime { status, .. } => matches!(status, Some(429) | Some(500..=599) | None),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timeout_classification() {
        let err = Error::timeout("generate", Duration::from_millis(1500));
        assert!(err.is_timeout());
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "deadline exceeded after 1500ms during generate"
        );
    }

    #[test]
    fn test_policy_rejection_not_retryable() {
        let err = Error::PolicyRejected {
            reason: "blocked keyword".to_string(),
        };
        assert!(err.is_policy_rejection());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_runtime_status_retryability() {
        assert!(Error::runtime_status(503, "overloaded").is_retryable());
        assert!(Error::runtime_status(429, "slow down").is_retryable());
        assert!(!Error::runtime_status(400, "bad request").is_retryable());
        assert!(Error::runtime("connection refused").is_retryable());
    }

    #[test]
    fn test_runtime_display_includes_status() {
        let err = Error::runtime_status(500, "boom");
        assert_eq!(err.to_string(), "runtime error (HTTP 500): boom");
        let err = Error::runtime("boom");
        assert_eq!(err.to_string(), "runtime error: boom");
    }
}
