use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Drover-specific error types for better error handling
#[derive(Error, Debug)]
pub enum DroverError {
    #[error("Remote API error: {0}")]
    Api(#[from] ApiError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialization error: {0}")]
    Serialization(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Generic error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Normalized failure carried inside a result envelope.
///
/// Every remote or workflow failure is folded into one of these variants so
/// callers can render diagnostics or branch on the failure class without
/// string matching. Serializes alongside the envelope it travels in.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApiError {
    #[error("container not found: {name}")]
    NotFound { name: String },

    #[error("{message}")]
    Remote { message: String, code: Option<i64> },

    #[error("transport failure: {message}")]
    Transport { message: String },

    #[error("malformed response: {message}")]
    Protocol { message: String },

    #[error("operation {id} failed: {message}")]
    OperationFailed { id: String, message: String },

    #[error("operation {id} timed out after {seconds}s")]
    OperationTimedOut { id: String, seconds: u64 },

    #[error("no reachable node: {message}")]
    NoReachableNode { message: String },

    #[error("misconfigured: {message}")]
    Config { message: String },
}

impl ApiError {
    /// True when the failure means the container does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convenience type alias for Drover results
pub type Result<T, E = DroverError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_displays_message_verbatim() {
        let err = ApiError::Remote {
            message: "Certificate already in trust store".to_string(),
            code: Some(400),
        };
        assert_eq!(err.to_string(), "Certificate already in trust store");
    }

    #[test]
    fn test_operation_failed_display_includes_remote_text() {
        let err = ApiError::OperationFailed {
            id: "op-7".to_string(),
            message: "disk full".to_string(),
        };
        assert!(err.to_string().contains("disk full"));
        assert!(err.to_string().contains("op-7"));
    }

    #[test]
    fn test_api_error_serializes_with_kind_tag() {
        let err = ApiError::NotFound {
            name: "web01".to_string(),
        };
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["kind"], "not_found");
        assert_eq!(value["name"], "web01");
    }

    #[test]
    fn test_not_found_predicate() {
        let missing = ApiError::NotFound {
            name: "db01".to_string(),
        };
        let other = ApiError::Transport {
            message: "connection refused".to_string(),
        };
        assert!(missing.is_not_found());
        assert!(!other.is_not_found());
    }
}
