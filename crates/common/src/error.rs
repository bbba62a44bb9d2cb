//! Common error types for Housecall components.

use thiserror::Error;

/// Errors surfaced by the external channel and meeting gateways.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Network transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using `GatewayError`
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!("{}", GatewayError::Transport("timeout".to_string())),
            "Transport error: timeout"
        );
        assert_eq!(
            format!("{}", GatewayError::NotFound("channel/abc".to_string())),
            "Not found: channel/abc"
        );
    }
}
