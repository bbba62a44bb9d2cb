//! Call engine error types.
//!
//! Gateway failures are caught and logged at the point of the call; nothing
//! in the engine propagates a panic or an unhandled rejection into the
//! cooperative scheduler. The variants here are the caller-visible error
//! signals of the session API.

use common::error::GatewayError;
use thiserror::Error;

use crate::protocol::DecodeError;

/// Call session error type.
#[derive(Debug, Error)]
pub enum CallError {
    /// A channel or meeting gateway operation failed.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Inbound or outbound metadata could not be (de)serialized.
    #[error("Metadata error: {0}")]
    Decode(#[from] DecodeError),

    /// A call is already active for this session.
    #[error("A call is already in progress")]
    CallInProgress,

    /// The operation requires an active call.
    #[error("No active call")]
    NoActiveCall,

    /// The operation requires meeting credentials that were never allocated.
    #[error("Meeting not allocated")]
    MeetingNotAllocated,

    /// The operation is not valid for this side of the call.
    #[error("Operation not valid for this call role")]
    WrongRole,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!("{}", CallError::CallInProgress),
            "A call is already in progress"
        );
        assert_eq!(format!("{}", CallError::NoActiveCall), "No active call");
        assert_eq!(
            format!(
                "{}",
                CallError::Gateway(GatewayError::Transport("timeout".to_string()))
            ),
            "Gateway error: Transport error: timeout"
        );
    }

    #[test]
    fn test_gateway_error_conversion() {
        let err: CallError = GatewayError::NotFound("channel/abc".to_string()).into();
        assert!(matches!(err, CallError::Gateway(_)));
    }
}
