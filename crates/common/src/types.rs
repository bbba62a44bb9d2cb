//! Common data types for Housecall components.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Ephemeral identifier for one messaging client session.
///
/// A new `ClientId` is minted every time a client opens its live event
/// stream; it tags outbound control traffic so a client can recognize its
/// own echoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Stable identity of a participant (clinician or patient).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// View the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Provider-issued meeting identifier, treated as opaque.
///
/// Inbound status updates are correlated against this value with exact
/// equality; a mismatch means the update belongs to some other call attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeetingId(pub String);

impl MeetingId {
    /// View the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MeetingId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for MeetingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque handle to a logical conversation channel.
///
/// Unique per call attempt and exclusively owned by it: the channel is
/// deleted exactly once, during teardown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRef(pub String);

impl ChannelRef {
    /// View the handle as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChannelRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_unique() {
        assert_ne!(ClientId::new(), ClientId::new());
    }

    #[test]
    fn test_user_id_round_trip() {
        let id = UserId::from("dr1");
        assert_eq!(id.as_str(), "dr1");
        assert_eq!(id.to_string(), "dr1");

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"dr1\"");
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_meeting_id_equality_is_exact() {
        assert_eq!(MeetingId::from("m1"), MeetingId::from("m1"));
        assert_ne!(MeetingId::from("m1"), MeetingId::from("M1"));
    }

    #[test]
    fn test_channel_ref_display() {
        let channel = ChannelRef::from("channel/abc-123");
        assert_eq!(channel.to_string(), "channel/abc-123");
    }
}
