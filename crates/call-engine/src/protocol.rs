//! Wire metadata schema for the negotiation protocol.
//!
//! Every message published into a call channel carries a JSON metadata blob
//! alongside a short plaintext content marker. The metadata is the control
//! plane of the negotiation (correlation ID, invitation flag, status); the
//! content markers exist for observability and are never parsed for control
//! decisions, with one exception: `SendingInvite` identifies an incoming
//! invitation on a channel the client is not yet tracking.
//!
//! Malformed metadata is never fatal: decoding yields a [`DecodeError`]
//! that callers log and drop.

use chrono::{DateTime, Timelike, Utc};
use common::types::{ClientId, MeetingId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Plaintext content of a presence ping.
pub const PING_CONTENT: &str = "ping";

/// Invitation status carried in message metadata.
///
/// `Unknown` is the only non-terminal status. A call's status moves out of
/// `Unknown` at most once and never back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InviteStatus {
    /// No response from the counterpart yet.
    #[default]
    Unknown,
    /// The counterpart accepted the invitation.
    Accepted,
    /// The counterpart declined the invitation.
    Declined,
    /// The call was cancelled locally or the channel disappeared.
    Cancelled,
}

impl InviteStatus {
    /// Whether this status permits no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, InviteStatus::Unknown)
    }
}

/// Reserved plaintext content markers sent alongside metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedContent {
    /// An invitation announcement (repeated until answered).
    SendingInvite,
    /// The counterpart accepted.
    AcceptedInvite,
    /// The counterpart declined.
    DeclinedInvite,
    /// The caller cancelled before an answer arrived.
    CanceledInvite,
}

impl ReservedContent {
    /// Returns the wire form of the marker.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ReservedContent::SendingInvite => "SendingInvite",
            ReservedContent::AcceptedInvite => "AcceptedInvite",
            ReservedContent::DeclinedInvite => "DeclinedInvite",
            ReservedContent::CanceledInvite => "CanceledInvite",
        }
    }

    /// Parses a wire marker, returning `None` for anything unreserved.
    #[must_use]
    pub fn parse(content: &str) -> Option<Self> {
        match content {
            "SendingInvite" => Some(ReservedContent::SendingInvite),
            "AcceptedInvite" => Some(ReservedContent::AcceptedInvite),
            "DeclinedInvite" => Some(ReservedContent::DeclinedInvite),
            "CanceledInvite" => Some(ReservedContent::CanceledInvite),
            _ => None,
        }
    }
}

/// Metadata (de)serialization failure.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The metadata blob is not valid JSON for the expected shape.
    #[error("Invalid metadata JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-message metadata blob.
///
/// `meetingId` and `inviteStatus` are optional on the wire: presence pings
/// carry neither.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    /// Ephemeral identifier of the sending client session.
    pub client_id: ClientId,
    /// Whether this message is part of an invitation negotiation.
    #[serde(default)]
    pub is_meeting_invitation: bool,
    /// Whether this message doubles as a liveness signal.
    #[serde(default)]
    pub is_presence: bool,
    /// Correlation identifier for the pending meeting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_id: Option<MeetingId>,
    /// Invitation status announced by the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_status: Option<InviteStatus>,
}

impl MessageMetadata {
    /// Serialize to the wire JSON form.
    pub fn encode(&self) -> Result<String, DecodeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from the wire JSON form.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Channel-level metadata blob attached at channel creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMetadata {
    /// Identity of the side that initiated the call.
    pub caller: UserId,
    /// Identity of the side being called.
    pub recipient: UserId,
    /// Scheduled time of the appointment backing this call.
    pub appointment_timestamp: DateTime<Utc>,
    /// Last-seen presence timestamps by username, seconds since the epoch.
    #[serde(default)]
    pub presence_map: HashMap<String, i64>,
}

impl ChannelMetadata {
    /// Build the metadata blob for a call starting now.
    ///
    /// The appointment timestamp is truncated to the minute.
    #[must_use]
    pub fn for_call(caller: UserId, recipient: UserId, now: DateTime<Utc>) -> Self {
        let appointment_timestamp = now
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);
        Self {
            caller,
            recipient,
            appointment_timestamp,
            presence_map: HashMap::new(),
        }
    }

    /// Serialize to the wire JSON form.
    pub fn encode(&self) -> Result<String, DecodeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from the wire JSON form.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_invite_status_terminality() {
        assert!(!InviteStatus::Unknown.is_terminal());
        assert!(InviteStatus::Accepted.is_terminal());
        assert!(InviteStatus::Declined.is_terminal());
        assert!(InviteStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_message_metadata_wire_shape() {
        let metadata = MessageMetadata {
            client_id: ClientId::new(),
            is_meeting_invitation: true,
            is_presence: true,
            meeting_id: Some(MeetingId::from("m1")),
            invite_status: Some(InviteStatus::Unknown),
        };

        let encoded = metadata.encode().unwrap();
        assert!(encoded.contains("\"clientId\""));
        assert!(encoded.contains("\"isMeetingInvitation\":true"));
        assert!(encoded.contains("\"isPresence\":true"));
        assert!(encoded.contains("\"meetingId\":\"m1\""));
        assert!(encoded.contains("\"inviteStatus\":\"Unknown\""));

        let decoded = MessageMetadata::decode(&encoded).unwrap();
        assert_eq!(decoded.meeting_id, Some(MeetingId::from("m1")));
        assert_eq!(decoded.invite_status, Some(InviteStatus::Unknown));
    }

    #[test]
    fn test_message_metadata_optional_fields_absent() {
        let metadata = MessageMetadata {
            client_id: ClientId::new(),
            is_meeting_invitation: false,
            is_presence: true,
            meeting_id: None,
            invite_status: None,
        };

        let encoded = metadata.encode().unwrap();
        assert!(!encoded.contains("meetingId"));
        assert!(!encoded.contains("inviteStatus"));

        let decoded = MessageMetadata::decode(&encoded).unwrap();
        assert!(decoded.meeting_id.is_none());
        assert!(decoded.invite_status.is_none());
    }

    #[test]
    fn test_message_metadata_decode_failure() {
        assert!(MessageMetadata::decode("not json").is_err());
        assert!(MessageMetadata::decode("{\"clientId\":42}").is_err());
    }

    #[test]
    fn test_reserved_content_round_trip() {
        for marker in [
            ReservedContent::SendingInvite,
            ReservedContent::AcceptedInvite,
            ReservedContent::DeclinedInvite,
            ReservedContent::CanceledInvite,
        ] {
            assert_eq!(ReservedContent::parse(marker.as_str()), Some(marker));
        }
        assert_eq!(ReservedContent::parse("hello"), None);
        assert_eq!(ReservedContent::parse(PING_CONTENT), None);
    }

    #[test]
    fn test_channel_metadata_truncates_to_minute() {
        let now = "2026-08-06T10:15:42.123Z".parse::<DateTime<Utc>>().unwrap();
        let metadata =
            ChannelMetadata::for_call(UserId::from("dr1"), UserId::from("pt1"), now);
        assert_eq!(
            metadata.appointment_timestamp,
            "2026-08-06T10:15:00Z".parse::<DateTime<Utc>>().unwrap()
        );

        let encoded = metadata.encode().unwrap();
        let decoded = ChannelMetadata::decode(&encoded).unwrap();
        assert_eq!(decoded.caller, UserId::from("dr1"));
        assert_eq!(decoded.recipient, UserId::from("pt1"));
        assert!(decoded.presence_map.is_empty());
    }
}
