//! Shared fixtures for call engine tests.

use call_engine::protocol::{ChannelMetadata, InviteStatus, MessageMetadata};
use chrono::Utc;
use common::types::{ClientId, MeetingId, UserId};

/// Install a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a participant identity.
#[must_use]
pub fn user(name: &str) -> UserId {
    UserId::from(name)
}

/// Encoded invitation metadata for the given meeting and status.
#[must_use]
pub fn invitation_metadata(client_id: ClientId, meeting_id: &str, status: InviteStatus) -> String {
    MessageMetadata {
        client_id,
        is_meeting_invitation: true,
        is_presence: true,
        meeting_id: Some(MeetingId::from(meeting_id)),
        invite_status: Some(status),
    }
    .encode()
    .expect("metadata should encode")
}

/// Encoded presence-only metadata (no invitation fields).
#[must_use]
pub fn presence_metadata(client_id: ClientId) -> String {
    MessageMetadata {
        client_id,
        is_meeting_invitation: false,
        is_presence: true,
        meeting_id: None,
        invite_status: None,
    }
    .encode()
    .expect("metadata should encode")
}

/// A metadata blob that fails to decode.
#[must_use]
pub fn malformed_metadata() -> String {
    "{\"clientId\": not json".to_string()
}

/// Encoded channel metadata for a call between the given parties.
#[must_use]
pub fn channel_metadata(caller: &str, recipient: &str) -> String {
    ChannelMetadata::for_call(UserId::from(caller), UserId::from(recipient), Utc::now())
        .encode()
        .expect("metadata should encode")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invitation_metadata_decodes() {
        let raw = invitation_metadata(ClientId::new(), "m1", InviteStatus::Unknown);
        let decoded = MessageMetadata::decode(&raw).unwrap();
        assert!(decoded.is_meeting_invitation);
        assert_eq!(decoded.meeting_id, Some(MeetingId::from("m1")));
    }

    #[test]
    fn test_malformed_metadata_fails_decode() {
        assert!(MessageMetadata::decode(&malformed_metadata()).is_err());
    }
}
