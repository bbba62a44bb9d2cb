//! Inbound event filtering for the invitation negotiation.
//!
//! The filter chain is pure and synchronous so it can be tested without a
//! runtime. Control-plane traffic never reaches these functions; the
//! session strips it first and feeds pings to the presence tracker.
//!
//! For an active call the chain short-circuits at the first non-match:
//! event type, metadata decode, invitation flag, meeting-ID correlation,
//! finalized-set guard, counterpart identity. Stale and mismatched events
//! are dropped silently (expected under at-least-once delivery); only
//! decode failures are logged.

use common::types::{ChannelRef, MeetingId, UserId};
use tracing::warn;

use super::guard::FinalizedMeetings;
use crate::gateway::ChannelEvent;
use crate::protocol::{InviteStatus, MessageMetadata, ReservedContent};

/// Correlation context for the active call.
#[derive(Debug)]
pub struct ActiveCallContext<'a> {
    /// Channel owned by the active call.
    pub channel: &'a ChannelRef,
    /// Correlation ID of the active call, if allocated.
    pub meeting_id: Option<&'a MeetingId>,
    /// The identity whose responses are acted on.
    pub counterpart: &'a UserId,
    /// Meetings already finalized locally.
    pub finalized: &'a FinalizedMeetings,
}

/// Outcome of filtering one event against the active call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The counterpart announced a new invitation status.
    StatusUpdate(InviteStatus),
    /// The active call's channel was deleted remotely.
    ChannelGone,
    /// The event is not relevant to the active call.
    Ignored,
}

/// Filter an inbound event against the active call.
#[must_use]
pub fn observe_active(event: &ChannelEvent, ctx: &ActiveCallContext<'_>) -> Observation {
    let (sender, metadata) = match event {
        ChannelEvent::MessageCreated {
            sender,
            metadata,
            is_control: false,
            ..
        } => (sender, metadata),
        ChannelEvent::ChannelDeleted { channel } if channel == ctx.channel => {
            return Observation::ChannelGone;
        }
        _ => return Observation::Ignored,
    };

    let metadata = match MessageMetadata::decode(metadata) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(
                target: "housecall.observe",
                error = %e,
                "failed to decode message metadata"
            );
            return Observation::Ignored;
        }
    };

    if !metadata.is_meeting_invitation {
        return Observation::Ignored;
    }

    let Some(meeting_id) = metadata.meeting_id.as_ref() else {
        return Observation::Ignored;
    };
    if ctx.meeting_id != Some(meeting_id) {
        return Observation::Ignored;
    }
    if ctx.finalized.contains(meeting_id) {
        return Observation::Ignored;
    }
    if sender != ctx.counterpart {
        return Observation::Ignored;
    }

    match metadata.invite_status {
        Some(status) => Observation::StatusUpdate(status),
        None => Observation::Ignored,
    }
}

/// An invitation detected on a channel this session is not yet tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingInvite {
    /// Channel carrying the invitation.
    pub channel: ChannelRef,
    /// Correlation ID announced by the caller.
    pub meeting_id: MeetingId,
}

/// Detect an incoming invitation while no call is active.
#[must_use]
pub fn observe_idle(
    event: &ChannelEvent,
    self_identity: &UserId,
    finalized: &FinalizedMeetings,
) -> Option<IncomingInvite> {
    let ChannelEvent::MessageCreated {
        channel,
        sender,
        content,
        metadata,
        is_control: false,
    } = event
    else {
        return None;
    };

    if sender == self_identity {
        return None;
    }
    if ReservedContent::parse(content) != Some(ReservedContent::SendingInvite) {
        return None;
    }

    let metadata = match MessageMetadata::decode(metadata) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(
                target: "housecall.observe",
                error = %e,
                "failed to decode invitation metadata"
            );
            return None;
        }
    };

    let meeting_id = metadata.meeting_id?;
    if finalized.contains(&meeting_id) {
        return None;
    }

    Some(IncomingInvite {
        channel: channel.clone(),
        meeting_id,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::types::ClientId;

    fn metadata_json(meeting_id: &str, status: InviteStatus) -> String {
        MessageMetadata {
            client_id: ClientId::new(),
            is_meeting_invitation: true,
            is_presence: true,
            meeting_id: Some(MeetingId::from(meeting_id)),
            invite_status: Some(status),
        }
        .encode()
        .unwrap()
    }

    fn message(sender: &str, content: &str, metadata: String) -> ChannelEvent {
        ChannelEvent::MessageCreated {
            channel: ChannelRef::from("channel/abc"),
            sender: UserId::from(sender),
            content: content.to_string(),
            metadata,
            is_control: false,
        }
    }

    struct Fixture {
        channel: ChannelRef,
        meeting_id: MeetingId,
        counterpart: UserId,
        finalized: FinalizedMeetings,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                channel: ChannelRef::from("channel/abc"),
                meeting_id: MeetingId::from("m1"),
                counterpart: UserId::from("pt1"),
                finalized: FinalizedMeetings::new(),
            }
        }

        fn ctx(&self) -> ActiveCallContext<'_> {
            ActiveCallContext {
                channel: &self.channel,
                meeting_id: Some(&self.meeting_id),
                counterpart: &self.counterpart,
                finalized: &self.finalized,
            }
        }
    }

    #[test]
    fn test_matching_status_update_applies() {
        let fixture = Fixture::new();
        let event = message(
            "pt1",
            "AcceptedInvite",
            metadata_json("m1", InviteStatus::Accepted),
        );
        assert_eq!(
            observe_active(&event, &fixture.ctx()),
            Observation::StatusUpdate(InviteStatus::Accepted)
        );
    }

    #[test]
    fn test_control_messages_ignored() {
        let fixture = Fixture::new();
        let event = ChannelEvent::MessageCreated {
            channel: fixture.channel.clone(),
            sender: fixture.counterpart.clone(),
            content: "ping".to_string(),
            metadata: metadata_json("m1", InviteStatus::Accepted),
            is_control: true,
        };
        assert_eq!(observe_active(&event, &fixture.ctx()), Observation::Ignored);
    }

    #[test]
    fn test_malformed_metadata_dropped() {
        let fixture = Fixture::new();
        let event = message("pt1", "AcceptedInvite", "{not json".to_string());
        assert_eq!(observe_active(&event, &fixture.ctx()), Observation::Ignored);
    }

    #[test]
    fn test_non_invitation_metadata_ignored() {
        let fixture = Fixture::new();
        let metadata = MessageMetadata {
            client_id: ClientId::new(),
            is_meeting_invitation: false,
            is_presence: true,
            meeting_id: Some(MeetingId::from("m1")),
            invite_status: Some(InviteStatus::Accepted),
        }
        .encode()
        .unwrap();
        let event = message("pt1", "hello", metadata);
        assert_eq!(observe_active(&event, &fixture.ctx()), Observation::Ignored);
    }

    #[test]
    fn test_wrong_meeting_id_never_mutates() {
        let fixture = Fixture::new();
        let event = message(
            "pt1",
            "AcceptedInvite",
            metadata_json("m2", InviteStatus::Accepted),
        );
        assert_eq!(observe_active(&event, &fixture.ctx()), Observation::Ignored);
    }

    #[test]
    fn test_finalized_meeting_dropped() {
        let mut fixture = Fixture::new();
        fixture.finalized.finalize(MeetingId::from("m1"));
        let event = message(
            "pt1",
            "AcceptedInvite",
            metadata_json("m1", InviteStatus::Accepted),
        );
        assert_eq!(observe_active(&event, &fixture.ctx()), Observation::Ignored);
    }

    #[test]
    fn test_wrong_sender_dropped() {
        let fixture = Fixture::new();
        let event = message(
            "intruder",
            "AcceptedInvite",
            metadata_json("m1", InviteStatus::Accepted),
        );
        assert_eq!(observe_active(&event, &fixture.ctx()), Observation::Ignored);
    }

    #[test]
    fn test_no_meeting_allocated_yet_ignores_updates() {
        let fixture = Fixture::new();
        let ctx = ActiveCallContext {
            channel: &fixture.channel,
            meeting_id: None,
            counterpart: &fixture.counterpart,
            finalized: &fixture.finalized,
        };
        let event = message(
            "pt1",
            "AcceptedInvite",
            metadata_json("m1", InviteStatus::Accepted),
        );
        assert_eq!(observe_active(&event, &ctx), Observation::Ignored);
    }

    #[test]
    fn test_channel_deleted_matches_active_channel_only() {
        let fixture = Fixture::new();
        let own = ChannelEvent::ChannelDeleted {
            channel: fixture.channel.clone(),
        };
        assert_eq!(observe_active(&own, &fixture.ctx()), Observation::ChannelGone);

        let other = ChannelEvent::ChannelDeleted {
            channel: ChannelRef::from("channel/other"),
        };
        assert_eq!(observe_active(&other, &fixture.ctx()), Observation::Ignored);
    }

    #[test]
    fn test_membership_and_update_events_ignored() {
        let fixture = Fixture::new();
        let updated = ChannelEvent::ChannelUpdated {
            channel: fixture.channel.clone(),
        };
        let membership = ChannelEvent::MembershipCreated {
            channel: fixture.channel.clone(),
        };
        assert_eq!(observe_active(&updated, &fixture.ctx()), Observation::Ignored);
        assert_eq!(
            observe_active(&membership, &fixture.ctx()),
            Observation::Ignored
        );
    }

    #[test]
    fn test_idle_detects_incoming_invite() {
        let finalized = FinalizedMeetings::new();
        let event = message(
            "dr1",
            "SendingInvite",
            metadata_json("m1", InviteStatus::Unknown),
        );
        let invite = observe_idle(&event, &UserId::from("pt1"), &finalized).unwrap();
        assert_eq!(invite.meeting_id, MeetingId::from("m1"));
        assert_eq!(invite.channel, ChannelRef::from("channel/abc"));
    }

    #[test]
    fn test_idle_ignores_own_announcements() {
        let finalized = FinalizedMeetings::new();
        let event = message(
            "dr1",
            "SendingInvite",
            metadata_json("m1", InviteStatus::Unknown),
        );
        assert!(observe_idle(&event, &UserId::from("dr1"), &finalized).is_none());
    }

    #[test]
    fn test_idle_ignores_finalized_meetings() {
        let mut finalized = FinalizedMeetings::new();
        finalized.finalize(MeetingId::from("m1"));
        let event = message(
            "dr1",
            "SendingInvite",
            metadata_json("m1", InviteStatus::Unknown),
        );
        assert!(observe_idle(&event, &UserId::from("pt1"), &finalized).is_none());
    }

    #[test]
    fn test_idle_requires_invite_marker() {
        let finalized = FinalizedMeetings::new();
        let event = message(
            "dr1",
            "AcceptedInvite",
            metadata_json("m1", InviteStatus::Accepted),
        );
        assert!(observe_idle(&event, &UserId::from("pt1"), &finalized).is_none());
    }
}
