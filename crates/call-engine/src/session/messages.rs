//! Message and state types for the call session actor.
//!
//! All communication with the session task uses strongly-typed message
//! passing via `tokio::sync::mpsc`; request-reply uses `tokio::sync::oneshot`.
//! Reactive state flows out through a `tokio::sync::watch` of [`CallSnapshot`].

use chrono::{DateTime, Utc};
use common::types::{ChannelRef, MeetingId, UserId};
use tokio::sync::oneshot;

use crate::errors::CallError;
use crate::gateway::JoinInfo;
use crate::protocol::InviteStatus;

/// Messages sent to a `CallSession`.
#[derive(Debug)]
pub enum SessionMessage {
    /// Start a new outgoing call.
    CreateCall {
        caller: UserId,
        recipient: UserId,
        /// Response channel for the result.
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// Tear down the active call (user cancel / decline). Idempotent.
    DeleteCall {
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), CallError>>,
    },

    /// Accept an incoming invitation (recipient side).
    AcceptCall {
        /// Response channel for the join credentials.
        respond_to: oneshot::Sender<Result<JoinInfo, CallError>>,
    },

    /// Query the set of peers currently considered online.
    GetPresence {
        /// Response channel for the online peers.
        respond_to: oneshot::Sender<Vec<UserId>>,
    },

    /// The announcer exhausted its attempt budget without an answer.
    AnnouncerStalled { meeting_id: MeetingId },
}

/// Which side of the negotiation this session is on for the active call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    /// This session initiated the call and announces the invitation.
    Caller,
    /// This session received the invitation.
    Recipient,
}

/// The active (or pending) call attempt.
#[derive(Debug, Clone)]
pub struct ActiveCall {
    /// Channel exclusively owned by this call attempt.
    pub channel: ChannelRef,
    /// Identity of the initiating side.
    pub caller: UserId,
    /// Identity of the side being called.
    pub recipient: UserId,
    /// Which side this session is on.
    pub role: CallRole,
    /// Scheduled time of the appointment backing this call.
    pub appointment_timestamp: DateTime<Utc>,
    /// Correlation identifier; absent until the meeting is allocated
    /// (caller) or the invitation arrives (recipient).
    pub meeting_id: Option<MeetingId>,
    /// This participant's join credentials, once allocated.
    pub join: Option<JoinInfo>,
    /// Current invitation status; monotonic once it leaves `Unknown`.
    pub invite_status: InviteStatus,
}

impl ActiveCall {
    /// The identity whose responses this session acts on.
    #[must_use]
    pub fn counterpart(&self) -> &UserId {
        match self.role {
            CallRole::Caller => &self.recipient,
            CallRole::Recipient => &self.caller,
        }
    }
}

/// Reactive view of the session, published through a watch channel.
#[derive(Debug, Clone, Default)]
pub struct CallSnapshot {
    /// The active call, if any.
    pub call: Option<ActiveCall>,
    /// Invitation status; retained after teardown until the next call.
    pub invite_status: InviteStatus,
    /// Whether the announcer gave up without an answer.
    pub stalled: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn call(role: CallRole) -> ActiveCall {
        ActiveCall {
            channel: ChannelRef::from("channel/abc"),
            caller: UserId::from("dr1"),
            recipient: UserId::from("pt1"),
            role,
            appointment_timestamp: Utc::now(),
            meeting_id: None,
            join: None,
            invite_status: InviteStatus::Unknown,
        }
    }

    #[test]
    fn test_counterpart_by_role() {
        assert_eq!(call(CallRole::Caller).counterpart(), &UserId::from("pt1"));
        assert_eq!(
            call(CallRole::Recipient).counterpart(),
            &UserId::from("dr1")
        );
    }

    #[test]
    fn test_snapshot_default_is_idle() {
        let snapshot = CallSnapshot::default();
        assert!(snapshot.call.is_none());
        assert_eq!(snapshot.invite_status, InviteStatus::Unknown);
        assert!(!snapshot.stalled);
    }
}
