//! Gateway traits for the external collaborators.
//!
//! The engine treats the managed messaging transport and the meeting
//! allocator as abstract services specified only at this boundary. The
//! transport delivers at-least-once and may reorder or duplicate events;
//! everything above this seam is structured to stay correct under both.

use async_trait::async_trait;
use common::error::GatewayError;
use common::types::{ChannelRef, MeetingId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Message persistence class.
///
/// Ephemeral invitation and control traffic is sent non-persistent; chat
/// history is persistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Retained in channel history.
    Persistent,
    /// Delivered to live subscribers only.
    NonPersistent,
}

/// An event observed on the account-wide live event stream.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A message was published into a channel.
    MessageCreated {
        /// Channel the message was published into.
        channel: ChannelRef,
        /// Identity of the publisher.
        sender: UserId,
        /// Plaintext content marker.
        content: String,
        /// Raw metadata JSON blob (decoded fallibly by the engine).
        metadata: String,
        /// Whether the transport classified this as control-plane traffic.
        is_control: bool,
    },
    /// A channel was deleted.
    ChannelDeleted {
        /// The deleted channel.
        channel: ChannelRef,
    },
    /// A channel's attributes changed.
    ChannelUpdated {
        /// The updated channel.
        channel: ChannelRef,
    },
    /// A membership was added to a channel.
    MembershipCreated {
        /// The channel gaining a member.
        channel: ChannelRef,
    },
}

impl ChannelEvent {
    /// The channel this event concerns.
    #[must_use]
    pub fn channel(&self) -> &ChannelRef {
        match self {
            ChannelEvent::MessageCreated { channel, .. }
            | ChannelEvent::ChannelDeleted { channel }
            | ChannelEvent::ChannelUpdated { channel }
            | ChannelEvent::MembershipCreated { channel } => channel,
        }
    }
}

/// Description of an existing channel.
#[derive(Debug, Clone)]
pub struct ChannelDescription {
    /// Opaque channel handle.
    pub channel: ChannelRef,
    /// Channel name.
    pub name: String,
    /// Raw channel metadata JSON blob.
    pub metadata: String,
}

/// Abstract managed pub/sub channel service.
#[async_trait]
pub trait ChannelGateway: Send + Sync {
    /// Create a uniquely named logical channel carrying a metadata blob.
    async fn create_channel(&self, name: &str, metadata: &str)
        -> Result<ChannelRef, GatewayError>;

    /// Describe an existing channel.
    async fn describe_channel(
        &self,
        channel: &ChannelRef,
    ) -> Result<ChannelDescription, GatewayError>;

    /// Delete a channel.
    async fn delete_channel(&self, channel: &ChannelRef) -> Result<(), GatewayError>;

    /// Publish a message into a channel.
    async fn send_message(
        &self,
        channel: &ChannelRef,
        content: &str,
        metadata: &str,
        persistence: Persistence,
    ) -> Result<(), GatewayError>;

    /// Subscribe to the account-wide live event stream.
    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent>;
}

/// Meeting descriptor returned by the meeting allocator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingInfo {
    /// Provider-issued meeting identifier.
    pub meeting_id: MeetingId,
    /// Media region the meeting was placed in.
    pub media_region: String,
}

/// Attendee credential returned by the meeting allocator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeInfo {
    /// Provider-issued attendee identifier.
    pub attendee_id: String,
    /// Opaque token authorizing the attendee to join.
    pub join_token: String,
}

/// Opaque meeting + attendee credential pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinInfo {
    /// The allocated meeting.
    pub meeting: MeetingInfo,
    /// This participant's join credential.
    pub attendee: AttendeeInfo,
}

/// Abstract meeting/media session allocator.
#[async_trait]
pub trait MeetingGateway: Send + Sync {
    /// Allocate a meeting and the host's attendee credential for a channel.
    async fn allocate_meeting(
        &self,
        channel: &ChannelRef,
        host: &UserId,
        region: &str,
    ) -> Result<JoinInfo, GatewayError>;

    /// Allocate a guest attendee credential for an existing meeting.
    async fn allocate_attendee(
        &self,
        channel: &ChannelRef,
        meeting_id: &MeetingId,
        guest: &UserId,
    ) -> Result<JoinInfo, GatewayError>;
}
