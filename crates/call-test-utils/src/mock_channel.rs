//! Mock channel gateway for call engine testing.
//!
//! Keeps channels in memory, records every send and delete, echoes
//! delivered messages back onto the event stream the way the managed
//! transport does, and lets tests inject arbitrary events to play the
//! counterpart.
//!
//! # Example
//!
//! ```rust,ignore
//! use call_test_utils::MockChannelGateway;
//!
//! let gateway = MockChannelGateway::builder()
//!     .identity("dr1")
//!     .fail_sends(1)
//!     .build();
//!
//! // Use gateway in your tests, then inspect gateway.sent_messages()...
//! ```

use async_trait::async_trait;
use call_engine::gateway::{ChannelDescription, ChannelEvent, ChannelGateway, Persistence};
use call_engine::protocol::{InviteStatus, MessageMetadata, ReservedContent, PING_CONTENT};
use common::error::GatewayError;
use common::types::{ChannelRef, ClientId, MeetingId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Event stream capacity; large enough that tests never observe lag.
const EVENT_CAPACITY: usize = 256;

/// One recorded `send_message` call.
#[derive(Debug, Clone)]
pub struct SentMessage {
    /// Target channel.
    pub channel: ChannelRef,
    /// Plaintext content marker.
    pub content: String,
    /// Raw metadata JSON.
    pub metadata: String,
    /// Requested persistence class.
    pub persistence: Persistence,
    /// Whether the mock accepted the send (false = injected failure).
    pub delivered: bool,
}

impl SentMessage {
    /// Decode the metadata blob, panicking on malformed JSON.
    #[must_use]
    pub fn decoded(&self) -> MessageMetadata {
        MessageMetadata::decode(&self.metadata).expect("recorded metadata should decode")
    }

    /// Whether this is an invitation announcement.
    #[must_use]
    pub fn is_invite(&self) -> bool {
        self.content == ReservedContent::SendingInvite.as_str()
    }
}

#[derive(Debug, Default)]
struct Inner {
    channels: HashMap<ChannelRef, StoredChannel>,
    sends: Vec<SentMessage>,
    deletes: Vec<ChannelRef>,
    fail_sends: u32,
    fail_creates: u32,
    fail_deletes: u32,
    fail_describes: u32,
}

#[derive(Debug, Clone)]
struct StoredChannel {
    name: String,
    metadata: String,
}

/// Mock implementation of [`ChannelGateway`].
pub struct MockChannelGateway {
    identity: UserId,
    inner: Mutex<Inner>,
    events_tx: broadcast::Sender<ChannelEvent>,
}

impl MockChannelGateway {
    /// Create a builder.
    #[must_use]
    pub fn builder() -> MockChannelGatewayBuilder {
        MockChannelGatewayBuilder::default()
    }

    /// Create a gateway with the given local identity and no failures.
    #[must_use]
    pub fn new(identity: impl Into<String>) -> Arc<Self> {
        Self::builder().identity(identity).build()
    }

    // ---- failure injection -------------------------------------------------

    /// Fail the next `n` sends with a transport error.
    pub fn fail_sends(&self, n: u32) {
        self.inner.lock().expect("lock").fail_sends = n;
    }

    /// Fail the next `n` channel creations.
    pub fn fail_creates(&self, n: u32) {
        self.inner.lock().expect("lock").fail_creates = n;
    }

    /// Fail the next `n` channel deletions.
    pub fn fail_deletes(&self, n: u32) {
        self.inner.lock().expect("lock").fail_deletes = n;
    }

    /// Fail the next `n` channel describes.
    pub fn fail_describes(&self, n: u32) {
        self.inner.lock().expect("lock").fail_describes = n;
    }

    // ---- inspection --------------------------------------------------------

    /// Every recorded send attempt, including injected failures.
    #[must_use]
    pub fn send_attempts(&self) -> Vec<SentMessage> {
        self.inner.lock().expect("lock").sends.clone()
    }

    /// Delivered messages only.
    #[must_use]
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.inner
            .lock()
            .expect("lock")
            .sends
            .iter()
            .filter(|m| m.delivered)
            .cloned()
            .collect()
    }

    /// Delivered invitation announcements only.
    #[must_use]
    pub fn sent_invites(&self) -> Vec<SentMessage> {
        self.sent_messages()
            .into_iter()
            .filter(SentMessage::is_invite)
            .collect()
    }

    /// Number of `delete_channel` calls for the given channel.
    #[must_use]
    pub fn delete_count(&self, channel: &ChannelRef) -> usize {
        self.inner
            .lock()
            .expect("lock")
            .deletes
            .iter()
            .filter(|c| *c == channel)
            .count()
    }

    /// Whether the channel currently exists in the store.
    #[must_use]
    pub fn channel_exists(&self, channel: &ChannelRef) -> bool {
        self.inner
            .lock()
            .expect("lock")
            .channels
            .contains_key(channel)
    }

    /// Number of live channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.inner.lock().expect("lock").channels.len()
    }

    // ---- event injection ---------------------------------------------------

    /// Inject a raw event into every subscriber.
    pub fn emit(&self, event: ChannelEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Inject a standard message from a remote sender.
    pub fn emit_message(
        &self,
        channel: &ChannelRef,
        sender: &UserId,
        content: &str,
        metadata: &str,
    ) {
        self.emit(ChannelEvent::MessageCreated {
            channel: channel.clone(),
            sender: sender.clone(),
            content: content.to_string(),
            metadata: metadata.to_string(),
            is_control: false,
        });
    }

    /// Inject a control-plane message (presence ping).
    pub fn emit_control(&self, channel: &ChannelRef, sender: &UserId, content: &str) {
        self.emit(ChannelEvent::MessageCreated {
            channel: channel.clone(),
            sender: sender.clone(),
            content: content.to_string(),
            metadata: String::new(),
            is_control: true,
        });
    }

    /// Inject a channel-deleted event (remote teardown).
    pub fn emit_channel_deleted(&self, channel: &ChannelRef) {
        self.emit(ChannelEvent::ChannelDeleted {
            channel: channel.clone(),
        });
    }

    /// Inject an invitation status response from the counterpart.
    pub fn emit_invite_response(
        &self,
        channel: &ChannelRef,
        sender: &UserId,
        client_id: ClientId,
        meeting_id: &MeetingId,
        status: InviteStatus,
    ) {
        let content = match status {
            InviteStatus::Accepted => ReservedContent::AcceptedInvite,
            InviteStatus::Declined => ReservedContent::DeclinedInvite,
            InviteStatus::Cancelled => ReservedContent::CanceledInvite,
            InviteStatus::Unknown => ReservedContent::SendingInvite,
        };
        let metadata = MessageMetadata {
            client_id,
            is_meeting_invitation: true,
            is_presence: true,
            meeting_id: Some(meeting_id.clone()),
            invite_status: Some(status),
        }
        .encode()
        .expect("metadata should encode");
        self.emit_message(channel, sender, content.as_str(), &metadata);
    }
}

#[async_trait]
impl ChannelGateway for MockChannelGateway {
    async fn create_channel(
        &self,
        name: &str,
        metadata: &str,
    ) -> Result<ChannelRef, GatewayError> {
        let channel = {
            let mut inner = self.inner.lock().expect("lock");
            if inner.fail_creates > 0 {
                inner.fail_creates -= 1;
                return Err(GatewayError::Transport("injected create failure".to_string()));
            }
            let channel = ChannelRef(format!("channel/{}", Uuid::new_v4()));
            inner.channels.insert(
                channel.clone(),
                StoredChannel {
                    name: name.to_string(),
                    metadata: metadata.to_string(),
                },
            );
            channel
        };
        let _ = self.events_tx.send(ChannelEvent::MembershipCreated {
            channel: channel.clone(),
        });
        Ok(channel)
    }

    async fn describe_channel(
        &self,
        channel: &ChannelRef,
    ) -> Result<ChannelDescription, GatewayError> {
        let mut inner = self.inner.lock().expect("lock");
        if inner.fail_describes > 0 {
            inner.fail_describes -= 1;
            return Err(GatewayError::Transport(
                "injected describe failure".to_string(),
            ));
        }
        inner
            .channels
            .get(channel)
            .map(|stored| ChannelDescription {
                channel: channel.clone(),
                name: stored.name.clone(),
                metadata: stored.metadata.clone(),
            })
            .ok_or_else(|| GatewayError::NotFound(channel.to_string()))
    }

    async fn delete_channel(&self, channel: &ChannelRef) -> Result<(), GatewayError> {
        let removed = {
            let mut inner = self.inner.lock().expect("lock");
            inner.deletes.push(channel.clone());
            if inner.fail_deletes > 0 {
                inner.fail_deletes -= 1;
                return Err(GatewayError::Transport("injected delete failure".to_string()));
            }
            inner.channels.remove(channel).is_some()
        };
        if removed {
            let _ = self.events_tx.send(ChannelEvent::ChannelDeleted {
                channel: channel.clone(),
            });
            Ok(())
        } else {
            Err(GatewayError::NotFound(channel.to_string()))
        }
    }

    async fn send_message(
        &self,
        channel: &ChannelRef,
        content: &str,
        metadata: &str,
        persistence: Persistence,
    ) -> Result<(), GatewayError> {
        let delivered = {
            let mut inner = self.inner.lock().expect("lock");
            let delivered = if inner.fail_sends > 0 {
                inner.fail_sends -= 1;
                false
            } else {
                true
            };
            inner.sends.push(SentMessage {
                channel: channel.clone(),
                content: content.to_string(),
                metadata: metadata.to_string(),
                persistence,
                delivered,
            });
            delivered
        };

        if !delivered {
            return Err(GatewayError::Transport("injected send failure".to_string()));
        }

        // Delivered messages echo back to all subscribers, the sender
        // included, the way the managed transport behaves. Pings are
        // classified as control-plane traffic.
        let _ = self.events_tx.send(ChannelEvent::MessageCreated {
            channel: channel.clone(),
            sender: self.identity.clone(),
            content: content.to_string(),
            metadata: metadata.to_string(),
            is_control: content == PING_CONTENT,
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events_tx.subscribe()
    }
}

/// Builder for [`MockChannelGateway`] configuration.
#[derive(Debug, Default)]
pub struct MockChannelGatewayBuilder {
    identity: Option<String>,
    fail_sends: u32,
    fail_creates: u32,
    fail_deletes: u32,
}

impl MockChannelGatewayBuilder {
    /// Local account identity used for send echoes.
    #[must_use]
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Fail the first `n` sends.
    #[must_use]
    pub fn fail_sends(mut self, n: u32) -> Self {
        self.fail_sends = n;
        self
    }

    /// Fail the first `n` channel creations.
    #[must_use]
    pub fn fail_creates(mut self, n: u32) -> Self {
        self.fail_creates = n;
        self
    }

    /// Fail the first `n` channel deletions.
    #[must_use]
    pub fn fail_deletes(mut self, n: u32) -> Self {
        self.fail_deletes = n;
        self
    }

    /// Build the gateway.
    #[must_use]
    pub fn build(self) -> Arc<MockChannelGateway> {
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(MockChannelGateway {
            identity: UserId(self.identity.unwrap_or_else(|| "local".to_string())),
            inner: Mutex::new(Inner {
                fail_sends: self.fail_sends,
                fail_creates: self.fail_creates,
                fail_deletes: self.fail_deletes,
                ..Inner::default()
            }),
            events_tx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_describe_delete_round_trip() {
        let gateway = MockChannelGateway::new("dr1");
        let channel = gateway
            .create_channel("call-1", "{\"k\":1}")
            .await
            .unwrap();
        assert!(gateway.channel_exists(&channel));

        let described = gateway.describe_channel(&channel).await.unwrap();
        assert_eq!(described.name, "call-1");
        assert_eq!(described.metadata, "{\"k\":1}");

        gateway.delete_channel(&channel).await.unwrap();
        assert!(!gateway.channel_exists(&channel));
        assert_eq!(gateway.delete_count(&channel), 1);
    }

    #[tokio::test]
    async fn test_send_failure_injection() {
        let gateway = MockChannelGateway::builder()
            .identity("dr1")
            .fail_sends(1)
            .build();
        let channel = gateway.create_channel("call-1", "{}").await.unwrap();

        assert!(gateway
            .send_message(&channel, "SendingInvite", "{}", Persistence::NonPersistent)
            .await
            .is_err());
        assert!(gateway
            .send_message(&channel, "SendingInvite", "{}", Persistence::NonPersistent)
            .await
            .is_ok());

        assert_eq!(gateway.send_attempts().len(), 2);
        assert_eq!(gateway.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_delivered_sends_echo_to_subscribers() {
        let gateway = MockChannelGateway::new("dr1");
        let mut events = gateway.subscribe();
        let channel = gateway.create_channel("call-1", "{}").await.unwrap();

        // Drain the membership event from creation.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, ChannelEvent::MembershipCreated { .. }));

        gateway
            .send_message(&channel, "hello", "{}", Persistence::NonPersistent)
            .await
            .unwrap();
        let event = events.recv().await.unwrap();
        match event {
            ChannelEvent::MessageCreated {
                sender, content, ..
            } => {
                assert_eq!(sender, UserId::from("dr1"));
                assert_eq!(content, "hello");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pings_echo_as_control() {
        let gateway = MockChannelGateway::new("dr1");
        let mut events = gateway.subscribe();
        let channel = gateway.create_channel("call-1", "{}").await.unwrap();
        let _ = events.recv().await.unwrap();

        gateway
            .send_message(&channel, PING_CONTENT, "{}", Persistence::NonPersistent)
            .await
            .unwrap();
        match events.recv().await.unwrap() {
            ChannelEvent::MessageCreated { is_control, .. } => assert!(is_control),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
