//! Lightweight presence: last-seen tracking and the ping publisher.
//!
//! Presence is deliberately separate from the invitation negotiation:
//! control-plane pings are filtered out before any invitation logic runs
//! and only touch the tracker here.

use common::types::{ChannelRef, ClientId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::gateway::{ChannelGateway, Persistence};
use crate::protocol::{MessageMetadata, PING_CONTENT};

/// Last-seen map with a freshness window.
#[derive(Debug)]
pub struct PresenceTracker {
    ttl: Duration,
    last_seen: HashMap<UserId, Instant>,
}

impl PresenceTracker {
    /// Create a tracker with the given freshness window.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            last_seen: HashMap::new(),
        }
    }

    /// Record a liveness signal from a peer.
    pub fn observe(&mut self, user: UserId) {
        self.last_seen.insert(user, Instant::now());
    }

    /// Whether a peer has been seen within the freshness window.
    #[must_use]
    pub fn is_online(&self, user: &UserId) -> bool {
        self.last_seen
            .get(user)
            .is_some_and(|seen| seen.elapsed() < self.ttl)
    }

    /// Peers currently within the freshness window.
    #[must_use]
    pub fn online_users(&self) -> Vec<UserId> {
        self.last_seen
            .iter()
            .filter(|(_, seen)| seen.elapsed() < self.ttl)
            .map(|(user, _)| user.clone())
            .collect()
    }

    /// Drop entries that have aged out of the freshness window.
    pub fn prune(&mut self) {
        let ttl = self.ttl;
        self.last_seen.retain(|_, seen| seen.elapsed() < ttl);
    }
}

/// Periodic liveness publisher for an active call channel.
///
/// Runs on a child cancellation token; every teardown path cancels it.
pub struct PresencePinger {
    /// Channel gateway used to publish pings.
    pub gateway: Arc<dyn ChannelGateway>,
    /// The active call channel.
    pub channel: ChannelRef,
    /// Ephemeral identifier of this client session.
    pub client_id: ClientId,
    /// Ping cadence.
    pub interval: Duration,
    /// Child token; cancelled on teardown.
    pub cancel: CancellationToken,
}

impl PresencePinger {
    /// Spawn the ping loop.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => self.send_ping().await,
            }
        }
        debug!(
            target: "housecall.presence",
            channel = %self.channel,
            "presence pinger stopped"
        );
    }

    async fn send_ping(&self) {
        let metadata = MessageMetadata {
            client_id: self.client_id,
            is_meeting_invitation: false,
            is_presence: true,
            meeting_id: None,
            invite_status: None,
        };
        let encoded = match metadata.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(target: "housecall.presence", error = %e, "ping metadata encode failed");
                return;
            }
        };
        if let Err(e) = self
            .gateway
            .send_message(&self.channel, PING_CONTENT, &encoded, Persistence::NonPersistent)
            .await
        {
            debug!(
                target: "housecall.presence",
                channel = %self.channel,
                error = %e,
                "presence ping failed"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tracker_observe_and_expire() {
        let mut tracker = PresenceTracker::new(Duration::from_secs(30));
        let user = UserId::from("pt1");

        assert!(!tracker.is_online(&user));

        tracker.observe(user.clone());
        assert!(tracker.is_online(&user));
        assert_eq!(tracker.online_users(), vec![user.clone()]);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(tracker.is_online(&user));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!tracker.is_online(&user));
        assert!(tracker.online_users().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_refresh_extends_window() {
        let mut tracker = PresenceTracker::new(Duration::from_secs(30));
        let user = UserId::from("pt1");

        tracker.observe(user.clone());
        tokio::time::advance(Duration::from_secs(20)).await;
        tracker.observe(user.clone());
        tokio::time::advance(Duration::from_secs(20)).await;

        assert!(tracker.is_online(&user));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_prune() {
        let mut tracker = PresenceTracker::new(Duration::from_secs(10));
        tracker.observe(UserId::from("pt1"));
        tokio::time::advance(Duration::from_secs(11)).await;
        tracker.observe(UserId::from("pt2"));

        tracker.prune();
        assert!(!tracker.is_online(&UserId::from("pt1")));
        assert!(tracker.is_online(&UserId::from("pt2")));
    }
}
