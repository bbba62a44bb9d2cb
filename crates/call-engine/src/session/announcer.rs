//! Invitation announcer: repeats the invitation until answered.
//!
//! The loop is a self-rescheduling single-shot timer, not a fixed-rate
//! interval: each publish attempt completes before the next wait is armed,
//! so no two publishes for the same call are ever in flight and the worst
//! case rate is one per backoff interval regardless of publish latency.
//!
//! A publish failure does not stop the loop; the invitation is delivered
//! at-least-once over an unreliable channel and the counterpart
//! deduplicates by meeting ID.

use common::types::{ChannelRef, ClientId, MeetingId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::messages::{CallSnapshot, SessionMessage};
use crate::gateway::{ChannelGateway, Persistence};
use crate::protocol::{InviteStatus, MessageMetadata, ReservedContent};

/// Repeatedly publishes the invitation for one outgoing call.
pub struct InvitationAnnouncer {
    /// Channel gateway used to publish invitations.
    pub gateway: Arc<dyn ChannelGateway>,
    /// The call channel being announced into.
    pub channel: ChannelRef,
    /// Correlation ID of the pending meeting.
    pub meeting_id: MeetingId,
    /// Ephemeral identifier of this client session.
    pub client_id: ClientId,
    /// Backoff between announcements.
    pub interval: Duration,
    /// Attempts before reporting a stall; 0 retries forever.
    pub max_attempts: u32,
    /// Child token; cancelled on teardown.
    pub cancel: CancellationToken,
    /// Live view of the session state, re-checked before every repeat.
    pub snapshot_rx: watch::Receiver<CallSnapshot>,
    /// Channel for reporting a stall back to the session.
    pub session_tx: mpsc::Sender<SessionMessage>,
}

impl InvitationAnnouncer {
    /// Spawn the announce loop.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut attempts: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            // The invitation is only worth repeating while unanswered.
            if self.snapshot_rx.borrow().invite_status != InviteStatus::Unknown {
                break;
            }

            self.send_invite().await;
            attempts = attempts.saturating_add(1);

            if self.max_attempts != 0 && attempts >= self.max_attempts {
                warn!(
                    target: "housecall.announce",
                    meeting_id = %self.meeting_id,
                    attempts,
                    "invitation unanswered after max attempts"
                );
                let _ = self
                    .session_tx
                    .send(SessionMessage::AnnouncerStalled {
                        meeting_id: self.meeting_id.clone(),
                    })
                    .await;
                break;
            }

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        debug!(
            target: "housecall.announce",
            meeting_id = %self.meeting_id,
            attempts,
            "announcer stopped"
        );
    }

    async fn send_invite(&self) {
        let metadata = MessageMetadata {
            client_id: self.client_id,
            is_meeting_invitation: true,
            is_presence: true,
            meeting_id: Some(self.meeting_id.clone()),
            invite_status: Some(InviteStatus::Unknown),
        };
        let encoded = match metadata.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(target: "housecall.announce", error = %e, "invite metadata encode failed");
                return;
            }
        };

        if let Err(e) = self
            .gateway
            .send_message(
                &self.channel,
                ReservedContent::SendingInvite.as_str(),
                &encoded,
                Persistence::NonPersistent,
            )
            .await
        {
            // Retry continues on schedule; delivery is at-least-once.
            warn!(
                target: "housecall.announce",
                channel = %self.channel,
                error = %e,
                "invitation publish failed"
            );
        }
    }
}
