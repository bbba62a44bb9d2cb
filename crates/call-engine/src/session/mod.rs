//! `CallSession` - per-client actor that owns the call negotiation state.
//!
//! Each `CallSession`:
//! - Owns the active [`ActiveCall`] and the finalized-meeting set
//! - Orchestrates call creation (provision channel, allocate meeting,
//!   start announcing) and teardown (advisory decline, channel delete,
//!   clear state)
//! - Consumes the gateway event stream and applies status transitions
//!   through a single mutation path (single-writer discipline)
//! - Supervises the [`InvitationAnnouncer`] and [`PresencePinger`] on
//!   child cancellation tokens
//!
//! # Teardown paths
//!
//! All four exit paths converge on the same finalizer: explicit
//! `delete_call`, remote decline, remote channel deletion, and session
//! cancellation (unmount). The channel is deleted at most once; the
//! meeting ID is remembered so late duplicates are ignored.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use common::types::{ClientId, MeetingId, UserId};

use crate::config::Config;
use crate::errors::CallError;
use crate::gateway::{ChannelEvent, ChannelGateway, JoinInfo, MeetingGateway, Persistence};
use crate::presence::{PresencePinger, PresenceTracker};
use crate::protocol::{
    ChannelMetadata, InviteStatus, MessageMetadata, ReservedContent, PING_CONTENT,
};

pub mod announcer;
pub mod guard;
pub mod messages;
pub mod observer;

pub use guard::{FinalizedMeetings, SessionGuard};
pub use messages::{ActiveCall, CallRole, CallSnapshot, SessionMessage};

use announcer::InvitationAnnouncer;
use observer::{observe_active, observe_idle, ActiveCallContext, IncomingInvite, Observation};

/// Default channel buffer size for the session mailbox.
const SESSION_CHANNEL_BUFFER: usize = 64;

/// Buffer for announcer-to-session reports.
const INTERNAL_CHANNEL_BUFFER: usize = 4;

/// Handle to a `CallSession`.
///
/// This is the public interface of the engine. All methods are async and
/// return results via oneshot channels; reactive state is exposed through
/// [`CallSessionHandle::subscribe`].
#[derive(Clone)]
pub struct CallSessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    guard: SessionGuard,
    snapshot_rx: watch::Receiver<CallSnapshot>,
}

impl CallSessionHandle {
    /// Start a new outgoing call.
    ///
    /// Fails fast with [`CallError::CallInProgress`] if a call is already
    /// active for this session.
    pub async fn create_call(&self, caller: UserId, recipient: UserId) -> Result<(), CallError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::CreateCall {
                caller,
                recipient,
                respond_to: tx,
            })
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))?
    }

    /// Tear down the active call. A no-op when no call is active.
    pub async fn delete_call(&self) -> Result<(), CallError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::DeleteCall { respond_to: tx })
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))?
    }

    /// Accept an incoming invitation and obtain join credentials.
    pub async fn accept_call(&self) -> Result<JoinInfo, CallError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::AcceptCall { respond_to: tx })
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))?
    }

    /// Peers currently considered online.
    pub async fn presence(&self) -> Result<Vec<UserId>, CallError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::GetPresence { respond_to: tx })
            .await
            .map_err(|e| CallError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CallError::Internal(format!("response receive failed: {e}")))
    }

    /// Subscribe to reactive session state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Current session state.
    #[must_use]
    pub fn snapshot(&self) -> CallSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Cancel the session (owning surface unmounted).
    ///
    /// The session tears the active call down best-effort and exits.
    pub fn cancel(&self) {
        self.guard.cancel();
    }

    /// Whether the session has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.guard.is_cancelled()
    }
}

/// A helper task owned by the session, stopped via its child token.
struct ManagedTask {
    cancel: CancellationToken,
    task_handle: JoinHandle<()>,
}

impl ManagedTask {
    fn stop(self) {
        self.cancel.cancel();
        // The task exits at its next cancellation checkpoint.
        drop(self.task_handle);
    }
}

/// The `CallSession` implementation.
pub struct CallSession {
    /// Identity of the signed-in participant.
    identity: UserId,
    /// Ephemeral identifier of this client session.
    client_id: ClientId,
    /// Engine configuration.
    config: Config,
    /// Managed messaging transport.
    channel_gateway: Arc<dyn ChannelGateway>,
    /// Meeting allocator.
    meeting_gateway: Arc<dyn MeetingGateway>,
    /// Mailbox receiver.
    receiver: mpsc::Receiver<SessionMessage>,
    /// Announcer-to-session report channel.
    internal_rx: mpsc::Receiver<SessionMessage>,
    internal_tx: mpsc::Sender<SessionMessage>,
    /// Account-wide live event stream.
    events: broadcast::Receiver<ChannelEvent>,
    /// Liveness guard (root token).
    guard: SessionGuard,
    /// Reactive state publisher.
    snapshot_tx: watch::Sender<CallSnapshot>,
    /// The active call, if any. Only this task mutates it.
    call: Option<ActiveCall>,
    /// Status retained for consumers after teardown; display only, never
    /// consulted for transition decisions.
    last_status: InviteStatus,
    /// Whether the announcer gave up without an answer.
    stalled: bool,
    /// Meetings finalized locally for the lifetime of this session.
    finalized: FinalizedMeetings,
    /// Peer liveness from control-plane pings.
    presence: PresenceTracker,
    /// Running announcer, if any.
    announcer: Option<ManagedTask>,
    /// Running presence pinger, if any.
    pinger: Option<ManagedTask>,
}

impl CallSession {
    /// Spawn a new call session actor.
    ///
    /// Returns a handle and the task join handle.
    ///
    /// # Arguments
    ///
    /// * `config` - Engine configuration
    /// * `channel_gateway` - Managed messaging transport
    /// * `meeting_gateway` - Meeting allocator
    /// * `identity` - Identity of the signed-in participant
    /// * `client_id` - Ephemeral identifier for this client session
    pub fn spawn(
        config: Config,
        channel_gateway: Arc<dyn ChannelGateway>,
        meeting_gateway: Arc<dyn MeetingGateway>,
        identity: UserId,
        client_id: ClientId,
    ) -> (CallSessionHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let (internal_tx, internal_rx) = mpsc::channel(INTERNAL_CHANNEL_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(CallSnapshot::default());
        let guard = SessionGuard::new();
        let events = channel_gateway.subscribe();
        let presence_ttl = config.presence_ttl();

        let actor = Self {
            identity,
            client_id,
            config,
            channel_gateway,
            meeting_gateway,
            receiver,
            internal_rx,
            internal_tx,
            events,
            guard: guard.clone(),
            snapshot_tx,
            call: None,
            last_status: InviteStatus::Unknown,
            stalled: false,
            finalized: FinalizedMeetings::new(),
            presence: PresenceTracker::new(presence_ttl),
            announcer: None,
            pinger: None,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = CallSessionHandle {
            sender,
            guard,
            snapshot_rx,
        };

        (handle, task_handle)
    }

    /// Run the actor loop.
    #[instrument(skip_all, name = "housecall.session", fields(identity = %self.identity))]
    async fn run(mut self) {
        info!(target: "housecall.session", "CallSession started");

        loop {
            tokio::select! {
                () = self.guard.cancelled() => {
                    info!(target: "housecall.session", "session cancelled, tearing down");
                    self.teardown_active_call().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            debug!(target: "housecall.session", "all handles dropped, exiting");
                            self.teardown_active_call().await;
                            break;
                        }
                    }
                }

                report = self.internal_rx.recv() => {
                    if let Some(message) = report {
                        self.handle_message(message).await;
                    }
                }

                event = self.events.recv() => {
                    match event {
                        Ok(event) => self.handle_event(event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(
                                target: "housecall.session",
                                skipped,
                                "event stream lagged"
                            );
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            warn!(target: "housecall.session", "event stream closed, tearing down");
                            self.teardown_active_call().await;
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "housecall.session",
            finalized = self.finalized.len(),
            "CallSession stopped"
        );
    }

    /// Handle a single mailbox message.
    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::CreateCall {
                caller,
                recipient,
                respond_to,
            } => {
                let result = self.handle_create(caller, recipient).await;
                let _ = respond_to.send(result);
            }

            SessionMessage::DeleteCall { respond_to } => {
                let result = self.handle_delete().await;
                let _ = respond_to.send(result);
            }

            SessionMessage::AcceptCall { respond_to } => {
                let result = self.handle_accept().await;
                let _ = respond_to.send(result);
            }

            SessionMessage::GetPresence { respond_to } => {
                let _ = respond_to.send(self.presence.online_users());
            }

            SessionMessage::AnnouncerStalled { meeting_id } => {
                self.handle_stalled(&meeting_id);
            }
        }
    }

    /// Start an outgoing call: provision channel, allocate meeting, announce.
    #[instrument(skip_all, fields(identity = %self.identity))]
    async fn handle_create(
        &mut self,
        caller: UserId,
        recipient: UserId,
    ) -> Result<(), CallError> {
        if self.call.is_some() {
            return Err(CallError::CallInProgress);
        }

        let name = format!("call-{}-{}", caller, Uuid::new_v4());
        let metadata = ChannelMetadata::for_call(
            caller.clone(),
            recipient.clone(),
            chrono::Utc::now(),
        );
        let encoded = metadata.encode()?;

        let channel = self
            .channel_gateway
            .create_channel(&name, &encoded)
            .await
            .map_err(|e| {
                error!(target: "housecall.session", error = %e, "channel provision failed");
                e
            })?;

        let described = match self.channel_gateway.describe_channel(&channel).await {
            Ok(described) => described,
            Err(e) => {
                error!(target: "housecall.session", error = %e, "channel describe failed");
                // Provision did not complete; release the channel rather
                // than track a call we cannot describe.
                if let Err(delete_err) = self.channel_gateway.delete_channel(&channel).await {
                    warn!(
                        target: "housecall.session",
                        error = %delete_err,
                        "orphaned channel cleanup failed"
                    );
                }
                return Err(e.into());
            }
        };
        let channel_metadata =
            ChannelMetadata::decode(&described.metadata).unwrap_or(metadata);

        let mut call = ActiveCall {
            channel,
            caller,
            recipient,
            role: CallRole::Caller,
            appointment_timestamp: channel_metadata.appointment_timestamp,
            meeting_id: None,
            join: None,
            invite_status: InviteStatus::Unknown,
        };

        // A failed allocation leaves the call present but quiet: the
        // announcer never starts without meeting credentials.
        match self
            .meeting_gateway
            .allocate_meeting(&call.channel, &call.caller, &self.config.media_region)
            .await
        {
            Ok(join) => {
                call.meeting_id = Some(join.meeting.meeting_id.clone());
                call.join = Some(join);
            }
            Err(e) => {
                error!(target: "housecall.session", error = %e, "meeting allocation failed");
            }
        }

        info!(
            target: "housecall.session",
            channel = %call.channel,
            meeting_id = call.meeting_id.as_ref().map(MeetingId::as_str).unwrap_or("-"),
            "call created"
        );

        self.stalled = false;
        self.call = Some(call);
        self.publish_snapshot();
        self.start_announcer();
        self.start_pinger();
        Ok(())
    }

    /// Tear down the active call. Idempotent.
    async fn handle_delete(&mut self) -> Result<(), CallError> {
        let Some(call) = self.call.clone() else {
            debug!(target: "housecall.session", "delete_call with no active call");
            return Ok(());
        };

        // Advisory only; the channel is deleted regardless of whether the
        // counterpart ever sees this.
        self.send_decline_notice(&call);
        self.finalize_call(InviteStatus::Cancelled, true).await;
        Ok(())
    }

    /// Accept an incoming invitation (recipient side).
    async fn handle_accept(&mut self) -> Result<JoinInfo, CallError> {
        let Some(call) = self.call.as_ref() else {
            return Err(CallError::NoActiveCall);
        };
        if call.role != CallRole::Recipient {
            return Err(CallError::WrongRole);
        }
        let Some(meeting_id) = call.meeting_id.clone() else {
            return Err(CallError::MeetingNotAllocated);
        };
        if let (InviteStatus::Accepted, Some(join)) = (call.invite_status, call.join.as_ref()) {
            // Duplicate accept; reuse the credentials already allocated.
            return Ok(join.clone());
        }
        let channel = call.channel.clone();

        let metadata = MessageMetadata {
            client_id: self.client_id,
            is_meeting_invitation: true,
            is_presence: true,
            meeting_id: Some(meeting_id.clone()),
            invite_status: Some(InviteStatus::Accepted),
        };
        self.channel_gateway
            .send_message(
                &channel,
                ReservedContent::AcceptedInvite.as_str(),
                &metadata.encode()?,
                Persistence::NonPersistent,
            )
            .await?;

        let join = self
            .meeting_gateway
            .allocate_attendee(&channel, &meeting_id, &self.identity)
            .await?;

        if let Some(call) = self.call.as_mut() {
            call.join = Some(join.clone());
            call.invite_status = InviteStatus::Accepted;
        }
        info!(
            target: "housecall.session",
            meeting_id = %meeting_id,
            "invitation accepted"
        );
        self.publish_snapshot();
        Ok(join)
    }

    /// Mark the session stalled if the report matches the live call.
    fn handle_stalled(&mut self, meeting_id: &MeetingId) {
        let matches_active = self
            .call
            .as_ref()
            .is_some_and(|call| {
                call.meeting_id.as_ref() == Some(meeting_id)
                    && call.invite_status == InviteStatus::Unknown
            });
        if !matches_active || self.finalized.contains(meeting_id) {
            // Stale report from a call that already resolved.
            return;
        }

        warn!(
            target: "housecall.session",
            meeting_id = %meeting_id,
            "call stalled: no answer within the attempt budget"
        );
        self.stalled = true;
        self.publish_snapshot();
    }

    /// Handle one inbound gateway event.
    async fn handle_event(&mut self, event: ChannelEvent) {
        // Control-plane traffic feeds presence and never reaches the
        // invitation filter chain.
        if let ChannelEvent::MessageCreated {
            sender,
            content,
            is_control,
            ..
        } = &event
        {
            if *is_control || content == PING_CONTENT {
                if content == PING_CONTENT && sender != &self.identity {
                    self.presence.observe(sender.clone());
                }
                return;
            }
        }

        if self.call.is_some() {
            let observation = {
                let Some(call) = self.call.as_ref() else {
                    return;
                };
                let ctx = ActiveCallContext {
                    channel: &call.channel,
                    meeting_id: call.meeting_id.as_ref(),
                    counterpart: call.counterpart(),
                    finalized: &self.finalized,
                };
                observe_active(&event, &ctx)
            };

            match observation {
                Observation::StatusUpdate(status) => self.apply_remote_status(status).await,
                Observation::ChannelGone => {
                    info!(target: "housecall.session", "call channel deleted remotely");
                    self.finalize_call(InviteStatus::Cancelled, false).await;
                }
                Observation::Ignored => {}
            }
        } else if let Some(invite) = observe_idle(&event, &self.identity, &self.finalized) {
            self.handle_incoming_invite(invite).await;
        }
    }

    /// Apply a counterpart status announcement.
    ///
    /// This is the single mutation path for remote transitions; only
    /// forward transitions out of `Unknown` are applied.
    async fn apply_remote_status(&mut self, status: InviteStatus) {
        let Some(call) = self.call.as_ref() else {
            return;
        };
        if call.invite_status.is_terminal() || !status.is_terminal() {
            // Duplicate terminal update or an `Unknown` echo; idempotent drop.
            return;
        }

        info!(
            target: "housecall.session",
            status = ?status,
            "invitation status update"
        );

        match status {
            InviteStatus::Accepted => {
                if let Some(call) = self.call.as_mut() {
                    call.invite_status = InviteStatus::Accepted;
                }
                self.stop_announcer();
                self.publish_snapshot();
            }
            InviteStatus::Declined => {
                self.finalize_call(InviteStatus::Declined, true).await;
            }
            InviteStatus::Cancelled => {
                self.finalize_call(InviteStatus::Cancelled, true).await;
            }
            InviteStatus::Unknown => {}
        }
    }

    /// Track an invitation arriving on an untracked channel.
    async fn handle_incoming_invite(&mut self, invite: IncomingInvite) {
        info!(
            target: "housecall.session",
            meeting_id = %invite.meeting_id,
            "incoming call invitation"
        );

        let described = match self.channel_gateway.describe_channel(&invite.channel).await {
            Ok(described) => described,
            Err(e) => {
                error!(
                    target: "housecall.session",
                    error = %e,
                    "failed to describe inviting channel"
                );
                return;
            }
        };
        let metadata = match ChannelMetadata::decode(&described.metadata) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(
                    target: "housecall.session",
                    error = %e,
                    "inviting channel carries malformed metadata"
                );
                return;
            }
        };

        self.stalled = false;
        self.call = Some(ActiveCall {
            channel: invite.channel,
            caller: metadata.caller,
            recipient: metadata.recipient,
            role: CallRole::Recipient,
            appointment_timestamp: metadata.appointment_timestamp,
            meeting_id: Some(invite.meeting_id),
            join: None,
            invite_status: InviteStatus::Unknown,
        });
        self.start_pinger();
        self.publish_snapshot();
    }

    /// Converge every exit path: stop helpers, remember the meeting,
    /// release the channel (at most once), clear the call.
    async fn finalize_call(&mut self, status: InviteStatus, delete_remote: bool) {
        let Some(call) = self.call.take() else {
            return;
        };

        self.stop_announcer();
        self.stop_pinger();

        if let Some(meeting_id) = &call.meeting_id {
            self.finalized.finalize(meeting_id.clone());
        }

        if delete_remote {
            if let Err(e) = self.channel_gateway.delete_channel(&call.channel).await {
                // Local state stays authoritative; the remote channel is
                // left for server-side reaping.
                warn!(
                    target: "housecall.session",
                    channel = %call.channel,
                    error = %e,
                    "channel delete failed"
                );
            }
        }

        info!(
            target: "housecall.session",
            channel = %call.channel,
            status = ?status,
            "call finalized"
        );

        self.last_status = status;
        self.stalled = false;
        self.publish_snapshot();
    }

    /// Best-effort teardown when the session itself is going away.
    async fn teardown_active_call(&mut self) {
        let Some(call) = self.call.clone() else {
            return;
        };
        self.send_decline_notice(&call);
        self.finalize_call(InviteStatus::Cancelled, true).await;
    }

    /// Fire-and-forget advisory decline; never awaited.
    fn send_decline_notice(&self, call: &ActiveCall) {
        let marker = match call.role {
            CallRole::Caller => ReservedContent::CanceledInvite,
            CallRole::Recipient => ReservedContent::DeclinedInvite,
        };
        let metadata = MessageMetadata {
            client_id: self.client_id,
            is_meeting_invitation: true,
            is_presence: true,
            meeting_id: call.meeting_id.clone(),
            invite_status: Some(InviteStatus::Declined),
        };
        let encoded = match metadata.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(target: "housecall.session", error = %e, "decline metadata encode failed");
                return;
            }
        };

        let gateway = Arc::clone(&self.channel_gateway);
        let channel = call.channel.clone();
        tokio::spawn(async move {
            if let Err(e) = gateway
                .send_message(&channel, marker.as_str(), &encoded, Persistence::NonPersistent)
                .await
            {
                debug!(
                    target: "housecall.session",
                    channel = %channel,
                    error = %e,
                    "advisory decline publish failed"
                );
            }
        });
    }

    /// Start the announcer for the active call, if it has credentials.
    fn start_announcer(&mut self) {
        if self.announcer.is_some() {
            return;
        }
        let Some(call) = self.call.as_ref() else {
            return;
        };
        if call.role != CallRole::Caller {
            return;
        }
        let Some(meeting_id) = call.meeting_id.clone() else {
            // No meeting credentials; nothing to announce yet.
            return;
        };

        let cancel = self.guard.child_token();
        let announcer = InvitationAnnouncer {
            gateway: Arc::clone(&self.channel_gateway),
            channel: call.channel.clone(),
            meeting_id,
            client_id: self.client_id,
            interval: self.config.announce_interval(),
            max_attempts: self.config.announce_max_attempts,
            cancel: cancel.clone(),
            snapshot_rx: self.snapshot_tx.subscribe(),
            session_tx: self.internal_tx.clone(),
        };
        let task_handle = announcer.spawn();
        self.announcer = Some(ManagedTask {
            cancel,
            task_handle,
        });
    }

    /// Stop the announcer and cancel its pending timer.
    fn stop_announcer(&mut self) {
        if let Some(task) = self.announcer.take() {
            task.stop();
        }
    }

    /// Start the presence pinger for the active call, if enabled.
    fn start_pinger(&mut self) {
        if self.pinger.is_some() {
            return;
        }
        let Some(interval) = self.config.presence_ping_interval() else {
            return;
        };
        let Some(call) = self.call.as_ref() else {
            return;
        };

        let cancel = self.guard.child_token();
        let pinger = PresencePinger {
            gateway: Arc::clone(&self.channel_gateway),
            channel: call.channel.clone(),
            client_id: self.client_id,
            interval,
            cancel: cancel.clone(),
        };
        let task_handle = pinger.spawn();
        self.pinger = Some(ManagedTask {
            cancel,
            task_handle,
        });
    }

    /// Stop the presence pinger.
    fn stop_pinger(&mut self) {
        if let Some(task) = self.pinger.take() {
            task.stop();
        }
    }

    /// Publish the current state to watchers.
    fn publish_snapshot(&mut self) {
        if let Some(call) = self.call.as_ref() {
            self.last_status = call.invite_status;
        }
        let _ = self.snapshot_tx.send(CallSnapshot {
            call: self.call.clone(),
            invite_status: self.last_status,
            stalled: self.stalled,
        });
    }
}
