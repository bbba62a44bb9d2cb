//! Session liveness guard and the finalized-meeting set.
//!
//! Every asynchronous continuation (timer callback, gateway response
//! handler) checks these before mutating shared state. The guard makes the
//! "is this logical session still active" signal an explicit handle object
//! instead of a captured boolean; the finalized set suppresses late
//! duplicates referencing a meeting that already reached a terminal state.

use common::types::MeetingId;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

/// Explicit liveness handle for one logical session.
///
/// Cloneable; all clones observe the same cancellation state. Helper tasks
/// run on child tokens so cancelling the session cancels everything it
/// spawned.
#[derive(Debug, Clone, Default)]
pub struct SessionGuard {
    token: CancellationToken,
}

impl SessionGuard {
    /// Create a new, uncancelled guard.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Cancel the session. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the session has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the session is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Child token for a helper task tied to this session's lifetime.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

/// Meeting IDs whose negotiation reached a terminal state locally.
///
/// Kept for the lifetime of the owning session so that a late-arriving
/// duplicate or stale message referencing a finalized meeting is ignored.
#[derive(Debug, Default)]
pub struct FinalizedMeetings {
    ids: HashSet<MeetingId>,
}

impl FinalizedMeetings {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a meeting as finalized. Returns `false` if it already was.
    pub fn finalize(&mut self, meeting_id: MeetingId) -> bool {
        self.ids.insert(meeting_id)
    }

    /// Whether a meeting has been finalized.
    #[must_use]
    pub fn contains(&self, meeting_id: &MeetingId) -> bool {
        self.ids.contains(meeting_id)
    }

    /// Number of finalized meetings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no meeting has been finalized yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_cancel_is_idempotent() {
        let guard = SessionGuard::new();
        assert!(!guard.is_cancelled());

        guard.cancel();
        assert!(guard.is_cancelled());
        guard.cancel();
        assert!(guard.is_cancelled());
    }

    #[test]
    fn test_guard_clones_share_state() {
        let guard = SessionGuard::new();
        let clone = guard.clone();

        guard.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_token_follows_guard() {
        let guard = SessionGuard::new();
        let child = guard.child_token();
        assert!(!child.is_cancelled());

        guard.cancel();
        child.cancelled().await;
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_finalized_set_membership() {
        let mut finalized = FinalizedMeetings::new();
        let meeting = MeetingId::from("m1");

        assert!(finalized.is_empty());
        assert!(!finalized.contains(&meeting));

        assert!(finalized.finalize(meeting.clone()));
        assert!(finalized.contains(&meeting));
        assert_eq!(finalized.len(), 1);

        // Re-finalizing the same meeting is a no-op.
        assert!(!finalized.finalize(meeting.clone()));
        assert_eq!(finalized.len(), 1);
    }
}
