//! Mock meeting gateway for call engine testing.
//!
//! Returns canned join credentials with a configurable meeting ID and
//! records every allocation, with per-call failure injection.

use async_trait::async_trait;
use call_engine::gateway::{AttendeeInfo, JoinInfo, MeetingGateway, MeetingInfo};
use common::error::GatewayError;
use common::types::{ChannelRef, MeetingId, UserId};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Inner {
    meeting_id: Option<String>,
    fail_meetings: u32,
    fail_attendees: u32,
    meeting_calls: Vec<(ChannelRef, UserId, String)>,
    attendee_calls: Vec<(ChannelRef, MeetingId, UserId)>,
}

/// Mock implementation of [`MeetingGateway`].
pub struct MockMeetingGateway {
    inner: Mutex<Inner>,
}

impl MockMeetingGateway {
    /// Create a builder.
    #[must_use]
    pub fn builder() -> MockMeetingGatewayBuilder {
        MockMeetingGatewayBuilder::default()
    }

    /// Create a gateway that allocates under the given meeting ID.
    #[must_use]
    pub fn with_meeting_id(meeting_id: impl Into<String>) -> Arc<Self> {
        Self::builder().meeting_id(meeting_id).build()
    }

    /// Fail the next `n` meeting allocations.
    pub fn fail_meetings(&self, n: u32) {
        self.inner.lock().expect("lock").fail_meetings = n;
    }

    /// Fail the next `n` attendee allocations.
    pub fn fail_attendees(&self, n: u32) {
        self.inner.lock().expect("lock").fail_attendees = n;
    }

    /// Number of `allocate_meeting` calls.
    #[must_use]
    pub fn meeting_call_count(&self) -> usize {
        self.inner.lock().expect("lock").meeting_calls.len()
    }

    /// Number of `allocate_attendee` calls.
    #[must_use]
    pub fn attendee_call_count(&self) -> usize {
        self.inner.lock().expect("lock").attendee_calls.len()
    }
}

fn join_info(meeting_id: MeetingId, region: &str) -> JoinInfo {
    JoinInfo {
        meeting: MeetingInfo {
            meeting_id,
            media_region: region.to_string(),
        },
        attendee: AttendeeInfo {
            attendee_id: format!("att-{}", Uuid::new_v4()),
            join_token: format!("jt-{}", Uuid::new_v4()),
        },
    }
}

#[async_trait]
impl MeetingGateway for MockMeetingGateway {
    async fn allocate_meeting(
        &self,
        channel: &ChannelRef,
        host: &UserId,
        region: &str,
    ) -> Result<JoinInfo, GatewayError> {
        let meeting_id = {
            let mut inner = self.inner.lock().expect("lock");
            if inner.fail_meetings > 0 {
                inner.fail_meetings -= 1;
                return Err(GatewayError::Transport(
                    "injected meeting allocation failure".to_string(),
                ));
            }
            inner
                .meeting_calls
                .push((channel.clone(), host.clone(), region.to_string()));
            inner
                .meeting_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string())
        };
        Ok(join_info(MeetingId(meeting_id), region))
    }

    async fn allocate_attendee(
        &self,
        channel: &ChannelRef,
        meeting_id: &MeetingId,
        guest: &UserId,
    ) -> Result<JoinInfo, GatewayError> {
        {
            let mut inner = self.inner.lock().expect("lock");
            if inner.fail_attendees > 0 {
                inner.fail_attendees -= 1;
                return Err(GatewayError::Transport(
                    "injected attendee allocation failure".to_string(),
                ));
            }
            inner
                .attendee_calls
                .push((channel.clone(), meeting_id.clone(), guest.clone()));
        }
        Ok(join_info(meeting_id.clone(), "us-east-1"))
    }
}

/// Builder for [`MockMeetingGateway`] configuration.
#[derive(Debug, Default)]
pub struct MockMeetingGatewayBuilder {
    meeting_id: Option<String>,
    fail_meetings: u32,
    fail_attendees: u32,
}

impl MockMeetingGatewayBuilder {
    /// Allocate meetings under a fixed meeting ID.
    #[must_use]
    pub fn meeting_id(mut self, meeting_id: impl Into<String>) -> Self {
        self.meeting_id = Some(meeting_id.into());
        self
    }

    /// Fail the first `n` meeting allocations.
    #[must_use]
    pub fn fail_meetings(mut self, n: u32) -> Self {
        self.fail_meetings = n;
        self
    }

    /// Fail the first `n` attendee allocations.
    #[must_use]
    pub fn fail_attendees(mut self, n: u32) -> Self {
        self.fail_attendees = n;
        self
    }

    /// Build the gateway.
    #[must_use]
    pub fn build(self) -> Arc<MockMeetingGateway> {
        Arc::new(MockMeetingGateway {
            inner: Mutex::new(Inner {
                meeting_id: self.meeting_id,
                fail_meetings: self.fail_meetings,
                fail_attendees: self.fail_attendees,
                ..Inner::default()
            }),
        })
    }
}
