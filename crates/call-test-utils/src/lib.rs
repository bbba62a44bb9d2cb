//! Test utilities for the Housecall call engine.
//!
//! Provides in-memory mock gateways with recorded calls, failure injection,
//! and event-injection helpers for playing the counterpart in negotiation
//! tests, plus shared fixtures.

pub mod fixtures;
pub mod mock_channel;
pub mod mock_meeting;

pub use mock_channel::{MockChannelGateway, MockChannelGatewayBuilder, SentMessage};
pub use mock_meeting::{MockMeetingGateway, MockMeetingGatewayBuilder};
