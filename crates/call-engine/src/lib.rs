//! Housecall Call Engine Library
//!
//! This library provides the client-side call/invitation negotiation engine
//! for the Housecall telehealth widget:
//!
//! - Call session lifecycle (provision channel, allocate meeting, teardown)
//! - Repeated invitation announcement until the counterpart responds
//! - Invitation status tracking with monotonic terminal transitions
//! - Stale/duplicate event suppression under at-least-once delivery
//! - Lightweight presence tracking from control-plane pings
//!
//! # Architecture
//!
//! The engine uses a single-writer actor per client session:
//!
//! ```text
//! CallSession (one per signed-in client)
//! ├── owns the active Call and the finalized-meeting set
//! ├── spawns InvitationAnnouncer (one per outgoing call, child token)
//! ├── spawns PresencePinger (one per active call, child token)
//! └── consumes the ChannelGateway event stream (filter chain in observer)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single-writer discipline**: only the `CallSession` task mutates call
//!   state; the announcer and the event stream propose transitions via
//!   messages and events
//! - **CancellationToken propagation**: the session owns the root token;
//!   every helper task runs on a child token so teardown is deterministic
//! - **Correlation by meeting ID**: inbound status updates must match the
//!   active meeting exactly and must not reference a finalized meeting
//!
//! # Modules
//!
//! - [`config`] - Engine configuration from environment
//! - [`errors`] - Error types for session operations
//! - [`gateway`] - Channel/meeting gateway traits (external collaborators)
//! - [`presence`] - Presence tracking and the ping publisher
//! - [`protocol`] - Wire metadata schema and reserved content markers
//! - [`session`] - The call session actor, announcer, observer, and guard

pub mod config;
pub mod errors;
pub mod gateway;
pub mod presence;
pub mod protocol;
pub mod session;
