//! `gridcore`: the real-time interaction core.
//!
//! A session endpoint owns one client connection and runs four cooperating
//! loops (read, write, subscribe, owner). Rooms are tick-scheduled actors that
//! own their membership set and drain an inbox between ticks. The two are
//! coupled only through the in-memory pub/sub fabric: endpoints publish
//! inbound frames to `room:<rid>` and subscribe to `session:<sid>` for their
//! own outbound traffic.
//!
//! Two hosting shapes exist behind the same contracts: `ParallelHost` spawns
//! one tick task per room, `SingleLoopScheduler` drives every room from a
//! single loop.

pub mod connection;
pub mod endpoint;
pub mod host;
pub mod pubsub;
pub mod room;
pub mod room_manager;
pub mod session;
pub mod transport;

pub use connection::{Connection, ConnectionId};
pub use endpoint::{EndpointEvent, SessionEndpoint};
pub use host::{ParallelHost, SingleLoopScheduler};
pub use pubsub::{Message, PubSub, Subscription, Topic};
pub use room::{Application, Room, RoomHandle};
pub use room_manager::{FixedRoomManager, RoomManager};
pub use session::{IdleReason, Session};
pub use transport::{CLOSE_NORMAL, Transport};

#[derive(Debug)]
pub enum CoreError {
    /// The endpoint write channel is full; the caller decides drop policy.
    Backpressure,
    /// The room send queue is full.
    RoomBusy,
    /// `run` was invoked on an endpoint that is already running (or ran).
    AlreadyRunning,
    /// The room manager could not assign a room.
    RoomAssignment(String),
}

impl std::fmt::Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::Backpressure => write!(f, "write channel is full, apply backpressure"),
            CoreError::RoomBusy => write!(f, "room send queue is full"),
            CoreError::AlreadyRunning => write!(f, "endpoint is already running"),
            CoreError::RoomAssignment(msg) => write!(f, "room assignment failed: {msg}"),
        }
    }
}

impl std::error::Error for CoreError {}
