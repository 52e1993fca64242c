//! Transport abstraction for rogue-net replication.
//!
//! The replication layer never touches sockets. It talks to an [`Endpoint`]
//! that can send bytes with a [`DeliveryClass`] on a logical [`ChannelKind`]
//! and that is drained once per tick with [`Endpoint::poll`].
//!
//! [`LoopbackNetwork`] is a deterministic in-memory implementation with
//! configurable loss, reorder, latency and outages. Tests and the simulator
//! run on it.

mod endpoint;
mod error;
mod loopback;
mod types;

pub use endpoint::{Connector, Endpoint};
pub use error::{ChannelError, ChannelResult};
pub use loopback::{
    LoopbackConditions, LoopbackConnector, LoopbackEndpoint, LoopbackNetwork, LoopbackStats,
};
pub use types::{ChannelEvent, ChannelKind, ConnectionHandle, DeliveryClass, MessageId};
