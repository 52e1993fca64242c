//! Error types for channel operations.

use thiserror::Error;

use crate::ConnectionHandle;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors that can occur when sending, connecting or listening.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The handle does not name a connection on this endpoint.
    #[error("unknown connection {handle}")]
    UnknownConnection { handle: ConnectionHandle },

    /// The connection was closed by either side.
    #[error("connection {handle} is closed")]
    ConnectionClosed { handle: ConnectionHandle },

    /// Too many messages are in flight from this endpoint.
    #[error("send queue full ({capacity} messages in flight)")]
    SendQueueFull { capacity: usize },

    /// Nothing is listening at the address.
    #[error("no listener at {address:?}")]
    NoListener { address: String },

    /// Another endpoint already listens at the address.
    #[error("address {address:?} already in use")]
    AddressInUse { address: String },
}
