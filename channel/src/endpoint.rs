//! Traits every transport implements.

use crate::{ChannelEvent, ChannelKind, ChannelResult, ConnectionHandle, DeliveryClass, MessageId};

/// One side of a transport: a server listener or a connected client.
pub trait Endpoint {
    /// Iterator returned by [`Endpoint::poll`].
    type Events: Iterator<Item = ChannelEvent>;

    /// Queues `bytes` for `to`. Never blocks.
    ///
    /// # Errors
    ///
    /// [`ChannelError::SendQueueFull`](crate::ChannelError::SendQueueFull) when
    /// the transport cannot accept more messages, and
    /// [`ChannelError::ConnectionClosed`](crate::ChannelError::ConnectionClosed)
    /// once either side closed the connection.
    fn send(
        &mut self,
        to: ConnectionHandle,
        kind: ChannelKind,
        class: DeliveryClass,
        bytes: Vec<u8>,
    ) -> ChannelResult<MessageId>;

    /// Drains the events received since the previous call.
    fn poll(&mut self) -> Self::Events;

    /// Closes the connection. The peer observes [`ChannelEvent::Closed`].
    fn close(&mut self, handle: ConnectionHandle);
}

/// Opens client connections.
pub trait Connector {
    type Endpoint: Endpoint;

    /// Connects to `address`, presenting an opaque `auth_token`.
    ///
    /// # Errors
    ///
    /// Returns a transport-specific error if nothing accepts the connection.
    fn connect(
        &mut self,
        address: &str,
        auth_token: &[u8],
    ) -> ChannelResult<(Self::Endpoint, ConnectionHandle)>;
}
