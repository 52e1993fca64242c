//! Identifiers and events shared by every transport.

use std::fmt;

/// Opaque identifier for one transport connection.
///
/// Both ends of a loopback connection see the same handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionHandle(u64);

impl ConnectionHandle {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Identifier assigned to each accepted send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(u64);

impl MessageId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Delivery guarantee requested for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryClass {
    /// May be lost or arrive out of order.
    Unreliable,
    /// Delivered exactly once, in send order per connection and channel kind.
    ReliableOrdered,
}

impl DeliveryClass {
    #[must_use]
    pub const fn is_reliable(self) -> bool {
        matches!(self, Self::ReliableOrdered)
    }
}

/// Logical stream a message travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelKind {
    /// Handshake, acks, resync, ping, disconnect.
    Control,
    /// Full snapshots, deltas and hints.
    Replication,
    /// Client input commands.
    Input,
}

impl ChannelKind {
    pub const ALL: [Self; 3] = [Self::Control, Self::Replication, Self::Input];
}

/// Something that happened on an endpoint since the last poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A peer connected. `auth_token` is the opaque token it presented.
    Connected {
        handle: ConnectionHandle,
        auth_token: Vec<u8>,
    },
    /// A message arrived.
    Message {
        from: ConnectionHandle,
        kind: ChannelKind,
        bytes: Vec<u8>,
    },
    /// The connection was closed by the peer.
    Closed { handle: ConnectionHandle },
}

impl ChannelEvent {
    /// The connection this event concerns.
    #[must_use]
    pub const fn handle(&self) -> ConnectionHandle {
        match self {
            Self::Connected { handle, .. } | Self::Closed { handle } => *handle,
            Self::Message { from, .. } => *from,
        }
    }
}
