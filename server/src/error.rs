//! Error types for the replication server.

use std::time::Duration;

use channel::{ChannelError, ConnectionHandle};
use codec::CodecError;
use thiserror::Error;
use wire::MessageKind;

use crate::ConnectionState;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors raised while serving connections.
///
/// None of these are fatal to the server; they are logged, counted and turned
/// into connection state changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    /// A message failed to decode.
    #[error("malformed message from {handle}: {source}")]
    Malformed {
        handle: ConnectionHandle,
        #[source]
        source: CodecError,
    },

    /// A well-formed message that is not valid in the connection's state.
    #[error("unexpected {kind:?} from {handle} while {state:?}")]
    UnexpectedMessage {
        handle: ConnectionHandle,
        kind: MessageKind,
        state: ConnectionState,
    },

    /// No inbound traffic for longer than the configured timeout.
    #[error("connection {handle} timed out after {idle:?} of silence")]
    ConnectionTimeout {
        handle: ConnectionHandle,
        idle: Duration,
    },

    /// The connection cap is reached.
    #[error("server full ({max} connections)")]
    ServerFull { max: usize },

    #[error("unknown connection {handle}")]
    UnknownConnection { handle: ConnectionHandle },

    /// The handle already names a connection.
    #[error("connection {handle} already exists")]
    DuplicateConnection { handle: ConnectionHandle },

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ServerError {
    /// Whether this counts toward the malformed-message threshold.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. } | Self::UnexpectedMessage { .. })
    }
}
