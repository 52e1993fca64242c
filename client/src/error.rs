//! Error types for the replication client.

use channel::ChannelError;
use codec::{CodecError, DisconnectReason};
use thiserror::Error;
use wire::MessageKind;

use crate::ClientState;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised while talking to the server.
///
/// Message-level errors are counted and logged by the client; only
/// [`connect`](crate::ReplicationClient::connect) returns them to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// A message failed to decode.
    #[error("malformed message: {source}")]
    Malformed {
        #[source]
        source: CodecError,
    },

    /// A well-formed message that makes no sense in the current state.
    #[error("unexpected {kind:?} while {state:?}")]
    UnexpectedMessage { kind: MessageKind, state: ClientState },

    /// The server ended the connection.
    #[error("disconnected: {reason:?}")]
    Disconnected { reason: DisconnectReason },

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl ClientError {
    /// Whether the error counts towards the malformed-message statistics.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. } | Self::UnexpectedMessage { .. })
    }
}

pub(crate) fn malformed(source: CodecError) -> ClientError {
    ClientError::Malformed { source }
}
