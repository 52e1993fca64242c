//! Error types for wire format operations.

use bytestream::StreamError;
use thiserror::Error;

use crate::MessageKind;

/// Result type for wire format operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised while framing or unframing a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum WireError {
    /// Message is too small to contain the header.
    #[error("message too small: {actual} bytes, need at least {required}")]
    MessageTooSmall { actual: usize, required: usize },

    /// Message exceeds the configured size limit.
    #[error("message too large: {actual} bytes, limit {max}")]
    MessageTooLarge { actual: usize, max: usize },

    /// Unknown message kind byte.
    #[error("unknown message kind {raw}")]
    UnknownKind { raw: u8 },

    /// Fragment index/count pair is inconsistent.
    #[error("invalid fragment {index} of {count}")]
    InvalidFragment { index: u16, count: u16 },

    /// A kind that cannot be fragmented arrived with `fragment_count > 1`.
    #[error("message kind {kind:?} cannot be fragmented")]
    UnfragmentableKind { kind: MessageKind },

    /// Fragment count exceeds the configured limit.
    #[error("fragment count {count} exceeds limit {max}")]
    TooManyFragments { count: u16, max: u16 },

    /// Base tick is not valid for the message kind.
    #[error("invalid base tick {base_tick} for {kind:?} at tick {tick}")]
    InvalidBaseTick {
        kind: MessageKind,
        tick: u32,
        base_tick: u32,
    },

    #[error(transparent)]
    Stream(#[from] StreamError),
}
