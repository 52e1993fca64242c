//! Error types for snapshot and message codecs.

use bytestream::StreamError;
use schema::{ComponentKind, SchemaError};
use thiserror::Error;
use wire::{MessageKind, WireError};

use crate::{EntityId, Tick};

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Specific codec limits that can be exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    EntitiesPerMessage,
    PayloadBytes,
    ActionBytes,
    Hints,
    Fragments,
}

/// Errors raised while building, applying or decoding snapshots and messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    /// A delta was built against a tick other than the local snapshot's.
    #[error("stale baseline: delta is based on tick {found}, local snapshot is tick {expected}")]
    StaleBaseline { expected: Tick, found: Tick },

    /// An entity would end up with no components.
    #[error("entity {entity} has an empty component mask")]
    EmptyMask { entity: EntityId },

    /// A component payload did not decode under the registry.
    #[error("entity {entity} component {kind}: {source}")]
    InvalidPayload {
        entity: EntityId,
        kind: ComponentKind,
        #[source]
        source: SchemaError,
    },

    /// Referenced entity does not exist.
    #[error("entity {entity} not found")]
    EntityNotFound { entity: EntityId },

    /// Created entity already exists.
    #[error("entity {entity} already exists")]
    EntityAlreadyExists { entity: EntityId },

    /// Entity ids in a section were not strictly increasing.
    #[error("entity order violated: {current} after {previous}")]
    InvalidEntityOrder { previous: EntityId, current: EntityId },

    /// A full snapshot body carried removals or updates.
    #[error("full snapshot contains {removed} removals and {updated} updates")]
    InvalidFullSnapshot { removed: usize, updated: usize },

    /// Limits exceeded.
    #[error("{kind:?} limit exceeded: {actual} > {limit}")]
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    /// A body decoder was handed a message of the wrong kind.
    #[error("expected {expected:?} message, found {found:?}")]
    UnexpectedKind {
        expected: MessageKind,
        found: MessageKind,
    },

    /// A single-message decoder was handed one fragment of several.
    #[error("message is fragment {index} of {count}; reassemble it first")]
    Fragmented { index: u16, count: u16 },

    /// Unknown disconnect reason byte.
    #[error("unknown disconnect reason {raw}")]
    UnknownDisconnectReason { raw: u8 },
}

impl CodecError {
    /// Whether this is a stale-baseline condition rather than corrupt data.
    #[must_use]
    pub const fn is_stale_baseline(&self) -> bool {
        matches!(self, Self::StaleBaseline { .. })
    }
}
