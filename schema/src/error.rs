//! Schema and registry errors.

use bytestream::StreamError;
use thiserror::Error;

use crate::ComponentKind;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur when building a registry or checking payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Two components were registered under the same kind.
    #[error("component kind {kind} already registered as {existing}")]
    DuplicateKind {
        kind: ComponentKind,
        existing: &'static str,
    },

    /// A raw kind id does not fit in a component mask.
    #[error("component kind {raw} out of range (max {max})")]
    KindOutOfRange { raw: u8, max: u8 },

    /// A payload names a kind this registry does not know.
    #[error("unknown component kind {kind}")]
    UnknownKind { kind: ComponentKind },

    /// A payload failed to decode as its registered component.
    #[error("invalid payload for component kind {kind}: {source}")]
    InvalidPayload {
        kind: ComponentKind,
        #[source]
        source: StreamError,
    },
}
