//! Unreliable hint messages.
//!
//! Hints carry the latest value of fast-changing components between
//! reliable deltas. They are never used as a delta baseline.

use bytestream::{ByteReader, ByteWriter};
use schema::{ComponentKind, ComponentRegistry};
use wire::{MessageKind, WireMessage};

use crate::body::expect_kind;
use crate::error::{CodecError, CodecResult, LimitKind};
use crate::messages::{finish, frame};
use crate::{CodecLimits, EntityId, Tick};

/// One best-effort component value sent between reliable deltas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hint {
    pub entity: EntityId,
    pub kind: ComponentKind,
    pub payload: Vec<u8>,
}

/// Encodes hints for `tick` as one unreliable message.
#[must_use]
pub fn encode_hints(tick: Tick, hints: &[Hint]) -> Vec<u8> {
    let mut body = ByteWriter::new();
    body.write_varu32(u32::try_from(hints.len()).unwrap_or(u32::MAX));
    for hint in hints {
        body.write_u32(hint.entity.raw());
        body.write_u8(hint.kind.raw());
        body.write_len_prefixed(&hint.payload);
    }
    frame(MessageKind::Hint, tick, &body)
}

/// Decodes a hint message, dropping hints for kinds `registry` lacks.
pub fn decode_hints(
    message: &WireMessage<'_>,
    registry: &ComponentRegistry,
    limits: &CodecLimits,
) -> CodecResult<(Tick, Vec<Hint>)> {
    expect_kind(message, MessageKind::Hint)?;
    let mut reader = ByteReader::new(message.body);
    let count = reader.read_varu32()? as usize;
    if count > limits.max_hints {
        return Err(CodecError::LimitsExceeded {
            kind: LimitKind::Hints,
            limit: limits.max_hints,
            actual: count,
        });
    }
    let mut hints = Vec::with_capacity(count);
    for _ in 0..count {
        let entity = EntityId::new(reader.read_u32()?);
        let raw = reader.read_u8()?;
        let payload = reader.read_len_prefixed(limits.max_payload_bytes)?;
        let Some(kind) = ComponentKind::new(raw).filter(|kind| registry.contains(*kind))
        else {
            continue;
        };
        registry
            .validate(kind, payload)
            .map_err(|source| CodecError::InvalidPayload {
                entity,
                kind,
                source,
            })?;
        hints.push(Hint {
            entity,
            kind,
            payload: payload.to_vec(),
        });
    }
    finish(&reader)?;
    Ok((Tick::new(message.header.tick), hints))
}
