//! Whole-message framing: header validation plus an opaque body.

use bytestream::{ByteReader, ByteWriter};

use crate::error::{WireError, WireResult};
use crate::header::{decode_header, encode_header, MessageHeader, HEADER_SIZE};
use crate::{MessageKind, WireLimits};

/// A decoded message whose body has not been parsed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireMessage<'a> {
    pub header: MessageHeader,
    pub body: &'a [u8],
}

impl WireMessage<'_> {
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.header.kind
    }
}

/// Frames `body` behind `header`.
#[must_use]
pub fn encode_message(header: &MessageHeader, body: &[u8]) -> Vec<u8> {
    let mut writer = ByteWriter::with_capacity(HEADER_SIZE + body.len());
    encode_header(header, &mut writer);
    writer.write_bytes(body);
    writer.finish()
}

/// Decodes and validates the header of `buf`.
///
/// # Errors
///
/// Fails on size limits, unknown kinds, inconsistent fragment fields, and
/// base ticks that do not fit the message kind.
pub fn decode_message<'a>(buf: &'a [u8], limits: &WireLimits) -> WireResult<WireMessage<'a>> {
    if buf.len() > limits.max_message_bytes {
        return Err(WireError::MessageTooLarge {
            actual: buf.len(),
            max: limits.max_message_bytes,
        });
    }
    if buf.len() < HEADER_SIZE {
        return Err(WireError::MessageTooSmall {
            actual: buf.len(),
            required: HEADER_SIZE,
        });
    }

    let mut reader = ByteReader::new(buf);
    let header = decode_header(&mut reader)?;
    validate_header(&header, limits)?;

    Ok(WireMessage {
        header,
        body: reader.rest(),
    })
}

fn validate_header(header: &MessageHeader, limits: &WireLimits) -> WireResult<()> {
    let MessageHeader {
        kind,
        tick,
        base_tick,
        fragment_index,
        fragment_count,
    } = *header;

    if fragment_count == 0 || fragment_index >= fragment_count {
        return Err(WireError::InvalidFragment {
            index: fragment_index,
            count: fragment_count,
        });
    }
    if fragment_count > 1 && !kind.is_fragmentable() {
        return Err(WireError::UnfragmentableKind { kind });
    }
    if fragment_count > limits.max_fragments {
        return Err(WireError::TooManyFragments {
            count: fragment_count,
            max: limits.max_fragments,
        });
    }

    let base_ok = match kind {
        MessageKind::FullSnapshot => base_tick == 0,
        MessageKind::Delta => base_tick <= tick,
        _ => true,
    };
    if !base_ok {
        return Err(WireError::InvalidBaseTick {
            kind,
            tick,
            base_tick,
        });
    }
    Ok(())
}
