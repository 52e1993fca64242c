//! Bodies of the non-snapshot messages.

use bytestream::{ByteReader, ByteWriter};
use wire::{encode_message, MessageHeader, MessageKind, WireMessage};

use crate::body::expect_kind;
use crate::error::{CodecError, CodecResult, LimitKind};
use crate::{CodecLimits, Tick};

/// Version of the message layouts in this crate.
pub const PROTOCOL_VERSION: u16 = 1;

pub(crate) fn frame(kind: MessageKind, tick: Tick, body: &ByteWriter) -> Vec<u8> {
    encode_message(&MessageHeader::single(kind, tick.raw()), body.as_slice())
}

pub(crate) fn finish(reader: &ByteReader<'_>) -> CodecResult<()> {
    reader.finish().map_err(CodecError::from)
}

/// Client handshake request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hello {
    pub protocol_version: u16,
    pub schema_hash: u64,
    pub client_id: u64,
}

impl Hello {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut body = ByteWriter::with_capacity(18);
        body.write_u16(self.protocol_version);
        body.write_u64(self.schema_hash);
        body.write_u64(self.client_id);
        frame(MessageKind::Hello, Tick::ZERO, &body)
    }

    pub fn decode(message: &WireMessage<'_>) -> CodecResult<Self> {
        expect_kind(message, MessageKind::Hello)?;
        let mut reader = ByteReader::new(message.body);
        let hello = Self {
            protocol_version: reader.read_u16()?,
            schema_hash: reader.read_u64()?,
            client_id: reader.read_u64()?,
        };
        finish(&reader)?;
        Ok(hello)
    }
}

/// Server handshake reply. The header tick is the server's current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Welcome {
    pub server_tick: Tick,
    pub connection_id: u32,
    pub tick_rate_hz: u16,
    pub history_capacity: u16,
}

impl Welcome {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut body = ByteWriter::with_capacity(8);
        body.write_u32(self.connection_id);
        body.write_u16(self.tick_rate_hz);
        body.write_u16(self.history_capacity);
        frame(MessageKind::Welcome, self.server_tick, &body)
    }

    pub fn decode(message: &WireMessage<'_>) -> CodecResult<Self> {
        expect_kind(message, MessageKind::Welcome)?;
        let mut reader = ByteReader::new(message.body);
        let welcome = Self {
            server_tick: Tick::new(message.header.tick),
            connection_id: reader.read_u32()?,
            tick_rate_hz: reader.read_u16()?,
            history_capacity: reader.read_u16()?,
        };
        finish(&reader)?;
        Ok(welcome)
    }
}

/// A player action stamped with the tick it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputCommand {
    pub sequence: u32,
    pub tick: Tick,
    pub action: Vec<u8>,
}

impl InputCommand {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut body = ByteWriter::with_capacity(6 + self.action.len());
        body.write_u32(self.sequence);
        body.write_len_prefixed(&self.action);
        frame(MessageKind::Input, self.tick, &body)
    }

    pub fn decode(message: &WireMessage<'_>, limits: &CodecLimits) -> CodecResult<Self> {
        expect_kind(message, MessageKind::Input)?;
        let mut reader = ByteReader::new(message.body);
        let sequence = reader.read_u32()?;
        let length = reader.read_varu32()? as usize;
        if length > limits.max_action_bytes {
            return Err(CodecError::LimitsExceeded {
                kind: LimitKind::ActionBytes,
                limit: limits.max_action_bytes,
                actual: length,
            });
        }
        let action = reader.read_bytes(length)?.to_vec();
        finish(&reader)?;
        Ok(Self {
            sequence,
            tick: Tick::new(message.header.tick),
            action,
        })
    }
}

/// Acknowledges a fully applied snapshot. Body is empty; the tick is in the header.
#[must_use]
pub fn encode_ack(tick: Tick) -> Vec<u8> {
    frame(MessageKind::Ack, tick, &ByteWriter::new())
}

pub fn decode_ack(message: &WireMessage<'_>) -> CodecResult<Tick> {
    expect_kind(message, MessageKind::Ack)?;
    finish(&ByteReader::new(message.body))?;
    Ok(Tick::new(message.header.tick))
}

/// Asks the server for a fresh full snapshot.
#[must_use]
pub fn encode_resync(last_applied: Tick) -> Vec<u8> {
    frame(MessageKind::Resync, last_applied, &ByteWriter::new())
}

pub fn decode_resync(message: &WireMessage<'_>) -> CodecResult<Tick> {
    expect_kind(message, MessageKind::Resync)?;
    finish(&ByteReader::new(message.body))?;
    Ok(Tick::new(message.header.tick))
}

/// Liveness probe; the receiver echoes the nonce in a [`MessageKind::Pong`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    pub tick: Tick,
    pub nonce: u64,
}

impl Ping {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.encode_as(MessageKind::Ping)
    }

    /// The matching pong for this ping, stamped with the responder's tick.
    #[must_use]
    pub fn encode_pong(&self, tick: Tick) -> Vec<u8> {
        Self { tick, nonce: self.nonce }.encode_as(MessageKind::Pong)
    }

    fn encode_as(&self, kind: MessageKind) -> Vec<u8> {
        let mut body = ByteWriter::with_capacity(8);
        body.write_u64(self.nonce);
        frame(kind, self.tick, &body)
    }

    /// Decodes either a ping or a pong.
    pub fn decode(message: &WireMessage<'_>) -> CodecResult<Self> {
        if message.kind() != MessageKind::Pong {
            expect_kind(message, MessageKind::Ping)?;
        }
        let mut reader = ByteReader::new(message.body);
        let nonce = reader.read_u64()?;
        finish(&reader)?;
        Ok(Self {
            tick: Tick::new(message.header.tick),
            nonce,
        })
    }
}

/// Request to spawn a named actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnActor {
    pub name: String,
}

impl SpawnActor {
    #[must_use]
    pub fn encode(&self, tick: Tick) -> Vec<u8> {
        let mut body = ByteWriter::with_capacity(1 + self.name.len());
        body.write_str(&self.name);
        frame(MessageKind::SpawnActor, tick, &body)
    }

    pub fn decode(message: &WireMessage<'_>, limits: &CodecLimits) -> CodecResult<Self> {
        expect_kind(message, MessageKind::SpawnActor)?;
        let mut reader = ByteReader::new(message.body);
        let name = reader.read_str(limits.max_name_bytes)?.to_owned();
        finish(&reader)?;
        Ok(Self { name })
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DisconnectReason {
    /// The peer asked to leave.
    Requested = 1,
    TimedOut = 2,
    ProtocolMismatch = 3,
    SchemaMismatch = 4,
    ServerFull = 5,
    /// Too many malformed messages.
    Malformed = 6,
    Kicked = 7,
    /// The transport closed underneath us.
    ChannelClosed = 8,
    /// The world no longer fits in `max_fragments` fragments.
    SnapshotTooLarge = 9,
}

impl DisconnectReason {
    pub const fn from_raw(raw: u8) -> CodecResult<Self> {
        Ok(match raw {
            1 => Self::Requested,
            2 => Self::TimedOut,
            3 => Self::ProtocolMismatch,
            4 => Self::SchemaMismatch,
            5 => Self::ServerFull,
            6 => Self::Malformed,
            7 => Self::Kicked,
            8 => Self::ChannelClosed,
            9 => Self::SnapshotTooLarge,
            _ => return Err(CodecError::UnknownDisconnectReason { raw }),
        })
    }

    #[must_use]
    pub fn encode(self, tick: Tick) -> Vec<u8> {
        let mut body = ByteWriter::with_capacity(1);
        body.write_u8(self as u8);
        frame(MessageKind::Disconnect, tick, &body)
    }

    pub fn decode(message: &WireMessage<'_>) -> CodecResult<Self> {
        expect_kind(message, MessageKind::Disconnect)?;
        let mut reader = ByteReader::new(message.body);
        let reason = Self::from_raw(reader.read_u8()?)?;
        finish(&reader)?;
        Ok(reason)
    }
}

#[cfg(test)]
mod tests {
    use wire::{decode_message, WireLimits};

    use super::*;

    fn parse(bytes: &[u8]) -> WireMessage<'_> {
        decode_message(bytes, &WireLimits::default()).unwrap()
    }

    #[test]
    fn hello_roundtrip() {
        let hello = Hello {
            protocol_version: PROTOCOL_VERSION,
            schema_hash: 0xDEAD_BEEF_0000_0001,
            client_id: 77,
        };
        let bytes = hello.encode();
        assert_eq!(Hello::decode(&parse(&bytes)).unwrap(), hello);
    }

    #[test]
    fn welcome_carries_server_tick_in_header() {
        let welcome = Welcome {
            server_tick: Tick::new(500),
            connection_id: 3,
            tick_rate_hz: 30,
            history_capacity: 64,
        };
        let bytes = welcome.encode();
        let message = parse(&bytes);
        assert_eq!(message.header.tick, 500);
        assert_eq!(Welcome::decode(&message).unwrap(), welcome);
    }

    #[test]
    fn input_action_limit() {
        let input = InputCommand {
            sequence: 5,
            tick: Tick::new(40),
            action: vec![1; 40],
        };
        let bytes = input.encode();
        let err = InputCommand::decode(&parse(&bytes), &CodecLimits::for_testing()).unwrap_err();
        assert!(matches!(
            err,
            CodecError::LimitsExceeded {
                kind: LimitKind::ActionBytes,
                ..
            }
        ));
        assert_eq!(
            InputCommand::decode(&parse(&bytes), &CodecLimits::default()).unwrap(),
            input
        );
    }

    #[test]
    fn ack_and_resync_ticks() {
        assert_eq!(decode_ack(&parse(&encode_ack(Tick::new(9)))).unwrap(), Tick::new(9));
        assert_eq!(
            decode_resync(&parse(&encode_resync(Tick::new(4)))).unwrap(),
            Tick::new(4)
        );
    }

    #[test]
    fn ack_rejects_body() {
        let bytes = encode_message(&MessageHeader::single(MessageKind::Ack, 1), &[0]);
        assert!(matches!(
            decode_ack(&parse(&bytes)),
            Err(CodecError::Stream(_))
        ));
    }

    #[test]
    fn ping_pong_share_nonce() {
        let ping = Ping {
            tick: Tick::new(2),
            nonce: 99,
        };
        let pong_bytes = ping.encode_pong(Tick::new(8));
        let pong = parse(&pong_bytes);
        assert_eq!(pong.kind(), MessageKind::Pong);
        assert_eq!(
            Ping::decode(&pong).unwrap(),
            Ping {
                tick: Tick::new(8),
                nonce: 99
            }
        );
        assert_eq!(Ping::decode(&parse(&ping.encode())).unwrap(), ping);
    }

    #[test]
    fn spawn_actor_name_limit() {
        let long = SpawnActor {
            name: "x".repeat(300),
        };
        let bytes = long.encode(Tick::ZERO);
        assert!(SpawnActor::decode(&parse(&bytes), &CodecLimits::default()).is_err());

        let ok = SpawnActor {
            name: "Corvette".to_string(),
        };
        let bytes = ok.encode(Tick::ZERO);
        assert_eq!(SpawnActor::decode(&parse(&bytes), &CodecLimits::default()).unwrap(), ok);
    }

    #[test]
    fn disconnect_reason_roundtrip() {
        let bytes = DisconnectReason::ServerFull.encode(Tick::new(1));
        assert_eq!(
            DisconnectReason::decode(&parse(&bytes)).unwrap(),
            DisconnectReason::ServerFull
        );
        assert_eq!(
            DisconnectReason::from_raw(9).unwrap(),
            DisconnectReason::SnapshotTooLarge
        );
        assert_eq!(
            DisconnectReason::from_raw(0).unwrap_err(),
            CodecError::UnknownDisconnectReason { raw: 0 }
        );
        assert!(DisconnectReason::from_raw(10).is_err());
    }

    #[test]
    fn wrong_kind_rejected() {
        let bytes = encode_ack(Tick::new(1));
        assert_eq!(
            Hello::decode(&parse(&bytes)).unwrap_err(),
            CodecError::UnexpectedKind {
                expected: MessageKind::Hello,
                found: MessageKind::Ack
            }
        );
    }
}
