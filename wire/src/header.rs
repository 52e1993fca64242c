//! Message header and message kinds.

use bytestream::{ByteReader, ByteWriter};

use crate::error::{WireError, WireResult};

/// Header size in bytes (13 total).
pub const HEADER_SIZE: usize = 1 + 4 + 4 + 2 + 2;

/// Every message kind on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MessageKind {
    /// Client handshake request.
    Hello = 1,
    /// Server handshake reply.
    Welcome = 2,
    FullSnapshot = 3,
    Delta = 4,
    /// Best-effort component values between reliable deltas.
    Hint = 5,
    Input = 6,
    Ack = 7,
    /// Client request for a fresh full snapshot.
    Resync = 8,
    Ping = 9,
    Pong = 10,
    SpawnActor = 11,
    Disconnect = 12,
}

impl MessageKind {
    /// Number of kinds; raw values run `1..=COUNT`.
    pub const COUNT: usize = 12;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Hello,
        Self::Welcome,
        Self::FullSnapshot,
        Self::Delta,
        Self::Hint,
        Self::Input,
        Self::Ack,
        Self::Resync,
        Self::Ping,
        Self::Pong,
        Self::SpawnActor,
        Self::Disconnect,
    ];

    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Hello),
            2 => Some(Self::Welcome),
            3 => Some(Self::FullSnapshot),
            4 => Some(Self::Delta),
            5 => Some(Self::Hint),
            6 => Some(Self::Input),
            7 => Some(Self::Ack),
            8 => Some(Self::Resync),
            9 => Some(Self::Ping),
            10 => Some(Self::Pong),
            11 => Some(Self::SpawnActor),
            12 => Some(Self::Disconnect),
            _ => None,
        }
    }

    #[must_use]
    pub const fn raw(self) -> u8 {
        self as u8
    }

    /// Zero-based slot for lookup tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize - 1
    }

    /// Whether the kind may be split across several messages.
    #[must_use]
    pub const fn is_fragmentable(self) -> bool {
        matches!(self, Self::FullSnapshot | Self::Delta)
    }

    /// Whether the kind carries authoritative world state.
    #[must_use]
    pub const fn is_snapshot(self) -> bool {
        matches!(self, Self::FullSnapshot | Self::Delta)
    }
}

/// Fixed header that prefixes every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHeader {
    pub kind: MessageKind,
    pub tick: u32,
    pub base_tick: u32,
    pub fragment_index: u16,
    pub fragment_count: u16,
}

impl MessageHeader {
    /// Header for an unfragmented message.
    #[must_use]
    pub const fn single(kind: MessageKind, tick: u32) -> Self {
        Self {
            kind,
            tick,
            base_tick: 0,
            fragment_index: 0,
            fragment_count: 1,
        }
    }

    /// Header for one fragment of a full snapshot.
    #[must_use]
    pub const fn full_snapshot(tick: u32, fragment_index: u16, fragment_count: u16) -> Self {
        Self {
            kind: MessageKind::FullSnapshot,
            tick,
            base_tick: 0,
            fragment_index,
            fragment_count,
        }
    }

    /// Header for one fragment of a delta.
    #[must_use]
    pub const fn delta(
        tick: u32,
        base_tick: u32,
        fragment_index: u16,
        fragment_count: u16,
    ) -> Self {
        Self {
            kind: MessageKind::Delta,
            tick,
            base_tick,
            fragment_index,
            fragment_count,
        }
    }

    #[must_use]
    pub const fn is_fragmented(&self) -> bool {
        self.fragment_count > 1
    }
}

/// Encodes a header into `out`.
pub fn encode_header(header: &MessageHeader, out: &mut ByteWriter) {
    out.write_u8(header.kind.raw());
    out.write_u32(header.tick);
    out.write_u32(header.base_tick);
    out.write_u16(header.fragment_index);
    out.write_u16(header.fragment_count);
}

/// Decodes a header without cross-field validation.
pub fn decode_header(reader: &mut ByteReader<'_>) -> WireResult<MessageHeader> {
    let raw = reader.read_u8()?;
    let kind = MessageKind::from_raw(raw).ok_or(WireError::UnknownKind { raw })?;
    Ok(MessageHeader {
        kind,
        tick: reader.read_u32()?,
        base_tick: reader.read_u32()?,
        fragment_index: reader.read_u16()?,
        fragment_count: reader.read_u16()?,
    })
}
