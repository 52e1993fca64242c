//! The [`Component`] trait implemented by every replicated component type.

use std::fmt::Debug;

use bytestream::{ByteReader, ByteWriter, StreamResult};

use crate::ComponentKind;

/// A component type with a fixed, canonical byte layout.
///
/// `encode` must be deterministic: equal values always produce identical
/// bytes, since the snapshot diff compares payloads byte-for-byte.
pub trait Component: Sized + Default + PartialEq + Debug + 'static {
    /// Wire identifier of this component type.
    const KIND: ComponentKind;

    /// Human-readable name, also folded into the schema hash.
    const NAME: &'static str;

    /// Layout revision; bump when the byte layout changes.
    const VERSION: u16 = 1;

    fn encode(&self, out: &mut ByteWriter);

    fn decode(reader: &mut ByteReader<'_>) -> StreamResult<Self>;

    fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Encodes into a fresh payload buffer.
    fn to_payload(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        self.encode(&mut writer);
        writer.finish()
    }

    /// Decodes a complete payload, rejecting trailing bytes.
    fn from_payload(bytes: &[u8]) -> StreamResult<Self> {
        let mut reader = ByteReader::new(bytes);
        let value = Self::decode(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }
}
