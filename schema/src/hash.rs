//! Deterministic schema hashing.

use blake3::Hasher;

use crate::ComponentRegistry;

/// Computes a deterministic hash of a registry's component layout.
///
/// Client and server compare this during the handshake; any difference in
/// kinds, names or layout versions changes the hash.
#[must_use]
pub fn schema_hash(registry: &ComponentRegistry) -> u64 {
    let mut hasher = Hasher::new();
    write_u32(&mut hasher, registry.len() as u32);

    for entry in registry.iter() {
        write_u8(&mut hasher, entry.kind.raw());
        write_u16(&mut hasher, entry.version);
        write_u32(&mut hasher, entry.name.len() as u32);
        hasher.update(entry.name.as_bytes());
    }

    let hash = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}

fn write_u8(hasher: &mut Hasher, value: u8) {
    hasher.update(&[value]);
}

fn write_u16(hasher: &mut Hasher, value: u16) {
    hasher.update(&value.to_le_bytes());
}

fn write_u32(hasher: &mut Hasher, value: u32) {
    hasher.update(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use bytestream::{ByteReader, ByteWriter, StreamResult};

    use super::*;
    use crate::{Component, ComponentKind};

    #[derive(Debug, Default, PartialEq)]
    struct Heading(u16);

    impl Component for Heading {
        const KIND: ComponentKind = ComponentKind::from_const(1);
        const NAME: &'static str = "Heading";

        fn encode(&self, out: &mut ByteWriter) {
            out.write_u16(self.0);
        }

        fn decode(reader: &mut ByteReader<'_>) -> StreamResult<Self> {
            reader.read_u16().map(Self)
        }
    }

    #[derive(Debug, Default, PartialEq)]
    struct HeadingV2(u16);

    impl Component for HeadingV2 {
        const KIND: ComponentKind = ComponentKind::from_const(1);
        const NAME: &'static str = "Heading";
        const VERSION: u16 = 2;

        fn encode(&self, out: &mut ByteWriter) {
            out.write_u16(self.0);
        }

        fn decode(reader: &mut ByteReader<'_>) -> StreamResult<Self> {
            reader.read_u16().map(Self)
        }
    }

    #[test]
    fn schema_hash_is_stable() {
        let registry = ComponentRegistry::new().with::<Heading>().unwrap();
        assert_eq!(schema_hash(&registry), schema_hash(&registry.clone()));
    }

    #[test]
    fn schema_hash_changes_with_version() {
        let v1 = ComponentRegistry::new().with::<Heading>().unwrap();
        let v2 = ComponentRegistry::new().with::<HeadingV2>().unwrap();
        assert_ne!(schema_hash(&v1), schema_hash(&v2));
    }

    #[test]
    fn empty_registry_hash_differs_from_populated() {
        let empty = ComponentRegistry::new();
        let populated = ComponentRegistry::new().with::<Heading>().unwrap();
        assert_ne!(schema_hash(&empty), schema_hash(&populated));
    }
}
