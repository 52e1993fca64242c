//! Table-driven registry of component codecs.

use std::fmt;

use bytestream::StreamResult;

use crate::error::{SchemaError, SchemaResult};
use crate::{Component, ComponentKind, ComponentMask, MAX_COMPONENT_KINDS};

/// Type-erased codec entry for one component kind.
///
/// Every entry operates on canonical payload bytes, so snapshot code can
/// work without knowing the concrete component type.
#[derive(Clone, Copy)]
pub struct ComponentVTable {
    pub kind: ComponentKind,
    pub name: &'static str,
    pub version: u16,
    pub default_payload: fn() -> Vec<u8>,
    pub is_default: fn(&[u8]) -> bool,
    pub validate: fn(&[u8]) -> StreamResult<()>,
    pub describe: fn(&[u8]) -> StreamResult<String>,
}

impl ComponentVTable {
    /// Builds the entry for `T`.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self {
            kind: T::KIND,
            name: T::NAME,
            version: T::VERSION,
            default_payload: default_payload::<T>,
            is_default: is_default::<T>,
            validate: validate::<T>,
            describe: describe::<T>,
        }
    }
}

impl fmt::Debug for ComponentVTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentVTable")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

fn default_payload<T: Component>() -> Vec<u8> {
    T::default().to_payload()
}

fn is_default<T: Component>(bytes: &[u8]) -> bool {
    T::from_payload(bytes).is_ok_and(|value| value.is_default())
}

fn validate<T: Component>(bytes: &[u8]) -> StreamResult<()> {
    T::from_payload(bytes).map(|_| ())
}

fn describe<T: Component>(bytes: &[u8]) -> StreamResult<String> {
    T::from_payload(bytes).map(|value| format!("{value:?}"))
}

/// Maps each [`ComponentKind`] to its codec entry.
#[derive(Debug, Clone)]
pub struct ComponentRegistry {
    entries: [Option<ComponentVTable>; MAX_COMPONENT_KINDS],
    kinds: ComponentMask,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [None; MAX_COMPONENT_KINDS],
            kinds: ComponentMask::EMPTY,
        }
    }

    /// Registers `T`, failing if its kind is taken.
    pub fn register<T: Component>(&mut self) -> SchemaResult<&mut Self> {
        self.insert(ComponentVTable::of::<T>())?;
        Ok(self)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<T: Component>(mut self) -> SchemaResult<Self> {
        self.register::<T>()?;
        Ok(self)
    }

    /// Registers a pre-built entry.
    pub fn insert(&mut self, entry: ComponentVTable) -> SchemaResult<()> {
        let slot = &mut self.entries[usize::from(entry.kind.raw())];
        if let Some(existing) = slot {
            return Err(SchemaError::DuplicateKind {
                kind: entry.kind,
                existing: existing.name,
            });
        }
        *slot = Some(entry);
        self.kinds.insert(entry.kind);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, kind: ComponentKind) -> Option<&ComponentVTable> {
        self.entries[usize::from(kind.raw())].as_ref()
    }

    #[must_use]
    pub const fn contains(&self, kind: ComponentKind) -> bool {
        self.kinds.contains(kind)
    }

    /// All registered kinds.
    #[must_use]
    pub const fn kinds(&self) -> ComponentMask {
        self.kinds
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.kinds.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Registered entries in ascending kind order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentVTable> + '_ {
        self.entries.iter().filter_map(Option::as_ref)
    }

    /// Whether `bytes` decode to the default value of `kind`.
    ///
    /// Unknown kinds and undecodable payloads are never default.
    #[must_use]
    pub fn is_default(&self, kind: ComponentKind, bytes: &[u8]) -> bool {
        self.get(kind).is_some_and(|entry| (entry.is_default)(bytes))
    }

    pub fn default_payload(&self, kind: ComponentKind) -> SchemaResult<Vec<u8>> {
        self.get(kind)
            .map(|entry| (entry.default_payload)())
            .ok_or(SchemaError::UnknownKind { kind })
    }

    pub fn validate(&self, kind: ComponentKind, bytes: &[u8]) -> SchemaResult<()> {
        let entry = self.get(kind).ok_or(SchemaError::UnknownKind { kind })?;
        (entry.validate)(bytes).map_err(|source| SchemaError::InvalidPayload { kind, source })
    }

    /// Debug rendering of a payload, used by inspection tooling.
    pub fn describe(&self, kind: ComponentKind, bytes: &[u8]) -> SchemaResult<String> {
        let entry = self.get(kind).ok_or(SchemaError::UnknownKind { kind })?;
        (entry.describe)(bytes).map_err(|source| SchemaError::InvalidPayload { kind, source })
    }

    /// Deterministic hash of the registered layout; see [`crate::schema_hash`].
    #[must_use]
    pub fn hash(&self) -> u64 {
        crate::schema_hash(self)
    }
}

#[cfg(test)]
mod tests {
    use bytestream::{ByteReader, ByteWriter, StreamError};

    use super::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Hull {
        integrity: u32,
    }

    impl Component for Hull {
        const KIND: ComponentKind = ComponentKind::from_const(2);
        const NAME: &'static str = "Hull";

        fn encode(&self, out: &mut ByteWriter) {
            out.write_u32(self.integrity);
        }

        fn decode(reader: &mut ByteReader<'_>) -> StreamResult<Self> {
            Ok(Self {
                integrity: reader.read_u32()?,
            })
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Shield;

    impl Component for Shield {
        const KIND: ComponentKind = ComponentKind::from_const(2);
        const NAME: &'static str = "Shield";

        fn encode(&self, _out: &mut ByteWriter) {}

        fn decode(_reader: &mut ByteReader<'_>) -> StreamResult<Self> {
            Ok(Self)
        }
    }

    #[test]
    fn register_and_lookup() {
        let registry = ComponentRegistry::new().with::<Hull>().unwrap();
        let entry = registry.get(Hull::KIND).unwrap();
        assert_eq!(entry.name, "Hull");
        assert!(registry.contains(Hull::KIND));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_kind_rejected() {
        let err = ComponentRegistry::new()
            .with::<Hull>()
            .unwrap()
            .with::<Shield>()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateKind {
                kind: Hull::KIND,
                existing: "Hull"
            }
        );
    }

    #[test]
    fn default_detection() {
        let registry = ComponentRegistry::new().with::<Hull>().unwrap();
        assert!(registry.is_default(Hull::KIND, &[0, 0, 0, 0]));
        assert!(!registry.is_default(Hull::KIND, &[1, 0, 0, 0]));
        assert!(!registry.is_default(Hull::KIND, &[0, 0]));
        assert_eq!(registry.default_payload(Hull::KIND).unwrap(), vec![0; 4]);
    }

    #[test]
    fn validate_rejects_trailing_bytes() {
        let registry = ComponentRegistry::new().with::<Hull>().unwrap();
        let err = registry.validate(Hull::KIND, &[1, 0, 0, 0, 9]).unwrap_err();
        assert_eq!(
            err,
            SchemaError::InvalidPayload {
                kind: Hull::KIND,
                source: StreamError::TrailingBytes { remaining: 1 }
            }
        );
    }

    #[test]
    fn unknown_kind_errors() {
        let registry = ComponentRegistry::new();
        let kind = ComponentKind::new(9).unwrap();
        assert!(!registry.is_default(kind, &[]));
        assert_eq!(
            registry.default_payload(kind).unwrap_err(),
            SchemaError::UnknownKind { kind }
        );
    }

    #[test]
    fn describe_uses_debug() {
        let registry = ComponentRegistry::new().with::<Hull>().unwrap();
        let text = registry.describe(Hull::KIND, &[7, 0, 0, 0]).unwrap();
        assert_eq!(text, "Hull { integrity: 7 }");
    }
}
