//! Component kinds and component masks.

use std::fmt;

use crate::error::{SchemaError, SchemaResult};

/// Number of distinct component kinds a [`ComponentMask`] can hold.
pub const MAX_COMPONENT_KINDS: usize = 64;

/// Identifier of a replicated component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComponentKind(u8);

impl ComponentKind {
    /// Creates a kind if `raw` fits in a component mask.
    #[must_use]
    pub const fn new(raw: u8) -> Option<Self> {
        if (raw as usize) < MAX_COMPONENT_KINDS {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Creates a kind in a const context.
    ///
    /// # Panics
    ///
    /// Panics if `raw` is not below [`MAX_COMPONENT_KINDS`]. In a `const`
    /// item this is a compile error.
    #[must_use]
    pub const fn from_const(raw: u8) -> Self {
        assert!((raw as usize) < MAX_COMPONENT_KINDS, "component kind out of range");
        Self(raw)
    }

    /// Validating conversion from a wire byte.
    pub const fn try_from_raw(raw: u8) -> SchemaResult<Self> {
        match Self::new(raw) {
            Some(kind) => Ok(kind),
            None => Err(SchemaError::KindOutOfRange {
                raw,
                max: (MAX_COMPONENT_KINDS - 1) as u8,
            }),
        }
    }

    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    const fn bit(self) -> u64 {
        1u64 << self.0
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed 64-bit set of component kinds present on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComponentMask(u64);

impl ComponentMask {
    pub const EMPTY: Self = Self(0);

    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of kinds in the mask.
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    #[must_use]
    pub const fn contains(self, kind: ComponentKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Adds `kind`; returns `true` if it was not already present.
    pub fn insert(&mut self, kind: ComponentKind) -> bool {
        let added = !self.contains(kind);
        self.0 |= kind.bit();
        added
    }

    /// Removes `kind`; returns `true` if it was present.
    pub fn remove(&mut self, kind: ComponentKind) -> bool {
        let removed = self.contains(kind);
        self.0 &= !kind.bit();
        removed
    }

    #[must_use]
    pub const fn with(self, kind: ComponentKind) -> Self {
        Self(self.0 | kind.bit())
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Kinds in `self` that are not in `other`.
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Iterates kinds in ascending order.
    pub fn iter(self) -> MaskIter {
        MaskIter { bits: self.0 }
    }
}

impl FromIterator<ComponentKind> for ComponentMask {
    fn from_iter<I: IntoIterator<Item = ComponentKind>>(iter: I) -> Self {
        let mut mask = Self::EMPTY;
        for kind in iter {
            mask.insert(kind);
        }
        mask
    }
}

impl IntoIterator for ComponentMask {
    type Item = ComponentKind;
    type IntoIter = MaskIter;

    fn into_iter(self) -> MaskIter {
        self.iter()
    }
}

impl fmt::Display for ComponentMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, kind) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{kind}")?;
        }
        f.write_str("}")
    }
}

/// Ascending iterator over the kinds of a [`ComponentMask`].
#[derive(Debug, Clone)]
pub struct MaskIter {
    bits: u64,
}

impl Iterator for MaskIter {
    type Item = ComponentKind;

    fn next(&mut self) -> Option<ComponentKind> {
        if self.bits == 0 {
            return None;
        }
        let index = self.bits.trailing_zeros() as u8;
        self.bits &= self.bits - 1;
        Some(ComponentKind(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.bits.count_ones() as usize;
        (len, Some(len))
    }
}

impl ExactSizeIterator for MaskIter {}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(raw: u8) -> ComponentKind {
        ComponentKind::new(raw).unwrap()
    }

    #[test]
    fn kind_range() {
        assert!(ComponentKind::new(63).is_some());
        assert!(ComponentKind::new(64).is_none());
        assert_eq!(
            ComponentKind::try_from_raw(200).unwrap_err(),
            SchemaError::KindOutOfRange { raw: 200, max: 63 }
        );
    }

    #[test]
    fn mask_insert_remove() {
        let mut mask = ComponentMask::EMPTY;
        assert!(mask.insert(kind(3)));
        assert!(!mask.insert(kind(3)));
        assert!(mask.contains(kind(3)));
        assert_eq!(mask.len(), 1);
        assert!(mask.remove(kind(3)));
        assert!(!mask.remove(kind(3)));
        assert!(mask.is_empty());
    }

    #[test]
    fn mask_iterates_ascending() {
        let mask: ComponentMask = [kind(40), kind(0), kind(63), kind(7)].into_iter().collect();
        let raws: Vec<u8> = mask.iter().map(ComponentKind::raw).collect();
        assert_eq!(raws, vec![0, 7, 40, 63]);
        assert_eq!(mask.iter().len(), 4);
    }

    #[test]
    fn mask_set_operations() {
        let a = ComponentMask::EMPTY.with(kind(1)).with(kind(2));
        let b = ComponentMask::EMPTY.with(kind(2)).with(kind(3));
        assert_eq!(a.union(b).len(), 3);
        assert_eq!(a.intersection(b), ComponentMask::EMPTY.with(kind(2)));
        assert_eq!(a.difference(b), ComponentMask::EMPTY.with(kind(1)));
    }

    #[test]
    fn mask_display() {
        let mask = ComponentMask::EMPTY.with(kind(5)).with(kind(1));
        assert_eq!(mask.to_string(), "{1,5}");
    }
}
