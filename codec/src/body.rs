//! Snapshot and delta message bodies, including fragment packing.
//!
//! Body layout, shared by full snapshots and deltas:
//!
//! ```text
//! removed_count varu32 | id u32 ...
//! created_count varu32 | entity ...
//! updated_count varu32 | update ...
//!
//! entity := id u32 | mask u64 | payload per mask bit (ascending kind)
//! update := id u32 | removed_mask u64 | changed_mask u64 | payload per changed bit
//! payload := len varu32 | bytes      (len 0 = registry default)
//! ```
//!
//! Ids within each section are strictly increasing. A full snapshot only
//! uses the created section and carries `base_tick = 0`.

use bytestream::{ByteReader, ByteWriter};
use schema::{ComponentMask, ComponentRegistry};
use wire::{encode_message, MessageHeader, MessageKind, WireMessage, HEADER_SIZE};

use crate::error::{CodecError, CodecResult, LimitKind};
use crate::{CodecLimits, DeltaMessage, EntityId, EntityState, EntityUpdate, Snapshot, Tick};

/// Worst-case bytes taken by the three section counts.
const SECTION_COUNTS_OVERHEAD: usize = 3 * 5;

/// One entity-level entry queued for packing.
#[derive(Debug, Clone, Copy)]
pub enum DeltaItem<'a> {
    Removed(EntityId),
    Created(EntityId, &'a EntityState),
    Updated(&'a EntityUpdate),
}

impl DeltaItem<'_> {
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        match self {
            Self::Removed(id) | Self::Created(id, _) => *id,
            Self::Updated(update) => update.id,
        }
    }

    const fn section(&self) -> usize {
        match self {
            Self::Removed(_) => 0,
            Self::Created(..) => 1,
            Self::Updated(_) => 2,
        }
    }

    fn encode(&self, registry: &ComponentRegistry) -> Vec<u8> {
        let mut out = ByteWriter::new();
        match self {
            Self::Removed(id) => out.write_u32(id.raw()),
            Self::Created(id, state) => {
                out.write_u32(id.raw());
                out.write_u64(state.mask().bits());
                write_payloads(&mut out, state, registry);
            }
            Self::Updated(update) => {
                out.write_u32(update.id.raw());
                out.write_u64(update.removed.bits());
                out.write_u64(update.changed.mask().bits());
                write_payloads(&mut out, &update.changed, registry);
            }
        }
        out.finish()
    }
}

/// Entries of `delta` in its natural order: removals, creations, updates.
#[must_use]
pub fn delta_items(delta: &DeltaMessage) -> Vec<DeltaItem<'_>> {
    delta
        .removed
        .iter()
        .map(|id| DeltaItem::Removed(*id))
        .chain(delta.created.iter().map(|(id, state)| DeltaItem::Created(*id, state)))
        .chain(delta.updated.iter().map(DeltaItem::Updated))
        .collect()
}

fn write_payloads(out: &mut ByteWriter, state: &EntityState, registry: &ComponentRegistry) {
    for (kind, payload) in state.iter() {
        if registry.is_default(kind, payload) {
            out.write_varu32(0);
        } else {
            out.write_len_prefixed(payload);
        }
    }
}

/// Which snapshot message a set of fragments belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentTarget {
    Full { tick: Tick },
    Delta { tick: Tick, base_tick: Tick },
}

impl FragmentTarget {
    const fn header(self, index: u16, count: u16) -> MessageHeader {
        match self {
            Self::Full { tick } => MessageHeader::full_snapshot(tick.raw(), index, count),
            Self::Delta { tick, base_tick } => {
                MessageHeader::delta(tick.raw(), base_tick.raw(), index, count)
            }
        }
    }
}

#[derive(Default)]
struct FragmentBuilder {
    sections: [Vec<(EntityId, Vec<u8>)>; 3],
    bytes: usize,
}

impl FragmentBuilder {
    fn is_empty(&self) -> bool {
        self.sections.iter().all(Vec::is_empty)
    }

    fn push(&mut self, section: usize, id: EntityId, bytes: Vec<u8>) {
        self.bytes += bytes.len();
        self.sections[section].push((id, bytes));
    }

    fn finish(mut self) -> Vec<u8> {
        let mut out = ByteWriter::with_capacity(self.bytes + SECTION_COUNTS_OVERHEAD);
        for section in &mut self.sections {
            section.sort_by_key(|(id, _)| *id);
            out.write_varu32(u32::try_from(section.len()).unwrap_or(u32::MAX));
            for (_, bytes) in section.iter() {
                out.write_bytes(bytes);
            }
        }
        out.finish()
    }
}

/// Packs `items` into framed messages of at most `max_message_bytes` each.
///
/// Items are placed in the order given, so callers put the most important
/// entries first. An item larger than the budget gets a fragment to itself.
/// An empty item list still yields one (empty) message.
///
/// # Errors
///
/// [`CodecError::LimitsExceeded`] if more than `max_fragments` are needed.
pub fn encode_fragments<'a>(
    target: FragmentTarget,
    items: impl IntoIterator<Item = DeltaItem<'a>>,
    registry: &ComponentRegistry,
    max_message_bytes: usize,
    max_fragments: u16,
) -> CodecResult<Vec<Vec<u8>>> {
    let budget = max_message_bytes.saturating_sub(HEADER_SIZE + SECTION_COUNTS_OVERHEAD);
    let mut bodies = Vec::new();
    let mut current = FragmentBuilder::default();

    for item in items {
        let bytes = item.encode(registry);
        if !current.is_empty() && current.bytes + bytes.len() > budget {
            bodies.push(std::mem::take(&mut current).finish());
        }
        current.push(item.section(), item.entity(), bytes);
    }
    bodies.push(current.finish());

    let count = u16::try_from(bodies.len())
        .ok()
        .filter(|count| *count <= max_fragments)
        .ok_or(CodecError::LimitsExceeded {
            kind: LimitKind::Fragments,
            limit: usize::from(max_fragments),
            actual: bodies.len(),
        })?;

    Ok(bodies
        .iter()
        .zip(0u16..)
        .map(|(body, index)| encode_message(&target.header(index, count), body))
        .collect())
}

/// Encodes `snapshot` as a single full-snapshot message.
#[must_use]
pub fn encode_full_snapshot(snapshot: &Snapshot, registry: &ComponentRegistry) -> Vec<u8> {
    let items = snapshot
        .iter()
        .map(|(id, state)| DeltaItem::Created(id, state));
    single_message(FragmentTarget::Full { tick: snapshot.tick() }, items, registry)
}

/// Encodes `delta` as a single delta message.
#[must_use]
pub fn encode_delta(delta: &DeltaMessage, registry: &ComponentRegistry) -> Vec<u8> {
    let target = FragmentTarget::Delta {
        tick: delta.current_tick,
        base_tick: delta.base_tick,
    };
    single_message(target, delta_items(delta), registry)
}

fn single_message<'a>(
    target: FragmentTarget,
    items: impl IntoIterator<Item = DeltaItem<'a>>,
    registry: &ComponentRegistry,
) -> Vec<u8> {
    let mut builder = FragmentBuilder::default();
    for item in items {
        builder.push(item.section(), item.entity(), item.encode(registry));
    }
    encode_message(&target.header(0, 1), &builder.finish())
}

/// One decoded fragment of a full snapshot or delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFragment {
    pub full: bool,
    pub index: u16,
    pub count: u16,
    /// Entries of this fragment; a full snapshot only has creations.
    pub changes: DeltaMessage,
}

/// Decodes a full-snapshot or delta message body.
///
/// Payloads of component kinds missing from `registry` are skipped, and an
/// entity left with no known components is dropped.
pub fn decode_snapshot_fragment(
    message: &WireMessage<'_>,
    registry: &ComponentRegistry,
    limits: &CodecLimits,
) -> CodecResult<SnapshotFragment> {
    let header = message.header;
    let full = match header.kind {
        MessageKind::FullSnapshot => true,
        MessageKind::Delta => false,
        found => {
            return Err(CodecError::UnexpectedKind {
                expected: MessageKind::Delta,
                found,
            })
        }
    };

    let mut reader = ByteReader::new(message.body);
    let mut changes = DeltaMessage::empty(Tick::new(header.base_tick), Tick::new(header.tick));
    let mut budget = limits.max_entities_per_message;

    let removed = read_count(&mut reader, &mut budget, limits)?;
    let mut order = OrderCheck::default();
    for _ in 0..removed {
        let id = EntityId::new(reader.read_u32()?);
        order.check(id)?;
        changes.removed.push(id);
    }

    let created = read_count(&mut reader, &mut budget, limits)?;
    let mut order = OrderCheck::default();
    for _ in 0..created {
        let id = EntityId::new(reader.read_u32()?);
        order.check(id)?;
        let mask = ComponentMask::from_bits(reader.read_u64()?);
        let state = read_payloads(&mut reader, id, mask, registry, limits)?;
        if !state.is_empty() {
            changes.created.push((id, state));
        }
    }

    let updated = read_count(&mut reader, &mut budget, limits)?;
    let mut order = OrderCheck::default();
    for _ in 0..updated {
        let id = EntityId::new(reader.read_u32()?);
        order.check(id)?;
        let removed = ComponentMask::from_bits(reader.read_u64()?).intersection(registry.kinds());
        let changed_mask = ComponentMask::from_bits(reader.read_u64()?);
        let changed = read_payloads(&mut reader, id, changed_mask, registry, limits)?;
        let update = EntityUpdate { id, changed, removed };
        if !update.is_empty() {
            changes.updated.push(update);
        }
    }

    reader.finish()?;
    Ok(SnapshotFragment {
        full,
        index: header.fragment_index,
        count: header.fragment_count,
        changes,
    })
}

/// Decodes a single-fragment full snapshot.
pub fn decode_full_snapshot(
    message: &WireMessage<'_>,
    registry: &ComponentRegistry,
    limits: &CodecLimits,
) -> CodecResult<Snapshot> {
    expect_kind(message, MessageKind::FullSnapshot)?;
    expect_single(message)?;
    decode_snapshot_fragment(message, registry, limits)?
        .changes
        .into_snapshot()
}

/// Decodes a single-fragment delta.
pub fn decode_delta(
    message: &WireMessage<'_>,
    registry: &ComponentRegistry,
    limits: &CodecLimits,
) -> CodecResult<DeltaMessage> {
    expect_kind(message, MessageKind::Delta)?;
    expect_single(message)?;
    Ok(decode_snapshot_fragment(message, registry, limits)?.changes)
}

fn expect_single(message: &WireMessage<'_>) -> CodecResult<()> {
    if message.header.is_fragmented() {
        Err(CodecError::Fragmented {
            index: message.header.fragment_index,
            count: message.header.fragment_count,
        })
    } else {
        Ok(())
    }
}

pub(crate) fn expect_kind(message: &WireMessage<'_>, expected: MessageKind) -> CodecResult<()> {
    if message.kind() == expected {
        Ok(())
    } else {
        Err(CodecError::UnexpectedKind {
            expected,
            found: message.kind(),
        })
    }
}

fn read_count(
    reader: &mut ByteReader<'_>,
    budget: &mut usize,
    limits: &CodecLimits,
) -> CodecResult<usize> {
    let count = reader.read_varu32()? as usize;
    if count > *budget {
        return Err(CodecError::LimitsExceeded {
            kind: LimitKind::EntitiesPerMessage,
            limit: limits.max_entities_per_message,
            actual: count,
        });
    }
    *budget -= count;
    Ok(count)
}

fn read_payloads(
    reader: &mut ByteReader<'_>,
    entity: EntityId,
    mask: ComponentMask,
    registry: &ComponentRegistry,
    limits: &CodecLimits,
) -> CodecResult<EntityState> {
    let mut state = EntityState::new();
    for kind in mask {
        let payload = reader.read_len_prefixed(limits.max_payload_bytes)?;
        if !registry.contains(kind) {
            continue;
        }
        let bytes = if payload.is_empty() {
            registry.default_payload(kind)
        } else {
            registry.validate(kind, payload).map(|()| payload.to_vec())
        }
        .map_err(|source| CodecError::InvalidPayload {
            entity,
            kind,
            source,
        })?;
        state.insert(kind, bytes);
    }
    Ok(state)
}

#[derive(Default)]
struct OrderCheck {
    previous: Option<EntityId>,
}

impl OrderCheck {
    fn check(&mut self, current: EntityId) -> CodecResult<()> {
        if let Some(previous) = self.previous {
            if current <= previous {
                return Err(CodecError::InvalidEntityOrder { previous, current });
            }
        }
        self.previous = Some(current);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytestream::StreamResult;
    use schema::{Component, ComponentKind};
    use wire::{decode_message, WireLimits};

    use super::*;
    use crate::{apply, diff};

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Pos {
        x: i32,
        y: i32,
    }

    impl Component for Pos {
        const KIND: ComponentKind = ComponentKind::from_const(0);
        const NAME: &'static str = "Pos";

        fn encode(&self, out: &mut ByteWriter) {
            out.write_i32(self.x);
            out.write_i32(self.y);
        }

        fn decode(reader: &mut ByteReader<'_>) -> StreamResult<Self> {
            Ok(Self {
                x: reader.read_i32()?,
                y: reader.read_i32()?,
            })
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Tag;

    impl Component for Tag {
        const KIND: ComponentKind = ComponentKind::from_const(5);
        const NAME: &'static str = "Tag";

        fn encode(&self, _out: &mut ByteWriter) {}

        fn decode(_reader: &mut ByteReader<'_>) -> StreamResult<Self> {
            Ok(Self)
        }
    }

    fn registry() -> ComponentRegistry {
        ComponentRegistry::new()
            .with::<Pos>()
            .unwrap()
            .with::<Tag>()
            .unwrap()
    }

    fn entity(x: i32) -> EntityState {
        EntityState::new().with(&Pos { x, y: -x }).with(&Tag)
    }

    fn world(tick: u32, xs: &[(u32, i32)]) -> Snapshot {
        let mut snapshot = Snapshot::empty(Tick::new(tick));
        for (id, x) in xs {
            snapshot.insert(EntityId::new(*id), entity(*x)).unwrap();
        }
        snapshot
    }

    fn decode(bytes: &[u8]) -> SnapshotFragment {
        let message = decode_message(bytes, &WireLimits::default()).unwrap();
        decode_snapshot_fragment(&message, &registry(), &CodecLimits::default()).unwrap()
    }

    #[test]
    fn full_snapshot_roundtrip() {
        let snapshot = world(9, &[(1, 0), (2, 5), (7, -3)]);
        let bytes = encode_full_snapshot(&snapshot, &registry());
        let message = decode_message(&bytes, &WireLimits::default()).unwrap();
        let decoded = decode_full_snapshot(&message, &registry(), &CodecLimits::default()).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn default_payload_is_omitted() {
        let snapshot = world(1, &[(1, 0)]);
        let bytes = encode_full_snapshot(&snapshot, &registry());
        // header + 3 counts + id + mask + two zero-length payloads
        assert_eq!(bytes.len(), HEADER_SIZE + 3 + 4 + 8 + 2);
    }

    #[test]
    fn delta_roundtrip_applies() {
        let base = world(3, &[(1, 0), (2, 5)]);
        let current = world(4, &[(2, 6), (3, 1)]);
        let delta = diff(&base, &current);
        let decoded = decode(&encode_delta(&delta, &registry())).changes;
        assert_eq!(decoded, delta);
        assert_eq!(apply(&base, &decoded).unwrap(), current);
    }

    #[test]
    fn unknown_component_kinds_are_skipped() {
        let mut extra = entity(4);
        let unknown = ComponentKind::new(30).unwrap();
        extra.insert(unknown, vec![1, 2, 3]);
        let mut only_unknown = EntityState::new();
        only_unknown.insert(unknown, vec![9]);

        let mut snapshot = Snapshot::empty(Tick::new(2));
        snapshot.insert(EntityId::new(1), extra).unwrap();
        snapshot.insert(EntityId::new(2), only_unknown).unwrap();

        let fragment = decode(&encode_full_snapshot(&snapshot, &registry()));
        let decoded = fragment.changes.into_snapshot().unwrap();
        assert_eq!(decoded.len(), 1, "entity with only unknown kinds is dropped");
        let state = decoded.entity(EntityId::new(1)).unwrap();
        assert!(!state.contains(unknown));
        assert_eq!(state.component::<Pos>(), Some(Pos { x: 4, y: -4 }));
    }

    #[test]
    fn invalid_payload_rejected() {
        let mut bad = EntityState::new();
        bad.insert(Pos::KIND, vec![1, 2, 3]);
        let mut snapshot = Snapshot::empty(Tick::new(1));
        snapshot.insert(EntityId::new(1), bad).unwrap();
        let bytes = encode_full_snapshot(&snapshot, &registry());
        let message = decode_message(&bytes, &WireLimits::default()).unwrap();
        let err = decode_snapshot_fragment(&message, &registry(), &CodecLimits::default())
            .unwrap_err();
        assert!(matches!(err, CodecError::InvalidPayload { .. }));
    }

    #[test]
    fn fragments_respect_budget_and_reassemble() {
        let base = Snapshot::empty(Tick::ZERO);
        let entries: Vec<(u32, i32)> = (1..=40).map(|id| (id, id as i32)).collect();
        let current = world(1, &entries);
        let delta = diff(&base, &current);

        let fragments = encode_fragments(
            FragmentTarget::Delta {
                tick: Tick::new(1),
                base_tick: Tick::ZERO,
            },
            delta_items(&delta),
            &registry(),
            128,
            64,
        )
        .unwrap();
        assert!(fragments.len() > 1);

        let mut merged: Option<DeltaMessage> = None;
        for (index, bytes) in fragments.iter().enumerate() {
            assert!(bytes.len() <= 128);
            let fragment = decode(bytes);
            assert_eq!(usize::from(fragment.index), index);
            assert_eq!(usize::from(fragment.count), fragments.len());
            match merged.as_mut() {
                Some(all) => all.merge(fragment.changes),
                None => merged = Some(fragment.changes),
            }
        }
        assert_eq!(apply(&base, &merged.unwrap()).unwrap(), current);
    }

    #[test]
    fn empty_delta_still_produces_a_message() {
        let delta = DeltaMessage::empty(Tick::new(4), Tick::new(5));
        let fragments = encode_fragments(
            FragmentTarget::Delta {
                tick: Tick::new(5),
                base_tick: Tick::new(4),
            },
            delta_items(&delta),
            &registry(),
            1200,
            4,
        )
        .unwrap();
        assert_eq!(fragments.len(), 1);
        assert!(decode(&fragments[0]).changes.is_empty());
    }

    #[test]
    fn too_many_fragments_rejected() {
        let current = world(1, &(1..=50).map(|id| (id, 1)).collect::<Vec<_>>());
        let delta = diff(&Snapshot::empty(Tick::ZERO), &current);
        let err = encode_fragments(
            FragmentTarget::Full { tick: Tick::new(1) },
            delta_items(&delta),
            &registry(),
            HEADER_SIZE + 32,
            2,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CodecError::LimitsExceeded {
                kind: LimitKind::Fragments,
                ..
            }
        ));
    }

    #[test]
    fn unsorted_ids_rejected() {
        let mut writer = ByteWriter::new();
        writer.write_varu32(2);
        writer.write_u32(5);
        writer.write_u32(3);
        writer.write_varu32(0);
        writer.write_varu32(0);
        let bytes = encode_message(&MessageHeader::delta(2, 1, 0, 1), writer.as_slice());
        let message = decode_message(&bytes, &WireLimits::default()).unwrap();
        let err = decode_snapshot_fragment(&message, &registry(), &CodecLimits::default())
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::InvalidEntityOrder {
                previous: EntityId::new(5),
                current: EntityId::new(3)
            }
        );
    }

    #[test]
    fn entity_count_limit_enforced() {
        let current = world(1, &(1..=10).map(|id| (id, 1)).collect::<Vec<_>>());
        let bytes = encode_full_snapshot(&current, &registry());
        let message = decode_message(&bytes, &WireLimits::default()).unwrap();
        let limits = CodecLimits {
            max_entities_per_message: 4,
            ..CodecLimits::default()
        };
        assert!(matches!(
            decode_snapshot_fragment(&message, &registry(), &limits),
            Err(CodecError::LimitsExceeded {
                kind: LimitKind::EntitiesPerMessage,
                ..
            })
        ));
    }

    #[test]
    fn truncated_body_rejected() {
        let bytes = encode_full_snapshot(&world(1, &[(1, 3)]), &registry());
        let message = decode_message(&bytes[..bytes.len() - 2], &WireLimits::default()).unwrap();
        assert!(matches!(
            decode_snapshot_fragment(&message, &registry(), &CodecLimits::default()),
            Err(CodecError::Stream(_))
        ));
    }
}
