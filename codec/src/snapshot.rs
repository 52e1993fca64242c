//! Snapshots of replicated world state and the ECS boundary traits.

use std::collections::BTreeMap;

use schema::{Component, ComponentKind, ComponentMask};

use crate::error::{CodecError, CodecResult};
use crate::{EntityId, Tick};

/// Component payloads of one entity.
///
/// The mask and the set of payload keys always agree: every mutation goes
/// through [`insert`](Self::insert) / [`remove`](Self::remove).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntityState {
    mask: ComponentMask,
    payloads: BTreeMap<ComponentKind, Vec<u8>>,
}

impl EntityState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn mask(&self) -> ComponentMask {
        self.mask
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    #[must_use]
    pub const fn contains(&self, kind: ComponentKind) -> bool {
        self.mask.contains(kind)
    }

    #[must_use]
    pub fn get(&self, kind: ComponentKind) -> Option<&[u8]> {
        self.payloads.get(&kind).map(Vec::as_slice)
    }

    /// Sets the payload for `kind`, returning the previous one.
    pub fn insert(&mut self, kind: ComponentKind, payload: Vec<u8>) -> Option<Vec<u8>> {
        self.mask.insert(kind);
        self.payloads.insert(kind, payload)
    }

    pub fn remove(&mut self, kind: ComponentKind) -> Option<Vec<u8>> {
        self.mask.remove(kind);
        self.payloads.remove(&kind)
    }

    /// Payloads in ascending kind order.
    pub fn iter(&self) -> impl Iterator<Item = (ComponentKind, &[u8])> + '_ {
        self.payloads
            .iter()
            .map(|(kind, payload)| (*kind, payload.as_slice()))
    }

    /// Decodes a typed component. Absent or undecodable payloads yield `None`.
    #[must_use]
    pub fn component<T: Component>(&self) -> Option<T> {
        self.get(T::KIND)
            .and_then(|bytes| T::from_payload(bytes).ok())
    }

    /// Encodes and stores a typed component.
    pub fn set_component<T: Component>(&mut self, value: &T) {
        self.insert(T::KIND, value.to_payload());
    }

    /// Builder form of [`set_component`](Self::set_component).
    #[must_use]
    pub fn with<T: Component>(mut self, value: &T) -> Self {
        self.set_component(value);
        self
    }
}

/// The replicated state of every entity at one tick.
///
/// Entities are kept sorted by id, so iteration and extraction are
/// deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    tick: Tick,
    entities: BTreeMap<EntityId, EntityState>,
}

impl Snapshot {
    /// An empty snapshot at `tick`.
    #[must_use]
    pub const fn empty(tick: Tick) -> Self {
        Self {
            tick,
            entities: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    pub fn set_tick(&mut self, tick: Tick) {
        self.tick = tick;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&EntityState> {
        self.entities.get(&id)
    }

    /// Mutable access for prediction code.
    ///
    /// Callers must leave at least one component on the entity; use
    /// [`remove`](Self::remove) to delete it instead.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut EntityState> {
        self.entities.get_mut(&id)
    }

    /// Inserts or replaces an entity. Empty states are rejected.
    pub fn insert(&mut self, id: EntityId, state: EntityState) -> CodecResult<Option<EntityState>> {
        if state.is_empty() {
            return Err(CodecError::EmptyMask { entity: id });
        }
        Ok(self.entities.insert(id, state))
    }

    pub fn remove(&mut self, id: EntityId) -> Option<EntityState> {
        self.entities.remove(&id)
    }

    /// Entities in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &EntityState)> + '_ {
        self.entities.iter().map(|(id, state)| (*id, state))
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    /// Finds the first entity carrying a component equal to `value`.
    #[must_use]
    pub fn find<T: Component>(&self, value: &T) -> Option<EntityId> {
        let payload = value.to_payload();
        self.iter()
            .find(|(_, state)| state.get(T::KIND) == Some(payload.as_slice()))
            .map(|(id, _)| id)
    }
}

/// Read side of the ECS boundary.
pub trait WorldView {
    /// Every live entity id, in any order.
    fn entity_ids(&self) -> Vec<EntityId>;

    /// Writes the replicated components of `id` into `out`.
    fn write_entity(&self, id: EntityId, out: &mut EntityState);
}

/// Write side of the ECS boundary.
pub trait WorldMut: WorldView {
    fn spawn(&mut self, id: EntityId);

    fn despawn(&mut self, id: EntityId);

    fn set_component(
        &mut self,
        id: EntityId,
        kind: ComponentKind,
        payload: &[u8],
    ) -> CodecResult<()>;

    fn remove_component(&mut self, id: EntityId, kind: ComponentKind);
}

/// Captures the replicated state of `world` at `tick`.
///
/// Entities without any replicated component are skipped.
pub fn extract<W: WorldView + ?Sized>(world: &W, tick: Tick) -> Snapshot {
    let mut snapshot = Snapshot::empty(tick);
    for id in world.entity_ids() {
        let mut state = EntityState::new();
        world.write_entity(id, &mut state);
        if !state.is_empty() {
            snapshot.entities.insert(id, state);
        }
    }
    snapshot
}

/// Counts of ECS operations performed by [`sync_world`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub spawned: usize,
    pub despawned: usize,
    pub components_set: usize,
    pub components_removed: usize,
}

/// Makes `world` match `snapshot`, touching only what differs.
pub fn sync_world<W: WorldMut + ?Sized>(
    world: &mut W,
    snapshot: &Snapshot,
) -> CodecResult<SyncStats> {
    let mut stats = SyncStats::default();
    let existing = world.entity_ids();

    for id in &existing {
        if !snapshot.contains(*id) {
            world.despawn(*id);
            stats.despawned += 1;
        }
    }

    for (id, state) in snapshot.iter() {
        let mut current = EntityState::new();
        if existing.contains(&id) {
            world.write_entity(id, &mut current);
        } else {
            world.spawn(id);
            stats.spawned += 1;
        }

        for kind in current.mask().difference(state.mask()) {
            world.remove_component(id, kind);
            stats.components_removed += 1;
        }
        for (kind, payload) in state.iter() {
            if current.get(kind) != Some(payload) {
                world.set_component(id, kind, payload)?;
                stats.components_set += 1;
            }
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(raw: u8) -> ComponentKind {
        ComponentKind::new(raw).unwrap()
    }

    #[derive(Default)]
    struct MapWorld {
        entities: BTreeMap<EntityId, EntityState>,
    }

    impl WorldView for MapWorld {
        fn entity_ids(&self) -> Vec<EntityId> {
            self.entities.keys().rev().copied().collect()
        }

        fn write_entity(&self, id: EntityId, out: &mut EntityState) {
            if let Some(state) = self.entities.get(&id) {
                for (kind, payload) in state.iter() {
                    out.insert(kind, payload.to_vec());
                }
            }
        }
    }

    impl WorldMut for MapWorld {
        fn spawn(&mut self, id: EntityId) {
            self.entities.entry(id).or_default();
        }

        fn despawn(&mut self, id: EntityId) {
            self.entities.remove(&id);
        }

        fn set_component(
            &mut self,
            id: EntityId,
            kind: ComponentKind,
            payload: &[u8],
        ) -> CodecResult<()> {
            self.entities
                .get_mut(&id)
                .ok_or(CodecError::EntityNotFound { entity: id })?
                .insert(kind, payload.to_vec());
            Ok(())
        }

        fn remove_component(&mut self, id: EntityId, kind: ComponentKind) {
            if let Some(state) = self.entities.get_mut(&id) {
                state.remove(kind);
            }
        }
    }

    #[test]
    fn entity_state_mask_tracks_payloads() {
        let mut state = EntityState::new();
        state.insert(kind(3), vec![1]);
        state.insert(kind(1), vec![2]);
        assert_eq!(state.mask().len(), 2);
        assert_eq!(state.len(), 2);
        assert_eq!(state.remove(kind(3)), Some(vec![1]));
        assert!(!state.contains(kind(3)));
        assert_eq!(state.remove(kind(3)), None);
        let kinds: Vec<u8> = state.iter().map(|(k, _)| k.raw()).collect();
        assert_eq!(kinds, vec![1]);
    }

    #[test]
    fn snapshot_rejects_empty_entity() {
        let mut snapshot = Snapshot::empty(Tick::new(1));
        let err = snapshot.insert(EntityId::new(4), EntityState::new()).unwrap_err();
        assert_eq!(err, CodecError::EmptyMask { entity: EntityId::new(4) });
    }

    #[test]
    fn extract_is_sorted_and_skips_empty() {
        let mut world = MapWorld::default();
        let mut state = EntityState::new();
        state.insert(kind(0), vec![9]);
        world.entities.insert(EntityId::new(5), state.clone());
        world.entities.insert(EntityId::new(2), state);
        world.entities.insert(EntityId::new(3), EntityState::new());

        let snapshot = extract(&world, Tick::new(7));
        assert_eq!(snapshot.tick(), Tick::new(7));
        let ids: Vec<u32> = snapshot.ids().map(EntityId::raw).collect();
        assert_eq!(ids, vec![2, 5]);
    }

    #[test]
    fn extract_is_deterministic() {
        let mut world = MapWorld::default();
        for id in 1..10 {
            let mut state = EntityState::new();
            state.insert(kind(id as u8 % 4), vec![id as u8]);
            world.entities.insert(EntityId::new(id), state);
        }
        assert_eq!(extract(&world, Tick::new(1)), extract(&world, Tick::new(1)));
    }

    #[test]
    fn sync_world_converges() {
        let mut world = MapWorld::default();
        let mut stale = EntityState::new();
        stale.insert(kind(0), vec![1]);
        stale.insert(kind(2), vec![1]);
        world.entities.insert(EntityId::new(1), stale.clone());
        world.entities.insert(EntityId::new(9), stale);

        let mut target = Snapshot::empty(Tick::new(3));
        let mut fresh = EntityState::new();
        fresh.insert(kind(0), vec![2]);
        target.insert(EntityId::new(1), fresh.clone()).unwrap();
        target.insert(EntityId::new(4), fresh).unwrap();

        let stats = sync_world(&mut world, &target).unwrap();
        assert_eq!(stats.spawned, 1);
        assert_eq!(stats.despawned, 1);
        assert_eq!(stats.components_removed, 1);
        assert_eq!(stats.components_set, 2);

        let mut after = extract(&world, Tick::new(3));
        after.set_tick(target.tick());
        assert_eq!(after, target);

        let again = sync_world(&mut world, &target).unwrap();
        assert_eq!(again, SyncStats::default());
    }
}
