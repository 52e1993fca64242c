//! Delta computation and application.

use schema::ComponentMask;

use crate::error::{CodecError, CodecResult};
use crate::{EntityId, EntityState, Snapshot, Tick};

/// Component-level changes to an entity present in both snapshots.
///
/// `changed` holds the new payload of every added or modified component;
/// `removed` names components the entity no longer has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityUpdate {
    pub id: EntityId,
    pub changed: EntityState,
    pub removed: ComponentMask,
}

impl EntityUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

/// The difference between a baseline snapshot and a current snapshot.
///
/// Each list is sorted by entity id after [`diff`]; fragments reassembled by
/// [`DeltaMessage::merge`] are re-sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaMessage {
    pub base_tick: Tick,
    pub current_tick: Tick,
    pub created: Vec<(EntityId, EntityState)>,
    pub updated: Vec<EntityUpdate>,
    pub removed: Vec<EntityId>,
}

impl DeltaMessage {
    /// A delta with no changes.
    #[must_use]
    pub const fn empty(base_tick: Tick, current_tick: Tick) -> Self {
        Self {
            base_tick,
            current_tick,
            created: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Number of entity-level entries.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.created.len() + self.updated.len() + self.removed.len()
    }

    /// Absorbs the entries of another fragment of the same tick.
    pub fn merge(&mut self, other: Self) {
        self.created.extend(other.created);
        self.updated.extend(other.updated);
        self.removed.extend(other.removed);
        self.created.sort_by_key(|(id, _)| *id);
        self.updated.sort_by_key(|update| update.id);
        self.removed.sort_unstable();
    }

    /// Turns a full-snapshot body into a snapshot.
    ///
    /// Fails if the body carries removals, updates, or duplicate entities.
    pub fn into_snapshot(self) -> CodecResult<Snapshot> {
        if !self.removed.is_empty() || !self.updated.is_empty() {
            return Err(CodecError::InvalidFullSnapshot {
                removed: self.removed.len(),
                updated: self.updated.len(),
            });
        }
        let mut snapshot = Snapshot::empty(self.current_tick);
        for (id, state) in self.created {
            if snapshot.insert(id, state)?.is_some() {
                return Err(CodecError::EntityAlreadyExists { entity: id });
            }
        }
        Ok(snapshot)
    }

    /// A full-snapshot body for `snapshot`: every entity as a creation.
    #[must_use]
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            base_tick: Tick::ZERO,
            current_tick: snapshot.tick(),
            created: snapshot
                .iter()
                .map(|(id, state)| (id, state.clone()))
                .collect(),
            updated: Vec::new(),
            removed: Vec::new(),
        }
    }
}

/// Computes the changes that turn `base` into `current`.
///
/// Components whose payload bytes are identical are omitted, and entities
/// with no changes do not appear at all.
#[must_use]
pub fn diff(base: &Snapshot, current: &Snapshot) -> DeltaMessage {
    let mut delta = DeltaMessage::empty(base.tick(), current.tick());

    for (id, state) in current.iter() {
        let Some(previous) = base.entity(id) else {
            delta.created.push((id, state.clone()));
            continue;
        };

        let mut changed = EntityState::new();
        for (kind, payload) in state.iter() {
            if previous.get(kind) != Some(payload) {
                changed.insert(kind, payload.to_vec());
            }
        }
        let update = EntityUpdate {
            id,
            changed,
            removed: previous.mask().difference(state.mask()),
        };
        if !update.is_empty() {
            delta.updated.push(update);
        }
    }

    delta.removed = base.ids().filter(|id| !current.contains(*id)).collect();
    delta
}

/// Applies `delta` to `local`, producing the snapshot at `delta.current_tick`.
///
/// `local` is not modified.
///
/// # Errors
///
/// [`CodecError::StaleBaseline`] if `delta.base_tick` is not `local`'s tick;
/// structural errors if the delta does not fit the snapshot.
pub fn apply(local: &Snapshot, delta: &DeltaMessage) -> CodecResult<Snapshot> {
    if delta.base_tick != local.tick() {
        return Err(CodecError::StaleBaseline {
            expected: local.tick(),
            found: delta.base_tick,
        });
    }

    let mut next = local.clone();
    next.set_tick(delta.current_tick);

    for id in &delta.removed {
        next.remove(*id)
            .ok_or(CodecError::EntityNotFound { entity: *id })?;
    }

    for (id, state) in &delta.created {
        if next.contains(*id) {
            return Err(CodecError::EntityAlreadyExists { entity: *id });
        }
        next.insert(*id, state.clone())?;
    }

    for update in &delta.updated {
        let entity = next
            .entity_mut(update.id)
            .ok_or(CodecError::EntityNotFound { entity: update.id })?;
        for kind in update.removed {
            entity.remove(kind);
        }
        for (kind, payload) in update.changed.iter() {
            entity.insert(kind, payload.to_vec());
        }
        if entity.is_empty() {
            return Err(CodecError::EmptyMask { entity: update.id });
        }
    }

    Ok(next)
}
