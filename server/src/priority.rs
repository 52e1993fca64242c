//! Change prioritisation: decide what goes first, not how it is encoded.
//!
//! Removals always lead. Creations and updates follow in descending score
//! of the connection's [`PriorityStrategy`], ties broken by entity id.

use std::collections::BTreeMap;
use std::fmt;

use codec::{delta_items, DeltaItem, DeltaMessage, EntityId, EntityState, Snapshot, Tick};

/// Basic 2D vector for spatial scoring.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance_sq(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Last tick each live entity was created or changed.
#[derive(Debug, Clone, Default)]
pub struct ChangeLog {
    last_changed: BTreeMap<EntityId, Tick>,
}

impl ChangeLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one tick-to-tick delta into the log.
    pub fn record(&mut self, delta: &DeltaMessage) {
        let tick = delta.current_tick;
        for id in &delta.removed {
            self.last_changed.remove(id);
        }
        for (id, _) in &delta.created {
            self.last_changed.insert(*id, tick);
        }
        for update in &delta.updated {
            self.last_changed.insert(update.id, tick);
        }
    }

    #[must_use]
    pub fn last_changed(&self, id: EntityId) -> Option<Tick> {
        self.last_changed.get(&id).copied()
    }

    /// Entities whose last change happened exactly at `tick`.
    pub fn changed_at(&self, tick: Tick) -> impl Iterator<Item = EntityId> + '_ {
        self.last_changed
            .iter()
            .filter(move |(_, changed)| **changed == tick)
            .map(|(id, _)| *id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.last_changed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_changed.is_empty()
    }

    pub fn clear(&mut self) {
        self.last_changed.clear();
    }
}

/// What a strategy can look at when scoring an entity.
#[derive(Debug, Clone, Copy)]
pub struct PriorityContext<'a> {
    pub snapshot: &'a Snapshot,
    pub changes: &'a ChangeLog,
    /// Where the connection is looking, if the game told us.
    pub focus: Option<Vec2>,
}

/// Scores entities for one connection. Higher goes first.
pub trait PriorityStrategy: fmt::Debug + Send + Sync {
    fn score(&self, id: EntityId, context: &PriorityContext<'_>) -> f32;
}

/// Closer to the connection's focus is more important.
///
/// Entities without a position, or connections without a focus, score lowest.
#[derive(Clone, Copy)]
pub struct DistancePriority {
    locate: fn(&EntityState) -> Option<Vec2>,
}

impl DistancePriority {
    #[must_use]
    pub const fn new(locate: fn(&EntityState) -> Option<Vec2>) -> Self {
        Self { locate }
    }
}

impl fmt::Debug for DistancePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistancePriority").finish_non_exhaustive()
    }
}

impl PriorityStrategy for DistancePriority {
    fn score(&self, id: EntityId, context: &PriorityContext<'_>) -> f32 {
        let position = context.snapshot.entity(id).and_then(self.locate);
        match (context.focus, position) {
            (Some(focus), Some(position)) => -focus.distance_sq(position),
            _ => f32::MIN,
        }
    }
}

/// More recently changed is more important.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecencyPriority;

impl PriorityStrategy for RecencyPriority {
    #[allow(clippy::cast_precision_loss)]
    fn score(&self, id: EntityId, context: &PriorityContext<'_>) -> f32 {
        context.changes.last_changed(id).map_or(f32::MIN, |changed| {
            -(context.snapshot.tick().since(changed) as f32)
        })
    }
}

/// Flattens `delta` into send order for one connection.
pub fn prioritize<'a>(
    delta: &'a DeltaMessage,
    strategy: &dyn PriorityStrategy,
    context: &PriorityContext<'_>,
) -> Vec<DeltaItem<'a>> {
    let (mut removals, rest): (Vec<_>, Vec<_>) = delta_items(delta)
        .into_iter()
        .partition(|item| matches!(item, DeltaItem::Removed(_)));
    removals.sort_by_key(DeltaItem::entity);

    let mut scored: Vec<(f32, DeltaItem<'a>)> = rest
        .into_iter()
        .map(|item| (strategy.score(item.entity(), context), item))
        .collect();
    scored.sort_by(|(a_score, a), (b_score, b)| {
        b_score
            .total_cmp(a_score)
            .then_with(|| a.entity().cmp(&b.entity()))
    });

    removals.extend(scored.into_iter().map(|(_, item)| item));
    removals
}
