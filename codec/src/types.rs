//! Core identifier types and entity id allocation.

use std::collections::{HashSet, VecDeque};
use std::fmt;

/// A simulation tick number.
///
/// Ticks are monotonically increasing identifiers for simulation states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tick(u32);

impl Tick {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(tick: u32) -> Self {
        Self(tick)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns `true` if this tick is zero (the empty baseline).
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// The following tick, saturating at `u32::MAX`.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Ticks elapsed since `earlier`, or zero if `earlier` is later.
    #[must_use]
    pub const fn since(self, earlier: Self) -> u32 {
        self.0.saturating_sub(earlier.0)
    }
}

impl From<u32> for Tick {
    fn from(tick: u32) -> Self {
        Self(tick)
    }
}

impl From<Tick> for u32 {
    fn from(tick: Tick) -> Self {
        tick.0
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stable entity identifier.
///
/// Ids are assigned by the server-side world and never reused inside the
/// retirement window of [`EntityIdAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntityId(u32);

impl EntityId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for EntityId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<EntityId> for u32 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out entity ids and keeps retired ids out of circulation.
///
/// Ids are issued monotonically starting at 1; id 0 is never issued. A
/// retired id is not handed out again until `retire_window` ticks have
/// passed, even after the counter wraps.
#[derive(Debug, Clone)]
pub struct EntityIdAllocator {
    next: u32,
    retire_window: u32,
    live: HashSet<EntityId>,
    retired: VecDeque<(EntityId, Tick)>,
}

impl EntityIdAllocator {
    #[must_use]
    pub fn new(retire_window: u32) -> Self {
        Self::starting_at(1, retire_window)
    }

    /// Allocator whose first candidate id is `first`.
    #[must_use]
    pub fn starting_at(first: u32, retire_window: u32) -> Self {
        Self {
            next: first.max(1),
            retire_window,
            live: HashSet::new(),
            retired: VecDeque::new(),
        }
    }

    /// Allocates an id at tick `now`.
    ///
    /// Returns `None` only if every id is live or still retired.
    pub fn allocate(&mut self, now: Tick) -> Option<EntityId> {
        self.expire(now);
        let blocked = self.live.len() + self.retired.len();
        for _ in 0..=blocked {
            let candidate = EntityId(self.next);
            self.next = match self.next.wrapping_add(1) {
                0 => 1,
                next => next,
            };
            if !self.live.contains(&candidate) && !self.is_retired(candidate) {
                self.live.insert(candidate);
                return Some(candidate);
            }
        }
        None
    }

    /// Retires a live id at tick `now`. Returns `false` if it was not live.
    pub fn retire(&mut self, id: EntityId, now: Tick) -> bool {
        if !self.live.remove(&id) {
            return false;
        }
        self.retired.push_back((id, now));
        true
    }

    #[must_use]
    pub fn is_live(&self, id: EntityId) -> bool {
        self.live.contains(&id)
    }

    #[must_use]
    pub fn is_retired(&self, id: EntityId) -> bool {
        self.retired.iter().any(|(retired, _)| *retired == id)
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    fn expire(&mut self, now: Tick) {
        while let Some((_, at)) = self.retired.front() {
            if now.since(*at) < self.retire_window {
                break;
            }
            self.retired.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_basics() {
        let tick = Tick::new(100);
        assert_eq!(tick.raw(), 100);
        assert_eq!(tick.next(), Tick::new(101));
        assert_eq!(Tick::new(u32::MAX).next(), Tick::new(u32::MAX));
        assert!(Tick::ZERO.is_zero());
        assert_eq!(Tick::new(10).since(Tick::new(4)), 6);
        assert_eq!(Tick::new(4).since(Tick::new(10)), 0);
    }

    #[test]
    fn tick_conversions() {
        let tick: Tick = 42u32.into();
        let raw: u32 = tick.into();
        assert_eq!(raw, 42);
        assert_eq!(tick.to_string(), "42");
    }

    #[test]
    fn tick_const() {
        const TICK: Tick = Tick::new(42);
        assert_eq!(TICK.raw(), 42);
    }

    #[test]
    fn entity_id_basics() {
        let id: EntityId = 7u32.into();
        assert_eq!(id.raw(), 7);
        assert_eq!(id.to_string(), "#7");
        assert!(EntityId::new(1) < EntityId::new(2));
    }

    #[test]
    fn allocator_is_monotonic_and_skips_zero() {
        let mut alloc = EntityIdAllocator::new(16);
        let a = alloc.allocate(Tick::ZERO).unwrap();
        let b = alloc.allocate(Tick::ZERO).unwrap();
        assert_eq!(a, EntityId::new(1));
        assert_eq!(b, EntityId::new(2));
        assert_eq!(alloc.live_count(), 2);
    }

    #[test]
    fn retired_id_not_reissued_within_window() {
        let mut alloc = EntityIdAllocator::starting_at(u32::MAX, 10);
        let last = alloc.allocate(Tick::new(0)).unwrap();
        assert_eq!(last, EntityId::new(u32::MAX));
        let first = alloc.allocate(Tick::new(0)).unwrap();
        assert_eq!(first, EntityId::new(1));
        assert!(alloc.retire(first, Tick::new(5)));

        // Force the counter back around onto the retired id.
        alloc.next = 1;
        let next = alloc.allocate(Tick::new(9)).unwrap();
        assert_ne!(next, first);
        assert!(alloc.is_retired(first));
    }

    #[test]
    fn retired_id_reissued_after_window() {
        let mut alloc = EntityIdAllocator::new(10);
        let id = alloc.allocate(Tick::new(0)).unwrap();
        alloc.retire(id, Tick::new(2));
        alloc.next = id.raw();
        let again = alloc.allocate(Tick::new(12)).unwrap();
        assert_eq!(again, id);
    }

    #[test]
    fn retire_unknown_id_is_noop() {
        let mut alloc = EntityIdAllocator::new(4);
        assert!(!alloc.retire(EntityId::new(99), Tick::ZERO));
    }

    #[test]
    fn wraps_past_max_to_one() {
        let mut alloc = EntityIdAllocator::starting_at(u32::MAX, 4);
        assert_eq!(alloc.allocate(Tick::ZERO), Some(EntityId::new(u32::MAX)));
        assert_eq!(alloc.allocate(Tick::ZERO), Some(EntityId::new(1)));
    }
}
