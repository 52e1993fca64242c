//! Reassembly of fragmented snapshot messages.

use std::collections::BTreeMap;

use codec::{DeltaMessage, SnapshotFragment, Tick};
use tracing::debug;

/// A complete snapshot message put back together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembled {
    pub full: bool,
    pub changes: DeltaMessage,
}

#[derive(Debug)]
struct Pending {
    received: Vec<bool>,
    remaining: usize,
    changes: DeltaMessage,
}

/// Collects fragments per `(tick, base_tick, full)` until all have arrived.
///
/// At most `capacity` incomplete sets are held; the oldest tick is evicted
/// first.
#[derive(Debug)]
pub struct Reassembly {
    pending: BTreeMap<(Tick, Tick, bool), Pending>,
    capacity: usize,
}

impl Reassembly {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Adds one fragment; returns the whole message once it is complete.
    pub fn insert(&mut self, fragment: SnapshotFragment) -> Option<Assembled> {
        let SnapshotFragment {
            full,
            index,
            count,
            changes,
        } = fragment;
        if count <= 1 {
            return Some(Assembled { full, changes });
        }

        let key = (changes.current_tick, changes.base_tick, full);
        let count = usize::from(count);
        let index = usize::from(index);
        if index >= count {
            return None;
        }
        if self
            .pending
            .get(&key)
            .is_some_and(|pending| pending.received.len() != count)
        {
            debug!(tick = %key.0, "fragment count changed; restarting assembly");
            self.pending.remove(&key);
        }
        if !self.pending.contains_key(&key) {
            while self.pending.len() >= self.capacity {
                if let Some(((tick, ..), _)) = self.pending.pop_first() {
                    debug!(%tick, "evicting incomplete snapshot");
                }
            }
        }

        let pending = self.pending.entry(key).or_insert_with(|| Pending {
            received: vec![false; count],
            remaining: count,
            changes: DeltaMessage::empty(key.1, key.0),
        });
        if pending.received[index] {
            return None;
        }
        pending.received[index] = true;
        pending.remaining -= 1;
        pending.changes.merge(changes);

        if pending.remaining > 0 {
            return None;
        }
        self.pending
            .remove(&key)
            .map(|pending| Assembled {
                full,
                changes: pending.changes,
            })
    }

    /// Forgets incomplete sets for ticks at or before `tick`.
    pub fn discard_through(&mut self, tick: Tick) {
        self.pending.retain(|(pending_tick, ..), _| *pending_tick > tick);
    }

    /// Number of incomplete sets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use codec::{EntityId, EntityState};
    use schema::ComponentKind;

    use super::*;

    fn fragment(tick: u32, index: u16, count: u16, id: u32) -> SnapshotFragment {
        let mut changes = DeltaMessage::empty(Tick::ZERO, Tick::new(tick));
        let mut state = EntityState::new();
        state.insert(ComponentKind::from_const(0), vec![u8::try_from(id).unwrap()]);
        changes.created.push((EntityId::new(id), state));
        SnapshotFragment {
            full: true,
            index,
            count,
            changes,
        }
    }

    #[test]
    fn single_fragment_passes_through() {
        let mut reassembly = Reassembly::new(4);
        let assembled = reassembly.insert(fragment(3, 0, 1, 1)).unwrap();
        assert!(assembled.full);
        assert_eq!(assembled.changes.created.len(), 1);
        assert!(reassembly.is_empty());
    }

    #[test]
    fn fragments_merge_in_any_order() {
        let mut reassembly = Reassembly::new(4);
        assert!(reassembly.insert(fragment(3, 2, 3, 30)).is_none());
        assert!(reassembly.insert(fragment(3, 0, 3, 10)).is_none());
        assert!(reassembly.insert(fragment(3, 0, 3, 10)).is_none());
        let assembled = reassembly.insert(fragment(3, 1, 3, 20)).unwrap();
        let ids: Vec<u32> = assembled.changes.created.iter().map(|(id, _)| id.raw()).collect();
        assert_eq!(ids, vec![10, 20, 30]);
        assert_eq!(assembled.changes.current_tick, Tick::new(3));
        assert!(reassembly.is_empty());
    }

    #[test]
    fn oldest_incomplete_set_is_evicted() {
        let mut reassembly = Reassembly::new(2);
        reassembly.insert(fragment(1, 0, 2, 1));
        reassembly.insert(fragment(2, 0, 2, 1));
        reassembly.insert(fragment(3, 0, 2, 1));
        assert_eq!(reassembly.len(), 2);
        assert!(reassembly.insert(fragment(1, 1, 2, 2)).is_none());
        assert!(reassembly.insert(fragment(3, 1, 2, 2)).is_some());
    }

    #[test]
    fn discard_drops_applied_ticks() {
        let mut reassembly = Reassembly::new(4);
        reassembly.insert(fragment(1, 0, 2, 1));
        reassembly.insert(fragment(5, 0, 2, 1));
        reassembly.discard_through(Tick::new(4));
        assert_eq!(reassembly.len(), 1);
    }
}
