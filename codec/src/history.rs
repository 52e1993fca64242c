//! Fixed-capacity history of snapshots keyed by tick.

use std::num::NonZeroUsize;

use thiserror::Error;

use crate::{Snapshot, Tick};

/// Default number of ticks kept for delta baselines.
pub const DEFAULT_HISTORY_CAPACITY: usize = 64;

/// Errors that can occur when inserting into a history ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// Ticks must be strictly increasing.
    #[error("tick {new_tick} is not after {last_tick}")]
    OutOfOrder { last_tick: Tick, new_tick: Tick },
}

/// A fixed-capacity ring buffer of values keyed by strictly increasing tick.
///
/// Inserting into a full ring evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct History<T> {
    entries: Vec<Option<Entry<T>>>,
    head: usize,
    len: usize,
    last_tick: Option<Tick>,
}

/// Ring of authoritative snapshots.
pub type SnapshotHistory = History<Snapshot>;

#[derive(Debug, Clone)]
struct Entry<T> {
    tick: Tick,
    value: T,
}

impl<T> History<T> {
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        let cap = capacity.get();
        let mut entries = Vec::with_capacity(cap);
        entries.resize_with(cap, || None);
        Self {
            entries,
            head: 0,
            len: 0,
            last_tick: None,
        }
    }

    /// Ring with [`DEFAULT_HISTORY_CAPACITY`] slots.
    #[must_use]
    pub fn with_default_capacity() -> Self {
        Self::new(NonZeroUsize::MIN.saturating_add(DEFAULT_HISTORY_CAPACITY - 1))
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts `value` at `tick`, evicting the oldest entry when full.
    pub fn insert(&mut self, tick: Tick, value: T) -> Result<(), HistoryError> {
        if let Some(last) = self.last_tick {
            if tick <= last {
                return Err(HistoryError::OutOfOrder {
                    last_tick: last,
                    new_tick: tick,
                });
            }
        }

        let cap = self.entries.len();
        if self.len < cap {
            let idx = (self.head + self.len) % cap;
            self.entries[idx] = Some(Entry { tick, value });
            self.len += 1;
        } else {
            self.entries[self.head] = Some(Entry { tick, value });
            self.head = (self.head + 1) % cap;
        }

        self.last_tick = Some(tick);
        Ok(())
    }

    /// Value stored for exactly `tick`.
    #[must_use]
    pub fn get(&self, tick: Tick) -> Option<&T> {
        self.iter().rev().find(|(t, _)| *t == tick).map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains(&self, tick: Tick) -> bool {
        self.get(tick).is_some()
    }

    #[must_use]
    pub fn newest(&self) -> Option<(Tick, &T)> {
        self.iter().next_back()
    }

    #[must_use]
    pub fn oldest_tick(&self) -> Option<Tick> {
        self.iter().next().map(|(tick, _)| tick)
    }

    #[must_use]
    pub fn newest_tick(&self) -> Option<Tick> {
        self.newest().map(|(tick, _)| tick)
    }

    /// Drops every entry and forgets the last tick.
    pub fn clear(&mut self) {
        for entry in &mut self.entries {
            *entry = None;
        }
        self.head = 0;
        self.len = 0;
        self.last_tick = None;
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (Tick, &T)> {
        let cap = self.entries.len();
        (0..self.len).filter_map(move |i| {
            let idx = (self.head + i) % cap;
            self.entries[idx]
                .as_ref()
                .map(|entry| (entry.tick, &entry.value))
        })
    }
}
