//! Per-connection replication planning.
//!
//! Everything here is a pure function of a read-only snapshot history and a
//! connection's replication bookkeeping, so connections can be planned
//! independently (and in parallel) each tick.

use codec::{
    diff, encode_fragments, encode_hints, CodecResult, DeltaMessage, FragmentTarget, Hint,
    Snapshot, SnapshotHistory, Tick,
};
use schema::{ComponentMask, ComponentRegistry};
use tracing::debug;
use wire::HEADER_SIZE;

use crate::priority::{prioritize, ChangeLog, PriorityContext, PriorityStrategy, Vec2};

/// Baseline bookkeeping for one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationState {
    last_acked: Option<Tick>,
    pending_full: Option<Tick>,
    resync_requested: bool,
}

impl ReplicationState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest tick the client confirmed, if any.
    #[must_use]
    pub const fn last_acked(&self) -> Option<Tick> {
        self.last_acked
    }

    /// Tick of a full snapshot sent but not yet acknowledged.
    #[must_use]
    pub const fn pending_full(&self) -> Option<Tick> {
        self.pending_full
    }

    #[must_use]
    pub const fn resync_requested(&self) -> bool {
        self.resync_requested
    }

    /// Applies an ack from the client.
    ///
    /// Returns `true` if the baseline advanced. Acks older than the current
    /// one, or newer than `server_tick`, are ignored.
    pub fn acknowledge(&mut self, tick: Tick, server_tick: Tick) -> bool {
        if tick > server_tick {
            return false;
        }
        if self.last_acked.is_some_and(|acked| tick <= acked) {
            return false;
        }
        self.last_acked = Some(tick);
        if self.pending_full.is_some_and(|full| tick >= full) {
            self.pending_full = None;
        }
        true
    }

    /// The client lost its baseline; the next plan is a full snapshot.
    pub fn request_resync(&mut self) {
        self.resync_requested = true;
    }

    /// Records that a full snapshot for `tick` went out.
    pub fn full_snapshot_sent(&mut self, tick: Tick) {
        self.pending_full = Some(tick);
        self.resync_requested = false;
    }

    /// Forgets every baseline, as after a timeout.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Why a full snapshot was chosen over a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullReason {
    /// Nothing was ever acknowledged or sent in full.
    NoBaseline,
    ResyncRequested,
    /// The baseline tick is no longer in the history ring.
    BaselineAgedOut(Tick),
}

/// What a connection's next snapshot message is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineChoice {
    Full(FullReason),
    Delta(Tick),
}

/// Picks the baseline for the next reliable snapshot message.
#[must_use]
pub fn choose_baseline(state: &ReplicationState, history: &SnapshotHistory) -> BaselineChoice {
    if state.resync_requested {
        return BaselineChoice::Full(FullReason::ResyncRequested);
    }
    let Some(base) = state.pending_full.or(state.last_acked) else {
        return BaselineChoice::Full(FullReason::NoBaseline);
    };
    if history.contains(base) {
        BaselineChoice::Delta(base)
    } else {
        BaselineChoice::Full(FullReason::BaselineAgedOut(base))
    }
}

/// Read-only inputs shared by every connection's plan in one tick.
#[derive(Debug, Clone, Copy)]
pub struct PlanInput<'a> {
    pub current: &'a Snapshot,
    pub history: &'a SnapshotHistory,
    pub registry: &'a ComponentRegistry,
    pub changes: &'a ChangeLog,
    pub strategy: &'a dyn PriorityStrategy,
    pub max_message_bytes: usize,
    pub max_fragments: u16,
}

/// Encoded messages for one connection in one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationPlan {
    pub tick: Tick,
    pub baseline: BaselineChoice,
    /// Fragments in send order.
    pub messages: Vec<Vec<u8>>,
    /// Entity-level entries carried across all fragments.
    pub changes: usize,
}

impl ReplicationPlan {
    #[must_use]
    pub const fn is_full(&self) -> bool {
        matches!(self.baseline, BaselineChoice::Full(_))
    }

    #[must_use]
    pub fn bytes(&self) -> usize {
        self.messages.iter().map(Vec::len).sum()
    }
}

/// Builds the reliable snapshot messages for one connection.
///
/// # Errors
///
/// [`codec::CodecError::LimitsExceeded`] if the message needs more than
/// `max_fragments` fragments.
pub fn plan_connection(
    state: &ReplicationState,
    focus: Option<Vec2>,
    input: &PlanInput<'_>,
) -> CodecResult<ReplicationPlan> {
    let tick = input.current.tick();
    let mut baseline = choose_baseline(state, input.history);
    let base = match baseline {
        BaselineChoice::Delta(base_tick) => input.history.get(base_tick),
        BaselineChoice::Full(_) => None,
    };

    let (delta, target) = if let Some(base) = base {
        (
            diff(base, input.current),
            FragmentTarget::Delta {
                tick,
                base_tick: base.tick(),
            },
        )
    } else {
        if let BaselineChoice::Delta(base_tick) = baseline {
            baseline = BaselineChoice::Full(FullReason::BaselineAgedOut(base_tick));
        }
        (
            DeltaMessage::from_snapshot(input.current),
            FragmentTarget::Full { tick },
        )
    };

    let context = PriorityContext {
        snapshot: input.current,
        changes: input.changes,
        focus,
    };
    let items = prioritize(&delta, input.strategy, &context);
    let changes = items.len();
    let messages = encode_fragments(
        target,
        items,
        input.registry,
        input.max_message_bytes,
        input.max_fragments,
    )?;
    debug!(
        %tick,
        ?baseline,
        changes,
        fragments = messages.len(),
        "planned replication"
    );

    Ok(ReplicationPlan {
        tick,
        baseline,
        messages,
        changes,
    })
}

/// Builds the unreliable hint message for a tick without a reliable delta.
///
/// Carries the current value of `kinds` for every entity that changed at the
/// snapshot's tick, packed until `max_message_bytes` or `max_hints` is hit.
/// Returns `None` when there is nothing to hint.
#[must_use]
pub fn plan_hints(
    current: &Snapshot,
    changes: &ChangeLog,
    kinds: ComponentMask,
    max_message_bytes: usize,
    max_hints: usize,
) -> Option<Vec<u8>> {
    if kinds.is_empty() {
        return None;
    }
    let tick = current.tick();
    let mut budget = max_message_bytes.saturating_sub(HEADER_SIZE + 5);
    let mut hints = Vec::new();
    'entities: for id in changes.changed_at(tick) {
        let Some(state) = current.entity(id) else {
            continue;
        };
        for (kind, payload) in state.iter().filter(|(kind, _)| kinds.contains(*kind)) {
            let length = u32::try_from(payload.len()).unwrap_or(u32::MAX);
            let size = 4 + 1 + bytestream::varu32_len(length) + payload.len();
            if size > budget || hints.len() >= max_hints {
                break 'entities;
            }
            budget -= size;
            hints.push(Hint {
                entity: id,
                kind,
                payload: payload.to_vec(),
            });
        }
    }
    (!hints.is_empty()).then(|| encode_hints(tick, &hints))
}
