//! Client-side prediction and reconciliation.
//!
//! The predicted world is always `authoritative + replay(unacknowledged
//! inputs)`. [`reconcile`] rebuilds it from scratch whenever a newer
//! authoritative snapshot arrives, so the result depends only on the
//! snapshot and the input sequence.

use std::collections::BTreeMap;

use codec::{EntityId, EntityState, InputCommand, Snapshot};

use crate::InputHistory;

/// Game logic the client runs ahead of the server.
///
/// `apply_input` must be deterministic and must match what the server does
/// with the same input, or every reconciliation will correct.
pub trait Predictor {
    /// Applies one input to the predicted world.
    fn apply_input(&self, world: &mut Snapshot, command: &InputCommand);

    /// The entity steered by this client. Hints never override it.
    fn controlled_entity(&self, _world: &Snapshot) -> Option<EntityId> {
        None
    }

    /// Distance between two states of one entity, in world units.
    fn divergence(&self, _predicted: &EntityState, _authoritative: &EntityState) -> f32 {
        0.0
    }
}

/// Predicts nothing; the client shows authoritative state as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrediction;

impl Predictor for NoPrediction {
    fn apply_input(&self, _world: &mut Snapshot, _command: &InputCommand) {}
}

/// Replays `inputs` in order on top of `authoritative`.
pub fn reconcile<P: Predictor + ?Sized>(
    predictor: &P,
    authoritative: &Snapshot,
    inputs: &InputHistory,
) -> Snapshot {
    let mut predicted = authoritative.clone();
    for command in inputs.iter() {
        predictor.apply_input(&mut predicted, command);
    }
    predicted
}

/// Cosmetic offsets left over from small corrections.
///
/// Each offset is a distance the renderer may blend away; it shrinks by
/// the decay factor every frame and is dropped once negligible.
#[derive(Debug, Clone, Default)]
pub struct CorrectionSmoothing {
    offsets: BTreeMap<EntityId, f32>,
}

const NEGLIGIBLE_OFFSET: f32 = 0.01;

impl CorrectionSmoothing {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares the world before and after a reconciliation.
    ///
    /// Entities that moved further than `snap_threshold` are snapped (their
    /// offset is cleared) and returned; smaller moves accumulate an offset.
    pub fn observe<P: Predictor + ?Sized>(
        &mut self,
        predictor: &P,
        before: &Snapshot,
        after: &Snapshot,
        snap_threshold: f32,
    ) -> Vec<EntityId> {
        let mut snapped = Vec::new();
        for (id, state) in after.iter() {
            let Some(previous) = before.entity(id) else {
                continue;
            };
            let distance = predictor.divergence(previous, state);
            if distance > snap_threshold {
                self.offsets.remove(&id);
                snapped.push(id);
            } else if distance > 0.0 {
                *self.offsets.entry(id).or_insert(0.0) += distance;
            }
        }
        self.offsets.retain(|id, _| after.contains(*id));
        snapped
    }

    /// Shrinks every offset by `factor` (clamped to `0..=1`).
    pub fn decay(&mut self, factor: f32) {
        let factor = factor.clamp(0.0, 1.0);
        for offset in self.offsets.values_mut() {
            *offset *= factor;
        }
        self.offsets.retain(|_, offset| *offset > NEGLIGIBLE_OFFSET);
    }

    #[must_use]
    pub fn offset(&self, id: EntityId) -> f32 {
        self.offsets.get(&id).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn clear(&mut self) {
        self.offsets.clear();
    }
}
