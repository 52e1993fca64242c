//! Player movement shared by the server simulation and client prediction.
//!
//! Both sides run [`step`] on the same inputs, so a client that predicts
//! with [`DemoPredictor`] lands exactly where the server does unless a
//! packet was lost or the world changed underneath it.

use bytestream::{ByteReader, ByteWriter, StreamResult};
use client::Predictor;
use codec::{EntityId, EntityState, InputCommand, Snapshot};

use crate::components::{Controller, Position};

/// Largest distance an actor may move per axis in one tick.
pub const MAX_STEP: i32 = 4;

/// Actors are kept inside `-WORLD_EXTENT..=WORLD_EXTENT` on both axes.
pub const WORLD_EXTENT: i32 = 1000;

/// A movement input, encoded as the action bytes of an [`InputCommand`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveAction {
    pub dx: i32,
    pub dy: i32,
}

impl MoveAction {
    #[must_use]
    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = ByteWriter::with_capacity(4);
        out.write_vars32(self.dx);
        out.write_vars32(self.dy);
        out.finish()
    }

    /// Decodes an action. Empty or malformed bytes are an error.
    pub fn decode(bytes: &[u8]) -> StreamResult<Self> {
        let mut reader = ByteReader::new(bytes);
        let action = Self {
            dx: reader.read_vars32()?,
            dy: reader.read_vars32()?,
        };
        reader.finish()?;
        Ok(action)
    }
}

/// Moves `position` by `action`, clamped per step and to the world.
#[must_use]
pub fn step(position: Position, action: MoveAction) -> Position {
    let dx = action.dx.clamp(-MAX_STEP, MAX_STEP);
    let dy = action.dy.clamp(-MAX_STEP, MAX_STEP);
    Position {
        x: position.x.saturating_add(dx).clamp(-WORLD_EXTENT, WORLD_EXTENT),
        y: position.y.saturating_add(dy).clamp(-WORLD_EXTENT, WORLD_EXTENT),
    }
}

/// Predicts the locally controlled actor of one client.
#[derive(Debug, Clone, Copy)]
pub struct DemoPredictor {
    client_id: u64,
}

impl DemoPredictor {
    #[must_use]
    pub const fn new(client_id: u64) -> Self {
        Self { client_id }
    }
}

impl Predictor for DemoPredictor {
    fn controlled_entity(&self, world: &Snapshot) -> Option<EntityId> {
        world.find(&Controller {
            client_id: self.client_id,
        })
    }

    fn apply_input(&self, world: &mut Snapshot, command: &InputCommand) {
        let Ok(action) = MoveAction::decode(&command.action) else {
            return;
        };
        let Some(id) = self.controlled_entity(world) else {
            return;
        };
        if let Some(state) = world.entity_mut(id) {
            if let Some(position) = state.component::<Position>() {
                state.set_component(&step(position, action));
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn divergence(&self, predicted: &EntityState, authoritative: &EntityState) -> f32 {
        match (
            predicted.component::<Position>(),
            authoritative.component::<Position>(),
        ) {
            (Some(a), Some(b)) => {
                let dx = f64::from(a.x) - f64::from(b.x);
                let dy = f64::from(a.y) - f64::from(b.y);
                dx.hypot(dy) as f32
            }
            (None, None) => 0.0,
            _ => f32::INFINITY,
        }
    }
}

/// Position of `state` as a priority focus point.
#[allow(clippy::cast_precision_loss)]
pub fn locate(state: &EntityState) -> Option<server::Vec2> {
    state
        .component::<Position>()
        .map(|position| server::Vec2::new(position.x as f32, position.y as f32))
}

#[cfg(test)]
mod tests {
    use codec::Tick;

    use super::*;
    use crate::components::ActorTag;

    fn command(action: MoveAction) -> InputCommand {
        InputCommand {
            sequence: 1,
            tick: Tick::new(1),
            action: action.encode(),
        }
    }

    fn world_with_actor(client_id: u64, at: Position) -> Snapshot {
        let mut world = Snapshot::empty(Tick::new(1));
        let state = EntityState::new()
            .with(&at)
            .with(&ActorTag)
            .with(&Controller { client_id });
        world.insert(EntityId::new(3), state).unwrap();
        world
    }

    #[test]
    fn step_clamps_speed_and_extent() {
        assert_eq!(step(Position::new(0, 0), MoveAction::new(10, -10)), Position::new(4, -4));
        assert_eq!(
            step(Position::new(WORLD_EXTENT, 0), MoveAction::new(3, 0)),
            Position::new(WORLD_EXTENT, 0)
        );
    }

    #[test]
    fn empty_action_does_not_decode() {
        assert!(MoveAction::decode(&[]).is_err());
        assert!(MoveAction::decode(&[0x02, 0x02, 0x00]).is_err());
    }

    #[test]
    fn predictor_moves_only_its_own_actor() {
        let mut world = world_with_actor(7, Position::new(1, 1));
        DemoPredictor::new(8).apply_input(&mut world, &command(MoveAction::new(1, 0)));
        let state = world.entity(EntityId::new(3)).unwrap();
        assert_eq!(state.component::<Position>(), Some(Position::new(1, 1)));

        DemoPredictor::new(7).apply_input(&mut world, &command(MoveAction::new(1, 0)));
        let state = world.entity(EntityId::new(3)).unwrap();
        assert_eq!(state.component::<Position>(), Some(Position::new(2, 1)));
    }

    #[test]
    fn divergence_is_euclidean_distance() {
        let predictor = DemoPredictor::new(1);
        let a = EntityState::new().with(&Position::new(0, 0));
        let b = EntityState::new().with(&Position::new(3, 4));
        assert!((predictor.divergence(&a, &b) - 5.0).abs() < f32::EPSILON);
        assert!(predictor.divergence(&a, &EntityState::new()).is_infinite());
    }

    #[test]
    fn locate_reads_position() {
        let state = EntityState::new().with(&Position::new(-2, 9));
        assert_eq!(locate(&state), Some(server::Vec2::new(-2.0, 9.0)));
        assert_eq!(locate(&EntityState::new()), None);
    }
}
