//! The demo game world and its actor systems.

use std::collections::BTreeMap;

use codec::{
    CodecError, CodecResult, EntityId, EntityIdAllocator, EntityState, Tick, WorldMut, WorldView,
};
use schema::{Component, ComponentKind, SchemaError};
use server::ServerEvent;
use tracing::{debug, info};

use crate::components::{ActorTag, Controller, Health, Name, Position, Velocity, STARTING_HEALTH};
use crate::movement::{step, MoveAction, WORLD_EXTENT};

/// Ticks a despawned id stays out of circulation.
pub const RETIRE_WINDOW: u32 = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Actor {
    position: Option<Position>,
    velocity: Option<Velocity>,
    health: Option<Health>,
    tag: Option<ActorTag>,
    name: Option<Name>,
    controller: Option<Controller>,
}

impl Actor {
    fn write(&self, out: &mut EntityState) {
        fn put<T: Component>(out: &mut EntityState, value: Option<&T>) {
            if let Some(value) = value {
                out.set_component(value);
            }
        }
        put(out, self.position.as_ref());
        put(out, self.velocity.as_ref());
        put(out, self.health.as_ref());
        put(out, self.tag.as_ref());
        put(out, self.name.as_ref());
        put(out, self.controller.as_ref());
    }
}

/// A small ECS-shaped store of actors.
///
/// The server side allocates ids through [`spawn_actor`](Self::spawn_actor);
/// the client side mirrors replicated state through [`WorldMut`].
#[derive(Debug, Clone)]
pub struct GameWorld {
    ids: EntityIdAllocator,
    actors: BTreeMap<EntityId, Actor>,
}

impl Default for GameWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl GameWorld {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ids: EntityIdAllocator::new(RETIRE_WINDOW),
            actors: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.actors.contains_key(&id)
    }

    /// Spawns a named actor at the origin with full health. Long names are
    /// truncated to [`MAX_NAME_BYTES`](crate::MAX_NAME_BYTES).
    pub fn spawn_actor(
        &mut self,
        name: &str,
        controller: Option<u64>,
        now: Tick,
    ) -> Option<EntityId> {
        let id = self.ids.allocate(now)?;
        self.actors.insert(
            id,
            Actor {
                position: Some(Position::default()),
                health: Some(Health::full(STARTING_HEALTH)),
                tag: Some(ActorTag),
                name: Some(Name::truncated(name)),
                controller: controller.map(|client_id| Controller { client_id }),
                ..Actor::default()
            },
        );
        info!(%id, name, "actor spawned");
        Some(id)
    }

    /// Spawns an uncontrolled entity that drifts by `velocity` every tick.
    pub fn spawn_drifter(
        &mut self,
        at: Position,
        velocity: Velocity,
        now: Tick,
    ) -> Option<EntityId> {
        let id = self.ids.allocate(now)?;
        self.actors.insert(
            id,
            Actor {
                position: Some(at),
                velocity: Some(velocity),
                ..Actor::default()
            },
        );
        Some(id)
    }

    /// Removes an entity. Returns `false` if it did not exist.
    pub fn despawn_actor(&mut self, id: EntityId, now: Tick) -> bool {
        if self.actors.remove(&id).is_none() {
            return false;
        }
        self.ids.retire(id, now);
        debug!(%id, "entity despawned");
        true
    }

    /// Subtracts `amount` health. An actor at or below zero is clamped to
    /// zero and despawned; returns whether that happened.
    pub fn apply_damage(&mut self, id: EntityId, amount: i32, now: Tick) -> bool {
        let Some(health) = self.actors.get_mut(&id).and_then(|actor| actor.health.as_mut()) else {
            return false;
        };
        health.current = health.current.saturating_sub(amount);
        if health.current > 0 {
            return false;
        }
        health.current = 0;
        self.despawn_actor(id, now)
    }

    #[must_use]
    pub fn controlled_by(&self, client_id: u64) -> Option<EntityId> {
        self.actors
            .iter()
            .find(|(_, actor)| actor.controller.is_some_and(|c| c.client_id == client_id))
            .map(|(id, _)| *id)
    }

    /// Applies a movement action to the actor `client_id` controls.
    pub fn apply_move(&mut self, client_id: u64, action: MoveAction) -> bool {
        let Some(id) = self.controlled_by(client_id) else {
            return false;
        };
        match self.actors.get_mut(&id).and_then(|actor| actor.position.as_mut()) {
            Some(position) => {
                *position = step(*position, action);
                true
            }
            None => false,
        }
    }

    /// Moves every drifting entity one tick, bouncing off the world edge.
    pub fn integrate(&mut self) {
        for actor in self.actors.values_mut() {
            let (Some(position), Some(velocity)) =
                (actor.position.as_mut(), actor.velocity.as_mut())
            else {
                continue;
            };
            let (x, dx) = bounce(position.x, velocity.dx);
            let (y, dy) = bounce(position.y, velocity.dy);
            *position = Position { x, y };
            *velocity = Velocity { dx, dy };
        }
    }

    /// Reacts to what the replication server reported this tick.
    pub fn handle_event(&mut self, event: &ServerEvent, now: Tick) {
        match event {
            ServerEvent::Input {
                client_id, command, ..
            } => {
                if let Ok(action) = MoveAction::decode(&command.action) {
                    self.apply_move(*client_id, action);
                }
            }
            ServerEvent::SpawnRequested {
                client_id, name, ..
            } => {
                if self.controlled_by(*client_id).is_none() {
                    self.spawn_actor(name, Some(*client_id), now);
                }
            }
            ServerEvent::ClientDisconnected {
                client_id: Some(client_id),
                ..
            } => {
                if let Some(id) = self.controlled_by(*client_id) {
                    self.despawn_actor(id, now);
                }
            }
            _ => {}
        }
    }

    #[must_use]
    pub fn position(&self, id: EntityId) -> Option<Position> {
        self.actors.get(&id).and_then(|actor| actor.position)
    }

    #[must_use]
    pub fn health(&self, id: EntityId) -> Option<Health> {
        self.actors.get(&id).and_then(|actor| actor.health)
    }

    #[must_use]
    pub fn name(&self, id: EntityId) -> Option<&str> {
        self.actors
            .get(&id)
            .and_then(|actor| actor.name.as_ref())
            .map(|name| name.0.as_str())
    }
}

fn bounce(value: i32, speed: i32) -> (i32, i32) {
    let next = value.saturating_add(speed);
    if next.abs() > WORLD_EXTENT {
        (next.clamp(-WORLD_EXTENT, WORLD_EXTENT), -speed)
    } else {
        (next, speed)
    }
}

fn decode<T: Component>(id: EntityId, payload: &[u8]) -> CodecResult<T> {
    T::from_payload(payload).map_err(|source| CodecError::InvalidPayload {
        entity: id,
        kind: T::KIND,
        source: SchemaError::InvalidPayload {
            kind: T::KIND,
            source,
        },
    })
}

impl WorldView for GameWorld {
    fn entity_ids(&self) -> Vec<EntityId> {
        self.actors.keys().copied().collect()
    }

    fn write_entity(&self, id: EntityId, out: &mut EntityState) {
        if let Some(actor) = self.actors.get(&id) {
            actor.write(out);
        }
    }
}

impl WorldMut for GameWorld {
    fn spawn(&mut self, id: EntityId) {
        self.actors.entry(id).or_default();
    }

    fn despawn(&mut self, id: EntityId) {
        self.actors.remove(&id);
    }

    fn set_component(
        &mut self,
        id: EntityId,
        kind: ComponentKind,
        payload: &[u8],
    ) -> CodecResult<()> {
        let actor = self
            .actors
            .get_mut(&id)
            .ok_or(CodecError::EntityNotFound { entity: id })?;
        match kind {
            Position::KIND => actor.position = Some(decode(id, payload)?),
            Velocity::KIND => actor.velocity = Some(decode(id, payload)?),
            Health::KIND => actor.health = Some(decode(id, payload)?),
            ActorTag::KIND => actor.tag = Some(decode(id, payload)?),
            Name::KIND => actor.name = Some(decode(id, payload)?),
            Controller::KIND => actor.controller = Some(decode(id, payload)?),
            _ => {
                return Err(CodecError::InvalidPayload {
                    entity: id,
                    kind,
                    source: SchemaError::UnknownKind { kind },
                })
            }
        }
        Ok(())
    }

    fn remove_component(&mut self, id: EntityId, kind: ComponentKind) {
        let Some(actor) = self.actors.get_mut(&id) else {
            return;
        };
        match kind {
            Position::KIND => actor.position = None,
            Velocity::KIND => actor.velocity = None,
            Health::KIND => actor.health = None,
            ActorTag::KIND => actor.tag = None,
            Name::KIND => actor.name = None,
            Controller::KIND => actor.controller = None,
            _ => {}
        }
    }
}
