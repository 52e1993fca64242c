//! Reference game for rogue-net.
//!
//! A tiny top-down actor world used by the simulation binary and the
//! end-to-end tests: six replicated components, a server-side
//! [`GameWorld`] with spawn, damage and movement systems, and a
//! [`DemoPredictor`] that lets clients predict their own actor.

mod components;
mod movement;
mod world;

pub use components::{
    demo_registry, ActorTag, Controller, Health, Name, Position, Velocity, MAX_NAME_BYTES,
    STARTING_HEALTH,
};
pub use movement::{locate, step, DemoPredictor, MoveAction, MAX_STEP, WORLD_EXTENT};
pub use world::{GameWorld, RETIRE_WINDOW};
