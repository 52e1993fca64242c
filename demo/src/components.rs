//! Replicated components of the reference game.

use bytestream::{ByteReader, ByteWriter, StreamResult};
use schema::{Component, ComponentKind, ComponentRegistry, SchemaResult};

/// Longest actor name accepted on the wire.
pub const MAX_NAME_BYTES: usize = 64;

/// Hit points every spawned actor starts with.
pub const STARTING_HEALTH: i32 = 100;

/// Grid position in world units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Component for Position {
    const KIND: ComponentKind = ComponentKind::from_const(0);
    const NAME: &'static str = "Position";

    fn encode(&self, out: &mut ByteWriter) {
        out.write_vars32(self.x);
        out.write_vars32(self.y);
    }

    fn decode(reader: &mut ByteReader<'_>) -> StreamResult<Self> {
        Ok(Self {
            x: reader.read_vars32()?,
            y: reader.read_vars32()?,
        })
    }
}

/// Per-tick drift, applied by [`GameWorld::integrate`](crate::GameWorld::integrate).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Velocity {
    pub dx: i32,
    pub dy: i32,
}

impl Component for Velocity {
    const KIND: ComponentKind = ComponentKind::from_const(1);
    const NAME: &'static str = "Velocity";

    fn encode(&self, out: &mut ByteWriter) {
        out.write_vars32(self.dx);
        out.write_vars32(self.dy);
    }

    fn decode(reader: &mut ByteReader<'_>) -> StreamResult<Self> {
        Ok(Self {
            dx: reader.read_vars32()?,
            dy: reader.read_vars32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Health {
    pub current: i32,
    pub max: i32,
}

impl Health {
    #[must_use]
    pub const fn full(max: i32) -> Self {
        Self { current: max, max }
    }
}

impl Component for Health {
    const KIND: ComponentKind = ComponentKind::from_const(2);
    const NAME: &'static str = "Health";

    fn encode(&self, out: &mut ByteWriter) {
        out.write_vars32(self.current);
        out.write_vars32(self.max);
    }

    fn decode(reader: &mut ByteReader<'_>) -> StreamResult<Self> {
        Ok(Self {
            current: reader.read_vars32()?,
            max: reader.read_vars32()?,
        })
    }
}

/// Marks an entity as an actor. Carries no data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActorTag;

impl Component for ActorTag {
    const KIND: ComponentKind = ComponentKind::from_const(3);
    const NAME: &'static str = "ActorTag";

    fn encode(&self, _out: &mut ByteWriter) {}

    fn decode(_reader: &mut ByteReader<'_>) -> StreamResult<Self> {
        Ok(Self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Name(pub String);

impl Name {
    /// `name` cut to at most [`MAX_NAME_BYTES`] on a character boundary.
    #[must_use]
    pub fn truncated(name: &str) -> Self {
        let mut end = name.len().min(MAX_NAME_BYTES);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        Self(name[..end].to_owned())
    }
}

impl Component for Name {
    const KIND: ComponentKind = ComponentKind::from_const(4);
    const NAME: &'static str = "Name";

    fn encode(&self, out: &mut ByteWriter) {
        out.write_str(&self.0);
    }

    fn decode(reader: &mut ByteReader<'_>) -> StreamResult<Self> {
        Ok(Self(reader.read_str(MAX_NAME_BYTES)?.to_owned()))
    }
}

/// The client that steers this entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Controller {
    pub client_id: u64,
}

impl Component for Controller {
    const KIND: ComponentKind = ComponentKind::from_const(5);
    const NAME: &'static str = "Controller";

    fn encode(&self, out: &mut ByteWriter) {
        out.write_u64(self.client_id);
    }

    fn decode(reader: &mut ByteReader<'_>) -> StreamResult<Self> {
        Ok(Self {
            client_id: reader.read_u64()?,
        })
    }
}

/// Registry shared by the demo server and its clients.
pub fn demo_registry() -> SchemaResult<ComponentRegistry> {
    ComponentRegistry::new()
        .with::<Position>()?
        .with::<Velocity>()?
        .with::<Health>()?
        .with::<ActorTag>()?
        .with::<Name>()?
        .with::<Controller>()
}
