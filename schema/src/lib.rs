//! Component schema for rogue-net replication.
//!
//! This crate defines how replicated component data is identified and
//! (de)serialized:
//! - [`ComponentKind`] ids and the fixed [`ComponentMask`] bitset
//! - the [`Component`] trait with a canonical byte layout per type
//! - the table-driven [`ComponentRegistry`] used by the snapshot codec
//! - a deterministic [`schema_hash`] checked during the handshake
//!
//! # Design Principles
//!
//! - **Table-driven dispatch** - Codecs are looked up by kind, not by type.
//! - **Canonical bytes** - Equal component values always encode to equal payloads.
//! - **Deterministic hashing** - The schema hash is stable given the same registry.

mod component;
mod error;
mod hash;
mod kind;
mod registry;

pub use component::Component;
pub use error::{SchemaError, SchemaResult};
pub use hash::schema_hash;
pub use kind::{ComponentKind, ComponentMask, MaskIter, MAX_COMPONENT_KINDS};
pub use registry::{ComponentRegistry, ComponentVTable};
