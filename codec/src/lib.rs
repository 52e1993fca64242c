//! Snapshots, deltas and message bodies for rogue-net replication.
//!
//! This crate ties together bytestream, wire, and schema into the entity
//! snapshot model used by both server and client:
//!
//! - [`extract`] captures a [`Snapshot`] from a world through [`WorldView`]
//! - [`diff`] and [`apply`] move between snapshots via a [`DeltaMessage`]
//! - [`SnapshotHistory`] keeps the ring of recent baselines
//! - body encoders/decoders for every [`wire::MessageKind`]
//!
//! # Design Principles
//!
//! - **Correctness first** - `apply(base, diff(base, current)) == current` for every pair.
//! - **Pure snapshot operations** - `diff` and `apply` never mutate their inputs.
//! - **Deterministic** - Same inputs produce same bytes.
//! - **Forward compatible** - Payloads are length-prefixed so unknown kinds can be skipped.

mod body;
mod delta;
mod error;
mod hint;
mod history;
mod limits;
mod messages;
mod snapshot;
mod types;

pub use body::{
    decode_delta, decode_full_snapshot, decode_snapshot_fragment, delta_items, encode_delta,
    encode_fragments, encode_full_snapshot, DeltaItem, FragmentTarget, SnapshotFragment,
};
pub use delta::{apply, diff, DeltaMessage, EntityUpdate};
pub use error::{CodecError, CodecResult, LimitKind};
pub use hint::{decode_hints, encode_hints, Hint};
pub use history::{History, HistoryError, SnapshotHistory, DEFAULT_HISTORY_CAPACITY};
pub use limits::CodecLimits;
pub use messages::{
    decode_ack, decode_resync, encode_ack, encode_resync, DisconnectReason, Hello, InputCommand,
    Ping, SpawnActor, Welcome, PROTOCOL_VERSION,
};
pub use snapshot::{extract, sync_world, EntityState, Snapshot, SyncStats, WorldMut, WorldView};
pub use types::{EntityId, EntityIdAllocator, Tick};
