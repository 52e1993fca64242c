//! Replication client for rogue-net.
//!
//! The client side of the protocol:
//!
//! - [`Reassembly`] puts fragmented snapshot messages back together
//! - [`InputHistory`] keeps inputs until a snapshot covers their tick
//! - [`reconcile`] replays those inputs on the newest authoritative state
//!   through the game's [`Predictor`]
//! - [`ReplicationClient`] runs the handshake, acks, resyncs and the
//!   presented world over any [`channel::Endpoint`]
//!
//! # Design Principles
//!
//! - **Prediction is a pure function** - Same snapshot and inputs, same world.
//! - **Never trust the wire** - Bad messages are counted, never fatal.
//! - **Authority wins** - Reliable snapshots override hints and predictions.

mod client;
mod config;
mod error;
mod input;
mod prediction;
mod reassembly;

pub use client::{ClientEvent, ClientState, ClientStats, ClientStatus, ReplicationClient};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use input::InputHistory;
pub use prediction::{reconcile, CorrectionSmoothing, NoPrediction, Predictor};
pub use reassembly::{Assembled, Reassembly};
