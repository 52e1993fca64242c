//! Authoritative replication server for rogue-net.
//!
//! This crate decides what each client receives and when:
//!
//! - [`Connection`] tracks one client through `Connecting → Synchronized`
//!   and into a terminal `TimedOut` or `Disconnected` state.
//! - [`plan_connection`] picks a baseline (last ack, pending full snapshot, or
//!   none) and encodes the delta in priority order.
//! - [`PriorityStrategy`] decides that order; [`DistancePriority`] and
//!   [`RecencyPriority`] are provided.
//! - [`ReplicationServer`] ties it together over any [`channel::Endpoint`].
//!
//! # Design Principles
//!
//! - **Decide what, not how** - Encoding lives in the codec; this crate only plans.
//! - **Pure planning** - Per-connection plans read shared state and write nothing.
//! - **Never fatal** - Bad input is counted and logged; only thresholds disconnect.

mod config;
mod connection;
mod error;
mod priority;
mod scheduler;
mod server;

pub use config::ServerConfig;
pub use connection::{Connection, ConnectionState, ConnectionTable};
pub use error::{ServerError, ServerResult};
pub use priority::{
    prioritize, ChangeLog, DistancePriority, PriorityContext, PriorityStrategy, RecencyPriority,
    Vec2,
};
pub use scheduler::{
    choose_baseline, plan_connection, plan_hints, BaselineChoice, FullReason, PlanInput,
    ReplicationPlan, ReplicationState,
};
pub use server::{ReplicationServer, ServerEvent, ServerStats, TickReport};
