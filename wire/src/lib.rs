//! Wire framing for rogue-net replication messages.
//!
//! Every message is a fixed 13-byte header followed by a kind-specific body:
//!
//! ```text
//! kind u8 | tick u32 | base_tick u32 | fragment_index u16 | fragment_count u16 | body...
//! ```
//!
//! This crate validates the header and hands the body on untouched. It
//! does not know about entities or components, only the structure of messages.
//!
//! # Design Principles
//!
//! - **Fixed header** - One layout for every kind, little-endian.
//! - **Bounded decoding** - Sizes and fragment counts are checked against limits first.
//! - **No domain knowledge** - Body parsing lives in the codec.

mod dispatch;
mod error;
mod header;
mod limits;
mod message;

pub use dispatch::{Handler, HandlerTable};
pub use error::{WireError, WireResult};
pub use header::{decode_header, encode_header, MessageHeader, MessageKind, HEADER_SIZE};
pub use limits::WireLimits;
pub use message::{decode_message, encode_message, WireMessage};
