//! Byte-level encoding primitives for rogue-net replication messages.
//!
//! This crate provides [`ByteWriter`] and [`ByteReader`], the only way the
//! higher layers touch raw bytes. Everything is little-endian; lengths and
//! counts are varints.
//!
//! # Design Principles
//!
//! - **No unsafe code** - Safety is paramount.
//! - **Bounded reads** - Every read is bounds-checked against the input slice.
//! - **No domain knowledge** - This crate knows nothing about entities, ticks, or messages.
//! - **Explicit errors** - All failures return structured errors, never panic.
//!
//! # Example
//!
//! ```
//! use bytestream::{ByteReader, ByteWriter};
//!
//! let mut writer = ByteWriter::new();
//! writer.write_u32(7);
//! writer.write_str("ship");
//!
//! let bytes = writer.finish();
//!
//! let mut reader = ByteReader::new(&bytes);
//! assert_eq!(reader.read_u32().unwrap(), 7);
//! assert_eq!(reader.read_str(255).unwrap(), "ship");
//! ```

mod error;
mod reader;
mod writer;

pub use error::{StreamError, StreamResult};
pub use reader::ByteReader;
pub use writer::{varu32_len, ByteWriter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_roundtrip() {
        let writer = ByteWriter::new();
        let bytes = writer.finish();
        assert!(bytes.is_empty());

        let reader = ByteReader::new(&bytes);
        assert!(reader.is_empty());
    }

    #[test]
    fn mixed_roundtrip() {
        let mut writer = ByteWriter::new();
        writer.write_bool(true);
        writer.write_u16(0xABCD);
        writer.write_varu32(1_000_000);
        writer.write_vars32(-42);
        writer.write_u64(u64::MAX);
        writer.write_len_prefixed(b"abc");
        let bytes = writer.finish();

        let mut reader = ByteReader::new(&bytes);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_u16().unwrap(), 0xABCD);
        assert_eq!(reader.read_varu32().unwrap(), 1_000_000);
        assert_eq!(reader.read_vars32().unwrap(), -42);
        assert_eq!(reader.read_u64().unwrap(), u64::MAX);
        assert_eq!(reader.read_len_prefixed(16).unwrap(), b"abc");
        assert!(reader.is_empty());
    }
}
