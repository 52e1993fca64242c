//! Error types for byte stream operations.

use thiserror::Error;

/// Result type for byte stream operations.
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors that can occur while decoding a byte stream.
///
/// Writers are growable and infallible; every error here comes from reading
/// untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// Attempted to read past the end of the buffer.
    #[error("attempted to read {requested} bytes but only {available} bytes available")]
    UnexpectedEof {
        /// Number of bytes requested.
        requested: usize,
        /// Number of bytes available.
        available: usize,
    },

    /// A varint ran past five bytes.
    #[error("invalid varint encoding")]
    InvalidVarint,

    /// A length prefix exceeded the caller's bound.
    #[error("length prefix {length} exceeds limit {max}")]
    LengthOutOfBounds {
        /// Decoded length.
        length: usize,
        /// Maximum length accepted.
        max: usize,
    },

    /// A string field was not valid UTF-8.
    #[error("string field is not valid utf-8")]
    InvalidUtf8,

    /// Bytes were left over after a complete value was decoded.
    #[error("{remaining} trailing bytes after value")]
    TrailingBytes {
        /// Unread byte count.
        remaining: usize,
    },

    /// A value was outside the range its field allows.
    #[error("value {value} out of range for {field}")]
    ValueOutOfRange {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_unexpected_eof() {
        let err = StreamError::UnexpectedEof {
            requested: 8,
            available: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("8 bytes"), "should mention requested bytes");
        assert!(msg.contains("3 bytes"), "should mention available bytes");
    }

    #[test]
    fn error_display_length_out_of_bounds() {
        let err = StreamError::LengthOutOfBounds {
            length: 300,
            max: 255,
        };
        let msg = err.to_string();
        assert!(msg.contains("300"));
        assert!(msg.contains("255"));
    }

    #[test]
    fn error_equality() {
        let a = StreamError::UnexpectedEof {
            requested: 4,
            available: 1,
        };
        let b = StreamError::UnexpectedEof {
            requested: 4,
            available: 2,
        };
        assert_ne!(a, b);
        assert_eq!(a.clone(), a);
    }

    #[test]
    fn error_is_std_error() {
        fn assert_error<E: std::error::Error + Send + Sync + 'static>() {}
        assert_error::<StreamError>();
    }
}
