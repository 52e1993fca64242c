//! Configurable limits for bounded decoding.

/// Wire-level limits for message decoding.
///
/// Enforced before any body parsing. Body-level limits (entity counts,
/// payload sizes) belong to the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireLimits {
    /// Maximum encoded message size in bytes.
    pub max_message_bytes: usize,

    /// Maximum number of fragments a snapshot may be split into.
    pub max_fragments: u16,
}

impl Default for WireLimits {
    fn default() -> Self {
        Self {
            max_message_bytes: 64 * 1024,
            max_fragments: 1024,
        }
    }
}

impl WireLimits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_message_bytes: 4096,
            max_fragments: 16,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_message_bytes: usize::MAX,
            max_fragments: u16::MAX,
        }
    }
}
