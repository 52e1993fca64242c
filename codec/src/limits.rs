//! Limits for codec-level decoding.

/// Codec-specific limits enforced while decoding message bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecLimits {
    /// Maximum entries (removed + created + updated) in one message.
    pub max_entities_per_message: usize,
    /// Maximum encoded size of a single component payload.
    pub max_payload_bytes: usize,
    /// Maximum size of an input action.
    pub max_action_bytes: usize,
    /// Maximum hint entries in one message.
    pub max_hints: usize,
    /// Maximum length of an actor name.
    pub max_name_bytes: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_entities_per_message: 8192,
            max_payload_bytes: 1024,
            max_action_bytes: 256,
            max_hints: 1024,
            max_name_bytes: 255,
        }
    }
}

impl CodecLimits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_entities_per_message: 128,
            max_payload_bytes: 64,
            max_action_bytes: 32,
            max_hints: 32,
            max_name_bytes: 255,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_entities_per_message: usize::MAX,
            max_payload_bytes: usize::MAX,
            max_action_bytes: usize::MAX,
            max_hints: usize::MAX,
            max_name_bytes: usize::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_name_limit_matches_protocol() {
        assert_eq!(CodecLimits::default().max_name_bytes, 255);
    }

    #[test]
    fn testing_limits_are_smaller() {
        let testing = CodecLimits::for_testing();
        let default = CodecLimits::default();
        assert!(testing.max_entities_per_message < default.max_entities_per_message);
        assert!(testing.max_payload_bytes < default.max_payload_bytes);
    }

    #[test]
    fn unlimited_is_max() {
        let limits = CodecLimits::unlimited();
        assert_eq!(limits.max_hints, usize::MAX);
    }
}
