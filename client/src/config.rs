//! Client configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use codec::{CodecLimits, DEFAULT_HISTORY_CAPACITY, PROTOCOL_VERSION};
use wire::WireLimits;

/// Tunables for a [`ReplicationClient`](crate::ReplicationClient).
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Sent in `Hello`; must match the server.
    pub protocol_version: u16,
    /// Authoritative snapshots kept as delta bases.
    pub history_capacity: NonZeroUsize,
    /// Unacknowledged inputs kept for replay.
    pub max_input_history: usize,
    /// How far ahead of the welcomed server tick inputs are stamped.
    pub input_lead_ticks: u32,
    /// Silence after which the status reports `stale`.
    pub stale_after: Duration,
    /// Divergence above which a correction snaps instead of smoothing.
    pub snap_threshold: f32,
    /// Fraction of the smoothing offset kept per frame.
    pub smoothing_decay: f32,
    /// Incomplete fragment sets held at once.
    pub max_pending_assemblies: usize,
    pub wire_limits: WireLimits,
    pub limits: CodecLimits,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            history_capacity: NonZeroUsize::new(DEFAULT_HISTORY_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
            max_input_history: 256,
            input_lead_ticks: 2,
            stale_after: Duration::from_secs(1),
            snap_threshold: 8.0,
            smoothing_decay: 0.8,
            max_pending_assemblies: 8,
            wire_limits: WireLimits::default(),
            limits: CodecLimits::default(),
        }
    }
}

impl ClientConfig {
    /// Small buffers and a short stale window for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            history_capacity: NonZeroUsize::new(16).unwrap_or(NonZeroUsize::MIN),
            max_input_history: 32,
            stale_after: Duration::from_millis(200),
            max_pending_assemblies: 4,
            wire_limits: WireLimits::for_testing(),
            limits: CodecLimits::for_testing(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_codec() {
        let config = ClientConfig::default();
        assert_eq!(config.protocol_version, PROTOCOL_VERSION);
        assert_eq!(config.history_capacity.get(), DEFAULT_HISTORY_CAPACITY);
        assert!(config.smoothing_decay < 1.0);
    }

    #[test]
    fn testing_config_keeps_protocol() {
        let config = ClientConfig::for_testing();
        assert_eq!(config.protocol_version, ClientConfig::default().protocol_version);
        assert_eq!(config.history_capacity.get(), 16);
    }
}
