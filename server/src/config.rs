//! Server configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use codec::{CodecLimits, DEFAULT_HISTORY_CAPACITY, PROTOCOL_VERSION};
use schema::ComponentMask;
use wire::WireLimits;

/// Tunables for a [`ReplicationServer`](crate::ReplicationServer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Must match the client's `Hello`.
    pub protocol_version: u16,
    pub tick_rate_hz: u16,
    /// Snapshots kept as delta baselines.
    pub history_capacity: NonZeroUsize,
    /// Upper bound for one encoded fragment.
    pub max_message_bytes: usize,
    /// A reliable delta goes out every `snapshot_interval` ticks; hints fill the gaps.
    pub snapshot_interval: u32,
    /// Component kinds carried by unreliable hints.
    pub hint_components: ComponentMask,
    /// Silence after which a connection times out.
    pub connection_timeout: Duration,
    pub max_connections: usize,
    /// Malformed messages tolerated before disconnecting.
    pub malformed_threshold: u32,
    /// Consecutive reliable ticks whose snapshot could not be encoded within
    /// the fragment limit before the connection is dropped.
    pub max_failed_plans: u32,
    /// Inputs held per connection while waiting for their tick.
    pub max_queued_inputs: usize,
    /// Limits applied to inbound message framing.
    pub wire_limits: WireLimits,
    /// Limits applied to inbound message bodies.
    pub limits: CodecLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            tick_rate_hz: 60,
            history_capacity: NonZeroUsize::new(DEFAULT_HISTORY_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
            max_message_bytes: 1200,
            snapshot_interval: 1,
            hint_components: ComponentMask::EMPTY,
            connection_timeout: Duration::from_secs(5),
            max_connections: 64,
            malformed_threshold: 8,
            max_failed_plans: 3,
            max_queued_inputs: 128,
            wire_limits: WireLimits::default(),
            limits: CodecLimits::default(),
        }
    }
}

impl ServerConfig {
    /// Small limits and a short timeout for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            history_capacity: NonZeroUsize::new(16).unwrap_or(NonZeroUsize::MIN),
            max_message_bytes: 512,
            connection_timeout: Duration::from_millis(500),
            max_connections: 4,
            malformed_threshold: 3,
            max_queued_inputs: 16,
            wire_limits: WireLimits::for_testing(),
            limits: CodecLimits::for_testing(),
            ..Self::default()
        }
    }

    /// Duration of one tick at `tick_rate_hz`.
    #[must_use]
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs(1) / u32::from(self.tick_rate_hz.max(1))
    }

    /// Whether `tick` carries a reliable snapshot message.
    #[must_use]
    pub const fn is_snapshot_tick(&self, tick: codec::Tick) -> bool {
        let interval = if self.snapshot_interval == 0 {
            1
        } else {
            self.snapshot_interval
        };
        tick.raw() % interval == 0
    }
}
