//! Deterministic in-memory transport.
//!
//! Every endpoint created from one [`LoopbackNetwork`] shares a single
//! simulated link layer. Time only moves when [`LoopbackNetwork::advance`] is
//! called, and all randomness comes from a seeded RNG, so a run is fully
//! reproducible from its seed and [`LoopbackConditions`].

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::{
    ChannelError, ChannelEvent, ChannelKind, ChannelResult, ConnectionHandle, Connector,
    DeliveryClass, Endpoint, MessageId,
};

/// Link conditions applied to every message on a [`LoopbackNetwork`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoopbackConditions {
    /// Probability in `[0, 1]` that an unreliable message is dropped.
    pub loss: f64,
    /// Probability in `[0, 1]` that an unreliable message is held back.
    pub reorder: f64,
    /// Base one-way delay.
    pub latency_ticks: u32,
    /// Extra random delay, uniform in `0..=jitter_ticks`.
    pub jitter_ticks: u32,
    /// Maximum messages in flight per sending endpoint.
    pub send_queue_capacity: usize,
}

impl Default for LoopbackConditions {
    fn default() -> Self {
        Self {
            loss: 0.0,
            reorder: 0.0,
            latency_ticks: 1,
            jitter_ticks: 0,
            send_queue_capacity: 4096,
        }
    }
}

impl LoopbackConditions {
    /// Instant, lossless delivery on the next advance.
    #[must_use]
    pub fn perfect() -> Self {
        Self {
            latency_ticks: 0,
            ..Self::default()
        }
    }

    /// A lossy link: 10% loss, 10% reorder, 2 ticks latency with 2 ticks jitter.
    #[must_use]
    pub fn lossy() -> Self {
        Self {
            loss: 0.1,
            reorder: 0.1,
            latency_ticks: 2,
            jitter_ticks: 2,
            ..Self::default()
        }
    }
}

/// Traffic counters for a [`LoopbackNetwork`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopbackStats {
    pub sent: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub reordered: u64,
    pub rejected: u64,
}

type EndpointId = usize;

#[derive(Debug)]
struct Link {
    server: EndpointId,
    client: EndpointId,
    closed_by: Option<EndpointId>,
}

impl Link {
    const fn peer_of(&self, endpoint: EndpointId) -> Option<EndpointId> {
        if endpoint == self.server {
            Some(self.client)
        } else if endpoint == self.client {
            Some(self.server)
        } else {
            None
        }
    }
}

#[derive(Debug)]
struct InFlight {
    from: EndpointId,
    to: EndpointId,
    event: ChannelEvent,
}

#[derive(Debug)]
struct NetworkState {
    now: u64,
    rng: StdRng,
    conditions: LoopbackConditions,
    outage_until: u64,
    listeners: HashMap<String, EndpointId>,
    inboxes: Vec<VecDeque<ChannelEvent>>,
    in_flight_per_endpoint: Vec<usize>,
    links: HashMap<ConnectionHandle, Link>,
    /// Keyed by (deliver_at, send sequence) so delivery order is total.
    in_flight: BTreeMap<(u64, u64), InFlight>,
    reliable_tail: HashMap<(ConnectionHandle, EndpointId, ChannelKind), u64>,
    next_sequence: u64,
    next_handle: u64,
    stats: LoopbackStats,
}

impl NetworkState {
    fn new_endpoint(&mut self) -> EndpointId {
        self.inboxes.push(VecDeque::new());
        self.in_flight_per_endpoint.push(0);
        self.inboxes.len() - 1
    }

    fn delay(&mut self) -> u64 {
        let jitter = if self.conditions.jitter_ticks == 0 {
            0
        } else {
            self.rng.gen_range(0..=self.conditions.jitter_ticks)
        };
        u64::from(self.conditions.latency_ticks) + u64::from(jitter)
    }

    fn roll(&mut self, probability: f64) -> bool {
        probability > 0.0 && self.rng.gen_bool(probability.clamp(0.0, 1.0))
    }

    fn enqueue(&mut self, deliver_at: u64, packet: InFlight) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.in_flight_per_endpoint[packet.from] += 1;
        self.in_flight.insert((deliver_at, sequence), packet);
    }

    fn send(
        &mut self,
        from: EndpointId,
        to: ConnectionHandle,
        kind: ChannelKind,
        class: DeliveryClass,
        bytes: Vec<u8>,
    ) -> ChannelResult<MessageId> {
        let link = self
            .links
            .get(&to)
            .ok_or(ChannelError::UnknownConnection { handle: to })?;
        let peer = link
            .peer_of(from)
            .ok_or(ChannelError::UnknownConnection { handle: to })?;
        if link.closed_by.is_some() {
            return Err(ChannelError::ConnectionClosed { handle: to });
        }
        let capacity = self.conditions.send_queue_capacity;
        if self.in_flight_per_endpoint[from] >= capacity {
            self.stats.rejected += 1;
            return Err(ChannelError::SendQueueFull { capacity });
        }

        let id = MessageId::new(self.next_sequence);
        self.stats.sent += 1;
        let packet = InFlight {
            from,
            to: peer,
            event: ChannelEvent::Message {
                from: to,
                kind,
                bytes,
            },
        };

        let mut deliver_at = self.now + self.delay();
        if class.is_reliable() {
            let tail = self.reliable_tail.entry((to, peer, kind)).or_insert(0);
            deliver_at = deliver_at.max(*tail);
            *tail = deliver_at;
        } else {
            if self.now < self.outage_until || self.roll(self.conditions.loss) {
                self.stats.dropped += 1;
                trace!(handle = %to, ?kind, "loopback dropped unreliable message");
                return Ok(id);
            }
            if self.roll(self.conditions.reorder) {
                self.stats.reordered += 1;
                deliver_at += 1 + self.delay();
            }
        }
        self.enqueue(deliver_at, packet);
        Ok(id)
    }

    fn close(&mut self, from: EndpointId, handle: ConnectionHandle) {
        let Some(link) = self.links.get_mut(&handle) else {
            return;
        };
        let Some(peer) = link.peer_of(from) else {
            return;
        };
        if link.closed_by.is_some() {
            return;
        }
        link.closed_by = Some(from);
        debug!(%handle, "loopback connection closed");

        let tail = ChannelKind::ALL
            .iter()
            .filter_map(|kind| self.reliable_tail.get(&(handle, peer, *kind)))
            .copied()
            .max()
            .unwrap_or(0);
        let deliver_at = (self.now + self.delay()).max(tail);
        self.enqueue(
            deliver_at,
            InFlight {
                from,
                to: peer,
                event: ChannelEvent::Closed { handle },
            },
        );
    }

    fn advance(&mut self) {
        self.now += 1;
        if self.now < self.outage_until {
            return;
        }
        let now = self.now;
        let due: Vec<(u64, u64)> = self
            .in_flight
            .range(..=(now, u64::MAX))
            .map(|(key, _)| *key)
            .collect();
        for key in due {
            let Some(packet) = self.in_flight.remove(&key) else {
                continue;
            };
            self.in_flight_per_endpoint[packet.from] -= 1;
            let handle = packet.event.handle();
            let closed_by_receiver = self
                .links
                .get(&handle)
                .is_some_and(|link| link.closed_by == Some(packet.to));
            if closed_by_receiver {
                continue;
            }
            self.stats.delivered += 1;
            self.inboxes[packet.to].push_back(packet.event);
        }
    }
}

/// Shared simulated network. Cheap to clone; all clones drive the same state.
#[derive(Debug, Clone)]
pub struct LoopbackNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl LoopbackNetwork {
    #[must_use]
    pub fn new(conditions: LoopbackConditions, seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(NetworkState {
                now: 0,
                rng: StdRng::seed_from_u64(seed),
                conditions,
                outage_until: 0,
                listeners: HashMap::new(),
                inboxes: Vec::new(),
                in_flight_per_endpoint: Vec::new(),
                links: HashMap::new(),
                in_flight: BTreeMap::new(),
                reliable_tail: HashMap::new(),
                next_sequence: 0,
                next_handle: 1,
                stats: LoopbackStats::default(),
            })),
        }
    }

    /// Starts accepting connections at `address`.
    ///
    /// # Errors
    ///
    /// [`ChannelError::AddressInUse`] if another endpoint listens there.
    pub fn listen(&self, address: &str) -> ChannelResult<LoopbackEndpoint> {
        let mut state = self.state.lock();
        if state.listeners.contains_key(address) {
            return Err(ChannelError::AddressInUse {
                address: address.to_owned(),
            });
        }
        let id = state.new_endpoint();
        state.listeners.insert(address.to_owned(), id);
        debug!(address, "loopback listening");
        Ok(LoopbackEndpoint {
            id,
            state: Arc::clone(&self.state),
        })
    }

    /// Returns a [`Connector`] that opens connections on this network.
    #[must_use]
    pub fn connector(&self) -> LoopbackConnector {
        LoopbackConnector {
            state: Arc::clone(&self.state),
        }
    }

    /// Moves simulated time forward one tick and delivers everything due.
    pub fn advance(&self) {
        self.state.lock().advance();
    }

    /// Suspends delivery for `ticks` ticks. Unreliable messages sent during
    /// the outage are lost; reliable ones arrive, in order, after it ends.
    pub fn outage(&self, ticks: u32) {
        let mut state = self.state.lock();
        let until = state.now + u64::from(ticks) + 1;
        state.outage_until = state.outage_until.max(until);
        debug!(ticks, "loopback outage started");
    }

    /// Replaces the link conditions for messages sent from now on.
    pub fn set_conditions(&self, conditions: LoopbackConditions) {
        self.state.lock().conditions = conditions;
    }

    #[must_use]
    pub fn now(&self) -> u64 {
        self.state.lock().now
    }

    #[must_use]
    pub fn stats(&self) -> LoopbackStats {
        self.state.lock().stats
    }

    /// Messages sent but not yet delivered or discarded.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }
}

/// Opens client connections on a [`LoopbackNetwork`].
#[derive(Debug, Clone)]
pub struct LoopbackConnector {
    state: Arc<Mutex<NetworkState>>,
}

impl Connector for LoopbackConnector {
    type Endpoint = LoopbackEndpoint;

    fn connect(
        &mut self,
        address: &str,
        auth_token: &[u8],
    ) -> ChannelResult<(LoopbackEndpoint, ConnectionHandle)> {
        let mut state = self.state.lock();
        let server = *state
            .listeners
            .get(address)
            .ok_or_else(|| ChannelError::NoListener {
                address: address.to_owned(),
            })?;
        let client = state.new_endpoint();
        let handle = ConnectionHandle::new(state.next_handle);
        state.next_handle += 1;
        state.links.insert(
            handle,
            Link {
                server,
                client,
                closed_by: None,
            },
        );
        state.inboxes[server].push_back(ChannelEvent::Connected {
            handle,
            auth_token: auth_token.to_vec(),
        });
        state.inboxes[client].push_back(ChannelEvent::Connected {
            handle,
            auth_token: Vec::new(),
        });
        debug!(address, %handle, "loopback connected");
        drop(state);

        Ok((
            LoopbackEndpoint {
                id: client,
                state: Arc::clone(&self.state),
            },
            handle,
        ))
    }
}

/// An endpoint on a [`LoopbackNetwork`].
#[derive(Debug)]
pub struct LoopbackEndpoint {
    id: EndpointId,
    state: Arc<Mutex<NetworkState>>,
}

impl Endpoint for LoopbackEndpoint {
    type Events = std::collections::vec_deque::IntoIter<ChannelEvent>;

    fn send(
        &mut self,
        to: ConnectionHandle,
        kind: ChannelKind,
        class: DeliveryClass,
        bytes: Vec<u8>,
    ) -> ChannelResult<MessageId> {
        self.state.lock().send(self.id, to, kind, class, bytes)
    }

    fn poll(&mut self) -> Self::Events {
        std::mem::take(&mut self.state.lock().inboxes[self.id]).into_iter()
    }

    fn close(&mut self, handle: ConnectionHandle) {
        self.state.lock().close(self.id, handle);
    }
}
