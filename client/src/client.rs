//! The replication client tick loop.

use std::collections::BTreeMap;
use std::time::Duration;

use channel::{ChannelEvent, ChannelKind, Connector, ConnectionHandle, DeliveryClass, Endpoint};
use codec::{
    apply, decode_hints, decode_snapshot_fragment, encode_ack, encode_resync, sync_world,
    CodecResult, DisconnectReason, EntityId, Hello, InputCommand, Ping, Snapshot, SnapshotHistory,
    SpawnActor, SyncStats, Tick, Welcome, WorldMut,
};
use schema::{ComponentKind, ComponentRegistry};
use tracing::{debug, info, warn};
use wire::{decode_message, HandlerTable, MessageKind, WireMessage};

use crate::error::malformed;
use crate::prediction::{reconcile, CorrectionSmoothing, Predictor};
use crate::reassembly::{Assembled, Reassembly};
use crate::{ClientConfig, ClientError, ClientResult, InputHistory};

type ClientHandlers<E, P> = HandlerTable<ReplicationClient<E, P>, ConnectionHandle, ClientError>;

/// Where the client is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// `Hello` sent, waiting for `Welcome`.
    Handshaking,
    /// Welcomed, waiting for the first full snapshot.
    AwaitingSnapshot,
    /// Has an authoritative baseline and is sending input.
    Synchronized,
    Disconnected,
}

impl ClientState {
    #[must_use]
    pub const fn is_connected(self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

/// What the rendering side needs to know about replication health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStatus {
    pub state: ClientState,
    /// No authoritative update for longer than `stale_after`.
    pub stale: bool,
    /// A delta arrived whose base is unknown; waiting for a full snapshot.
    pub desynced: bool,
    pub last_applied: Option<Tick>,
    pub local_tick: Tick,
    pub pending_inputs: usize,
    pub rtt: Option<Duration>,
    pub disconnect_reason: Option<DisconnectReason>,
}

/// Something the game may react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Connected { connection_id: u32, server_tick: Tick },
    /// The first full snapshot was applied.
    Synchronized { tick: Tick },
    SnapshotApplied { tick: Tick, full: bool },
    /// A delta referenced an unknown base; a full snapshot was requested.
    ResyncRequested { missing_base: Tick },
    /// A prediction error too large to smooth.
    HardSnap { entity: EntityId },
    Disconnected { reason: DisconnectReason },
}

/// Running counters since the client connected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub full_snapshots: u64,
    pub deltas: u64,
    /// Deltas dropped because their base was unknown.
    pub stale_deltas: u64,
    pub resyncs: u64,
    pub hard_snaps: u64,
    pub hints: u64,
    pub inputs_sent: u64,
    pub dropped_sends: u64,
    pub malformed: u64,
    pub bytes_received: u64,
}

/// One connection to a replication server.
///
/// Call [`tick`](Self::tick) once per local frame: it drains the channel,
/// applies snapshots, stamps and sends the frame's input, and rebuilds the
/// presented world.
pub struct ReplicationClient<E: Endpoint, P: Predictor> {
    endpoint: E,
    handle: ConnectionHandle,
    config: ClientConfig,
    registry: ComponentRegistry,
    client_id: u64,
    predictor: P,
    handlers: ClientHandlers<E, P>,
    state: ClientState,
    disconnect_reason: Option<DisconnectReason>,
    local_tick: Tick,
    next_sequence: u32,
    history: SnapshotHistory,
    last_applied: Option<Tick>,
    last_update: Option<Duration>,
    predicted: Snapshot,
    presented: Snapshot,
    hints: BTreeMap<(EntityId, ComponentKind), (Tick, Vec<u8>)>,
    inputs: InputHistory,
    reassembly: Reassembly,
    smoothing: CorrectionSmoothing,
    awaiting_full: bool,
    needs_sync_input: bool,
    now: Duration,
    /// Nonce and send time of the newest unanswered ping.
    pending_ping: Option<(u64, Duration)>,
    next_nonce: u64,
    rtt: Option<Duration>,
    events: Vec<ClientEvent>,
    stats: ClientStats,
}

impl<E: Endpoint, P: Predictor> std::fmt::Debug for ReplicationClient<E, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationClient")
            .field("handle", &self.handle)
            .field("client_id", &self.client_id)
            .field("state", &self.state)
            .field("local_tick", &self.local_tick)
            .field("last_applied", &self.last_applied)
            .finish_non_exhaustive()
    }
}

impl<E: Endpoint, P: Predictor> ReplicationClient<E, P> {
    /// Opens a connection through `connector` and sends `Hello`.
    pub fn connect<C>(
        connector: &mut C,
        address: &str,
        auth_token: &[u8],
        config: ClientConfig,
        registry: ComponentRegistry,
        client_id: u64,
        predictor: P,
    ) -> ClientResult<Self>
    where
        C: Connector<Endpoint = E>,
    {
        let (endpoint, handle) = connector.connect(address, auth_token)?;
        let hello = Hello {
            protocol_version: config.protocol_version,
            schema_hash: registry.hash(),
            client_id,
        };
        let mut client = Self {
            endpoint,
            handle,
            history: SnapshotHistory::new(config.history_capacity),
            inputs: InputHistory::new(config.max_input_history),
            reassembly: Reassembly::new(config.max_pending_assemblies),
            config,
            registry,
            client_id,
            predictor,
            handlers: Self::handler_table(),
            state: ClientState::Handshaking,
            disconnect_reason: None,
            local_tick: Tick::ZERO,
            next_sequence: 1,
            last_applied: None,
            last_update: None,
            predicted: Snapshot::empty(Tick::ZERO),
            presented: Snapshot::empty(Tick::ZERO),
            hints: BTreeMap::new(),
            smoothing: CorrectionSmoothing::new(),
            awaiting_full: false,
            needs_sync_input: false,
            now: Duration::ZERO,
            pending_ping: None,
            next_nonce: 1,
            rtt: None,
            events: Vec::new(),
            stats: ClientStats::default(),
        };
        client
            .endpoint
            .send(handle, ChannelKind::Control, DeliveryClass::ReliableOrdered, hello.encode())?;
        info!(%handle, client_id, address, "connecting");
        Ok(client)
    }

    fn handler_table() -> ClientHandlers<E, P> {
        HandlerTable::new()
            .on(MessageKind::Welcome, Self::on_welcome)
            .on(MessageKind::FullSnapshot, Self::on_snapshot)
            .on(MessageKind::Delta, Self::on_snapshot)
            .on(MessageKind::Hint, Self::on_hint)
            .on(MessageKind::Ping, Self::on_ping)
            .on(MessageKind::Pong, Self::on_pong)
            .on(MessageKind::Disconnect, Self::on_disconnect)
    }

    /// The presented world: predicted state plus fresh hints.
    #[must_use]
    pub const fn world(&self) -> &Snapshot {
        &self.presented
    }

    /// The predicted world without hints.
    #[must_use]
    pub const fn predicted(&self) -> &Snapshot {
        &self.predicted
    }

    /// The newest authoritative snapshot applied.
    #[must_use]
    pub fn authoritative(&self) -> Option<&Snapshot> {
        self.last_applied.and_then(|tick| self.history.get(tick))
    }

    #[must_use]
    pub fn status(&self) -> ClientStatus {
        ClientStatus {
            state: self.state,
            stale: self.is_stale(),
            desynced: self.awaiting_full,
            last_applied: self.last_applied,
            local_tick: self.local_tick,
            pending_inputs: self.inputs.len(),
            rtt: self.rtt,
            disconnect_reason: self.disconnect_reason,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ClientState {
        self.state
    }

    #[must_use]
    pub const fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    #[must_use]
    pub const fn client_id(&self) -> u64 {
        self.client_id
    }

    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub const fn stats(&self) -> ClientStats {
        self.stats
    }

    #[must_use]
    pub const fn inputs(&self) -> &InputHistory {
        &self.inputs
    }

    #[must_use]
    pub const fn smoothing(&self) -> &CorrectionSmoothing {
        &self.smoothing
    }

    #[must_use]
    pub const fn predictor(&self) -> &P {
        &self.predictor
    }

    #[must_use]
    pub const fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Mirrors the presented world into a game world.
    pub fn sync_world<W: WorldMut + ?Sized>(&self, world: &mut W) -> CodecResult<SyncStats> {
        sync_world(world, &self.presented)
    }

    /// Runs one local frame at time `now`, sending `action` if synchronized.
    pub fn tick(&mut self, now: Duration, action: Option<Vec<u8>>) -> Vec<ClientEvent> {
        self.now = self.now.max(now);

        let inbound: Vec<ChannelEvent> = self.endpoint.poll().collect();
        for event in inbound {
            match event {
                ChannelEvent::Connected { handle, .. } => debug!(%handle, "channel open"),
                ChannelEvent::Message { from, bytes, .. } => self.receive(from, &bytes),
                ChannelEvent::Closed { .. } => self.lost(DisconnectReason::ChannelClosed),
            }
        }
        if !self.state.is_connected() {
            return std::mem::take(&mut self.events);
        }

        if self.state != ClientState::Handshaking {
            self.local_tick = self.local_tick.next();
        }
        if self.state == ClientState::Synchronized {
            match action {
                Some(action) => self.send_input(action),
                None if self.needs_sync_input => self.send_input(Vec::new()),
                None => {}
            }
        }

        self.smoothing.decay(self.config.smoothing_decay);
        self.present();
        std::mem::take(&mut self.events)
    }

    /// Asks the server to spawn an actor for this client.
    pub fn request_spawn(&mut self, name: &str) -> ClientResult<()> {
        let bytes = SpawnActor {
            name: name.to_owned(),
        }
        .encode(self.local_tick);
        self.send(ChannelKind::Control, DeliveryClass::ReliableOrdered, bytes)
    }

    /// Sends a ping; the round trip is reported in [`ClientStatus::rtt`].
    ///
    /// Only the newest ping is tracked; a pong for an older one is ignored.
    pub fn ping(&mut self) -> ClientResult<u64> {
        let nonce = self.next_nonce;
        self.next_nonce = self.next_nonce.wrapping_add(1);
        let ping = Ping {
            tick: self.local_tick,
            nonce,
        };
        self.send(ChannelKind::Control, DeliveryClass::Unreliable, ping.encode())?;
        self.pending_ping = Some((nonce, self.now));
        Ok(nonce)
    }

    /// Leaves politely: tells the server, then closes the channel.
    pub fn disconnect(&mut self) {
        if !self.state.is_connected() {
            return;
        }
        let notice = DisconnectReason::Requested.encode(self.local_tick);
        if let Err(err) = self.send(ChannelKind::Control, DeliveryClass::ReliableOrdered, notice) {
            debug!(%err, "disconnect notice not sent");
        }
        self.endpoint.close(self.handle);
        self.state = ClientState::Disconnected;
        self.disconnect_reason = Some(DisconnectReason::Requested);
        info!(handle = %self.handle, "disconnected");
    }

    fn is_stale(&self) -> bool {
        if self.state != ClientState::Synchronized {
            return false;
        }
        self.last_update
            .is_some_and(|at| self.now.saturating_sub(at) > self.config.stale_after)
    }

    fn send_input(&mut self, action: Vec<u8>) {
        let command = InputCommand {
            sequence: self.next_sequence,
            tick: self.local_tick,
            action,
        };
        self.next_sequence = self.next_sequence.wrapping_add(1);
        let bytes = command.encode();
        if !command.action.is_empty() {
            self.predictor.apply_input(&mut self.predicted, &command);
            if let Some(dropped) = self.inputs.push(command) {
                warn!(sequence = dropped.sequence, "input history full, dropping oldest");
            }
        }
        match self.send(ChannelKind::Input, DeliveryClass::ReliableOrdered, bytes) {
            Ok(()) => {
                self.stats.inputs_sent += 1;
                self.needs_sync_input = false;
            }
            Err(err) => warn!(%err, "input not sent"),
        }
    }

    fn send(
        &mut self,
        kind: ChannelKind,
        class: DeliveryClass,
        bytes: Vec<u8>,
    ) -> ClientResult<()> {
        match self.endpoint.send(self.handle, kind, class, bytes) {
            Ok(_) => Ok(()),
            Err(err) => {
                self.stats.dropped_sends += 1;
                Err(err.into())
            }
        }
    }

    fn receive(&mut self, from: ConnectionHandle, bytes: &[u8]) {
        self.stats.bytes_received += bytes.len() as u64;
        let state = self.state;
        let result = match decode_message(bytes, &self.config.wire_limits) {
            Ok(message) => match self.handlers.get(message.kind()) {
                Some(handler) => handler(self, from, &message),
                None => Err(ClientError::UnexpectedMessage {
                    kind: message.kind(),
                    state,
                }),
            },
            Err(err) => Err(malformed(err.into())),
        };
        if let Err(err) = result {
            if err.is_malformed() {
                self.stats.malformed += 1;
                warn!(%err, "discarding message");
            } else {
                debug!(%err, "message handling failed");
            }
        }
    }

    fn lost(&mut self, reason: DisconnectReason) {
        if !self.state.is_connected() {
            return;
        }
        self.state = ClientState::Disconnected;
        self.disconnect_reason = Some(reason);
        self.events.push(ClientEvent::Disconnected { reason });
        info!(handle = %self.handle, ?reason, "connection lost");
    }

    fn on_welcome(
        &mut self,
        _from: ConnectionHandle,
        message: &WireMessage<'_>,
    ) -> ClientResult<()> {
        if self.state != ClientState::Handshaking {
            return Err(ClientError::UnexpectedMessage {
                kind: MessageKind::Welcome,
                state: self.state,
            });
        }
        let welcome = Welcome::decode(message).map_err(malformed)?;
        self.local_tick = Tick::new(
            welcome
                .server_tick
                .raw()
                .saturating_add(self.config.input_lead_ticks),
        );
        self.state = ClientState::AwaitingSnapshot;
        self.last_update = Some(self.now);
        info!(
            connection_id = welcome.connection_id,
            server_tick = %welcome.server_tick,
            tick_rate_hz = welcome.tick_rate_hz,
            "welcomed"
        );
        self.events.push(ClientEvent::Connected {
            connection_id: welcome.connection_id,
            server_tick: welcome.server_tick,
        });
        Ok(())
    }

    fn on_snapshot(
        &mut self,
        _from: ConnectionHandle,
        message: &WireMessage<'_>,
    ) -> ClientResult<()> {
        if !matches!(
            self.state,
            ClientState::AwaitingSnapshot | ClientState::Synchronized
        ) {
            return Err(ClientError::UnexpectedMessage {
                kind: message.kind(),
                state: self.state,
            });
        }
        let fragment = decode_snapshot_fragment(message, &self.registry, &self.config.limits)
            .map_err(malformed)?;
        let tick = fragment.changes.current_tick;
        if self.last_applied.is_some_and(|applied| tick <= applied) {
            debug!(%tick, "ignoring old snapshot");
            return Ok(());
        }
        match self.reassembly.insert(fragment) {
            Some(assembled) => self.apply_assembled(assembled),
            None => Ok(()),
        }
    }

    fn apply_assembled(&mut self, assembled: Assembled) -> ClientResult<()> {
        let Assembled { full, changes } = assembled;
        let tick = changes.current_tick;
        let snapshot = if full {
            let snapshot = changes.into_snapshot().map_err(malformed)?;
            self.history.clear();
            self.hints.clear();
            self.awaiting_full = false;
            self.stats.full_snapshots += 1;
            snapshot
        } else {
            let Some(base) = self.history.get(changes.base_tick) else {
                self.stats.stale_deltas += 1;
                self.request_resync(changes.base_tick);
                return Ok(());
            };
            let snapshot = apply(base, &changes).map_err(malformed)?;
            self.stats.deltas += 1;
            snapshot
        };

        if let Err(err) = self.history.insert(tick, snapshot) {
            warn!(%tick, %err, "snapshot not recorded");
            return Ok(());
        }
        self.last_applied = Some(tick);
        self.last_update = Some(self.now);
        if let Err(err) = self.send(
            ChannelKind::Replication,
            DeliveryClass::Unreliable,
            encode_ack(tick),
        ) {
            debug!(%tick, %err, "ack not sent");
        }
        self.inputs.acknowledge(tick);
        self.hints.retain(|_, (hint_tick, _)| *hint_tick > tick);
        self.reassembly.discard_through(tick);

        if self.state == ClientState::AwaitingSnapshot {
            self.state = ClientState::Synchronized;
            self.needs_sync_input = true;
            info!(%tick, "synchronized");
            self.events.push(ClientEvent::Synchronized { tick });
        }
        self.events.push(ClientEvent::SnapshotApplied { tick, full });
        self.reconcile();
        Ok(())
    }

    fn request_resync(&mut self, missing_base: Tick) {
        if self.awaiting_full {
            return;
        }
        self.awaiting_full = true;
        warn!(%missing_base, "delta base unknown, requesting full snapshot");
        let last_applied = self.last_applied.unwrap_or(Tick::ZERO);
        match self.send(
            ChannelKind::Control,
            DeliveryClass::ReliableOrdered,
            encode_resync(last_applied),
        ) {
            Ok(()) => {
                self.stats.resyncs += 1;
                self.events.push(ClientEvent::ResyncRequested { missing_base });
            }
            Err(err) => {
                self.awaiting_full = false;
                warn!(%err, "resync not sent");
            }
        }
    }

    fn reconcile(&mut self) {
        let Some(authoritative) = self.last_applied.and_then(|tick| self.history.get(tick)) else {
            return;
        };
        let predicted = reconcile(&self.predictor, authoritative, &self.inputs);
        let snapped = self.smoothing.observe(
            &self.predictor,
            &self.predicted,
            &predicted,
            self.config.snap_threshold,
        );
        for entity in snapped {
            self.stats.hard_snaps += 1;
            debug!(%entity, "prediction snapped");
            self.events.push(ClientEvent::HardSnap { entity });
        }
        self.predicted = predicted;
        self.present();
    }

    fn present(&mut self) {
        let mut presented = self.predicted.clone();
        let controlled = self.predictor.controlled_entity(&presented);
        for ((entity, kind), (_, payload)) in &self.hints {
            if Some(*entity) == controlled {
                continue;
            }
            let state = presented.entity_mut(*entity);
            if let Some(state) = state.filter(|state| state.contains(*kind)) {
                state.insert(*kind, payload.clone());
            }
        }
        self.presented = presented;
    }

    fn on_hint(
        &mut self,
        _from: ConnectionHandle,
        message: &WireMessage<'_>,
    ) -> ClientResult<()> {
        if self.state != ClientState::Synchronized {
            return Ok(());
        }
        let (tick, hints) =
            decode_hints(message, &self.registry, &self.config.limits).map_err(malformed)?;
        if self.last_applied.is_some_and(|applied| tick <= applied) {
            return Ok(());
        }
        self.stats.hints += 1;
        for hint in hints {
            let slot = self
                .hints
                .entry((hint.entity, hint.kind))
                .or_insert((Tick::ZERO, Vec::new()));
            if slot.0 < tick {
                *slot = (tick, hint.payload);
            }
        }
        self.present();
        Ok(())
    }

    fn on_ping(
        &mut self,
        _from: ConnectionHandle,
        message: &WireMessage<'_>,
    ) -> ClientResult<()> {
        let ping = Ping::decode(message).map_err(malformed)?;
        let pong = ping.encode_pong(self.local_tick);
        self.send(ChannelKind::Control, DeliveryClass::Unreliable, pong)
    }

    fn on_pong(
        &mut self,
        _from: ConnectionHandle,
        message: &WireMessage<'_>,
    ) -> ClientResult<()> {
        let pong = Ping::decode(message).map_err(malformed)?;
        if let Some((nonce, sent)) = self.pending_ping {
            if nonce != pong.nonce {
                return Ok(());
            }
            self.pending_ping = None;
            let rtt = self.now.saturating_sub(sent);
            debug!(?rtt, "round trip measured");
            self.rtt = Some(rtt);
        }
        Ok(())
    }

    fn on_disconnect(
        &mut self,
        _from: ConnectionHandle,
        message: &WireMessage<'_>,
    ) -> ClientResult<()> {
        let reason = DisconnectReason::decode(message).map_err(malformed)?;
        self.endpoint.close(self.handle);
        self.lost(reason);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytestream::{ByteReader, ByteWriter, StreamResult};
    use channel::{LoopbackConditions, LoopbackEndpoint, LoopbackNetwork};
    use codec::{diff, encode_delta, encode_full_snapshot, encode_hints, EntityState, Hint};
    use schema::Component;
    use wire::WireLimits;

    use super::*;
    use crate::NoPrediction;

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    struct Level(u8);

    impl Component for Level {
        const KIND: ComponentKind = ComponentKind::from_const(0);
        const NAME: &'static str = "Level";

        fn encode(&self, out: &mut ByteWriter) {
            out.write_u8(self.0);
        }

        fn decode(reader: &mut ByteReader<'_>) -> StreamResult<Self> {
            Ok(Self(reader.read_u8()?))
        }
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    struct Badge(u8);

    impl Component for Badge {
        const KIND: ComponentKind = ComponentKind::from_const(1);
        const NAME: &'static str = "Badge";

        fn encode(&self, out: &mut ByteWriter) {
            out.write_u8(self.0);
        }

        fn decode(reader: &mut ByteReader<'_>) -> StreamResult<Self> {
            Ok(Self(reader.read_u8()?))
        }
    }

    fn registry() -> ComponentRegistry {
        ComponentRegistry::new()
            .with::<Level>()
            .unwrap()
            .with::<Badge>()
            .unwrap()
    }

    fn snapshot(tick: u32, level: u8) -> Snapshot {
        let mut snapshot = Snapshot::empty(Tick::new(tick));
        snapshot
            .insert(EntityId::new(1), EntityState::new().with(&Level(level)))
            .unwrap();
        snapshot
    }

    struct Rig {
        network: LoopbackNetwork,
        server: LoopbackEndpoint,
        client: ReplicationClient<LoopbackEndpoint, NoPrediction>,
        now: Duration,
    }

    impl Rig {
        fn new() -> Self {
            let network = LoopbackNetwork::new(LoopbackConditions::perfect(), 1);
            let server = network.listen("server").unwrap();
            let client = ReplicationClient::connect(
                &mut network.connector(),
                "server",
                b"token",
                ClientConfig::for_testing(),
                registry(),
                42,
                NoPrediction,
            )
            .unwrap();
            Self {
                network,
                server,
                client,
                now: Duration::ZERO,
            }
        }

        fn welcomed() -> Self {
            let mut rig = Self::new();
            rig.send(
                Welcome {
                    server_tick: Tick::new(3),
                    connection_id: 1,
                    tick_rate_hz: 20,
                    history_capacity: 16,
                }
                .encode(),
            );
            rig.step();
            rig
        }

        fn send(&mut self, bytes: Vec<u8>) {
            let handle = self.client.handle();
            self.server
                .send(handle, ChannelKind::Replication, DeliveryClass::ReliableOrdered, bytes)
                .unwrap();
        }

        fn step(&mut self) -> Vec<ClientEvent> {
            self.network.advance();
            self.now += Duration::from_millis(50);
            self.client.tick(self.now, None)
        }

        /// Messages the client has sent since the last call.
        fn received(&mut self) -> Vec<(MessageKind, Vec<u8>)> {
            self.network.advance();
            self.server
                .poll()
                .filter_map(|event| match event {
                    ChannelEvent::Message { bytes, .. } => {
                        let kind = decode_message(&bytes, &WireLimits::default())
                            .unwrap()
                            .kind();
                        Some((kind, bytes))
                    }
                    _ => None,
                })
                .collect()
        }

        fn full(&mut self, tick: u32, level: u8) {
            let bytes = encode_full_snapshot(&snapshot(tick, level), &registry());
            self.send(bytes);
        }

        fn delta(&mut self, base: (u32, u8), current: (u32, u8)) {
            let delta = diff(&snapshot(base.0, base.1), &snapshot(current.0, current.1));
            let bytes = encode_delta(&delta, &registry());
            self.send(bytes);
        }
    }

    fn level_of(world: &Snapshot) -> Option<Level> {
        world.entity(EntityId::new(1)).and_then(EntityState::component)
    }

    #[test]
    fn connect_sends_hello() {
        let mut rig = Rig::new();
        let sent = rig.received();
        assert_eq!(sent.len(), 1);
        let message = decode_message(&sent[0].1, &WireLimits::default()).unwrap();
        let hello = Hello::decode(&message).unwrap();
        assert_eq!(hello.client_id, 42);
        assert_eq!(hello.schema_hash, registry().hash());
        assert_eq!(rig.client.state(), ClientState::Handshaking);
    }

    #[test]
    fn welcome_moves_to_awaiting_snapshot() {
        let mut rig = Rig::new();
        rig.send(
            Welcome {
                server_tick: Tick::new(3),
                connection_id: 9,
                tick_rate_hz: 20,
                history_capacity: 16,
            }
            .encode(),
        );
        let events = rig.step();
        assert_eq!(
            events,
            vec![ClientEvent::Connected {
                connection_id: 9,
                server_tick: Tick::new(3)
            }]
        );
        assert_eq!(rig.client.state(), ClientState::AwaitingSnapshot);
        assert!(rig.client.status().local_tick > Tick::new(3));
    }

    #[test]
    fn first_full_snapshot_synchronizes_acks_and_sends_sync_input() {
        let mut rig = Rig::welcomed();
        rig.received();
        rig.full(5, 1);
        let events = rig.step();
        assert!(events.contains(&ClientEvent::Synchronized { tick: Tick::new(5) }));
        assert!(events.contains(&ClientEvent::SnapshotApplied {
            tick: Tick::new(5),
            full: true
        }));
        assert_eq!(rig.client.world(), &snapshot(5, 1));

        let kinds: Vec<MessageKind> = rig.received().into_iter().map(|(kind, _)| kind).collect();
        assert_eq!(kinds, vec![MessageKind::Ack, MessageKind::Input]);

        rig.step();
        assert!(rig.received().is_empty(), "sync input goes out once");
    }

    #[test]
    fn unknown_base_requests_one_resync_until_full_snapshot() {
        let mut rig = Rig::welcomed();
        rig.full(5, 1);
        rig.step();
        rig.received();

        rig.delta((7, 1), (8, 2));
        let events = rig.step();
        assert!(events.contains(&ClientEvent::ResyncRequested {
            missing_base: Tick::new(7)
        }));
        assert!(rig.client.status().desynced);

        rig.delta((8, 2), (9, 3));
        let events = rig.step();
        assert!(!events
            .iter()
            .any(|event| matches!(event, ClientEvent::ResyncRequested { .. })));
        let resyncs = rig
            .received()
            .into_iter()
            .filter(|(kind, _)| *kind == MessageKind::Resync)
            .count();
        assert_eq!(resyncs, 1);
        assert_eq!(rig.client.stats().stale_deltas, 2);

        rig.full(10, 4);
        rig.step();
        let status = rig.client.status();
        assert!(!status.desynced);
        assert_eq!(status.last_applied, Some(Tick::new(10)));
        assert_eq!(level_of(rig.client.world()), Some(Level(4)));
    }

    #[test]
    fn delta_applies_on_known_base() {
        let mut rig = Rig::welcomed();
        rig.full(5, 1);
        rig.step();
        rig.delta((5, 1), (6, 2));
        let events = rig.step();
        assert!(events.contains(&ClientEvent::SnapshotApplied {
            tick: Tick::new(6),
            full: false
        }));
        assert_eq!(level_of(rig.client.world()), Some(Level(2)));
        assert_eq!(rig.client.authoritative(), Some(&snapshot(6, 2)));
    }

    #[test]
    fn older_snapshots_are_ignored() {
        let mut rig = Rig::welcomed();
        rig.full(5, 1);
        rig.step();
        rig.full(4, 7);
        let events = rig.step();
        assert!(events.is_empty());
        assert_eq!(rig.client.status().last_applied, Some(Tick::new(5)));
    }

    #[test]
    fn silence_marks_the_status_stale() {
        let mut rig = Rig::welcomed();
        rig.full(5, 1);
        rig.step();
        assert!(!rig.client.status().stale);
        let later = rig.now + Duration::from_millis(500);
        rig.client.tick(later, None);
        assert!(rig.client.status().stale);

        rig.delta((5, 1), (6, 1));
        rig.step();
        assert!(!rig.client.status().stale);
    }

    #[test]
    fn hints_overlay_until_a_newer_snapshot() {
        let mut rig = Rig::welcomed();
        rig.full(5, 1);
        rig.step();

        let hint = Hint {
            entity: EntityId::new(1),
            kind: Level::KIND,
            payload: Level(9).to_payload(),
        };
        rig.send(encode_hints(Tick::new(6), &[hint]));
        rig.step();
        assert_eq!(level_of(rig.client.world()), Some(Level(9)));
        assert_eq!(level_of(rig.client.predicted()), Some(Level(1)));

        rig.delta((5, 1), (7, 2));
        rig.step();
        assert_eq!(level_of(rig.client.world()), Some(Level(2)));
    }

    #[test]
    fn hints_never_add_components() {
        let mut rig = Rig::welcomed();
        rig.full(5, 1);
        rig.step();

        let hints = [
            Hint {
                entity: EntityId::new(1),
                kind: Badge::KIND,
                payload: Badge(3).to_payload(),
            },
            Hint {
                entity: EntityId::new(2),
                kind: Level::KIND,
                payload: Level(4).to_payload(),
            },
        ];
        rig.send(encode_hints(Tick::new(6), &hints));
        rig.step();
        assert_eq!(rig.client.stats().hints, 1);
        let world = rig.client.world();
        assert_eq!(world.len(), 1);
        let state = world.entity(EntityId::new(1)).unwrap();
        assert!(!state.contains(Badge::KIND));
        assert_eq!(state.component::<Level>(), Some(Level(1)));
    }

    #[test]
    fn garbage_is_counted_not_fatal() {
        let mut rig = Rig::welcomed();
        rig.send(vec![0xff, 0x00, 0x01]);
        rig.step();
        assert_eq!(rig.client.stats().malformed, 1);
        assert!(rig.client.state().is_connected());
    }

    #[test]
    fn server_disconnect_is_reported() {
        let mut rig = Rig::welcomed();
        rig.send(DisconnectReason::Kicked.encode(Tick::new(4)));
        let events = rig.step();
        assert_eq!(
            events,
            vec![ClientEvent::Disconnected {
                reason: DisconnectReason::Kicked
            }]
        );
        let status = rig.client.status();
        assert_eq!(status.state, ClientState::Disconnected);
        assert_eq!(status.disconnect_reason, Some(DisconnectReason::Kicked));
    }

    #[test]
    fn ping_measures_round_trip() {
        let mut rig = Rig::welcomed();
        let nonce = rig.client.ping().unwrap();
        let (_, bytes) = rig
            .received()
            .into_iter()
            .find(|(kind, _)| *kind == MessageKind::Ping)
            .unwrap();
        let message = decode_message(&bytes, &WireLimits::default()).unwrap();
        let ping = Ping::decode(&message).unwrap();
        assert_eq!(ping.nonce, nonce);
        rig.send(ping.encode_pong(Tick::new(4)));
        rig.step();
        assert_eq!(rig.client.status().rtt, Some(Duration::from_millis(50)));
    }

    #[test]
    fn only_the_newest_ping_is_tracked() {
        let mut rig = Rig::welcomed();
        let first = rig.client.ping().unwrap();
        let second = rig.client.ping().unwrap();
        let pings: Vec<Ping> = rig
            .received()
            .into_iter()
            .filter(|(kind, _)| *kind == MessageKind::Ping)
            .map(|(_, bytes)| {
                Ping::decode(&decode_message(&bytes, &WireLimits::default()).unwrap()).unwrap()
            })
            .collect();
        assert_eq!(
            pings.iter().map(|ping| ping.nonce).collect::<Vec<_>>(),
            vec![first, second]
        );

        rig.send(pings[0].encode_pong(Tick::new(4)));
        rig.step();
        assert_eq!(rig.client.status().rtt, None);

        rig.send(pings[1].encode_pong(Tick::new(5)));
        rig.step();
        assert_eq!(rig.client.status().rtt, Some(Duration::from_millis(100)));

        rig.send(pings[1].encode_pong(Tick::new(6)));
        rig.step();
        assert_eq!(rig.client.status().rtt, Some(Duration::from_millis(100)));
    }
}
