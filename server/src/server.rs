//! The authoritative replication server.
//!
//! A tick is split in two so the game can simulate in between:
//!
//! 1. [`ReplicationServer::begin_tick`] drains the transport, runs the
//!    per-kind message handlers, releases inputs due this tick, checks
//!    timeouts and returns the resulting [`ServerEvent`]s.
//! 2. [`ReplicationServer::end_tick`] extracts the world, records it in the
//!    snapshot history and sends every connection its delta (or full
//!    snapshot, or hint).

use std::time::Duration;

use channel::{
    ChannelError, ChannelEvent, ChannelKind, ConnectionHandle, DeliveryClass, Endpoint,
};
use codec::{
    decode_ack, decode_resync, diff, extract, CodecError, DisconnectReason, Hello, InputCommand,
    Ping, Snapshot, SnapshotHistory, SpawnActor, Tick, Welcome, WorldView,
};
use schema::ComponentRegistry;
use tracing::{debug, info, warn};
use wire::{decode_message, HandlerTable, MessageKind, WireMessage};

use crate::connection::{Connection, ConnectionTable};
use crate::priority::{ChangeLog, PriorityStrategy, RecencyPriority, Vec2};
use crate::scheduler::{plan_connection, plan_hints, BaselineChoice, FullReason, PlanInput};
use crate::{ServerConfig, ServerError, ServerResult};

/// Something the game needs to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Handshake completed.
    ClientConnected {
        handle: ConnectionHandle,
        client_id: u64,
    },
    /// The client has a full snapshot and has started sending input.
    ClientSynchronized {
        handle: ConnectionHandle,
        client_id: u64,
    },
    ClientDisconnected {
        handle: ConnectionHandle,
        client_id: Option<u64>,
        reason: DisconnectReason,
    },
    /// A player action due at or before the current tick.
    Input {
        handle: ConnectionHandle,
        client_id: u64,
        command: InputCommand,
    },
    SpawnRequested {
        handle: ConnectionHandle,
        client_id: u64,
        name: String,
    },
}

/// Running counters since the server started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub ticks: u64,
    pub full_snapshots: u64,
    /// Full snapshots forced by a baseline that left the history ring.
    pub baseline_fallbacks: u64,
    pub deltas: u64,
    pub fragments: u64,
    pub hints: u64,
    pub bytes_sent: u64,
    pub dropped_sends: u64,
    pub malformed: u64,
    pub resyncs: u64,
    pub timeouts: u64,
    /// Reliable ticks whose snapshot could not be planned for a connection.
    pub failed_plans: u64,
}

/// What one [`ReplicationServer::end_tick`] sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: Tick,
    /// Whether this tick carried reliable snapshot messages.
    pub reliable: bool,
    pub full_snapshots: usize,
    pub deltas: usize,
    pub hints: usize,
    pub bytes: usize,
}

type ServerHandlers<E> = HandlerTable<ReplicationServer<E>, ConnectionHandle, ServerError>;

/// Authoritative server over any [`Endpoint`].
#[derive(Debug)]
pub struct ReplicationServer<E: Endpoint> {
    endpoint: E,
    config: ServerConfig,
    registry: ComponentRegistry,
    schema_hash: u64,
    connections: ConnectionTable,
    history: SnapshotHistory,
    changes: ChangeLog,
    strategy: Box<dyn PriorityStrategy>,
    handlers: ServerHandlers<E>,
    tick: Tick,
    now: Duration,
    events: Vec<ServerEvent>,
    stats: ServerStats,
    next_nonce: u64,
}

impl<E: Endpoint> ReplicationServer<E> {
    #[must_use]
    pub fn new(endpoint: E, config: ServerConfig, registry: ComponentRegistry) -> Self {
        let schema_hash = registry.hash();
        Self {
            endpoint,
            connections: ConnectionTable::new(config.max_connections),
            history: SnapshotHistory::new(config.history_capacity),
            config,
            registry,
            schema_hash,
            changes: ChangeLog::new(),
            strategy: Box::new(RecencyPriority),
            handlers: Self::handler_table(),
            tick: Tick::ZERO,
            now: Duration::ZERO,
            events: Vec::new(),
            stats: ServerStats::default(),
            next_nonce: 1,
        }
    }

    /// Replaces the default [`RecencyPriority`] strategy.
    #[must_use]
    pub fn with_priority(mut self, strategy: impl PriorityStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    fn handler_table() -> ServerHandlers<E> {
        HandlerTable::new()
            .on(MessageKind::Hello, Self::on_hello)
            .on(MessageKind::Input, Self::on_input)
            .on(MessageKind::Ack, Self::on_ack)
            .on(MessageKind::Resync, Self::on_resync)
            .on(MessageKind::Ping, Self::on_ping)
            .on(MessageKind::Pong, Self::on_pong)
            .on(MessageKind::SpawnActor, Self::on_spawn_actor)
            .on(MessageKind::Disconnect, Self::on_disconnect)
    }

    /// Tick being simulated, or last simulated once `end_tick` ran.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[must_use]
    pub const fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn schema_hash(&self) -> u64 {
        self.schema_hash
    }

    #[must_use]
    pub const fn stats(&self) -> ServerStats {
        self.stats
    }

    #[must_use]
    pub const fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    #[must_use]
    pub const fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    #[must_use]
    pub fn connection(&self, handle: ConnectionHandle) -> Option<&Connection> {
        self.connections.get(handle)
    }

    #[must_use]
    pub const fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn endpoint_mut(&mut self) -> &mut E {
        &mut self.endpoint
    }

    /// Sets where a connection is looking, for distance-based priority.
    ///
    /// # Errors
    ///
    /// [`ServerError::UnknownConnection`] if `handle` is not connected.
    pub fn set_focus(
        &mut self,
        handle: ConnectionHandle,
        focus: Option<Vec2>,
    ) -> ServerResult<()> {
        self.connections
            .get_mut(handle)
            .ok_or(ServerError::UnknownConnection { handle })?
            .set_focus(focus);
        Ok(())
    }

    /// Disconnects a client with [`DisconnectReason::Kicked`].
    pub fn kick(&mut self, handle: ConnectionHandle) {
        self.terminate(handle, DisconnectReason::Kicked);
    }

    /// Sends an unreliable ping; the RTT is recorded when the pong arrives.
    ///
    /// # Errors
    ///
    /// [`ServerError::UnknownConnection`] if `handle` is not connected, or the
    /// transport's error if the send fails.
    pub fn ping(&mut self, handle: ConnectionHandle) -> ServerResult<u64> {
        let nonce = self.next_nonce;
        let connection = self
            .connections
            .get_mut(handle)
            .ok_or(ServerError::UnknownConnection { handle })?;
        connection.ping_sent(nonce, self.now);
        self.next_nonce = self.next_nonce.wrapping_add(1);
        let ping = Ping {
            tick: self.tick,
            nonce,
        };
        send(
            &mut self.endpoint,
            &mut self.stats,
            handle,
            ChannelKind::Control,
            DeliveryClass::Unreliable,
            ping.encode(),
        )?;
        Ok(nonce)
    }

    /// Starts a tick at time `now`: processes everything received since the
    /// last tick and returns what the game has to act on.
    pub fn begin_tick(&mut self, now: Duration) -> Vec<ServerEvent> {
        self.now = self.now.max(now);
        self.tick = self.tick.next();
        self.stats.ticks += 1;

        let inbound: Vec<ChannelEvent> = self.endpoint.poll().collect();
        for event in inbound {
            match event {
                ChannelEvent::Connected { handle, auth_token } => {
                    self.accept(handle, &auth_token);
                }
                ChannelEvent::Message { from, bytes, .. } => self.receive(from, &bytes),
                ChannelEvent::Closed { handle } => {
                    if let Some(connection) = self.connections.get_mut(handle) {
                        connection.disconnect(DisconnectReason::ChannelClosed);
                    }
                    self.retire(handle);
                }
            }
        }

        self.release_inputs();
        self.check_timeouts();
        std::mem::take(&mut self.events)
    }

    /// Ends the tick: snapshots `world` and replicates it to every
    /// handshaken connection.
    pub fn end_tick<W: WorldView + ?Sized>(&mut self, world: &W) -> TickReport {
        let tick = self.tick;
        let mut report = TickReport {
            tick,
            reliable: self.config.is_snapshot_tick(tick),
            ..TickReport::default()
        };

        let snapshot = extract(world, tick);
        let changes = match self.history.newest() {
            Some((_, previous)) => diff(previous, &snapshot),
            None => diff(&Snapshot::empty(Tick::ZERO), &snapshot),
        };
        self.changes.record(&changes);
        if let Err(err) = self.history.insert(tick, snapshot) {
            warn!(%tick, %err, "snapshot not recorded; end_tick called twice?");
            return report;
        }
        let Some(current) = self.history.get(tick) else {
            return report;
        };

        let input = PlanInput {
            current,
            history: &self.history,
            registry: &self.registry,
            changes: &self.changes,
            strategy: self.strategy.as_ref(),
            max_message_bytes: self.config.max_message_bytes,
            max_fragments: self.config.wire_limits.max_fragments,
        };
        let hint = if report.reliable {
            None
        } else {
            plan_hints(
                current,
                &self.changes,
                self.config.hint_components,
                self.config.max_message_bytes,
                self.config.limits.max_hints,
            )
        };

        let mut closed = Vec::new();
        let mut oversized = Vec::new();
        for connection in self.connections.iter_mut() {
            if !connection.handshake_complete() || connection.state().is_terminal() {
                continue;
            }
            let handle = connection.handle();

            if !report.reliable {
                let has_baseline = connection.replication().pending_full().is_some()
                    || connection.last_acked_tick().is_some();
                if let (Some(bytes), true) = (&hint, has_baseline) {
                    match send(
                        &mut self.endpoint,
                        &mut self.stats,
                        handle,
                        ChannelKind::Replication,
                        DeliveryClass::Unreliable,
                        bytes.clone(),
                    ) {
                        Ok(()) => {
                            self.stats.hints += 1;
                            report.hints += 1;
                            report.bytes += bytes.len();
                        }
                        Err(err) if is_gone(&err) => closed.push(handle),
                        Err(_) => {}
                    }
                }
                continue;
            }

            let plan = match plan_connection(connection.replication(), connection.focus(), &input) {
                Ok(plan) => plan,
                Err(err) => {
                    self.stats.failed_plans += 1;
                    let give_up = connection.note_failed_plan(self.config.max_failed_plans);
                    let failures = connection.failed_plans();
                    warn!(%handle, %err, failures, "could not plan replication");
                    if give_up {
                        oversized.push(handle);
                    }
                    continue;
                }
            };
            connection.plan_succeeded();
            if let BaselineChoice::Full(FullReason::BaselineAgedOut(base)) = plan.baseline {
                warn!(%handle, %base, "baseline aged out of history, sending full snapshot");
                self.stats.baseline_fallbacks += 1;
            }
            if plan.is_full() {
                self.stats.full_snapshots += 1;
                report.full_snapshots += 1;
                if connection.full_snapshot_sent(tick) {
                    self.events.push(ServerEvent::ClientSynchronized {
                        handle,
                        client_id: connection.client_id().unwrap_or_default(),
                    });
                }
            } else {
                self.stats.deltas += 1;
                report.deltas += 1;
            }

            for bytes in plan.messages {
                let length = bytes.len();
                match send(
                    &mut self.endpoint,
                    &mut self.stats,
                    handle,
                    ChannelKind::Replication,
                    DeliveryClass::ReliableOrdered,
                    bytes,
                ) {
                    Ok(()) => {
                        self.stats.fragments += 1;
                        report.bytes += length;
                    }
                    Err(err) if is_gone(&err) => {
                        closed.push(handle);
                        break;
                    }
                    Err(_) => {}
                }
            }
        }

        for handle in oversized {
            warn!(%handle, "snapshot does not fit the fragment limit, dropping connection");
            self.terminate(handle, DisconnectReason::SnapshotTooLarge);
        }
        for handle in closed {
            if let Some(connection) = self.connections.get_mut(handle) {
                connection.disconnect(DisconnectReason::ChannelClosed);
            }
            self.retire(handle);
        }
        report
    }

    fn accept(&mut self, handle: ConnectionHandle, auth_token: &[u8]) {
        match self.connections.open(handle, self.now) {
            Ok(_) => info!(%handle, token_bytes = auth_token.len(), "client connected"),
            Err(err) => {
                warn!(%handle, %err, "refusing connection");
                let refusal = DisconnectReason::ServerFull.encode(self.tick);
                if let Err(err) = send(
                    &mut self.endpoint,
                    &mut self.stats,
                    handle,
                    ChannelKind::Control,
                    DeliveryClass::ReliableOrdered,
                    refusal,
                ) {
                    debug!(%handle, %err, "refusal not sent");
                }
                self.endpoint.close(handle);
            }
        }
    }

    fn receive(&mut self, handle: ConnectionHandle, bytes: &[u8]) {
        let Some(connection) = self.connections.get_mut(handle) else {
            debug!(%handle, "message for unknown connection");
            return;
        };
        if connection.state().is_terminal() {
            return;
        }
        connection.touch(self.now);
        let state = connection.state();

        let result = match decode_message(bytes, &self.config.wire_limits) {
            Ok(message) => match self.handlers.get(message.kind()) {
                Some(handler) => handler(self, handle, &message),
                None => Err(ServerError::UnexpectedMessage {
                    handle,
                    kind: message.kind(),
                    state,
                }),
            },
            Err(err) => Err(ServerError::Malformed {
                handle,
                source: CodecError::from(err),
            }),
        };
        if let Err(err) = result {
            self.handle_error(handle, &err);
        }
    }

    fn handle_error(&mut self, handle: ConnectionHandle, err: &ServerError) {
        if !err.is_malformed() {
            warn!(%handle, %err, "message handling failed");
            return;
        }
        self.stats.malformed += 1;
        warn!(%handle, %err, "discarding malformed message");
        let threshold = self.config.malformed_threshold;
        let exceeded = self
            .connections
            .get_mut(handle)
            .is_some_and(|connection| connection.note_malformed(threshold));
        if exceeded {
            warn!(%handle, threshold, "malformed message threshold exceeded");
            self.terminate(handle, DisconnectReason::Malformed);
        }
    }

    fn release_inputs(&mut self) {
        let tick = self.tick;
        for connection in self.connections.iter_mut() {
            let client_id = connection.client_id().unwrap_or_default();
            let handle = connection.handle();
            self.events.extend(
                connection
                    .release_inputs(tick)
                    .into_iter()
                    .map(|command| ServerEvent::Input {
                        handle,
                        client_id,
                        command,
                    }),
            );
        }
    }

    fn check_timeouts(&mut self) {
        let (now, timeout) = (self.now, self.config.connection_timeout);
        let mut timed_out = Vec::new();
        for connection in self.connections.iter_mut() {
            if let Err(err) = connection.check_timeout(now, timeout) {
                warn!(%err, "dropping connection");
                timed_out.push(connection.handle());
            }
        }
        for handle in timed_out {
            self.stats.timeouts += 1;
            self.terminate(handle, DisconnectReason::TimedOut);
        }
    }

    /// Server-initiated disconnect: tell the client why, close, and report.
    fn terminate(&mut self, handle: ConnectionHandle, reason: DisconnectReason) {
        let Some(connection) = self.connections.get_mut(handle) else {
            return;
        };
        connection.disconnect(reason);
        if let Err(err) = send(
            &mut self.endpoint,
            &mut self.stats,
            handle,
            ChannelKind::Control,
            DeliveryClass::ReliableOrdered,
            reason.encode(self.tick),
        ) {
            debug!(%handle, %err, "disconnect notice not sent");
        }
        self.endpoint.close(handle);
        self.retire(handle);
    }

    /// Removes a terminal connection and reports it.
    fn retire(&mut self, handle: ConnectionHandle) {
        if let Some(connection) = self.connections.remove(handle) {
            self.events.push(ServerEvent::ClientDisconnected {
                handle,
                client_id: connection.client_id(),
                reason: connection
                    .disconnect_reason()
                    .unwrap_or(DisconnectReason::ChannelClosed),
            });
        }
    }

    fn on_hello(
        &mut self,
        handle: ConnectionHandle,
        message: &WireMessage<'_>,
    ) -> ServerResult<()> {
        let hello = Hello::decode(message).map_err(malformed(handle))?;
        let mismatch = if hello.protocol_version != self.config.protocol_version {
            Some(DisconnectReason::ProtocolMismatch)
        } else if hello.schema_hash != self.schema_hash {
            Some(DisconnectReason::SchemaMismatch)
        } else {
            None
        };
        if let Some(reason) = mismatch {
            warn!(
                %handle,
                ?reason,
                client_version = hello.protocol_version,
                "rejecting handshake"
            );
            self.terminate(handle, reason);
            return Ok(());
        }

        let connection = self
            .connections
            .get_mut(handle)
            .ok_or(ServerError::UnknownConnection { handle })?;
        connection.complete_handshake(hello.client_id)?;
        let welcome = Welcome {
            server_tick: self.tick,
            connection_id: connection.connection_id(),
            tick_rate_hz: self.config.tick_rate_hz,
            history_capacity: u16::try_from(self.config.history_capacity.get())
                .unwrap_or(u16::MAX),
        };
        send(
            &mut self.endpoint,
            &mut self.stats,
            handle,
            ChannelKind::Control,
            DeliveryClass::ReliableOrdered,
            welcome.encode(),
        )?;
        self.events.push(ServerEvent::ClientConnected {
            handle,
            client_id: hello.client_id,
        });
        Ok(())
    }

    fn on_input(
        &mut self,
        handle: ConnectionHandle,
        message: &WireMessage<'_>,
    ) -> ServerResult<()> {
        let command = InputCommand::decode(message, &self.config.limits)
            .map_err(malformed(handle))?;
        let connection = self
            .connections
            .get_mut(handle)
            .ok_or(ServerError::UnknownConnection { handle })?;
        let synchronized = connection.accept_input(&command)?;
        let client_id = connection.client_id().unwrap_or_default();
        if synchronized {
            self.events
                .push(ServerEvent::ClientSynchronized { handle, client_id });
        }
        if command.action.is_empty() {
            return Ok(());
        }
        if command.tick <= self.tick {
            self.events.push(ServerEvent::Input {
                handle,
                client_id,
                command,
            });
        } else if let Some(dropped) = connection.queue_input(command, self.config.max_queued_inputs)
        {
            warn!(%handle, sequence = dropped.sequence, "input queue full, dropping oldest");
        }
        Ok(())
    }

    fn on_ack(
        &mut self,
        handle: ConnectionHandle,
        message: &WireMessage<'_>,
    ) -> ServerResult<()> {
        let tick = decode_ack(message).map_err(malformed(handle))?;
        let server_tick = self.tick;
        let connection = handshaken(&mut self.connections, handle, MessageKind::Ack)?;
        if !connection.acknowledge(tick, server_tick) {
            debug!(%handle, %tick, "ignoring stale or future ack");
        }
        Ok(())
    }

    fn on_resync(
        &mut self,
        handle: ConnectionHandle,
        message: &WireMessage<'_>,
    ) -> ServerResult<()> {
        let last_applied = decode_resync(message).map_err(malformed(handle))?;
        handshaken(&mut self.connections, handle, MessageKind::Resync)?.request_resync();
        self.stats.resyncs += 1;
        info!(%handle, %last_applied, "client requested resync");
        Ok(())
    }

    fn on_ping(
        &mut self,
        handle: ConnectionHandle,
        message: &WireMessage<'_>,
    ) -> ServerResult<()> {
        let ping = Ping::decode(message).map_err(malformed(handle))?;
        send(
            &mut self.endpoint,
            &mut self.stats,
            handle,
            ChannelKind::Control,
            DeliveryClass::Unreliable,
            ping.encode_pong(self.tick),
        )?;
        Ok(())
    }

    fn on_pong(
        &mut self,
        handle: ConnectionHandle,
        message: &WireMessage<'_>,
    ) -> ServerResult<()> {
        let pong = Ping::decode(message).map_err(malformed(handle))?;
        let now = self.now;
        let connection = self
            .connections
            .get_mut(handle)
            .ok_or(ServerError::UnknownConnection { handle })?;
        if let Some(rtt) = connection.pong_received(pong.nonce, now) {
            debug!(%handle, ?rtt, "round trip measured");
        }
        Ok(())
    }

    fn on_spawn_actor(
        &mut self,
        handle: ConnectionHandle,
        message: &WireMessage<'_>,
    ) -> ServerResult<()> {
        let request = SpawnActor::decode(message, &self.config.limits)
            .map_err(malformed(handle))?;
        let connection = handshaken(&mut self.connections, handle, MessageKind::SpawnActor)?;
        let client_id = connection.client_id().unwrap_or_default();
        self.events.push(ServerEvent::SpawnRequested {
            handle,
            client_id,
            name: request.name,
        });
        Ok(())
    }

    fn on_disconnect(
        &mut self,
        handle: ConnectionHandle,
        message: &WireMessage<'_>,
    ) -> ServerResult<()> {
        let reason = DisconnectReason::decode(message)
            .map_err(malformed(handle))?;
        info!(%handle, ?reason, "client disconnected");
        if let Some(connection) = self.connections.get_mut(handle) {
            connection.disconnect(reason);
        }
        self.endpoint.close(handle);
        self.retire(handle);
        Ok(())
    }
}

fn malformed(handle: ConnectionHandle) -> impl Fn(CodecError) -> ServerError {
    move |source| ServerError::Malformed { handle, source }
}

fn handshaken(
    connections: &mut ConnectionTable,
    handle: ConnectionHandle,
    kind: MessageKind,
) -> ServerResult<&mut Connection> {
    let connection = connections
        .get_mut(handle)
        .ok_or(ServerError::UnknownConnection { handle })?;
    if connection.handshake_complete() {
        Ok(connection)
    } else {
        Err(ServerError::UnexpectedMessage {
            handle,
            kind,
            state: connection.state(),
        })
    }
}

fn send<E: Endpoint>(
    endpoint: &mut E,
    stats: &mut ServerStats,
    handle: ConnectionHandle,
    kind: ChannelKind,
    class: DeliveryClass,
    bytes: Vec<u8>,
) -> Result<(), ChannelError> {
    let length = bytes.len() as u64;
    match endpoint.send(handle, kind, class, bytes) {
        Ok(_) => {
            stats.bytes_sent += length;
            Ok(())
        }
        Err(err) => {
            stats.dropped_sends += 1;
            warn!(%handle, ?kind, ?class, %err, "send dropped");
            Err(err)
        }
    }
}

const fn is_gone(err: &ChannelError) -> bool {
    matches!(
        err,
        ChannelError::ConnectionClosed { .. } | ChannelError::UnknownConnection { .. }
    )
}
