//! Per-client connection state machine and the connection table.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use channel::ConnectionHandle;
use codec::{DisconnectReason, InputCommand, Tick};
use tracing::{debug, info};

use crate::priority::Vec2;
use crate::scheduler::ReplicationState;
use crate::{ServerError, ServerResult};

/// Lifecycle of a connection.
///
/// `TimedOut` and `Disconnected` are terminal: a returning client gets a new
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Waiting for handshake, first full snapshot and first input.
    Connecting,
    Synchronized,
    TimedOut,
    Disconnected,
}

impl ConnectionState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::TimedOut | Self::Disconnected)
    }
}

/// Server-side view of one client.
#[derive(Debug, Clone)]
pub struct Connection {
    handle: ConnectionHandle,
    connection_id: u32,
    client_id: Option<u64>,
    state: ConnectionState,
    full_snapshot_sent: bool,
    first_input_received: bool,
    replication: ReplicationState,
    last_received_input_sequence: Option<u32>,
    last_activity: Duration,
    malformed: u32,
    failed_plans: u32,
    focus: Option<Vec2>,
    queued_inputs: VecDeque<InputCommand>,
    pending_ping: Option<(u64, Duration)>,
    rtt: Option<Duration>,
    disconnect_reason: Option<DisconnectReason>,
}

impl Connection {
    #[must_use]
    pub fn new(handle: ConnectionHandle, connection_id: u32, now: Duration) -> Self {
        Self {
            handle,
            connection_id,
            client_id: None,
            state: ConnectionState::Connecting,
            full_snapshot_sent: false,
            first_input_received: false,
            replication: ReplicationState::new(),
            last_received_input_sequence: None,
            last_activity: now,
            malformed: 0,
            failed_plans: 0,
            focus: None,
            queued_inputs: VecDeque::new(),
            pending_ping: None,
            rtt: None,
            disconnect_reason: None,
        }
    }

    #[must_use]
    pub const fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    #[must_use]
    pub const fn connection_id(&self) -> u32 {
        self.connection_id
    }

    /// Set once the handshake completes.
    #[must_use]
    pub const fn client_id(&self) -> Option<u64> {
        self.client_id
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub const fn handshake_complete(&self) -> bool {
        self.client_id.is_some()
    }

    #[must_use]
    pub const fn replication(&self) -> &ReplicationState {
        &self.replication
    }

    #[must_use]
    pub const fn last_acked_tick(&self) -> Option<Tick> {
        self.replication.last_acked()
    }

    #[must_use]
    pub const fn last_received_input_sequence(&self) -> Option<u32> {
        self.last_received_input_sequence
    }

    #[must_use]
    pub const fn last_activity(&self) -> Duration {
        self.last_activity
    }

    #[must_use]
    pub const fn malformed_count(&self) -> u32 {
        self.malformed
    }

    #[must_use]
    pub const fn focus(&self) -> Option<Vec2> {
        self.focus
    }

    pub fn set_focus(&mut self, focus: Option<Vec2>) {
        self.focus = focus;
    }

    /// Latest measured round trip, from ping/pong.
    #[must_use]
    pub const fn rtt(&self) -> Option<Duration> {
        self.rtt
    }

    #[must_use]
    pub const fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.disconnect_reason
    }

    #[must_use]
    pub fn queued_inputs(&self) -> usize {
        self.queued_inputs.len()
    }

    /// Records inbound traffic.
    pub fn touch(&mut self, now: Duration) {
        self.last_activity = self.last_activity.max(now);
    }

    /// Completes the handshake.
    ///
    /// # Errors
    ///
    /// [`ServerError::UnexpectedMessage`] if the handshake already happened or
    /// the connection is terminal.
    pub fn complete_handshake(&mut self, client_id: u64) -> ServerResult<()> {
        if self.handshake_complete() || self.state.is_terminal() {
            return Err(ServerError::UnexpectedMessage {
                handle: self.handle,
                kind: wire::MessageKind::Hello,
                state: self.state,
            });
        }
        self.client_id = Some(client_id);
        info!(handle = %self.handle, client_id, "handshake complete");
        Ok(())
    }

    /// Records a full snapshot sent at `tick`. Returns `true` if this
    /// synchronized the connection.
    pub fn full_snapshot_sent(&mut self, tick: Tick) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.replication.full_snapshot_sent(tick);
        self.full_snapshot_sent = true;
        self.try_synchronize()
    }

    /// Applies a client ack. See [`ReplicationState::acknowledge`].
    pub fn acknowledge(&mut self, tick: Tick, server_tick: Tick) -> bool {
        self.replication.acknowledge(tick, server_tick)
    }

    pub fn request_resync(&mut self) {
        self.replication.request_resync();
    }

    /// Accepts an input command.
    ///
    /// Returns `Ok(true)` if it synchronized the connection. Commands with a
    /// sequence at or below the last one seen are rejected.
    ///
    /// # Errors
    ///
    /// [`ServerError::UnexpectedMessage`] before the handshake or for a
    /// replayed sequence.
    pub fn accept_input(&mut self, command: &InputCommand) -> ServerResult<bool> {
        let replayed = self
            .last_received_input_sequence
            .is_some_and(|last| command.sequence <= last);
        if !self.handshake_complete() || self.state.is_terminal() || replayed {
            return Err(ServerError::UnexpectedMessage {
                handle: self.handle,
                kind: wire::MessageKind::Input,
                state: self.state,
            });
        }
        self.last_received_input_sequence = Some(command.sequence);
        self.first_input_received = true;
        Ok(self.try_synchronize())
    }

    /// Holds an input until its tick. The oldest input is dropped when the
    /// queue is full; returns it.
    pub fn queue_input(&mut self, command: InputCommand, capacity: usize) -> Option<InputCommand> {
        let position = self
            .queued_inputs
            .iter()
            .position(|queued| queued.tick > command.tick)
            .unwrap_or(self.queued_inputs.len());
        self.queued_inputs.insert(position, command);
        if self.queued_inputs.len() > capacity {
            self.queued_inputs.pop_front()
        } else {
            None
        }
    }

    /// Removes queued inputs whose tick has arrived, in tick order.
    pub fn release_inputs(&mut self, tick: Tick) -> Vec<InputCommand> {
        let due = self
            .queued_inputs
            .iter()
            .take_while(|queued| queued.tick <= tick)
            .count();
        self.queued_inputs.drain(..due).collect()
    }

    /// Records a ping sent with `nonce`.
    pub fn ping_sent(&mut self, nonce: u64, now: Duration) {
        self.pending_ping = Some((nonce, now));
    }

    /// Matches a pong against the outstanding ping and updates the RTT.
    pub fn pong_received(&mut self, nonce: u64, now: Duration) -> Option<Duration> {
        let (expected, sent) = self.pending_ping?;
        if expected != nonce {
            return None;
        }
        self.pending_ping = None;
        let rtt = now.saturating_sub(sent);
        self.rtt = Some(rtt);
        Some(rtt)
    }

    /// Counts a malformed message. Returns `true` once the count exceeds
    /// `threshold`.
    pub fn note_malformed(&mut self, threshold: u32) -> bool {
        self.malformed = self.malformed.saturating_add(1);
        self.malformed > threshold
    }

    /// Counts a tick whose replication could not be encoded. Returns `true`
    /// once `limit` consecutive ticks have failed.
    pub fn note_failed_plan(&mut self, limit: u32) -> bool {
        self.failed_plans = self.failed_plans.saturating_add(1);
        self.failed_plans >= limit.max(1)
    }

    pub fn plan_succeeded(&mut self) {
        self.failed_plans = 0;
    }

    #[must_use]
    pub const fn failed_plans(&self) -> u32 {
        self.failed_plans
    }

    /// Moves to `TimedOut` if idle for longer than `timeout`.
    ///
    /// # Errors
    ///
    /// [`ServerError::ConnectionTimeout`] when the connection just timed out.
    pub fn check_timeout(&mut self, now: Duration, timeout: Duration) -> ServerResult<()> {
        let idle = now.saturating_sub(self.last_activity);
        if self.state.is_terminal() || idle <= timeout {
            return Ok(());
        }
        self.enter_terminal(ConnectionState::TimedOut, DisconnectReason::TimedOut);
        Err(ServerError::ConnectionTimeout {
            handle: self.handle,
            idle,
        })
    }

    /// Moves to `Disconnected`. Returns `false` if already terminal.
    pub fn disconnect(&mut self, reason: DisconnectReason) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.enter_terminal(ConnectionState::Disconnected, reason);
        true
    }

    fn enter_terminal(&mut self, state: ConnectionState, reason: DisconnectReason) {
        info!(handle = %self.handle, ?state, ?reason, "connection ended");
        self.state = state;
        self.disconnect_reason = Some(reason);
        self.replication.reset();
        self.queued_inputs.clear();
        self.pending_ping = None;
    }

    fn try_synchronize(&mut self) -> bool {
        let ready =
            self.handshake_complete() && self.full_snapshot_sent && self.first_input_received;
        if self.state == ConnectionState::Connecting && ready {
            self.state = ConnectionState::Synchronized;
            info!(handle = %self.handle, "connection synchronized");
            true
        } else {
            false
        }
    }
}

/// Live connections keyed by transport handle, capped at `max_connections`.
#[derive(Debug, Clone)]
pub struct ConnectionTable {
    connections: BTreeMap<ConnectionHandle, Connection>,
    max_connections: usize,
    next_connection_id: u32,
}

impl ConnectionTable {
    #[must_use]
    pub const fn new(max_connections: usize) -> Self {
        Self {
            connections: BTreeMap::new(),
            max_connections,
            next_connection_id: 1,
        }
    }

    /// Opens a `Connecting` entry for `handle`.
    ///
    /// # Errors
    ///
    /// [`ServerError::ServerFull`] at capacity, and
    /// [`ServerError::DuplicateConnection`] if `handle` is already present.
    pub fn open(
        &mut self,
        handle: ConnectionHandle,
        now: Duration,
    ) -> ServerResult<&mut Connection> {
        if self.connections.contains_key(&handle) {
            return Err(ServerError::DuplicateConnection { handle });
        }
        if self.live_count() >= self.max_connections {
            return Err(ServerError::ServerFull {
                max: self.max_connections,
            });
        }
        let connection_id = self.next_connection_id;
        self.next_connection_id = self.next_connection_id.wrapping_add(1).max(1);
        debug!(%handle, connection_id, "connection opened");
        Ok(self
            .connections
            .entry(handle)
            .or_insert_with(|| Connection::new(handle, connection_id, now)))
    }

    #[must_use]
    pub fn get(&self, handle: ConnectionHandle) -> Option<&Connection> {
        self.connections.get(&handle)
    }

    pub fn get_mut(&mut self, handle: ConnectionHandle) -> Option<&mut Connection> {
        self.connections.get_mut(&handle)
    }

    /// Removes a connection, returning it.
    pub fn remove(&mut self, handle: ConnectionHandle) -> Option<Connection> {
        self.connections.remove(&handle)
    }

    /// Connections not in a terminal state.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.connections
            .values()
            .filter(|connection| !connection.state().is_terminal())
            .count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Handles in ascending order.
    #[must_use]
    pub fn handles(&self) -> Vec<ConnectionHandle> {
        self.connections.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> + '_ {
        self.connections.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection> + '_ {
        self.connections.values_mut()
    }

    /// Finds the connection of a handshaken client.
    #[must_use]
    pub fn by_client_id(&self, client_id: u64) -> Option<&Connection> {
        self.connections
            .values()
            .find(|connection| connection.client_id() == Some(client_id))
    }
}
