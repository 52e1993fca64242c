//! A server, a demo world and a handful of clients on one loopback network.

#![allow(dead_code)]

use std::time::Duration;

use channel::{LoopbackConditions, LoopbackEndpoint, LoopbackNetwork};
use client::{ClientConfig, ClientEvent, ReplicationClient};
use codec::Snapshot;
use demo::{demo_registry, locate, DemoPredictor, GameWorld, MoveAction};
use server::{DistancePriority, ReplicationServer, ServerConfig, ServerEvent};

pub const TICK: Duration = Duration::from_millis(50);
pub const ADDRESS: &str = "game";

pub type DemoClient = ReplicationClient<LoopbackEndpoint, DemoPredictor>;

pub struct Game {
    pub network: LoopbackNetwork,
    pub server: ReplicationServer<LoopbackEndpoint>,
    pub world: GameWorld,
    pub clients: Vec<DemoClient>,
    pub server_events: Vec<ServerEvent>,
    pub client_events: Vec<(u64, ClientEvent)>,
    pub now: Duration,
}

/// Server config with a timeout long enough to ride out test outages.
pub fn server_config() -> ServerConfig {
    ServerConfig {
        connection_timeout: Duration::from_secs(10),
        ..ServerConfig::for_testing()
    }
}

impl Game {
    pub fn new(conditions: LoopbackConditions, seed: u64) -> Self {
        Self::with_configs(conditions, seed, server_config())
    }

    pub fn with_configs(conditions: LoopbackConditions, seed: u64, config: ServerConfig) -> Self {
        let network = LoopbackNetwork::new(conditions, seed);
        let endpoint = network.listen(ADDRESS).unwrap();
        let server = ReplicationServer::new(endpoint, config, demo_registry().unwrap())
            .with_priority(DistancePriority::new(locate));
        Self {
            network,
            server,
            world: GameWorld::new(),
            clients: Vec::new(),
            server_events: Vec::new(),
            client_events: Vec::new(),
            now: Duration::ZERO,
        }
    }

    /// Connects a client that immediately asks for an actor.
    pub fn join(&mut self, client_id: u64, config: ClientConfig) -> usize {
        let mut client = ReplicationClient::connect(
            &mut self.network.connector(),
            ADDRESS,
            b"token",
            config,
            demo_registry().unwrap(),
            client_id,
            DemoPredictor::new(client_id),
        )
        .unwrap();
        client.request_spawn(&format!("player-{client_id}")).unwrap();
        self.clients.push(client);
        self.clients.len() - 1
    }

    /// One network delivery, one server tick, one frame on every client.
    pub fn step(&mut self, action: impl Fn(u64) -> Option<MoveAction>) {
        self.network.advance();
        self.now += TICK;

        let events = self.server.begin_tick(self.now);
        let tick = self.server.tick();
        for event in &events {
            self.world.handle_event(event, tick);
        }
        self.server_events.extend(events);
        self.world.integrate();
        self.server.end_tick(&self.world);

        for client in &mut self.clients {
            let id = client.client_id();
            let input = action(id).map(|action| action.encode());
            let events = client.tick(self.now, input);
            self.client_events.extend(events.into_iter().map(|event| (id, event)));
        }
    }

    pub fn idle(&mut self, steps: usize) {
        for _ in 0..steps {
            self.step(|_| None);
        }
    }

    /// Whether `client`'s newest authoritative state is exactly the server's
    /// snapshot at that tick, and its presented world matches it.
    pub fn converged(&self, client: &DemoClient) -> bool {
        let Some(applied) = client.authoritative() else {
            return false;
        };
        let Some(server) = self.server.history().get(applied.tick()) else {
            return false;
        };
        server == applied && same_entities(client.world(), server)
    }

    pub fn all_converged(&self) -> bool {
        self.clients.iter().all(|client| self.converged(client))
    }

    pub fn count_client_events(&self, matches: impl Fn(&ClientEvent) -> bool) -> usize {
        self.client_events
            .iter()
            .filter(|(_, event)| matches(event))
            .count()
    }
}

pub fn same_entities(a: &Snapshot, b: &Snapshot) -> bool {
    a.iter().eq(b.iter())
}
