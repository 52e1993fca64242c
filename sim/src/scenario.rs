//! One simulated session: a demo world, its server and a set of clients on
//! a conditioned loopback network.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::time::Duration;

use anyhow::{Context, Result};
use channel::{LoopbackConditions, LoopbackEndpoint, LoopbackNetwork};
use client::{ClientConfig, ClientEvent, ReplicationClient};
use codec::{Snapshot, Tick, WorldView};
use demo::{demo_registry, locate, DemoPredictor, GameWorld, MoveAction, Position, Velocity};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use schema::{Component, ComponentMask};
use serde::Serialize;
use server::{DistancePriority, ReplicationServer, ServerConfig, ServerStats};
use tracing::{debug, info, warn};

use crate::recorder::{Captured, Recorder};

const ADDRESS: &str = "sim";

/// Link and game parameters for one run.
#[derive(Debug, Clone, Serialize)]
pub struct Scenario {
    pub clients: u32,
    pub drifters: u32,
    /// Ticks with player input.
    pub ticks: u32,
    /// Quiet ticks afterwards, so every client can catch up.
    pub settle_ticks: u32,
    pub seed: u64,
    pub loss: f64,
    pub reorder: f64,
    pub latency_ticks: u32,
    pub jitter_ticks: u32,
    /// `(start_tick, length)` of a total outage.
    pub outage: Option<(u32, u32)>,
    pub snapshot_interval: u32,
    pub history_capacity: usize,
    /// Damage one random actor every this many ticks; `0` disables it.
    pub damage_every: u32,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            clients: 4,
            drifters: 16,
            ticks: 600,
            settle_ticks: 60,
            seed: 1,
            loss: 0.0,
            reorder: 0.0,
            latency_ticks: 1,
            jitter_ticks: 0,
            outage: None,
            snapshot_interval: 1,
            history_capacity: 64,
            damage_every: 0,
        }
    }
}

impl Scenario {
    fn conditions(&self) -> LoopbackConditions {
        LoopbackConditions {
            loss: self.loss,
            reorder: self.reorder,
            latency_ticks: self.latency_ticks,
            jitter_ticks: self.jitter_ticks,
            ..LoopbackConditions::default()
        }
    }

    fn server_config(&self) -> ServerConfig {
        let hint_components = if self.snapshot_interval > 1 {
            [Position::KIND].into_iter().collect()
        } else {
            ComponentMask::EMPTY
        };
        ServerConfig {
            snapshot_interval: self.snapshot_interval.max(1),
            hint_components,
            history_capacity: NonZeroUsize::new(self.history_capacity)
                .unwrap_or(NonZeroUsize::MIN),
            ..ServerConfig::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerSummary {
    pub ticks: u64,
    pub full_snapshots: u64,
    pub baseline_fallbacks: u64,
    pub deltas: u64,
    pub fragments: u64,
    pub hints: u64,
    pub resyncs: u64,
    pub timeouts: u64,
    pub failed_plans: u64,
    pub bytes_sent: u64,
    pub dropped_sends: u64,
}

impl From<ServerStats> for ServerSummary {
    fn from(stats: ServerStats) -> Self {
        Self {
            ticks: stats.ticks,
            full_snapshots: stats.full_snapshots,
            baseline_fallbacks: stats.baseline_fallbacks,
            deltas: stats.deltas,
            fragments: stats.fragments,
            hints: stats.hints,
            resyncs: stats.resyncs,
            timeouts: stats.timeouts,
            failed_plans: stats.failed_plans,
            bytes_sent: stats.bytes_sent,
            dropped_sends: stats.dropped_sends,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkSummary {
    pub sent: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub reordered: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientSummary {
    pub client_id: u64,
    pub state: String,
    pub last_applied: Option<u32>,
    pub full_snapshots: u64,
    pub deltas: u64,
    pub resyncs: u64,
    pub hard_snaps: u64,
    pub hints: u64,
    pub inputs_sent: u64,
    pub converged: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TrafficSummary {
    pub messages: u64,
    pub bytes: u64,
}

/// Everything a run reports.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub scenario: Scenario,
    pub server: ServerSummary,
    pub network: NetworkSummary,
    pub traffic: BTreeMap<String, TrafficSummary>,
    pub clients: Vec<ClientSummary>,
    pub entities: usize,
    pub converged: bool,
}

/// A finished run: the summary plus whatever the server sent first.
#[derive(Debug)]
pub struct Outcome {
    pub summary: Summary,
    pub captured: Vec<Captured>,
}

type SimClient = ReplicationClient<LoopbackEndpoint, DemoPredictor>;

/// Runs `scenario`, keeping up to `capture_limit` outgoing server messages.
pub fn run(scenario: &Scenario, capture_limit: usize) -> Result<Outcome> {
    let registry = demo_registry().context("build demo registry")?;
    let network = LoopbackNetwork::new(scenario.conditions(), scenario.seed);
    let listener = network.listen(ADDRESS).context("listen on loopback")?;
    let config = scenario.server_config();
    let frame = config.tick_duration();
    let recorder = Recorder::new(listener, capture_limit);
    let mut server = ReplicationServer::new(recorder, config, registry)
        .with_priority(DistancePriority::new(locate));

    let mut rng = StdRng::seed_from_u64(scenario.seed);
    let mut world = GameWorld::new();
    for _ in 0..scenario.drifters {
        let at = Position::new(rng.gen_range(-500..=500), rng.gen_range(-500..=500));
        let velocity = Velocity {
            dx: rng.gen_range(-3..=3),
            dy: rng.gen_range(-3..=3),
        };
        world.spawn_drifter(at, velocity, Tick::ZERO);
    }

    let mut clients = Vec::new();
    for client_id in 1..=u64::from(scenario.clients) {
        let mut client = ReplicationClient::connect(
            &mut network.connector(),
            ADDRESS,
            format!("token-{client_id}").as_bytes(),
            ClientConfig::default(),
            demo_registry().context("build demo registry")?,
            client_id,
            DemoPredictor::new(client_id),
        )
        .with_context(|| format!("connect client {client_id}"))?;
        client
            .request_spawn(&format!("player-{client_id}"))
            .with_context(|| format!("spawn request for client {client_id}"))?;
        clients.push(client);
    }
    info!(clients = clients.len(), drifters = scenario.drifters, "simulation started");

    let mut now = Duration::ZERO;
    for step in 1..=scenario.ticks + scenario.settle_ticks {
        if let Some((start, length)) = scenario.outage {
            if step == start {
                warn!(step, length, "network outage");
                network.outage(length);
            }
        }
        network.advance();
        now += frame;

        let events = server.begin_tick(now);
        let tick = server.tick();
        for event in &events {
            world.handle_event(event, tick);
        }
        if scenario.damage_every > 0 && step % scenario.damage_every == 0 {
            damage_someone(&mut world, &mut rng, tick);
        }
        world.integrate();
        let report = server.end_tick(&world);
        debug!(tick = %report.tick, bytes = report.bytes, "tick replicated");

        let playing = step <= scenario.ticks;
        for client in &mut clients {
            let action = playing.then(|| random_action(&mut rng).encode());
            for event in client.tick(now, action) {
                log_client_event(client.client_id(), &event);
            }
        }
    }

    let summaries: Vec<ClientSummary> = clients
        .iter()
        .map(|client| {
            let server_view = client
                .authoritative()
                .and_then(|applied| server.history().get(applied.tick()));
            summarize_client(client, server_view)
        })
        .collect();
    let converged = summaries.iter().all(|client| client.converged);
    let stats = network.stats();
    let traffic = server
        .endpoint()
        .totals()
        .iter()
        .map(|(kind, totals)| {
            let summary = TrafficSummary {
                messages: totals.messages,
                bytes: totals.bytes,
            };
            (format!("{kind:?}"), summary)
        })
        .collect();

    let summary = Summary {
        scenario: scenario.clone(),
        server: server.stats().into(),
        network: NetworkSummary {
            sent: stats.sent,
            delivered: stats.delivered,
            dropped: stats.dropped,
            reordered: stats.reordered,
        },
        traffic,
        clients: summaries,
        entities: world.len(),
        converged,
    };
    info!(converged, "simulation finished");
    Ok(Outcome {
        summary,
        captured: server.endpoint().captured().to_vec(),
    })
}

fn summarize_client(client: &SimClient, server_view: Option<&Snapshot>) -> ClientSummary {
    let status = client.status();
    let stats = client.stats();
    let converged = match (client.authoritative(), server_view) {
        (Some(applied), Some(server)) => {
            applied == server && client.world().iter().eq(server.iter())
        }
        _ => false,
    };
    ClientSummary {
        client_id: client.client_id(),
        state: format!("{:?}", status.state),
        last_applied: status.last_applied.map(Tick::raw),
        full_snapshots: stats.full_snapshots,
        deltas: stats.deltas,
        resyncs: stats.resyncs,
        hard_snaps: stats.hard_snaps,
        hints: stats.hints,
        inputs_sent: stats.inputs_sent,
        converged,
    }
}

fn random_action(rng: &mut StdRng) -> MoveAction {
    if rng.gen_bool(0.2) {
        MoveAction::new(0, 0)
    } else {
        MoveAction::new(rng.gen_range(-2..=2), rng.gen_range(-2..=2))
    }
}

fn damage_someone(world: &mut GameWorld, rng: &mut StdRng, now: Tick) {
    let ids = world.entity_ids();
    if ids.is_empty() {
        return;
    }
    let id = ids[rng.gen_range(0..ids.len())];
    if world.apply_damage(id, rng.gen_range(5..=40), now) {
        info!(%id, "actor destroyed");
    }
}

fn log_client_event(client_id: u64, event: &ClientEvent) {
    match event {
        ClientEvent::SnapshotApplied { .. } => {}
        ClientEvent::ResyncRequested { missing_base } => {
            warn!(client_id, %missing_base, "client lost its baseline");
        }
        ClientEvent::Disconnected { reason } => warn!(client_id, ?reason, "client disconnected"),
        other => debug!(client_id, ?other, "client event"),
    }
}
