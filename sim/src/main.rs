mod inspect;
mod recorder;
mod scenario;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use demo::demo_registry;
use glob::Pattern;
use inspect::{inspect, MessageReport};
use scenario::{run, Scenario};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "rogue-sim",
    version,
    about = "Headless rogue-net simulation and message inspection"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a server and clients over a simulated network.
    Run {
        #[arg(long, default_value_t = 4)]
        clients: u32,
        /// Server-driven entities that wander on their own.
        #[arg(long, default_value_t = 16)]
        drifters: u32,
        /// Ticks with player input.
        #[arg(long, default_value_t = 600)]
        ticks: u32,
        /// Quiet ticks at the end before checking convergence.
        #[arg(long, default_value_t = 60)]
        settle: u32,
        /// RNG seed for the network and the players.
        #[arg(long, default_value_t = 1)]
        seed: u64,
        /// Unreliable loss probability in [0, 1].
        #[arg(long, default_value_t = 0.0)]
        loss: f64,
        /// Unreliable reorder probability in [0, 1].
        #[arg(long, default_value_t = 0.0)]
        reorder: f64,
        #[arg(long, default_value_t = 1)]
        latency: u32,
        #[arg(long, default_value_t = 0)]
        jitter: u32,
        /// Start tick of a total outage.
        #[arg(long, requires = "outage_ticks")]
        outage_at: Option<u32>,
        /// Length of the outage in ticks.
        #[arg(long, requires = "outage_at")]
        outage_ticks: Option<u32>,
        /// Send a reliable snapshot every N ticks and hints in between.
        #[arg(long, default_value_t = 1)]
        snapshot_interval: u32,
        /// Snapshots the server keeps as delta baselines.
        #[arg(long, default_value_t = 64)]
        history: usize,
        /// Damage a random actor every N ticks.
        #[arg(long, default_value_t = 0)]
        damage_every: u32,
        /// Write the first server messages and summary.json here.
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Server messages kept for `--out-dir`.
        #[arg(long, default_value_t = 64)]
        capture: usize,
    },
    /// Decode captured messages (a file or a directory of captures).
    Inspect {
        path: PathBuf,
        /// File name pattern selecting captures inside a directory.
        #[arg(long, default_value = "*.bin")]
        glob: String,
        /// Print one JSON object per line instead of a pretty array.
        #[arg(long)]
        compact: bool,
    },
    /// Print the demo component registry.
    Schema,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            clients,
            drifters,
            ticks,
            settle,
            seed,
            loss,
            reorder,
            latency,
            jitter,
            outage_at,
            outage_ticks,
            snapshot_interval,
            history,
            damage_every,
            out_dir,
            capture,
        } => {
            let scenario = Scenario {
                clients,
                drifters,
                ticks,
                settle_ticks: settle,
                seed,
                loss: loss.clamp(0.0, 1.0),
                reorder: reorder.clamp(0.0, 1.0),
                latency_ticks: latency,
                jitter_ticks: jitter,
                outage: outage_at.zip(outage_ticks),
                snapshot_interval,
                history_capacity: history,
                damage_every,
            };
            let capture = if out_dir.is_some() { capture } else { 0 };
            let outcome = run(&scenario, capture)?;
            if let Some(out_dir) = &out_dir {
                fs::create_dir_all(out_dir)
                    .with_context(|| format!("create output dir {}", out_dir.display()))?;
                for (index, message) in outcome.captured.iter().enumerate() {
                    let path = out_dir.join(format!(
                        "{index:05}_{}_t{:06}_{:?}.bin",
                        message.to, message.tick, message.kind
                    ));
                    fs::write(&path, &message.bytes)
                        .with_context(|| format!("write {}", path.display()))?;
                }
                write_json(&out_dir.join("summary.json"), &outcome.summary)?;
                info!(dir = %out_dir.display(), "capture written");
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&outcome.summary).context("serialize summary")?
            );
            if !outcome.summary.converged {
                anyhow::bail!("clients did not converge on the authoritative state");
            }
        }
        Command::Inspect {
            path,
            glob,
            compact,
        } => {
            let pattern = Pattern::new(&glob).context("invalid glob pattern")?;
            let reports = inspect_path(&path, &pattern)?;
            if compact {
                for report in &reports {
                    println!("{}", serde_json::to_string(report).context("serialize report")?);
                }
            } else {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&reports).context("serialize reports")?
                );
            }
        }
        Command::Schema => {
            let registry = demo_registry().context("build demo registry")?;
            let description = SchemaDescription {
                hash: format!("{:016x}", registry.hash()),
                components: registry
                    .iter()
                    .map(|entry| ComponentDescription {
                        kind: entry.kind,
                        name: entry.name,
                        version: entry.version,
                    })
                    .collect(),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&description).context("serialize schema")?
            );
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct SchemaDescription {
    hash: String,
    components: Vec<ComponentDescription>,
}

#[derive(Serialize)]
struct ComponentDescription {
    kind: schema::ComponentKind,
    name: &'static str,
    version: u16,
}

#[derive(Serialize)]
struct FileReport {
    file: String,
    #[serde(flatten)]
    message: MessageReport,
}

fn is_capture(pattern: &Pattern, path: &Path) -> bool {
    pattern.matches_path(path)
        || path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| pattern.matches(name))
}

fn inspect_path(path: &Path, pattern: &Pattern) -> Result<Vec<FileReport>> {
    let registry = demo_registry().context("build demo registry")?;
    let files = if path.is_dir() {
        let mut files = Vec::new();
        for entry in fs::read_dir(path).with_context(|| format!("read {}", path.display()))? {
            let file = entry.context("read dir entry")?.path();
            if file.is_file() && is_capture(pattern, &file) {
                files.push(file);
            }
        }
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    files
        .iter()
        .map(|file| {
            let bytes = fs::read(file).with_context(|| format!("read {}", file.display()))?;
            let message =
                inspect(&bytes, &registry).with_context(|| format!("inspect {}", file.display()))?;
            Ok(FileReport {
                file: file.display().to_string(),
                message,
            })
        })
        .collect()
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let contents = serde_json::to_string_pretty(value).context("serialize json")?;
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
