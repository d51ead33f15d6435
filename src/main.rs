use std::io::Write;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::info;
use tokio::sync::mpsc;
use tokio::time::sleep;

use ballot::config::ClusterConfig;
use ballot::network::{MemoryNetwork, Transport, UdpTransport};
use ballot::raft::{NodeEvent, Raft};
use ballot::report::render;
use ballot::Cluster;

/// `MM:SS.mmm`, the same clock the event printer uses.
fn clock() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs() % 3600;
    format!("{:02}:{:02}.{:03}", secs / 60, secs % 60, now.subsec_millis())
}

fn init_logging(default_filter: &str) {
    let env = env_logger::Env::default().default_filter_or(default_filter);
    let _ = env_logger::Builder::from_env(env)
        .format(|buf, record| writeln!(buf, "{}\t{}", clock(), record.args()))
        .try_init();
}

#[derive(Parser)]
#[command(name = "ballot")]
#[command(about = "Raft-style leader election over an unreliable datagram transport")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct ClusterArgs {
    /// JSON cluster configuration file; flags below override it
    #[arg(short, long)]
    config: Option<String>,

    /// Comma-separated member ids, e.g. 0,1,2
    #[arg(short, long, value_delimiter = ',')]
    members: Option<Vec<u64>>,

    /// Host every member binds to
    #[arg(long)]
    host: Option<String>,

    /// Node n listens on base-port + n
    #[arg(long)]
    base_port: Option<u16>,

    /// Fraction of leader heartbeats to skip on purpose (0.0 - 1.0)
    #[arg(long)]
    drop: Option<f64>,

    /// Seed for election timeouts (each member offsets it by its id)
    #[arg(long)]
    seed: Option<u64>,
}

impl ClusterArgs {
    fn load(&self) -> anyhow::Result<ClusterConfig> {
        let mut config = match &self.config {
            Some(path) => ClusterConfig::from_json_file(path)
                .with_context(|| format!("loading cluster config from {path}"))?,
            None => ClusterConfig::default(),
        };

        if let Some(members) = &self.members {
            config.members = members.clone();
        }
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(base_port) = self.base_port {
            config.base_port = base_port;
        }
        if let Some(drop) = self.drop {
            config.heartbeat_drop_probability = drop;
        }
        if self.seed.is_some() {
            config.rng_seed = self.seed;
        }

        config.validate().context("invalid cluster configuration")?;
        Ok(config)
    }
}

#[derive(Args, Clone, Copy)]
struct OutputArgs {
    /// Print colored per-event lines instead of plain log output
    #[arg(long)]
    color: bool,

    /// With --color, print only role transitions
    #[arg(long)]
    transitions_only: bool,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    run_for: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Run every member of the cluster in this process
    Cluster {
        #[command(flatten)]
        cluster: ClusterArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// Use an in-process channel instead of UDP sockets
        #[arg(long)]
        in_memory: bool,
    },

    /// Run a single member over UDP; start one per id to form a cluster
    Node {
        /// Id of this member (must be listed in the members)
        #[arg(short, long)]
        id: u64,

        #[command(flatten)]
        cluster: ClusterArgs,

        #[command(flatten)]
        output: OutputArgs,
    },
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<NodeEvent>, transitions_only: bool) {
    while let Some(event) = rx.recv().await {
        if transitions_only && !event.kind.is_transition() {
            continue;
        }
        println!("{}\t{}", clock(), render(&event, true));
    }
}

async fn wait_for_exit(run_for: Option<u64>) -> anyhow::Result<()> {
    match run_for {
        Some(secs) => {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => signal?,
                _ = sleep(Duration::from_secs(secs)) => {}
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }
    Ok(())
}

async fn run<T: Transport>(mut cluster: Cluster<T>, output: OutputArgs) -> anyhow::Result<()> {
    let printer = if output.color {
        let (tx, rx) = mpsc::unbounded_channel();
        cluster.set_event_sender(tx);
        Some(tokio::spawn(print_events(rx, output.transitions_only)))
    } else {
        None
    };

    cluster.start();
    wait_for_exit(output.run_for).await?;

    info!("shutting down...");
    cluster.shutdown().await?;
    for state in cluster.snapshots() {
        info!(
            "Node {} finished in term {} as {} (leader: {:?})",
            state.node_id, state.current_term, state.role, state.leader_id
        );
    }

    // Dropping the nodes closes the event channel and lets the printer drain.
    drop(cluster);
    if let Some(printer) = printer {
        printer.await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Cluster {
            cluster,
            output,
            in_memory,
        } => {
            init_logging(if output.color { "warn" } else { "info" });
            let config = cluster.load()?;

            if in_memory {
                info!("Starting in-memory cluster {:?}", config.members);
                let network = MemoryNetwork::new();
                run(Cluster::in_memory(&config, &network)?, output).await?;
            } else {
                info!(
                    "Starting UDP cluster {:?} on {}:{}+id",
                    config.members, config.host, config.base_port
                );
                run(Cluster::bind_udp(&config).await?, output).await?;
            }
        }
        Command::Node {
            id,
            cluster,
            output,
        } => {
            init_logging(if output.color { "warn" } else { "info" });
            let config = cluster.load()?;
            if !config.members.contains(&id) {
                anyhow::bail!("node {id} is not one of the members {:?}", config.members);
            }

            let transport = UdpTransport::bind(id, config.port_map()?).await?;
            info!("Starting node {id} at {}", transport.local_addr()?);
            let node = Raft::new(config.raft_config(id), transport)?;
            run(Cluster::from_nodes(vec![node]), output).await?;
        }
    }

    Ok(())
}
