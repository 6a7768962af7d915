//! nodescored: run the nodescore plugin outside the scheduler.
//!
//! Loads a `nodescore.toml` and a JSON cluster snapshot, then drives the
//! plugin through a scoring cycle exactly as the scheduler would:
//! - `score` scores every node in the snapshot and prints the
//!   normalized result
//! - `query` measures one node and prints its raw value
//!
//! # Usage
//!
//! ```text
//! nodescored score --config nodescore.toml --snapshot cluster.json --pod default/web-0
//! nodescored query --config nodescore.toml --snapshot cluster.json --node k8s-node1
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use nodescore_core::config::NetworkTrafficConfig;
use nodescore_core::{Context, NodescoreConfig, PodRef, ProviderKind};
use nodescore_metrics::build_bandwidth_query;
use nodescore_plugin::{
    CycleResult, CycleState, InMemorySnapshot, NodeAddressIndex, NodeScorer, Plugin,
    SchedulerHandle, ScoringCoordinator, run_cycle,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "nodescored", about = "nodescore scheduler plugin driver")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score every node of a snapshot for one pod.
    Score {
        /// Path to nodescore.toml.
        #[arg(long)]
        config: PathBuf,

        /// Path to the cluster snapshot (JSON).
        #[arg(long)]
        snapshot: PathBuf,

        /// Pod being scheduled, as namespace/name.
        #[arg(long, default_value = "default/nodescore-dry-run")]
        pod: String,

        /// Maximum number of nodes scored concurrently.
        #[arg(long, default_value = "16")]
        parallelism: usize,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Measure a single node and print its raw value.
    Query {
        /// Path to nodescore.toml.
        #[arg(long)]
        config: PathBuf,

        /// Path to the cluster snapshot (JSON).
        #[arg(long)]
        snapshot: PathBuf,

        /// Node to measure.
        #[arg(long)]
        node: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Score {
            config,
            snapshot,
            pod,
            parallelism,
            json,
        } => run_score(&config, &snapshot, &pod, parallelism, json).await,
        Command::Query {
            config,
            snapshot,
            node,
        } => run_query(&config, &snapshot, &node).await,
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,nodescore=debug"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load(config: &Path, snapshot: &Path) -> anyhow::Result<(NodescoreConfig, Arc<InMemorySnapshot>)> {
    let config = NodescoreConfig::from_file(config)
        .with_context(|| format!("loading config {}", config.display()))?;
    let snapshot = InMemorySnapshot::from_file(snapshot)
        .with_context(|| format!("loading snapshot {}", snapshot.display()))?;
    info!(nodes = snapshot.len(), provider = ?config.plugin.provider, "inputs loaded");
    Ok((config, Arc::new(snapshot)))
}

/// Context cancelled on Ctrl-C.
fn interruptible() -> Context {
    let (ctx, cancel) = Context::background().with_cancel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, abandoning in-flight queries");
            cancel.cancel();
        }
    });
    ctx
}

async fn run_score(
    config_path: &Path,
    snapshot_path: &Path,
    pod: &str,
    parallelism: usize,
    json: bool,
) -> anyhow::Result<()> {
    let (config, snapshot) = load(config_path, snapshot_path)?;
    let pod = PodRef::parse(pod);
    let nodes: Vec<String> = snapshot.list_nodes().into_iter().map(|n| n.name).collect();
    if nodes.is_empty() {
        bail!("snapshot {} has no nodes", snapshot_path.display());
    }

    let plugin = ScoringCoordinator::new(&config, snapshot)
        .await
        .context("building scoring plugin")?;
    let plugin = Arc::new(plugin);

    let result = run_cycle(Arc::clone(&plugin), &interruptible(), &pod, &nodes, parallelism)
        .await
        .context("scoring cycle failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result_json(plugin.name(), &pod, &result))?);
    } else {
        print_result(&result);
    }
    Ok(())
}

fn result_json(plugin: &str, pod: &PodRef, result: &CycleResult) -> serde_json::Value {
    serde_json::json!({
        "plugin": plugin,
        "pod": pod.to_string(),
        "scores": result.scores,
        "best": result.best().map(|s| s.name.as_str()),
        "failures": result
            .failures
            .iter()
            .map(|f| serde_json::json!({ "node": f.node, "reason": f.status.message() }))
            .collect::<Vec<_>>(),
        "skipped": result.skipped,
    })
}

fn print_result(result: &CycleResult) {
    let width = result
        .scores
        .iter()
        .map(|s| s.name.len())
        .chain(result.failures.iter().map(|f| f.node.len()))
        .max()
        .unwrap_or(4)
        .max(4);

    println!("{:<width$}  SCORE", "NODE");
    for s in &result.scores {
        println!("{:<width$}  {}", s.name, s.score);
    }
    for f in &result.failures {
        println!("{:<width$}  failed: {}", f.node, f.status.message());
    }
    for node in &result.skipped {
        println!("{node:<width$}  skipped");
    }
}

/// The bandwidth query the plugin issues for `node`, or `None` when no
/// address is known for it.
fn bandwidth_query_for(
    config: &NodescoreConfig,
    traffic: &NetworkTrafficConfig,
    snapshot: &InMemorySnapshot,
    node: &str,
) -> Option<String> {
    let index = NodeAddressIndex::new(traffic.exporter_port).with_overrides(
        config
            .nodes
            .iter()
            .map(|n| (n.name.clone(), n.address.clone())),
    );
    index.sync_from_nodes(&snapshot.list_nodes());
    index
        .resolve(node)
        .map(|addr| build_bandwidth_query(&addr, &traffic.network_interface, traffic.time_range))
}

async fn run_query(config_path: &Path, snapshot_path: &Path, node: &str) -> anyhow::Result<()> {
    let (config, snapshot) = load(config_path, snapshot_path)?;

    if let (ProviderKind::NetworkTraffic, Some(traffic)) =
        (config.plugin.provider, &config.network_traffic)
    {
        match bandwidth_query_for(&config, traffic, &snapshot, node) {
            Some(query) => println!("query: {query}"),
            None => warn!(%node, "no address known for node"),
        }
    }

    let plugin = ScoringCoordinator::new(&config, snapshot)
        .await
        .context("building scoring plugin")?;

    let pod = PodRef::new("default", "nodescore-query");
    let (raw, status) = plugin
        .score(&interruptible(), &CycleState::new(), &pod, node)
        .await;

    if !status.is_success() {
        bail!(
            "{} could not score {node} within {:?}: {}",
            plugin.name(),
            plugin.score_timeout(),
            status.message()
        );
    }
    println!("{node}: {raw}");
    Ok(())
}
