use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use deckflow::{Config, DeckRequest, Engine, Result, RoutingPolicy};

/// Deckflow - turns a presentation brief into a quality-checked slide deck
#[derive(Parser, Debug)]
#[command(name = "deckflow")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    DECKFLOW_DEBUG=1     Enable debug logging (alternative to --debug)\n    RUST_LOG=<filter>    Override the log filter"
)]
pub struct Cli {
    /// Enable debug logging (written to stderr)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Config file (default: ~/.deckflow/deckflow.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Generate a deck from a JSON brief and print the outcome as JSON
    Run {
        /// Path to the brief
        brief: PathBuf,

        /// Routing policy, overriding the brief and the config
        #[arg(short, long)]
        policy: Option<RoutingPolicy>,

        /// Return partial output when interrupted
        #[arg(long)]
        best_effort: bool,
    },

    /// Show registry size, backends and the routing table
    Status,

    /// Show pipeline phases and dependency edges
    Graph,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    deckflow::log::init_with_debug(cli.debug);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Run {
            brief,
            policy,
            best_effort,
        } => run_brief(&config, &brief, policy, best_effort),
        Command::Status => run_status(&config),
        Command::Graph => run_graph(&config),
    }
}

fn run_brief(
    config: &Config,
    brief: &Path,
    policy: Option<RoutingPolicy>,
    best_effort: bool,
) -> Result<()> {
    let engine = Engine::initialize(config)?;
    let mut request = DeckRequest::from_json(&fs::read_to_string(brief)?, engine.default_policy())?;
    if let Some(policy) = policy {
        request.policy = policy;
    }
    request.best_effort |= best_effort;
    tracing::debug!(brief = %brief.display(), policy = %request.policy, "brief loaded");

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async {
        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling request");
                interrupt.cancel();
            }
        });
        engine.orchestrator().run_pipeline(request, &cancel).await
    })?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn run_status(config: &Config) -> Result<()> {
    let engine = Engine::initialize(config)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&engine.orchestrator().status())?
    );
    Ok(())
}

fn run_graph(config: &Config) -> Result<()> {
    let engine = Engine::initialize(config)?;
    let graph = engine.orchestrator().graph();

    println!("Phases:");
    for (phase, nodes) in graph.phases() {
        let mode = if graph.is_concurrent_phase(phase) {
            "concurrent"
        } else {
            "sequential"
        };
        let names: Vec<String> = nodes.iter().map(|n| n.to_string()).collect();
        println!("  {:<14} {:<11} {}", phase.to_string(), mode, names.join(", "));
    }
    println!();
    println!("Dependencies:");
    for (from, to, kind) in graph.edges() {
        println!("  {} -> {} ({})", from, to, kind);
    }
    Ok(())
}
