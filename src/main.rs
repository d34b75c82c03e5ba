use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use switchyard_core::config::AppConfig;
use switchyard_core::graph::TaskGraph;
use switchyard_core::traits::AgentDispatcher;
use switchyard_core::types::{CandidateMatch, CandidatePool, NodeRequest, SemanticSignal};
use switchyard_decision::{decide_strategy, DecisionContext, DecisionEngine};
use switchyard_planner::{execution_waves, validate, HeuristicProposer};
use switchyard_policy::{PolicyContext, PolicyEngine, ResourceEstimate, ResourceUsage};
use switchyard_runtime::{RouteRequest, RouteStatus, Router};

#[derive(Parser)]
#[command(name = "switchyard", version, about = "Task routing: plan, police, decide, execute")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "switchyard.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Structurally validate a task graph against a candidate pool
    Validate {
        /// Task graph JSON (object with `nodes`/`tasks`, or a bare array)
        graph: PathBuf,
        /// Candidate pool JSON
        #[arg(long)]
        pool: PathBuf,
    },
    /// Run the policy engine over a task graph
    Policy {
        /// Task graph JSON
        graph: PathBuf,
        /// Subject passed to authorization
        #[arg(long, default_value = "cli")]
        subject: String,
        /// Current resource usage JSON
        #[arg(long)]
        usage: Option<PathBuf>,
        /// Include projected call volume and wall time in the risk score
        #[arg(long)]
        estimate: bool,
    },
    /// Select agent, tools and model from scored candidates
    Decide {
        /// Decision input JSON
        input: PathBuf,
    },
    /// Route a request end to end with an echo dispatcher
    Run {
        /// Route request JSON
        request: PathBuf,
        /// Plan, police and decide without dispatching
        #[arg(long)]
        dry_run: bool,
        /// Treat a confirmation-gated plan as confirmed
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Input to `switchyard decide`.
#[derive(Deserialize)]
struct DecideInput {
    #[serde(default)]
    signal: SemanticSignal,
    #[serde(default)]
    agents: Vec<CandidateMatch>,
    #[serde(default)]
    tools: Vec<CandidateMatch>,
    #[serde(default)]
    models: Vec<CandidateMatch>,
    #[serde(default)]
    context: DecisionContext,
    #[serde(default)]
    complexity: f64,
    #[serde(default)]
    steps: usize,
    #[serde(default)]
    recent_failures: u32,
    #[serde(default)]
    needs_observability: bool,
    #[serde(default)]
    needs_long_horizon: bool,
}

/// Dispatcher that echoes each node back as its result.
struct EchoDispatcher;

impl AgentDispatcher for EchoDispatcher {
    fn dispatch(
        &self,
        request: NodeRequest,
    ) -> BoxFuture<'_, switchyard_core::Result<Option<serde_json::Value>>> {
        Box::pin(async move {
            info!(
                node = %request.node_id,
                agent = %request.agent,
                capability = %request.capability,
                "Echo dispatch"
            );
            Ok(Some(serde_json::json!({
                "node": request.node_id,
                "agent": request.agent,
                "capability": request.capability,
                "description": request.description,
                "upstream": request.upstream.keys().collect::<Vec<_>>(),
            })))
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("switchyard=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "switchyard", &mut std::io::stdout());
        return Ok(());
    }

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        info!(path = %cli.config.display(), "No config file found, using defaults");
        AppConfig::default()
    };

    match cli.command {
        Commands::Validate { graph, pool } => {
            let graph = load_graph(&graph)?;
            let pool: CandidatePool = read_json(&pool)?;
            let report = validate(&graph, &pool);
            let waves = execution_waves(&graph);
            print_json(&serde_json::json!({
                "ok": report.is_valid(),
                "errors": report.errors(),
                "waves": waves.waves,
            }))?;
            if !report.is_valid() {
                anyhow::bail!("task graph failed validation");
            }
        }
        Commands::Policy {
            graph,
            subject,
            usage,
            estimate,
        } => {
            let graph = load_graph(&graph)?;
            let mut ctx = PolicyContext::new(subject);
            if let Some(path) = usage {
                ctx = ctx.with_usage(read_json::<ResourceUsage>(&path)?);
            }
            if estimate {
                ctx = ctx.with_estimate(ResourceEstimate::from_graph(&graph, &config.policy.risk));
            }
            let engine = PolicyEngine::new(config.policy.clone());
            let result = engine.validate(&graph, &ctx).await;
            print_json(&serde_json::json!({
                "verdict": result.verdict(),
                "result": result,
            }))?;
        }
        Commands::Decide { input } => {
            let input: DecideInput = read_json(&input)?;
            let engine = DecisionEngine::new(config.decision.clone());
            let decision = engine.decide(
                &input.signal,
                &input.agents,
                &input.tools,
                &input.models,
                &input.context,
            );
            let strategy = decide_strategy(
                input.complexity,
                input.steps,
                input.recent_failures,
                input.needs_observability,
                input.needs_long_horizon,
                &config.strategy,
            );
            print_json(&serde_json::json!({
                "decision": decision,
                "strategy": strategy,
            }))?;
        }
        Commands::Run {
            request,
            dry_run,
            yes,
        } => {
            let mut request: RouteRequest = read_json(&request)?;
            request.dry_run |= dry_run;
            request.confirmed |= yes;

            let router = Router::new(
                &config,
                Arc::new(HeuristicProposer::new()),
                Arc::new(EchoDispatcher),
            );

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling after the current wave");
                    on_signal.cancel();
                }
            });

            let outcome = router.route(&request, &cancel).await;
            print_json(&outcome)?;
            match outcome.status {
                RouteStatus::Completed | RouteStatus::Planned => {}
                RouteStatus::Fallback => {
                    eprintln!("No agent is confident enough; answer with the model only.");
                }
                RouteStatus::NeedsConfirmation => {
                    eprintln!("Plan requires confirmation; re-run with --yes to proceed.");
                }
                other => anyhow::bail!("request not completed: {:?}", other),
            }
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        // Handled before config loading
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn load_graph(path: &Path) -> anyhow::Result<TaskGraph> {
    let value: serde_json::Value = read_json(path)?;
    Ok(TaskGraph::from_value(value)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
