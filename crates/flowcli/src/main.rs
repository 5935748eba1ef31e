// crates/flowcli/src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use flowcore::{FlowNodeStatus, FlowStatus, Id, Node, NodeState, RunContext};
use flowruntime::{load_flow, FlowRuntime, NodeRegistry, RuntimeConfig};
use flowstore::{Collections, Store, StoreConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flow")]
#[command(about = "Flow Engine CLI", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a flow file
    Run {
        /// Path to flow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Per-batch timeout in milliseconds, overriding the file
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Node status channel capacity
        #[arg(long, default_value_t = RuntimeConfig::default().status_buffer)]
        status_buffer: usize,
    },

    /// Validate a flow file
    Validate {
        /// Path to flow JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List available node kinds
    Nodes,

    /// Show the collections of a workspace and check their ordering
    Collections {
        /// Path to the store database
        #[arg(long)]
        db: PathBuf,

        /// Workspace id
        #[arg(long)]
        workspace: Id,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn registry() -> Arc<NodeRegistry> {
    let mut registry = NodeRegistry::new();
    flownodes::register_all(&mut registry);
    Arc::new(registry)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            file,
            timeout_ms,
            status_buffer,
        } => run_flow(file, timeout_ms, status_buffer).await,
        Commands::Validate { file } => validate_flow(file),
        Commands::Nodes => {
            list_nodes();
            Ok(())
        }
        Commands::Collections { db, workspace } => show_collections(db, workspace),
    }
}

async fn run_flow(file: PathBuf, timeout_ms: Option<u64>, status_buffer: usize) -> Result<()> {
    println!("🚀 Loading flow from: {}", file.display());
    let mut spec = load_flow(&file)?;
    if timeout_ms.is_some() {
        spec.timeout_ms = timeout_ms;
    }
    println!("📋 Flow: {}", spec.name);
    println!("   Nodes: {}", spec.nodes.len());
    println!("   Edges: {}", spec.edges.len());
    println!();

    let config = RuntimeConfig {
        status_buffer,
        ..RuntimeConfig::default()
    };
    let runtime = FlowRuntime::with_registry(registry(), config);
    let graph = runtime.prepare(&spec)?;

    let ctx = RunContext::background();
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, canceling run");
            interrupt.cancel();
        }
    });

    let mut handle = runtime.start(ctx, graph);
    let (mut node_open, mut flow_open) = (true, true);
    let mut terminal = None;
    while node_open || flow_open {
        tokio::select! {
            next = handle.statuses.recv(), if node_open => match next {
                Some(status) => print_node_status(&status),
                None => node_open = false,
            },
            next = handle.flow_statuses.recv(), if flow_open => match next {
                Some(status) => {
                    print_flow_status(status);
                    if status.is_terminal() {
                        terminal = Some(status);
                    }
                }
                None => flow_open = false,
            },
        }
    }

    let result = handle.task.await.context("flow task panicked")?;
    match (result, terminal) {
        (Ok(()), Some(FlowStatus::Success)) => Ok(()),
        (Err(e), _) => Err(e).context(format!("flow '{}' did not complete", spec.name)),
        (Ok(()), other) => bail!("flow '{}' ended with status {:?}", spec.name, other),
    }
}

fn print_node_status(status: &FlowNodeStatus) {
    let when = status.timestamp.format("%H:%M:%S%.3f");
    match status.state {
        NodeState::Running => println!("  ⚡ {when} {} running", status.name),
        NodeState::Success => {
            println!("  ✅ {when} {} succeeded", status.name);
            if let Some(output) = &status.output {
                println!("     {}", output);
            }
        }
        NodeState::Failure => println!(
            "  ❌ {when} {} failed: {}",
            status.name,
            status.error.as_deref().unwrap_or("unknown error")
        ),
        NodeState::Canceled => println!("  ⏹️  {when} {} canceled", status.name),
    }
}

fn print_flow_status(status: FlowStatus) {
    match status {
        FlowStatus::Starting => println!("▶️  Flow started"),
        FlowStatus::Success => println!("✨ Flow completed successfully"),
        FlowStatus::Failed => println!("💥 Flow failed"),
        FlowStatus::Canceled => println!("⏹️  Flow canceled"),
    }
}

fn validate_flow(file: PathBuf) -> Result<()> {
    println!("🔍 Validating flow: {}", file.display());
    let spec = load_flow(&file)?;
    let graph = registry()
        .prepare(&spec)
        .with_context(|| format!("flow '{}' is invalid", spec.name))?;

    println!("✅ Flow is valid:");
    println!("   Name: {}", spec.name);
    println!("   Nodes: {}", graph.nodes.len());
    println!("   Edges: {}", spec.edges.len());
    match graph.nodes.get(&graph.start_id) {
        Some(start) => println!("   Start: {} ({})", start.name(), graph.start_id),
        None => println!("   Start: {}", graph.start_id),
    }
    Ok(())
}

fn list_nodes() {
    println!("📦 Available Node Kinds:");
    println!();

    let registry = registry();
    for kind in registry.list_node_kinds() {
        if let Some(metadata) = registry.get_metadata(kind) {
            println!("  • {} ({})", kind, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", kind);
        }
    }
}

fn show_collections(db: PathBuf, workspace: Id) -> Result<()> {
    let store = Store::open(&db, &StoreConfig::default())
        .with_context(|| format!("cannot open store {}", db.display()))?;
    let collections = Collections::new(&store);

    let report = collections.ordered().verify(workspace)?;
    println!("🗂️  Workspace {} holds {} collection(s)", workspace, report.len);
    if !report.is_ok() {
        for problem in &report.problems {
            println!("  ⚠️  {}", serde_json::to_string(problem)?);
        }
        bail!("collection order of {} is broken; run a compaction", workspace);
    }

    for (position, collection) in collections.list(workspace)?.iter().enumerate() {
        println!("  {:>3}. {} ({})", position, collection.name, collection.id);
    }
    Ok(())
}
