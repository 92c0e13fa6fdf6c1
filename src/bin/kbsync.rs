//! kbsync CLI: push a desired graph to a knowledge graph store.
//!
//! Usage:
//!   kbsync push --graph desired.json [--url URL] [--token TOKEN]
//!   kbsync read
//!   kbsync diff --desired a.json --baseline b.json

use clap::{Parser, Subcommand};
use kbsync::{Graph, GraphDelta, MemoryStore, Session, SyncOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "kbsync",
    version,
    about = "Synchronize a desired graph with a knowledge graph store"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to a YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Base URL of the graph store
    #[arg(long, global = true)]
    url: Option<String>,
    /// Bearer token for the data source
    #[arg(long, global = true)]
    token: Option<String>,
    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    skip_verify: bool,
    /// Run against an in-memory store instead of the remote one
    #[arg(long, global = true)]
    dry_run: bool,
    /// Log debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Make the remote graph match a desired graph document
    Push {
        /// JSON graph document
        #[arg(long, required = true)]
        graph: PathBuf,
    },
    /// Print the current remote graph as JSON
    Read,
    /// Summarize the delta between two graph documents without a store
    Diff {
        #[arg(long, required = true)]
        desired: PathBuf,
        #[arg(long, required = true)]
        baseline: PathBuf,
    },
}

/// Default config location (~/.config/kbsync/config.yaml)
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("kbsync").join("config.yaml"))
}

fn load_options(cli: &Cli) -> Result<SyncOptions, String> {
    let from_file = match &cli.config {
        Some(path) => SyncOptions::from_yaml_file(path)
            .map_err(|e| format!("Failed to load config '{}': {}", path.display(), e))?,
        None => match default_config_path().filter(|path| path.exists()) {
            Some(path) => SyncOptions::from_yaml_file(&path)
                .map_err(|e| format!("Failed to load config '{}': {}", path.display(), e))?,
            None => SyncOptions::default(),
        },
    };

    let mut flags = SyncOptions::new(cli.url.clone().unwrap_or_default())
        .with_skip_verify(cli.skip_verify);
    if let Some(token) = &cli.token {
        flags = flags.with_auth_token(token.clone());
    }
    Ok(from_file.merge(&flags))
}

fn open_session(cli: &Cli) -> Result<Session, String> {
    let options = load_options(cli)?;
    if cli.dry_run {
        return Ok(Session::new(Arc::new(MemoryStore::new()), options));
    }
    if options.url.is_empty() {
        return Err("no store URL given (use --url or set url in the config file)".to_string());
    }
    Session::connect(options).map_err(|e| e.to_string())
}

fn read_graph_file(path: &Path) -> Result<Graph, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    serde_json::from_str(&content).map_err(|e| format!("invalid graph document '{}': {}", path.display(), e))
}

fn print_delta(delta: &GraphDelta) {
    println!("{:<12}  {:>8}  {:>8}", "", "ADD", "REMOVE");
    println!("{}", "-".repeat(32));
    println!(
        "{:<12}  {:>8}  {:>8}",
        "assets",
        delta.assets_to_add.len(),
        delta.assets_to_remove.len()
    );
    println!(
        "{:<12}  {:>8}  {:>8}",
        "relations",
        delta.relations_to_add.len(),
        delta.relations_to_remove.len()
    );
    match &delta.schema {
        Some(change) if change.needs_target_push() => println!("schema: staged, then narrowed"),
        Some(_) => println!("schema: extended"),
        None => println!("schema: unchanged"),
    }
}

async fn cmd_push(cli: &Cli, path: &Path) -> i32 {
    let desired = match read_graph_file(path) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let mut session = match open_session(cli) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match session.synchronize(desired).await {
        Ok(report) if report.is_noop() => {
            println!("Remote graph already up to date");
            0
        }
        Ok(report) => {
            println!(
                "Pushed +{}/-{} assets, +{}/-{} relations in {} chunk(s), {} attempt(s), {:.1}s",
                report.assets_added,
                report.assets_removed,
                report.relations_added,
                report.relations_removed,
                report.chunks,
                report.attempts,
                report.elapsed.as_secs_f64()
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_read(cli: &Cli) -> i32 {
    let session = match open_session(cli) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let graph = match session.read_current_graph().await {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match serde_json::to_string_pretty(&graph) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_diff(desired: &Path, baseline: &Path) -> i32 {
    let graphs = read_graph_file(desired).and_then(|d| read_graph_file(baseline).map(|b| (d, b)));
    match graphs {
        Ok((desired, baseline)) => {
            print_delta(&desired.diff(&baseline));
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();

    let code = match &cli.command {
        Commands::Push { graph } => cmd_push(&cli, graph).await,
        Commands::Read => cmd_read(&cli).await,
        Commands::Diff { desired, baseline } => cmd_diff(desired, baseline),
    };
    std::process::exit(code);
}
