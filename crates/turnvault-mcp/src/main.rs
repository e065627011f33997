//! turnvault MCP server
//!
//! Indexes AI-assistant conversation turns, enriches them with topic,
//! quality and feedback-validation signals, and serves them back through a
//! boosted similarity search over the Model Context Protocol (stdio
//! transport, JSON-RPC 2.0).

mod bulk;
mod hook;
mod protocol;
mod server;

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use turnvault_core::Store;

use crate::protocol::stdio::StdioTransport;
use crate::server::McpServer;

#[derive(Parser)]
#[command(name = "turnvault-mcp", version, about = "MCP server for validated-conversation recall")]
struct Cli {
    /// Custom data directory (defaults to the platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the MCP server on stdio (default if no subcommand is given)
    Serve,
    /// Ingest a bulk transcript JSONL file and exit
    IngestBulk {
        /// Path to the JSONL transcript file
        path: PathBuf,
    },
    /// Normalise and ingest a single hook payload read from stdin
    IngestHook {
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long)]
        cwd: Option<String>,
    },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    info!("turnvault-mcp v{} starting", env!("CARGO_PKG_VERSION"));

    let store = match Store::open(cli.data_dir) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to open store: {e}");
            std::process::exit(1);
        }
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_serve(store).await,
        Command::IngestBulk { path } => run_ingest_bulk(store, path),
        Command::IngestHook { session_id, cwd } => run_ingest_hook(store, session_id, cwd),
    }
}

async fn run_serve(store: Store) {
    let server = McpServer::new(store);
    let transport = StdioTransport::new();

    info!("listening for MCP requests on stdio");
    if let Err(e) = transport.run(server).await {
        error!("server error: {e}");
        std::process::exit(1);
    }
    info!("turnvault-mcp shutting down");
}

fn run_ingest_bulk(store: Store, path: PathBuf) {
    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to read {}: {e}", path.display());
            std::process::exit(1);
        }
    };

    let mut server = McpServer::new(store);
    match server::ingest_bulk_file(&mut server, &contents) {
        Ok((added, skipped)) => {
            info!(added, skipped, "bulk ingest complete");
        }
        Err(e) => {
            error!("bulk ingest failed: {e}");
            std::process::exit(1);
        }
    }
}

fn run_ingest_hook(store: Store, session_id: Option<String>, cwd: Option<String>) {
    use std::io::Read;

    let mut payload = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut payload) {
        error!("failed to read hook payload from stdin: {e}");
        std::process::exit(1);
    }

    let raw = match hook::normalize(&payload, session_id, cwd) {
        Ok(raw) => raw,
        Err(e) => {
            error!("malformed hook payload: {e}");
            std::process::exit(1);
        }
    };

    let server = McpServer::new(store);
    let ctx = turnvault_core::EnrichmentContext {
        source: Some(turnvault_core::EnrichmentSource::Hook),
        ..Default::default()
    };
    let turn = server.processor().enrich(raw, &ctx);
    match server.store().add_one(&turnvault_core::EnrichedTurn { turn, embedding: None }) {
        Ok(Some(id)) => info!(id, "hook turn ingested"),
        Ok(None) => info!("hook turn skipped (duplicate content)"),
        Err(e) => {
            error!("failed to persist hook turn: {e}");
            std::process::exit(1);
        }
    }
}
