//! Binary entry point for kbgate.
//!
//! `serve` runs the chat service; `add-users` and `check-kb` are offline
//! maintenance commands.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr and print_stdout in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use kbgate::bot::{Router, WorkerPool, watch_knowledge};
use kbgate::config::ServiceConfig;
use kbgate::knowledge::document;
use kbgate::models::parse_user_ids;
use kbgate::services::{AccessControl, NotificationFanout, SearchHistoryLog};
use kbgate::storage::SqliteStore;
use kbgate::transport::{TelegramReceiver, TelegramTransport};
use kbgate::{KnowledgeBase, health, observability};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;

/// kbgate - a moderated chat front-end to a searchable knowledge base.
#[derive(Parser)]
#[command(name = "kbgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the chat service.
    Serve,

    /// Approve users without going through the chat, creating missing records.
    AddUsers {
        /// Numeric chat user ids.
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Decode the knowledge document and report what was recognized.
    CheckKb,
}

/// Main entry point.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ServiceConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Serve => cmd_serve(config).await,
        Commands::AddUsers { ids } => cmd_add_users(&config, &ids),
        Commands::CheckKb => cmd_check_kb(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

fn open_store(config: &ServiceConfig) -> Result<Arc<SqliteStore>, Box<dyn std::error::Error>> {
    Ok(Arc::new(SqliteStore::open(&config.database_path)?))
}

/// Runs the chat service until Ctrl-C.
async fn cmd_serve(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(&config)?;
    let knowledge = Arc::new(KnowledgeBase::open(&config.knowledge_path));

    let transport = Arc::new(TelegramTransport::new(
        config.api_base_url.clone(),
        config.bot_token.clone(),
        config.delivery_timeout(),
    )?);
    let fanout = NotificationFanout::new(transport, config.fanout_delay(), config.delivery_timeout());

    let router = Arc::new(Router::new(
        AccessControl::new(store.clone(), config.admin_id),
        knowledge,
        SearchHistoryLog::new(store),
        fanout,
    ));
    let pool = WorkerPool::new(Arc::clone(&router));
    let receiver = TelegramReceiver::new(&config.api_base_url, &config.bot_token)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        tracing::info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let probe = tokio::spawn(health::serve(config.health_addr, shutdown_rx.clone()));
    let watcher = tokio::spawn(watch_knowledge(
        Arc::clone(&router),
        config.reload_interval(),
        shutdown_rx.clone(),
    ));

    tracing::info!(admin = %config.admin_id, "kbgate serving");
    receiver.run(|event| pool.dispatch(event), shutdown_rx).await;

    watcher.await?;
    probe.await??;
    tracing::info!("kbgate stopped");
    Ok(())
}

/// Force-approves the given ids.
fn cmd_add_users(config: &ServiceConfig, ids: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let ids = parse_user_ids(&ids.join(" "))?;
    let access = AccessControl::new(open_store(config)?, config.admin_id);
    let approved = access.force_approve(&ids)?;
    println!("Approved {approved} user(s)");
    Ok(())
}

/// Reports entry count, dropped records and checksum of the document.
fn cmd_check_kb(config: &ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let path = &config.knowledge_path;
    let bytes = std::fs::read(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let decoded = document::decode(&String::from_utf8_lossy(&bytes));

    println!("Document: {}", path.display());
    println!("Entries:  {}", decoded.entries.len());
    println!("Dropped:  {}", decoded.dropped);
    println!("Ignored:  {}", decoded.ignored);
    println!("SHA-256:  {}", document::checksum(&bytes));
    Ok(())
}
