use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use netaudit_rs::{
    analyzer::Analyzer,
    history::HistoryStore,
    orchestrator::Orchestrator,
    rules::RuleCatalog,
    server::{self, AppState},
    tasks::TaskStore,
};

/// netaudit-rs — task-oriented network security auditing engine with an
/// embedded web API.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "netaudit-rs",
    version,
    about = "Task-oriented network security auditing engine with per-protocol probes and compliance-rule findings.",
    long_about = None
)]
struct Cli {
    /// Address the API and frontend are served on.
    #[arg(long, default_value = "0.0.0.0:8000")]
    bind: String,

    /// Compliance rule catalog (JSON). A missing or broken file degrades to
    /// the analyzer's built-in defaults.
    #[arg(long, default_value = "data/compliance_rules.json")]
    rules: PathBuf,

    /// SQLite database holding scan history.
    #[arg(long, default_value = "data/netaudit.db")]
    database: PathBuf,

    /// Directory with the static frontend bundle.
    #[arg(long = "ui-dir", default_value = "dist")]
    ui_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Some(parent) = cli.database.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let rules = Arc::new(RuleCatalog::load(&cli.rules));
    let history = Arc::new(HistoryStore::open(&cli.database)?);
    let tasks = TaskStore::new();
    let orchestrator = Arc::new(Orchestrator::new(
        Analyzer::new(rules),
        tasks.clone(),
        history.clone(),
    ));

    let state = AppState {
        orchestrator,
        tasks,
        history,
    };
    server::spawn_server(&cli.bind, state, &cli.ui_dir.to_string_lossy()).await
}
