use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tracker::config::Config;
use tracker::db::{create_pool, ensure_schema};
use tracker::manifest::{ManifestResolver, StaticManifest};
use tracker::state::AppState;
use tracker::store::PgDocumentStore;

/// Maintenance tasks run against the configured database.
enum Task {
    /// Recompute the derived id arrays on every aggregate.
    Backfill,
    CompleteSession(String),
    SessionReport(String),
}

impl Task {
    fn from_args(mut args: impl Iterator<Item = String>) -> Result<Self> {
        match args.next().as_deref() {
            None | Some("backfill") => Ok(Task::Backfill),
            Some("complete-session") => Ok(Task::CompleteSession(
                args.next().context("complete-session requires a session id")?,
            )),
            Some("session-report") => Ok(Task::SessionReport(
                args.next().context("session-report requires a session id")?,
            )),
            Some(other) => bail!(
                "Unknown task '{other}' \
                 (expected backfill, complete-session <id> or session-report <id>)"
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting loadout tracker v{}", env!("CARGO_PKG_VERSION"));

    let task = Task::from_args(std::env::args().skip(1))?;

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url, config.db_max_connections).await?;
    ensure_schema(&db).await?;
    let store = Arc::new(PgDocumentStore::new(db));

    let manifest = match &config.manifest_path {
        Some(path) => StaticManifest::from_json_file(path)?,
        None => {
            info!("MANIFEST_PATH not set, display metadata will be empty");
            StaticManifest::new()
        }
    };
    if config.manifest_path.is_some() && manifest.is_empty() {
        warn!("Manifest has no definitions, display metadata will be empty");
    }
    let manifest: Arc<dyn ManifestResolver> = Arc::new(manifest);

    let state = AppState::new(store, manifest, &config);

    match task {
        Task::Backfill => {
            let updated = state.aggregates.update_all_aggregates().await?;
            info!("Backfill updated {updated} aggregate(s)");
        }
        Task::CompleteSession(id) => {
            let session = state.sessions.complete(&id).await?;
            info!("Session {} ({}) is {}", session.id, session.name, session.status.as_str());
        }
        Task::SessionReport(id) => {
            let report = state.reconciler.session_report(&id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
