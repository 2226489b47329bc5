// Best-ball draft server entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file)
// 2. Load config
// 3. Open the draft store
// 4. Load the player pool from rankings
// 5. Build the draft engine
// 6. Seed configured rooms, resume timers for unfinished rooms
// 7. Spawn WebSocket server task
// 8. Wait for Ctrl+C
// 9. Cleanup on exit

use std::path::Path;
use std::sync::Arc;

use bestball_draft::clock::MonotonicClock;
use bestball_draft::engine::DraftEngine;
use bestball_draft::pool::{PlayerPool, StaticPlayerPool};
use bestball_draft::store::{DraftStore, MemoryStore, SqliteStore};
use bestball_server::config;
use bestball_server::identity::TokenIdentity;
use bestball_server::session::SessionSettings;
use bestball_server::supervisor::RoomSupervisor;
use bestball_server::ws_server;

use anyhow::Context;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Best-ball draft server starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: port {}, {} configured rooms, {} identity tokens",
        config.ws_port,
        config.rooms.len(),
        config.tokens.len()
    );

    // 3. Open the draft store
    let store = open_store(&config.db_path)?;

    // 4. Load the player pool
    let pool = StaticPlayerPool::load_csv(&config.rankings_path).with_context(|| {
        format!("failed to load rankings from {}", config.rankings_path.display())
    })?;
    info!("Loaded {} players from {}", pool.len(), config.rankings_path.display());

    // 5. Build the draft engine
    let engine = Arc::new(DraftEngine::new(
        store,
        Arc::new(pool),
        Arc::new(MonotonicClock::new()),
        config.rules.clone(),
        config.engine_settings(),
    ));

    // 6. Seed rooms and resume timers (crash recovery: the store is the
    //    source of truth, nothing is replayed)
    let supervisor = RoomSupervisor::new(engine.clone());
    let seeded = supervisor.seed_rooms(&config.rooms).await?;
    let started = supervisor.start_watchers().await?;
    info!("Seeded {} rooms, started {} room timers", seeded, started);

    // 7. Spawn WebSocket server task
    let ctx = ws_server::ServerContext {
        engine: engine.clone(),
        identity: Arc::new(TokenIdentity::new(config.tokens.clone())),
        settings: SessionSettings {
            ping_interval_secs: config.draft.ping_interval_secs,
            warning_threshold_secs: config.draft.warning_threshold_secs,
        },
    };
    let listener = ws_server::bind(config.ws_port)
        .await
        .with_context(|| format!("failed to bind WebSocket server on port {}", config.ws_port))?;
    let ws_handle = tokio::spawn(async move {
        if let Err(e) = ws_server::run(listener, ctx).await {
            error!("WebSocket server error: {}", e);
        }
    });

    info!("Server ready on 127.0.0.1:{}", config.ws_port);

    // 8. Wait for Ctrl+C
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    // 9. Cleanup
    ws_handle.abort();
    supervisor.shutdown();

    info!("Best-ball draft server shut down cleanly");
    Ok(())
}

fn open_store(db_path: &str) -> anyhow::Result<Arc<dyn DraftStore>> {
    if db_path == ":memory:" {
        info!("Using in-memory draft store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let store = SqliteStore::open(db_path).context("failed to open database")?;
    info!("Database opened at {}", db_path);
    Ok(Arc::new(store))
}

/// Initialize tracing to log to a file under `logs/`.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("bestball.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bestball_server=info,bestball_draft=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
