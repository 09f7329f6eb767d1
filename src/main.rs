//! Countdown Hub - real-time countdown timers over HTTP and WebSocket
//!
//! This is the main entry point for the countdown-hub server.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use countdown_hub::{
    api::create_router,
    config::Config,
    engine::{restore_timers, TimerService},
    realtime::{Broadcaster, ConnectionRegistry},
    services::{SqliteSnapshotCache, SqliteTimerRepository},
    state::AppState,
    tasks::TickEngine,
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("countdown_hub={},tower_http=info", config.log_level()))
        .init();

    info!("Starting countdown-hub server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration: host={}, port={}, database={}, cache={}, tick={}ms",
        config.host, config.port, config.database, config.cache_path, config.tick_interval_ms
    );

    let repo = Arc::new(SqliteTimerRepository::open(&config.database)?);
    let cache = Arc::new(SqliteSnapshotCache::open(&config.cache_path)?);
    match cache.purge_expired() {
        Ok(purged) if purged > 0 => info!(purged, "Purged expired snapshots"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Failed to purge expired snapshots"),
    }

    let registry = Arc::new(ConnectionRegistry::new(config.channel_buffer()));
    let broadcaster = Broadcaster::new(Arc::clone(&registry), config.broadcast_timeout())
        .with_owner_stop_notice(config.notify_owner_on_stop);
    let timers = Arc::new(TimerService::new(
        repo,
        cache,
        broadcaster,
        config.snapshot_ttl(),
    ));

    // Restore must finish before ticking starts or channels are accepted
    restore_timers(&timers).await;

    let engine = TickEngine::new(Arc::clone(&timers), config.tick_interval());
    let ticker = engine.start()?;

    let state = Arc::new(AppState::new(Arc::clone(&timers), registry));
    let app = create_router(state);

    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  POST /timer                      - Create a timer");
    info!("  GET  /timer                      - List timers");
    info!("  GET  /timer/:id                  - Get a timer");
    info!("  PUT  /timer/:id/pause            - Pause a timer");
    info!("  PUT  /timer/:id/resume           - Resume a timer");
    info!("  PUT  /timer/:id/stop             - Stop and delete a timer");
    info!("  PUT  /timer/:id/modify           - Reset a timer to a new duration");
    info!("  GET  /ws/owner/:session_id       - Owner push channel");
    info!("  GET  /ws/supervisor/:session_id  - Supervisor push channel");
    info!("  GET  /health                     - Health check");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    info!("Shutdown signal received, stopping tick engine");
    ticker.shutdown().await;

    if let Err(e) = result {
        tracing::error!("Server error: {}", e);
    }
    info!("Server shutdown complete");
    Ok(())
}
