//! Screenwall - event photo wall queue server
//!
//! Main entry point for the Screenwall application.

use screenwall::{
    control_panel::{AllowAll, Authorizer, RoleAuthorizer},
    display_client::{
        DisplayClient, DisplayClientConfig, HttpImagePrefetcher, LocalDisplayStore,
        DEFAULT_CACHE_CAPACITY,
    },
    queue_store::MemoryQueueBackend,
    screen_registry::{MemoryScreenRegistry, Screen},
    state::{AppConfig, AppState, Backends, StoreBackend},
    web_api,
};
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Spawn an in-process display client for every configured screen
async fn start_local_displays(state: &AppState) -> anyhow::Result<()> {
    let client_config = DisplayClientConfig::from_policy(&state.config.policy);
    let store = Arc::new(LocalDisplayStore::new(
        state.queue.clone(),
        state.screens.clone(),
        state.config.policy.global_claim_ttl(),
    ));

    let mut displays = state.displays.write().await;
    for screen_id in &state.config.local_display_screens {
        let prefetcher = Arc::new(HttpImagePrefetcher::new(DEFAULT_CACHE_CAPACITY)?);
        let handle = DisplayClient::new(
            screen_id.clone(),
            client_config.clone(),
            store.clone(),
            state.realtime.clone(),
            prefetcher,
        )
        .spawn();
        displays.insert(screen_id.clone(), handle);
        tracing::info!(screen_id = %screen_id, "Local display client started");
    }
    Ok(())
}

/// Stop local displays (each writes offline) and drop realtime subscribers
async fn shutdown(state: &AppState) {
    let handles: Vec<_> = state.displays.write().await.drain().map(|(_, h)| h).collect();
    for handle in handles {
        handle.stop().await;
    }
    state.realtime.disconnect_all().await;
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screenwall=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Screenwall v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::from_env()?;
    config.policy.validate()?;
    tracing::info!(
        store_backend = ?config.store_backend,
        public_landing_url = %config.public_landing_url,
        display_time_ms = config.policy.display_time_ms,
        prefetch_count = config.policy.prefetch_count,
        stale_after_ms = config.policy.stale_after_ms,
        global_claim_ttl_ms = config.policy.global_claim_ttl_ms,
        local_displays = config.local_display_screens.len(),
        "Configuration loaded"
    );

    // Storage
    let (pool, backends) = match config.store_backend {
        StoreBackend::Mysql => {
            let pool = MySqlPoolOptions::new()
                .max_connections(config.db_max_connections)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&config.database_url)
                .await?;
            tracing::info!("Database connected");
            (Some(pool.clone()), Backends::mysql(pool))
        }
        StoreBackend::Memory => {
            let queue = Arc::new(MemoryQueueBackend::new());
            let screens = Arc::new(MemoryScreenRegistry::new());
            for screen_id in &config.local_display_screens {
                screens.insert_screen(Screen::new(screen_id.clone(), screen_id.clone())).await;
            }
            tracing::warn!("Using in-memory store; queue state is lost on restart");
            (None, Backends::memory(queue, screens))
        }
    };

    let authorizer: Arc<dyn Authorizer> = if config.require_roles {
        Arc::new(RoleAuthorizer::default())
    } else {
        tracing::warn!("Role checks disabled (REQUIRE_ROLES=false)");
        Arc::new(AllowAll)
    };

    let state = AppState::new(config, pool, backends, authorizer);
    tracing::info!("Components initialized (QueueStore, ScreenRegistry, SlaMonitor, ControlPanel, RealtimeHub)");

    start_local_displays(&state).await?;

    // Create router, optionally serving the display / panel frontends
    let mut app = web_api::create_router(state.clone());
    if let Some(static_dir) = &state.config.static_dir {
        let serve_dir = ServeDir::new(static_dir)
            .not_found_service(ServeFile::new(static_dir.join("index.html")));
        app = app.fallback_service(serve_dir);
        tracing::info!(static_dir = %static_dir.display(), "Static file serving enabled");
    }
    let app = app
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown(&state).await;

    Ok(())
}
